//! Common test utilities for integration tests.
//!
//! Session tests script a gateway through [`MockConnector`]; relay tests run
//! real sockets on `127.0.0.1:0` with the scripted upstreams in [`mocks`].
//!
//! # Example
//!
//! ```ignore
//! let (client, connector, server) = ready_client(test_options()).await;
//! ```

#![allow(dead_code)]

pub mod mocks;

pub use mocks::*;

use std::net::SocketAddr;
use std::time::Duration;

use opengloves::adapters::{MockConnector, MockTransport};
use opengloves::config::AppConfig;
use opengloves::gateway::{ClientOptions, GatewayClient};
use opengloves::relay::start_relay_server_on;

/// Options with a token so the handshake carries credentials.
pub fn test_options() -> ClientOptions {
    ClientOptions::new("ws://gateway.test:18789").with_token("test-token")
}

/// A client whose first socket has completed the handshake.
pub async fn ready_client(
    options: ClientOptions,
) -> (GatewayClient, MockConnector, MockTransport) {
    let connector = MockConnector::new();
    let client = GatewayClient::builder(options).spawn(connector.clone());
    client.connect();

    let mut server = connector.next_transport().await;
    server.accept_handshake().await;
    client.wait_until_ready().await.unwrap();
    (client, connector, server)
}

/// Start a relay in front of `upstream_url`, returning its address.
pub async fn start_relay(config: AppConfig) -> SocketAddr {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let (_handle, actual) = start_relay_server_on(addr, &config)
        .await
        .expect("Failed to start relay");
    actual
}

/// Relay config pointing at `upstream`.
pub fn relay_config(upstream: SocketAddr) -> AppConfig {
    AppConfig::default()
        .with_host("127.0.0.1")
        .with_port(0)
        .with_upstream_url(format!("ws://{}", upstream))
}

/// WebSocket URL of the relay path.
pub fn relay_ws_url(relay: SocketAddr) -> String {
    format!("ws://{}/ws", relay)
}

/// Await `fut`, failing the test if it takes longer than two seconds.
pub async fn within<T>(fut: impl std::future::Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), fut)
        .await
        .expect("timed out")
}
