//! One inbound client paired with one upstream gateway socket.
//!
//! Text and binary frames are copied unchanged in both directions, in
//! order. Ping/pong stay per hop. When either side goes away the other is
//! closed: a client close is forwarded upstream, an upstream close is
//! forwarded to the client, and an upstream failure closes the client with
//! 1011.

use std::time::Duration;

use axum::extract::ws::{CloseFrame as ClientCloseFrame, Message as ClientMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as UpstreamCloseFrame;
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::gateway::frame::CLOSE_UPSTREAM_FAILED;

type UpstreamStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type UpstreamSink = SplitSink<UpstreamStream, UpstreamMessage>;
type UpstreamSource = SplitStream<UpstreamStream>;
type ClientSink = SplitSink<WebSocket, ClientMessage>;
type ClientSource = SplitStream<WebSocket>;

/// A close code and reason as seen on the wire.
type Close = Option<(u16, String)>;

/// How a pairing ended.
#[derive(Debug)]
enum PairEnd {
    ClientClosed(Close),
    ClientFailed(String),
    UpstreamClosed(Close),
    UpstreamFailed(String),
}

/// Relay frames between `client` and a fresh connection to `upstream_url`
/// until either side closes.
///
/// If the upstream handshake does not finish within `dial_timeout` the
/// client is closed with 1011.
pub async fn run_pairing(
    mut client: WebSocket,
    upstream_url: &str,
    dial_timeout: Duration,
    pairing_id: &str,
) {
    let dialed = match timeout(dial_timeout, connect_async(upstream_url)).await {
        Ok(Ok((stream, _))) => Ok(stream),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("no handshake within {:?}", dial_timeout)),
    };
    let upstream = match dialed {
        Ok(stream) => stream,
        Err(message) => {
            let err = RelayError::UpstreamUnavailable {
                url: upstream_url.to_string(),
                message,
            };
            warn!("[{}] {} ({})", pairing_id, err, err.error_code());
            let _ = client
                .send(client_close(CLOSE_UPSTREAM_FAILED, "Upstream unavailable"))
                .await;
            return;
        }
    };
    info!("[{}] Paired with upstream {}", pairing_id, upstream_url);

    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let end = tokio::select! {
        end = pump_client(&mut client_rx, &mut upstream_tx) => end,
        end = pump_upstream(&mut upstream_rx, &mut client_tx) => end,
    };

    match end {
        PairEnd::ClientClosed(close) => {
            debug!("[{}] Client closed: {:?}", pairing_id, close);
            let _ = upstream_tx.send(UpstreamMessage::Close(close.map(upstream_close_frame))).await;
            let _ = upstream_tx.close().await;
        }
        PairEnd::ClientFailed(e) => {
            debug!("[{}] Client connection failed: {}", pairing_id, e);
            let _ = upstream_tx.close().await;
        }
        PairEnd::UpstreamClosed(close) => {
            debug!("[{}] Upstream closed: {:?}", pairing_id, close);
            let frame = close.map(|(code, reason)| ClientCloseFrame {
                code,
                reason: reason.into(),
            });
            let _ = client_tx.send(ClientMessage::Close(frame)).await;
            let _ = client_tx.close().await;
        }
        PairEnd::UpstreamFailed(e) => {
            warn!("[{}] Upstream failed: {}", pairing_id, e);
            let _ = client_tx
                .send(client_close(CLOSE_UPSTREAM_FAILED, "Upstream connection failed"))
                .await;
            let _ = client_tx.close().await;
        }
    }
    info!("[{}] Pairing closed", pairing_id);
}

/// Copy client frames upstream until the client stops.
async fn pump_client(client_rx: &mut ClientSource, upstream_tx: &mut UpstreamSink) -> PairEnd {
    while let Some(msg) = client_rx.next().await {
        let forward = match msg {
            Ok(ClientMessage::Text(text)) => UpstreamMessage::Text(text),
            Ok(ClientMessage::Binary(data)) => UpstreamMessage::Binary(data),
            Ok(ClientMessage::Close(frame)) => {
                return PairEnd::ClientClosed(frame.map(|f| (f.code, f.reason.into_owned())));
            }
            Ok(_) => continue,
            Err(e) => return PairEnd::ClientFailed(e.to_string()),
        };
        if let Err(e) = upstream_tx.send(forward).await {
            return PairEnd::UpstreamFailed(e.to_string());
        }
    }
    PairEnd::ClientClosed(None)
}

/// Copy upstream frames to the client until upstream stops.
async fn pump_upstream(upstream_rx: &mut UpstreamSource, client_tx: &mut ClientSink) -> PairEnd {
    while let Some(msg) = upstream_rx.next().await {
        let forward = match msg {
            Ok(UpstreamMessage::Text(text)) => ClientMessage::Text(text),
            Ok(UpstreamMessage::Binary(data)) => ClientMessage::Binary(data),
            Ok(UpstreamMessage::Close(frame)) => {
                return PairEnd::UpstreamClosed(
                    frame.map(|f| (u16::from(f.code), f.reason.into_owned())),
                );
            }
            Ok(_) => continue,
            Err(e) => return PairEnd::UpstreamFailed(e.to_string()),
        };
        if let Err(e) = client_tx.send(forward).await {
            return PairEnd::ClientFailed(e.to_string());
        }
    }
    PairEnd::UpstreamFailed("upstream ended without a close frame".to_string())
}

fn client_close(code: u16, reason: &str) -> ClientMessage {
    ClientMessage::Close(Some(ClientCloseFrame {
        code,
        reason: reason.to_string().into(),
    }))
}

fn upstream_close_frame((code, reason): (u16, String)) -> UpstreamCloseFrame<'static> {
    UpstreamCloseFrame {
        code: CloseCode::from(code),
        reason: reason.into(),
    }
}
