//! Mock gateway connector for testing.
//!
//! Every `open` hands the test a [`MockTransport`] that plays the server
//! side: it decides when the socket opens, what frames arrive, and how the
//! socket closes, and it sees every command the session issues.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::gateway::frame::{decode, encode, EventFrame, Frame, RequestFrame, ResponseFrame};
use crate::traits::{
    transport_channel, GatewayConnector, TransportCommand, TransportEvent, TransportHandle,
    TransportPeer,
};

/// Mock connector. Clones share the same queue of opened transports.
///
/// # Example
///
/// ```ignore
/// let connector = MockConnector::new();
/// let client = GatewayClient::builder(options).spawn(connector.clone());
/// client.connect();
///
/// let mut server = connector.next_transport().await;
/// server.open();
/// server.push_event("connect.challenge", json!({"nonce": "n"}));
/// let connect = server.next_request().await;
/// server.respond(ResponseFrame::ok(&connect.id, json!({})));
/// ```
#[derive(Clone)]
pub struct MockConnector {
    opened_tx: mpsc::UnboundedSender<MockTransport>,
    opened_rx: Arc<Mutex<mpsc::UnboundedReceiver<MockTransport>>>,
    open_count: Arc<AtomicUsize>,
}

impl Default for MockConnector {
    fn default() -> Self {
        let (opened_tx, opened_rx) = mpsc::unbounded_channel();
        Self {
            opened_tx,
            opened_rx: Arc::new(Mutex::new(opened_rx)),
            open_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sockets opened so far.
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    /// Wait for the session to open its next socket.
    pub async fn next_transport(&self) -> MockTransport {
        self.opened_rx
            .lock()
            .await
            .recv()
            .await
            .expect("MockConnector sender lives as long as the connector")
    }

    /// A socket opened but not yet taken by the test, if any.
    pub async fn try_next_transport(&self) -> Option<MockTransport> {
        self.opened_rx.lock().await.try_recv().ok()
    }
}

impl GatewayConnector for MockConnector {
    fn open(&self, url: &str) -> TransportHandle {
        let (handle, peer) = transport_channel();
        self.open_count.fetch_add(1, Ordering::SeqCst);
        let _ = self.opened_tx.send(MockTransport {
            url: url.to_string(),
            peer,
        });
        handle
    }
}

/// Server side of one mock socket.
pub struct MockTransport {
    pub url: String,
    peer: TransportPeer,
}

impl MockTransport {
    pub fn open(&self) {
        self.peer.emit(TransportEvent::Open);
    }

    pub fn push_text(&self, text: &str) {
        self.peer.emit(TransportEvent::Message(text.to_string()));
    }

    pub fn push_frame(&self, frame: &Frame) {
        let text = encode(frame).expect("frames encode");
        self.push_text(&text);
    }

    pub fn push_event(&self, event: &str, payload: Value) {
        self.push_frame(&Frame::Event(EventFrame::new(event, payload)));
    }

    pub fn respond(&self, response: ResponseFrame) {
        self.push_frame(&Frame::Response(response));
    }

    pub fn error(&self, message: &str) {
        self.peer.emit(TransportEvent::Error(message.to_string()));
    }

    /// Report the socket as closed by the server.
    pub fn close(&self, code: u16, reason: &str) {
        self.peer.emit(TransportEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    /// Next command from the session; `None` once the session dropped the socket.
    pub async fn next_command(&mut self) -> Option<TransportCommand> {
        self.peer.commands.recv().await
    }

    /// Next frame the session sent, decoded as a request.
    pub async fn next_request(&mut self) -> RequestFrame {
        match self.next_command().await {
            Some(TransportCommand::Send(text)) => match decode(&text) {
                Ok(Frame::Request(request)) => request,
                other => panic!("Expected request frame, got {:?}", other),
            },
            other => panic!("Expected send, got {:?}", other),
        }
    }

    /// Wait for a close command and return its code and reason.
    pub async fn expect_close(&mut self) -> (u16, String) {
        match self.next_command().await {
            Some(TransportCommand::Close { code, reason }) => (code, reason),
            other => panic!("Expected close, got {:?}", other),
        }
    }

    /// Answer the session's close command, as a server echoing the close frame would.
    pub async fn echo_close(&mut self) -> (u16, String) {
        let (code, reason) = self.expect_close().await;
        self.close(code, &reason);
        (code, reason)
    }

    /// Open the socket, issue a challenge and accept the `connect` request.
    pub async fn accept_handshake(&mut self) -> RequestFrame {
        self.open();
        self.push_event("connect.challenge", serde_json::json!({"nonce": "mock-nonce"}));
        let connect = self.next_request().await;
        self.respond(ResponseFrame::ok(
            &connect.id,
            serde_json::json!({"type": "hello-ok", "protocol": 3}),
        ));
        connect
    }
}
