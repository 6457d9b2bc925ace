//! Transport seam between the gateway session and a WebSocket implementation.
//!
//! A connector opens one socket per call and hands back a pair of channels.
//! The session drives the socket through [`TransportCommand`]s and observes
//! it through [`TransportEvent`]s, which follow browser WebSocket semantics:
//! `Open` once, any number of `Message`/`Error`, then exactly one `Closed`.

use tokio::sync::mpsc;

/// Something the socket reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    /// A text frame.
    Message(String),
    /// An error; a `Closed` event follows.
    Error(String),
    Closed { code: u16, reason: String },
}

/// Something the session asks the socket to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    Send(String),
    Close { code: u16, reason: String },
}

/// Session-side ends of one socket.
///
/// Dropping `commands` tells the adapter its owner is gone; it closes the
/// socket without reporting further events.
#[derive(Debug)]
pub struct TransportHandle {
    pub commands: mpsc::UnboundedSender<TransportCommand>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Adapter-side ends of one socket.
#[derive(Debug)]
pub struct TransportPeer {
    pub commands: mpsc::UnboundedReceiver<TransportCommand>,
    pub events: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportPeer {
    /// Report an event. Returns false once the session stopped listening.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

/// Create a connected handle/peer pair.
pub fn transport_channel() -> (TransportHandle, TransportPeer) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    (
        TransportHandle {
            commands: command_tx,
            events: event_rx,
        },
        TransportPeer {
            commands: command_rx,
            events: event_tx,
        },
    )
}

/// Opens gateway sockets.
///
/// `open` must not block: implementations start connecting in the
/// background and report progress on the returned handle.
pub trait GatewayConnector: Send + Sync + 'static {
    fn open(&self, url: &str) -> TransportHandle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_pairs_are_connected() {
        let (mut handle, mut peer) = transport_channel();

        handle
            .commands
            .send(TransportCommand::Send("ping".to_string()))
            .unwrap();
        assert_eq!(
            peer.commands.recv().await,
            Some(TransportCommand::Send("ping".to_string()))
        );

        assert!(peer.emit(TransportEvent::Open));
        assert_eq!(handle.events.recv().await, Some(TransportEvent::Open));
    }

    #[test]
    fn test_emit_reports_dropped_listener() {
        let (handle, peer) = transport_channel();
        drop(handle);
        assert!(!peer.emit(TransportEvent::Open));
    }
}
