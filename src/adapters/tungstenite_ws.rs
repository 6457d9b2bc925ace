//! Tungstenite-based gateway transport.
//!
//! Each [`TungsteniteConnector::open`] spawns a task that owns one socket and
//! translates between tungstenite messages and the transport channels.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::gateway::frame::{CLOSE_ABNORMAL, CLOSE_NORMAL};
use crate::traits::{
    transport_channel, GatewayConnector, TransportCommand, TransportEvent, TransportHandle,
    TransportPeer,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code reported when the peer's close frame carried no status.
const CLOSE_NO_STATUS: u16 = 1005;

const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens real WebSocket connections with tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    close_timeout: Duration,
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self {
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long to wait for the server to answer our close frame.
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}

impl GatewayConnector for TungsteniteConnector {
    fn open(&self, url: &str) -> TransportHandle {
        let (handle, peer) = transport_channel();
        tokio::spawn(run_transport(url.to_string(), peer, self.close_timeout));
        handle
    }
}

async fn run_transport(url: String, mut peer: TransportPeer, close_timeout: Duration) {
    let Some(ws) = establish(&url, &mut peer).await else {
        return;
    };
    peer.emit(TransportEvent::Open);

    let (mut ws_sink, mut ws_stream) = ws.split();
    let mut received_close: Option<(u16, String)> = None;
    let mut requested_close: Option<(u16, String)> = None;
    let mut close_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        peer.emit(TransportEvent::Message(text));
                    }
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => {
                            peer.emit(TransportEvent::Message(text));
                        }
                        Err(_) => warn!("Dropping non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        debug!("Received ping, sending pong");
                        let _ = ws_sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("Received close frame from server");
                        received_close = Some(
                            frame
                                .map(|f| (u16::from(f.code), f.reason.into_owned()))
                                .unwrap_or((CLOSE_NO_STATUS, String::new())),
                        );
                    }
                    Some(Ok(_)) => {
                        // Pong and raw frames need no handling
                    }
                    Some(Err(e)) => {
                        if received_close.is_some() || requested_close.is_some() {
                            debug!("Socket error during close handshake: {}", e);
                            break;
                        }
                        let message = e.to_string();
                        error!("WebSocket error: {}", message);
                        peer.emit(TransportEvent::Error(message.clone()));
                        peer.emit(TransportEvent::Closed {
                            code: CLOSE_ABNORMAL,
                            reason: message,
                        });
                        return;
                    }
                    None => break,
                }
            }
            command = peer.commands.recv(), if requested_close.is_none() => {
                match command {
                    Some(TransportCommand::Send(text)) => {
                        if let Err(e) = ws_sink.send(Message::Text(text)).await {
                            warn!("Failed to send frame: {}", e);
                        }
                    }
                    Some(TransportCommand::Close { code, reason }) => {
                        debug!("Closing socket: {} {}", code, reason);
                        let _ = ws_sink.send(close_message(code, &reason)).await;
                        requested_close = Some((code, reason));
                        close_deadline = Some(Instant::now() + close_timeout);
                    }
                    None => {
                        debug!("Transport owner dropped, closing socket");
                        let _ = ws_sink.send(close_message(CLOSE_NORMAL, "")).await;
                        return;
                    }
                }
            }
            _ = sleep_until_deadline(close_deadline) => {
                warn!("Close handshake with {} timed out", url);
                break;
            }
        }
    }

    let (code, reason) = received_close
        .or(requested_close)
        .unwrap_or((CLOSE_ABNORMAL, String::new()));
    info!("WebSocket to {} closed: {} {}", url, code, reason);
    peer.emit(TransportEvent::Closed { code, reason });
}

/// Connect, honouring a close request that arrives while still connecting.
async fn establish(url: &str, peer: &mut TransportPeer) -> Option<WsStream> {
    let connect = connect_async(url);
    tokio::pin!(connect);

    loop {
        tokio::select! {
            result = &mut connect => {
                return match result {
                    Ok((ws, _)) => {
                        info!("WebSocket connected to {}", url);
                        Some(ws)
                    }
                    Err(e) => {
                        let message = e.to_string();
                        warn!("Failed to connect to {}: {}", url, message);
                        peer.emit(TransportEvent::Error(message.clone()));
                        peer.emit(TransportEvent::Closed {
                            code: CLOSE_ABNORMAL,
                            reason: message,
                        });
                        None
                    }
                };
            }
            command = peer.commands.recv() => {
                match command {
                    Some(TransportCommand::Close { code, reason }) => {
                        peer.emit(TransportEvent::Closed { code, reason });
                        return None;
                    }
                    Some(TransportCommand::Send(_)) => {
                        warn!("Dropping frame sent before the socket opened");
                    }
                    None => return None,
                }
            }
        }
    }
}

fn close_message(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::from(code),
        reason: reason.to_string().into(),
    }))
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
