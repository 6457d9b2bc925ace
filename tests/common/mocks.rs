//! Scripted upstream WebSocket servers for relay tests.

use std::future::Future;
use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

pub type ServerSocket = WebSocketStream<TcpStream>;

/// Accept WebSocket connections on an ephemeral port and run `handler` on each.
pub async fn spawn_upstream<F, Fut>(handler: F) -> SocketAddr
where
    F: Fn(ServerSocket) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            if let Ok(ws) = accept_async(stream).await {
                tokio::spawn(handler(ws));
            }
        }
    });
    addr
}

/// An address nothing is listening on.
pub fn unused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Upstream that accepts TCP connections but never answers the WebSocket handshake.
pub async fn spawn_silent_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    addr
}

/// Upstream that reports every message it receives, including close frames.
pub async fn spawn_recording_upstream() -> (SocketAddr, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let addr = spawn_upstream(move |mut ws| {
        let tx = tx.clone();
        async move {
            while let Some(Ok(msg)) = ws.next().await {
                let is_close = msg.is_close();
                let _ = tx.send(msg);
                if is_close {
                    break;
                }
            }
        }
    })
    .await;
    (addr, rx)
}

/// Upstream that sends `messages` right after the upgrade, then idles.
pub async fn spawn_talking_upstream(messages: Vec<Message>) -> SocketAddr {
    spawn_upstream(move |mut ws| {
        let messages = messages.clone();
        async move {
            for msg in messages {
                if ws.send(msg).await.is_err() {
                    return;
                }
            }
            while let Some(Ok(_)) = ws.next().await {}
        }
    })
    .await
}

/// Minimal gateway: challenge, accept `connect` when the token matches,
/// answer `chat.history` and `chat.send`, and push a chat delta after a send.
pub async fn spawn_fake_gateway(token: &'static str) -> SocketAddr {
    spawn_upstream(move |mut ws| async move {
        let challenge = json!({
            "type": "event",
            "event": "connect.challenge",
            "payload": {"nonce": "gw-nonce", "ts": 1}
        });
        if ws.send(Message::Text(challenge.to_string())).await.is_err() {
            return;
        }

        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else { continue };
            let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                continue;
            };
            let id = frame["id"].clone();
            let replies = match frame["method"].as_str() {
                Some("connect") if frame["params"]["auth"]["token"] == token => vec![json!({
                    "type": "res", "id": id, "ok": true,
                    "payload": {"type": "hello-ok", "protocol": 3}
                })],
                Some("connect") => vec![json!({
                    "type": "res", "id": id, "ok": false,
                    "error": {"message": "invalid token"}
                })],
                Some("chat.history") => vec![json!({
                    "type": "res", "id": id, "ok": true,
                    "payload": {"messages": [{"role": "user", "content": "earlier"}]}
                })],
                Some("chat.send") => vec![
                    json!({"type": "res", "id": id, "ok": true, "payload": {"runId": "run-1"}}),
                    json!({
                        "type": "event", "event": "chat",
                        "payload": {
                            "state": "delta",
                            "sessionKey": frame["params"]["sessionKey"],
                            "runId": "run-1",
                            "message": {"content": [{"type": "text", "text": "echo: "}]}
                        }
                    }),
                ],
                _ => vec![json!({
                    "type": "res", "id": id, "ok": false,
                    "error": {"message": "unknown method", "code": "E_METHOD"}
                })],
            };
            for reply in replies {
                if ws.send(Message::Text(reply.to_string())).await.is_err() {
                    return;
                }
            }
        }
    })
    .await
}
