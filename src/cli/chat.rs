//! Line-oriented chat client.
//!
//! Reads lines from stdin and sends them as chat messages on one session
//! key. Streaming replies are printed as they arrive. Slash commands:
//! `/history`, `/sessions`, `/abort`, `/quit`.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use color_eyre::eyre::bail;
use color_eyre::Result;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use super::access::{obtain_ticket, with_ticket};
use super::args::ChatArgs;
use crate::adapters::TungsteniteConnector;
use crate::config::AppConfig;
use crate::gateway::chat::extract_text;
use crate::gateway::methods::{DEFAULT_HISTORY_LIMIT, EVENT_CHAT};
use crate::gateway::{
    ChatEvent, ClientOptions, GatewayClient, ReplyUpdate, SessionsListParams, StreamingReply,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// One line of user input.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatInput {
    Message(String),
    History,
    Sessions,
    Abort,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_input(line: &str) -> ChatInput {
    let line = line.trim();
    match line {
        "" => ChatInput::Empty,
        "/quit" | "/exit" => ChatInput::Quit,
        "/history" => ChatInput::History,
        "/sessions" => ChatInput::Sessions,
        "/abort" | "/stop" => ChatInput::Abort,
        other if other.starts_with('/') => ChatInput::Unknown(other.to_string()),
        other => ChatInput::Message(other.to_string()),
    }
}

/// Lines for a `chat.history` payload: `role: text` per message.
pub fn format_history(payload: &Value) -> Vec<String> {
    payload
        .get("messages")
        .and_then(Value::as_array)
        .map(|messages| {
            messages
                .iter()
                .map(|message| {
                    let role = message
                        .get("role")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    format!("{}: {}", role, extract_text(message))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Lines for a `sessions.list` payload: key plus title when known.
pub fn format_sessions(payload: &Value) -> Vec<String> {
    payload
        .get("sessions")
        .and_then(Value::as_array)
        .map(|sessions| {
            sessions
                .iter()
                .filter_map(|session| {
                    let key = session.get("key").and_then(Value::as_str)?;
                    let title = ["derivedTitle", "label", "displayName"]
                        .iter()
                        .find_map(|field| session.get(*field).and_then(Value::as_str));
                    Some(match title {
                        Some(title) => format!("{}  {}", key, title),
                        None => key.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Options for the chat client from config plus command-line overrides.
async fn chat_options(args: &ChatArgs) -> Result<ClientOptions> {
    let path = args.config.clone().unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load_or_default(&path)?.with_env_overrides()?;

    let mut options = ClientOptions::from_config(&config);
    if let Some(url) = args.url.as_ref() {
        options.url = url.clone();
    }
    if let Some(session) = args.session.as_ref() {
        options.session_key = session.clone();
    }
    if args.ask_password {
        options.password = Some(rpassword::prompt_password("Gateway password: ")?);
        options.token = None;
    }
    if let Some(access_url) = args.access_url.as_deref() {
        let password = rpassword::prompt_password("Access password: ")?;
        if let Some(ticket) = obtain_ticket(&reqwest::Client::new(), access_url, &password).await? {
            options.url = with_ticket(&options.url, &ticket);
        }
    }
    Ok(options)
}

fn print_update(update: ReplyUpdate, was_streaming: bool) {
    let mut stdout = std::io::stdout();
    match update {
        ReplyUpdate::Delta(text) => {
            let _ = write!(stdout, "{}", text);
            let _ = stdout.flush();
        }
        ReplyUpdate::Final(text) => {
            if was_streaming {
                println!();
            } else {
                println!("{}", text);
            }
        }
        ReplyUpdate::Failed(message) => eprintln!("\n[error] {}", message),
        ReplyUpdate::Aborted => eprintln!("\n[aborted]"),
    }
}

/// Run the interactive chat client until `/quit`, Ctrl-C or end of input.
pub async fn run_chat(args: ChatArgs) -> Result<()> {
    let options = chat_options(&args).await?;
    let session_key = options.session_key.clone();
    let reply = Arc::new(Mutex::new(StreamingReply::new()));

    let client = GatewayClient::builder(options)
        .on_connect(|_| eprintln!("[connected]"))
        .on_disconnect(|close| eprintln!("[disconnected: {} {}]", close.code, close.reason))
        .on_event(EVENT_CHAT, move |payload| {
            let Ok(event) = ChatEvent::from_payload(payload) else {
                debug!("Ignoring unparseable chat event");
                return;
            };
            if !event.belongs_to(&session_key) {
                return;
            }
            let mut reply = reply.lock().unwrap_or_else(PoisonError::into_inner);
            let was_streaming = reply.is_streaming();
            print_update(reply.apply(&event), was_streaming);
        })
        .spawn(TungsteniteConnector::new());

    client.connect();
    if tokio::time::timeout(CONNECT_TIMEOUT, client.wait_until_ready())
        .await
        .is_err()
    {
        bail!("Timed out connecting to the gateway");
    }
    eprintln!(
        "Chatting on session '{}'. Commands: /history /sessions /abort /quit",
        client.session_key()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        match parse_input(&line) {
            ChatInput::Quit => break,
            ChatInput::Empty => {}
            ChatInput::Unknown(command) => eprintln!("Unknown command {}", command),
            ChatInput::History => match client.chat_history(DEFAULT_HISTORY_LIMIT).await {
                Ok(response) => {
                    let payload = response.payload.unwrap_or(Value::Null);
                    for line in format_history(&payload) {
                        println!("{}", line);
                    }
                }
                Err(e) => eprintln!("[error] {}", e),
            },
            ChatInput::Sessions => {
                match client.list_sessions(SessionsListParams::default()).await {
                    Ok(response) => {
                        let payload = response.payload.unwrap_or(Value::Null);
                        for line in format_sessions(&payload) {
                            println!("{}", line);
                        }
                    }
                    Err(e) => eprintln!("[error] {}", e),
                }
            }
            ChatInput::Abort => {
                if let Err(e) = client.abort_chat().await {
                    eprintln!("[error] {}", e);
                }
            }
            ChatInput::Message(text) => {
                if let Err(e) = client.send_chat_message(&text, Vec::new()).await {
                    eprintln!("[error] {}", e);
                }
            }
        }
    }

    client.disconnect();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("  "), ChatInput::Empty);
        assert_eq!(parse_input("/quit"), ChatInput::Quit);
        assert_eq!(parse_input("/history"), ChatInput::History);
        assert_eq!(parse_input("/sessions"), ChatInput::Sessions);
        assert_eq!(parse_input("/stop"), ChatInput::Abort);
        assert_eq!(parse_input("/nope"), ChatInput::Unknown("/nope".to_string()));
        assert_eq!(
            parse_input(" hello there "),
            ChatInput::Message("hello there".to_string())
        );
    }

    #[test]
    fn test_format_history() {
        let payload = json!({"messages": [
            {"role": "user", "content": [{"type": "text", "text": "hi"}]},
            {"role": "assistant", "content": "hello"}
        ]});
        assert_eq!(format_history(&payload), vec!["user: hi", "assistant: hello"]);
        assert!(format_history(&json!({})).is_empty());
    }

    #[test]
    fn test_format_sessions() {
        let payload = json!({"sessions": [
            {"key": "main", "derivedTitle": "Trip planning"},
            {"key": "work"},
            {"label": "no key"}
        ]});
        assert_eq!(format_sessions(&payload), vec!["main  Trip planning", "work"]);
    }
}
