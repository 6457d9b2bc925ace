//! Typed view of `chat` events and streaming reply assembly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatState {
    Delta,
    Final,
    Error,
    Aborted,
}

/// Payload of a `chat` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    pub state: ChatState,
    #[serde(default)]
    pub session_key: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub delta: Option<Value>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ChatEvent {
    pub fn from_payload(payload: &Value) -> Result<Self, GatewayError> {
        Ok(serde_json::from_value(payload.clone())?)
    }

    /// Whether this event is for the chat thread `session_key`.
    pub fn belongs_to(&self, session_key: &str) -> bool {
        self.session_key.as_deref() == Some(session_key)
    }

    /// Text carried by a delta (`message.content`, falling back to `delta.content`).
    pub fn delta_text(&self) -> String {
        let from_message = self.message.as_ref().and_then(content_blocks);
        let from_delta = self.delta.as_ref().and_then(content_blocks);
        from_message
            .or(from_delta)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(text_block)
                    .collect::<Vec<_>>()
                    .concat()
            })
            .unwrap_or_default()
    }
}

fn content_blocks(message: &Value) -> Option<&Vec<Value>> {
    message.get("content").and_then(Value::as_array)
}

fn text_block(block: &Value) -> Option<&str> {
    if block.get("type").and_then(Value::as_str) != Some("text") {
        return None;
    }
    block
        .get("text")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
}

/// Plain text of a chat message: text blocks joined by newlines, or a string body.
pub fn extract_text(message: &Value) -> String {
    match message.get("content") {
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(text_block)
            .collect::<Vec<_>>()
            .join("\n"),
        Some(Value::String(text)) => text.clone(),
        _ => String::new(),
    }
}

/// What a chat event did to the reply being streamed.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyUpdate {
    /// Text appended by a delta.
    Delta(String),
    /// Final reply text.
    Final(String),
    Failed(String),
    Aborted,
}

/// Accumulates delta text for one assistant reply.
#[derive(Debug, Default, Clone)]
pub struct StreamingReply {
    run_id: Option<String>,
    text: String,
}

impl StreamingReply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_streaming(&self) -> bool {
        self.run_id.is_some() || !self.text.is_empty()
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Apply an event. Final, error and abort end the current reply.
    pub fn apply(&mut self, event: &ChatEvent) -> ReplyUpdate {
        match event.state {
            ChatState::Delta => {
                if self.run_id.is_none() {
                    self.run_id = event.run_id.clone();
                }
                let appended = event.delta_text();
                self.text.push_str(&appended);
                ReplyUpdate::Delta(appended)
            }
            ChatState::Final => {
                let text = event
                    .message
                    .as_ref()
                    .map(extract_text)
                    .unwrap_or_else(|| self.text.clone());
                self.reset();
                ReplyUpdate::Final(text)
            }
            ChatState::Error => {
                self.reset();
                ReplyUpdate::Failed(
                    event
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "Unknown error".to_string()),
                )
            }
            ChatState::Aborted => {
                self.reset();
                ReplyUpdate::Aborted
            }
        }
    }

    fn reset(&mut self) {
        self.run_id = None;
        self.text.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn delta(text: &str) -> ChatEvent {
        ChatEvent::from_payload(&json!({
            "state": "delta",
            "sessionKey": "main",
            "runId": "run-1",
            "message": {"role": "assistant", "content": [{"type": "text", "text": text}]}
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_chat_event() {
        let event = ChatEvent::from_payload(&json!({
            "state": "error",
            "sessionKey": "main",
            "runId": "r",
            "errorMessage": "model overloaded"
        }))
        .unwrap();
        assert_eq!(event.state, ChatState::Error);
        assert!(event.belongs_to("main"));
        assert!(!event.belongs_to("other"));
        assert_eq!(event.error_message.as_deref(), Some("model overloaded"));
    }

    #[test]
    fn test_unknown_state_is_rejected() {
        let result = ChatEvent::from_payload(&json!({"state": "thinking"}));
        assert!(matches!(result, Err(GatewayError::MalformedFrame(_))));
    }

    #[test]
    fn test_delta_text_falls_back_to_delta_field() {
        let event = ChatEvent::from_payload(&json!({
            "state": "delta",
            "delta": {"content": [{"type": "text", "text": "hi"}, {"type": "image"}]}
        }))
        .unwrap();
        assert_eq!(event.delta_text(), "hi");
    }

    #[test]
    fn test_extract_text_variants() {
        assert_eq!(
            extract_text(&json!({"content": [
                {"type": "text", "text": "a"},
                {"type": "tool_use"},
                {"type": "text", "text": "b"}
            ]})),
            "a\nb"
        );
        assert_eq!(extract_text(&json!({"content": "plain"})), "plain");
        assert_eq!(extract_text(&json!({"role": "user"})), "");
    }

    #[test]
    fn test_streaming_reply_accumulates_until_final() {
        let mut reply = StreamingReply::new();
        assert_eq!(reply.apply(&delta("Hel")), ReplyUpdate::Delta("Hel".into()));
        assert_eq!(reply.apply(&delta("lo")), ReplyUpdate::Delta("lo".into()));
        assert_eq!(reply.text(), "Hello");
        assert_eq!(reply.run_id(), Some("run-1"));

        let done = ChatEvent::from_payload(&json!({
            "state": "final",
            "sessionKey": "main",
            "message": {"role": "assistant", "content": [{"type": "text", "text": "Hello!"}]}
        }))
        .unwrap();
        assert_eq!(reply.apply(&done), ReplyUpdate::Final("Hello!".into()));
        assert!(!reply.is_streaming());
    }

    #[test]
    fn test_final_without_message_uses_streamed_text() {
        let mut reply = StreamingReply::new();
        reply.apply(&delta("partial"));
        let done = ChatEvent::from_payload(&json!({"state": "final"})).unwrap();
        assert_eq!(reply.apply(&done), ReplyUpdate::Final("partial".into()));
    }

    #[test]
    fn test_error_and_abort_discard_stream() {
        let mut reply = StreamingReply::new();
        reply.apply(&delta("x"));
        let error = ChatEvent::from_payload(&json!({"state": "error"})).unwrap();
        assert_eq!(reply.apply(&error), ReplyUpdate::Failed("Unknown error".into()));
        assert!(!reply.is_streaming());

        reply.apply(&delta("y"));
        let aborted = ChatEvent::from_payload(&json!({"state": "aborted"})).unwrap();
        assert_eq!(reply.apply(&aborted), ReplyUpdate::Aborted);
        assert_eq!(reply.text(), "");
    }
}
