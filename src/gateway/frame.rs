//! Wire frames exchanged with the gateway.
//!
//! Every message on the gateway socket is a JSON object tagged by `type`:
//! `req`, `res`, `event` or `hello-ok`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::GatewayError;

/// Close code for an intentional disconnect. Suppresses auto-reconnect.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code reported when the socket dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Close code the relay sends when the upstream gateway fails.
pub const CLOSE_UPSTREAM_FAILED: u16 = 1011;
/// Close code the client sends when the handshake is rejected.
pub const CLOSE_AUTH_FAILED: u16 = 4008;

/// Fallback message when a failed response carries no error text.
pub const REQUEST_FAILED_FALLBACK: &str = "Request failed";

/// A decoded gateway frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    #[serde(rename = "req")]
    Request(RequestFrame),
    #[serde(rename = "res")]
    Response(ResponseFrame),
    #[serde(rename = "event")]
    Event(EventFrame),
    /// Server greeting; the whole object is surfaced as the `hello` event.
    #[serde(rename = "hello-ok")]
    HelloOk(Map<String, Value>),
}

/// Outgoing request: `{type:"req", id, method, params}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl RequestFrame {
    /// Build a request with a freshly generated id.
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            id: generate_id(),
            method: method.into(),
            params,
        }
    }

    /// Build a request with a caller-chosen id.
    pub fn with_id(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// Response to a request: `{type:"res", id, ok, payload?, error?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: String,
    #[serde(default)]
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ResponseFrame {
    pub fn ok(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(ErrorShape {
                message: Some(message.into()),
                code: None,
            }),
        }
    }

    /// Server-supplied error message, or the generic fallback.
    pub fn error_message(&self) -> String {
        self.error
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| REQUEST_FAILED_FALLBACK.to_string())
    }

    /// Convert a failed response into the error handed to the caller.
    pub fn into_error(self) -> GatewayError {
        let message = self.error_message();
        GatewayError::RequestFailed {
            message,
            code: self.error.and_then(|e| e.code),
        }
    }
}

/// Structured cause attached to a failed response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorShape {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Server-pushed event: `{type:"event", event, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

/// Encode a frame as JSON text.
pub fn encode(frame: &Frame) -> Result<String, GatewayError> {
    Ok(serde_json::to_string(frame)?)
}

/// Decode JSON text into a frame.
///
/// Fails with [`GatewayError::MalformedFrame`] when the text is not JSON or
/// its `type` is missing or unknown.
pub fn decode(text: &str) -> Result<Frame, GatewayError> {
    serde_json::from_str(text).map_err(|e| GatewayError::MalformedFrame(e.to_string()))
}

/// Generate a request identifier.
pub fn generate_id() -> String {
    format!("req_{}", Uuid::new_v4().simple())
}

/// Generate an idempotency key for `chat.send`.
pub fn generate_idempotency_key() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_request_shape() {
        let frame = Frame::Request(RequestFrame::with_id(
            "req_1",
            "chat.history",
            json!({"sessionKey": "main", "limit": 50}),
        ));
        let text = encode(&frame).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["type"], "req");
        assert_eq!(value["id"], "req_1");
        assert_eq!(value["method"], "chat.history");
        assert_eq!(value["params"]["limit"], 50);
    }

    #[test]
    fn test_decode_response_ok() {
        let frame = decode(r#"{"type":"res","id":"req_2","ok":true,"payload":{"messages":[]}}"#)
            .unwrap();
        match frame {
            Frame::Response(res) => {
                assert_eq!(res.id, "req_2");
                assert!(res.ok);
                assert_eq!(res.payload, Some(json!({"messages": []})));
                assert!(res.error.is_none());
            }
            other => panic!("Expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_response_error_message() {
        let frame =
            decode(r#"{"type":"res","id":"x","ok":false,"error":{"message":"bad token"}}"#)
                .unwrap();
        let Frame::Response(res) = frame else {
            panic!("Expected response");
        };
        assert_eq!(res.error_message(), "bad token");
        assert_eq!(
            res.into_error(),
            GatewayError::RequestFailed {
                message: "bad token".to_string(),
                code: None
            }
        );
    }

    #[test]
    fn test_failed_response_without_message_uses_fallback() {
        let frame = decode(r#"{"type":"res","id":"x","ok":false}"#).unwrap();
        let Frame::Response(res) = frame else {
            panic!("Expected response");
        };
        assert_eq!(res.error_message(), "Request failed");
    }

    #[test]
    fn test_decode_event() {
        let frame =
            decode(r#"{"type":"event","event":"connect.challenge","payload":{"nonce":"abc"}}"#)
                .unwrap();
        assert_eq!(
            frame,
            Frame::Event(EventFrame::new("connect.challenge", json!({"nonce": "abc"})))
        );
    }

    #[test]
    fn test_decode_hello_ok_keeps_fields() {
        let frame = decode(r#"{"type":"hello-ok","protocol":3,"server":"gw"}"#).unwrap();
        let Frame::HelloOk(fields) = frame else {
            panic!("Expected hello-ok");
        };
        assert_eq!(fields.get("protocol"), Some(&json!(3)));
        assert_eq!(fields.get("server"), Some(&json!("gw")));
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        assert!(matches!(
            decode("not json"),
            Err(GatewayError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_or_missing_type() {
        assert!(matches!(
            decode(r#"{"type":"bogus","id":"1"}"#),
            Err(GatewayError::MalformedFrame(_))
        ));
        assert!(matches!(
            decode(r#"{"id":"1","ok":true}"#),
            Err(GatewayError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let ids: std::collections::HashSet<String> = (0..1000).map(|_| generate_id()).collect();
        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|id| id.starts_with("req_")));
    }

    #[test]
    fn test_idempotency_key_differs_from_request_id() {
        let key = generate_idempotency_key();
        assert!(!key.starts_with("req_"));
        assert_ne!(key, generate_idempotency_key());
    }
}
