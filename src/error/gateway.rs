//! Errors raised by the gateway session.

use thiserror::Error;

use super::category::ErrorCategory;

/// Failures seen by callers of the gateway client.
///
/// Transport problems never escape the session task directly; they show up
/// here as the rejection of whichever request they affected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// Incoming message was not valid JSON or had no recognised `type`.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Response id did not match any pending request.
    #[error("Unknown response id: {id}")]
    UnknownResponse { id: String },

    /// The gateway rejected the `connect` handshake.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A request was issued while no transport was open.
    #[error("WebSocket not connected")]
    TransportUnavailable,

    /// The connection closed while the request was pending.
    #[error("Connection closed: {reason}")]
    ConnectionClosed { code: u16, reason: String },

    /// The gateway answered with `ok: false`.
    #[error("{message}")]
    RequestFailed {
        message: String,
        code: Option<String>,
    },

    /// A request reused the id of one that is still pending.
    #[error("Request id already pending: {0}")]
    DuplicateRequestId(String),

    /// The session task has stopped.
    #[error("Gateway client has shut down")]
    ClientShutdown,
}

impl GatewayError {
    /// Category used for retry and messaging decisions.
    pub fn category(&self) -> ErrorCategory {
        match self {
            GatewayError::MalformedFrame(_) | GatewayError::UnknownResponse { .. } => {
                ErrorCategory::Protocol
            }
            GatewayError::AuthenticationFailed(_) => ErrorCategory::Auth,
            GatewayError::TransportUnavailable | GatewayError::ConnectionClosed { .. } => {
                ErrorCategory::Transport
            }
            GatewayError::RequestFailed { .. } => ErrorCategory::Server,
            GatewayError::DuplicateRequestId(_) | GatewayError::ClientShutdown => {
                ErrorCategory::Client
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Short error code for logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::MalformedFrame(_) => "E_GW_MALFORMED",
            GatewayError::UnknownResponse { .. } => "E_GW_UNKNOWN_RES",
            GatewayError::AuthenticationFailed(_) => "E_GW_AUTH",
            GatewayError::TransportUnavailable => "E_GW_NOT_CONNECTED",
            GatewayError::ConnectionClosed { .. } => "E_GW_CLOSED",
            GatewayError::RequestFailed { .. } => "E_GW_REQUEST",
            GatewayError::DuplicateRequestId(_) => "E_GW_DUP_ID",
            GatewayError::ClientShutdown => "E_GW_SHUTDOWN",
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::MalformedFrame(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_wire_wording() {
        assert_eq!(
            GatewayError::TransportUnavailable.to_string(),
            "WebSocket not connected"
        );
        assert_eq!(
            GatewayError::ConnectionClosed {
                code: 1006,
                reason: "network error".to_string()
            }
            .to_string(),
            "Connection closed: network error"
        );
        assert_eq!(
            GatewayError::RequestFailed {
                message: "session not found".to_string(),
                code: None
            }
            .to_string(),
            "session not found"
        );
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            GatewayError::MalformedFrame("x".into()).category(),
            ErrorCategory::Protocol
        );
        assert!(GatewayError::TransportUnavailable.is_retryable());
        assert!(!GatewayError::AuthenticationFailed("bad token".into()).is_retryable());
        assert!(!GatewayError::DuplicateRequestId("req_1".into()).is_retryable());
    }

    #[test]
    fn test_json_error_is_malformed_frame() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let gw: GatewayError = err.into();
        assert!(matches!(gw, GatewayError::MalformedFrame(_)));
        assert_eq!(gw.error_code(), "E_GW_MALFORMED");
    }
}
