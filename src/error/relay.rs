//! Errors raised by the relay server.

use thiserror::Error;

use super::category::ErrorCategory;

#[derive(Debug, Error)]
pub enum RelayError {
    /// The internal gateway could not be dialed, or failed mid-pairing.
    #[error("Upstream unavailable at '{url}': {message}")]
    UpstreamUnavailable { url: String, message: String },

    /// The listener could not be bound.
    #[error("Failed to bind relay listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server stopped with an error.
    #[error("Relay server error: {0}")]
    Serve(#[from] std::io::Error),
}

impl RelayError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::UpstreamUnavailable { .. } => ErrorCategory::Transport,
            RelayError::Bind { .. } => ErrorCategory::Configuration,
            RelayError::Serve(_) => ErrorCategory::Transport,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RelayError::UpstreamUnavailable { .. } => "E_RELAY_UPSTREAM",
            RelayError::Bind { .. } => "E_RELAY_BIND",
            RelayError::Serve(_) => "E_RELAY_SERVE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_unavailable_display() {
        let err = RelayError::UpstreamUnavailable {
            url: "ws://127.0.0.1:18789".to_string(),
            message: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Upstream unavailable at 'ws://127.0.0.1:18789': connection refused"
        );
        assert_eq!(err.category(), ErrorCategory::Transport);
        assert_eq!(err.error_code(), "E_RELAY_UPSTREAM");
    }

    #[test]
    fn test_bind_error_is_configuration() {
        let err = RelayError::Bind {
            addr: "0.0.0.0:80".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(err.to_string().contains("0.0.0.0:80"));
    }
}
