//! Error category classification.
//!
//! Categories give callers a coarse view of an error so they can decide
//! whether to retry, re-authenticate or surface the problem to the user.

use std::fmt;

/// High-level categorization of errors for handling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Socket-level failures (no transport, connection lost, upstream down).
    /// Generally transient and retryable.
    Transport,

    /// Handshake or access-gate rejections.
    Auth,

    /// Frames that could not be understood or correlated.
    Protocol,

    /// The gateway answered a request with `ok: false`.
    Server,

    /// Misuse of the client API (duplicate ids, client already shut down).
    Client,

    /// Missing or invalid configuration.
    Configuration,
}

impl ErrorCategory {
    /// Returns true if errors in this category are generally transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Transport)
    }

    /// Short label for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transport => "transport",
            ErrorCategory::Auth => "auth",
            ErrorCategory::Protocol => "protocol",
            ErrorCategory::Server => "server",
            ErrorCategory::Client => "client",
            ErrorCategory::Configuration => "configuration",
        }
    }

    /// Suggested recovery action for this category.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            ErrorCategory::Transport => "Check that the gateway is reachable and try again",
            ErrorCategory::Auth => "Check the configured token, password or access password",
            ErrorCategory::Protocol => "The gateway sent something unexpected; check versions",
            ErrorCategory::Server => "The gateway rejected the request",
            ErrorCategory::Client => "This may be a bug. Please report it if it persists",
            ErrorCategory::Configuration => "Check config.json and environment overrides",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_retryable() {
        assert!(ErrorCategory::Transport.is_retryable());
        assert!(!ErrorCategory::Auth.is_retryable());
        assert!(!ErrorCategory::Protocol.is_retryable());
        assert!(!ErrorCategory::Server.is_retryable());
        assert!(!ErrorCategory::Client.is_retryable());
        assert!(!ErrorCategory::Configuration.is_retryable());
    }

    #[test]
    fn test_category_display() {
        assert_eq!(format!("{}", ErrorCategory::Transport), "transport");
        assert_eq!(format!("{}", ErrorCategory::Configuration), "configuration");
    }

    #[test]
    fn test_category_recovery_hint() {
        assert!(ErrorCategory::Transport.recovery_hint().contains("gateway"));
        assert!(ErrorCategory::Configuration.recovery_hint().contains("config.json"));
    }
}
