//! Error types for the gateway client, relay and configuration.
//!
//! | Error | Raised by | Surfaced as |
//! |-------|-----------|-------------|
//! | [`GatewayError::MalformedFrame`] | frame decoding | logged, frame dropped |
//! | [`GatewayError::UnknownResponse`] | correlation | logged, frame dropped |
//! | [`GatewayError::AuthenticationFailed`] | handshake | close code 4008 |
//! | [`GatewayError::TransportUnavailable`] | `send_request` | that request only |
//! | [`GatewayError::ConnectionClosed`] | transport close | every pending request |
//! | [`RelayError::UpstreamUnavailable`] | relay dial/forward | inbound closed with 1011 |
//!
//! Each error maps onto an [`ErrorCategory`] so callers can decide whether
//! retrying makes sense.

mod category;
mod config;
mod gateway;
mod relay;

pub use category::ErrorCategory;
pub use config::ConfigError;
pub use gateway::GatewayError;
pub use relay::RelayError;

/// Result alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn test_only_transport_errors_are_retryable() {
        let retryable: Vec<ErrorCategory> = vec![
            GatewayError::TransportUnavailable.category(),
            GatewayError::ConnectionClosed {
                code: 1006,
                reason: String::new(),
            }
            .category(),
            RelayError::UpstreamUnavailable {
                url: "ws://localhost:18789".to_string(),
                message: "refused".to_string(),
            }
            .category(),
        ];
        for category in retryable {
            assert!(category.is_retryable(), "{} should be retryable", category);
        }

        let permanent: Vec<ErrorCategory> = vec![
            GatewayError::AuthenticationFailed("nope".to_string()).category(),
            GatewayError::MalformedFrame("bad".to_string()).category(),
            ConfigError::Invalid {
                field: "gateway.url",
                message: "empty".to_string(),
            }
            .category(),
        ];
        for category in permanent {
            assert!(!category.is_retryable(), "{} should not be retryable", category);
        }
    }

    #[test]
    fn test_error_codes_are_distinct() {
        use std::collections::HashSet;

        let codes: HashSet<&'static str> = [
            GatewayError::MalformedFrame(String::new()).error_code(),
            GatewayError::UnknownResponse { id: String::new() }.error_code(),
            GatewayError::AuthenticationFailed(String::new()).error_code(),
            GatewayError::TransportUnavailable.error_code(),
            GatewayError::ConnectionClosed {
                code: 1000,
                reason: String::new(),
            }
            .error_code(),
            GatewayError::RequestFailed {
                message: String::new(),
                code: None,
            }
            .error_code(),
            GatewayError::DuplicateRequestId(String::new()).error_code(),
            GatewayError::ClientShutdown.error_code(),
        ]
        .into_iter()
        .collect();

        assert_eq!(codes.len(), 8);
    }
}
