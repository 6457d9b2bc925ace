//! Client side of the relay access gate.

use color_eyre::eyre::{bail, eyre};
use color_eyre::Result;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::relay::{hash_password, AuthResponse};

#[derive(Debug, Deserialize)]
struct Challenge {
    nonce: String,
}

/// Run the challenge/response exchange against a relay at `base_url`.
///
/// Returns the ticket to present on the relay upgrade, or `None` when the
/// relay has no access password.
pub async fn obtain_ticket(
    http: &reqwest::Client,
    base_url: &str,
    password: &str,
) -> Result<Option<String>> {
    let base = base_url.trim_end_matches('/');

    let response = http
        .get(format!("{}/api/auth/challenge", base))
        .send()
        .await?;
    if !response.status().is_success() {
        bail!(
            "Failed to get authentication challenge ({})",
            response.status()
        );
    }
    let Challenge { nonce } = response.json().await?;
    debug!("Received access challenge");

    let result: AuthResponse = http
        .post(format!("{}/api/auth", base))
        .json(&json!({ "hash": hash_password(password, &nonce), "nonce": nonce }))
        .send()
        .await?
        .json()
        .await?;

    if !result.success {
        return Err(eyre!(result
            .message
            .unwrap_or_else(|| "Invalid access password".to_string())));
    }
    Ok(result.ticket)
}

/// Append `ticket` to a relay URL as a query parameter.
pub fn with_ticket(url: &str, ticket: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}ticket={}", url, separator, urlencoding::encode(ticket))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_ticket() {
        assert_eq!(with_ticket("ws://h/ws", "abc"), "ws://h/ws?ticket=abc");
        assert_eq!(with_ticket("ws://h/ws?x=1", "a b"), "ws://h/ws?x=1&ticket=a%20b");
    }
}
