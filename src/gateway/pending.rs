//! Correlation of outstanding requests with their responses.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::frame::ResponseFrame;
use crate::error::GatewayError;

/// Reply channel for a caller waiting on a response.
pub type ResponseSender = oneshot::Sender<Result<ResponseFrame, GatewayError>>;

/// Who is waiting on a pending request.
#[derive(Debug)]
pub enum Completion {
    /// An API caller awaiting the response.
    Caller(ResponseSender),
    /// The session's own `connect` handshake request.
    Handshake,
}

#[derive(Debug)]
pub struct PendingEntry {
    pub method: String,
    pub created_at: Instant,
    pub completion: Completion,
}

/// Outcome of matching a response, for completions the table can't deliver itself.
#[derive(Debug)]
pub enum Resolved {
    /// Delivered to an API caller.
    Delivered,
    /// The handshake response; the session decides what to do with it.
    Handshake(ResponseFrame),
}

/// Pending request table keyed by request id.
///
/// Every entry is removed before it is signalled, so each id resolves
/// exactly once.
#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: HashMap<String, PendingEntry>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request.
    ///
    /// An id that is still pending is rejected and the completion is handed
    /// back so the caller can be told.
    pub fn insert(
        &mut self,
        id: &str,
        method: &str,
        completion: Completion,
    ) -> Result<(), (Completion, GatewayError)> {
        if self.entries.contains_key(id) {
            return Err((completion, GatewayError::DuplicateRequestId(id.to_string())));
        }
        self.entries.insert(
            id.to_string(),
            PendingEntry {
                method: method.to_string(),
                created_at: Instant::now(),
                completion,
            },
        );
        Ok(())
    }

    /// Match a response to its pending entry and resolve it.
    ///
    /// `ok: true` resolves with the full frame; `ok: false` rejects with the
    /// server message. Unknown ids return [`GatewayError::UnknownResponse`].
    pub fn resolve(&mut self, response: ResponseFrame) -> Result<Resolved, GatewayError> {
        let Some(entry) = self.entries.remove(&response.id) else {
            return Err(GatewayError::UnknownResponse { id: response.id });
        };

        debug!(
            "Response for {} ({}) after {:?}",
            response.id,
            entry.method,
            entry.created_at.elapsed()
        );

        match entry.completion {
            Completion::Handshake => Ok(Resolved::Handshake(response)),
            Completion::Caller(tx) => {
                let id = response.id.clone();
                let result = if response.ok {
                    Ok(response)
                } else {
                    Err(response.into_error())
                };
                if tx.send(result).is_err() {
                    debug!("Caller for {} ({}) went away before the response", id, entry.method);
                }
                Ok(Resolved::Delivered)
            }
        }
    }

    /// Remove an entry without resolving it (used when the write fails).
    pub fn remove(&mut self, id: &str) -> Option<PendingEntry> {
        self.entries.remove(id)
    }

    /// Fail every pending request with `ConnectionClosed` and empty the table.
    ///
    /// Returns the number of requests that were failed.
    pub fn fail_all(&mut self, code: u16, reason: &str) -> usize {
        let count = self.entries.len();
        for (id, entry) in self.entries.drain() {
            if let Completion::Caller(tx) = entry.completion {
                let _ = tx.send(Err(GatewayError::ConnectionClosed {
                    code,
                    reason: reason.to_string(),
                }));
            } else {
                warn!("Handshake request {} abandoned: {}", id, reason);
            }
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn caller() -> (
        Completion,
        oneshot::Receiver<Result<ResponseFrame, GatewayError>>,
    ) {
        let (tx, rx) = oneshot::channel();
        (Completion::Caller(tx), rx)
    }

    #[tokio::test]
    async fn test_responses_resolve_matching_entry_out_of_order() {
        let mut pending = PendingRequests::new();
        let (c1, rx1) = caller();
        let (c2, rx2) = caller();
        pending.insert("1", "chat.send", c1).unwrap();
        pending.insert("2", "chat.history", c2).unwrap();

        pending
            .resolve(ResponseFrame::ok("2", json!({"messages": ["m"]})))
            .unwrap();
        pending
            .resolve(ResponseFrame::ok("1", json!({"runId": "r1"})))
            .unwrap();

        let r1 = rx1.await.unwrap().unwrap();
        let r2 = rx2.await.unwrap().unwrap();
        assert_eq!(r1.payload, Some(json!({"runId": "r1"})));
        assert_eq!(r2.payload, Some(json!({"messages": ["m"]})));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_failed_response_rejects_with_server_message() {
        let mut pending = PendingRequests::new();
        let (c, rx) = caller();
        pending.insert("a", "chat.abort", c).unwrap();

        pending
            .resolve(ResponseFrame::failed("a", "nothing to abort"))
            .unwrap();

        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "nothing to abort");
    }

    #[test]
    fn test_unknown_response_is_reported_not_delivered() {
        let mut pending = PendingRequests::new();
        let (c, _rx) = caller();
        pending.insert("known", "sessions.list", c).unwrap();

        let result = pending.resolve(ResponseFrame::ok("stranger", json!({})));
        assert!(matches!(
            result,
            Err(GatewayError::UnknownResponse { ref id }) if id == "stranger"
        ));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_second_response_for_same_id_is_unknown() {
        let mut pending = PendingRequests::new();
        let (c, _rx) = caller();
        pending.insert("once", "chat.send", c).unwrap();

        assert!(pending.resolve(ResponseFrame::ok("once", json!({}))).is_ok());
        assert!(pending.resolve(ResponseFrame::ok("once", json!({}))).is_err());
    }

    #[test]
    fn test_duplicate_pending_id_is_rejected() {
        let mut pending = PendingRequests::new();
        let (c1, _rx1) = caller();
        let (c2, _rx2) = caller();
        pending.insert("dup", "chat.send", c1).unwrap();

        let (returned, err) = pending.insert("dup", "chat.history", c2).unwrap_err();
        assert_eq!(err, GatewayError::DuplicateRequestId("dup".to_string()));
        assert!(matches!(returned, Completion::Caller(_)));
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_fail_all_rejects_every_entry_with_reason() {
        let mut pending = PendingRequests::new();
        let mut receivers = Vec::new();
        for id in ["a", "b", "c"] {
            let (c, rx) = caller();
            pending.insert(id, "chat.send", c).unwrap();
            receivers.push(rx);
        }

        assert_eq!(pending.fail_all(1006, "network error"), 3);
        assert!(pending.is_empty());

        for rx in receivers {
            let err = rx.await.unwrap().unwrap_err();
            assert!(err.to_string().contains("network error"));
        }
    }

    #[test]
    fn test_handshake_completion_is_returned() {
        let mut pending = PendingRequests::new();
        pending.insert("hs", "connect", Completion::Handshake).unwrap();

        let resolved = pending
            .resolve(ResponseFrame::failed("hs", "bad token"))
            .unwrap();
        match resolved {
            Resolved::Handshake(res) => assert!(!res.ok),
            Resolved::Delivered => panic!("Expected handshake completion"),
        }
    }
}
