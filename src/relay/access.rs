//! Access gate for the relay.
//!
//! A browser proves it knows the access password without sending it:
//! it fetches a one-time nonce, posts `hex(sha256(password + nonce))`,
//! and receives a one-time ticket to present on the relay upgrade.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Why a `/api/auth` attempt was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessDenied {
    #[error("Invalid or expired challenge")]
    UnknownNonce,
    #[error("Invalid or expired challenge")]
    Expired,
    #[error("Invalid access password")]
    WrongPassword,
}

/// Challenges kept at once; the one closest to expiry is dropped to make room.
pub const MAX_OUTSTANDING_NONCES: usize = 1024;

fn digest(password: &str, nonce: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(nonce.as_bytes());
    hasher.finalize().into()
}

/// `hex(sha256(password + nonce))`.
pub fn hash_password(password: &str, nonce: &str) -> String {
    hex::encode(digest(password, nonce))
}

/// Compare a hex hash from a client against the expected digest in constant time.
fn hash_matches(hash: &str, expected: &[u8; 32]) -> bool {
    match hex::decode(hash) {
        Ok(bytes) => bool::from(bytes.as_slice().ct_eq(expected.as_slice())),
        Err(_) => false,
    }
}

/// Outstanding nonces and tickets, each usable once before its deadline.
pub struct AccessGate {
    password: Option<String>,
    ttl: Duration,
    nonces: Mutex<HashMap<String, Instant>>,
    tickets: Mutex<HashMap<String, Instant>>,
}

impl AccessGate {
    /// A gate; `None` or an empty password disables it.
    pub fn new(password: Option<String>, ttl: Duration) -> Self {
        Self {
            password: password.filter(|p| !p.is_empty()),
            ttl,
            nonces: Mutex::new(HashMap::new()),
            tickets: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.password.is_some()
    }

    /// Issue a fresh nonce.
    pub fn issue_challenge(&self) -> String {
        let nonce = Uuid::new_v4().simple().to_string();
        let mut nonces = lock(&self.nonces);
        purge_expired(&mut nonces);
        if nonces.len() >= MAX_OUTSTANDING_NONCES {
            evict_oldest(&mut nonces);
        }
        nonces.insert(nonce.clone(), Instant::now() + self.ttl);
        debug!("Issued access challenge ({} outstanding)", nonces.len());
        nonce
    }

    /// Check a hashed password against a nonce, consuming the nonce.
    ///
    /// Returns a ticket when the gate is enabled, `None` when it is open.
    pub fn verify(&self, hash: &str, nonce: &str) -> Result<Option<String>, AccessDenied> {
        let deadline = lock(&self.nonces)
            .remove(nonce)
            .ok_or(AccessDenied::UnknownNonce)?;
        if Instant::now() >= deadline {
            return Err(AccessDenied::Expired);
        }

        let Some(password) = self.password.as_deref() else {
            return Ok(None);
        };
        if !hash_matches(hash, &digest(password, nonce)) {
            warn!("Rejected access attempt with wrong password");
            return Err(AccessDenied::WrongPassword);
        }

        let ticket = Uuid::new_v4().simple().to_string();
        let mut tickets = lock(&self.tickets);
        purge_expired(&mut tickets);
        tickets.insert(ticket.clone(), Instant::now() + self.ttl);
        Ok(Some(ticket))
    }

    /// Consume a ticket. True if it was issued, unused and unexpired.
    pub fn redeem_ticket(&self, ticket: &str) -> bool {
        match lock(&self.tickets).remove(ticket) {
            Some(deadline) => Instant::now() < deadline,
            None => false,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn purge_expired(entries: &mut HashMap<String, Instant>) {
    let now = Instant::now();
    entries.retain(|_, deadline| *deadline > now);
}

fn evict_oldest(entries: &mut HashMap<String, Instant>) {
    let oldest = entries
        .iter()
        .min_by_key(|(_, deadline)| **deadline)
        .map(|(key, _)| key.clone());
    if let Some(key) = oldest {
        debug!("Challenge limit reached, dropping oldest nonce");
        entries.remove(&key);
    }
}
