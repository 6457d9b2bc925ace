//! Transparent WebSocket relay between browsers and an internal gateway.
//!
//! The relay never parses the frames it forwards; protocol handling stays
//! between the browser client and the gateway.

pub mod access;
pub mod pairing;
pub mod server;

pub use access::{hash_password, AccessDenied, AccessGate};
pub use pairing::run_pairing;
pub use server::{
    relay_router, serve_until_shutdown, start_relay_server_on, AuthResponse, RelayState,
};
