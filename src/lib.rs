//! OpenGloves - gateway session client and WebSocket relay
//!
//! - [`gateway`] speaks the gateway's framed JSON protocol: handshake,
//!   request/response correlation, server events and reconnection.
//! - [`relay`] pairs browser WebSockets with an internal gateway socket
//!   and copies frames between them untouched.
//!
//! This library exposes modules for use in integration tests.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod relay;
pub mod traits;
