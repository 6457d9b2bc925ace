//! Concrete implementations of trait abstractions.
//!
//! # Adapters
//!
//! - [`TungsteniteConnector`] - WebSocket transport using tokio-tungstenite
//!
//! # Mock Implementations
//!
//! - [`mock::MockConnector`] - Scripted sockets for session tests

pub mod mock;
pub mod tungstenite_ws;

pub use mock::{MockConnector, MockTransport};
pub use tungstenite_ws::TungsteniteConnector;
