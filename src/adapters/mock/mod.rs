//! Mock implementations for testing.
//!
//! # Available Mocks
//!
//! - [`MockConnector`] - Gateway connector whose sockets are scripted by the test

pub mod transport;

pub use transport::{MockConnector, MockTransport};
