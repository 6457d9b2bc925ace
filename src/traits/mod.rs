//! Trait abstractions for dependency injection and testability.
//!
//! # Traits
//!
//! - [`GatewayConnector`] - Opens WebSocket transports for the gateway session

pub mod transport;

pub use transport::{
    transport_channel, GatewayConnector, TransportCommand, TransportEvent, TransportHandle,
    TransportPeer,
};
