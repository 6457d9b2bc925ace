//! Gateway session protocol client.
//!
//! - [`frame`] - wire frames and their JSON codec
//! - [`pending`] - request/response correlation
//! - [`events`] - server event pub/sub
//! - [`client`] - the session state machine and its handle
//! - [`methods`] - typed builders for the requests the client sends
//! - [`chat`] - typed `chat` events and streaming reply assembly

pub mod chat;
pub mod client;
pub mod events;
pub mod frame;
pub mod methods;
pub mod options;
pub mod pending;

pub use chat::{ChatEvent, ChatState, ReplyUpdate, StreamingReply};
pub use client::{
    CloseInfo, GatewayClient, GatewayClientBuilder, SessionState, SessionStatus,
};
pub use events::{EventDispatcher, EventHandler, HandlerId, SharedDispatcher};
pub use frame::{EventFrame, Frame, RequestFrame, ResponseFrame};
pub use methods::SessionsListParams;
pub use options::{reconnect_delay, ClientOptions};
pub use pending::PendingRequests;
