//! # termbridge-session
//!
//! Session bridge for termbridge.
//!
//! This crate provides:
//! - The [`Transport`] and [`ConnectionFactory`] seams and explicit event
//!   [`Subscription`]s
//! - The [`SessionBridge`] state machine with its single teardown path
//! - An async driver ([`spawn_session`]) and the host's [`SessionHandle`]
//! - Transports: an in-process pair ([`MemoryTransport`] / [`RemotePeer`])
//!   and a WebSocket client ([`WsConnector`])
//!
//! ## Architecture
//!
//! This is Layer 2 in the architecture - it depends on termbridge-core
//! and termbridge-surface and owns everything that talks to the network.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bridge;
pub mod driver;
pub mod memory;
pub mod transport;
pub mod ws;

// Re-export commonly used types
pub use bridge::{BridgeEvent, BridgeStats, SessionBridge, SessionOptions};
pub use driver::{spawn_session, SessionHandle, SessionReport, SessionSnapshot};
pub use memory::{MemoryConnector, MemoryTransport, RemotePeer};
pub use transport::{
    ConnectionFactory, EventHub, ReadyState, Subscription, Transport, TransportEvent,
};
pub use ws::{WsConnector, WsTransport};
