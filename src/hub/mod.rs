//! Keyed WebSocket Hub
//!
//! Domain-agnostic fan-out layer: connections register under opaque string
//! keys and receive every envelope broadcast to any key they hold.
//!
//! ## Key Components
//! - `registry`: Central broker with the bidirectional key index
//! - `connection`: Per-socket queue, pumps and lifecycle state
//! - `message`: JSON envelope pushed to clients
//! - `health`: Keepalive timing
//! - `metrics`: Per-connection and hub-wide counters
pub mod connection;
pub mod health;
pub mod message;
pub mod metrics;
pub mod registry;

pub use connection::{
    Connection, ConnectionId, ConnectionSettings, ConnectionState, EnqueueOutcome, OutboundQueue,
};
pub use health::HealthConfig;
pub use message::{Envelope, MessageType};
pub use metrics::{ConnectionMetricsSnapshot, HubMetricsSnapshot};
pub use registry::{Hub, RegistrySnapshot};
