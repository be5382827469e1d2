//! Alert delivery on top of the keyed Hub
//!
//! - `adapter`: identity/role key namespace, registration and refresh
//! - `bridge`: alert queue consumer feeding targeted broadcasts
//! - `listener`: role-membership events triggering refreshes
//! - `collaborators`: contracts for the role directory, queue and event bus
//! - `memory`: in-process implementations of those contracts
pub mod adapter;
pub mod bridge;
pub mod collaborators;
pub mod listener;
pub mod memory;

pub use adapter::{identity_key, role_key, AlertHub};
pub use bridge::{AlertEvent, AlertTarget, QueueBridge, RunningBridge};
pub use collaborators::{
    ConsumerHandle, EventBus, EventHandler, MessageHandler, QueueClient, QueueMessage,
    RoleDirectory,
};
pub use listener::MembershipListener;
pub use memory::{LocalEventBus, MemoryQueue, RoleAssignments, StaticRoleDirectory};
