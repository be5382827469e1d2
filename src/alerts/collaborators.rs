//! Contracts for the external systems the alert subsystem depends on
//!
//! - `RoleDirectory`: which roles an identity currently holds
//! - `QueueClient` / `ConsumerHandle`: inbound alert events
//! - `EventBus`: domain events announced by business operations
//!
//! Implementations live outside this crate; `memory` provides in-process
//! versions for local runs and tests.
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

/// One message delivered by a queue client
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    /// Queue the message was consumed from
    pub queue: String,

    /// Raw body (JSON for the alert queue)
    pub body: Vec<u8>,
}

impl QueueMessage {
    pub fn new(queue: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            queue: queue.into(),
            body: body.into(),
        }
    }

    /// Build a message whose body is `value` serialized as JSON
    pub fn json<T: serde::Serialize>(queue: impl Into<String>, value: &T) -> serde_json::Result<Self> {
        Ok(Self::new(queue, serde_json::to_vec(value)?))
    }
}

/// Callback invoked once per consumed queue message
pub type MessageHandler = Arc<dyn Fn(QueueMessage) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Callback invoked with the event data of a domain event
pub type EventHandler =
    Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Role-membership query service
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    /// Current role ids of `identity` (empty if it holds none)
    async fn roles_for_identity(&self, identity: &str) -> anyhow::Result<Vec<String>>;
}

/// Running consumption started by `QueueClient::consume`
#[async_trait]
pub trait ConsumerHandle: Send {
    /// Stop consuming; returns once no handler call is in flight
    async fn stop(&mut self);
}

/// Message-queue client
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Start delivering messages of `queue` to `handler`
    ///
    /// Redelivery of messages whose handler failed is the client's concern.
    async fn consume(
        &self,
        queue: &str,
        handler: MessageHandler,
    ) -> anyhow::Result<Box<dyn ConsumerHandle>>;
}

/// Domain event bus used by business operations
pub trait EventBus: Send + Sync {
    /// Subscribe `handler` to `action` events of `domain`
    fn register(&self, domain: &str, action: &str, handler: EventHandler);
}
