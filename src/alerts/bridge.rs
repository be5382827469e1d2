//! Queue bridge
//!
//! Consumes the alert queue and turns every message into one targeted
//! broadcast. A bad message is logged and rejected back to the queue client;
//! it never stops the loop.
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::errors::{AlertError, AlertResult};
use crate::hub::{Envelope, MessageType};
use crate::logger::{self, LogTag};

use super::adapter::AlertHub;
use super::collaborators::{ConsumerHandle, MessageHandler, QueueClient, QueueMessage};

/// Who an alert event is addressed to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum AlertTarget {
    Identity { id: String },
    Role { id: String },
    All,
}

impl std::fmt::Display for AlertTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertTarget::Identity { id } => write!(f, "identity {}", id),
            AlertTarget::Role { id } => write!(f, "role {}", id),
            AlertTarget::All => write!(f, "everyone"),
        }
    }
}

fn default_kind() -> String {
    MessageType::Alert.code().to_string()
}

/// Body of an alert queue message
///
/// ```json
/// { "type": "alert", "target": { "scope": "role", "id": "supervisor" }, "payload": { ... } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Envelope type pushed to clients
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,

    pub target: AlertTarget,

    #[serde(default)]
    pub payload: serde_json::Value,
}

impl AlertEvent {
    pub fn new(target: AlertTarget, payload: serde_json::Value) -> Self {
        Self {
            kind: default_kind(),
            target,
            payload,
        }
    }

    pub fn from_slice(body: &[u8]) -> AlertResult<Self> {
        let event: AlertEvent = serde_json::from_slice(body)?;
        match &event.target {
            AlertTarget::Identity { id } | AlertTarget::Role { id } if id.is_empty() => Err(
                AlertError::InvalidEvent(format!("empty target id for {:?}", event.target)),
            ),
            _ => Ok(event),
        }
    }

    fn into_envelope(self) -> (AlertTarget, Envelope) {
        (self.target, Envelope::with_kind(self.kind, self.payload))
    }
}

pub struct QueueBridge {
    alerts: Arc<AlertHub>,
    client: Arc<dyn QueueClient>,
    queue: String,
}

impl QueueBridge {
    pub fn new(alerts: Arc<AlertHub>, client: Arc<dyn QueueClient>, queue: impl Into<String>) -> Self {
        Self {
            alerts,
            client,
            queue: queue.into(),
        }
    }

    /// Deliver one queue message; returns the number of connections targeted
    pub fn deliver(alerts: &AlertHub, message: &QueueMessage) -> AlertResult<usize> {
        let (target, envelope) = AlertEvent::from_slice(&message.body)?.into_envelope();
        let targeted = match &target {
            AlertTarget::Identity { id } => alerts.broadcast_to_identity(id, envelope),
            AlertTarget::Role { id } => alerts.broadcast_to_role(id, envelope),
            AlertTarget::All => alerts.broadcast_to_all(envelope),
        };

        logger::debug(
            LogTag::Bridge,
            &format!("Alert for {} targeted {} connection(s)", target, targeted),
        );
        Ok(targeted)
    }

    fn handler(&self) -> MessageHandler {
        let alerts = Arc::clone(&self.alerts);
        Arc::new(move |message: QueueMessage| {
            let result = Self::deliver(&alerts, &message).map(|_| ()).map_err(|e| {
                logger::warning(
                    LogTag::Bridge,
                    &format!("Failed to deliver message from '{}': {}", message.queue, e),
                );
                anyhow::Error::new(e)
            });
            futures::future::ready(result).boxed()
        })
    }

    /// Start consuming the alert queue
    ///
    /// Fails if the queue client cannot start a consumer.
    pub async fn start(self) -> AlertResult<RunningBridge> {
        let handle = self
            .client
            .consume(&self.queue, self.handler())
            .await
            .map_err(|e| AlertError::queue_setup(&self.queue, e))?;

        logger::info(
            LogTag::Bridge,
            &format!("Consuming alert queue '{}'", self.queue),
        );
        Ok(RunningBridge {
            queue: self.queue,
            handle,
        })
    }

    /// Consume until `cancel` fires, then stop the consumer
    pub async fn run(self, cancel: CancellationToken) -> AlertResult<()> {
        self.start().await?.run(cancel).await;
        Ok(())
    }
}

/// Bridge with a live consumer
pub struct RunningBridge {
    queue: String,
    handle: Box<dyn ConsumerHandle>,
}

impl RunningBridge {
    /// Wait for `cancel`, then stop the consumer before returning
    pub async fn run(mut self, cancel: CancellationToken) {
        cancel.cancelled().await;
        self.handle.stop().await;

        logger::info(
            LogTag::Bridge,
            &format!("Stopped consuming alert queue '{}'", self.queue),
        );
    }
}
