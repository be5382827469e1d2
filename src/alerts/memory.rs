//! In-process collaborators
//!
//! Single-process stand-ins for the external queue, event bus and role
//! directory. The binary uses them when no external system is wired in, and
//! the tests use them to drive the subsystem end to end.
use anyhow::Context;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::MembershipConfig;
use crate::logger::{self, LogTag};

use super::collaborators::{
    ConsumerHandle, EventBus, EventHandler, MessageHandler, QueueClient, QueueMessage,
    RoleDirectory,
};
use super::listener::membership_event;

// ============================================================================
// MEMORY QUEUE
// ============================================================================

#[derive(Debug)]
struct QueueSlot {
    sender: mpsc::UnboundedSender<QueueMessage>,
    /// `None` while a consumer owns the receiving end
    receiver: Option<mpsc::UnboundedReceiver<QueueMessage>>,
}

impl QueueSlot {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Some(receiver),
        }
    }
}

type QueueSlots = Arc<Mutex<HashMap<String, QueueSlot>>>;

/// Unbounded in-memory queue, one consumer per queue name
///
/// Messages published before a consumer starts are buffered. Stopping a
/// consumer hands undelivered messages back to the queue.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    slots: QueueSlots,
    unavailable: AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn publish(&self, message: QueueMessage) -> anyhow::Result<()> {
        let mut slots = self.slots.lock();
        let slot = slots
            .entry(message.queue.clone())
            .or_insert_with(QueueSlot::new);
        slot.sender
            .send(message)
            .map_err(|e| anyhow::anyhow!("queue '{}' is closed", e.0.queue))
    }

    /// Make subsequent `consume` calls fail (broker outage)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Whether `queue` currently has a running consumer
    pub fn has_consumer(&self, queue: &str) -> bool {
        self.slots
            .lock()
            .get(queue)
            .map(|slot| slot.receiver.is_none())
            .unwrap_or(false)
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    async fn consume(
        &self,
        queue: &str,
        handler: MessageHandler,
    ) -> anyhow::Result<Box<dyn ConsumerHandle>> {
        if self.unavailable.load(Ordering::SeqCst) {
            anyhow::bail!("queue broker unavailable");
        }

        let mut receiver = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(queue.to_string()).or_insert_with(QueueSlot::new);
            slot.receiver
                .take()
                .with_context(|| format!("queue '{}' already has a consumer", queue))?
        };

        let token = CancellationToken::new();
        let task_token = token.clone();
        let queue_name = queue.to_string();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    message = receiver.recv() => match message {
                        Some(message) => {
                            if let Err(e) = handler(message).await {
                                logger::debug(
                                    LogTag::Bridge,
                                    &format!("Queue '{}' handler rejected message: {}", queue_name, e),
                                );
                            }
                        }
                        None => break,
                    }
                }
            }
            receiver
        });

        Ok(Box::new(MemoryConsumer {
            queue: queue.to_string(),
            slots: Arc::clone(&self.slots),
            token,
            task: Some(task),
        }))
    }
}

struct MemoryConsumer {
    queue: String,
    slots: QueueSlots,
    token: CancellationToken,
    task: Option<JoinHandle<mpsc::UnboundedReceiver<QueueMessage>>>,
}

#[async_trait]
impl ConsumerHandle for MemoryConsumer {
    async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        self.token.cancel();

        match task.await {
            Ok(receiver) => {
                if let Some(slot) = self.slots.lock().get_mut(&self.queue) {
                    slot.receiver = Some(receiver);
                }
            }
            Err(e) => logger::error(
                LogTag::Bridge,
                &format!("Consumer task for queue '{}' failed: {}", self.queue, e),
            ),
        }
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

// ============================================================================
// LOCAL EVENT BUS
// ============================================================================

/// Domain event bus dispatching to handlers in registration order
#[derive(Default)]
pub struct LocalEventBus {
    handlers: RwLock<HashMap<(String, String), Vec<EventHandler>>>,
}

impl LocalEventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn handler_count(&self, domain: &str, action: &str) -> usize {
        self.handlers
            .read()
            .get(&(domain.to_string(), action.to_string()))
            .map(|handlers| handlers.len())
            .unwrap_or(0)
    }

    /// Run every handler subscribed to `domain`/`action`
    ///
    /// The first handler error is returned to the emitting operation.
    /// Returns the number of handlers invoked.
    pub async fn emit(
        &self,
        domain: &str,
        action: &str,
        data: serde_json::Value,
    ) -> anyhow::Result<usize> {
        let handlers = self
            .handlers
            .read()
            .get(&(domain.to_string(), action.to_string()))
            .cloned()
            .unwrap_or_default();

        for handler in &handlers {
            handler(data.clone())
                .await
                .with_context(|| format!("{}.{} handler failed", domain, action))?;
        }
        Ok(handlers.len())
    }
}

impl EventBus for LocalEventBus {
    fn register(&self, domain: &str, action: &str, handler: EventHandler) {
        self.handlers
            .write()
            .entry((domain.to_string(), action.to_string()))
            .or_default()
            .push(handler);
        logger::debug(
            LogTag::Listener,
            &format!("Handler registered for {}.{}", domain, action),
        );
    }
}

// ============================================================================
// STATIC ROLE DIRECTORY
// ============================================================================

/// Role directory held in memory
#[derive(Debug, Default)]
pub struct StaticRoleDirectory {
    roles: RwLock<HashMap<String, BTreeSet<String>>>,
    failing: AtomicBool,
    latency: Mutex<Duration>,
    lookups: AtomicU64,
}

impl StaticRoleDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Directory pre-populated with identity -> roles
    pub fn from_seed(seed: &HashMap<String, Vec<String>>) -> Arc<Self> {
        let directory = Self::default();
        {
            let mut roles = directory.roles.write();
            for (identity, granted) in seed {
                roles
                    .entry(identity.clone())
                    .or_default()
                    .extend(granted.iter().cloned());
            }
        }
        Arc::new(directory)
    }

    /// Returns false if the identity already held the role
    pub fn grant(&self, identity: &str, role: &str) -> bool {
        self.roles
            .write()
            .entry(identity.to_string())
            .or_default()
            .insert(role.to_string())
    }

    /// Returns false if the identity did not hold the role
    pub fn revoke(&self, identity: &str, role: &str) -> bool {
        let mut roles = self.roles.write();
        let Some(held) = roles.get_mut(identity) else {
            return false;
        };
        let removed = held.remove(role);
        if held.is_empty() {
            roles.remove(identity);
        }
        removed
    }

    /// Make lookups fail (directory outage)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay applied to every lookup
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Number of lookups answered or failed so far
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RoleDirectory for StaticRoleDirectory {
    async fn roles_for_identity(&self, identity: &str) -> anyhow::Result<Vec<String>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("role directory unavailable");
        }

        Ok(self
            .roles
            .read()
            .get(identity)
            .map(|roles| roles.iter().cloned().collect())
            .unwrap_or_default())
    }
}

// ============================================================================
// ROLE ASSIGNMENTS
// ============================================================================

/// Business operation that grants and revokes roles
///
/// The directory change is applied first, then the membership event is
/// emitted on the bus. An error from a subscriber fails the operation.
pub struct RoleAssignments {
    directory: Arc<StaticRoleDirectory>,
    bus: Arc<LocalEventBus>,
    config: MembershipConfig,
}

impl RoleAssignments {
    pub fn new(
        directory: Arc<StaticRoleDirectory>,
        bus: Arc<LocalEventBus>,
        config: MembershipConfig,
    ) -> Self {
        Self {
            directory,
            bus,
            config,
        }
    }

    pub async fn grant(&self, identity: &str, role: &str) -> anyhow::Result<bool> {
        if !self.directory.grant(identity, role) {
            return Ok(false);
        }
        self.bus
            .emit(
                &self.config.domain,
                &self.config.created_action,
                membership_event(identity, role),
            )
            .await?;
        Ok(true)
    }

    pub async fn revoke(&self, identity: &str, role: &str) -> anyhow::Result<bool> {
        if !self.directory.revoke(identity, role) {
            return Ok(false);
        }
        self.bus
            .emit(
                &self.config.domain,
                &self.config.deleted_action,
                membership_event(identity, role),
            )
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn counting_handler(counter: Arc<AtomicU64>) -> MessageHandler {
        Arc::new(move |_message: QueueMessage| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        })
    }

    async fn wait_for(counter: &AtomicU64, expected: u64) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while counter.load(Ordering::SeqCst) < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_queue_buffers_until_consumed() {
        let queue = MemoryQueue::new();
        queue.publish(QueueMessage::new("alerts", "one")).unwrap();
        queue.publish(QueueMessage::new("alerts", "two")).unwrap();

        let counter = Arc::new(AtomicU64::new(0));
        let mut handle = queue
            .consume("alerts", counting_handler(Arc::clone(&counter)))
            .await
            .unwrap();
        wait_for(&counter, 2).await;

        assert!(queue.has_consumer("alerts"));
        handle.stop().await;
        assert!(!queue.has_consumer("alerts"));
    }

    #[tokio::test]
    async fn test_queue_single_consumer() {
        let queue = MemoryQueue::new();
        let counter = Arc::new(AtomicU64::new(0));
        let mut first = queue
            .consume("alerts", counting_handler(Arc::clone(&counter)))
            .await
            .unwrap();

        let second = queue.consume("alerts", counting_handler(Arc::clone(&counter))).await;
        assert!(second.is_err());

        first.stop().await;
        first.stop().await;
        assert!(queue.consume("alerts", counting_handler(counter)).await.is_ok());
    }

    #[tokio::test]
    async fn test_stopped_consumer_keeps_pending_messages() {
        let queue = MemoryQueue::new();
        let counter = Arc::new(AtomicU64::new(0));
        let mut handle = queue
            .consume("alerts", counting_handler(Arc::clone(&counter)))
            .await
            .unwrap();
        handle.stop().await;

        queue.publish(QueueMessage::new("alerts", "late")).unwrap();
        let mut handle = queue
            .consume("alerts", counting_handler(Arc::clone(&counter)))
            .await
            .unwrap();
        wait_for(&counter, 1).await;
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_unavailable_queue() {
        let queue = MemoryQueue::new();
        queue.set_unavailable(true);
        let result = queue
            .consume("alerts", counting_handler(Arc::new(AtomicU64::new(0))))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_event_bus_dispatch_and_errors() {
        let bus = LocalEventBus::new();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        bus.register(
            "role_membership",
            "created",
            Arc::new(move |_data: serde_json::Value| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
                .boxed()
            }),
        );

        let invoked = bus
            .emit("role_membership", "created", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(invoked, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(
            bus.emit("role_membership", "deleted", serde_json::json!({})).await.unwrap(),
            0
        );

        bus.register(
            "role_membership",
            "created",
            Arc::new(|_data: serde_json::Value| {
                async { Err::<(), _>(anyhow::anyhow!("boom")) }.boxed()
            }),
        );
        assert!(bus
            .emit("role_membership", "created", serde_json::json!({}))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_role_directory() {
        let mut seed = HashMap::new();
        seed.insert("u1".to_string(), vec!["admin".to_string(), "clerk".to_string()]);
        let directory = StaticRoleDirectory::from_seed(&seed);

        assert_eq!(directory.roles_for_identity("u1").await.unwrap(), vec!["admin", "clerk"]);
        assert!(directory.roles_for_identity("u2").await.unwrap().is_empty());

        assert!(directory.revoke("u1", "admin"));
        assert!(!directory.revoke("u1", "admin"));
        assert!(directory.grant("u2", "supervisor"));
        assert!(!directory.grant("u2", "supervisor"));
        assert_eq!(directory.roles_for_identity("u2").await.unwrap(), vec!["supervisor"]);

        directory.set_failing(true);
        assert!(directory.roles_for_identity("u1").await.is_err());
        assert_eq!(directory.lookups(), 4);
    }

    #[tokio::test]
    async fn test_role_assignments_emit_after_change() {
        let directory = StaticRoleDirectory::new();
        let bus = LocalEventBus::new();
        let config = MembershipConfig::default();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let observer_directory = Arc::clone(&directory);
        let observer_seen = Arc::clone(&seen);
        bus.register(
            &config.domain,
            &config.created_action,
            Arc::new(move |data: serde_json::Value| {
                let directory = Arc::clone(&observer_directory);
                let seen = Arc::clone(&observer_seen);
                async move {
                    let roles = directory.roles_for_identity("u1").await?;
                    seen.lock().push((data, roles));
                    Ok(())
                }
                .boxed()
            }),
        );

        let assignments = RoleAssignments::new(Arc::clone(&directory), bus, config);
        assert!(assignments.grant("u1", "admin").await.unwrap());
        assert!(!assignments.grant("u1", "admin").await.unwrap());
        assert!(!assignments.revoke("u1", "clerk").await.unwrap());

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0["identity_id"], "u1");
        assert_eq!(seen[0].1, vec!["admin".to_string()]);
    }
}
