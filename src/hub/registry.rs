//! Central WebSocket Hub - keyed connection registry and broadcaster
//!
//! The Hub keeps two indices behind one lock:
//! - forward: key -> connections currently holding that key
//! - reverse: connection -> its current key list
//!
//! Keys are opaque strings. Every mutation touches both indices (and the
//! connection's own key cache) under the write lock, so no reader ever sees
//! them disagree. A key whose bucket empties is removed, never kept empty.
//!
//! Broadcasts snapshot their targets under the read lock and enqueue
//! outside of it; enqueueing never blocks, so a slow client cannot stall
//! registration.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::logger::{self, LogTag};

use super::connection::{Connection, ConnectionId, EnqueueOutcome};
use super::message::Envelope;
use super::metrics::{HubMetrics, HubMetricsSnapshot};

// ============================================================================
// REGISTRY STATE
// ============================================================================

#[derive(Debug)]
struct Entry {
    connection: Arc<Connection>,
    keys: Vec<String>,
}

#[derive(Debug, Default)]
struct Registry {
    by_key: HashMap<String, HashMap<ConnectionId, Arc<Connection>>>,
    by_connection: HashMap<ConnectionId, Entry>,
}

impl Registry {
    fn attach(&mut self, connection: &Arc<Connection>, keys: &[String]) {
        for key in keys {
            self.by_key
                .entry(key.clone())
                .or_default()
                .insert(connection.id(), Arc::clone(connection));
        }
    }

    fn detach(&mut self, id: ConnectionId, keys: &[String]) {
        for key in keys {
            if let Some(bucket) = self.by_key.get_mut(key) {
                bucket.remove(&id);
                if bucket.is_empty() {
                    self.by_key.remove(key);
                }
            }
        }
    }

    /// Replace a registered connection's keys in place
    fn rekey(&mut self, id: ConnectionId, new_keys: Vec<String>) -> bool {
        let Some(entry) = self.by_connection.remove(&id) else {
            return false;
        };
        self.detach(id, &entry.keys);
        self.attach(&entry.connection, &new_keys);
        entry.connection.set_keys(new_keys.clone());
        self.by_connection.insert(
            id,
            Entry {
                connection: entry.connection,
                keys: new_keys,
            },
        );
        true
    }
}

/// Remove duplicate keys, keeping first-seen order
fn normalize_keys(keys: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::with_capacity(keys.len());
    keys.iter()
        .filter(|key| seen.insert(key.as_str()))
        .cloned()
        .collect()
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Point-in-time copy of both indices (diagnostics and tests)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrySnapshot {
    /// key -> connection ids
    pub keys: BTreeMap<String, BTreeSet<ConnectionId>>,

    /// connection id -> keys, as stored in the reverse index
    pub connections: BTreeMap<ConnectionId, BTreeSet<String>>,

    /// connection id -> keys, as cached on the connection itself
    pub cached_keys: BTreeMap<ConnectionId, BTreeSet<String>>,
}

impl RegistrySnapshot {
    /// Check every registry invariant
    ///
    /// - no empty key bucket
    /// - forward and reverse indices describe the same membership
    /// - each connection's own key cache matches the reverse index
    pub fn is_consistent(&self) -> bool {
        if self.keys.values().any(|ids| ids.is_empty()) {
            return false;
        }

        let mut rebuilt: BTreeMap<String, BTreeSet<ConnectionId>> = BTreeMap::new();
        for (id, keys) in &self.connections {
            for key in keys {
                rebuilt.entry(key.clone()).or_default().insert(*id);
            }
        }

        rebuilt == self.keys && self.cached_keys == self.connections
    }

    /// Keys held by one connection, empty if unregistered
    pub fn keys_of(&self, id: ConnectionId) -> BTreeSet<String> {
        self.connections.get(&id).cloned().unwrap_or_default()
    }
}

// ============================================================================
// HUB
// ============================================================================

/// Connection registry. Construct once, share as `Arc<Hub>`.
#[derive(Debug)]
pub struct Hub {
    registry: RwLock<Registry>,
    metrics: Arc<HubMetrics>,
}

impl Hub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            registry: RwLock::new(Registry::default()),
            metrics: HubMetrics::new(),
        })
    }

    /// Register a connection under `keys`
    ///
    /// Registering an already registered connection replaces its keys.
    /// A connection that was already released (its pumps stopped) is ignored.
    pub fn register(&self, connection: &Arc<Connection>, keys: &[String]) {
        let keys = normalize_keys(keys);
        let id = connection.id();

        let mut registry = self.registry.write();
        if connection.is_released() {
            drop(registry);
            logger::debug(
                LogTag::Hub,
                &format!("Ignoring registration of released connection {}", id),
            );
            return;
        }

        if registry.rekey(id, keys.clone()) {
            drop(registry);
            logger::debug(
                LogTag::Hub,
                &format!("Connection {} re-registered under {:?}", id, keys),
            );
            return;
        }

        registry.attach(connection, &keys);
        connection.set_keys(keys.clone());
        registry.by_connection.insert(
            id,
            Entry {
                connection: Arc::clone(connection),
                keys: keys.clone(),
            },
        );
        let active = registry.by_connection.len();
        drop(registry);

        self.metrics.connection_opened();
        logger::debug(
            LogTag::Hub,
            &format!(
                "Connection {} registered under {:?} (active={})",
                id, keys, active
            ),
        );
    }

    /// Remove a connection from every key it holds
    ///
    /// Returns false (and does nothing) if it was not registered.
    pub fn unregister(&self, connection: &Connection) -> bool {
        let id = connection.id();

        let mut registry = self.registry.write();
        let Some(entry) = registry.by_connection.remove(&id) else {
            return false;
        };
        registry.detach(id, &entry.keys);
        let active = registry.by_connection.len();
        drop(registry);

        self.metrics.connection_closed();
        logger::debug(
            LogTag::Hub,
            &format!("Connection {} unregistered (active={})", id, active),
        );
        true
    }

    /// Atomically replace one connection's keys
    ///
    /// Returns false if the connection is not registered.
    pub fn update_keys_for_connection(&self, connection: &Connection, new_keys: &[String]) -> bool {
        let keys = normalize_keys(new_keys);
        let updated = self.registry.write().rekey(connection.id(), keys);
        if updated {
            self.metrics.rekeyed(1);
        }
        updated
    }

    /// Atomically replace the keys of every connection currently under `old_key`
    ///
    /// Members are resolved under the same write lock that applies the
    /// change. Returns the number of connections rekeyed.
    pub fn update_keys_for_key(&self, old_key: &str, new_keys: &[String]) -> usize {
        let keys = normalize_keys(new_keys);

        let mut registry = self.registry.write();
        let members: Vec<ConnectionId> = match registry.by_key.get(old_key) {
            Some(bucket) => bucket.keys().copied().collect(),
            None => return 0,
        };
        for id in &members {
            registry.rekey(*id, keys.clone());
        }
        drop(registry);

        self.metrics.rekeyed(members.len());
        logger::debug(
            LogTag::Hub,
            &format!(
                "Rekeyed {} connection(s) under '{}' to {:?}",
                members.len(),
                old_key,
                keys
            ),
        );
        members.len()
    }

    /// Enqueue to every connection under `key`
    ///
    /// Returns how many connections were targeted, not how many received.
    pub fn broadcast_to_key(&self, key: &str, envelope: Envelope) -> usize {
        let targets: Vec<Arc<Connection>> = match self.registry.read().by_key.get(key) {
            Some(bucket) => bucket.values().cloned().collect(),
            None => Vec::new(),
        };
        self.deliver(targets, envelope, key)
    }

    /// Enqueue to every registered connection exactly once
    pub fn broadcast_all(&self, envelope: Envelope) -> usize {
        let targets: Vec<Arc<Connection>> = self
            .registry
            .read()
            .by_connection
            .values()
            .map(|entry| Arc::clone(&entry.connection))
            .collect();
        self.deliver(targets, envelope, "*")
    }

    fn deliver(&self, targets: Vec<Arc<Connection>>, envelope: Envelope, label: &str) -> usize {
        if targets.is_empty() {
            return 0;
        }

        let envelope = Arc::new(envelope);
        let mut dropped = 0;
        for connection in &targets {
            if connection.enqueue(Arc::clone(&envelope)) == EnqueueOutcome::Dropped {
                dropped += 1;
                self.metrics.message_dropped();
            }
        }
        self.metrics.broadcast(targets.len());

        logger::debug(
            LogTag::Hub,
            &format!(
                "Broadcast '{}' to {} (targeted={}, dropped={})",
                envelope.kind,
                label,
                targets.len(),
                dropped
            ),
        );
        targets.len()
    }

    pub fn active_connection_count(&self) -> usize {
        self.registry.read().by_connection.len()
    }

    pub fn connections_for_key(&self, key: &str) -> usize {
        self.registry
            .read()
            .by_key
            .get(key)
            .map(|bucket| bucket.len())
            .unwrap_or(0)
    }

    /// Number of connections per key
    pub fn key_counts(&self) -> BTreeMap<String, usize> {
        self.registry
            .read()
            .by_key
            .iter()
            .map(|(key, bucket)| (key.clone(), bucket.len()))
            .collect()
    }

    /// Close every connection and clear the registry (process shutdown)
    ///
    /// Returns how many connections were closed.
    pub fn close_all(&self) -> usize {
        let entries: Vec<Entry> = {
            let mut registry = self.registry.write();
            registry.by_key.clear();
            registry.by_connection.drain().map(|(_, entry)| entry).collect()
        };

        for entry in &entries {
            entry.connection.close();
            self.metrics.connection_closed();
        }

        logger::info(
            LogTag::Hub,
            &format!("Closed {} connection(s)", entries.len()),
        );
        entries.len()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let registry = self.registry.read();

        let keys = registry
            .by_key
            .iter()
            .map(|(key, bucket)| (key.clone(), bucket.keys().copied().collect()))
            .collect();
        let connections = registry
            .by_connection
            .iter()
            .map(|(id, entry)| (*id, entry.keys.iter().cloned().collect()))
            .collect();
        let cached_keys = registry
            .by_connection
            .iter()
            .map(|(id, entry)| (*id, entry.connection.keys().into_iter().collect()))
            .collect();

        RegistrySnapshot {
            keys,
            connections,
            cached_keys,
        }
    }

    pub fn metrics(&self) -> HubMetricsSnapshot {
        self.metrics.snapshot()
    }
}
