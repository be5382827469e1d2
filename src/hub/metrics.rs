//! WebSocket metrics collection
//!
//! Per-connection and hub-wide counters for monitoring and debugging.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// CONNECTION METRICS
// ============================================================================

/// Per-connection metrics (thread-safe)
#[derive(Debug, Default)]
pub struct ConnectionMetrics {
    /// Messages accepted into the outbound queue
    messages_enqueued: AtomicU64,

    /// Frames written to the socket
    messages_sent: AtomicU64,

    /// Messages dropped because the outbound queue was full
    messages_dropped: AtomicU64,

    /// Pings written to the socket
    pings_sent: AtomicU64,

    /// Inbound frames read from the socket
    frames_received: AtomicU64,
}

impl ConnectionMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_enqueued(&self) {
        self.messages_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_ping(&self) {
        self.pings_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot for API
    pub fn snapshot(&self) -> ConnectionMetricsSnapshot {
        ConnectionMetricsSnapshot {
            messages_enqueued: self.messages_enqueued.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            pings_sent: self.pings_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot (serializable)
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionMetricsSnapshot {
    pub messages_enqueued: u64,
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub pings_sent: u64,
    pub frames_received: u64,
}

// ============================================================================
// HUB METRICS
// ============================================================================

/// Hub-level metrics (aggregate across all connections)
#[derive(Debug, Default)]
pub struct HubMetrics {
    /// Total connections registered (lifetime)
    total_connections: AtomicU64,

    /// Currently registered connections
    active_connections: AtomicUsize,

    /// Broadcast calls (any target)
    broadcasts: AtomicU64,

    /// Connections targeted across all broadcasts
    deliveries: AtomicU64,

    /// Messages dropped on full outbound queues
    dropped: AtomicU64,

    /// Connections whose key set was replaced
    rekeys: AtomicU64,
}

impl HubMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record new connection
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record connection closed
    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn broadcast(&self, targeted: usize) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.deliveries.fetch_add(targeted as u64, Ordering::Relaxed);
    }

    pub fn message_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rekeyed(&self, count: usize) {
        self.rekeys.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> HubMetricsSnapshot {
        HubMetricsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            rekeys: self.rekeys.load(Ordering::Relaxed),
        }
    }
}

/// Hub metrics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct HubMetricsSnapshot {
    pub total_connections: u64,
    pub active_connections: usize,
    pub broadcasts: u64,
    pub deliveries: u64,
    pub dropped: u64,
    pub rekeys: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_metrics() {
        let metrics = ConnectionMetrics::new();

        metrics.inc_enqueued();
        metrics.inc_enqueued();
        metrics.inc_sent();
        metrics.inc_dropped();
        metrics.inc_ping();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.messages_enqueued, 2);
        assert_eq!(snapshot.messages_sent, 1);
        assert_eq!(snapshot.messages_dropped, 1);
        assert_eq!(snapshot.pings_sent, 1);
        assert_eq!(snapshot.frames_received, 0);
    }

    #[test]
    fn test_hub_metrics() {
        let metrics = HubMetrics::new();

        metrics.connection_opened();
        metrics.connection_opened();
        metrics.broadcast(2);
        metrics.broadcast(1);
        metrics.message_dropped();
        metrics.rekeyed(2);
        metrics.connection_closed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_connections, 2);
        assert_eq!(snapshot.active_connections, 1);
        assert_eq!(snapshot.broadcasts, 2);
        assert_eq!(snapshot.deliveries, 3);
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.rekeys, 2);
    }
}
