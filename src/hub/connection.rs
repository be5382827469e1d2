//! WebSocket connection handler
//!
//! A `Connection` wraps one upgraded socket with:
//! - A bounded outbound queue (drop-newest when full, never blocks the sender)
//! - A one-shot closing signal shared by both pumps
//! - The inbound pump (reads frames, enforces the read deadline)
//! - The outbound pump (drains the queue, sends keepalive pings, owns the
//!   socket close)
//!
//! State only moves forward: Upgraded -> Active -> Closing -> Closed.
//! Whichever pump stops first triggers Closing; Closed is reached once both
//! pumps have returned. Hub unregistration happens exactly once.

use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::config::WebSocketConfig;
use crate::logger::{self, LogTag};

use super::{
    health::{ping_ticker, HealthConfig},
    message::{Envelope, MessageType},
    metrics::{ConnectionMetrics, ConnectionMetricsSnapshot},
    registry::Hub,
};

// ============================================================================
// TYPES
// ============================================================================

/// Connection ID (unique per physical socket for the process lifetime)
pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    Upgraded = 0,
    Active = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Upgraded,
            1 => ConnectionState::Active,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Result of a non-blocking enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Accepted into the outbound queue
    Queued,
    /// Queue full, message dropped
    Dropped,
    /// Connection closing or closed, message discarded
    Closed,
}

/// Per-connection limits
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Outbound queue capacity
    pub outbound_buffer: usize,

    /// Largest inbound text frame accepted before the connection is dropped
    pub max_message_bytes: usize,

    pub health: HealthConfig,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from_config(&WebSocketConfig::default())
    }
}

impl ConnectionSettings {
    pub fn from_config(config: &WebSocketConfig) -> Self {
        Self {
            outbound_buffer: config.outbound_buffer.max(1),
            max_message_bytes: config.max_message_bytes,
            health: HealthConfig::from_config(config),
        }
    }
}

/// Receiving side of a connection's outbound queue
///
/// Handed to `Connection::outbound_pump`, which is its only consumer.
#[derive(Debug)]
pub struct OutboundQueue {
    receiver: mpsc::Receiver<Arc<Envelope>>,
}

impl OutboundQueue {
    pub async fn recv(&mut self) -> Option<Arc<Envelope>> {
        self.receiver.recv().await
    }

    /// Non-blocking receive, `None` when empty
    pub fn try_recv(&mut self) -> Option<Arc<Envelope>> {
        self.receiver.try_recv().ok()
    }

    /// Drain everything currently queued
    pub fn drain(&mut self) -> Vec<Arc<Envelope>> {
        let mut drained = Vec::new();
        while let Some(envelope) = self.try_recv() {
            drained.push(envelope);
        }
        drained
    }
}

// ============================================================================
// CONNECTION
// ============================================================================

#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,

    /// Verified identity the socket was opened for (diagnostics only)
    identity: String,

    /// Current membership keys; written by the Hub under its lock
    keys: RwLock<Vec<String>>,

    sender: mpsc::Sender<Arc<Envelope>>,

    /// One-shot closing signal
    closing: CancellationToken,

    state: AtomicU8,

    /// Number of pumps that have returned
    pumps_finished: AtomicU8,

    /// Set once the connection has been removed from the Hub
    released: AtomicBool,

    settings: ConnectionSettings,

    metrics: Arc<ConnectionMetrics>,
}

impl Connection {
    /// Create a connection for a freshly upgraded socket
    pub fn new(
        identity: impl Into<String>,
        settings: ConnectionSettings,
    ) -> (Arc<Self>, OutboundQueue) {
        let (sender, receiver) = mpsc::channel(settings.outbound_buffer.max(1));
        let connection = Arc::new(Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            identity: identity.into(),
            keys: RwLock::new(Vec::new()),
            sender,
            closing: CancellationToken::new(),
            state: AtomicU8::new(ConnectionState::Upgraded as u8),
            pumps_finished: AtomicU8::new(0),
            released: AtomicBool::new(false),
            settings,
            metrics: ConnectionMetrics::new(),
        });
        (connection, OutboundQueue { receiver })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Copy of the current membership keys
    pub fn keys(&self) -> Vec<String> {
        self.keys.read().clone()
    }

    /// Replace the cached key list (Hub only, called under the registry lock)
    pub(super) fn set_keys(&self, keys: Vec<String>) {
        *self.keys.write() = keys;
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Monotonic transition: never moves the state backwards
    fn advance(&self, to: ConnectionState) {
        self.state.fetch_max(to as u8, Ordering::AcqRel);
    }

    /// Mark the connection as registered and about to start its pumps
    pub fn activate(&self) {
        self.advance(ConnectionState::Active);
    }

    pub fn is_closing(&self) -> bool {
        self.closing.is_cancelled()
    }

    /// Whether the connection has already been removed from the Hub
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> ConnectionMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Wait until the closing signal fires
    pub async fn closed(&self) {
        self.closing.cancelled().await;
    }

    /// Non-blocking enqueue
    ///
    /// Full queue: the new message is dropped with a warning.
    /// Closing connection: the message is silently discarded.
    pub fn enqueue(&self, envelope: Arc<Envelope>) -> EnqueueOutcome {
        if self.is_closing() {
            return EnqueueOutcome::Closed;
        }

        match self.sender.try_send(envelope) {
            Ok(()) => {
                self.metrics.inc_enqueued();
                EnqueueOutcome::Queued
            }
            Err(mpsc::error::TrySendError::Full(envelope)) => {
                self.metrics.inc_dropped();
                logger::warning(
                    LogTag::Connection,
                    &format!(
                        "Connection {} ({}): outbound queue full ({}), dropping '{}' message",
                        self.id, self.identity, self.settings.outbound_buffer, envelope.kind
                    ),
                );
                EnqueueOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => EnqueueOutcome::Closed,
        }
    }

    /// Signal both pumps to stop (idempotent, safe from any task)
    pub fn close(&self) {
        self.advance(ConnectionState::Closing);
        self.closing.cancel();
    }

    /// Close a connection whose pumps never started
    ///
    /// Nothing is left to drain, so the state goes straight to `Closed`.
    pub fn abandon(&self) {
        self.close();
        self.advance(ConnectionState::Closed);
    }

    /// Remove this connection from the hub exactly once
    pub fn release(&self, hub: &Hub) {
        if !self.released.swap(true, Ordering::AcqRel) {
            hub.unregister(self);
        }
    }

    fn pump_finished(&self) {
        if self.pumps_finished.fetch_add(1, Ordering::AcqRel) + 1 >= 2 {
            self.advance(ConnectionState::Closed);
        }
    }

    // ------------------------------------------------------------------------
    // INBOUND PUMP
    // ------------------------------------------------------------------------

    /// Read frames until error, close, read deadline, closing signal or
    /// cancellation; then unregister from the hub and close.
    ///
    /// Application data from the client is discarded, except `ping`
    /// envelopes which are answered with a `pong`.
    pub async fn inbound_pump<R, E>(
        self: &Arc<Self>,
        hub: &Hub,
        mut stream: R,
        cancel: CancellationToken,
    ) where
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: fmt::Display,
    {
        let pong_wait = self.settings.health.pong_wait;

        let reason = loop {
            let next = tokio::select! {
                _ = self.closing.cancelled() => break "closing signal".to_string(),
                _ = cancel.cancelled() => break "context cancelled".to_string(),
                next = timeout(pong_wait, stream.next()) => next,
            };

            match next {
                Err(_) => {
                    break format!("read deadline exceeded ({}s)", pong_wait.as_secs());
                }
                Ok(None) => break "stream ended".to_string(),
                Ok(Some(Err(e))) => break format!("read error: {}", e),
                Ok(Some(Ok(message))) => {
                    self.metrics.inc_received();
                    match message {
                        Message::Close(_) => break "client closed".to_string(),
                        Message::Text(text) => {
                            if text.len() > self.settings.max_message_bytes {
                                break format!(
                                    "inbound message too large ({} > {} bytes)",
                                    text.len(),
                                    self.settings.max_message_bytes
                                );
                            }
                            self.handle_inbound_text(&text);
                        }
                        Message::Binary(data) => {
                            if data.len() > self.settings.max_message_bytes {
                                break format!(
                                    "inbound message too large ({} > {} bytes)",
                                    data.len(),
                                    self.settings.max_message_bytes
                                );
                            }
                        }
                        // Control frames only refresh the read deadline
                        Message::Ping(_) | Message::Pong(_) => {}
                    }
                }
            }
        };

        logger::debug(
            LogTag::Connection,
            &format!("Connection {} ({}): inbound pump stopped: {}", self.id, self.identity, reason),
        );

        self.release(hub);
        self.close();
        self.pump_finished();
    }

    fn handle_inbound_text(&self, text: &str) {
        match Envelope::from_json(text) {
            Ok(envelope) if envelope.message_type() == Some(MessageType::Ping) => {
                self.enqueue(Arc::new(Envelope::pong()));
            }
            Ok(envelope) => {
                logger::verbose(
                    LogTag::Connection,
                    &format!(
                        "Connection {}: discarding inbound '{}' message",
                        self.id, envelope.kind
                    ),
                );
            }
            Err(e) => {
                logger::verbose(
                    LogTag::Connection,
                    &format!("Connection {}: discarding unparsable message: {}", self.id, e),
                );
            }
        }
    }

    // ------------------------------------------------------------------------
    // OUTBOUND PUMP
    // ------------------------------------------------------------------------

    /// Drain the outbound queue to the socket, interleaved with pings.
    ///
    /// Stops on queue closed, write or ping failure (including deadline),
    /// closing signal or cancellation. Closes the socket on exit.
    pub async fn outbound_pump<S>(
        self: &Arc<Self>,
        mut queue: OutboundQueue,
        mut sink: S,
        cancel: CancellationToken,
    ) where
        S: Sink<Message> + Unpin,
        S::Error: fmt::Display,
    {
        let mut ticker = ping_ticker(self.settings.health.ping_period);

        // (reason, socket failed)
        let (reason, socket_failed) = loop {
            tokio::select! {
                biased;

                _ = self.closing.cancelled() => break ("closing signal".to_string(), false),
                _ = cancel.cancelled() => break ("context cancelled".to_string(), false),

                maybe = queue.recv() => {
                    let envelope = match maybe {
                        Some(envelope) => envelope,
                        None => break ("outbound queue closed".to_string(), false),
                    };

                    let text = match envelope.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            // Don't break connection on serialization error
                            logger::error(
                                LogTag::Connection,
                                &format!("Connection {}: failed to serialize '{}' message: {}", self.id, envelope.kind, e),
                            );
                            continue;
                        }
                    };

                    if let Err(e) = self.write_frame(&mut sink, Message::Text(text)).await {
                        break (e, true);
                    }
                    self.metrics.inc_sent();
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.write_frame(&mut sink, Message::Ping(Vec::new())).await {
                        break (format!("ping failed: {}", e), true);
                    }
                    self.metrics.inc_ping();
                }
            }
        };

        logger::debug(
            LogTag::Connection,
            &format!("Connection {} ({}): outbound pump stopped: {}", self.id, self.identity, reason),
        );

        // A missed deadline or write error is fatal: tear down before anything else
        self.close();

        // Best-effort close handshake, skipped when the socket is already stuck
        if !socket_failed {
            let write_timeout = self.settings.health.write_timeout;
            let _ = timeout(write_timeout, sink.send(Message::Close(None))).await;
            let _ = timeout(write_timeout, sink.close()).await;
        }

        self.pump_finished();
    }

    /// Write one frame within the write deadline
    async fn write_frame<S>(&self, sink: &mut S, message: Message) -> Result<(), String>
    where
        S: Sink<Message> + Unpin,
        S::Error: fmt::Display,
    {
        match timeout(self.settings.health.write_timeout, sink.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("write error: {}", e)),
            Err(_) => Err(format!(
                "write deadline exceeded ({}s)",
                self.settings.health.write_timeout.as_secs()
            )),
        }
    }
}
