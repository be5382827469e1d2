//! Shared application state for the webserver
//!
//! Carries the alert adapter (and through it the Hub), the connection
//! settings derived from config and the shutdown signal for live sockets.
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::alerts::AlertHub;
use crate::config::{WebSocketConfig, WebserverConfig};
use crate::hub::{ConnectionSettings, Hub};

/// Shared application state passed to all route handlers
#[derive(Clone)]
pub struct AppState {
    /// Identity/role adapter over the Hub
    pub alerts: Arc<AlertHub>,

    /// Webserver configuration
    pub config: Arc<WebserverConfig>,

    /// Settings applied to every new connection
    pub settings: ConnectionSettings,

    /// Cancelled on shutdown; every connection's pumps watch it
    pub shutdown: CancellationToken,

    /// Server startup time
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        alerts: Arc<AlertHub>,
        config: WebserverConfig,
        websocket: &WebSocketConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            alerts,
            config: Arc::new(config),
            settings: ConnectionSettings::from_config(websocket),
            shutdown,
            startup_time: chrono::Utc::now(),
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        self.alerts.hub()
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        (chrono::Utc::now() - self.startup_time)
            .num_seconds()
            .max(0) as u64
    }
}
