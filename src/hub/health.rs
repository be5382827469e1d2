//! WebSocket keepalive settings
//!
//! A connection is considered dead when nothing has been read for
//! `pong_wait`. The outbound pump pings every `ping_period` (shorter than
//! `pong_wait`) so a healthy client's pong always arrives in time. Every
//! frame write and ping must finish within `write_timeout`.

use std::time::Duration;

use crate::config::WebSocketConfig;

#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Interval between server pings
    pub ping_period: Duration,

    /// Read deadline, refreshed by any inbound frame
    pub pong_wait: Duration,

    /// Deadline for one write or ping
    pub write_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self::from_config(&WebSocketConfig::default())
    }
}

impl HealthConfig {
    /// Create from config values
    pub fn from_config(config: &WebSocketConfig) -> Self {
        Self {
            ping_period: config.ping_period(),
            pong_wait: config.pong_wait(),
            write_timeout: config.write_timeout(),
        }
    }
}

/// Create the ping ticker used by the outbound pump
///
/// The first tick fires one full period after creation, not immediately.
pub fn ping_ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let mut config = WebSocketConfig::default();
        config.ping_period_secs = 5;
        config.pong_wait_secs = 9;
        config.write_timeout_secs = 2;

        let health = HealthConfig::from_config(&config);
        assert_eq!(health.ping_period, Duration::from_secs(5));
        assert_eq!(health.pong_wait, Duration::from_secs(9));
        assert_eq!(health.write_timeout, Duration::from_secs(2));
        assert!(health.ping_period < health.pong_wait);
    }

    #[tokio::test]
    async fn test_ping_ticker_skips_immediate_tick() {
        let mut ticker = ping_ticker(Duration::from_millis(40));
        let started = tokio::time::Instant::now();
        ticker.tick().await;
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
