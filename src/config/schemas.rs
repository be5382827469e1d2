//! Configuration schemas - all config structures defined once with defaults
//!
//! Each struct is defined using the config_struct! macro which provides:
//! - Single-source definition (no repetition)
//! - Embedded defaults
//! - Serde support

use std::collections::HashMap;
use std::time::Duration;

// ============================================================================
// WEBSERVER CONFIGURATION
// ============================================================================

config_struct! {
    /// HTTP server and upgrade endpoint configuration
    pub struct WebserverConfig {
        host: String = "127.0.0.1".to_string(),
        port: u16 = 8080,

        /// Route performing the WebSocket upgrade
        ws_path: String = "/ws".to_string(),

        /// Origins allowed to open a WebSocket (exact match, no wildcard)
        allowed_origins: Vec<String> = vec!["http://localhost:3000".to_string()],

        /// Development only: take the verified identity from `identity_header`
        trust_identity_header: bool = false,
        identity_header: String = "X-Identity-Id".to_string(),
    }
}

// ============================================================================
// WEBSOCKET CONFIGURATION
// ============================================================================

config_struct! {
    /// Per-connection limits and keepalive timings
    pub struct WebSocketConfig {
        /// Bounded outbound queue capacity (messages)
        outbound_buffer: usize = 256,

        /// Deadline for a single frame write or ping
        write_timeout_secs: u64 = 10,

        /// Connection is dead if nothing is read for this long
        pong_wait_secs: u64 = 60,

        /// Ping period, must be shorter than pong_wait_secs
        ping_period_secs: u64 = 54,

        /// Largest inbound frame accepted
        max_message_bytes: usize = 4096,
    }
}

// ============================================================================
// QUEUE CONFIGURATION
// ============================================================================

config_struct! {
    /// External queue consumption
    pub struct QueueConfig {
        /// Queue identifier carrying alert events
        alert_queue: String = "alerts".to_string(),
    }
}

// ============================================================================
// MEMBERSHIP CONFIGURATION
// ============================================================================

config_struct! {
    /// Role-membership domain events and in-process directory seed
    pub struct MembershipConfig {
        domain: String = "role_membership".to_string(),
        created_action: String = "created".to_string(),
        deleted_action: String = "deleted".to_string(),

        /// identity id -> role ids, loaded into the in-process role directory
        seed: HashMap<String, Vec<String>> = HashMap::new(),
    }
}

// ============================================================================
// ROOT CONFIGURATION
// ============================================================================

config_struct! {
    /// Root configuration structure containing all sub-configurations
    pub struct Config {
        webserver: WebserverConfig = WebserverConfig::default(),
        websocket: WebSocketConfig = WebSocketConfig::default(),
        queue: QueueConfig = QueueConfig::default(),
        membership: MembershipConfig = MembershipConfig::default(),
    }
}

// ============================================================================
// IMPLEMENTATIONS
// ============================================================================

impl WebserverConfig {
    /// Validate webserver configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("Host cannot be empty".to_string());
        }

        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }

        if !self.ws_path.starts_with('/') {
            return Err(format!("ws_path must start with '/': {}", self.ws_path));
        }

        if self.allowed_origins.is_empty() {
            return Err("allowed_origins must list at least one origin".to_string());
        }

        if let Some(origin) = self
            .allowed_origins
            .iter()
            .find(|origin| origin.trim() == "*" || origin.trim().is_empty())
        {
            return Err(format!(
                "allowed_origins entry '{}' is not allowed, list explicit origins",
                origin
            ));
        }

        if self.trust_identity_header && self.identity_header.is_empty() {
            return Err("identity_header cannot be empty when trust_identity_header is on".to_string());
        }

        Ok(())
    }

    /// Get the full bind address (host:port)
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Exact-match origin check for the upgrade handshake
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|allowed| allowed == origin)
    }
}

impl WebSocketConfig {
    /// Validate websocket configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.outbound_buffer == 0 {
            return Err("WebSocket outbound_buffer must be > 0".to_string());
        }
        if self.write_timeout_secs == 0 {
            return Err("WebSocket write_timeout_secs must be > 0".to_string());
        }
        if self.ping_period_secs == 0 {
            return Err("WebSocket ping_period_secs must be > 0".to_string());
        }
        if self.ping_period_secs >= self.pong_wait_secs {
            return Err(format!(
                "WebSocket ping_period_secs ({}) must be shorter than pong_wait_secs ({})",
                self.ping_period_secs, self.pong_wait_secs
            ));
        }
        if self.max_message_bytes == 0 {
            return Err("WebSocket max_message_bytes must be > 0".to_string());
        }
        Ok(())
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    pub fn ping_period(&self) -> Duration {
        Duration::from_secs(self.ping_period_secs)
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.alert_queue.trim().is_empty() {
            return Err("queue.alert_queue cannot be empty".to_string());
        }
        Ok(())
    }
}

impl MembershipConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.domain.is_empty() || self.created_action.is_empty() || self.deleted_action.is_empty() {
            return Err("membership domain and actions cannot be empty".to_string());
        }
        if self.created_action == self.deleted_action {
            return Err("membership created_action and deleted_action must differ".to_string());
        }
        Ok(())
    }
}

impl Config {
    /// Validate every section, returning the first violation
    pub fn validate(&self) -> Result<(), String> {
        self.webserver.validate()?;
        self.websocket.validate()?;
        self.queue.validate()?;
        self.membership.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.websocket.outbound_buffer, 256);
        assert_eq!(config.queue.alert_queue, "alerts");
        assert_eq!(config.webserver.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_wildcard_origin_rejected() {
        let mut config = WebserverConfig::default();
        config.allowed_origins = vec!["https://erp.example.com".to_string(), "*".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.contains("'*'"));

        config.allowed_origins.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_origin_check_is_exact() {
        let mut config = WebserverConfig::default();
        config.allowed_origins = vec!["https://erp.example.com".to_string()];
        assert!(config.is_origin_allowed("https://erp.example.com"));
        assert!(!config.is_origin_allowed("https://erp.example.com.evil.io"));
        assert!(!config.is_origin_allowed("http://erp.example.com"));
    }

    #[test]
    fn test_ping_period_must_be_shorter_than_pong_wait() {
        let mut config = WebSocketConfig::default();
        config.ping_period_secs = 60;
        config.pong_wait_secs = 60;
        assert!(config.validate().is_err());

        config.ping_period_secs = 30;
        assert!(config.validate().is_ok());
        assert_eq!(config.ping_period(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [websocket]
            outbound_buffer = 8

            [membership.seed]
            u1 = ["admin", "supervisor"]
            "#,
        )
        .unwrap();

        assert_eq!(config.websocket.outbound_buffer, 8);
        assert_eq!(config.websocket.pong_wait_secs, 60);
        assert_eq!(config.webserver.port, 8080);
        assert_eq!(
            config.membership.seed.get("u1"),
            Some(&vec!["admin".to_string(), "supervisor".to_string()])
        );
    }
}
