//! Authorization-change listener
//!
//! Subscribes to the membership domain's created/deleted events and refreshes
//! the affected identity's live connections. A failed refresh only degrades
//! real-time freshness, so it is logged and never reported back to the
//! operation that emitted the event.
use futures::FutureExt;
use std::sync::Arc;

use crate::config::MembershipConfig;
use crate::errors::{AlertError, AlertResult};
use crate::logger::{self, LogTag};

use super::adapter::AlertHub;
use super::collaborators::{EventBus, EventHandler};

/// Event data field carrying the affected identity
pub const IDENTITY_FIELD: &str = "identity_id";

/// Event data announced for a role grant or revoke
pub fn membership_event(identity: &str, role: &str) -> serde_json::Value {
    serde_json::json!({
        IDENTITY_FIELD: identity,
        "role_id": role,
    })
}

/// Affected identity of a membership event
pub fn identity_from_event(data: &serde_json::Value) -> AlertResult<String> {
    match data.get(IDENTITY_FIELD) {
        Some(serde_json::Value::String(identity)) if !identity.is_empty() => Ok(identity.clone()),
        Some(serde_json::Value::Number(identity)) => Ok(identity.to_string()),
        _ => Err(AlertError::InvalidEvent(format!(
            "membership event without '{}': {}",
            IDENTITY_FIELD, data
        ))),
    }
}

pub struct MembershipListener {
    alerts: Arc<AlertHub>,
    config: MembershipConfig,
}

impl MembershipListener {
    pub fn new(alerts: Arc<AlertHub>, config: MembershipConfig) -> Self {
        Self { alerts, config }
    }

    /// Subscribe to the created and deleted actions of the membership domain
    pub fn register(self, bus: &dyn EventBus) {
        let listener = Arc::new(self);
        for action in [&listener.config.created_action, &listener.config.deleted_action] {
            bus.register(&listener.config.domain, action, listener.handler(action));
        }
        logger::info(
            LogTag::Listener,
            &format!(
                "Listening for {}.{{{}, {}}} events",
                listener.config.domain, listener.config.created_action, listener.config.deleted_action
            ),
        );
    }

    fn handler(self: &Arc<Self>, action: &str) -> EventHandler {
        let listener = Arc::clone(self);
        let action = action.to_string();
        Arc::new(move |data: serde_json::Value| {
            let listener = Arc::clone(&listener);
            let action = action.clone();
            async move {
                listener.handle(&action, &data).await;
                Ok(())
            }
            .boxed()
        })
    }

    /// Refresh the identity named by `data`; failures are logged only
    pub async fn handle(&self, action: &str, data: &serde_json::Value) {
        let identity = match identity_from_event(data) {
            Ok(identity) => identity,
            Err(e) => {
                logger::warning(
                    LogTag::Listener,
                    &format!("Ignoring {}.{} event: {}", self.config.domain, action, e),
                );
                return;
            }
        };

        match self.alerts.refresh_membership(&identity).await {
            Ok(rekeyed) => logger::debug(
                LogTag::Listener,
                &format!(
                    "Membership {} for '{}' refreshed {} connection(s)",
                    action, identity, rekeyed
                ),
            ),
            Err(e) => logger::warning(
                LogTag::Listener,
                &format!("Membership refresh for '{}' failed: {}", identity, e),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::memory::{LocalEventBus, RoleAssignments, StaticRoleDirectory};
    use crate::hub::{Connection, ConnectionSettings, Hub};

    #[test]
    fn test_identity_from_event() {
        assert_eq!(identity_from_event(&membership_event("u1", "admin")).unwrap(), "u1");
        assert_eq!(
            identity_from_event(&serde_json::json!({"identity_id": 42})).unwrap(),
            "42"
        );
        assert!(identity_from_event(&serde_json::json!({"role_id": "admin"})).is_err());
        assert!(identity_from_event(&serde_json::json!({"identity_id": ""})).is_err());
    }

    fn setup() -> (Arc<Hub>, Arc<StaticRoleDirectory>, Arc<LocalEventBus>, Arc<AlertHub>) {
        let hub = Hub::new();
        let directory = StaticRoleDirectory::new();
        let bus = LocalEventBus::new();
        let alerts = Arc::new(AlertHub::new(Arc::clone(&hub), directory.clone()));
        MembershipListener::new(Arc::clone(&alerts), MembershipConfig::default()).register(bus.as_ref());
        (hub, directory, bus, alerts)
    }

    #[tokio::test]
    async fn test_registers_created_and_deleted_only() {
        let (_hub, _directory, bus, _alerts) = setup();
        let config = MembershipConfig::default();
        assert_eq!(bus.handler_count(&config.domain, &config.created_action), 1);
        assert_eq!(bus.handler_count(&config.domain, &config.deleted_action), 1);
        assert_eq!(bus.handler_count(&config.domain, "updated"), 0);
    }

    #[tokio::test]
    async fn test_grant_rekeys_live_connection() {
        let (hub, directory, bus, alerts) = setup();
        let (conn, _queue) = Connection::new("u1", ConnectionSettings::default());
        alerts.register_connection(&conn, "u1").await.unwrap();

        let assignments = RoleAssignments::new(directory, bus, MembershipConfig::default());
        assert!(assignments.grant("u1", "supervisor").await.unwrap());

        assert_eq!(hub.connections_for_key("role:supervisor"), 1);
        assert_eq!(conn.keys(), vec!["identity:u1", "role:supervisor"]);
    }

    #[tokio::test]
    async fn test_refresh_failure_does_not_fail_operation() {
        let (hub, directory, bus, alerts) = setup();
        directory.grant("u1", "admin");
        let (conn, _queue) = Connection::new("u1", ConnectionSettings::default());
        alerts.register_connection(&conn, "u1").await.unwrap();

        let assignments = RoleAssignments::new(directory.clone(), bus.clone(), MembershipConfig::default());
        directory.set_failing(true);
        assert!(assignments.revoke("u1", "admin").await.is_ok());

        // Stale until the next successful refresh
        assert_eq!(hub.connections_for_key("role:admin"), 1);

        let config = MembershipConfig::default();
        let invoked = bus
            .emit(&config.domain, &config.deleted_action, serde_json::json!({"nope": true}))
            .await
            .unwrap();
        assert_eq!(invoked, 1);
    }
}
