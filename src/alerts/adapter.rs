//! Alert-domain adapter
//!
//! Maps identities and roles onto Hub keys. The adapter owns the key
//! namespace: `identity:<id>` and `role:<id>`. Nothing else in the crate
//! builds these strings.
//!
//! Registration and membership refresh for the same identity are serialized
//! by a per-identity async lock held across the role lookup and the registry
//! change. A connection registered while a refresh is running therefore
//! either gets rekeyed by that refresh or registers with roles read after it.
//! The Hub's own lock is never held while waiting on the role directory.
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

use crate::errors::{AlertError, AlertResult};
use crate::hub::{Connection, Envelope, Hub};
use crate::logger::{self, LogTag};

use super::collaborators::RoleDirectory;

pub const IDENTITY_PREFIX: &str = "identity:";
pub const ROLE_PREFIX: &str = "role:";

pub fn identity_key(identity: &str) -> String {
    format!("{}{}", IDENTITY_PREFIX, identity)
}

pub fn role_key(role: &str) -> String {
    format!("{}{}", ROLE_PREFIX, role)
}

/// `[identity:<id>, role:<r1>, role:<r2>, ...]`
pub fn membership_keys(identity: &str, roles: &[String]) -> Vec<String> {
    std::iter::once(identity_key(identity))
        .chain(roles.iter().map(|role| role_key(role)))
        .collect()
}

pub struct AlertHub {
    hub: Arc<Hub>,
    roles: Arc<dyn RoleDirectory>,
    identity_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl AlertHub {
    pub fn new(hub: Arc<Hub>, roles: Arc<dyn RoleDirectory>) -> Self {
        Self {
            hub,
            roles,
            identity_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Register `connection` under its identity key and current role keys
    ///
    /// Fails only if the role lookup fails. An identity without roles is
    /// registered under its identity key alone.
    pub async fn register_connection(
        &self,
        connection: &Arc<Connection>,
        identity: &str,
    ) -> AlertResult<()> {
        let keys = self
            .with_identity_lock(identity, move || async move {
                let keys = self.resolve_keys(identity).await?;
                self.hub.register(connection, &keys);
                Ok::<_, AlertError>(keys)
            })
            .await?;

        logger::debug(
            LogTag::Alerts,
            &format!(
                "Connection {} for '{}' registered with {} key(s)",
                connection.id(),
                identity,
                keys.len()
            ),
        );
        Ok(())
    }

    /// Re-read the roles of `identity` and rekey all of its live connections
    ///
    /// Returns the number of connections rekeyed.
    pub async fn refresh_membership(&self, identity: &str) -> AlertResult<usize> {
        let rekeyed = self
            .with_identity_lock(identity, move || async move {
                let keys = self.resolve_keys(identity).await?;
                Ok::<_, AlertError>(self.hub.update_keys_for_key(&identity_key(identity), &keys))
            })
            .await?;

        logger::debug(
            LogTag::Alerts,
            &format!("Refreshed membership of '{}' ({} connection(s))", identity, rekeyed),
        );
        Ok(rekeyed)
    }

    pub fn broadcast_to_identity(&self, identity: &str, envelope: Envelope) -> usize {
        self.hub.broadcast_to_key(&identity_key(identity), envelope)
    }

    pub fn broadcast_to_role(&self, role: &str, envelope: Envelope) -> usize {
        self.hub.broadcast_to_key(&role_key(role), envelope)
    }

    pub fn broadcast_to_all(&self, envelope: Envelope) -> usize {
        self.hub.broadcast_all(envelope)
    }

    async fn resolve_keys(&self, identity: &str) -> AlertResult<Vec<String>> {
        let roles = self
            .roles
            .roles_for_identity(identity)
            .await
            .map_err(|e| AlertError::role_lookup(identity, e))?;
        Ok(membership_keys(identity, &roles))
    }

    async fn with_identity_lock<F, Fut, T>(&self, identity: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let lock = Arc::clone(
            self.identity_locks
                .lock()
                .entry(identity.to_string())
                .or_default(),
        );

        let result = {
            let _guard = lock.lock().await;
            f().await
        };

        // Drop the entry once no other task is waiting on it
        let mut locks = self.identity_locks.lock();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(identity);
        }
        result
    }

    #[cfg(test)]
    fn tracked_identities(&self) -> usize {
        self.identity_locks.lock().len()
    }
}
