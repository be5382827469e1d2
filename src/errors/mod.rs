//! Error handling for the alert delivery subsystem
//!
//! Only collaborator, configuration and input errors are represented here.
//! Transport failures (socket read/write/ping, deadlines) end a single
//! connection and are logged by the pumps; they never become an `AlertError`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlertError {
    /// The role-membership collaborator failed to answer
    #[error("Role lookup failed for identity '{identity}': {source}")]
    RoleLookup {
        identity: String,
        #[source]
        source: anyhow::Error,
    },

    /// The queue client refused to start consuming
    #[error("Failed to start consumer for queue '{queue}': {source}")]
    QueueSetup {
        queue: String,
        #[source]
        source: anyhow::Error,
    },

    /// A queue or domain event could not be interpreted
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Server error: {0}")]
    Server(String),
}

impl AlertError {
    pub fn role_lookup(identity: &str, source: anyhow::Error) -> Self {
        AlertError::RoleLookup {
            identity: identity.to_string(),
            source,
        }
    }

    pub fn queue_setup(queue: &str, source: anyhow::Error) -> Self {
        AlertError::QueueSetup {
            queue: queue.to_string(),
            source,
        }
    }

    /// Whether the error came from an external collaborator
    pub fn is_collaborator_error(&self) -> bool {
        matches!(
            self,
            AlertError::RoleLookup { .. } | AlertError::QueueSetup { .. }
        )
    }
}

impl From<serde_json::Error> for AlertError {
    fn from(err: serde_json::Error) -> Self {
        AlertError::InvalidEvent(err.to_string())
    }
}

pub type AlertResult<T> = Result<T, AlertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_lookup_display() {
        let err = AlertError::role_lookup("u1", anyhow::anyhow!("directory offline"));
        assert_eq!(
            err.to_string(),
            "Role lookup failed for identity 'u1': directory offline"
        );
        assert!(err.is_collaborator_error());
    }

    #[test]
    fn test_json_error_is_invalid_event() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: AlertError = parse_err.into();
        assert!(matches!(err, AlertError::InvalidEvent(_)));
        assert!(!err.is_collaborator_error());
    }
}
