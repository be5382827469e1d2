//! WebSocket message schema - the Envelope wire format
//!
//! Every frame pushed to a client is one JSON envelope:
//! `{ "type": string, "payload": <type-specific>, "timestamp": RFC3339 }`
//!
//! The registry and pumps never look inside `payload`; its meaning is
//! decided by `type` alone. Unknown types are carried as-is so clients and
//! servers can ignore what they don't understand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// MESSAGE TYPES
// ============================================================================

/// Built-in envelope types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Business alert pushed to users
    Alert,
    /// Application-level heartbeat request
    Ping,
    /// Heartbeat answer
    Pong,
}

impl MessageType {
    /// Type tag used on the wire
    pub fn code(&self) -> &'static str {
        match self {
            MessageType::Alert => "alert",
            MessageType::Ping => "ping",
            MessageType::Pong => "pong",
        }
    }

    /// Parse a type tag, `None` for types this server does not know
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "alert" => Some(MessageType::Alert),
            "ping" => Some(MessageType::Ping),
            "pong" => Some(MessageType::Pong),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// ENVELOPE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Type tag (e.g. "alert")
    #[serde(rename = "type")]
    pub kind: String,

    /// Type-specific payload, opaque to the hub
    #[serde(default)]
    pub payload: serde_json::Value,

    /// Creation instant
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Create an envelope of a built-in type stamped with the current time
    pub fn new(kind: MessageType, payload: serde_json::Value) -> Self {
        Self::with_kind(kind.code(), payload)
    }

    /// Create an envelope with an arbitrary type tag
    pub fn with_kind(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn alert(payload: serde_json::Value) -> Self {
        Self::new(MessageType::Alert, payload)
    }

    pub fn pong() -> Self {
        Self::new(MessageType::Pong, serde_json::Value::Null)
    }

    /// Built-in type of this envelope, if recognized
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_code(&self.kind)
    }

    /// Serialize to JSON text
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_code_roundtrip() {
        for kind in [MessageType::Alert, MessageType::Ping, MessageType::Pong] {
            assert_eq!(MessageType::from_code(kind.code()), Some(kind));
        }
        assert_eq!(MessageType::from_code("inventory.low"), None);
    }

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = Envelope::alert(serde_json::json!({"title": "Stock low", "sku": "A-1"}));
        let value: serde_json::Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "alert");
        assert_eq!(value["payload"]["sku"], "A-1");
        let ts = value["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn test_unknown_type_is_preserved() {
        let envelope =
            Envelope::from_json(r#"{"type":"ack","payload":{"id":3},"timestamp":"2026-01-02T03:04:05Z"}"#)
                .unwrap();
        assert_eq!(envelope.kind, "ack");
        assert_eq!(envelope.message_type(), None);
        assert_eq!(envelope.payload["id"], 3);
    }

    #[test]
    fn test_client_ping_without_timestamp() {
        let envelope = Envelope::from_json(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(envelope.message_type(), Some(MessageType::Ping));
        assert!(envelope.payload.is_null());
    }
}
