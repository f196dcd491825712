//! Real-time WebSocket protocol
//!
//! Server → Client:
//! - `ConnectedAck` once, immediately after the upgrade
//! - `ChangeEvent` for every decoded change notification
//! - `DecodeFailure` for every notification that could not be decoded

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::util::{iso_timestamp, locale_timestamp};

/// Marker carried in the `error` field of every decode failure
pub const PARSE_FAILED: &str = "Parse failed";

/// Kind of committed mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

impl ChangeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed insert/update/delete on a monitored table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub operation: ChangeOperation,
    pub table: String,
    /// Row image after the mutation (before it, for deletes)
    pub row: Map<String, Value>,
}

impl ChangeEvent {
    /// `row.id`, when the row carries one
    pub fn row_id(&self) -> Option<&Value> {
        self.row.get("id")
    }
}

/// A notification payload that did not decode into a [`ChangeEvent`]
///
/// Wire form: `{"error": "Parse failed", "raw_payload": "...", "when": "<ISO>"}`
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeFailure {
    /// Payload exactly as received from the channel
    pub raw_payload: String,
    pub observed_at: DateTime<Utc>,
}

impl DecodeFailure {
    pub fn new(raw_payload: impl Into<String>) -> Self {
        Self {
            raw_payload: raw_payload.into(),
            observed_at: Utc::now(),
        }
    }
}

#[derive(Serialize)]
struct DecodeFailureWire<'a> {
    error: &'static str,
    raw_payload: &'a str,
    when: String,
}

impl Serialize for DecodeFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        DecodeFailureWire {
            error: PARSE_FAILED,
            raw_payload: &self.raw_payload,
            when: iso_timestamp(self.observed_at),
        }
        .serialize(serializer)
    }
}

/// Outcome of decoding one notification; both variants are pushed to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RelayPayload {
    Event(ChangeEvent),
    Failure(DecodeFailure),
}

impl RelayPayload {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }
}

impl From<ChangeEvent> for RelayPayload {
    fn from(event: ChangeEvent) -> Self {
        Self::Event(event)
    }
}

impl From<DecodeFailure> for RelayPayload {
    fn from(failure: DecodeFailure) -> Self {
        Self::Failure(failure)
    }
}

/// First frame sent on every new session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedAck {
    /// Always `"connected"`
    pub info: String,
    /// ISO-8601 UTC
    pub when: String,
    /// Server-local, human readable
    pub server_time: String,
}

impl ConnectedAck {
    pub fn now() -> Self {
        Self {
            info: "connected".to_string(),
            when: iso_timestamp(Utc::now()),
            server_time: locale_timestamp(Local::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn change_event_serializes_lowercase_operation() {
        let event: ChangeEvent = serde_json::from_value(json!({
            "operation": "update",
            "table": "orders",
            "row": {"id": 3, "status": "shipped"}
        }))
        .unwrap();

        assert_eq!(event.operation, ChangeOperation::Update);
        assert_eq!(event.row_id(), Some(&json!(3)));

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["operation"], "update");
        assert_eq!(value["table"], "orders");
        assert_eq!(value["row"]["status"], "shipped");
    }

    #[test]
    fn decode_failure_wire_shape() {
        let failure = DecodeFailure {
            raw_payload: "{not json".to_string(),
            observed_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        };

        let value = serde_json::to_value(&failure).unwrap();
        assert_eq!(
            value,
            json!({
                "error": "Parse failed",
                "raw_payload": "{not json",
                "when": "2024-01-02T03:04:05.000Z"
            })
        );
    }

    #[test]
    fn relay_payload_is_untagged() {
        let failure = RelayPayload::from(DecodeFailure::new("x"));
        assert!(failure.is_failure());
        let value = serde_json::to_value(&failure).unwrap();
        assert_eq!(value["error"], PARSE_FAILED);
        assert!(value.get("Failure").is_none());
    }

    #[test]
    fn connected_ack_shape() {
        let ack = ConnectedAck::now();
        let value = serde_json::to_value(&ack).unwrap();
        assert_eq!(value["info"], "connected");
        assert!(value["when"].as_str().unwrap().ends_with('Z'));
        assert!(!value["server_time"].as_str().unwrap().is_empty());
    }
}
