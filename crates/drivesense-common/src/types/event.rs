//! Driver action events
//!
//! [`RawActionRecord`] is the flat key/value record delivered on the
//! "driver action" channel. [`ActionEvent`] is its canonical, validated form.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::action::{ActionType, ActionValue};
use super::context::EventContext;

/// Inbound driver action as delivered by the transport
///
/// Every field is optional on the wire; the normalizer decides what is
/// required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawActionRecord {
    /// Idempotency key assigned by the producer
    #[serde(default, alias = "id")]
    pub event_id: Option<String>,
    /// Driver / user identifier
    #[serde(default, alias = "driver_id")]
    pub user_id: Option<String>,
    /// Action name, either a bare type (`climate`) or `<type>_<verb>`
    #[serde(default, alias = "action_type")]
    pub action: Option<String>,
    /// Number, numeric string, or `on`/`off`
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    /// RFC 3339 or naive ISO-8601 local time
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub trip_phase: Option<String>,
}

impl RawActionRecord {
    pub fn new(user_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            action: Some(action.into()),
            ..Default::default()
        }
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn with_trip_phase(mut self, phase: impl Into<String>) -> Self {
        self.trip_phase = Some(phase.into());
        self
    }

    /// Deterministic key for records that arrive without an `event_id`
    ///
    /// `timestamp` is the resolved event time (receipt time when the record
    /// carries none), so repeated actions at different times hash apart while
    /// two deliveries of the same stamped record hash to the same key.
    pub fn content_digest(&self, timestamp: DateTime<Utc>) -> String {
        let value = self
            .value
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();
        let hash = blake3::hash(
            format!(
                "{}:{}:{}:{}",
                self.user_id.as_deref().unwrap_or_default(),
                self.action.as_deref().unwrap_or_default(),
                value,
                timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
            )
            .as_bytes(),
        );
        hash.to_hex().to_string()
    }
}

/// Canonical driver action, immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    /// Deduplication key
    pub idempotency_key: String,
    pub user_id: String,
    pub action_type: ActionType,
    pub value: ActionValue,
    pub timestamp: DateTime<Utc>,
    /// When the learner received the record
    pub received_at: DateTime<Utc>,
    pub context: EventContext,
}
