//! Event normalizer
//!
//! Validates raw transport records and turns them into canonical
//! [`ActionEvent`]s. Pure: it never touches the pattern store.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use drivesense_common::{
    parse_action, ActionEvent, ActionType, ActionValue, ActionVerb, EventContext,
    FeedbackOutcome, FeedbackResponse, RawActionRecord, RawFeedbackRecord, TimeBucket,
    TripPhase, ValidationError,
};
use serde_json::Value;
use uuid::Uuid;

/// Naive layouts accepted for producers that send local time without an offset
const NAIVE_LAYOUTS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Canonicalizes inbound action and feedback records
#[derive(Debug, Clone)]
pub struct EventNormalizer {
    /// Vehicle local time offset
    offset: FixedOffset,
}

impl EventNormalizer {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Normalizer evaluating time buckets in UTC
    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Validate a driver action. `received_at` stands in for a missing timestamp.
    pub fn normalize(
        &self,
        raw: &RawActionRecord,
        received_at: DateTime<Utc>,
    ) -> Result<ActionEvent, ValidationError> {
        let user_id = non_empty(raw.user_id.as_deref()).ok_or(ValidationError::MissingField("user_id"))?;
        let action = non_empty(raw.action.as_deref()).ok_or(ValidationError::MissingField("action"))?;

        let (action_type, verb) = parse_action(action)?;
        let value = parse_value(action_type, verb, action, raw.value.as_ref())?;
        let timestamp = self.parse_timestamp(raw.timestamp.as_deref(), received_at)?;
        let trip_phase = match non_empty(raw.trip_phase.as_deref()) {
            Some(phase) => phase.parse::<TripPhase>()?,
            None => TripPhase::Unknown,
        };

        let idempotency_key = match non_empty(raw.event_id.as_deref()) {
            Some(id) => id.to_string(),
            None => raw.content_digest(timestamp),
        };

        Ok(ActionEvent {
            idempotency_key,
            user_id: user_id.to_string(),
            action_type,
            value,
            timestamp,
            received_at,
            context: EventContext {
                time_bucket: TimeBucket::at(timestamp, self.offset),
                trip_phase,
            },
        })
    }

    /// Validate a feedback record
    pub fn normalize_feedback(
        &self,
        raw: &RawFeedbackRecord,
    ) -> Result<FeedbackResponse, ValidationError> {
        let id = non_empty(raw.suggestion_id.as_deref())
            .ok_or(ValidationError::MissingField("suggestion_id"))?;
        let suggestion_id =
            Uuid::parse_str(id).map_err(|_| ValidationError::InvalidReference(id.to_string()))?;
        let outcome = non_empty(raw.outcome.as_deref())
            .ok_or(ValidationError::MissingField("outcome"))?
            .parse::<FeedbackOutcome>()?;

        Ok(FeedbackResponse {
            suggestion_id,
            outcome,
        })
    }

    fn parse_timestamp(
        &self,
        raw: Option<&str>,
        received_at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, ValidationError> {
        let Some(raw) = non_empty(raw) else {
            return Ok(received_at);
        };

        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Ok(ts.with_timezone(&Utc));
        }

        NAIVE_LAYOUTS
            .iter()
            .find_map(|layout| NaiveDateTime::parse_from_str(raw, layout).ok())
            .and_then(|naive| self.offset.from_local_datetime(&naive).single())
            .map(|ts| ts.with_timezone(&Utc))
            .ok_or_else(|| ValidationError::InvalidTimestamp(raw.to_string()))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_value(
    action_type: ActionType,
    verb: ActionVerb,
    action: &str,
    raw: Option<&Value>,
) -> Result<ActionValue, ValidationError> {
    match verb {
        ActionVerb::TurnOn => return Ok(ActionValue::On),
        ActionVerb::TurnOff => return Ok(ActionValue::Off),
        ActionVerb::Relative => {
            return Err(ValidationError::RelativeAction {
                action: action.to_string(),
            })
        }
        ActionVerb::Set => {}
    }

    let raw = raw
        .filter(|v| !v.is_null())
        .ok_or(ValidationError::MissingField("value"))?;

    let invalid = || ValidationError::InvalidValue {
        action_type: action_type.to_string(),
        value: raw.to_string(),
    };

    let level = match raw {
        Value::Number(n) => n.as_f64(),
        Value::Bool(true) => return Ok(ActionValue::On),
        Value::Bool(false) => return Ok(ActionValue::Off),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "on" | "true" => return Ok(ActionValue::On),
            "off" | "false" => return Ok(ActionValue::Off),
            other => other.parse::<f64>().ok(),
        },
        _ => None,
    }
    .filter(|v| v.is_finite())
    .ok_or_else(invalid)?;

    let domain = action_type.domain();
    if !domain.contains(level) {
        return Err(ValidationError::OutOfDomain {
            action_type: action_type.to_string(),
            value: level,
            min: domain.min,
            max: domain.max,
        });
    }

    Ok(ActionValue::Level(level))
}
