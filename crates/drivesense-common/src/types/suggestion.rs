//! Suggestions, feedback, and outbound messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::action::{ActionType, ProfileKey, QuantizedValue};
use super::context::TimeBucket;
use crate::error::ValidationError;

/// A ranked, confidence-scored recommendation for one profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Correlation id for feedback
    pub id: Uuid,
    pub user_id: String,
    pub action_type: ActionType,
    pub predicted_value: QuantizedValue,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Natural-language prompt shown to the driver
    pub message: String,
    /// Time bucket the prediction was conditioned on
    pub time_bucket: TimeBucket,
    pub generated_at: DateTime<Utc>,
}

impl Suggestion {
    pub fn key(&self) -> ProfileKey {
        ProfileKey::new(self.user_id.clone(), self.action_type)
    }
}

/// Driver's answer to a suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackOutcome {
    Accepted,
    Dismissed,
}

impl FeedbackOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Dismissed => "dismissed",
        }
    }
}

impl FromStr for FeedbackOutcome {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accepted" | "accept" | "yes" => Ok(Self::Accepted),
            "dismissed" | "dismiss" | "no" | "rejected" => Ok(Self::Dismissed),
            other => Err(ValidationError::UnknownOutcome(other.to_string())),
        }
    }
}

/// Canonical feedback referencing exactly one suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub suggestion_id: Uuid,
    pub outcome: FeedbackOutcome,
}

impl FeedbackResponse {
    pub fn accepted(suggestion_id: Uuid) -> Self {
        Self {
            suggestion_id,
            outcome: FeedbackOutcome::Accepted,
        }
    }

    pub fn dismissed(suggestion_id: Uuid) -> Self {
        Self {
            suggestion_id,
            outcome: FeedbackOutcome::Dismissed,
        }
    }
}

/// Inbound feedback as delivered by the transport
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFeedbackRecord {
    #[serde(default, alias = "suggestion_ref")]
    pub suggestion_id: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
}

impl RawFeedbackRecord {
    pub fn new(suggestion_id: impl Into<String>, outcome: impl Into<String>) -> Self {
        Self {
            suggestion_id: Some(suggestion_id.into()),
            outcome: Some(outcome.into()),
        }
    }
}

/// Non-profile notices pushed to the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    TakeBreak,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub issued_at: DateTime<Utc>,
}

/// Everything published on the "recommendation" channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Suggestion(Suggestion),
    Notice(Notice),
}
