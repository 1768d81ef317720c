//! Feedback adjuster
//!
//! Accepted suggestions raise the profile weight and reinforce the predicted
//! value; dismissed ones lower the weight only.

use super::pending::PendingSuggestions;
use crate::config::FeedbackSettings;
use crate::store::PatternStore;
use crate::telemetry::ObservabilitySink;
use chrono::{DateTime, Utc};
use drivesense_common::{FeedbackOutcome, FeedbackResponse, ProfileKey};
use serde::Serialize;
use tracing::instrument;

/// What happened to one feedback response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FeedbackReport {
    Applied {
        key: ProfileKey,
        outcome: FeedbackOutcome,
        weight: f64,
    },
    /// Unknown, expired, or already answered
    Ignored,
}

#[derive(Debug, Clone)]
pub struct FeedbackAdjuster {
    settings: FeedbackSettings,
}

impl FeedbackAdjuster {
    pub fn new(settings: FeedbackSettings) -> Self {
        Self { settings }
    }

    #[instrument(skip(self, pending, store, observer), fields(suggestion_id = %response.suggestion_id))]
    pub fn apply(
        &self,
        response: &FeedbackResponse,
        pending: &PendingSuggestions,
        store: &PatternStore,
        now: DateTime<Utc>,
        observer: &dyn ObservabilitySink,
    ) -> FeedbackReport {
        let Some(suggestion) = pending.resolve(response.suggestion_id, now) else {
            observer.feedback_ignored(response.suggestion_id);
            return FeedbackReport::Ignored;
        };

        let key = suggestion.key();
        let s = &self.settings;
        let weight = store.modify(&key, |profile| match response.outcome {
            FeedbackOutcome::Accepted => {
                profile.reinforce(suggestion.predicted_value, suggestion.time_bucket);
                profile.scale_weight(s.accept_multiplier, s.min_weight, s.max_weight)
            }
            FeedbackOutcome::Dismissed => {
                profile.scale_weight(s.dismiss_multiplier, s.min_weight, s.max_weight)
            }
        });

        match weight {
            Some(weight) => {
                observer.feedback_applied(&key, response.outcome, weight);
                FeedbackReport::Applied {
                    key,
                    outcome: response.outcome,
                    weight,
                }
            }
            None => {
                observer.feedback_ignored(response.suggestion_id);
                FeedbackReport::Ignored
            }
        }
    }
}

impl Default for FeedbackAdjuster {
    fn default() -> Self {
        Self::new(FeedbackSettings::default())
    }
}
