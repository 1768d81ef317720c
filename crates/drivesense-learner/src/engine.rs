//! Learner engine
//!
//! Synchronous facade over the whole pipeline. Every operation takes `now`
//! explicitly so the runtime, the HTTP adapter, and tests drive the same code.

use crate::clock::{Phase, SessionClock};
use crate::config::DriveSenseConfig;
use crate::ingest::{EventNormalizer, RecentEvents};
use crate::recommend::{
    ConfidenceScorer, FeedbackAdjuster, FeedbackReport, PendingSuggestions,
    RecommendationGenerator,
};
use crate::store::{ActionProfile, PatternStore};
use crate::telemetry::{ObservabilitySink, StatusSnapshot};
use chrono::{DateTime, Utc};
use drivesense_common::{
    DriveSenseError, Notice, ProfileKey, RawActionRecord, RawFeedbackRecord, Result, Suggestion,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::instrument;

/// Result of ingesting one driver action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    Recorded { key: ProfileKey },
    Duplicate { idempotency_key: String },
}

pub struct Engine {
    config: DriveSenseConfig,
    clock: SessionClock,
    normalizer: EventNormalizer,
    recent: RecentEvents,
    store: PatternStore,
    pending: PendingSuggestions,
    generator: RecommendationGenerator,
    feedback: FeedbackAdjuster,
    observer: Arc<dyn ObservabilitySink>,
}

impl Engine {
    pub fn new(
        config: DriveSenseConfig,
        clock: SessionClock,
        observer: Arc<dyn ObservabilitySink>,
    ) -> Result<Self> {
        config.validate()?;
        let offset = config.ingest.utc_offset().ok_or_else(|| {
            DriveSenseError::Config(format!(
                "invalid utc offset {} minutes",
                config.ingest.utc_offset_minutes
            ))
        })?;

        let scorer = ConfidenceScorer::from_settings(&config.learning, &config.scoring);

        Ok(Self {
            normalizer: EventNormalizer::new(offset),
            recent: RecentEvents::new(config.ingest.dedup_window(), config.ingest.dedup_capacity),
            store: PatternStore::new(config.quantization.clone()),
            pending: PendingSuggestions::new(config.learning.suggestion_ttl()),
            generator: RecommendationGenerator::new(&config.learning, scorer, offset),
            feedback: FeedbackAdjuster::new(config.feedback.clone()),
            clock,
            observer,
            config,
        })
    }

    /// Validate, deduplicate, and record one driver action
    #[instrument(skip(self, raw), fields(user_id = ?raw.user_id, action = ?raw.action))]
    pub fn ingest(&self, raw: &RawActionRecord, now: DateTime<Utc>) -> Result<IngestOutcome> {
        let event = match self.normalizer.normalize(raw, now) {
            Ok(event) => event,
            Err(e) => {
                let err = DriveSenseError::from(e);
                self.observer.event_dropped(&err);
                return Err(err);
            }
        };

        if !self.recent.check_and_record(&event.idempotency_key, now) {
            self.observer.event_duplicate(&event.idempotency_key);
            return Ok(IngestOutcome::Duplicate {
                idempotency_key: event.idempotency_key,
            });
        }

        self.store.observe(&event.user_id, &event);
        let key = ProfileKey::new(event.user_id, event.action_type);
        self.observer.event_recorded(&key);

        Ok(IngestOutcome::Recorded { key })
    }

    /// Apply an accept/dismiss response. Unknown suggestions are not an error.
    #[instrument(skip(self, raw))]
    pub fn feedback(&self, raw: &RawFeedbackRecord, now: DateTime<Utc>) -> Result<FeedbackReport> {
        let response = match self.normalizer.normalize_feedback(raw) {
            Ok(response) => response,
            Err(e) => {
                let err = DriveSenseError::from(e);
                self.observer.event_dropped(&err);
                return Err(err);
            }
        };

        Ok(self
            .feedback
            .apply(&response, &self.pending, &self.store, now, self.observer.as_ref()))
    }

    /// Recommendation tick
    pub fn tick(&self, now: DateTime<Utc>) -> Option<Suggestion> {
        let suggestion =
            self.generator
                .tick(&self.store, &self.pending, &self.clock, now, self.observer.as_ref())?;
        self.observer.suggestion_emitted(&suggestion);
        Some(suggestion)
    }

    pub fn break_reminder(&self, now: DateTime<Utc>) -> Option<Notice> {
        let notice = self.generator.break_reminder(&self.clock, now)?;
        self.observer.notice_emitted(&notice);
        Some(notice)
    }

    pub fn status(&self, now: DateTime<Utc>) -> StatusSnapshot {
        let users: HashSet<String> = self.store.keys().into_iter().map(|k| k.user_id).collect();
        StatusSnapshot {
            phase: self.phase(),
            elapsed_secs: self.clock.elapsed(now).num_seconds(),
            profiles: self.store.len(),
            users: users.len(),
            pending_suggestions: self.pending.list(now).len(),
            recommendations_sent: self.generator.sent(),
            recommendations_remaining: self.generator.remaining(),
        }
    }

    /// Emit a status snapshot and sweep passive expiry state
    pub fn report_status(&self, now: DateTime<Utc>) -> StatusSnapshot {
        self.recent.sweep(now);
        self.pending.sweep(now);
        let status = self.status(now);
        self.observer.status(&status);
        status
    }

    pub fn pending(&self, now: DateTime<Utc>) -> Vec<Suggestion> {
        self.pending.list(now)
    }

    pub fn profiles(&self, user_id: &str) -> Vec<ActionProfile> {
        self.store.snapshots(user_id)
    }

    pub fn phase(&self) -> Phase {
        self.generator.phase()
    }

    pub fn store(&self) -> &PatternStore {
        &self.store
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    pub fn config(&self) -> &DriveSenseConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::tests::RecordingSink;
    use chrono::{Duration, TimeZone};
    use drivesense_common::{ActionType, FeedbackOutcome};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    fn engine() -> (Engine, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let config = DriveSenseConfig::default();
        let clock = SessionClock::new(start(), config.learning.learning_period());
        let engine = Engine::new(config, clock, sink.clone()).unwrap();
        (engine, sink)
    }

    #[test]
    fn test_ingest_records_and_deduplicates() {
        let (engine, sink) = engine();
        let raw = RawActionRecord::new("driver-1", "climate_set_temperature")
            .with_event_id("evt-1")
            .with_value(22);

        assert!(matches!(
            engine.ingest(&raw, start()).unwrap(),
            IngestOutcome::Recorded { .. }
        ));
        assert!(matches!(
            engine.ingest(&raw, start()).unwrap(),
            IngestOutcome::Duplicate { .. }
        ));
        assert_eq!(*sink.duplicates.lock(), 1);
        assert_eq!(
            engine
                .store()
                .query("driver-1", ActionType::Climate)
                .unwrap()
                .occurrence_count,
            1
        );
    }

    #[test]
    fn test_unstamped_repeats_are_each_counted() {
        let (engine, sink) = engine();
        let raw = RawActionRecord::new("driver-1", "lights_turn_on");

        for secs in [0, 60, 120] {
            assert!(matches!(
                engine.ingest(&raw, start() + Duration::seconds(secs)).unwrap(),
                IngestOutcome::Recorded { .. }
            ));
        }
        assert_eq!(*sink.duplicates.lock(), 0);
        assert_eq!(
            engine
                .store()
                .query("driver-1", ActionType::Lighting)
                .unwrap()
                .occurrence_count,
            3
        );
    }

    #[test]
    fn test_invalid_records_are_dropped_and_reported() {
        let (engine, sink) = engine();
        let raw = RawActionRecord::new("driver-1", "climate").with_value(45);

        assert!(matches!(
            engine.ingest(&raw, start()),
            Err(DriveSenseError::Validation(_))
        ));
        assert!(engine
            .feedback(&RawFeedbackRecord::new("nope", "accepted"), start())
            .is_err());
        assert_eq!(sink.dropped.lock().len(), 2);
        assert!(engine.store().is_empty());
    }

    #[test]
    fn test_round_trip_suggestion_and_feedback() {
        let (engine, sink) = engine();
        for i in 0..5 {
            let raw = RawActionRecord::new("driver-1", "climate")
                .with_event_id(format!("evt-{}", i))
                .with_value(22)
                .with_timestamp("2024-03-01T08:00:00Z");
            engine.ingest(&raw, start()).unwrap();
        }

        let suggestion = engine.tick(start() + Duration::seconds(31)).unwrap();
        assert_eq!(engine.pending(start() + Duration::seconds(32)).len(), 1);

        let report = engine
            .feedback(
                &RawFeedbackRecord::new(suggestion.id.to_string(), "accepted"),
                start() + Duration::seconds(35),
            )
            .unwrap();
        assert!(matches!(
            report,
            FeedbackReport::Applied {
                outcome: FeedbackOutcome::Accepted,
                ..
            }
        ));
        assert_eq!(sink.applied.lock().len(), 1);

        // Second answer for the same suggestion is ignored
        let report = engine
            .feedback(
                &RawFeedbackRecord::new(suggestion.id.to_string(), "dismissed"),
                start() + Duration::seconds(36),
            )
            .unwrap();
        assert_eq!(report, FeedbackReport::Ignored);
    }

    #[test]
    fn test_status() {
        let (engine, _) = engine();
        engine
            .ingest(&RawActionRecord::new("a", "lights_turn_on"), start())
            .unwrap();
        engine
            .ingest(&RawActionRecord::new("b", "seats_adjust").with_value(3), start())
            .unwrap();

        let status = engine.report_status(start() + Duration::seconds(10));
        assert_eq!(status.phase, Phase::Observing);
        assert_eq!(status.profiles, 2);
        assert_eq!(status.users, 2);
        assert_eq!(status.elapsed_secs, 10);
        assert_eq!(status.recommendations_remaining, 50);
    }
}
