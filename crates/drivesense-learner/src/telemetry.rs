//! Telemetry and outbound sinks
//!
//! Two seams leave the core:
//! - [`ObservabilitySink`]: drops, resets, and status snapshots (logs + Prometheus)
//! - [`RecommendationSink`]: suggestions and notices for the driver

use crate::clock::Phase;
use async_trait::async_trait;
use drivesense_common::{
    DriveSenseError, FeedbackOutcome, Notice, OutboundMessage, ProfileKey, Result, Suggestion,
};
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Prometheus metrics for the learner
pub struct Metrics {
    pub events_received: IntCounter,
    pub events_deduplicated: IntCounter,
    /// Labelled by error kind
    pub events_dropped: IntCounterVec,
    pub suggestions_emitted: IntCounter,
    pub notices_emitted: IntCounter,
    /// Labelled by outcome: accepted, dismissed, ignored
    pub feedback: IntCounterVec,
    pub profile_resets: IntCounter,
    pub active_profiles: IntGauge,
    pub pending_suggestions: IntGauge,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            events_received: IntCounter::new(
                "drivesense_events_received_total",
                "Driver actions recorded into the pattern store",
            )?,
            events_deduplicated: IntCounter::new(
                "drivesense_events_deduplicated_total",
                "Redelivered driver actions ignored",
            )?,
            events_dropped: IntCounterVec::new(
                Opts::new("drivesense_events_dropped_total", "Inbound records rejected"),
                &["kind"],
            )?,
            suggestions_emitted: IntCounter::new(
                "drivesense_suggestions_emitted_total",
                "Suggestions published",
            )?,
            notices_emitted: IntCounter::new(
                "drivesense_notices_emitted_total",
                "Notices published",
            )?,
            feedback: IntCounterVec::new(
                Opts::new("drivesense_feedback_total", "Feedback responses by outcome"),
                &["outcome"],
            )?,
            profile_resets: IntCounter::new(
                "drivesense_profile_resets_total",
                "Profiles reset after failing an invariant check",
            )?,
            active_profiles: IntGauge::new(
                "drivesense_active_profiles",
                "Profiles held by the pattern store",
            )?,
            pending_suggestions: IntGauge::new(
                "drivesense_pending_suggestions",
                "Suggestions awaiting feedback",
            )?,
        })
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.events_received.clone()))?;
        registry.register(Box::new(self.events_deduplicated.clone()))?;
        registry.register(Box::new(self.events_dropped.clone()))?;
        registry.register(Box::new(self.suggestions_emitted.clone()))?;
        registry.register(Box::new(self.notices_emitted.clone()))?;
        registry.register(Box::new(self.feedback.clone()))?;
        registry.register(Box::new(self.profile_resets.clone()))?;
        registry.register(Box::new(self.active_profiles.clone()))?;
        registry.register(Box::new(self.pending_suggestions.clone()))?;
        Ok(())
    }
}

/// Periodic engine status
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub phase: Phase,
    pub elapsed_secs: i64,
    pub profiles: usize,
    pub users: usize,
    pub pending_suggestions: usize,
    pub recommendations_sent: u32,
    pub recommendations_remaining: u32,
}

/// Receives everything worth observing that is not a driver-facing message
pub trait ObservabilitySink: Send + Sync {
    fn event_recorded(&self, key: &ProfileKey);
    fn event_duplicate(&self, idempotency_key: &str);
    fn event_dropped(&self, error: &DriveSenseError);
    fn suggestion_emitted(&self, suggestion: &Suggestion);
    fn notice_emitted(&self, notice: &Notice);
    fn feedback_applied(&self, key: &ProfileKey, outcome: FeedbackOutcome, weight: f64);
    fn feedback_ignored(&self, suggestion_id: Uuid);
    fn profile_reset(&self, key: &ProfileKey, reason: &str);
    fn status(&self, status: &StatusSnapshot);
}

/// Structured logs plus Prometheus counters
pub struct TracingSink {
    metrics: Arc<Metrics>,
}

impl TracingSink {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

impl ObservabilitySink for TracingSink {
    fn event_recorded(&self, key: &ProfileKey) {
        self.metrics.events_received.inc();
        debug!(key = %key, "Action recorded");
    }

    fn event_duplicate(&self, idempotency_key: &str) {
        self.metrics.events_deduplicated.inc();
        debug!(idempotency_key, "Duplicate action ignored");
    }

    fn event_dropped(&self, error: &DriveSenseError) {
        self.metrics.events_dropped.with_label_values(&[error.kind()]).inc();
        warn!(kind = error.kind(), error = %error, "Inbound record dropped");
    }

    fn suggestion_emitted(&self, suggestion: &Suggestion) {
        self.metrics.suggestions_emitted.inc();
        info!(
            suggestion_id = %suggestion.id,
            user_id = %suggestion.user_id,
            action_type = %suggestion.action_type,
            predicted = %suggestion.predicted_value,
            confidence = suggestion.confidence,
            "Suggestion emitted"
        );
    }

    fn notice_emitted(&self, notice: &Notice) {
        self.metrics.notices_emitted.inc();
        info!(kind = ?notice.kind, "Notice emitted");
    }

    fn feedback_applied(&self, key: &ProfileKey, outcome: FeedbackOutcome, weight: f64) {
        self.metrics.feedback.with_label_values(&[outcome.as_str()]).inc();
        info!(key = %key, outcome = outcome.as_str(), weight, "Feedback applied");
    }

    fn feedback_ignored(&self, suggestion_id: Uuid) {
        self.metrics.feedback.with_label_values(&["ignored"]).inc();
        debug!(suggestion_id = %suggestion_id, "Feedback for unknown or expired suggestion");
    }

    fn profile_reset(&self, key: &ProfileKey, reason: &str) {
        self.metrics.profile_resets.inc();
        warn!(key = %key, reason, "Corrupted profile reset");
    }

    fn status(&self, status: &StatusSnapshot) {
        self.metrics.active_profiles.set(status.profiles as i64);
        self.metrics.pending_suggestions.set(status.pending_suggestions as i64);
        info!(
            phase = ?status.phase,
            elapsed_secs = status.elapsed_secs,
            profiles = status.profiles,
            users = status.users,
            pending = status.pending_suggestions,
            sent = status.recommendations_sent,
            "Status"
        );
    }
}

/// Destination for driver-facing messages
#[async_trait]
pub trait RecommendationSink: Send + Sync {
    async fn publish(&self, message: OutboundMessage) -> Result<()>;
}

/// Fans outbound messages out to every subscriber (WebSocket clients, bridges)
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<OutboundMessage>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl RecommendationSink for BroadcastSink {
    async fn publish(&self, message: OutboundMessage) -> Result<()> {
        // No subscribers is not an error; the message is simply unseen
        if self.tx.send(message).is_err() {
            debug!("No recommendation subscribers");
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use drivesense_common::{ActionType, NoticeKind, ValidationError};
    use parking_lot::Mutex;

    /// Sink that remembers what it saw
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub dropped: Mutex<Vec<String>>,
        pub duplicates: Mutex<usize>,
        pub resets: Mutex<Vec<ProfileKey>>,
        pub ignored: Mutex<Vec<Uuid>>,
        pub applied: Mutex<Vec<(ProfileKey, FeedbackOutcome, f64)>>,
    }

    impl ObservabilitySink for RecordingSink {
        fn event_recorded(&self, _key: &ProfileKey) {}
        fn event_duplicate(&self, _idempotency_key: &str) {
            *self.duplicates.lock() += 1;
        }
        fn event_dropped(&self, error: &DriveSenseError) {
            self.dropped.lock().push(error.kind().to_string());
        }
        fn suggestion_emitted(&self, _suggestion: &Suggestion) {}
        fn notice_emitted(&self, _notice: &Notice) {}
        fn feedback_applied(&self, key: &ProfileKey, outcome: FeedbackOutcome, weight: f64) {
            self.applied.lock().push((key.clone(), outcome, weight));
        }
        fn feedback_ignored(&self, suggestion_id: Uuid) {
            self.ignored.lock().push(suggestion_id);
        }
        fn profile_reset(&self, key: &ProfileKey, _reason: &str) {
            self.resets.lock().push(key.clone());
        }
        fn status(&self, _status: &StatusSnapshot) {}
    }

    #[test]
    fn test_metrics_register_and_count() {
        let registry = Registry::new();
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.register(&registry).unwrap();

        let sink = TracingSink::new(Arc::clone(&metrics));
        sink.event_dropped(&ValidationError::MissingField("user_id").into());
        sink.feedback_ignored(Uuid::new_v4());
        sink.profile_reset(&ProfileKey::new("a", ActionType::Seat), "test");

        assert_eq!(
            metrics.events_dropped.with_label_values(&["validation"]).get(),
            1
        );
        assert_eq!(metrics.feedback.with_label_values(&["ignored"]).get(), 1);
        assert_eq!(metrics.profile_resets.get(), 1);
        assert!(!registry.gather().is_empty());
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        let metrics = Metrics::new().unwrap();
        metrics.register(&registry).unwrap();
        assert!(metrics.register(&registry).is_err());
    }

    #[tokio::test]
    async fn test_broadcast_sink_delivers_to_subscribers() {
        let sink = BroadcastSink::new(8);
        // Publishing with nobody listening is fine
        let notice = Notice {
            kind: NoticeKind::TakeBreak,
            message: "break".into(),
            issued_at: chrono::Utc::now(),
        };
        sink.publish(OutboundMessage::Notice(notice.clone())).await.unwrap();

        let mut rx = sink.subscribe();
        sink.publish(OutboundMessage::Notice(notice.clone())).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), OutboundMessage::Notice(notice));
    }
}
