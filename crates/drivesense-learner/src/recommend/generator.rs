//! Recommendation generator
//!
//! Observing -> Recommending state machine driven by the tick timer. Each
//! tick in Recommending scores every eligible profile and publishes at most
//! one suggestion: the most confident one, if it clears the threshold.

use super::pending::PendingSuggestions;
use super::scorer::{ConfidenceScorer, Score, ScoringContext};
use super::templates;
use crate::clock::{Phase, SessionClock};
use crate::config::LearningSettings;
use crate::store::PatternStore;
use crate::telemetry::ObservabilitySink;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use drivesense_common::{Notice, NoticeKind, ProfileKey, Suggestion, TimeBucket};
use ordered_float::OrderedFloat;
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// A scored profile competing for the next suggestion slot
#[derive(Debug, Clone)]
pub struct Candidate {
    pub key: ProfileKey,
    pub score: Score,
}

impl Candidate {
    /// Highest confidence first, then action type, then user id
    fn rank(&self, other: &Self) -> CmpOrdering {
        OrderedFloat(other.score.confidence)
            .cmp(&OrderedFloat(self.score.confidence))
            .then_with(|| self.key.action_type.cmp(&other.key.action_type))
            .then_with(|| self.key.user_id.cmp(&other.key.user_id))
    }
}

pub struct RecommendationGenerator {
    scorer: ConfidenceScorer,
    /// Local offset used to bucket the tick time
    offset: FixedOffset,
    publish_threshold: f64,
    max_per_session: u32,
    recent_action_cooldown: Duration,
    greeting: String,
    break_reminder_after: Option<Duration>,
    phase: Mutex<Phase>,
    sent: AtomicU32,
    break_sent: AtomicBool,
}

impl RecommendationGenerator {
    pub fn new(learning: &LearningSettings, scorer: ConfidenceScorer, offset: FixedOffset) -> Self {
        Self {
            scorer,
            offset,
            publish_threshold: learning.publish_threshold,
            max_per_session: learning.max_recommendations_per_session,
            recent_action_cooldown: learning.recent_action_cooldown(),
            greeting: learning.greeting.clone(),
            break_reminder_after: learning.break_reminder_after(),
            phase: Mutex::new(Phase::Observing),
            sent: AtomicU32::new(0),
            break_sent: AtomicBool::new(false),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    /// Suggestions published this session
    pub fn sent(&self) -> u32 {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> u32 {
        self.max_per_session.saturating_sub(self.sent())
    }

    pub fn scorer(&self) -> &ConfidenceScorer {
        &self.scorer
    }

    /// One timer tick. Returns the suggestion to publish, if any.
    #[instrument(skip_all, fields(now = %now))]
    pub fn tick(
        &self,
        store: &PatternStore,
        pending: &PendingSuggestions,
        clock: &SessionClock,
        now: DateTime<Utc>,
        observer: &dyn ObservabilitySink,
    ) -> Option<Suggestion> {
        if self.advance(clock, now) == Phase::Observing {
            debug!(elapsed_secs = clock.elapsed(now).num_seconds(), "Still observing");
            return None;
        }

        let expired = pending.sweep(now);
        if expired > 0 {
            debug!(expired, "Expired pending suggestions");
        }

        if self.remaining() == 0 {
            debug!(cap = self.max_per_session, "Recommendation cap reached");
            return None;
        }

        let ctx = self.context(clock, now);
        let best = self.candidates(store, pending, &ctx, observer).into_iter().min_by(Candidate::rank)?;

        if best.score.confidence <= self.publish_threshold {
            debug!(
                key = %best.key,
                confidence = best.score.confidence,
                threshold = self.publish_threshold,
                "Best candidate below threshold"
            );
            return None;
        }

        // Reserve a slot under the cap
        let max = self.max_per_session;
        if self
            .sent
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .is_err()
        {
            return None;
        }

        let suggestion = Suggestion {
            id: Uuid::new_v4(),
            user_id: best.key.user_id.clone(),
            action_type: best.key.action_type,
            predicted_value: best.score.predicted_value,
            confidence: best.score.confidence,
            message: templates::render(&self.greeting, best.key.action_type, best.score.predicted_value),
            time_bucket: ctx.time_bucket,
            generated_at: now,
        };
        pending.insert(suggestion.clone());

        Some(suggestion)
    }

    /// Every eligible profile with its score. Corrupted profiles are reset
    /// and reported, never scored.
    ///
    /// Keys with an unexpired outstanding suggestion, and keys acted on within
    /// the recent-action cooldown, are excluded here, before ranking. A tick
    /// whose overall best key is outstanding therefore publishes the next-best
    /// eligible key instead of emitting nothing.
    pub fn candidates(
        &self,
        store: &PatternStore,
        pending: &PendingSuggestions,
        ctx: &ScoringContext,
        observer: &dyn ObservabilitySink,
    ) -> Vec<Candidate> {
        store
            .keys()
            .into_iter()
            .filter_map(|key| {
                let profile = store.snapshot(&key)?;

                if let Err(reason) = profile.check_invariants() {
                    store.reset(&key, ctx.now);
                    observer.profile_reset(&key, &reason);
                    return None;
                }
                if pending.is_outstanding(&key, ctx.now) {
                    return None;
                }
                if profile
                    .last_seen
                    .is_some_and(|seen| ctx.now - seen < self.recent_action_cooldown)
                {
                    return None;
                }

                match self.scorer.score(&profile, ctx) {
                    Ok(score) => score.map(|score| Candidate { key, score }),
                    Err(e) => {
                        store.reset(&key, ctx.now);
                        observer.profile_reset(&key, &e.to_string());
                        None
                    }
                }
            })
            .collect()
    }

    /// One-shot break reminder once the session runs long enough
    pub fn break_reminder(&self, clock: &SessionClock, now: DateTime<Utc>) -> Option<Notice> {
        let after = self.break_reminder_after?;
        let elapsed = clock.elapsed(now);
        if elapsed <= after || self.break_sent.swap(true, Ordering::SeqCst) {
            return None;
        }

        Some(Notice {
            kind: NoticeKind::TakeBreak,
            message: templates::break_reminder(elapsed.num_minutes()),
            issued_at: now,
        })
    }

    pub fn context(&self, clock: &SessionClock, now: DateTime<Utc>) -> ScoringContext {
        ScoringContext {
            now,
            time_bucket: TimeBucket::at(now, self.offset),
            session_started_at: clock.started_at(),
        }
    }

    fn advance(&self, clock: &SessionClock, now: DateTime<Utc>) -> Phase {
        let mut phase = self.phase.lock();
        if *phase == Phase::Observing && clock.learning_complete(now) {
            *phase = Phase::Recommending;
            info!(
                learning_period_secs = clock.learning_period().num_seconds(),
                "Learning period complete, recommending"
            );
        }
        *phase
    }
}
