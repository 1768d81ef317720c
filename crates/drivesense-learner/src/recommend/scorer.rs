//! Confidence scorer
//!
//! Turns a profile snapshot into a predicted value and a confidence in
//! [0, 1]. Deterministic and read-only.

use crate::config::{LearningSettings, ScoringSettings};
use crate::store::{ActionProfile, ValueHistogram};
use chrono::{DateTime, Duration, Utc};
use drivesense_common::{DriveSenseError, QuantizedValue, Result, TimeBucket};
use serde::Serialize;

/// Evaluation context for one tick
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext {
    pub now: DateTime<Utc>,
    /// Local time bucket of `now`
    pub time_bucket: TimeBucket,
    /// Profiles seen since this instant count as fresh
    pub session_started_at: DateTime<Utc>,
}

/// Scorer output with its intermediate factors
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Score {
    pub predicted_value: QuantizedValue,
    pub confidence: f64,
    /// Share of the mode in the histogram it was taken from
    pub raw_ratio: f64,
    pub recency: f64,
    /// True when the time-bucket histogram was used
    pub contextual: bool,
}

#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    min_observations: u64,
    recency_floor: f64,
    staleness_horizon: Duration,
}

impl ConfidenceScorer {
    pub fn new(min_observations: u64, recency_floor: f64, staleness_horizon: Duration) -> Self {
        Self {
            min_observations,
            recency_floor: recency_floor.clamp(0.0, 1.0),
            staleness_horizon,
        }
    }

    pub fn from_settings(learning: &LearningSettings, scoring: &ScoringSettings) -> Self {
        Self::new(
            learning.min_observations,
            scoring.recency_floor,
            scoring.staleness_horizon(),
        )
    }

    /// Score a profile. `Ok(None)` for a profile with no observations yet.
    pub fn score(&self, profile: &ActionProfile, ctx: &ScoringContext) -> Result<Option<Score>> {
        if profile.value_histogram.is_empty() {
            if profile.occurrence_count > 0 {
                return Err(DriveSenseError::StoreCorruption {
                    key: profile.key().to_string(),
                    reason: format!(
                        "empty value histogram with occurrence_count {}",
                        profile.occurrence_count
                    ),
                });
            }
            return Ok(None);
        }

        let (histogram, contextual) = match profile.values_in(ctx.time_bucket) {
            Some(h) => (h, true),
            None => (&profile.value_histogram, false),
        };

        let total: u64 = histogram.values().sum();
        if total == 0 {
            return Err(DriveSenseError::StoreCorruption {
                key: profile.key().to_string(),
                reason: "value histogram holds only zero counts".into(),
            });
        }
        let Some((predicted_value, count)) = mode(histogram, profile.last_value) else {
            return Ok(None);
        };

        let raw_ratio = count as f64 / total as f64;
        let recency = self.recency(profile.last_seen, ctx.session_started_at);

        let confidence = if profile.occurrence_count < self.min_observations {
            0.0
        } else {
            (raw_ratio * recency * profile.weight).clamp(0.0, 1.0)
        };

        Ok(Some(Score {
            predicted_value,
            confidence,
            raw_ratio,
            recency,
            contextual,
        }))
    }

    /// 1.0 for profiles touched this session, decaying linearly to the floor
    pub fn recency(&self, last_seen: Option<DateTime<Utc>>, session_started_at: DateTime<Utc>) -> f64 {
        let Some(last_seen) = last_seen else {
            return self.recency_floor;
        };

        let staleness = session_started_at - last_seen;
        if staleness <= Duration::zero() {
            return 1.0;
        }
        if self.staleness_horizon <= Duration::zero() || staleness >= self.staleness_horizon {
            return self.recency_floor;
        }

        let fraction = staleness.num_milliseconds() as f64 / self.staleness_horizon.num_milliseconds() as f64;
        1.0 - (1.0 - self.recency_floor) * fraction
    }
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::from_settings(&LearningSettings::default(), &ScoringSettings::default())
    }
}

/// Most frequent value. Ties go to `last_value` when it is tied, else the lowest value.
fn mode(histogram: &ValueHistogram, last_value: Option<QuantizedValue>) -> Option<(QuantizedValue, u64)> {
    let max = histogram.values().copied().max().filter(|m| *m > 0)?;

    if let Some(last) = last_value {
        if histogram.get(&last) == Some(&max) {
            return Some((last, max));
        }
    }

    histogram
        .iter()
        .find(|(_, count)| **count == max)
        .map(|(value, count)| (*value, *count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use drivesense_common::{ActionType, ProfileKey};
    use proptest::prelude::*;

    fn session_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 7, 0, 0).unwrap()
    }

    fn ctx(bucket: TimeBucket) -> ScoringContext {
        ScoringContext {
            now: session_start() + Duration::hours(1),
            time_bucket: bucket,
            session_started_at: session_start(),
        }
    }

    fn profile_with(entries: &[(QuantizedValue, TimeBucket, u32)]) -> ActionProfile {
        let key = ProfileKey::new("driver-1", ActionType::Climate);
        let mut profile = ActionProfile::new(&key, session_start());
        let ts = session_start() + Duration::minutes(10);
        for (value, bucket, n) in entries {
            for _ in 0..*n {
                profile.record(*value, *bucket, ts);
            }
        }
        profile
    }

    #[test]
    fn test_context_bucket_drives_prediction() {
        let profile = profile_with(&[
            (QuantizedValue::Level(22), TimeBucket::Morning, 5),
            (QuantizedValue::Level(18), TimeBucket::Evening, 1),
        ]);

        let score = ConfidenceScorer::default()
            .score(&profile, &ctx(TimeBucket::Morning))
            .unwrap()
            .unwrap();
        assert_eq!(score.predicted_value, QuantizedValue::Level(22));
        assert_eq!(score.raw_ratio, 1.0);
        assert!(score.contextual);
        assert_eq!(score.confidence, 1.0);

        let score = ConfidenceScorer::default()
            .score(&profile, &ctx(TimeBucket::Evening))
            .unwrap()
            .unwrap();
        assert_eq!(score.predicted_value, QuantizedValue::Level(18));
    }

    #[test]
    fn test_falls_back_to_global_histogram() {
        let profile = profile_with(&[
            (QuantizedValue::Level(22), TimeBucket::Morning, 3),
            (QuantizedValue::Level(18), TimeBucket::Evening, 1),
        ]);

        let score = ConfidenceScorer::default()
            .score(&profile, &ctx(TimeBucket::Night))
            .unwrap()
            .unwrap();
        assert!(!score.contextual);
        assert_eq!(score.predicted_value, QuantizedValue::Level(22));
        assert_eq!(score.raw_ratio, 0.75);
    }

    #[test]
    fn test_below_min_observations_scores_zero() {
        let profile = profile_with(&[(QuantizedValue::On, TimeBucket::Morning, 2)]);
        let score = ConfidenceScorer::default()
            .score(&profile, &ctx(TimeBucket::Morning))
            .unwrap()
            .unwrap();
        assert_eq!(score.predicted_value, QuantizedValue::On);
        assert_eq!(score.confidence, 0.0);
    }

    #[test]
    fn test_mode_tie_prefers_last_value_then_lowest() {
        let mut profile = profile_with(&[
            (QuantizedValue::Level(20), TimeBucket::Morning, 2),
            (QuantizedValue::Level(24), TimeBucket::Morning, 2),
        ]);
        let score = ConfidenceScorer::default()
            .score(&profile, &ctx(TimeBucket::Morning))
            .unwrap()
            .unwrap();
        assert_eq!(score.predicted_value, QuantizedValue::Level(24));

        profile.last_value = Some(QuantizedValue::Level(26));
        let score = ConfidenceScorer::default()
            .score(&profile, &ctx(TimeBucket::Morning))
            .unwrap()
            .unwrap();
        assert_eq!(score.predicted_value, QuantizedValue::Level(20));
    }

    #[test]
    fn test_weight_scales_and_clamps() {
        let mut profile = profile_with(&[
            (QuantizedValue::Level(22), TimeBucket::Morning, 3),
            (QuantizedValue::Level(18), TimeBucket::Morning, 1),
        ]);
        profile.weight = 2.0;
        let score = ConfidenceScorer::default()
            .score(&profile, &ctx(TimeBucket::Morning))
            .unwrap()
            .unwrap();
        assert_eq!(score.confidence, 1.0);

        profile.weight = 0.5;
        let score = ConfidenceScorer::default()
            .score(&profile, &ctx(TimeBucket::Morning))
            .unwrap()
            .unwrap();
        assert!((score.confidence - 0.375).abs() < 1e-9);
    }

    #[test]
    fn test_empty_profile_and_corruption() {
        let key = ProfileKey::new("driver-1", ActionType::Seat);
        let mut profile = ActionProfile::new(&key, session_start());
        let scorer = ConfidenceScorer::default();
        assert_eq!(scorer.score(&profile, &ctx(TimeBucket::Morning)).unwrap(), None);

        profile.occurrence_count = 3;
        assert!(matches!(
            scorer.score(&profile, &ctx(TimeBucket::Morning)),
            Err(DriveSenseError::StoreCorruption { .. })
        ));
    }

    #[test]
    fn test_recency_decay() {
        let scorer = ConfidenceScorer::new(3, 0.5, Duration::days(7));
        let start = session_start();

        assert_eq!(scorer.recency(Some(start + Duration::minutes(1)), start), 1.0);
        assert_eq!(scorer.recency(Some(start), start), 1.0);
        assert!((scorer.recency(Some(start - Duration::hours(84)), start) - 0.75).abs() < 1e-9);
        assert_eq!(scorer.recency(Some(start - Duration::days(30)), start), 0.5);
        assert_eq!(scorer.recency(None, start), 0.5);
    }

    proptest! {
        #[test]
        fn prop_confidence_bounded_and_predicted_in_histogram(
            counts in proptest::collection::vec(0u32..20, 1..8),
            weight in 0.1f64..=2.0,
            stale_hours in 0i64..400,
        ) {
            let entries: Vec<_> = counts
                .iter()
                .enumerate()
                .map(|(i, n)| (QuantizedValue::Level(16 + 2 * i as i32), TimeBucket::Midday, *n))
                .collect();
            let mut profile = profile_with(&entries);
            prop_assume!(profile.occurrence_count > 0);
            profile.weight = weight;
            profile.last_seen = Some(session_start() - Duration::hours(stale_hours));

            let score = ConfidenceScorer::default()
                .score(&profile, &ctx(TimeBucket::Midday))
                .unwrap()
                .unwrap();
            prop_assert!((0.0..=1.0).contains(&score.confidence));
            prop_assert!(profile.value_histogram.contains_key(&score.predicted_value));
        }

        #[test]
        fn prop_confidence_non_increasing_in_staleness(a in 0i64..400, b in 0i64..400) {
            let (fresh, stale) = if a <= b { (a, b) } else { (b, a) };
            let mut profile = profile_with(&[
                (QuantizedValue::Level(22), TimeBucket::Midday, 4),
                (QuantizedValue::Level(18), TimeBucket::Midday, 1),
            ]);
            let scorer = ConfidenceScorer::default();

            profile.last_seen = Some(session_start() - Duration::hours(fresh));
            let c_fresh = scorer.score(&profile, &ctx(TimeBucket::Midday)).unwrap().unwrap().confidence;
            profile.last_seen = Some(session_start() - Duration::hours(stale));
            let c_stale = scorer.score(&profile, &ctx(TimeBucket::Midday)).unwrap().unwrap().confidence;

            prop_assert!(c_stale <= c_fresh);
        }

        #[test]
        fn prop_confidence_non_decreasing_in_ratio(low in 1u32..10, extra in 0u32..10, others in 1u32..10) {
            // Same total mass of competing values, more mass on the mode
            let scorer = ConfidenceScorer::default();
            let make = |mode_count: u32| {
                profile_with(&[
                    (QuantizedValue::Level(22), TimeBucket::Midday, mode_count + others),
                    (QuantizedValue::Level(18), TimeBucket::Midday, others),
                ])
            };
            let a = scorer.score(&make(low), &ctx(TimeBucket::Midday)).unwrap().unwrap();
            let b = scorer.score(&make(low + extra), &ctx(TimeBucket::Midday)).unwrap().unwrap();

            prop_assert!(b.raw_ratio >= a.raw_ratio);
            prop_assert!(b.confidence >= a.confidence);
        }
    }
}
