//! Action profile
//!
//! Running statistics for one (user, action type) pair. Every counter is a
//! plain increment, so a profile is a pure function of the events (and
//! accepted reinforcements) applied to it.

use chrono::{DateTime, Utc};
use drivesense_common::{ActionType, ProfileKey, QuantizedValue, TimeBucket};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value counts keyed by quantized bucket
pub type ValueHistogram = BTreeMap<QuantizedValue, u64>;

/// Accumulated statistics of one driver's choices for one action type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionProfile {
    pub user_id: String,
    pub action_type: ActionType,
    /// Total observations (events plus accepted reinforcements)
    pub occurrence_count: u64,
    /// Counts per quantized value
    pub value_histogram: ValueHistogram,
    /// Counts per time-of-day bucket
    pub time_bucket_histogram: BTreeMap<TimeBucket, u64>,
    /// Value counts split by time-of-day bucket
    pub context_histogram: BTreeMap<TimeBucket, ValueHistogram>,
    /// Most recently observed value
    pub last_value: Option<QuantizedValue>,
    /// Latest event timestamp seen
    pub last_seen: Option<DateTime<Utc>>,
    /// Feedback weight, 1.0 is neutral
    pub weight: f64,
    /// Accepted suggestions folded back into the histograms
    pub reinforcements: u64,
    pub created_at: DateTime<Utc>,
}

impl ActionProfile {
    pub fn new(key: &ProfileKey, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id: key.user_id.clone(),
            action_type: key.action_type,
            occurrence_count: 0,
            value_histogram: BTreeMap::new(),
            time_bucket_histogram: BTreeMap::new(),
            context_histogram: BTreeMap::new(),
            last_value: None,
            last_seen: None,
            weight: drivesense_common::DEFAULT_PROFILE_WEIGHT,
            reinforcements: 0,
            created_at,
        }
    }

    pub fn key(&self) -> ProfileKey {
        ProfileKey::new(self.user_id.clone(), self.action_type)
    }

    /// Fold one observation into the profile
    pub fn record(&mut self, value: QuantizedValue, bucket: TimeBucket, timestamp: DateTime<Utc>) {
        self.increment(value, bucket);
        self.last_value = Some(value);
        self.last_seen = Some(match self.last_seen {
            Some(seen) => seen.max(timestamp),
            None => timestamp,
        });
    }

    /// Extra increment for a confirmed prediction
    pub fn reinforce(&mut self, value: QuantizedValue, bucket: TimeBucket) {
        self.increment(value, bucket);
        self.reinforcements += 1;
    }

    /// Multiply the weight, clamped into `[min, max]`; returns the new weight
    pub fn scale_weight(&mut self, factor: f64, min: f64, max: f64) -> f64 {
        self.weight = (self.weight * factor).clamp(min, max);
        self.weight
    }

    /// Value histogram restricted to one time bucket
    pub fn values_in(&self, bucket: TimeBucket) -> Option<&ValueHistogram> {
        self.context_histogram
            .get(&bucket)
            .filter(|h| h.values().any(|c| *c > 0))
    }

    /// Check the counting invariants; returns the violated rule
    pub fn check_invariants(&self) -> Result<(), String> {
        let value_sum: u64 = self.value_histogram.values().sum();
        if value_sum != self.occurrence_count {
            return Err(format!(
                "value histogram sums to {} but occurrence_count is {}",
                value_sum, self.occurrence_count
            ));
        }

        let bucket_sum: u64 = self.time_bucket_histogram.values().sum();
        if bucket_sum != self.occurrence_count {
            return Err(format!(
                "time bucket histogram sums to {} but occurrence_count is {}",
                bucket_sum, self.occurrence_count
            ));
        }

        let context_sum: u64 = self
            .context_histogram
            .values()
            .flat_map(|h| h.values())
            .sum();
        if context_sum != self.occurrence_count {
            return Err(format!(
                "context histogram sums to {} but occurrence_count is {}",
                context_sum, self.occurrence_count
            ));
        }

        if !(0.0..=drivesense_common::MAX_PROFILE_WEIGHT).contains(&self.weight) {
            return Err(format!("weight {} outside [0, 2]", self.weight));
        }

        Ok(())
    }

    fn increment(&mut self, value: QuantizedValue, bucket: TimeBucket) {
        self.occurrence_count += 1;
        *self.value_histogram.entry(value).or_default() += 1;
        *self.time_bucket_histogram.entry(bucket).or_default() += 1;
        *self
            .context_histogram
            .entry(bucket)
            .or_default()
            .entry(value)
            .or_default() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn profile() -> ActionProfile {
        let key = ProfileKey::new("driver-1", ActionType::Climate);
        ActionProfile::new(&key, Utc.with_ymd_and_hms(2024, 3, 1, 7, 0, 0).unwrap())
    }

    #[test]
    fn test_record_updates_all_histograms() {
        let mut p = profile();
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();

        p.record(QuantizedValue::Level(22), TimeBucket::Morning, ts);
        p.record(QuantizedValue::Level(22), TimeBucket::Morning, ts);
        p.record(QuantizedValue::Level(18), TimeBucket::Evening, ts);

        assert_eq!(p.occurrence_count, 3);
        assert_eq!(p.value_histogram[&QuantizedValue::Level(22)], 2);
        assert_eq!(p.time_bucket_histogram[&TimeBucket::Evening], 1);
        assert_eq!(
            p.values_in(TimeBucket::Morning).unwrap()[&QuantizedValue::Level(22)],
            2
        );
        assert!(p.values_in(TimeBucket::Night).is_none());
        assert_eq!(p.last_value, Some(QuantizedValue::Level(18)));
        assert!(p.check_invariants().is_ok());
    }

    #[test]
    fn test_last_seen_never_moves_backwards() {
        let mut p = profile();
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();

        p.record(QuantizedValue::On, TimeBucket::Morning, ts);
        p.record(QuantizedValue::Off, TimeBucket::Morning, ts - Duration::hours(1));

        assert_eq!(p.last_seen, Some(ts));
        assert_eq!(p.last_value, Some(QuantizedValue::Off));
    }

    #[test]
    fn test_reinforce_keeps_invariants() {
        let mut p = profile();
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        p.record(QuantizedValue::Level(22), TimeBucket::Morning, ts);
        p.reinforce(QuantizedValue::Level(22), TimeBucket::Morning);

        assert_eq!(p.occurrence_count, 2);
        assert_eq!(p.reinforcements, 1);
        assert!(p.check_invariants().is_ok());
    }

    #[test]
    fn test_detects_histogram_mismatch() {
        let mut p = profile();
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        p.record(QuantizedValue::Level(22), TimeBucket::Morning, ts);
        p.occurrence_count = 5;

        let err = p.check_invariants().unwrap_err();
        assert!(err.contains("occurrence_count is 5"));
    }

    #[test]
    fn test_scale_weight_clamps() {
        let mut p = profile();
        assert_eq!(p.scale_weight(10.0, 0.1, 2.0), 2.0);
        assert_eq!(p.scale_weight(0.0, 0.1, 2.0), 0.1);
    }
}
