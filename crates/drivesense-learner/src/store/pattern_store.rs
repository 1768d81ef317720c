//! Pattern store with DashMap
//!
//! Owns every [`ActionProfile`]. Each (user, action type) key has its own
//! mutex inside a sharded map, so different users update in parallel while
//! observation and feedback on the same profile are mutually exclusive.

use super::profile::ActionProfile;
use crate::config::QuantizationSettings;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use drivesense_common::{ActionEvent, ActionType, ProfileKey};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

type ProfileCell = Arc<Mutex<ActionProfile>>;

/// Per-user, per-action running statistics
pub struct PatternStore {
    /// Profiles by key
    profiles: DashMap<ProfileKey, ProfileCell>,
    /// Bin widths, fixed for the lifetime of the store
    quantization: QuantizationSettings,
}

impl PatternStore {
    pub fn new(quantization: QuantizationSettings) -> Self {
        Self {
            profiles: DashMap::new(),
            quantization,
        }
    }

    /// Fold a validated event into the profile for (`user_id`, event type)
    #[instrument(skip(self, event), fields(action_type = %event.action_type))]
    pub fn observe(&self, user_id: &str, event: &ActionEvent) {
        let key = ProfileKey::new(user_id, event.action_type);
        let step = self.quantization.step_for(event.action_type);
        let value = event.value.quantize(event.action_type, step);

        // Producer clocks may run ahead; never record an action as seen after receipt
        let seen_at = event.timestamp.min(event.received_at);

        let cell = self.cell_or_create(&key, seen_at);
        let mut profile = cell.lock();
        profile.record(value, event.context.time_bucket, seen_at);

        debug!(
            key = %key,
            value = %value,
            occurrences = profile.occurrence_count,
            "Observed action"
        );
    }

    /// Consistent snapshot of one profile
    pub fn query(&self, user_id: &str, action_type: ActionType) -> Option<ActionProfile> {
        self.snapshot(&ProfileKey::new(user_id, action_type))
    }

    pub fn snapshot(&self, key: &ProfileKey) -> Option<ActionProfile> {
        let cell = self.profiles.get(key).map(|entry| Arc::clone(entry.value()))?;
        let profile = cell.lock().clone();
        Some(profile)
    }

    /// All profile keys, sorted
    pub fn keys(&self) -> Vec<ProfileKey> {
        let mut keys: Vec<ProfileKey> = self.profiles.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Snapshots of every profile belonging to one user
    pub fn snapshots(&self, user_id: &str) -> Vec<ActionProfile> {
        ActionType::ALL
            .iter()
            .filter_map(|t| self.query(user_id, *t))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Replace a corrupted profile with an empty one
    pub fn reset(&self, key: &ProfileKey, now: DateTime<Utc>) {
        if let Some(entry) = self.profiles.get(key) {
            *entry.value().lock() = ActionProfile::new(key, now);
            warn!(key = %key, "Profile reset");
        }
    }

    /// Run `f` with exclusive access to an existing profile
    pub(crate) fn modify<R>(
        &self,
        key: &ProfileKey,
        f: impl FnOnce(&mut ActionProfile) -> R,
    ) -> Option<R> {
        let cell = self.profiles.get(key).map(|entry| Arc::clone(entry.value()))?;
        let mut profile = cell.lock();
        Some(f(&mut profile))
    }

    pub fn quantization(&self) -> &QuantizationSettings {
        &self.quantization
    }

    fn cell_or_create(&self, key: &ProfileKey, now: DateTime<Utc>) -> ProfileCell {
        // Clone the Arc out so the shard lock is released before the profile lock
        let entry = self
            .profiles
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(ActionProfile::new(key, now))));
        Arc::clone(entry.value())
    }
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::new(QuantizationSettings::default())
    }
}
