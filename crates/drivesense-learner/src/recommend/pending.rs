//! Outstanding suggestions
//!
//! Suggestions wait here until the driver answers or they expire. Expiry is
//! passive: entries are checked on read and swept once per tick.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use drivesense_common::{ProfileKey, Suggestion};
use tracing::debug;
use uuid::Uuid;

/// Time-bounded index of suggestions awaiting feedback
pub struct PendingSuggestions {
    /// Suggestion id -> suggestion
    by_id: DashMap<Uuid, Suggestion>,
    /// Profile -> its outstanding suggestion id
    by_key: DashMap<ProfileKey, Uuid>,
    ttl: Duration,
}

impl PendingSuggestions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            by_id: DashMap::new(),
            by_key: DashMap::new(),
            ttl,
        }
    }

    pub fn insert(&self, suggestion: Suggestion) {
        if let Some(previous) = self.by_key.insert(suggestion.key(), suggestion.id) {
            self.by_id.remove(&previous);
        }
        self.by_id.insert(suggestion.id, suggestion);
    }

    /// True while the profile has an unexpired, unanswered suggestion
    pub fn is_outstanding(&self, key: &ProfileKey, now: DateTime<Utc>) -> bool {
        let Some(id) = self.by_key.get(key).map(|e| *e.value()) else {
            return false;
        };
        self.by_id
            .get(&id)
            .map(|s| !self.is_expired(&s, now))
            .unwrap_or(false)
    }

    /// Remove and return a suggestion. Expired or unknown ids yield `None`.
    pub fn resolve(&self, id: Uuid, now: DateTime<Utc>) -> Option<Suggestion> {
        let (_, suggestion) = self.by_id.remove(&id)?;
        self.by_key.remove_if(&suggestion.key(), |_, pending| *pending == id);

        if self.is_expired(&suggestion, now) {
            debug!(suggestion_id = %id, "Feedback for expired suggestion");
            return None;
        }
        Some(suggestion)
    }

    /// Drop expired entries, returning how many were removed
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.by_id.len();
        self.by_id.retain(|_, s| now - s.generated_at < self.ttl);
        self.by_key.retain(|_, id| self.by_id.contains_key(id));
        before.saturating_sub(self.by_id.len())
    }

    /// Unexpired suggestions, oldest first
    pub fn list(&self, now: DateTime<Utc>) -> Vec<Suggestion> {
        let mut out: Vec<Suggestion> = self
            .by_id
            .iter()
            .filter(|e| !self.is_expired(e.value(), now))
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|s| s.generated_at);
        out
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn is_expired(&self, suggestion: &Suggestion, now: DateTime<Utc>) -> bool {
        now - suggestion.generated_at >= self.ttl
    }
}
