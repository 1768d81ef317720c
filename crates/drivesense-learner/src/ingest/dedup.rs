//! Recent-event window
//!
//! At-least-once delivery means the same event may arrive twice. Idempotency
//! keys are remembered for a bounded window so redeliveries are not counted.

use chrono::{DateTime, Duration, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use tracing::debug;

/// Share of the window evicted at once when it is full of live keys
const EVICTION_FRACTION: usize = 10;

/// Bounded set of recently seen idempotency keys
pub struct RecentEvents {
    /// Key -> first seen
    seen: DashMap<String, DateTime<Utc>>,
    /// Keys older than this are forgotten
    window: Duration,
    /// Hard cap on remembered keys
    capacity: usize,
}

impl RecentEvents {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            seen: DashMap::new(),
            window,
            capacity: capacity.max(1),
        }
    }

    /// Record `key`; returns `false` if it was already seen inside the window
    pub fn check_and_record(&self, key: &str, now: DateTime<Utc>) -> bool {
        if self.seen.len() >= self.capacity && !self.seen.contains_key(key) {
            self.make_room(now);
        }

        match self.seen.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if now - *entry.get() < self.window {
                    debug!(key, "Duplicate event within window");
                    false
                } else {
                    entry.insert(now);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    /// Forget keys older than the window, returning how many were dropped
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.seen.len();
        self.seen.retain(|_, seen_at| now - *seen_at < self.window);
        before.saturating_sub(self.seen.len())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn make_room(&self, now: DateTime<Utc>) {
        self.sweep(now);
        if self.seen.len() < self.capacity {
            return;
        }

        // Still full: drop the oldest tenth in one pass so the next inserts skip this
        let batch = (self.capacity / EVICTION_FRACTION).max(1);
        let mut oldest: Vec<(DateTime<Utc>, String)> = self
            .seen
            .iter()
            .map(|entry| (*entry.value(), entry.key().clone()))
            .collect();
        if oldest.len() > batch {
            oldest.select_nth_unstable_by_key(batch - 1, |(seen_at, _)| *seen_at);
            oldest.truncate(batch);
        }

        for (_, key) in &oldest {
            self.seen.remove(key);
        }
        debug!(evicted = oldest.len(), capacity = self.capacity, "Recent-event window full");
    }
}
