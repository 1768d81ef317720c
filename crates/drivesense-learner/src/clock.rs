//! Session clock
//!
//! Process-wide learning-period state. Created once at startup and passed by
//! value into every timer-driven call; nothing reads a global clock.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Lifecycle phase of the recommender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Learning period; nothing is recommended
    Observing,
    /// Terminal for the process lifetime
    Recommending,
}

/// Start of the session and the length of its learning period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClock {
    started_at: DateTime<Utc>,
    learning_period: Duration,
}

impl SessionClock {
    pub fn new(started_at: DateTime<Utc>, learning_period: Duration) -> Self {
        Self {
            started_at,
            learning_period,
        }
    }

    /// Clock starting now
    pub fn start(learning_period: Duration) -> Self {
        Self::new(Utc::now(), learning_period)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn learning_period(&self) -> Duration {
        self.learning_period
    }

    /// Time since the session started (never negative)
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.started_at).max(Duration::zero())
    }

    /// True once elapsed time strictly exceeds the learning period
    pub fn learning_complete(&self, now: DateTime<Utc>) -> bool {
        self.elapsed(now) > self.learning_period
    }
}
