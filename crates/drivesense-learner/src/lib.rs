//! # DriveSense Learner
//!
//! Online, per-driver behavioral pattern learner and recommender for vehicle
//! controls. Driver actions are folded into interpretable running statistics;
//! on a fixed cadence the most confident prediction is phrased as a
//! natural-language suggestion, and the driver's answer reweights the pattern.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Runtime                            │
//! │  ingest shards ─┐     tick timer ─┐        feedback task ─┐  │
//! │                 ▼                 ▼                       ▼  │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                        Engine                          │  │
//! │  │  EventNormalizer → RecentEvents → PatternStore         │  │
//! │  │  ConfidenceScorer → RecommendationGenerator → pending  │  │
//! │  │  FeedbackAdjuster → PatternStore                       │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │           │ RecommendationSink        │ ObservabilitySink    │
//! └───────────┼───────────────────────────┼──────────────────────┘
//!             ▼                           ▼
//!     WebSocket / bridges         tracing + Prometheus
//! ```
//!
//! ## Lifecycle
//!
//! The generator starts in `Observing` and moves to `Recommending` once the
//! learning period has elapsed. Nothing is suggested while observing.

pub mod api;
pub mod clock;
pub mod config;
pub mod engine;
pub mod ingest;
pub mod recommend;
pub mod runtime;
pub mod store;
pub mod telemetry;

pub use clock::{Phase, SessionClock};
pub use config::DriveSenseConfig;
pub use engine::{Engine, IngestOutcome};
pub use ingest::{EventNormalizer, RecentEvents};
pub use recommend::{
    ConfidenceScorer, FeedbackAdjuster, FeedbackReport, PendingSuggestions,
    RecommendationGenerator, Score, ScoringContext,
};
pub use runtime::{Runtime, RuntimeHandle};
pub use store::{ActionProfile, PatternStore};
pub use telemetry::{
    BroadcastSink, Metrics, ObservabilitySink, RecommendationSink, StatusSnapshot, TracingSink,
};

/// Config file read when `DRIVESENSE_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "drivesense.toml";

/// Idempotency keys are remembered this long (seconds)
pub const DEFAULT_DEDUP_WINDOW_SECS: u64 = 300;

/// Maximum idempotency keys remembered at once
pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;

/// Observation-only period after startup (seconds)
pub const DEFAULT_LEARNING_PERIOD_SECS: u64 = 30;

/// Recommendation cadence (seconds)
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 20;

/// Observations required before a profile can score above zero
pub const DEFAULT_MIN_OBSERVATIONS: u64 = 3;

/// Confidence must exceed this to publish
pub const DEFAULT_PUBLISH_THRESHOLD: f64 = 0.6;

/// Cap on suggestions per process session
pub const MAX_RECOMMENDATIONS_PER_SESSION: u32 = 50;

/// Session time before the break reminder (seconds)
pub const DEFAULT_BREAK_REMINDER_SECS: u64 = 200;
