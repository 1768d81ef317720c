//! DriveSense configuration
//!
//! Defaults, then an optional TOML file, then `DRIVESENSE__SECTION__KEY`
//! environment variables. `PORT` overrides the listen port.

use chrono::FixedOffset;
use drivesense_common::{ActionType, DriveSenseError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// DriveSense service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveSenseConfig {
    /// HTTP adapter
    pub server: ServerSettings,
    /// Normalization and deduplication
    pub ingest: IngestSettings,
    /// Learning period and recommendation cadence
    pub learning: LearningSettings,
    /// Confidence scoring
    pub scoring: ScoringSettings,
    /// Feedback reweighting
    pub feedback: FeedbackSettings,
    /// Histogram bin widths
    pub quantization: QuantizationSettings,
    /// Logging and status snapshots
    pub telemetry: TelemetrySettings,
}

impl DriveSenseConfig {
    /// Load configuration from environment and files
    pub fn load() -> anyhow::Result<Self> {
        // Try to load .env file
        let _ = dotenvy::dotenv();

        let path = std::env::var("DRIVESENSE_CONFIG")
            .unwrap_or_else(|_| crate::DEFAULT_CONFIG_FILE.to_string());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix("DRIVESENSE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(DriveSenseError::from)?;

        let mut cfg: Self = settings.try_deserialize().map_err(DriveSenseError::from)?;

        // Platform-assigned port takes priority
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse::<u16>() {
                cfg.server.port = p;
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values that would break scorer or feedback invariants
    pub fn validate(&self) -> Result<()> {
        let l = &self.learning;
        if !(0.0..=1.0).contains(&l.publish_threshold) {
            return Err(DriveSenseError::Config(format!(
                "learning.publish_threshold must be in [0, 1], got {}",
                l.publish_threshold
            )));
        }
        if l.tick_interval_secs == 0 {
            return Err(DriveSenseError::Config(
                "learning.tick_interval_secs must be positive".into(),
            ));
        }

        let s = &self.scoring;
        if !(0.0..=1.0).contains(&s.recency_floor) {
            return Err(DriveSenseError::Config(format!(
                "scoring.recency_floor must be in [0, 1], got {}",
                s.recency_floor
            )));
        }

        let f = &self.feedback;
        if f.accept_multiplier <= 1.0 {
            return Err(DriveSenseError::Config(format!(
                "feedback.accept_multiplier must be > 1, got {}",
                f.accept_multiplier
            )));
        }
        if !(f.dismiss_multiplier > 0.0 && f.dismiss_multiplier < 1.0) {
            return Err(DriveSenseError::Config(format!(
                "feedback.dismiss_multiplier must be in (0, 1), got {}",
                f.dismiss_multiplier
            )));
        }
        if !(f.min_weight > 0.0
            && f.min_weight < f.max_weight
            && f.max_weight <= drivesense_common::MAX_PROFILE_WEIGHT)
        {
            return Err(DriveSenseError::Config(format!(
                "feedback weight bounds must satisfy 0 < min < max <= {}, got [{}, {}]",
                drivesense_common::MAX_PROFILE_WEIGHT,
                f.min_weight,
                f.max_weight
            )));
        }

        let q = &self.quantization;
        if ActionType::ALL.iter().any(|t| q.step_for(*t) == 0) {
            return Err(DriveSenseError::Config(
                "quantization steps must be positive".into(),
            ));
        }

        if self.ingest.workers == 0 {
            return Err(DriveSenseError::Config("ingest.workers must be positive".into()));
        }
        if self.ingest.utc_offset().is_none() {
            return Err(DriveSenseError::Config(format!(
                "ingest.utc_offset_minutes out of range: {}",
                self.ingest.utc_offset_minutes
            )));
        }

        Ok(())
    }
}

/// HTTP adapter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
        }
    }
}

/// Ingest settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Offset of vehicle local time from UTC, for time-of-day bucketing
    pub utc_offset_minutes: i32,
    /// How long an idempotency key is remembered
    pub dedup_window_secs: u64,
    /// Maximum idempotency keys remembered at once
    pub dedup_capacity: usize,
    /// Inbound worker shards (users are hashed onto shards)
    pub workers: usize,
    /// Per-shard channel buffer
    pub channel_buffer: usize,
}

impl IngestSettings {
    pub fn utc_offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes.checked_mul(60)?)
    }

    pub fn dedup_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.dedup_window_secs as i64)
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            dedup_window_secs: crate::DEFAULT_DEDUP_WINDOW_SECS,
            dedup_capacity: crate::DEFAULT_DEDUP_CAPACITY,
            workers: 4,
            channel_buffer: 1024,
        }
    }
}

/// Learning period and recommendation cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningSettings {
    /// Observation-only interval after process start
    pub learning_period_secs: u64,
    /// Recommendation tick interval
    pub tick_interval_secs: u64,
    /// Observations required before a profile is trusted
    pub min_observations: u64,
    /// Confidence must exceed this to publish
    pub publish_threshold: f64,
    /// Unanswered suggestions expire after this long
    pub suggestion_ttl_secs: u64,
    /// Cap on suggestions per process session
    pub max_recommendations_per_session: u32,
    /// Break reminder after this much session time (disabled when unset)
    pub break_reminder_secs: Option<u64>,
    /// A profile acted upon this recently is not suggested
    pub recent_action_cooldown_secs: u64,
    /// Prefix of every suggestion message
    pub greeting: String,
}

impl LearningSettings {
    pub fn learning_period(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.learning_period_secs as i64)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn suggestion_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.suggestion_ttl_secs as i64)
    }

    pub fn break_reminder_after(&self) -> Option<chrono::Duration> {
        self.break_reminder_secs
            .map(|s| chrono::Duration::seconds(s as i64))
    }

    pub fn recent_action_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.recent_action_cooldown_secs as i64)
    }
}

impl Default for LearningSettings {
    fn default() -> Self {
        Self {
            learning_period_secs: crate::DEFAULT_LEARNING_PERIOD_SECS,
            tick_interval_secs: crate::DEFAULT_TICK_INTERVAL_SECS,
            min_observations: crate::DEFAULT_MIN_OBSERVATIONS,
            publish_threshold: crate::DEFAULT_PUBLISH_THRESHOLD,
            suggestion_ttl_secs: crate::DEFAULT_TICK_INTERVAL_SECS,
            max_recommendations_per_session: crate::MAX_RECOMMENDATIONS_PER_SESSION,
            break_reminder_secs: Some(crate::DEFAULT_BREAK_REMINDER_SECS),
            recent_action_cooldown_secs: 10,
            greeting: "Based on your preferences,".to_string(),
        }
    }
}

/// Confidence scoring settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    /// Recency factor for maximally stale profiles
    pub recency_floor: f64,
    /// Staleness at which the recency factor reaches the floor
    pub staleness_horizon_secs: u64,
}

impl ScoringSettings {
    pub fn staleness_horizon(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.staleness_horizon_secs as i64)
    }
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            recency_floor: 0.5,
            staleness_horizon_secs: 7 * 24 * 3600,
        }
    }
}

/// Feedback reweighting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackSettings {
    pub accept_multiplier: f64,
    pub dismiss_multiplier: f64,
    pub max_weight: f64,
    pub min_weight: f64,
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        Self {
            accept_multiplier: 1.1,
            dismiss_multiplier: 0.8,
            max_weight: drivesense_common::MAX_PROFILE_WEIGHT,
            min_weight: drivesense_common::MIN_FEEDBACK_WEIGHT,
        }
    }
}

/// Fixed histogram bin widths per action type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizationSettings {
    /// Degrees per climate bucket
    pub climate_step: u32,
    /// Volume percent per bucket
    pub infotainment_step: u32,
    /// Brightness percent per bucket
    pub lighting_step: u32,
    /// Seat positions per bucket
    pub seat_step: u32,
}

impl QuantizationSettings {
    pub fn step_for(&self, action_type: ActionType) -> u32 {
        match action_type {
            ActionType::Climate => self.climate_step,
            ActionType::Infotainment => self.infotainment_step,
            ActionType::Lighting => self.lighting_step,
            ActionType::Seat => self.seat_step,
        }
    }
}

impl Default for QuantizationSettings {
    fn default() -> Self {
        Self {
            climate_step: 2,
            infotainment_step: 10,
            lighting_step: 10,
            seat_step: 1,
        }
    }
}

/// Logging and status snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Fallback filter when RUST_LOG is unset
    pub log_level: String,
    /// Emit JSON log lines
    pub json_logs: bool,
    /// Status snapshot cadence
    pub snapshot_interval_secs: u64,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            snapshot_interval_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = DriveSenseConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.learning.learning_period_secs, 30);
        assert_eq!(cfg.learning.tick_interval_secs, 20);
        assert_eq!(cfg.learning.max_recommendations_per_session, 50);
        assert_eq!(cfg.quantization.step_for(ActionType::Climate), 2);
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let mut cfg = DriveSenseConfig::default();
        cfg.learning.publish_threshold = 1.5;
        assert!(matches!(cfg.validate(), Err(DriveSenseError::Config(_))));
    }

    #[test]
    fn test_rejects_inverted_feedback_multipliers() {
        let mut cfg = DriveSenseConfig::default();
        cfg.feedback.dismiss_multiplier = 1.2;
        assert!(cfg.validate().is_err());

        let mut cfg = DriveSenseConfig::default();
        cfg.feedback.accept_multiplier = 0.9;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_step() {
        let mut cfg = DriveSenseConfig::default();
        cfg.quantization.seat_step = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(
                "[learning]\npublish_threshold = 0.75\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let cfg: DriveSenseConfig = settings.try_deserialize().unwrap();

        assert_eq!(cfg.learning.publish_threshold, 0.75);
        assert_eq!(cfg.learning.tick_interval_secs, 20);
        assert_eq!(cfg.feedback.accept_multiplier, 1.1);
    }
}
