//! Error types for DriveSense
//!
//! Provides a unified error type and the validation taxonomy used at ingress

use thiserror::Error;

/// Result type alias using DriveSenseError
pub type Result<T> = std::result::Result<T, DriveSenseError>;

/// Unified error type for DriveSense operations
#[derive(Debug, Error)]
pub enum DriveSenseError {
    // Ingress validation errors (dropped, never fatal)
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // Feedback for a suggestion that is unknown or already expired
    #[error("Unknown or expired suggestion: {suggestion_id}")]
    UnknownReference { suggestion_id: String },

    // Profile invariant violated; the profile is reset
    #[error("Profile {key} is corrupt: {reason}")]
    StoreCorruption { key: String, reason: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Channel or adapter failures
    #[error("Transport error: {0}")]
    Transport(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DriveSenseError {
    /// Short machine-readable label, used as a metrics/log dimension
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::UnknownReference { .. } => "unknown_reference",
            Self::StoreCorruption { .. } => "store_corruption",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
            Self::Transport(_) => "transport",
            Self::Internal(_) => "internal",
        }
    }
}

/// Reasons an inbound record is rejected by the normalizer
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Unknown action type: {0}")]
    UnknownActionType(String),

    #[error("Action '{action}' is a relative adjustment and carries no absolute value")]
    RelativeAction { action: String },

    #[error("Value for {action_type} is not a number or on/off switch: {value}")]
    InvalidValue { action_type: String, value: String },

    #[error("Value {value} for {action_type} outside domain [{min}, {max}]")]
    OutOfDomain {
        action_type: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Unknown trip phase: {0}")]
    UnknownTripPhase(String),

    #[error("Invalid suggestion reference: {0}")]
    InvalidReference(String),

    #[error("Unknown feedback outcome: {0}")]
    UnknownOutcome(String),
}

impl From<serde_json::Error> for DriveSenseError {
    fn from(err: serde_json::Error) -> Self {
        DriveSenseError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for DriveSenseError {
    fn from(err: config::ConfigError) -> Self {
        DriveSenseError::Config(err.to_string())
    }
}

impl From<anyhow::Error> for DriveSenseError {
    fn from(err: anyhow::Error) -> Self {
        DriveSenseError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DriveSenseError::Validation(ValidationError::OutOfDomain {
            action_type: "climate".into(),
            value: 35.0,
            min: 16.0,
            max: 30.0,
        });
        assert!(err.to_string().contains("[16, 30]"));
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_unknown_reference_kind() {
        let err = DriveSenseError::UnknownReference {
            suggestion_id: "abc".into(),
        };
        assert_eq!(err.kind(), "unknown_reference");
        assert!(err.to_string().contains("abc"));
    }
}
