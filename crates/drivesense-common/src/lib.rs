//! # DriveSense Common
//!
//! Shared types and errors for the DriveSense behavioral pattern learner.
//!
//! ## Core Types
//!
//! - [`ActionType`]/[`ActionValue`]: the vehicle control and the value the driver chose
//! - [`QuantizedValue`]: fixed-width histogram bucket for a value
//! - [`ActionEvent`]: validated driver action with its time-of-day context
//! - [`Suggestion`]/[`FeedbackResponse`]: outbound recommendation and its answer
//! - [`OutboundMessage`]: everything published on the recommendation channel
//!
//! ## Wire Records
//!
//! - [`RawActionRecord`]: flat key/value driver action as delivered by the transport
//! - [`RawFeedbackRecord`]: flat key/value feedback as delivered by the transport

pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{DriveSenseError, Result, ValidationError};
pub use types::{
    action::{parse_action, ActionType, ActionValue, ActionVerb, ProfileKey, QuantizedValue, ValueDomain},
    context::{EventContext, TimeBucket, TripPhase},
    event::{ActionEvent, RawActionRecord},
    suggestion::{
        FeedbackOutcome, FeedbackResponse, Notice, NoticeKind, OutboundMessage, RawFeedbackRecord,
        Suggestion,
    },
};

/// DriveSense version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upper bound for a profile weight
pub const MAX_PROFILE_WEIGHT: f64 = 2.0;

/// Lower bound a dismissal can push a weight to
pub const MIN_FEEDBACK_WEIGHT: f64 = 0.1;

/// Neutral weight for a fresh profile
pub const DEFAULT_PROFILE_WEIGHT: f64 = 1.0;
