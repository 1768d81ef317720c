//! Recommendation module
//!
//! - ConfidenceScorer: profile -> (predicted value, confidence)
//! - RecommendationGenerator: tick-driven selection and rendering
//! - PendingSuggestions: suggestions awaiting an answer
//! - FeedbackAdjuster: accept/dismiss reweighting

pub mod feedback;
pub mod generator;
pub mod pending;
pub mod scorer;
pub mod templates;

pub use feedback::{FeedbackAdjuster, FeedbackReport};
pub use generator::{Candidate, RecommendationGenerator};
pub use pending::PendingSuggestions;
pub use scorer::{ConfidenceScorer, Score, ScoringContext};
