//! Pattern storage
//!
//! - ActionProfile: running statistics for one (user, action type)
//! - PatternStore: concurrent owner of all profiles

pub mod pattern_store;
pub mod profile;

pub use pattern_store::PatternStore;
pub use profile::{ActionProfile, ValueHistogram};
