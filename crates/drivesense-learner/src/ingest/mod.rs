//! Ingest module
//!
//! Turns transport records into canonical events:
//! - EventNormalizer: validation and canonicalization
//! - RecentEvents: idempotency-key deduplication window

pub mod dedup;
pub mod normalizer;

pub use dedup::RecentEvents;
pub use normalizer::EventNormalizer;
