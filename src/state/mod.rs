//! State module for tracking harvest progress
//!
//! # Components
//!
//! - `ErrorKind`: Classifies why a single item failed (transient vs terminal)
//! - `Statistics`: Cumulative counters and the set of processed identifiers
//! - `SharedStatistics`: Lock-guarded handle used by concurrent fetches

mod error_kind;
mod statistics;

// Re-export main types
pub use error_kind::ErrorKind;
pub use statistics::{SharedStatistics, Statistics};
