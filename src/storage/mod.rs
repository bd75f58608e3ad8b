//! Storage module for persisting harvest progress
//!
//! This module handles:
//! - Atomic checkpoint writes (temp file, fsync, rename)
//! - Validation of checkpoints on load, so a damaged file reads as absent
//! - Clearing progress for a fresh run

mod checkpoint;

pub use checkpoint::{
    Checkpoint, CheckpointError, CheckpointManager, CheckpointResult, CHECKPOINT_FORMAT_VERSION,
};
