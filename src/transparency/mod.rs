//! Transparency module for the interaction recorder.
//!
//! Tracks how much was recorded and which questions were exported, so
//! operators can audit collection without reading the exports themselves.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, read_counts, CollectionCounts,
    SharedTransparencyLog, Tally, TransparencyError, TransparencyLog,
};
