//! VellumDB Core - Embedded Document Database Storage Engine
//!
//! A Rust document store with MongoDB-like semantics:
//! - JSON documents with rich filter/update operators
//! - Durable append-only segment storage with CRC-checked records
//! - Write-ahead logging for crash atomicity
//! - Hash and B-tree secondary indexes behind a candidate-set planner
//!
//! # Architecture
//!
//! VellumDB uses a log-structured storage engine with the following components:
//!
//! - **WAL (Write-Ahead Log)**: Durability guarantee through sequential writes
//! - **Segments**: Append-only files holding framed document records
//! - **Compaction**: Merging sealed segments to reclaim tombstoned space
//! - **Indexes**: In-memory hash/B-tree structures with persisted metadata

pub mod index;
pub mod oid;
pub mod query;
pub mod segment;
pub mod storage;
pub mod wal;

mod error;
mod types;

pub use error::{Result, VellumError};
pub use storage::{Engine, EngineConfig};
pub use types::*;

/// VellumDB version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    /// Maximum segment size before rollover (10MB)
    pub const SEGMENT_SIZE_LIMIT: u64 = 10 * 1024 * 1024;

    /// Maximum encoded document size (16MB)
    pub const MAX_DOC_BYTES: usize = 16 * 1024 * 1024;

    /// WAL entries between fsyncs in batch mode
    pub const WAL_BATCH_ENTRIES: usize = 100;

    /// WAL batch/async sync timer (milliseconds)
    pub const WAL_BATCH_TIMEOUT_MS: u64 = 1_000;

    /// Auto-checkpoint timer (seconds)
    pub const CHECKPOINT_INTERVAL_SECS: u64 = 60;

    /// WAL size that triggers an auto-checkpoint (10MB)
    pub const CHECKPOINT_WAL_SIZE: u64 = 10 * 1024 * 1024;

    /// Auto-compaction timer (seconds)
    pub const COMPACTION_INTERVAL_SECS: u64 = 300;

    /// Segment count that makes a collection eligible for auto-compaction
    pub const COMPACTION_THRESHOLD: usize = 3;
}
