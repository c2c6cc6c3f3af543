//! Write-Ahead Log (WAL) implementation
//!
//! The WAL records every logical mutation before it is applied, so a crash
//! can be recovered by replaying the tail on top of the durable segments.
//! Entries are length-prefixed JSON frames with a trailing CRC.

mod entry;
mod reader;
mod writer;

pub use entry::{WalEntry, WalOp};
pub use reader::WalReader;
pub use writer::{WalStats, WalWriter};

use crate::config;
use std::path::PathBuf;
use std::time::Duration;

/// WAL sync policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Sync after every append (safest, slowest)
    Immediate,
    /// Sync after N appends or on the batch timer, whichever first
    Batch,
    /// Sync only on the background timer (fastest, least safe)
    Async,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        SyncPolicy::Batch
    }
}

/// WAL configuration
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Directory for the WAL file and its archive
    pub dir: PathBuf,
    /// Sync policy
    pub sync_policy: SyncPolicy,
    /// Appends between fsyncs in batch mode
    pub batch_entries: usize,
    /// Timer driving batch/async syncs
    pub batch_timeout: Duration,
    /// Auto-checkpoint timer
    pub checkpoint_interval: Duration,
    /// WAL size that triggers an auto-checkpoint
    pub checkpoint_wal_size: u64,
    /// Archive checkpointed WAL files instead of unlinking them
    pub archive: bool,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/wal"),
            sync_policy: SyncPolicy::default(),
            batch_entries: config::WAL_BATCH_ENTRIES,
            batch_timeout: Duration::from_millis(config::WAL_BATCH_TIMEOUT_MS),
            checkpoint_interval: Duration::from_secs(config::CHECKPOINT_INTERVAL_SECS),
            checkpoint_wal_size: config::CHECKPOINT_WAL_SIZE,
            archive: true,
        }
    }
}

impl WalConfig {
    /// Path of the live WAL file
    pub fn file_path(&self) -> PathBuf {
        self.dir.join("wal.log")
    }

    /// Directory holding archived WAL files
    pub fn archive_dir(&self) -> PathBuf {
        self.dir.join("archive")
    }
}
