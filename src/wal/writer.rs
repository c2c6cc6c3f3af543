//! WAL writer: append, sync policies, checkpointing

use super::{SyncPolicy, WalConfig, WalEntry, WalReader};
use crate::{Result, VellumError};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::time::Instant;
use tracing::{info, warn};

/// WAL writer for appending entries to disk
pub struct WalWriter {
    config: WalConfig,
    inner: Mutex<WalWriterInner>,
}

struct WalWriterInner {
    file: BufWriter<File>,
    sequence: i64,
    writes_since_sync: usize,
    last_sync: Instant,
}

impl WalWriter {
    /// Open the WAL, resuming the sequence counter after the last durable
    /// entry of an existing file.
    pub fn new(config: WalConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir)?;
        if config.archive {
            fs::create_dir_all(config.archive_dir())?;
        }

        // Resume sequence numbering from the existing file
        let sequence = WalReader::new(config.clone())
            .replay()?
            .last()
            .map(|e| e.seq)
            .unwrap_or(0);

        let file = Self::open_log(&config)?;

        Ok(Self {
            config,
            inner: Mutex::new(WalWriterInner {
                file: BufWriter::new(file),
                sequence,
                writes_since_sync: 0,
                last_sync: Instant::now(),
            }),
        })
    }

    fn open_log(config: &WalConfig) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(config.file_path())
            .map_err(VellumError::Io)
    }

    /// Append an entry, assigning the next sequence number and timestamp.
    /// Returns the assigned sequence number.
    pub fn append(&self, mut entry: WalEntry) -> Result<i64> {
        let mut inner = self.inner.lock();

        entry.seq = inner.sequence + 1;
        entry.ts = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);

        let frame = entry.serialize_with_checksum()?;
        inner.file.write_all(&frame)?;
        inner.sequence = entry.seq;
        inner.writes_since_sync += 1;

        match self.config.sync_policy {
            SyncPolicy::Immediate => Self::sync_inner(&mut inner)?,
            SyncPolicy::Batch => {
                if inner.writes_since_sync >= self.config.batch_entries {
                    Self::sync_inner(&mut inner)?;
                }
            }
            SyncPolicy::Async => {}
        }

        Ok(entry.seq)
    }

    /// Force a flush and fsync
    pub fn sync(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::sync_inner(&mut inner)
    }

    fn sync_inner(inner: &mut WalWriterInner) -> Result<()> {
        inner.file.flush()?;
        inner.file.get_ref().sync_all()?;
        inner.writes_since_sync = 0;
        inner.last_sync = Instant::now();
        Ok(())
    }

    /// Timer-driven sync used by the background syncer thread. In batch
    /// mode only entries older than the batch timeout are flushed; in async
    /// mode every pending entry is.
    pub fn timed_sync(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.writes_since_sync == 0 {
            return Ok(());
        }
        match self.config.sync_policy {
            SyncPolicy::Async => Self::sync_inner(&mut inner),
            SyncPolicy::Batch if inner.last_sync.elapsed() >= self.config.batch_timeout => {
                Self::sync_inner(&mut inner)
            }
            _ => Ok(()),
        }
    }

    /// Checkpoint: flush and fsync, close the current file, archive or
    /// unlink it, then start a fresh empty WAL. Sequence numbering
    /// continues across the checkpoint.
    pub fn checkpoint(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::sync_inner(&mut inner)?;

        let path = self.config.file_path();
        if self.config.archive {
            let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
            let archive_path = self.config.archive_dir().join(format!("wal_{}.log", stamp));
            fs::rename(&path, &archive_path)?;
            info!("WAL archived to {:?}", archive_path);
        } else if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }

        inner.file = BufWriter::new(Self::open_log(&self.config)?);
        inner.writes_since_sync = 0;
        info!("WAL checkpoint complete (sequence {})", inner.sequence);
        Ok(())
    }

    /// Current sequence number (last assigned)
    pub fn sequence(&self) -> i64 {
        self.inner.lock().sequence
    }

    /// Size of the live WAL file in bytes
    pub fn size(&self) -> u64 {
        fs::metadata(self.config.file_path())
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Writer statistics
    pub fn stats(&self) -> WalStats {
        let inner = self.inner.lock();
        WalStats {
            sequence: inner.sequence,
            size: fs::metadata(self.config.file_path())
                .map(|m| m.len())
                .unwrap_or(0),
            pending_syncs: inner.writes_since_sync,
        }
    }
}

impl Drop for WalWriter {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            warn!("WAL sync on drop failed: {}", e);
        }
    }
}

/// WAL writer statistics
#[derive(Debug, Clone)]
pub struct WalStats {
    /// Last assigned sequence number
    pub sequence: i64,
    /// Live WAL file size in bytes
    pub size: u64,
    /// Entries appended since the last fsync
    pub pending_syncs: usize,
}
