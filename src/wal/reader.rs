//! WAL reader for recovery

use super::{WalConfig, WalEntry};
use crate::{Result, VellumError};
use std::fs::File;
use std::io::Read;
use tracing::{info, warn};

/// WAL reader for recovering entries after a crash
pub struct WalReader {
    config: WalConfig,
}

impl WalReader {
    /// Create a new WAL reader
    pub fn new(config: WalConfig) -> Self {
        Self { config }
    }

    /// Read all durable entries in order. The scan stops at the first
    /// corrupt or truncated frame: a partial tail is treated as
    /// never-committed, not as an error.
    pub fn replay(&self) -> Result<Vec<WalEntry>> {
        let path = self.config.file_path();
        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let mut entries = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            match WalEntry::deserialize_with_checksum(&data[offset..]) {
                Ok((entry, consumed)) => {
                    entries.push(entry);
                    offset += consumed;
                }
                Err(VellumError::ChecksumMismatch { .. }) => {
                    warn!(
                        "WAL checksum mismatch at offset {} in {:?}, truncating replay",
                        offset, path
                    );
                    break;
                }
                Err(e) => {
                    // Incomplete frame at the tail (crash during write)
                    if !matches!(e, VellumError::InvalidFormat(_)) {
                        warn!("WAL entry unreadable at offset {}: {}", offset, e);
                    }
                    break;
                }
            }
        }

        if !entries.is_empty() {
            info!("Replayed {} WAL entries from {:?}", entries.len(), path);
        }
        Ok(entries)
    }
}
