//! Storage engine - coordinates all storage components

mod database;
mod engine;

pub use database::{Collection, CollectionStats, Database, DatabaseStats};
pub use engine::{Engine, EngineStats};

use crate::wal::WalConfig;
use crate::{config, Result, VellumError};
use std::path::PathBuf;
use std::time::Duration;

/// Storage engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Data directory
    pub data_dir: PathBuf,
    /// WAL configuration (its directory is derived from `data_dir`)
    pub wal: WalConfig,
    /// Maximum encoded document size in bytes
    pub max_doc_bytes: usize,
    /// Segment size cap in bytes
    pub segment_size: u64,
    /// Auto-compaction timer
    pub compaction_interval: Duration,
    /// Segment count that makes a collection eligible for auto-compaction
    pub compaction_threshold: usize,
    /// Run the background auto-compactor
    pub auto_compaction: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            wal: WalConfig::default(),
            max_doc_bytes: config::MAX_DOC_BYTES,
            segment_size: config::SEGMENT_SIZE_LIMIT,
            compaction_interval: Duration::from_secs(config::COMPACTION_INTERVAL_SECS),
            compaction_threshold: config::COMPACTION_THRESHOLD,
            auto_compaction: true,
        }
    }
}

impl EngineConfig {
    /// Directory holding per-database state
    pub fn databases_dir(&self) -> PathBuf {
        self.data_dir.join("databases")
    }

    /// WAL configuration rooted under the data directory
    pub fn wal_config(&self) -> WalConfig {
        WalConfig {
            dir: self.data_dir.join("wal"),
            ..self.wal.clone()
        }
    }
}

/// Normalize a database or collection name: characters outside
/// `[A-Za-z0-9_-]` map to `_`; an empty name is rejected.
pub(crate) fn normalize_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(VellumError::Validation("name is required".into()));
    }
    Ok(trimmed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("users").unwrap(), "users");
        assert_eq!(normalize_name("  my db!  ").unwrap(), "my_db_");
        assert_eq!(normalize_name("a/b").unwrap(), "a_b");
        assert!(normalize_name("   ").is_err());
    }
}
