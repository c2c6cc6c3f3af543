//! Database and collection state

use crate::index::IndexSet;
use crate::segment::{SegmentManager, SegmentStats};
use crate::Result;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// A named database: a container of collections
pub struct Database {
    name: String,
    dir: PathBuf,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl Database {
    /// Open a database directory, loading every collection under
    /// `<dir>/collections/`.
    pub fn open(name: &str, dir: PathBuf, segment_size: u64) -> Result<Self> {
        let collections_dir = dir.join("collections");
        std::fs::create_dir_all(&collections_dir)?;

        let mut collections = HashMap::new();
        for entry in std::fs::read_dir(&collections_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let coll_name = entry.file_name().to_string_lossy().to_string();
            if coll_name.starts_with('.') {
                continue;
            }
            match Collection::open(&coll_name, entry.path(), segment_size) {
                Ok(c) => {
                    collections.insert(coll_name, Arc::new(c));
                }
                Err(e) => warn!("Failed to load collection {:?}: {}", entry.path(), e),
            }
        }

        if !collections.is_empty() {
            info!("Loaded database {} ({} collections)", name, collections.len());
        }

        Ok(Self {
            name: name.to_string(),
            dir,
            collections: RwLock::new(collections),
        })
    }

    /// Database name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get an existing collection
    pub fn collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.read().get(name).cloned()
    }

    /// Get or lazily create a collection
    pub fn get_or_create_collection(
        &self,
        name: &str,
        segment_size: u64,
    ) -> Result<Arc<Collection>> {
        let name = super::normalize_name(name)?;
        {
            let collections = self.collections.read();
            if let Some(c) = collections.get(&name) {
                return Ok(c.clone());
            }
        }

        let mut collections = self.collections.write();
        if let Some(c) = collections.get(&name) {
            return Ok(c.clone());
        }

        let dir = self.dir.join("collections").join(&name);
        let collection = Arc::new(Collection::open(&name, dir, segment_size)?);
        collections.insert(name, collection.clone());
        Ok(collection)
    }

    /// Collection names, sorted
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Every collection handle
    pub fn all_collections(&self) -> Vec<Arc<Collection>> {
        self.collections.read().values().cloned().collect()
    }

    /// Database statistics
    pub fn stats(&self) -> DatabaseStats {
        let collections = self.all_collections();
        let stats: Vec<CollectionStats> =
            collections.iter().map(|c| c.stats()).collect();
        DatabaseStats {
            name: self.name.clone(),
            collection_count: stats.len(),
            document_count: stats.iter().map(|s| s.documents).sum(),
            collections: stats,
        }
    }
}

/// A collection: segment-backed document storage plus its indexes,
/// guarded by a single reader/writer lock.
pub struct Collection {
    name: String,
    dir: PathBuf,
    state: RwLock<CollectionState>,
}

/// The lock-protected state of a collection
pub struct CollectionState {
    /// Segment files holding the document records
    pub segments: SegmentManager,
    /// Secondary indexes
    pub indexes: IndexSet,
}

impl Collection {
    /// Open a collection directory: its segments, its persisted index
    /// metadata, and an eager rebuild of every ready index from the live
    /// document set.
    pub fn open(name: &str, dir: PathBuf, segment_size: u64) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;

        let segments = SegmentManager::open_with_segment_size(&dir, segment_size)?;
        let mut indexes = IndexSet::load(&dir.join("indexes.json"));

        let docs = segments.read_all()?;
        indexes.rebuild(&docs);

        Ok(Self {
            name: name.to_string(),
            dir,
            state: RwLock::new(CollectionState { segments, indexes }),
        })
    }

    /// Collection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the persisted index metadata
    pub fn indexes_path(&self) -> PathBuf {
        self.dir.join("indexes.json")
    }

    /// Collection directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Shared read access for queries
    pub fn read(&self) -> RwLockReadGuard<'_, CollectionState> {
        self.state.read()
    }

    /// Exclusive access for mutations
    pub fn write(&self) -> RwLockWriteGuard<'_, CollectionState> {
        self.state.write()
    }

    /// Build (or rebuild) one index from the current live set and mark it
    /// ready. Used directly by foreground index creation and from the
    /// background build thread.
    pub fn build_index(&self, name: &str) -> Result<()> {
        let mut state = self.state.write();
        let state = &mut *state;
        let docs = state.segments.read_all()?;
        state.indexes.build(name, &docs)?;
        state.indexes.save(&self.indexes_path())
    }

    /// Persist index metadata. Segment data is already durable, so this is
    /// the whole of a collection flush.
    pub fn flush(&self) -> Result<()> {
        let state = self.state.read();
        state.indexes.save(&self.indexes_path())
    }

    /// Compact the collection's segments under the exclusive lock
    pub fn compact(&self) -> Result<()> {
        let state = self.state.write();
        state.segments.compact()
    }

    /// Number of segment files
    pub fn segment_count(&self) -> usize {
        self.state.read().segments.segment_count()
    }

    /// Segment statistics
    pub fn segment_stats(&self) -> SegmentStats {
        self.state.read().segments.stats()
    }

    /// Flush and release the collection's files
    pub fn close(&self) -> Result<()> {
        let state = self.state.write();
        state.indexes.save(&self.indexes_path())?;
        state.segments.close()
    }

    /// Collection statistics
    pub fn stats(&self) -> CollectionStats {
        let state = self.state.read();
        let documents = match state.segments.read_all() {
            Ok(docs) => docs.len(),
            Err(e) => {
                warn!("Failed to read collection {}: {}", self.name, e);
                0
            }
        };
        CollectionStats {
            name: self.name.clone(),
            documents,
            segments: state.segments.stats(),
            indexes: state.indexes.metas().count(),
        }
    }
}

/// Statistics for one collection
#[derive(Debug, Clone)]
pub struct CollectionStats {
    pub name: String,
    pub documents: usize,
    pub segments: SegmentStats,
    pub indexes: usize,
}

/// Statistics for one database
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub name: String,
    pub collection_count: usize,
    pub document_count: usize,
    pub collections: Vec<CollectionStats>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::Document;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(v: serde_json::Value) -> Document {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_collection_lazily_created() {
        let dir = TempDir::new().unwrap();
        let db = Database::open("db1", dir.path().join("db1"), config::SEGMENT_SIZE_LIMIT)
            .unwrap();

        assert!(db.collection("users").is_none());
        db.get_or_create_collection("users", config::SEGMENT_SIZE_LIMIT)
            .unwrap();
        assert!(db.collection("users").is_some());
        assert_eq!(db.collection_names(), vec!["users"]);
    }

    #[test]
    fn test_database_reload_discovers_collections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db1");
        {
            let db = Database::open("db1", path.clone(), config::SEGMENT_SIZE_LIMIT).unwrap();
            let c = db
                .get_or_create_collection("users", config::SEGMENT_SIZE_LIMIT)
                .unwrap();
            let state = c.write();
            state
                .segments
                .append_insert("a", &doc(json!({"_id": "a", "name": "x"})))
                .unwrap();
        }

        let db = Database::open("db1", path, config::SEGMENT_SIZE_LIMIT).unwrap();
        let c = db.collection("users").expect("collection rediscovered");
        assert_eq!(c.stats().documents, 1);
    }

    #[test]
    fn test_collection_name_normalization() {
        let dir = TempDir::new().unwrap();
        let db = Database::open("db1", dir.path().join("db1"), config::SEGMENT_SIZE_LIMIT)
            .unwrap();
        let c = db
            .get_or_create_collection("my coll!", config::SEGMENT_SIZE_LIMIT)
            .unwrap();
        assert_eq!(c.name(), "my_coll_");
        assert!(db
            .get_or_create_collection("   ", config::SEGMENT_SIZE_LIMIT)
            .is_err());
    }
}
