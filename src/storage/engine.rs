//! Storage engine - top-level coordinator
//!
//! Owns databases → collections → (segments, indexes), serializes
//! mutations per collection, and drives recovery, checkpoints, and
//! auto-compaction. Mutation flow: collection write lock → canonicalize →
//! segment append → index maintenance → WAL append.

use super::{normalize_name, Database, DatabaseStats, EngineConfig};
use crate::index::{index_name, IndexKind, IndexMeta, IndexStatus};
use crate::oid::new_object_id;
use crate::query::{
    apply_projection, apply_skip_limit, apply_sort, apply_update, candidate_ids, matches_filter,
    QueryOptions,
};
use crate::segment::SegmentStats;
use crate::wal::{SyncPolicy, WalEntry, WalOp, WalReader, WalStats, WalWriter};
use crate::{canonicalize_document, Document, Result, Value, VellumError};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

/// VellumDB storage engine
pub struct Engine {
    config: EngineConfig,
    databases: RwLock<HashMap<String, Arc<Database>>>,
    wal: WalWriter,
    replaying: AtomicBool,
    stopped: AtomicBool,
    shutdown_txs: Mutex<Vec<mpsc::Sender<()>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Open the engine: create the data layout, open the WAL, load every
    /// database snapshot, replay the WAL tail, and start the background
    /// workers. Failure to create the data directory or to open the WAL is
    /// fatal.
    pub fn open(config: EngineConfig) -> Result<Arc<Self>> {
        std::fs::create_dir_all(config.databases_dir())?;

        let wal = WalWriter::new(config.wal_config())?;

        let engine = Arc::new(Self {
            config,
            databases: RwLock::new(HashMap::new()),
            wal,
            replaying: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            shutdown_txs: Mutex::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
        });

        engine.load_databases()?;
        engine.replay_wal()?;
        engine.start_background();

        Ok(engine)
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------
    // CRUD surface
    // -----------------------------------------------------------------

    /// Insert a document, assigning `_id` and `_created` when absent.
    /// Returns the document id.
    pub fn insert(&self, db_name: &str, coll_name: &str, doc: Document) -> Result<String> {
        let mut doc = canonicalize_document(doc);

        if doc.encoded_len() > self.config.max_doc_bytes {
            return Err(VellumError::Validation(
                "document too large (exceeds limit)".into(),
            ));
        }

        let db = self.get_or_create_database(db_name)?;
        let collection = db.get_or_create_collection(coll_name, self.config.segment_size)?;

        let mut state = collection.write();
        let state = &mut *state;

        if !doc.contains_key("_id") {
            doc.insert("_id", Value::String(new_object_id()));
        }
        if !doc.contains_key("_created") {
            doc.insert("_created", Value::Int(chrono::Utc::now().timestamp()));
        }
        let doc_id = doc.id().unwrap_or_default();

        // Uniqueness is checked before the append so a rejected document
        // leaves no trace in the segment.
        state.indexes.check_unique(&doc, None)?;
        state.segments.append_insert(&doc_id, &doc)?;
        state.indexes.add_doc(&doc_id, &doc);

        self.wal_append(WalEntry::insert(db.name(), collection.name(), doc));

        Ok(doc_id)
    }

    /// Query documents: planner candidates when an index applies, full
    /// scan otherwise, then sort → skip/limit → projection.
    pub fn query(
        &self,
        db_name: &str,
        coll_name: &str,
        filter: Document,
        options: QueryOptions,
    ) -> Result<Vec<Document>> {
        let db = self.get_or_create_database(db_name)?;
        let collection = db.get_or_create_collection(coll_name, self.config.segment_size)?;

        let mut out = {
            let state = collection.read();

            let candidates = candidate_ids(&state.indexes, &filter);
            let all = state.segments.read_all()?;

            match candidates {
                Some(ids) if !ids.is_empty() => {
                    let id_set: HashSet<&String> = ids.iter().collect();
                    all.into_iter()
                        .filter(|d| {
                            d.id().map_or(false, |id| id_set.contains(&id))
                                && matches_filter(d, &filter)
                        })
                        .collect()
                }
                _ => all
                    .into_iter()
                    .filter(|d| matches_filter(d, &filter))
                    .collect::<Vec<_>>(),
            }
        };

        apply_sort(&mut out, &options.sort);
        let out = apply_skip_limit(out, options.skip, options.limit);
        let out = apply_projection(out, &options.projection);
        Ok(out)
    }

    /// Apply update operators to every matching document (or just the
    /// first when `multi` is false). Returns the number of updated
    /// documents.
    pub fn update(
        &self,
        db_name: &str,
        coll_name: &str,
        filter: Document,
        update: Document,
        multi: bool,
    ) -> Result<usize> {
        let db = self.get_or_create_database(db_name)?;
        let collection = db.get_or_create_collection(coll_name, self.config.segment_size)?;

        let mut updated = 0;
        {
            let mut state = collection.write();
            let state = &mut *state;

            let docs = state.segments.read_all()?;
            for doc in docs {
                if !matches_filter(&doc, &filter) {
                    continue;
                }

                let old = doc.clone();
                let mut doc = doc;
                apply_update(&mut doc, &update)?;
                doc.insert("_updated", Value::Int(chrono::Utc::now().timestamp()));

                if doc.encoded_len() > self.config.max_doc_bytes {
                    return Err(VellumError::Validation(
                        "document too large (exceeds limit)".into(),
                    ));
                }

                let doc_id = doc.id().unwrap_or_default();
                state.indexes.check_unique(&doc, Some(&doc_id))?;
                state.segments.append_update(&doc_id, &doc)?;
                state.indexes.update_doc(&doc_id, &old, &doc);

                updated += 1;
                if !multi {
                    break;
                }
            }
        }

        if updated > 0 {
            self.wal_append(WalEntry::update(
                db.name(),
                collection.name(),
                filter,
                update,
                multi,
            ));
        }
        Ok(updated)
    }

    /// Tombstone every matching document (or just the first when `multi`
    /// is false). The scan continues past non-matching documents. Returns
    /// the number of deleted documents.
    pub fn delete(
        &self,
        db_name: &str,
        coll_name: &str,
        filter: Document,
        multi: bool,
    ) -> Result<usize> {
        let db = self.get_or_create_database(db_name)?;
        let collection = db.get_or_create_collection(coll_name, self.config.segment_size)?;

        let mut deleted = 0;
        {
            let mut state = collection.write();
            let state = &mut *state;

            let docs = state.segments.read_all()?;
            for doc in docs {
                if !matches_filter(&doc, &filter) {
                    continue;
                }
                let doc_id = doc.id().unwrap_or_default();
                state.segments.delete(&doc_id)?;
                state.indexes.remove_doc(&doc_id, &doc);

                deleted += 1;
                if !multi {
                    break;
                }
            }
        }

        if deleted > 0 {
            self.wal_append(WalEntry::delete(
                db.name(),
                collection.name(),
                filter,
                multi,
            ));
        }
        Ok(deleted)
    }

    /// Create a hash or B-tree index. The build snapshots the live set
    /// under the collection write lock; `background` moves the build onto
    /// its own thread.
    pub fn create_index(
        &self,
        db_name: &str,
        coll_name: &str,
        fields: Vec<String>,
        kind: IndexKind,
        unique: bool,
        background: bool,
    ) -> Result<()> {
        let fields: Vec<String> = fields
            .into_iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();
        if fields.is_empty() {
            return Err(VellumError::Validation("index fields required".into()));
        }
        if kind == IndexKind::Btree && fields.len() != 1 {
            return Err(VellumError::Validation(
                "btree index supports a single field".into(),
            ));
        }

        let db = self.get_or_create_database(db_name)?;
        let collection = db.get_or_create_collection(coll_name, self.config.segment_size)?;

        let name = index_name(kind, &fields);
        {
            let mut state = collection.write();
            if let Some(meta) = state.indexes.meta(&name) {
                if meta.status == IndexStatus::Ready && state.indexes.ready(&name).is_some() {
                    return Ok(());
                }
            }

            let now = chrono::Utc::now().timestamp();
            state.indexes.put_meta(IndexMeta {
                name: name.clone(),
                kind,
                fields,
                unique,
                status: IndexStatus::Building,
                created_at: now,
                updated_at: now,
            });
            state.indexes.save(&collection.indexes_path())?;
        }

        if background {
            let collection = collection.clone();
            std::thread::spawn(move || {
                if let Err(e) = collection.build_index(&name) {
                    warn!("Background index build {} failed: {}", name, e);
                }
            });
            Ok(())
        } else {
            collection.build_index(&name)
        }
    }

    /// Compact a collection's segments
    pub fn compact(&self, db_name: &str, coll_name: &str) -> Result<()> {
        let db = self.get_or_create_database(db_name)?;
        let collection = db.get_or_create_collection(coll_name, self.config.segment_size)?;
        collection.compact()
    }

    // -----------------------------------------------------------------
    // Metadata
    // -----------------------------------------------------------------

    /// Database names, sorted
    pub fn databases(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Collection names of a database, sorted
    pub fn collections(&self, db_name: &str) -> Result<Vec<String>> {
        let db = self.get_or_create_database(db_name)?;
        Ok(db.collection_names())
    }

    /// Engine statistics, optionally restricted to one database
    pub fn stats(&self, db_name: Option<&str>) -> EngineStats {
        let databases = self.databases.read();

        let db_stats: Vec<DatabaseStats> = match db_name {
            Some(name) => normalize_name(name)
                .ok()
                .and_then(|n| databases.get(&n))
                .map(|db| vec![db.stats()])
                .unwrap_or_default(),
            None => databases.values().map(|db| db.stats()).collect(),
        };

        EngineStats {
            database_count: db_stats.len(),
            collection_count: db_stats.iter().map(|d| d.collection_count).sum(),
            document_count: db_stats.iter().map(|d| d.document_count).sum(),
            databases: db_stats,
        }
    }

    /// Segment statistics for one collection
    pub fn segment_stats(&self, db_name: &str, coll_name: &str) -> Result<SegmentStats> {
        let name = normalize_name(db_name)?;
        let coll = normalize_name(coll_name)?;
        let db = self
            .databases
            .read()
            .get(&name)
            .cloned()
            .ok_or_else(|| VellumError::NotFound(format!("database {}", name)))?;
        let collection = db
            .collection(&coll)
            .ok_or_else(|| VellumError::NotFound(format!("collection {}", coll)))?;
        Ok(collection.segment_stats())
    }

    /// WAL statistics
    pub fn wal_stats(&self) -> WalStats {
        self.wal.stats()
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Shut down cleanly: stop background workers, compact and close every
    /// collection, persist metadata, and checkpoint the WAL. The WAL file
    /// is empty afterwards.
    pub fn shutdown(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Shutting down VellumDB");

        // Wake and join the background workers
        self.shutdown_txs.lock().clear();
        for handle in self.threads.lock().drain(..) {
            let _ = handle.join();
        }

        for db in self.databases.read().values() {
            for collection in db.all_collections() {
                if let Err(e) = collection.compact() {
                    warn!("Shutdown compaction of {} failed: {}", collection.name(), e);
                }
                if let Err(e) = collection.close() {
                    warn!("Closing {} failed: {}", collection.name(), e);
                }
            }
        }

        self.flush_all()?;
        self.wal.checkpoint()?;

        info!("Shutdown complete");
        Ok(())
    }

    /// Persist every collection's metadata. Segment data is durable at
    /// append time, so there is nothing else to flush.
    pub fn flush_all(&self) -> Result<()> {
        for db in self.databases.read().values() {
            for collection in db.all_collections() {
                collection.flush()?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn get_or_create_database(&self, name: &str) -> Result<Arc<Database>> {
        let name = normalize_name(name)?;
        {
            let databases = self.databases.read();
            if let Some(db) = databases.get(&name) {
                return Ok(db.clone());
            }
        }

        let mut databases = self.databases.write();
        if let Some(db) = databases.get(&name) {
            return Ok(db.clone());
        }

        let dir = self.config.databases_dir().join(&name);
        let db = Arc::new(Database::open(&name, dir, self.config.segment_size)?);
        databases.insert(name, db.clone());
        Ok(db)
    }

    fn load_databases(&self) -> Result<()> {
        let dir = self.config.databases_dir();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            match Database::open(&name, entry.path(), self.config.segment_size) {
                Ok(db) => {
                    self.databases.write().insert(name, Arc::new(db));
                }
                Err(e) => warn!("Failed to load database {}: {}", name, e),
            }
        }
        Ok(())
    }

    /// Replay the WAL tail through the normal mutation paths with WAL
    /// logging suppressed, then checkpoint so the on-disk state is
    /// self-sufficient again.
    fn replay_wal(&self) -> Result<()> {
        let entries = WalReader::new(self.config.wal_config()).replay()?;
        if entries.is_empty() {
            return Ok(());
        }

        info!("Recovering {} WAL entries", entries.len());
        self.replaying.store(true, Ordering::SeqCst);

        for entry in entries {
            let result = match entry.op {
                WalOp::Insert => match entry.doc {
                    Some(doc) => self.insert(&entry.db, &entry.coll, doc).map(|_| ()),
                    None => Ok(()),
                },
                WalOp::Update => self
                    .update(
                        &entry.db,
                        &entry.coll,
                        entry.filter.unwrap_or_default(),
                        entry.update.unwrap_or_default(),
                        entry.multi,
                    )
                    .map(|_| ()),
                WalOp::Delete => self
                    .delete(
                        &entry.db,
                        &entry.coll,
                        entry.filter.unwrap_or_default(),
                        entry.multi,
                    )
                    .map(|_| ()),
            };
            if let Err(e) = result {
                warn!("WAL replay entry {} failed: {}", entry.seq, e);
            }
        }

        self.replaying.store(false, Ordering::SeqCst);

        self.flush_all()?;
        self.wal.checkpoint()?;
        Ok(())
    }

    fn wal_append(&self, entry: WalEntry) {
        if self.replaying.load(Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.wal.append(entry) {
            warn!("WAL append failed: {}", e);
        }
    }

    /// Start the background workers: WAL syncer (batch/async modes),
    /// auto-checkpoint, and auto-compaction. Each runs on its own thread
    /// and observes the shutdown channel.
    fn start_background(self: &Arc<Self>) {
        if self.config.wal.sync_policy != SyncPolicy::Immediate {
            let interval = self.config.wal.batch_timeout;
            self.spawn_worker(interval, |engine| {
                if let Err(e) = engine.wal.timed_sync() {
                    warn!("WAL background sync failed: {}", e);
                }
            });
        }

        let checkpoint_size = self.config.wal.checkpoint_wal_size;
        self.spawn_worker(self.config.wal.checkpoint_interval, move |engine| {
            if engine.wal.size() < checkpoint_size {
                return;
            }
            info!("Auto-checkpoint triggered (WAL size limit)");
            if let Err(e) = engine.flush_all() {
                warn!("Checkpoint flush failed: {}", e);
                return;
            }
            if let Err(e) = engine.wal.checkpoint() {
                warn!("Checkpoint failed: {}", e);
            }
        });

        if self.config.auto_compaction {
            let threshold = self.config.compaction_threshold;
            self.spawn_worker(self.config.compaction_interval, move |engine| {
                let databases: Vec<Arc<Database>> =
                    engine.databases.read().values().cloned().collect();
                for db in databases {
                    for collection in db.all_collections() {
                        if collection.segment_count() < threshold {
                            continue;
                        }
                        info!("Auto-compacting {}/{}", db.name(), collection.name());
                        if let Err(e) = collection.compact() {
                            warn!("Auto-compaction failed: {}", e);
                        }
                    }
                }
            });
        }
    }

    fn spawn_worker<F>(self: &Arc<Self>, interval: Duration, work: F)
    where
        F: Fn(&Engine) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<()>();
        let weak: Weak<Engine> = Arc::downgrade(self);

        let handle = std::thread::spawn(move || loop {
            match rx.recv_timeout(interval) {
                Err(mpsc::RecvTimeoutError::Timeout) => match weak.upgrade() {
                    Some(engine) => work(&engine),
                    None => break,
                },
                _ => break,
            }
        });

        self.shutdown_txs.lock().push(tx);
        self.threads.lock().push(handle);
    }
}

/// Engine-wide statistics
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub database_count: usize,
    pub collection_count: usize,
    pub document_count: usize,
    pub databases: Vec<DatabaseStats>,
}
