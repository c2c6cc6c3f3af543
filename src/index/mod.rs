//! Secondary indexes
//!
//! Hash indexes cover one or more fields with compound string keys; B-tree
//! indexes cover a single numeric or RFC3339-timestamp field with a sorted
//! key array. Metadata persists in `indexes.json`; the in-memory structures
//! are rebuilt from the live document set when a collection is opened.

mod btree;
mod hash;

pub use btree::{BTreeIndex, BTreeKind};
pub use hash::HashIndex;

use crate::{Document, Result, Value, VellumError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Index kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Hash,
    Btree,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Hash => write!(f, "hash"),
            IndexKind::Btree => write!(f, "btree"),
        }
    }
}

/// Index build state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    Building,
    Ready,
}

/// Persisted index metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: IndexKind,
    pub fields: Vec<String>,
    pub unique: bool,
    pub status: IndexStatus,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "updatedAt")]
    pub updated_at: i64,
}

/// Canonical index name: `<type>:<f1>,<f2>,…`
pub fn index_name(kind: IndexKind, fields: &[String]) -> String {
    format!("{}:{}", kind, fields.join(","))
}

/// Normalize a value into an index key part. Missing and null values map
/// to `"null"`; separator and newline characters are escaped.
pub fn key_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "null".to_string(),
        Some(v) => v
            .display_string()
            .trim()
            .replace('|', "_")
            .replace(['\n', '\r'], " ")
            .trim()
            .to_string(),
    }
}

/// Compound key for a document over the given fields, parts joined by `|`
pub fn compound_key(doc: &Document, fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| key_string(doc.get_path(f)))
        .collect::<Vec<_>>()
        .join("|")
}

/// An index structure: tagged variant over the supported kinds
pub enum Index {
    Hash(HashIndex),
    BTree(BTreeIndex),
}

impl Index {
    /// Build an index of the kind named by `meta` from a document snapshot
    pub fn build(meta: IndexMeta, docs: &[Document]) -> Result<Self> {
        match meta.kind {
            IndexKind::Hash => Ok(Index::Hash(HashIndex::build(meta, docs)?)),
            IndexKind::Btree => Ok(Index::BTree(BTreeIndex::build(meta, docs)?)),
        }
    }

    /// Metadata for this index
    pub fn meta(&self) -> &IndexMeta {
        match self {
            Index::Hash(idx) => idx.meta(),
            Index::BTree(idx) => idx.meta(),
        }
    }

    fn check_unique(&self, doc: &Document, exclude_id: Option<&str>) -> Result<()> {
        match self {
            Index::Hash(idx) => idx.check_unique(doc, exclude_id),
            Index::BTree(idx) => idx.check_unique(doc, exclude_id),
        }
    }

    fn add(&mut self, doc_id: &str, doc: &Document) {
        match self {
            Index::Hash(idx) => idx.add(doc_id, doc),
            Index::BTree(idx) => idx.add(doc_id, doc),
        }
    }

    fn remove(&mut self, doc_id: &str, doc: &Document) {
        match self {
            Index::Hash(idx) => idx.remove(doc_id, doc),
            Index::BTree(idx) => idx.remove(doc_id, doc),
        }
    }
}

/// The index state of one collection: persisted metadata plus the built
/// in-memory structures keyed by index name.
#[derive(Default)]
pub struct IndexSet {
    metas: BTreeMap<String, IndexMeta>,
    built: HashMap<String, Index>,
}

impl IndexSet {
    /// Load persisted metadata from `indexes.json` (structures stay unbuilt)
    pub fn load(path: &Path) -> Self {
        let mut set = Self::default();
        let bytes = match fs::read(path) {
            Ok(b) if !b.is_empty() => b,
            _ => return set,
        };
        match serde_json::from_slice::<Vec<IndexMeta>>(&bytes) {
            Ok(metas) => {
                for meta in metas {
                    set.metas.insert(meta.name.clone(), meta);
                }
            }
            Err(e) => warn!("Ignoring unreadable index metadata {:?}: {}", path, e),
        }
        set
    }

    /// Persist metadata to `indexes.json` via temp-file rename
    pub fn save(&self, path: &Path) -> Result<()> {
        let metas: Vec<&IndexMeta> = self.metas.values().collect();
        let bytes = serde_json::to_vec_pretty(&metas)
            .map_err(|e| VellumError::InvalidFormat(e.to_string()))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Metadata entries, ordered by name
    pub fn metas(&self) -> impl Iterator<Item = &IndexMeta> {
        self.metas.values()
    }

    /// Look up metadata by index name
    pub fn meta(&self, name: &str) -> Option<&IndexMeta> {
        self.metas.get(name)
    }

    /// Record (or replace) metadata for an index
    pub fn put_meta(&mut self, meta: IndexMeta) {
        self.metas.insert(meta.name.clone(), meta);
    }

    /// A built, ready index by name
    pub fn ready(&self, name: &str) -> Option<&Index> {
        self.built
            .get(name)
            .filter(|idx| idx.meta().status == IndexStatus::Ready)
    }

    /// Build the structure for `name` from a document snapshot and mark it
    /// ready.
    pub fn build(&mut self, name: &str, docs: &[Document]) -> Result<()> {
        let mut meta = self
            .metas
            .get(name)
            .cloned()
            .ok_or_else(|| VellumError::NotFound(format!("index {}", name)))?;
        meta.status = IndexStatus::Ready;
        meta.updated_at = chrono::Utc::now().timestamp();

        let index = Index::build(meta.clone(), docs)?;
        self.metas.insert(name.to_string(), meta);
        self.built.insert(name.to_string(), index);
        Ok(())
    }

    /// Rebuild every index marked ready from the live set; used at
    /// collection open. Unbuildable indexes are demoted to `building`.
    pub fn rebuild(&mut self, docs: &[Document]) {
        let names: Vec<String> = self
            .metas
            .values()
            .filter(|m| m.status == IndexStatus::Ready)
            .map(|m| m.name.clone())
            .collect();
        for name in names {
            if let Err(e) = self.build(&name, docs) {
                warn!("Failed to rebuild index {}: {}", name, e);
                if let Some(meta) = self.metas.get_mut(&name) {
                    meta.status = IndexStatus::Building;
                }
            }
        }
    }

    /// Reject the document if it would violate any unique index.
    /// `exclude_id` skips the document's own existing entries on update.
    pub fn check_unique(&self, doc: &Document, exclude_id: Option<&str>) -> Result<()> {
        for index in self.built.values() {
            if index.meta().unique {
                index.check_unique(doc, exclude_id)?;
            }
        }
        Ok(())
    }

    /// Apply an inserted document to every built index
    pub fn add_doc(&mut self, doc_id: &str, doc: &Document) {
        for index in self.built.values_mut() {
            index.add(doc_id, doc);
        }
    }

    /// Remove a deleted document from every built index
    pub fn remove_doc(&mut self, doc_id: &str, doc: &Document) {
        for index in self.built.values_mut() {
            index.remove(doc_id, doc);
        }
    }

    /// Replace a document's entries after an update
    pub fn update_doc(&mut self, doc_id: &str, old: &Document, new: &Document) {
        for index in self.built.values_mut() {
            index.remove(doc_id, old);
            index.add(doc_id, new);
        }
    }
}
