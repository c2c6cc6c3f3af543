//! Hash index over one or more fields

use super::{compound_key, IndexMeta};
use crate::{Document, Result, VellumError};
use std::collections::HashMap;

/// Hash index: compound key string → document ids
#[derive(Debug)]
pub struct HashIndex {
    meta: IndexMeta,
    entries: HashMap<String, Vec<String>>,
}

impl HashIndex {
    /// Build from a document snapshot, enforcing uniqueness when declared
    pub fn build(meta: IndexMeta, docs: &[Document]) -> Result<Self> {
        let mut idx = Self {
            meta,
            entries: HashMap::new(),
        };
        for doc in docs {
            let id = doc.id().unwrap_or_default();
            idx.check_unique_key(&idx.key_for(doc), Some(&id))?;
            idx.add(&id, doc);
        }
        Ok(idx)
    }

    /// Index metadata
    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    /// Compound key for a document over this index's fields
    pub fn key_for(&self, doc: &Document) -> String {
        compound_key(doc, &self.meta.fields)
    }

    /// Document ids stored under a key
    pub fn lookup(&self, key: &str) -> Vec<String> {
        self.entries.get(key).cloned().unwrap_or_default()
    }

    /// Reject a document whose key is already taken by another document
    pub fn check_unique(&self, doc: &Document, exclude_id: Option<&str>) -> Result<()> {
        self.check_unique_key(&self.key_for(doc), exclude_id)
    }

    fn check_unique_key(&self, key: &str, exclude_id: Option<&str>) -> Result<()> {
        if !self.meta.unique {
            return Ok(());
        }
        if let Some(ids) = self.entries.get(key) {
            let taken = ids.iter().any(|id| Some(id.as_str()) != exclude_id);
            if taken {
                return Err(VellumError::UniqueViolation {
                    index: self.meta.name.clone(),
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Add a document's entry
    pub fn add(&mut self, doc_id: &str, doc: &Document) {
        let key = self.key_for(doc);
        let ids = self.entries.entry(key).or_default();
        if !ids.iter().any(|id| id == doc_id) {
            ids.push(doc_id.to_string());
        }
    }

    /// Remove a document's entry
    pub fn remove(&mut self, doc_id: &str, doc: &Document) {
        let key = self.key_for(doc);
        if let Some(ids) = self.entries.get_mut(&key) {
            ids.retain(|id| id != doc_id);
            if ids.is_empty() {
                self.entries.remove(&key);
            }
        }
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{index_name, IndexKind, IndexStatus};
    use serde_json::json;

    fn doc(v: serde_json::Value) -> Document {
        serde_json::from_value(v).unwrap()
    }

    fn meta(fields: &[&str], unique: bool) -> IndexMeta {
        let fields: Vec<String> = fields.iter().map(|s| s.to_string()).collect();
        IndexMeta {
            name: index_name(IndexKind::Hash, &fields),
            kind: IndexKind::Hash,
            fields,
            unique,
            status: IndexStatus::Ready,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_build_and_lookup() {
        let docs = vec![
            doc(json!({"_id": "a", "country": "FR", "city": "Paris"})),
            doc(json!({"_id": "b", "country": "FR", "city": "Lyon"})),
            doc(json!({"_id": "c", "country": "FR", "city": "Paris"})),
        ];
        let idx = HashIndex::build(meta(&["country", "city"], false), &docs).unwrap();

        let mut ids = idx.lookup("FR|Paris");
        ids.sort();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(idx.lookup("FR|Nice").is_empty());
    }

    #[test]
    fn test_unique_build_rejects_duplicates() {
        let docs = vec![
            doc(json!({"_id": "a", "email": "x@y.io"})),
            doc(json!({"_id": "b", "email": "x@y.io"})),
        ];
        let err = HashIndex::build(meta(&["email"], true), &docs).unwrap_err();
        assert!(matches!(err, VellumError::UniqueViolation { .. }));
    }

    #[test]
    fn test_unique_never_maps_key_to_two_ids() {
        let docs = vec![doc(json!({"_id": "a", "email": "x@y.io"}))];
        let idx = HashIndex::build(meta(&["email"], true), &docs).unwrap();

        let dup = doc(json!({"_id": "b", "email": "x@y.io"}));
        assert!(idx.check_unique(&dup, None).is_err());
        assert!(idx.check_unique(&dup, Some("a")).is_ok());
        assert_eq!(idx.lookup("x@y.io").len(), 1);
    }

    #[test]
    fn test_add_remove() {
        let mut idx = HashIndex::build(meta(&["tag"], false), &[]).unwrap();
        let d = doc(json!({"_id": "a", "tag": "red"}));

        idx.add("a", &d);
        idx.add("a", &d); // idempotent
        assert_eq!(idx.lookup("red"), vec!["a"]);

        idx.remove("a", &d);
        assert!(idx.lookup("red").is_empty());
        assert!(idx.is_empty());
    }

    #[test]
    fn test_missing_field_keys_as_null() {
        let docs = vec![doc(json!({"_id": "a"}))];
        let idx = HashIndex::build(meta(&["tag"], false), &docs).unwrap();
        assert_eq!(idx.lookup("null"), vec!["a"]);
    }
}
