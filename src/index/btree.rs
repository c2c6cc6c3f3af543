//! B-tree index: sorted key array over a single numeric or timestamp field

use super::IndexMeta;
use crate::{Document, Result, Value, VellumError};

/// Key interpretation for a B-tree index field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BTreeKind {
    /// Numeric field (ints and floats coerce to f64)
    Number,
    /// RFC3339 timestamp field (keys are unix nanos as f64)
    Time,
}

/// B-tree index: a sorted array of `f64` keys with aligned posting lists
pub struct BTreeIndex {
    meta: IndexMeta,
    kind: BTreeKind,
    keys: Vec<f64>,
    postings: Vec<Vec<String>>,
}

impl BTreeIndex {
    /// Build from a document snapshot. The key kind is detected from the
    /// first convertible value; documents without a convertible value are
    /// skipped.
    pub fn build(meta: IndexMeta, docs: &[Document]) -> Result<Self> {
        let field = meta
            .fields
            .first()
            .cloned()
            .ok_or_else(|| VellumError::Validation("btree index needs a field".into()))?;

        let kind = docs
            .iter()
            .filter_map(|d| d.get_path(&field))
            .find_map(|v| {
                if v.as_number().is_some() {
                    Some(BTreeKind::Number)
                } else if v.as_time().is_some() {
                    Some(BTreeKind::Time)
                } else {
                    None
                }
            })
            // an empty or unconvertible snapshot defaults to numeric keys
            .unwrap_or(BTreeKind::Number);

        let mut idx = Self {
            meta,
            kind,
            keys: Vec::new(),
            postings: Vec::new(),
        };

        for doc in docs {
            let id = doc.id().unwrap_or_default();
            if let Some(key) = doc.get_path(&field).and_then(|v| idx.convert(v)) {
                idx.check_unique_key(key, Some(&id))?;
                idx.insert_key(key, &id);
            }
        }
        Ok(idx)
    }

    /// Index metadata
    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    /// Key interpretation
    pub fn kind(&self) -> BTreeKind {
        self.kind
    }

    /// The sorted key array (strictly increasing)
    pub fn keys(&self) -> &[f64] {
        &self.keys
    }

    fn field(&self) -> &str {
        &self.meta.fields[0]
    }

    fn convert(&self, value: &Value) -> Option<f64> {
        match self.kind {
            BTreeKind::Number => value.as_number(),
            BTreeKind::Time => value
                .as_time()
                .and_then(|t| t.timestamp_nanos_opt())
                .map(|n| n as f64),
        }
    }

    /// Convert a filter bound to a key, defaulting to 0 when unconvertible
    pub fn key_or_zero(&self, value: &Value) -> f64 {
        self.convert(value).unwrap_or(0.0)
    }

    fn doc_key(&self, doc: &Document) -> Option<f64> {
        doc.get_path(self.field()).and_then(|v| self.convert(v))
    }

    /// Reject a document whose key is already taken by another document
    pub fn check_unique(&self, doc: &Document, exclude_id: Option<&str>) -> Result<()> {
        if let Some(key) = self.doc_key(doc) {
            self.check_unique_key(key, exclude_id)?;
        }
        Ok(())
    }

    fn check_unique_key(&self, key: f64, exclude_id: Option<&str>) -> Result<()> {
        if !self.meta.unique {
            return Ok(());
        }
        if let Ok(pos) = self.keys.binary_search_by(|k| k.total_cmp(&key)) {
            let taken = self.postings[pos]
                .iter()
                .any(|id| Some(id.as_str()) != exclude_id);
            if taken {
                return Err(VellumError::UniqueViolation {
                    index: self.meta.name.clone(),
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Add a document's entry (no-op when the field is unconvertible)
    pub fn add(&mut self, doc_id: &str, doc: &Document) {
        if let Some(key) = self.doc_key(doc) {
            self.insert_key(key, doc_id);
        }
    }

    fn insert_key(&mut self, key: f64, doc_id: &str) {
        match self.keys.binary_search_by(|k| k.total_cmp(&key)) {
            Ok(pos) => {
                let ids = &mut self.postings[pos];
                if !ids.iter().any(|id| id == doc_id) {
                    ids.push(doc_id.to_string());
                }
            }
            Err(pos) => {
                self.keys.insert(pos, key);
                self.postings.insert(pos, vec![doc_id.to_string()]);
            }
        }
    }

    /// Remove a document's entry
    pub fn remove(&mut self, doc_id: &str, doc: &Document) {
        if let Some(key) = self.doc_key(doc) {
            if let Ok(pos) = self.keys.binary_search_by(|k| k.total_cmp(&key)) {
                let ids = &mut self.postings[pos];
                ids.retain(|id| id != doc_id);
                if ids.is_empty() {
                    self.keys.remove(pos);
                    self.postings.remove(pos);
                }
            }
        }
    }

    /// Collect document ids for keys within the given bounds.
    /// Each bound is `(key, inclusive)`.
    pub fn range(
        &self,
        lower: Option<(f64, bool)>,
        upper: Option<(f64, bool)>,
    ) -> Vec<String> {
        let start = match lower {
            Some((lo, inclusive)) => self.keys.partition_point(|&k| {
                if inclusive {
                    k < lo
                } else {
                    k <= lo
                }
            }),
            None => 0,
        };
        let end = match upper {
            Some((hi, inclusive)) => self.keys.partition_point(|&k| {
                if inclusive {
                    k <= hi
                } else {
                    k < hi
                }
            }),
            None => self.keys.len(),
        };

        if start >= end {
            return Vec::new();
        }

        self.postings[start..end]
            .iter()
            .flat_map(|ids| ids.iter().cloned())
            .collect()
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

    fn meta(field: &str, unique: bool) -> IndexMeta {
        let fields = vec![field.to_string()];
        IndexMeta {
            name: index_name(IndexKind::Btree, &fields),
            kind: IndexKind::Btree,
            fields,
            unique,
            status: IndexStatus::Ready,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn age_docs(n: i64) -> Vec<Document> {
        (0..n)
            .map(|i| doc(json!({"_id": format!("doc{}", i), "age": i})))
            .collect()
    }

    #[test]
    fn test_keys_sorted_strictly_increasing() {
        // insert out of order
        let docs = vec![
            doc(json!({"_id": "a", "age": 30})),
            doc(json!({"_id": "b", "age": 10})),
            doc(json!({"_id": "c", "age": 20})),
            doc(json!({"_id": "d", "age": 20})),
        ];
        let idx = BTreeIndex::build(meta("age", false), &docs).unwrap();
        assert_eq!(idx.keys(), &[10.0, 20.0, 30.0]);
        for pair in idx.keys().windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_range_lookup_bounds() {
        let idx = BTreeIndex::build(meta("age", false), &age_docs(100)).unwrap();

        // [10, 20) => ages 10..=19
        let ids = idx.range(Some((10.0, true)), Some((20.0, false)));
        assert_eq!(ids.len(), 10);
        assert!(ids.contains(&"doc10".to_string()));
        assert!(ids.contains(&"doc19".to_string()));
        assert!(!ids.contains(&"doc20".to_string()));

        // (10, 20] => ages 11..=20
        let ids = idx.range(Some((10.0, false)), Some((20.0, true)));
        assert_eq!(ids.len(), 10);
        assert!(!ids.contains(&"doc10".to_string()));
        assert!(ids.contains(&"doc20".to_string()));

        // open-ended
        assert_eq!(idx.range(Some((95.0, true)), None).len(), 5);
        assert_eq!(idx.range(None, Some((4.0, true))).len(), 5);
        assert_eq!(idx.range(None, None).len(), 100);

        // empty window
        assert!(idx.range(Some((20.0, false)), Some((20.0, false))).is_empty());
    }

    #[test]
    fn test_time_kind_keys() {
        let docs = vec![
            doc(json!({"_id": "a", "at": "2024-01-01T00:00:00Z"})),
            doc(json!({"_id": "b", "at": "2024-06-01T00:00:00Z"})),
        ];
        let idx = BTreeIndex::build(meta("at", false), &docs).unwrap();
        assert_eq!(idx.kind(), BTreeKind::Time);
        assert_eq!(idx.keys().len(), 2);

        let cut = Value::String("2024-03-01T00:00:00Z".into());
        let ids = idx.range(Some((idx.key_or_zero(&cut), true)), None);
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn test_unique_enforcement() {
        let docs = vec![doc(json!({"_id": "a", "age": 30}))];
        let idx = BTreeIndex::build(meta("age", true), &docs).unwrap();

        let dup = doc(json!({"_id": "b", "age": 30}));
        assert!(idx.check_unique(&dup, None).is_err());
        assert!(idx.check_unique(&dup, Some("a")).is_ok());
    }

    #[test]
    fn test_add_remove_keeps_order() {
        let mut idx = BTreeIndex::build(meta("age", false), &age_docs(5)).unwrap();

        idx.remove("doc2", &doc(json!({"_id": "doc2", "age": 2})));
        assert_eq!(idx.keys(), &[0.0, 1.0, 3.0, 4.0]);

        idx.add("doc9", &doc(json!({"_id": "doc9", "age": 2.5})));
        assert_eq!(idx.keys(), &[0.0, 1.0, 2.5, 3.0, 4.0]);
    }

    #[test]
    fn test_unconvertible_values_skipped() {
        let docs = vec![
            doc(json!({"_id": "a", "age": 1})),
            doc(json!({"_id": "b", "age": "not a number"})),
            doc(json!({"_id": "c"})),
        ];
        let idx = BTreeIndex::build(meta("age", false), &docs).unwrap();
        assert_eq!(idx.keys().len(), 1);
    }
}
