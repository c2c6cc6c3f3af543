//! Core document types for VellumDB

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single document field value.
///
/// The untagged representation round-trips JSON while preserving the
/// integer/float distinction: `5` decodes as `Int`, `5.0` as `Float`.
/// Timestamps are carried uniformly as RFC3339 strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// JSON null
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// UTF-8 string (RFC3339 strings double as timestamps)
    String(String),
    /// Array of values
    Array(Vec<Value>),
    /// Nested document
    Object(Document),
}

impl Value {
    /// Numeric coercion: integers and floats directly, strings that parse
    /// as numbers are coerced too.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Interpret an RFC3339 string value as a timestamp.
    pub fn as_time(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Value::String(s) => DateTime::parse_from_rfc3339(s).ok(),
            _ => None,
        }
    }

    /// Get as string slice if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as array slice if this is an array value.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get as document if this is an object value.
    pub fn as_object(&self) -> Option<&Document> {
        match self {
            Value::Object(d) => Some(d),
            _ => None,
        }
    }

    /// Stringified form used for ordering fallbacks and index keys.
    /// Null renders empty, scalars render bare, composites render as JSON.
    pub fn display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// A document: an ordered mapping from field names to values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(pub BTreeMap<String, Value>);

impl Document {
    /// Create an empty document
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Get a top-level field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a top-level field
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Remove a top-level field
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Check for a top-level field
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of top-level fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the document has no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over fields
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Resolve a dotted path (`address.city`) through nested documents.
    /// A literal key wins over traversal, so filters carrying dotted field
    /// names resolve against themselves too.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        if let Some(v) = self.0.get(path) {
            return Some(v);
        }
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut cur = self.0.get(first)?;
        for part in parts {
            cur = cur.as_object()?.get(part)?;
        }
        Some(cur)
    }

    /// Set a dotted path, creating intermediate documents as needed.
    /// Intermediate non-object values are replaced by fresh documents.
    pub fn set_path(&mut self, path: &str, value: Value) {
        let parts: Vec<&str> = path.split('.').collect();
        let mut cur = &mut self.0;
        for part in &parts[..parts.len() - 1] {
            let entry = cur
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if !matches!(entry, Value::Object(_)) {
                *entry = Value::Object(Document::new());
            }
            match entry {
                Value::Object(doc) => cur = &mut doc.0,
                _ => unreachable!(),
            }
        }
        cur.insert(parts[parts.len() - 1].to_string(), value);
    }

    /// Remove a dotted path. Missing intermediates are a no-op.
    pub fn unset_path(&mut self, path: &str) {
        let parts: Vec<&str> = path.split('.').collect();
        let mut cur = &mut self.0;
        for part in &parts[..parts.len() - 1] {
            match cur.get_mut(*part) {
                Some(Value::Object(doc)) => cur = &mut doc.0,
                _ => return,
            }
        }
        cur.remove(parts[parts.len() - 1]);
    }

    /// Stringified `_id`, if present.
    pub fn id(&self) -> Option<String> {
        self.get("_id").map(|v| v.display_string())
    }

    /// Size of the JSON encoding in bytes.
    pub fn encoded_len(&self) -> usize {
        serde_json::to_vec(self).map(|b| b.len()).unwrap_or(0)
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Recursively canonicalize a document:
/// `{"$date": "<rfc3339>"}` single-key objects collapse to the plain
/// RFC3339 string; numbers keep the variant serde assigned at parse time.
pub fn canonicalize_document(doc: Document) -> Document {
    doc.0
        .into_iter()
        .map(|(k, v)| (k, canonicalize_value(v)))
        .collect()
}

fn canonicalize_value(v: Value) -> Value {
    match v {
        Value::Object(doc) => {
            if doc.len() == 1 {
                if let Some(Value::String(s)) = doc.get("$date") {
                    if DateTime::parse_from_rfc3339(s).is_ok() {
                        return Value::String(s.clone());
                    }
                }
            }
            Value::Object(canonicalize_document(doc))
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize_value).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: serde_json::Value) -> Document {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_number_variant_preserved() {
        let d = doc(json!({"a": 5, "b": 5.0, "c": "5"}));
        assert_eq!(d.get("a"), Some(&Value::Int(5)));
        assert_eq!(d.get("b"), Some(&Value::Float(5.0)));
        assert_eq!(d.get("c"), Some(&Value::String("5".to_string())));
    }

    #[test]
    fn test_json_round_trip() {
        let d = doc(json!({
            "name": "alice",
            "age": 30,
            "score": 1.5,
            "tags": ["x", "y"],
            "address": {"city": "Paris"},
            "active": true,
            "extra": null
        }));
        let bytes = serde_json::to_vec(&d).unwrap();
        let back: Document = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn test_get_path() {
        let d = doc(json!({"address": {"city": "Paris", "geo": {"lat": 48}}}));
        assert_eq!(
            d.get_path("address.city"),
            Some(&Value::String("Paris".to_string()))
        );
        assert_eq!(d.get_path("address.geo.lat"), Some(&Value::Int(48)));
        assert_eq!(d.get_path("address.zip"), None);
        assert_eq!(d.get_path("address.city.oops"), None);
    }

    #[test]
    fn test_set_unset_path() {
        let mut d = Document::new();
        d.set_path("a.b.c", Value::Int(1));
        assert_eq!(d.get_path("a.b.c"), Some(&Value::Int(1)));

        d.unset_path("a.b.c");
        assert_eq!(d.get_path("a.b.c"), None);
        // intermediate objects survive
        assert!(d.get_path("a.b").is_some());

        // unsetting through a missing branch is a no-op
        d.unset_path("x.y.z");
    }

    #[test]
    fn test_canonicalize_date() {
        let d = doc(json!({
            "at": {"$date": "2024-05-01T10:00:00Z"},
            "nested": {"inner": {"$date": "2024-05-01T10:00:00Z"}},
            "not_date": {"$date": "yesterday"}
        }));
        let c = canonicalize_document(d);
        assert_eq!(
            c.get("at"),
            Some(&Value::String("2024-05-01T10:00:00Z".to_string()))
        );
        assert_eq!(
            c.get_path("nested.inner"),
            Some(&Value::String("2024-05-01T10:00:00Z".to_string()))
        );
        // malformed $date stays an object
        assert!(matches!(c.get("not_date"), Some(Value::Object(_))));
    }

    #[test]
    fn test_value_coercions() {
        assert_eq!(Value::Int(5).as_number(), Some(5.0));
        assert_eq!(Value::String("2.5".into()).as_number(), Some(2.5));
        assert_eq!(Value::Bool(true).as_number(), None);
        assert!(Value::String("2024-05-01T10:00:00Z".into()).as_time().is_some());
        assert!(Value::String("not a date".into()).as_time().is_none());
    }

    #[test]
    fn test_display_string() {
        assert_eq!(Value::Null.display_string(), "");
        assert_eq!(Value::Float(5.0).display_string(), "5");
        assert_eq!(Value::Float(5.5).display_string(), "5.5");
        assert_eq!(Value::Int(-3).display_string(), "-3");
    }
}
