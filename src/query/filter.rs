//! Filter evaluator
//!
//! Filters are documents: `{$and: [...]}` or `{$or: [...]}` at the top
//! level, otherwise field clauses. A bare field value means equality; an
//! object value is an operator map. Dotted field paths traverse nested
//! documents.

use super::{compare_any, compare_ordered};
use crate::{Document, Value};
use std::cmp::Ordering;

/// Check whether a document matches a filter
pub fn matches_filter(doc: &Document, filter: &Document) -> bool {
    if filter.is_empty() {
        return true;
    }

    if let Some(or) = filter.get("$or") {
        let arr = match or.as_array() {
            Some(arr) if !arr.is_empty() => arr,
            _ => return false,
        };
        return arr
            .iter()
            .filter_map(Value::as_object)
            .any(|sub| matches_filter(doc, sub));
    }

    if let Some(and) = filter.get("$and") {
        let arr = match and.as_array() {
            Some(arr) if !arr.is_empty() => arr,
            _ => return false,
        };
        return arr.iter().all(|item| match item.as_object() {
            Some(sub) => matches_filter(doc, sub),
            None => false,
        });
    }

    for (key, want) in filter.iter() {
        if key.starts_with('$') {
            continue;
        }

        let got = doc.get_path(key);

        if let Value::Object(ops) = want {
            if !matches_operators(doc, key, got, ops) {
                return false;
            }
            continue;
        }

        // bare equality requires the field to exist
        match got {
            Some(value) if compare_any(value, want) == Ordering::Equal => {}
            _ => return false,
        }
    }

    true
}

fn matches_operators(doc: &Document, key: &str, got: Option<&Value>, ops: &Document) -> bool {
    let value = got.unwrap_or(&Value::Null);

    for (op, op_val) in ops.iter() {
        let ok = match op.as_str() {
            "$exists" => match op_val {
                Value::Bool(want_exists) => *want_exists == got.is_some(),
                _ => false,
            },
            "$gt" => compare_ordered(value, op_val) == Some(Ordering::Greater),
            "$gte" => matches!(
                compare_ordered(value, op_val),
                Some(Ordering::Greater) | Some(Ordering::Equal)
            ),
            "$lt" => compare_ordered(value, op_val) == Some(Ordering::Less),
            "$lte" => matches!(
                compare_ordered(value, op_val),
                Some(Ordering::Less) | Some(Ordering::Equal)
            ),
            "$ne" => compare_any(value, op_val) != Ordering::Equal,
            "$in" => matches_in(value, op_val),
            "$nin" => !matches_in(value, op_val),
            "$regex" => matches_regex(value, op_val),
            "$not" => match op_val {
                Value::Object(sub) => {
                    let mut inner = Document::new();
                    inner.insert(key, Value::Object(sub.clone()));
                    !matches_filter(doc, &inner)
                }
                _ => false,
            },
            "$elemMatch" => match op_val {
                Value::Object(sub) => matches_elem(value, sub),
                _ => false,
            },
            _ => false,
        };
        if !ok {
            return false;
        }
    }
    true
}

fn matches_in(value: &Value, candidates: &Value) -> bool {
    match candidates.as_array() {
        Some(items) => items
            .iter()
            .any(|item| compare_any(value, item) == Ordering::Equal),
        None => false,
    }
}

fn matches_regex(value: &Value, pattern: &Value) -> bool {
    let (s, pat) = match (value.as_str(), pattern.as_str()) {
        (Some(s), Some(p)) => (s, p),
        _ => return false,
    };
    match regex::Regex::new(pat) {
        Ok(re) => re.is_match(s),
        Err(_) => false,
    }
}

fn matches_elem(value: &Value, sub: &Document) -> bool {
    match value.as_array() {
        Some(items) => items
            .iter()
            .filter_map(Value::as_object)
            .any(|item| matches_filter(item, sub)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: serde_json::Value) -> Document {
        serde_json::from_value(v).unwrap()
    }

    fn matches(d: serde_json::Value, f: serde_json::Value) -> bool {
        matches_filter(&doc(d), &doc(f))
    }

    #[test]
    fn test_empty_filter_matches_all() {
        assert!(matches(json!({"a": 1}), json!({})));
    }

    #[test]
    fn test_bare_equality() {
        assert!(matches(json!({"name": "alice"}), json!({"name": "alice"})));
        assert!(!matches(json!({"name": "bob"}), json!({"name": "alice"})));
        // missing field never equals
        assert!(!matches(json!({}), json!({"name": "alice"})));
        // numeric coercion: 5 == 5.0
        assert!(matches(json!({"n": 5}), json!({"n": 5.0})));
    }

    #[test]
    fn test_dotted_paths() {
        let d = json!({"address": {"city": "Paris", "geo": {"lat": 48}}});
        assert!(matches(d.clone(), json!({"address.city": "Paris"})));
        assert!(matches(d.clone(), json!({"address.geo.lat": {"$gte": 48}})));
        assert!(!matches(d, json!({"address.city": "Lyon"})));
    }

    #[test]
    fn test_range_operators() {
        let d = json!({"age": 25});
        assert!(matches(d.clone(), json!({"age": {"$gt": 20}})));
        assert!(matches(d.clone(), json!({"age": {"$gte": 25}})));
        assert!(matches(d.clone(), json!({"age": {"$lt": 30}})));
        assert!(matches(d.clone(), json!({"age": {"$lte": 25}})));
        assert!(!matches(d.clone(), json!({"age": {"$gt": 25}})));
        assert!(matches(d.clone(), json!({"age": {"$gt": 20, "$lt": 30}})));
        assert!(!matches(d, json!({"age": {"$gt": 20, "$lt": 25}})));
        // non-numeric values never satisfy range operators
        assert!(!matches(json!({"age": "old"}), json!({"age": {"$gt": 20}})));
    }

    #[test]
    fn test_range_on_timestamps() {
        let d = json!({"at": "2024-06-01T00:00:00Z"});
        assert!(matches(d.clone(), json!({"at": {"$gt": "2024-01-01T00:00:00Z"}})));
        assert!(!matches(d, json!({"at": {"$lt": "2024-01-01T00:00:00Z"}})));
    }

    #[test]
    fn test_exists() {
        assert!(matches(json!({"a": 1}), json!({"a": {"$exists": true}})));
        assert!(!matches(json!({}), json!({"a": {"$exists": true}})));
        assert!(matches(json!({}), json!({"a": {"$exists": false}})));
        assert!(!matches(json!({"a": null}), json!({"a": {"$exists": false}})));
    }

    #[test]
    fn test_ne_in_nin() {
        assert!(matches(json!({"a": 1}), json!({"a": {"$ne": 2}})));
        assert!(!matches(json!({"a": 1}), json!({"a": {"$ne": 1}})));
        // $ne on a missing field matches
        assert!(matches(json!({}), json!({"a": {"$ne": 1}})));

        assert!(matches(json!({"a": 2}), json!({"a": {"$in": [1, 2, 3]}})));
        assert!(!matches(json!({"a": 5}), json!({"a": {"$in": [1, 2, 3]}})));
        assert!(matches(json!({"a": 5}), json!({"a": {"$nin": [1, 2, 3]}})));
    }

    #[test]
    fn test_regex() {
        assert!(matches(json!({"s": "hello world"}), json!({"s": {"$regex": "^hello"}})));
        assert!(!matches(json!({"s": "world"}), json!({"s": {"$regex": "^hello"}})));
        // non-string target never matches
        assert!(!matches(json!({"s": 5}), json!({"s": {"$regex": "5"}})));
        // invalid pattern never matches
        assert!(!matches(json!({"s": "x"}), json!({"s": {"$regex": "("}})));
    }

    #[test]
    fn test_not() {
        assert!(matches(json!({"a": 1}), json!({"a": {"$not": {"$gt": 5}}})));
        assert!(!matches(json!({"a": 10}), json!({"a": {"$not": {"$gt": 5}}})));
        assert!(matches(
            json!({"s": "bob"}),
            json!({"s": {"$not": {"$regex": "^a"}}})
        ));
    }

    #[test]
    fn test_elem_match() {
        let d = json!({"items": [{"qty": 2}, {"qty": 9}]});
        assert!(matches(d.clone(), json!({"items": {"$elemMatch": {"qty": {"$gt": 5}}}})));
        assert!(!matches(d, json!({"items": {"$elemMatch": {"qty": {"$gt": 10}}}})));
        assert!(!matches(
            json!({"items": "not an array"}),
            json!({"items": {"$elemMatch": {"qty": 1}}})
        ));
    }

    #[test]
    fn test_or_and() {
        let d = json!({"a": 1, "b": 2});
        assert!(matches(d.clone(), json!({"$or": [{"a": 9}, {"b": 2}]})));
        assert!(!matches(d.clone(), json!({"$or": [{"a": 9}, {"b": 9}]})));
        assert!(matches(d.clone(), json!({"$and": [{"a": 1}, {"b": 2}]})));
        assert!(!matches(d.clone(), json!({"$and": [{"a": 1}, {"b": 9}]})));
        // empty clause lists match nothing
        assert!(!matches(d.clone(), json!({"$or": []})));
        assert!(!matches(d, json!({"$and": []})));
    }

    #[test]
    fn test_unknown_operator_rejects() {
        assert!(!matches(json!({"a": 1}), json!({"a": {"$bogus": 1}})));
    }
}
