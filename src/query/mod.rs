//! Query evaluation: value ordering, sorting, pagination, projection

mod filter;
mod planner;
mod update;

pub use filter::matches_filter;
pub use planner::candidate_ids;
pub use update::apply_update;

use crate::{Document, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Options applied to a query after filtering
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Sort specification: field → direction (negative = descending).
    /// Keys are applied in ascending name order.
    pub sort: BTreeMap<String, i32>,
    /// Maximum results (0 = unlimited)
    pub limit: usize,
    /// Results to skip
    pub skip: usize,
    /// Projection: field → 1 (include) or 0 (exclude)
    pub projection: BTreeMap<String, i32>,
}

/// Total order over values by type class: numeric (with int/float/string
/// coercion), then RFC3339 timestamps, then strings, else lexicographic on
/// the stringified form.
pub fn compare_any(a: &Value, b: &Value) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
        return x.total_cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_time(), b.as_time()) {
        return x.cmp(&y);
    }
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return x.cmp(y);
    }
    a.display_string().cmp(&b.display_string())
}

/// Ordered comparison for range operators: numbers compare numerically,
/// RFC3339 timestamps chronologically; anything else does not order.
pub fn compare_ordered(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
        return Some(x.total_cmp(&y));
    }
    if let (Some(x), Some(y)) = (a.as_time(), b.as_time()) {
        return Some(x.cmp(&y));
    }
    None
}

/// Sort documents in place. Sort keys are visited in ascending key-name
/// order (a stable tie-breaker), each with its own direction.
pub fn apply_sort(docs: &mut [Document], sort: &BTreeMap<String, i32>) {
    if sort.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for (key, dir) in sort {
            let av = a.get_path(key).unwrap_or(&Value::Null);
            let bv = b.get_path(key).unwrap_or(&Value::Null);
            let ord = compare_any(av, bv);
            if ord != Ordering::Equal {
                return if *dir >= 0 { ord } else { ord.reverse() };
            }
        }
        Ordering::Equal
    });
}

/// Apply skip and limit (limit 0 = unlimited)
pub fn apply_skip_limit(docs: Vec<Document>, skip: usize, limit: usize) -> Vec<Document> {
    let mut out: Vec<Document> = docs.into_iter().skip(skip).collect();
    if limit > 0 && out.len() > limit {
        out.truncate(limit);
    }
    out
}

/// Apply a projection. If any field maps to 1 the projection is inclusive
/// (`_id` included unless explicitly 0); otherwise fields mapped to 0 are
/// stripped from a copy of each document. Dotted paths are supported.
pub fn apply_projection(docs: Vec<Document>, projection: &BTreeMap<String, i32>) -> Vec<Document> {
    if projection.is_empty() {
        return docs;
    }

    let include_mode = projection.values().any(|v| *v == 1);

    docs.into_iter()
        .map(|doc| {
            if include_mode {
                let mut out = Document::new();
                for (field, v) in projection {
                    if *v != 1 {
                        continue;
                    }
                    if let Some(value) = doc.get_path(field) {
                        out.set_path(field, value.clone());
                    }
                }
                if projection.get("_id") != Some(&0) {
                    if let Some(id) = doc.get("_id") {
                        out.insert("_id", id.clone());
                    }
                }
                out
            } else {
                let mut out = doc;
                for (field, v) in projection {
                    if *v == 0 {
                        out.unset_path(field);
                    }
                }
                out
            }
        })
        .collect()
}
