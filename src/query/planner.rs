//! Query planner: route a filter through an index when one applies
//!
//! Planner order: a range clause served by a ready B-tree index wins,
//! then the ready hash index whose field set is fully covered by bare
//! equality clauses (most fields first). Anything else falls back to a
//! full scan. Returned ids are candidates only: the caller re-applies the
//! complete filter.

use crate::index::{compound_key, index_name, Index, IndexKind, IndexSet, IndexStatus};
use crate::{Document, Value};

/// Candidate document ids for a filter, or `None` when no index applies
pub fn candidate_ids(indexes: &IndexSet, filter: &Document) -> Option<Vec<String>> {
    // 1) Range via B-tree
    for (field, want) in filter.iter() {
        if field.starts_with('$') {
            continue;
        }
        let ops = match want {
            Value::Object(ops) if has_range_op(ops) => ops,
            _ => continue,
        };

        let name = index_name(IndexKind::Btree, std::slice::from_ref(field));
        let btree = match indexes.ready(&name) {
            Some(Index::BTree(idx)) => idx,
            _ => continue,
        };

        let mut lower = None;
        let mut upper = None;
        if let Some(v) = ops.get("$gt") {
            lower = Some((btree.key_or_zero(v), false));
        }
        if let Some(v) = ops.get("$gte") {
            lower = Some((btree.key_or_zero(v), true));
        }
        if let Some(v) = ops.get("$lt") {
            upper = Some((btree.key_or_zero(v), false));
        }
        if let Some(v) = ops.get("$lte") {
            upper = Some((btree.key_or_zero(v), true));
        }

        return Some(btree.range(lower, upper));
    }

    // 2) Equality via the widest covered hash index
    let mut best: Option<&crate::index::IndexMeta> = None;
    for meta in indexes.metas() {
        if meta.kind != IndexKind::Hash || meta.status != IndexStatus::Ready {
            continue;
        }
        let covered = meta.fields.iter().all(|f| {
            matches!(filter.get(f), Some(v) if !matches!(v, Value::Object(_)))
        });
        if covered && meta.fields.len() > best.map(|b| b.fields.len()).unwrap_or(0) {
            best = Some(meta);
        }
    }

    if let Some(meta) = best {
        if let Some(Index::Hash(idx)) = indexes.ready(&meta.name) {
            let key = compound_key(filter, &meta.fields);
            return Some(idx.lookup(&key));
        }
    }

    None
}

fn has_range_op(ops: &Document) -> bool {
    ["$gt", "$gte", "$lt", "$lte"]
        .iter()
        .any(|op| ops.contains_key(op))
}
