//! Update operator evaluator
//!
//! Supported operators: `$set`, `$inc`, `$unset`, `$push`, `$pull`,
//! `$rename`. Unknown operators are an error.

use super::compare_any;
use crate::{Document, Result, Value, VellumError};
use std::cmp::Ordering;

/// Apply update operators to a document in place
pub fn apply_update(doc: &mut Document, update: &Document) -> Result<()> {
    for (op, payload) in update.iter() {
        match op.as_str() {
            "$set" => {
                let fields = object_payload(payload, "$set")?;
                for (path, value) in fields.iter() {
                    doc.set_path(path, value.clone());
                }
            }

            "$inc" => {
                let fields = object_payload(payload, "$inc")?;
                for (path, delta) in fields.iter() {
                    let dv = delta
                        .as_number()
                        .ok_or_else(|| VellumError::Query("$inc value must be a number".into()))?;
                    let current = doc.get_path(path).cloned().unwrap_or(Value::Null);
                    // integer increments on integer fields stay integers
                    let next = match (&current, delta) {
                        (Value::Int(a), Value::Int(b)) => Value::Int(a + b),
                        _ => Value::Float(current.as_number().unwrap_or(0.0) + dv),
                    };
                    doc.set_path(path, next);
                }
            }

            "$unset" => {
                let fields = object_payload(payload, "$unset")?;
                for (path, _) in fields.iter() {
                    doc.unset_path(path);
                }
            }

            "$push" => {
                let fields = object_payload(payload, "$push")?;
                for (path, value) in fields.iter() {
                    match doc.get_path(path) {
                        None | Some(Value::Null) => {
                            doc.set_path(path, Value::Array(vec![value.clone()]));
                        }
                        Some(Value::Array(items)) => {
                            let mut items = items.clone();
                            items.push(value.clone());
                            doc.set_path(path, Value::Array(items));
                        }
                        Some(_) => {
                            return Err(VellumError::Query("$push target must be an array".into()))
                        }
                    }
                }
            }

            "$pull" => {
                let fields = object_payload(payload, "$pull")?;
                for (path, value) in fields.iter() {
                    match doc.get_path(path) {
                        None | Some(Value::Null) => continue,
                        Some(Value::Array(items)) => {
                            let kept: Vec<Value> = items
                                .iter()
                                .filter(|item| compare_any(item, value) != Ordering::Equal)
                                .cloned()
                                .collect();
                            doc.set_path(path, Value::Array(kept));
                        }
                        Some(_) => {
                            return Err(VellumError::Query("$pull target must be an array".into()))
                        }
                    }
                }
            }

            "$rename" => {
                let fields = object_payload(payload, "$rename")?;
                for (from, to) in fields.iter() {
                    let to = to.as_str().ok_or_else(|| {
                        VellumError::Query("$rename value must be a string".into())
                    })?;
                    if let Some(value) = doc.get_path(from).cloned() {
                        doc.unset_path(from);
                        doc.set_path(to, value);
                    }
                }
            }

            other => {
                return Err(VellumError::Query(format!(
                    "unsupported update operator: {}",
                    other
                )))
            }
        }
    }
    Ok(())
}

fn object_payload<'a>(payload: &'a Value, op: &str) -> Result<&'a Document> {
    payload
        .as_object()
        .ok_or_else(|| VellumError::Query(format!("{} must be an object", op)))
}
