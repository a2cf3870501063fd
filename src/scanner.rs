//! Structural search over nested template values.
//!
//! Both operations walk a [`Value`] depth-first. At each level the leaves
//! are tested before any nested composite is descended into, so a match that
//! sits directly in a mapping is found before one buried deeper in a sibling.

use crate::types::{Scalar, Value};

/// Whether `target` occurs as a leaf anywhere inside `structure`.
///
/// Returns on the first match. Cost is linear in the size of `structure`.
///
/// ```rust
/// use cloudcap::scanner::exists;
/// use cloudcap::types::{Scalar, Value};
/// use serde_json::json;
///
/// let props = Value::from(json!({"Environment": {"Queue": ["MyQueue", "Arn"]}}));
/// assert!(exists(&props, &Scalar::from("MyQueue")));
/// assert!(!exists(&props, &Scalar::from("Other")));
/// ```
#[must_use]
pub fn exists(structure: &Value, target: &Scalar) -> bool {
    match structure {
        Value::Scalar(leaf) => leaf == target,
        Value::Sequence(items) => level_contains(items.iter(), target),
        Value::Mapping(map) => level_contains(map.values(), target),
    }
}

fn level_contains<'a, I>(children: I, target: &Scalar) -> bool
where
    I: Iterator<Item = &'a Value> + Clone,
{
    let leaf_hit = children
        .clone()
        .any(|child| matches!(child, Value::Scalar(leaf) if leaf == target));
    if leaf_hit {
        return true;
    }
    children
        .filter(|child| !matches!(child, Value::Scalar(_)))
        .any(|child| exists(child, target))
}

/// Collect every sub-value of `structure` accepted by `predicate`.
///
/// Uses the same traversal order as [`exists`]. A composite accepted by the
/// predicate is collected whole and not descended into.
pub fn collect<'a, F>(structure: &'a Value, predicate: F) -> Vec<&'a Value>
where
    F: Fn(&Value) -> bool,
{
    let mut found = Vec::new();
    collect_into(structure, &predicate, &mut found);
    found
}

fn collect_into<'a, F>(value: &'a Value, predicate: &F, found: &mut Vec<&'a Value>)
where
    F: Fn(&Value) -> bool,
{
    if predicate(value) {
        found.push(value);
        return;
    }
    let children: Vec<&'a Value> = match value {
        Value::Scalar(_) => return,
        Value::Sequence(items) => items.iter().collect(),
        Value::Mapping(map) => map.values().collect(),
    };
    for leaf in children.iter().filter(|c| matches!(c, Value::Scalar(_))) {
        if predicate(leaf) {
            found.push(leaf);
        }
    }
    for composite in children.into_iter().filter(|c| !matches!(c, Value::Scalar(_))) {
        collect_into(composite, predicate, found);
    }
}
