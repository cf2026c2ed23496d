//! Field-level diff between two document snapshots.
//!
//! Maps recurse by key. Lists are aligned with Myers' algorithm over the
//! canonical encoding of their elements so that an insertion in the middle
//! of a list reports one new element instead of a shifted tail.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use similar::{capture_diff_slices, Algorithm, DiffOp};

use super::UpdatedField;
use crate::document::{canonical_string, values_equal, Document, ID_FIELD, PATH_SEPARATOR};

#[derive(Clone, Copy)]
enum Side {
    Old,
    New,
}

/// Leaves of `current` that differ from `previous`, keyed by dotted path.
///
/// Without a previous snapshot there is nothing to compare against and the
/// result is empty. The top-level `_id` is never reported.
pub fn updated_fields(
    previous: Option<&Document>,
    current: &Document,
) -> BTreeMap<String, UpdatedField> {
    let mut changes = BTreeMap::new();
    let Some(previous) = previous else {
        return changes;
    };

    let keys: BTreeSet<&String> = previous.keys().chain(current.keys()).collect();
    for key in keys {
        if key == ID_FIELD {
            continue;
        }
        diff_values(key.clone(), previous.get(key), current.get(key), &mut changes);
    }
    changes
}

fn diff_values(
    path: String,
    old: Option<&Value>,
    new: Option<&Value>,
    out: &mut BTreeMap<String, UpdatedField>,
) {
    match (old, new) {
        (None, None) => {}
        (Some(old), Some(new)) if values_equal(old, new) => {}
        (Some(Value::Object(old)), Some(Value::Object(new))) => {
            let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
            for key in keys {
                diff_values(join(&path, key), old.get(key), new.get(key), out);
            }
        }
        (Some(Value::Array(old)), Some(Value::Array(new))) => diff_lists(&path, old, new, out),
        (Some(old), None) => one_sided(path, old, Side::Old, out),
        (None, Some(new)) => one_sided(path, new, Side::New, out),
        (Some(old), Some(new)) => {
            out.insert(path, UpdatedField::new(Some(old.clone()), Some(new.clone())));
        }
    }
}

/// One element-level change, positioned at the index it is reported under.
enum ElementChange<'a> {
    Removed(usize, &'a Value),
    Added(usize, &'a Value),
    Changed(usize, &'a Value, &'a Value),
}

impl ElementChange<'_> {
    fn index(&self) -> usize {
        match self {
            Self::Removed(i, _) | Self::Added(i, _) | Self::Changed(i, _, _) => *i,
        }
    }
}

fn diff_lists(path: &str, old: &[Value], new: &[Value], out: &mut BTreeMap<String, UpdatedField>) {
    let old_keys: Vec<String> = old.iter().map(canonical_string).collect();
    let new_keys: Vec<String> = new.iter().map(canonical_string).collect();

    let mut changes = Vec::new();
    for op in capture_diff_slices(Algorithm::Myers, &old_keys, &new_keys) {
        match op {
            DiffOp::Equal { .. } => {}
            DiffOp::Delete {
                old_index, old_len, ..
            } => {
                for i in old_index..old_index + old_len {
                    changes.push(ElementChange::Removed(i, &old[i]));
                }
            }
            DiffOp::Insert {
                new_index, new_len, ..
            } => {
                for i in new_index..new_index + new_len {
                    changes.push(ElementChange::Added(i, &new[i]));
                }
            }
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => {
                let paired = old_len.min(new_len);
                for i in 0..paired {
                    changes.push(ElementChange::Changed(
                        new_index + i,
                        &old[old_index + i],
                        &new[new_index + i],
                    ));
                }
                for i in old_index + paired..old_index + old_len {
                    changes.push(ElementChange::Removed(i, &old[i]));
                }
                for i in new_index + paired..new_index + new_len {
                    changes.push(ElementChange::Added(i, &new[i]));
                }
            }
        }
    }

    // Removals use old positions and the rest new ones. When two changes
    // land on one index the per-element paths would be ambiguous, so the
    // whole list is reported instead.
    let mut claimed = BTreeSet::new();
    if !changes.iter().all(|change| claimed.insert(change.index())) {
        out.insert(
            path.to_string(),
            UpdatedField::new(
                Some(Value::Array(old.to_vec())),
                Some(Value::Array(new.to_vec())),
            ),
        );
        return;
    }

    for change in changes {
        match change {
            ElementChange::Removed(i, value) => {
                one_sided(join_index(path, i), value, Side::Old, out);
            }
            ElementChange::Added(i, value) => {
                one_sided(join_index(path, i), value, Side::New, out);
            }
            ElementChange::Changed(i, old, new) => {
                diff_values(join_index(path, i), Some(old), Some(new), out);
            }
        }
    }
}

/// Report a value present on one side only, expanded into its leaves.
fn one_sided(path: String, value: &Value, side: Side, out: &mut BTreeMap<String, UpdatedField>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                one_sided(join(&path, key), child, side, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (i, child) in items.iter().enumerate() {
                one_sided(join_index(&path, i), child, side, out);
            }
        }
        leaf => {
            let field = match side {
                Side::Old => UpdatedField::new(Some(leaf.clone()), None),
                Side::New => UpdatedField::new(None, Some(leaf.clone())),
            };
            out.insert(path, field);
        }
    }
}

fn join(prefix: &str, key: &str) -> String {
    format!("{prefix}{PATH_SEPARATOR}{key}")
}

fn join_index(prefix: &str, index: usize) -> String {
    format!("{prefix}{PATH_SEPARATOR}{index}")
}
