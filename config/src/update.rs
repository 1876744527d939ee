//! The traversal/update engine.
//!
//! `flatten` turns a typed config into its canonical dotted form;
//! `expand` turns a flat dotted-key input into a nested tree; and
//! `apply_node` walks the nested tree and the typed tree in lockstep,
//! journaling reversals, collecting the change set and staging
//! validation plus change notifications on the way back up.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::node::{Config, ConfigNode};
use crate::paths;
use crate::queue::EventQueue;
use crate::rollback::{RollbackJournal, RollbackOp};

/// Flatten a config into `dotted_key → leaf value` pairs, prefixed with
/// the config's name.
///
/// The result is canonical: mappings are emitted in key-sorted order, so
/// two structurally equal configs flatten identically.
pub fn flatten<C: Config>(config: &C) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    config.flatten_into(config.name(), &mut out);
    out
}

/// Expand a flat dotted-key map into a nested tree.
///
/// Structured right-hand sides are normalized into the same nested form
/// (arrays become `{"0": ..}` objects and merge index-wise) and spliced;
/// a key that addresses a scalar where another key demands a subtree is
/// a [`ConfigError::KeyConflict`].
pub fn expand(data: &BTreeMap<String, Value>) -> Result<Map<String, Value>, ConfigError> {
    let mut root = Map::new();
    for (dotted, value) in data {
        insert_dotted(&mut root, dotted, normalize(value))?;
    }
    Ok(root)
}

/// Normalize a runtime value into nested-map form: arrays become objects
/// keyed by decimal index so they merge element-wise like any other
/// subtree.
fn normalize(value: &Value) -> Value {
    match value {
        Value::Array(items) => {
            let mut object = Map::new();
            for (index, item) in items.iter().enumerate() {
                object.insert(index.to_string(), normalize(item));
            }
            Value::Object(object)
        }
        Value::Object(entries) => {
            let mut object = Map::new();
            for (key, item) in entries {
                object.insert(key.clone(), normalize(item));
            }
            Value::Object(object)
        }
        other => other.clone(),
    }
}

fn insert_dotted(
    root: &mut Map<String, Value>,
    dotted: &str,
    value: Value,
) -> Result<(), ConfigError> {
    let mut segments: Vec<&str> = paths::segments(dotted).collect();
    let Some(last) = segments.pop() else {
        return Err(ConfigError::InvalidData);
    };

    let mut cursor = root;
    let mut walked = String::new();
    for segment in segments {
        walked = paths::join(&walked, segment);
        let entry = cursor
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        cursor = entry.as_object_mut().ok_or_else(|| ConfigError::KeyConflict {
            first: walked.clone(),
            second: dotted.to_string(),
        })?;
    }

    let full = paths::join(&walked, last);
    match cursor.entry(last.to_string()) {
        serde_json::map::Entry::Vacant(slot) => {
            slot.insert(value);
            Ok(())
        }
        serde_json::map::Entry::Occupied(mut slot) => merge(slot.get_mut(), value, &full, dotted),
    }
}

/// Merge a normalized value into an existing node of the expanded tree.
///
/// `dotted` is the input key being inserted, for conflict reporting.
fn merge(
    existing: &mut Value,
    incoming: Value,
    path: &str,
    dotted: &str,
) -> Result<(), ConfigError> {
    match (&mut *existing, incoming) {
        (Value::Object(dst), Value::Object(src)) => {
            for (key, value) in src {
                let child_path = paths::join(path, &key);
                match dst.entry(key) {
                    serde_json::map::Entry::Vacant(slot) => {
                        slot.insert(value);
                    }
                    serde_json::map::Entry::Occupied(mut slot) => {
                        merge(slot.get_mut(), value, &child_path, dotted)?;
                    }
                }
            }
            Ok(())
        }
        (Value::Object(_), _) | (_, Value::Object(_)) => {
            // One side is a subtree, the other a scalar.
            Err(ConfigError::KeyConflict {
                first: path.to_string(),
                second: dotted.to_string(),
            })
        }
        (slot, value) => {
            // Same leaf named twice through a structured value; the later
            // input wins, matching plain map splicing.
            *slot = value;
            Ok(())
        }
    }
}

/// Per-update traversal state.
pub(crate) struct UpdateContext<'a> {
    pub journal: &'a mut RollbackJournal,
    pub changes: &'a mut BTreeMap<String, Value>,
    pub queue: &'a mut EventQueue,
    pub validate: bool,
}

/// Walk the typed tree and the expanded data tree in lockstep.
///
/// Object data descends; anything else replaces the node wholesale. On
/// the way back up each touched node is validated (when enabled) and its
/// change notification staged, so deeper subtrees are checked and
/// announced before their ancestors.
pub(crate) fn apply_node(
    node: &mut dyn ConfigNode,
    data: &Value,
    path: &str,
    ctx: &mut UpdateContext<'_>,
) -> Result<(), ConfigError> {
    match data.as_object() {
        Some(entries) if !node.is_leaf() => {
            for (segment, child) in entries {
                let child_path = paths::join(path, segment);
                let child_node = node.enter(segment, &child_path, ctx.journal)?;
                apply_node(child_node, child, &child_path, ctx)?;
            }
        }
        _ => {
            // A leaf in the data, or a leaf in the tree (raw blobs take
            // structured payloads wholesale).
            let prior = node.to_value();
            node.assign(data, path)?;
            ctx.journal.record(RollbackOp::Restore {
                path: path.to_string(),
                prior,
            });
            ctx.changes.insert(path.to_string(), data.clone());
        }
    }

    if ctx.validate {
        node.validate_node()
            .map_err(|source| ConfigError::Validation {
                path: path.to_string(),
                source,
            })?;
    }
    if let (Some(topic), Some(payload)) = (node.topic(), node.payload()) {
        ctx.queue.add(topic, payload);
    }

    Ok(())
}
