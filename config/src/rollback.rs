//! Rollback journal - reversible mutations against the staged tree.
//!
//! Every mutation the update engine makes appends its reversal here;
//! replaying the journal in LIFO order restores the staged tree to its
//! exact pre-update content.

use serde_json::Value;
use tracing::warn;

use crate::node::ConfigNode;
use crate::paths;

/// One reversible mutation.
#[derive(Debug, Clone)]
pub enum RollbackOp {
    /// Re-assign a node's prior serialized value.
    Restore { path: String, prior: Value },
    /// Remove a mapping entry that the update created.
    RemoveEntry { path: String, key: String },
    /// Shrink a sequence back to its pre-update length.
    Truncate { path: String, len: usize },
    /// Empty an optional slot that the update allocated.
    ClearSlot { path: String },
}

impl RollbackOp {
    fn path(&self) -> &str {
        match self {
            RollbackOp::Restore { path, .. }
            | RollbackOp::RemoveEntry { path, .. }
            | RollbackOp::Truncate { path, .. }
            | RollbackOp::ClearSlot { path } => path,
        }
    }
}

/// Ordered list of reversals for one in-flight update.
#[derive(Debug, Default)]
pub struct RollbackJournal {
    ops: Vec<RollbackOp>,
}

impl RollbackJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, op: RollbackOp) {
        self.ops.push(op);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Undo every recorded mutation, most recent first.
    ///
    /// `root` must be the same tree the ops were recorded against. Every
    /// op re-applies a value the tree itself produced, so individual
    /// failures are impossible in normal operation; they are logged and
    /// skipped rather than propagated.
    pub fn replay(self, root: &mut dyn ConfigNode) {
        for op in self.ops.into_iter().rev() {
            let Some(node) = node_at(root, op.path()) else {
                warn!(path = op.path(), "rollback target vanished");
                continue;
            };
            match op {
                RollbackOp::Restore { ref path, ref prior } => {
                    if let Err(err) = node.assign(prior, path) {
                        warn!(path, error = %err, "rollback restore failed");
                    }
                }
                RollbackOp::RemoveEntry { ref key, .. } => node.remove_entry(key),
                RollbackOp::Truncate { len, .. } => node.truncate_to(len),
                RollbackOp::ClearSlot { .. } => node.clear_slot(),
            }
        }
    }
}

/// Navigate from the root to the node at `path`.
///
/// The first segment is the root's own name and is skipped.
fn node_at<'a>(root: &'a mut dyn ConfigNode, path: &str) -> Option<&'a mut dyn ConfigNode> {
    let mut node = root;
    for segment in paths::segments(path).skip(1) {
        node = node.lookup(segment)?;
    }
    Some(node)
}
