//! Structural checks for the content-tree arena.

use std::collections::{BTreeMap, HashSet};

use storyloom_core::ids::NodeId;
use thiserror::Error;

use super::node::Node;

/// A broken structural invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// A node is stored under a key that differs from its id.
    #[error("node {node} stored under key {key}")]
    KeyMismatch {
        /// The arena key.
        key: NodeId,
        /// The node's own id.
        node: NodeId,
    },

    /// A node references a parent that does not exist.
    #[error("node {node} references missing parent {parent}")]
    MissingParent {
        /// The child.
        node: NodeId,
        /// The missing parent.
        parent: NodeId,
    },

    /// Parent and child do not agree about their link.
    #[error("link between parent {parent} and child {child} is not symmetric")]
    AsymmetricLink {
        /// The parent side.
        parent: NodeId,
        /// The child side.
        child: NodeId,
    },

    /// A child id appears twice in one children list.
    #[error("node {parent} lists child {child} more than once")]
    DuplicateChild {
        /// The parent.
        parent: NodeId,
        /// The duplicated child.
        child: NodeId,
    },

    /// The root list and the set of parentless nodes disagree.
    #[error("root bookkeeping is inconsistent for node {0}")]
    RootMismatch(NodeId),

    /// The leaf pointer names a node that is not in the arena.
    #[error("leaf {0} is not present in the tree")]
    DanglingLeaf(NodeId),

    /// Some nodes cannot be reached from any root.
    #[error("{0} node(s) unreachable from any root (cycle)")]
    Unreachable(usize),
}

pub(crate) fn check(
    nodes: &BTreeMap<NodeId, Node>,
    root_ids: &[NodeId],
    leaf_id: Option<NodeId>,
) -> Result<(), InvariantViolation> {
    for (key, node) in nodes {
        if *key != node.id {
            return Err(InvariantViolation::KeyMismatch {
                key: *key,
                node: node.id,
            });
        }
        if let Some(parent_id) = node.parent_id {
            let parent = nodes.get(&parent_id).ok_or(InvariantViolation::MissingParent {
                node: node.id,
                parent: parent_id,
            })?;
            if !parent.children_ids.contains(&node.id) {
                return Err(InvariantViolation::AsymmetricLink {
                    parent: parent_id,
                    child: node.id,
                });
            }
        } else if !root_ids.contains(&node.id) {
            return Err(InvariantViolation::RootMismatch(node.id));
        }
        let mut seen = HashSet::with_capacity(node.children_ids.len());
        for child_id in &node.children_ids {
            if !seen.insert(*child_id) {
                return Err(InvariantViolation::DuplicateChild {
                    parent: node.id,
                    child: *child_id,
                });
            }
            if nodes.get(child_id).and_then(|c| c.parent_id) != Some(node.id) {
                return Err(InvariantViolation::AsymmetricLink {
                    parent: node.id,
                    child: *child_id,
                });
            }
        }
    }

    let mut listed = HashSet::with_capacity(root_ids.len());
    for root_id in root_ids {
        let is_root = nodes.get(root_id).is_some_and(|n| n.parent_id.is_none());
        if !is_root || !listed.insert(*root_id) {
            return Err(InvariantViolation::RootMismatch(*root_id));
        }
    }

    if let Some(leaf) = leaf_id {
        if !nodes.contains_key(&leaf) {
            return Err(InvariantViolation::DanglingLeaf(leaf));
        }
    }

    // With symmetric links every node has exactly one parent, so anything
    // not reachable from a root sits on a cycle.
    let mut reached = 0usize;
    let mut stack: Vec<NodeId> = root_ids.to_vec();
    while let Some(id) = stack.pop() {
        reached += 1;
        if let Some(node) = nodes.get(&id) {
            stack.extend(node.children_ids.iter().copied());
        }
    }
    if reached != nodes.len() {
        return Err(InvariantViolation::Unreachable(
            nodes.len().abs_diff(reached),
        ));
    }

    Ok(())
}
