//! The branching content tree.
//!
//! Nodes live in an arena keyed by [`NodeId`]; links are validated ids, so
//! a cycle cannot be introduced by any operation here. The only "current
//! conversation" is the path from `leaf_id` back to its root.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storyloom_core::clock::Clock;
use storyloom_core::error::DomainError;
use storyloom_core::ids::NodeId;
use tracing::{debug, warn};

use super::invariants::{self, InvariantViolation};
use super::node::{Node, Role, TurnContent};

/// Where a new node is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Under the current leaf, or as a root if the tree is empty.
    Leaf,
    /// Under a specific node.
    Under(NodeId),
    /// As a new root.
    Root,
}

impl Placement {
    /// Placement under `parent`, or as a root when `parent` is `None`.
    #[must_use]
    pub fn from_parent(parent: Option<NodeId>) -> Self {
        parent.map_or(Self::Root, Self::Under)
    }
}

/// Sibling navigation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The previous sibling.
    Prev,
    /// The next sibling.
    Next,
}

/// An optimistically inserted user turn that may need rolling back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTurn {
    /// The speculative node.
    pub node_id: NodeId,
    /// The leaf before the node was inserted.
    pub previous_leaf: Option<NodeId>,
}

/// Result of [`ContentTree::edit_as_branch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// An agent turn was cloned with new text; the clone is the new leaf.
    Branched(NodeId),
    /// A user turn was re-issued; the caller must request a generation for it.
    Resubmitted(PendingTurn),
}

/// What the caller needs to request a replacement agent turn.
#[derive(Debug, Clone, PartialEq)]
pub struct RegenerationPlan {
    /// Parent of the node being regenerated.
    pub parent_id: Option<NodeId>,
    /// `history_path(parent_id)`, root first.
    pub context: Vec<Node>,
}

impl RegenerationPlan {
    /// Where the regenerated turn should be attached.
    #[must_use]
    pub fn placement(&self) -> Placement {
        Placement::from_parent(self.parent_id)
    }
}

/// One entry of a flat, pre-tree transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearTurn {
    /// Who authored the turn.
    pub role: Role,
    /// The turn payload.
    pub content: TurnContent,
    /// Original creation time.
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawContentTree {
    #[serde(default)]
    nodes: BTreeMap<NodeId, Node>,
    #[serde(default)]
    root_ids: Vec<NodeId>,
    #[serde(default)]
    leaf_id: Option<NodeId>,
}

impl TryFrom<RawContentTree> for ContentTree {
    type Error = InvariantViolation;

    fn try_from(raw: RawContentTree) -> Result<Self, Self::Error> {
        let mut root_ids = raw.root_ids;
        if root_ids.is_empty() {
            // Records written before roots were tracked.
            root_ids = raw
                .nodes
                .values()
                .filter(|n| n.parent_id.is_none())
                .map(|n| n.id)
                .collect();
        }
        let tree = Self {
            nodes: raw.nodes,
            root_ids,
            leaf_id: raw.leaf_id,
        };
        tree.check_invariants()?;
        Ok(tree)
    }
}

/// Arena of turns plus the active leaf pointer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawContentTree")]
pub struct ContentTree {
    nodes: BTreeMap<NodeId, Node>,
    root_ids: Vec<NodeId>,
    leaf_id: Option<NodeId>,
}

impl ContentTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a single-chain tree from a flat transcript, each turn parented
    /// to the previous one. Every node gets a fresh id.
    #[must_use]
    pub fn from_linear(turns: impl IntoIterator<Item = LinearTurn>) -> Self {
        let mut tree = Self::new();
        for turn in turns {
            let node = Node::new(tree.leaf_id, turn.role, turn.content, turn.created_at);
            tree.insert(node, Placement::Leaf);
        }
        tree
    }

    /// The active leaf.
    #[must_use]
    pub fn leaf_id(&self) -> Option<NodeId> {
        self.leaf_id
    }

    /// Looks up a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Root ids in creation order.
    #[must_use]
    pub fn root_ids(&self) -> &[NodeId] {
        &self.root_ids
    }

    /// Number of nodes in the arena.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the tree has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates every node in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Appends a user turn and makes it the leaf.
    pub fn append_user(
        &mut self,
        placement: Placement,
        text: impl Into<String>,
        clock: &dyn Clock,
    ) -> NodeId {
        self.append(placement, Role::User, TurnContent::text(text), clock)
    }

    /// Appends an agent turn and makes it the leaf.
    pub fn append_agent(
        &mut self,
        placement: Placement,
        content: TurnContent,
        clock: &dyn Clock,
    ) -> NodeId {
        self.append(placement, Role::Agent, content, clock)
    }

    /// Appends a user turn that may later be rolled back with
    /// [`ContentTree::rollback`].
    pub fn begin_user_turn(
        &mut self,
        placement: Placement,
        text: impl Into<String>,
        clock: &dyn Clock,
    ) -> PendingTurn {
        let previous_leaf = self.leaf_id;
        let node_id = self.append_user(placement, text, clock);
        PendingTurn {
            node_id,
            previous_leaf,
        }
    }

    /// Removes a speculative node and restores the previous leaf.
    ///
    /// Returns `false` (and leaves the tree untouched) if the node is gone
    /// or has since gained children.
    pub fn rollback(&mut self, pending: &PendingTurn) -> bool {
        let Some(node) = self.nodes.get(&pending.node_id) else {
            debug!(node_id = %pending.node_id, "rollback skipped: node already absent");
            return false;
        };
        if !node.is_leaf() {
            warn!(node_id = %pending.node_id, "rollback refused: speculative node has children");
            return false;
        }
        let parent_id = node.parent_id;
        self.nodes.remove(&pending.node_id);
        match parent_id.and_then(|id| self.nodes.get_mut(&id)) {
            Some(parent) => parent.children_ids.retain(|id| *id != pending.node_id),
            None => self.root_ids.retain(|id| *id != pending.node_id),
        }
        if self.leaf_id == Some(pending.node_id) {
            self.leaf_id = pending
                .previous_leaf
                .filter(|id| self.nodes.contains_key(id));
        }
        debug!(node_id = %pending.node_id, "rolled back speculative turn");
        true
    }

    /// Walks parent links from `leaf_id` to its root and returns the path
    /// root first. Unknown ids yield an empty path.
    #[must_use]
    pub fn history_path(&self, leaf_id: NodeId) -> Vec<&Node> {
        let mut path = Vec::new();
        let mut cursor = self.nodes.get(&leaf_id);
        while let Some(node) = cursor {
            if path.len() > self.nodes.len() {
                // Unreachable for trees built through this API.
                warn!(%leaf_id, "history path exceeded arena size; truncating");
                break;
            }
            path.push(node);
            cursor = node.parent_id.and_then(|id| self.nodes.get(&id));
        }
        path.reverse();
        path
    }

    /// The linear transcript ending at the active leaf.
    #[must_use]
    pub fn transcript(&self) -> Vec<&Node> {
        self.leaf_id
            .map(|leaf| self.history_path(leaf))
            .unwrap_or_default()
    }

    /// Edits a node as a new branch.
    ///
    /// Agent turns are cloned with `new_text` under the same parent and the
    /// clone becomes the leaf. User turns are re-issued as a new speculative
    /// user turn under the same parent, which the caller answers with a
    /// generation request. The original node and its descendants stay
    /// reachable by sibling navigation.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NodeNotFound` if `node_id` is unknown.
    pub fn edit_as_branch(
        &mut self,
        node_id: NodeId,
        new_text: impl Into<String>,
        clock: &dyn Clock,
    ) -> Result<EditOutcome, DomainError> {
        let node = self
            .nodes
            .get(&node_id)
            .ok_or(DomainError::NodeNotFound(node_id))?;
        let placement = Placement::from_parent(node.parent_id);
        match node.role {
            Role::Agent => {
                let content = TurnContent {
                    text: new_text.into(),
                    ..node.content.clone()
                };
                let id = self.append(placement, Role::Agent, content, clock);
                Ok(EditOutcome::Branched(id))
            }
            Role::User => Ok(EditOutcome::Resubmitted(
                self.begin_user_turn(placement, new_text, clock),
            )),
        }
    }

    /// Prepares regeneration of an agent turn as a new sibling.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NodeNotFound` for unknown ids and
    /// `DomainError::Validation` if the node is not an agent turn.
    pub fn regenerate(&self, node_id: NodeId) -> Result<RegenerationPlan, DomainError> {
        let node = self
            .nodes
            .get(&node_id)
            .ok_or(DomainError::NodeNotFound(node_id))?;
        if node.role != Role::Agent {
            return Err(DomainError::Validation(format!(
                "only agent turns can be regenerated; {node_id} is a user turn"
            )));
        }
        let context = node
            .parent_id
            .map(|parent| self.history_path(parent).into_iter().cloned().collect())
            .unwrap_or_default();
        Ok(RegenerationPlan {
            parent_id: node.parent_id,
            context,
        })
    }

    /// Position of a node among its siblings as `(index, count)`.
    #[must_use]
    pub fn sibling_position(&self, node_id: NodeId) -> Option<(usize, usize)> {
        let siblings = self.siblings_of(node_id)?;
        let index = siblings.iter().position(|id| *id == node_id)?;
        Some((index, siblings.len()))
    }

    /// Moves to the adjacent sibling of `node_id` and then down that branch
    /// to its most recently appended descendant, which becomes the leaf.
    ///
    /// Navigation is clamped: at either end the leaf is left unchanged and
    /// `None` is returned.
    pub fn sibling_navigate(&mut self, node_id: NodeId, direction: Direction) -> Option<NodeId> {
        let siblings = self.siblings_of(node_id)?;
        let index = siblings.iter().position(|id| *id == node_id)?;
        let target = match direction {
            Direction::Prev => index.checked_sub(1),
            Direction::Next => Some(index + 1).filter(|i| *i < siblings.len()),
        };
        let Some(target) = target else {
            debug!(%node_id, ?direction, "sibling navigation clamped at boundary");
            return None;
        };
        let leaf = self.deepest_latest_descendant(siblings[target]);
        self.leaf_id = Some(leaf);
        Some(leaf)
    }

    /// Copies the first `at_index + 1` turns of the active transcript into a
    /// new, independent single-chain tree with fresh ids.
    ///
    /// Returns `None` if the transcript is shorter than `at_index + 1`.
    #[must_use]
    pub fn fork(&self, at_index: usize) -> Option<ContentTree> {
        self.fork_from(self.leaf_id, at_index)
    }

    /// Like [`ContentTree::fork`], but copies the path ending at `leaf`
    /// instead of the active one. Used to leave a speculative turn out of
    /// the copy.
    #[must_use]
    pub fn fork_from(&self, leaf: Option<NodeId>, at_index: usize) -> Option<ContentTree> {
        let path = leaf.map(|leaf| self.history_path(leaf)).unwrap_or_default();
        if at_index >= path.len() {
            return None;
        }
        let turns = path[..=at_index].iter().map(|node| LinearTurn {
            role: node.role,
            content: node.content.clone(),
            created_at: node.created_at,
        });
        Some(Self::from_linear(turns))
    }

    /// Verifies referential symmetry, root bookkeeping, the leaf pointer
    /// and acyclicity.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        invariants::check(&self.nodes, &self.root_ids, self.leaf_id)
    }

    fn append(
        &mut self,
        placement: Placement,
        role: Role,
        content: TurnContent,
        clock: &dyn Clock,
    ) -> NodeId {
        let node = Node::new(None, role, content, clock.now());
        self.insert(node, placement)
    }

    fn insert(&mut self, mut node: Node, placement: Placement) -> NodeId {
        let parent_id = match placement {
            Placement::Leaf => self.leaf_id,
            Placement::Under(id) if self.nodes.contains_key(&id) => Some(id),
            Placement::Under(id) => {
                warn!(parent_id = %id, "unknown parent; attaching turn as a new root");
                None
            }
            Placement::Root => None,
        };
        node.parent_id = parent_id;
        let id = node.id;
        match parent_id.and_then(|pid| self.nodes.get_mut(&pid)) {
            Some(parent) => parent.children_ids.push(id),
            None => self.root_ids.push(id),
        }
        self.nodes.insert(id, node);
        self.leaf_id = Some(id);
        id
    }

    fn siblings_of(&self, node_id: NodeId) -> Option<&[NodeId]> {
        let node = self.nodes.get(&node_id)?;
        match node.parent_id {
            Some(parent) => self.nodes.get(&parent).map(|p| p.children_ids.as_slice()),
            None => Some(self.root_ids.as_slice()),
        }
    }

    fn deepest_latest_descendant(&self, start: NodeId) -> NodeId {
        let mut seen = HashSet::new();
        let mut current = start;
        while let Some(&last) = self.nodes.get(&current).and_then(|n| n.children_ids.last()) {
            if !seen.insert(last) {
                break;
            }
            current = last;
        }
        current
    }
}
