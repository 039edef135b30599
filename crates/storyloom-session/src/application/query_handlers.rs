//! Read-only views of sessions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use storyloom_core::ids::{NodeId, SessionId};
use storyloom_narrative::{Choice, Node, Role};
use storyloom_world_state::WorldSnapshot;

use crate::domain::session::{Session, SessionConfig, SessionFailure};

/// One turn of the active transcript.
#[derive(Debug, Clone, Serialize)]
pub struct TurnView {
    /// Node identifier.
    pub id: NodeId,
    /// Parent node.
    pub parent_id: Option<NodeId>,
    /// Author.
    pub role: Role,
    /// Turn text.
    pub text: String,
    /// Suggested follow-up actions.
    pub suggested_actions: Vec<String>,
    /// Multiple-choice options.
    pub choices: Vec<Choice>,
    /// Zero-based position among siblings.
    pub sibling_index: usize,
    /// Number of siblings including this turn.
    pub sibling_count: usize,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Full read-only view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    /// Session identifier.
    pub id: SessionId,
    /// Display title.
    pub title: String,
    /// Settings.
    pub config: SessionConfig,
    /// Active leaf.
    pub leaf_id: Option<NodeId>,
    /// Turns from root to leaf.
    pub transcript: Vec<TurnView>,
    /// Total nodes across all branches.
    pub node_count: usize,
    /// The world snapshot at the history cursor.
    pub world: Option<WorldSnapshot>,
    /// Number of stored world versions.
    pub world_versions: usize,
    /// Whether world undo is possible.
    pub can_undo: bool,
    /// Whether world redo is possible.
    pub can_redo: bool,
    /// Whether a generation request is in flight.
    pub generating: bool,
    /// Unresolved failure, if any.
    pub last_error: Option<SessionFailure>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// List entry for a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// Session identifier.
    pub id: SessionId,
    /// Display title.
    pub title: String,
    /// Length of the active transcript.
    pub turn_count: usize,
    /// Whether a generation request is in flight.
    pub generating: bool,
    /// Whether a failure awaits retry or dismissal.
    pub has_error: bool,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

fn turn_view(session: &Session, node: &Node) -> TurnView {
    let (sibling_index, sibling_count) = session
        .tree
        .sibling_position(node.id())
        .unwrap_or((0, 1));
    let content = node.content();
    TurnView {
        id: node.id(),
        parent_id: node.parent_id(),
        role: node.role(),
        text: content.text.clone(),
        suggested_actions: content.suggested_actions.clone(),
        choices: content.choices.clone(),
        sibling_index,
        sibling_count,
        created_at: node.created_at(),
    }
}

/// Builds the full view of `session`.
#[must_use]
pub fn session_view(session: &Session, generating: bool) -> SessionView {
    SessionView {
        id: session.id,
        title: session.title.clone(),
        config: session.config.clone(),
        leaf_id: session.tree.leaf_id(),
        transcript: session
            .tree
            .transcript()
            .into_iter()
            .map(|node| turn_view(session, node))
            .collect(),
        node_count: session.tree.len(),
        world: session.world.current().cloned(),
        world_versions: session.world.len(),
        can_undo: session.world.can_undo(),
        can_redo: session.world.can_redo(),
        generating,
        last_error: session.last_error.clone(),
        created_at: session.created_at,
        updated_at: session.updated_at,
    }
}

/// Builds the list entry for `session`.
#[must_use]
pub fn session_summary(session: &Session, generating: bool) -> SessionSummary {
    SessionSummary {
        id: session.id,
        title: session.title.clone(),
        turn_count: session.tree.transcript().len(),
        generating,
        has_error: session.last_error.is_some(),
        updated_at: session.updated_at,
    }
}
