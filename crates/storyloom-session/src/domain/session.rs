//! The session aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storyloom_core::clock::Clock;
use storyloom_core::generator::GenerationError;
use storyloom_core::ids::{NodeId, SessionId};
use storyloom_narrative::ContentTree;
use storyloom_world_state::{SnapshotHistory, WorldSection};

/// A piece of imported reference material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDocument {
    /// Document title.
    pub title: String,
    /// Document body or its generated summary.
    #[serde(default)]
    pub content: String,
}

/// User-facing settings of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// The world or genre the story is set in.
    #[serde(default)]
    pub setting: String,
    /// Narrative tone, e.g. "grim" or "whimsical".
    #[serde(default)]
    pub tone: String,
    /// Reference material forwarded to every request.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference_material: Vec<ReferenceDocument>,
    /// Free-form instructions layered on every story request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_modifiers: Option<String>,
}

/// The request a failed generation can re-issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum GenerationTarget {
    /// An agent turn appended under `parent_id`, or as a new root.
    StoryTurn {
        /// Parent of the agent turn.
        parent_id: Option<NodeId>,
    },
    /// A world generation; `section == None` regenerates everything.
    World {
        /// The single section to regenerate.
        #[serde(default)]
        section: Option<WorldSection>,
        /// User instructions for this request.
        #[serde(default)]
        modifiers: Option<String>,
    },
}

/// How a failure blocks the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The provider's quota is exhausted; the user must wait before retrying.
    RateLimited,
    /// Network or provider error; dismissible and retryable.
    Transient,
}

/// The last generation failure of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFailure {
    /// Failure class.
    pub kind: FailureKind,
    /// Provider message.
    pub message: String,
    /// What `Retry` re-issues.
    pub retry: GenerationTarget,
}

impl SessionFailure {
    /// Classifies a non-cancellation generator error.
    #[must_use]
    pub fn new(error: &GenerationError, retry: GenerationTarget) -> Self {
        let kind = if error.is_rate_limited() {
            FailureKind::RateLimited
        } else {
            FailureKind::Transient
        };
        Self {
            kind,
            message: error.to_string(),
            retry,
        }
    }
}

/// One interactive story: its branching transcript, world history and
/// settings.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session identifier.
    pub id: SessionId,
    /// Display title.
    pub title: String,
    /// Settings.
    pub config: SessionConfig,
    /// The branching transcript.
    pub tree: ContentTree,
    /// World snapshots with undo/redo.
    pub world: SnapshotHistory,
    /// The most recent unresolved generation failure.
    pub last_error: Option<SessionFailure>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last mutation.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Creates an empty session.
    #[must_use]
    pub fn new(title: impl Into<String>, config: SessionConfig, clock: &dyn Clock) -> Self {
        let now = clock.now();
        Self {
            id: SessionId::new(),
            title: title.into(),
            config,
            tree: ContentTree::new(),
            world: SnapshotHistory::new(),
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A new session continuing from `tree`, sharing this session's
    /// settings and current world snapshot.
    #[must_use]
    pub fn forked(&self, tree: ContentTree, clock: &dyn Clock) -> Self {
        let now = clock.now();
        Self {
            id: SessionId::new(),
            title: format!("{} (fork)", self.title),
            config: self.config.clone(),
            tree,
            world: SnapshotHistory::from_current(self.world.current().cloned()),
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Records a mutation.
    pub fn touch(&mut self, clock: &dyn Clock) {
        self.updated_at = clock.now();
    }
}
