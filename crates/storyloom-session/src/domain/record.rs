//! The persisted shape of a session.
//!
//! Only the current world snapshot is stored; undo history does not survive
//! a reload. Records written by older versions may lack any optional field
//! or carry a flat `messages` transcript instead of a tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storyloom_core::clock::Clock;
use storyloom_core::ids::SessionId;
use storyloom_narrative::{ContentTree, LinearTurn, Role, TurnContent};
use storyloom_world_state::{SnapshotHistory, WorldSnapshot};
use tracing::debug;

use super::session::{Session, SessionConfig, SessionFailure};

/// A turn of a flat, pre-tree transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyMessage {
    /// Author.
    pub role: Role,
    /// Turn payload.
    #[serde(flatten)]
    pub content: TurnContent,
    /// Original timestamp, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// One session as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session identifier.
    #[serde(default)]
    pub id: SessionId,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Settings.
    #[serde(default)]
    pub config: SessionConfig,
    /// The content tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree: Option<ContentTree>,
    /// Legacy flat transcript, read only when `tree` is absent.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<LegacyMessage>,
    /// The current world snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world: Option<WorldSnapshot>,
    /// Unresolved failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<SessionFailure>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last mutation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Session> for SessionRecord {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            title: session.title.clone(),
            config: session.config.clone(),
            tree: Some(session.tree.clone()),
            messages: Vec::new(),
            world: session.world.current().cloned(),
            last_error: session.last_error.clone(),
            created_at: Some(session.created_at),
            updated_at: Some(session.updated_at),
        }
    }
}

impl SessionRecord {
    /// Builds the live session. Missing timestamps default to `clock`.
    #[must_use]
    pub fn into_session(self, clock: &dyn Clock) -> Session {
        let now = clock.now();
        let tree = match self.tree {
            Some(tree) => tree,
            None => {
                if !self.messages.is_empty() {
                    debug!(session_id = %self.id, turns = self.messages.len(), "converting legacy transcript");
                }
                legacy_tree(self.messages, now)
            }
        };
        let created_at = self.created_at.unwrap_or(now);
        Session {
            id: self.id,
            title: self.title,
            config: self.config,
            tree,
            world: SnapshotHistory::from_current(self.world),
            last_error: self.last_error,
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
        }
    }
}

/// A single-chain tree with fresh ids built from a flat transcript.
#[must_use]
pub fn legacy_tree(messages: Vec<LegacyMessage>, fallback_time: DateTime<Utc>) -> ContentTree {
    ContentTree::from_linear(messages.into_iter().map(|message| LinearTurn {
        role: message.role,
        content: message.content,
        created_at: message.created_at.unwrap_or(fallback_time),
    }))
}
