//! Commands accepted by the session dispatcher.

use serde::{Deserialize, Serialize};
use storyloom_core::ids::NodeId;
use storyloom_narrative::Direction;
use storyloom_world_state::{WorldEdit, WorldSection};

use super::session::SessionConfig;

/// A user action against one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SessionCommand {
    /// Appends a user turn at the leaf and requests the agent's reply.
    SendMessage {
        /// The user's text.
        text: String,
    },
    /// Edits a turn as a new branch.
    EditNode {
        /// The turn to edit.
        node_id: NodeId,
        /// Replacement text.
        text: String,
    },
    /// Requests a new sibling for an agent turn.
    Regenerate {
        /// The agent turn.
        node_id: NodeId,
    },
    /// Re-issues the request that last failed.
    Retry,
    /// Switches to an adjacent branch.
    NavigateSibling {
        /// The turn whose siblings are navigated.
        node_id: NodeId,
        /// Which way.
        direction: Direction,
    },
    /// Copies the transcript prefix ending at `at_index` into a new session.
    Fork {
        /// Zero-based transcript index.
        at_index: usize,
    },
    /// Generates the whole world or one section of it.
    GenerateWorld {
        /// Section to regenerate; `None` for everything.
        #[serde(default)]
        section: Option<WorldSection>,
        /// Extra instructions for this request.
        #[serde(default)]
        modifiers: Option<String>,
    },
    /// Applies a manual edit to the current world snapshot.
    EditWorld {
        /// The edit.
        edit: WorldEdit,
    },
    /// Steps the world history back.
    UndoWorld,
    /// Steps the world history forward.
    RedoWorld,
    /// Cancels the in-flight request, if any.
    Cancel,
    /// Clears the recorded failure.
    DismissError,
    /// Replaces title and settings.
    UpdateConfig {
        /// New title; unchanged when absent.
        #[serde(default)]
        title: Option<String>,
        /// New settings.
        config: SessionConfig,
    },
}

impl SessionCommand {
    /// Stable name used in logs.
    #[must_use]
    pub fn command_type(&self) -> &'static str {
        match self {
            Self::SendMessage { .. } => "session.send_message",
            Self::EditNode { .. } => "session.edit_node",
            Self::Regenerate { .. } => "session.regenerate",
            Self::Retry => "session.retry",
            Self::NavigateSibling { .. } => "session.navigate_sibling",
            Self::Fork { .. } => "session.fork",
            Self::GenerateWorld { .. } => "session.generate_world",
            Self::EditWorld { .. } => "session.edit_world",
            Self::UndoWorld => "session.undo_world",
            Self::RedoWorld => "session.redo_world",
            Self::Cancel => "session.cancel",
            Self::DismissError => "session.dismiss_error",
            Self::UpdateConfig { .. } => "session.update_config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_decodes_from_tagged_json() {
        let command: SessionCommand = serde_json::from_value(serde_json::json!({
            "command": "generate_world",
            "section": "hierarchy"
        }))
        .unwrap();

        assert_eq!(
            command,
            SessionCommand::GenerateWorld {
                section: Some(WorldSection::Hierarchy),
                modifiers: None,
            }
        );
        assert_eq!(command.command_type(), "session.generate_world");
    }
}
