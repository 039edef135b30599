//! Content-tree nodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storyloom_core::ids::NodeId;

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A turn written by the user.
    User,
    /// A turn produced by the generator.
    #[serde(alias = "model", alias = "assistant")]
    Agent,
}

/// A choice offered alongside an agent turn.
///
/// Older records store choices either as bare strings or as lettered
/// objects; both decode into this variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Choice {
    /// Free-form text.
    FreeText(String),
    /// A multiple-choice option such as `B) Open the gate`.
    Lettered {
        /// The option letter.
        letter: String,
        /// The option text.
        text: String,
    },
}

impl Choice {
    /// Returns the text the user would submit when picking this choice.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::FreeText(text) | Self::Lettered { text, .. } => text,
        }
    }
}

/// The payload of a turn, without any tree linkage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnContent {
    /// The turn text.
    #[serde(alias = "content")]
    pub text: String,
    /// Suggested follow-up actions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_actions: Vec<String>,
    /// Multiple-choice options.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Choice>,
    /// Structured metadata reported by the generator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl TurnContent {
    /// Plain text with no auxiliary fields.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// A node in the content tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub(crate) id: NodeId,
    #[serde(default)]
    pub(crate) parent_id: Option<NodeId>,
    #[serde(default)]
    pub(crate) children_ids: Vec<NodeId>,
    pub(crate) role: Role,
    pub(crate) created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub(crate) content: TurnContent,
}

impl Node {
    pub(crate) fn new(
        parent_id: Option<NodeId>,
        role: Role,
        content: TurnContent,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NodeId::new(),
            parent_id,
            children_ids: Vec::new(),
            role,
            created_at,
            content,
        }
    }

    /// The node identifier.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The parent node, or `None` for a root.
    #[must_use]
    pub fn parent_id(&self) -> Option<NodeId> {
        self.parent_id
    }

    /// Child ids in the order they were appended.
    #[must_use]
    pub fn children_ids(&self) -> &[NodeId] {
        &self.children_ids
    }

    /// Who authored the turn.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// The turn text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.content.text
    }

    /// The full turn payload.
    #[must_use]
    pub fn content(&self) -> &TurnContent {
        &self.content
    }

    /// When the node was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns `true` if the node has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_decodes_bare_string_as_free_text() {
        let choice: Choice = serde_json::from_str("\"Run for the hills\"").unwrap();
        assert_eq!(choice, Choice::FreeText("Run for the hills".to_owned()));
    }

    #[test]
    fn test_choice_decodes_object_as_lettered() {
        let choice: Choice =
            serde_json::from_value(serde_json::json!({ "letter": "B", "text": "Open the gate" }))
                .unwrap();
        assert_eq!(choice.text(), "Open the gate");
        assert!(matches!(choice, Choice::Lettered { ref letter, .. } if letter == "B"));
    }

    #[test]
    fn test_role_accepts_legacy_model_alias() {
        let role: Role = serde_json::from_str("\"model\"").unwrap();
        assert_eq!(role, Role::Agent);
    }

    #[test]
    fn test_node_decodes_without_optional_fields() {
        let json = serde_json::json!({
            "id": "0190c4a4-3b2e-7c44-9a1d-2f7b1c0d5e6f",
            "role": "user",
            "created_at": "2026-01-15T10:00:00Z",
            "text": "Hello"
        });

        let node: Node = serde_json::from_value(json).unwrap();

        assert!(node.parent_id().is_none());
        assert!(node.children_ids().is_empty());
        assert!(node.content().choices.is_empty());
        assert_eq!(node.text(), "Hello");
    }
}
