//! Queue items.

use serde::{Deserialize, Serialize};
use storyloom_core::generator::{GenerationKind, StructuredContent};
use storyloom_core::ids::TaskId;

/// Lifecycle of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to be processed.
    Queued,
    /// Currently being generated. At most one item is in this state.
    Generating,
    /// Generated successfully.
    Completed,
    /// Generation failed; see the item's error.
    Failed,
}

/// What the item asks the generator to work on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInput {
    /// Human-readable label, e.g. the imported document's title.
    pub title: String,
    /// Request-specific payload forwarded to the generator.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// One queued generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskItem {
    /// Item identifier.
    pub id: TaskId,
    /// What to generate.
    pub kind: GenerationKind,
    /// Caller-defined grouping, e.g. `"reference"` or `"adaptation"`.
    pub category: String,
    /// The input descriptor.
    pub input: TaskInput,
    /// Current status.
    pub status: TaskStatus,
    /// Failure message of the last attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Insertion order.
    pub sequence: u64,
    /// The generated content once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<StructuredContent>,
}

impl TaskItem {
    /// Returns `true` for items in a terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }
}
