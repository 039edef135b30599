//! Pure queue state machine.
//!
//! All transitions are synchronous; the async processor only decides when
//! to call them.

use serde::{Deserialize, Serialize};
use storyloom_core::error::DomainError;
use storyloom_core::generator::{GenerationError, GenerationKind, StructuredContent};
use storyloom_core::ids::TaskId;
use tracing::{debug, info, warn};

use super::item::{TaskInput, TaskItem, TaskStatus};

/// Why the queue stopped advancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    /// The user paused the queue.
    User,
    /// The provider reported a rate limit; only an explicit resume restarts.
    RateLimited,
}

/// Whether the processor picks up queued items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum QueueMode {
    /// Items are processed automatically.
    Running,
    /// Processing is halted.
    Paused(PauseReason),
}

/// Immutable view of the queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueSnapshot {
    /// Items in list order.
    pub items: Vec<TaskItem>,
    /// Current mode.
    pub mode: QueueMode,
}

/// Items plus run mode.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueState {
    items: Vec<TaskItem>,
    mode: QueueMode,
    next_sequence: u64,
    carried_context: Option<serde_json::Value>,
}

impl Default for QueueState {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            mode: QueueMode::Running,
            next_sequence: 0,
            carried_context: None,
        }
    }
}

impl QueueState {
    /// Creates an empty, running queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a queued item.
    pub fn enqueue(&mut self, kind: GenerationKind, category: &str, input: TaskInput) -> TaskId {
        let id = TaskId::new();
        self.next_sequence += 1;
        self.items.push(TaskItem {
            id,
            kind,
            category: category.to_owned(),
            input,
            status: TaskStatus::Queued,
            error: None,
            sequence: self.next_sequence,
            result: None,
        });
        debug!(task_id = %id, category, "task enqueued");
        id
    }

    /// Marks the first queued item as generating and returns it.
    ///
    /// Returns `None` when paused, when nothing is queued, or when another
    /// item is already generating.
    pub fn start_next(&mut self) -> Option<&TaskItem> {
        if self.mode != QueueMode::Running || self.generating().is_some() {
            return None;
        }
        let item = self
            .items
            .iter_mut()
            .find(|item| item.status == TaskStatus::Queued)?;
        item.status = TaskStatus::Generating;
        item.error = None;
        Some(item)
    }

    /// Marks a generating item completed. Returns `false` if the item is
    /// gone or no longer generating.
    pub fn complete(&mut self, id: TaskId, content: StructuredContent) -> bool {
        let detected = content
            .str_field("detected_context")
            .map(|context| serde_json::Value::String(context.to_owned()));
        let Some(item) = self.generating_item_mut(id) else {
            return false;
        };
        item.status = TaskStatus::Completed;
        item.result = Some(content);
        if detected.is_some() {
            self.carried_context = detected;
        }
        info!(task_id = %id, "task completed");
        true
    }

    /// Marks a generating item failed. A rate-limit error also pauses the
    /// queue.
    pub fn fail(&mut self, id: TaskId, error: &GenerationError) -> bool {
        let Some(item) = self.generating_item_mut(id) else {
            return false;
        };
        item.status = TaskStatus::Failed;
        item.error = Some(error.to_string());
        warn!(task_id = %id, %error, "task failed");
        if error.is_rate_limited() {
            self.pause_for_rate_limit();
        }
        true
    }

    /// Returns a generating item to the queue after its request was
    /// cancelled without removing it.
    pub fn requeue(&mut self, id: TaskId) -> bool {
        let Some(item) = self.generating_item_mut(id) else {
            return false;
        };
        item.status = TaskStatus::Queued;
        true
    }

    /// Resets a failed item to queued. Resumes a queue the user paused, but
    /// not one paused by a rate limit.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::TaskNotFound` for unknown ids and
    /// `DomainError::Validation` if the item has not failed.
    pub fn retry(&mut self, id: TaskId) -> Result<(), DomainError> {
        let item = self
            .items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(DomainError::TaskNotFound(id))?;
        if item.status != TaskStatus::Failed {
            return Err(DomainError::Validation(format!(
                "only failed tasks can be retried; {id} is {:?}",
                item.status
            )));
        }
        item.status = TaskStatus::Queued;
        item.error = None;
        if self.mode == QueueMode::Paused(PauseReason::User) {
            self.mode = QueueMode::Running;
        }
        Ok(())
    }

    /// Deletes an item.
    pub fn remove(&mut self, id: TaskId) -> Option<TaskItem> {
        let index = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(index))
    }

    /// Moves `dragged` to `target`'s position. Both items must be queued.
    pub fn reorder(&mut self, dragged: TaskId, target: TaskId) -> bool {
        let queued_index = |id: TaskId| {
            self.items
                .iter()
                .position(|item| item.id == id && item.status == TaskStatus::Queued)
        };
        let (Some(from), Some(to)) = (queued_index(dragged), queued_index(target)) else {
            debug!(%dragged, %target, "reorder ignored: both tasks must be queued");
            return false;
        };
        if from == to {
            return false;
        }
        let item = self.items.remove(from);
        self.items.insert(to, item);
        true
    }

    /// Stops automatic processing.
    pub fn pause(&mut self) {
        self.mode = QueueMode::Paused(PauseReason::User);
    }

    /// Pauses after the shared provider refused a request. Only an explicit
    /// resume lifts this pause.
    pub fn pause_for_rate_limit(&mut self) {
        self.mode = QueueMode::Paused(PauseReason::RateLimited);
        warn!("queue paused after provider rate limit");
    }

    /// Restarts automatic processing, whatever the pause reason.
    pub fn resume(&mut self) {
        self.mode = QueueMode::Running;
    }

    /// Removes completed items and returns how many were dropped.
    pub fn clear_finished(&mut self) -> usize {
        let before = self.items.len();
        self.items.retain(|item| item.status != TaskStatus::Completed);
        before - self.items.len()
    }

    /// The item currently generating.
    #[must_use]
    pub fn generating(&self) -> Option<&TaskItem> {
        self.items
            .iter()
            .find(|item| item.status == TaskStatus::Generating)
    }

    /// Looks up an item.
    #[must_use]
    pub fn item(&self, id: TaskId) -> Option<&TaskItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Items in list order.
    #[must_use]
    pub fn items(&self) -> &[TaskItem] {
        &self.items
    }

    /// Current run mode.
    #[must_use]
    pub fn mode(&self) -> QueueMode {
        self.mode
    }

    /// Context detected by an earlier item, forwarded to later requests.
    #[must_use]
    pub fn carried_context(&self) -> Option<&serde_json::Value> {
        self.carried_context.as_ref()
    }

    /// Copies the current state into a view.
    #[must_use]
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            items: self.items.clone(),
            mode: self.mode,
        }
    }

    fn generating_item_mut(&mut self, id: TaskId) -> Option<&mut TaskItem> {
        self.items
            .iter_mut()
            .find(|item| item.id == id && item.status == TaskStatus::Generating)
    }
}
