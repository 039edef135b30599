//! Storyloom: Generation task queue.
//!
//! Batches of generation requests (reference imports, entity adaptations)
//! are processed one at a time against the shared generator. Items can be
//! reordered while queued, retried after failure, and removed at any time;
//! a provider rate limit pauses the whole queue.

pub mod application;
pub mod domain;

pub use application::processor::{StepOutcome, TaskOutcome, TaskQueue};
pub use domain::item::{TaskInput, TaskItem, TaskStatus};
pub use domain::state::{PauseReason, QueueMode, QueueSnapshot, QueueState};
