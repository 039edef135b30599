//! Domain error types.

use thiserror::Error;

use crate::generator::GenerationError;
use crate::ids::{NodeId, SessionId, TaskId};

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A session was not found.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// A content-tree node was not found.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// A task-queue item was not found.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// A persisted or imported document was structurally invalid.
    #[error("import error: {0}")]
    Import(String),

    /// The generator collaborator failed.
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}
