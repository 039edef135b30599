//! Storyloom: Session orchestration.
//!
//! Ties the content tree, the world history and the generator together
//! into sessions: an explicit command dispatcher with cancellable two-phase
//! generation, the persisted record format, YAML export/import, and the
//! read-only views served to the UI.

pub mod application;
pub mod domain;

pub use application::command_handlers::{DispatchOutcome, SessionEngine};
pub use application::query_handlers::{SessionSummary, SessionView, TurnView};
pub use domain::commands::SessionCommand;
pub use domain::session::{
    FailureKind, GenerationTarget, ReferenceDocument, Session, SessionConfig, SessionFailure,
};
