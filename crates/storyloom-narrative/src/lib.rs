//! Storyloom: Narrative content tree.
//!
//! Responsible for the branching graph of user and agent turns: appending,
//! deriving transcripts, editing as a branch, regenerating, sibling
//! navigation, forking, and rollback of speculative turns.

pub mod domain;

pub use domain::invariants::InvariantViolation;
pub use domain::node::{Choice, Node, Role, TurnContent};
pub use domain::tree::{
    ContentTree, Direction, EditOutcome, LinearTurn, PendingTurn, Placement, RegenerationPlan,
};
