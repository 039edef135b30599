//! Domain model for the narrative content tree.

pub mod invariants;
pub mod node;
pub mod tree;
