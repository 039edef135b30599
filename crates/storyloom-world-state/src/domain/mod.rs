//! Domain model for world state.

pub mod edit;
pub mod history;
pub mod merge;
pub mod snapshot;
