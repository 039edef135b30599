//! Storyloom: World State.
//!
//! Responsible for the structured world model (timeline, hierarchy, entity
//! adaptations), its linear undo/redo history, manual in-place edits, and
//! the merge rules applied to freshly generated sections.

pub mod domain;

pub use domain::edit::WorldEdit;
pub use domain::history::SnapshotHistory;
pub use domain::merge::{WorldDraft, WorldSection, merge_full, merge_partial};
pub use domain::snapshot::{
    Entity, EntityAdaptation, TimelineEvent, Tier, WorldSnapshot, parse_leading_year,
};
