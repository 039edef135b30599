//! Merging generated world content into the previous snapshot.
//!
//! A section missing from generator output is unspecified and is always
//! taken from the previous snapshot; it never clears existing data.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use storyloom_core::generator::GenerationKind;

use super::snapshot::{EntityAdaptation, TimelineEvent, Tier, WorldSnapshot};

/// One of the three sections of a world snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorldSection {
    /// The timeline.
    Timeline,
    /// The category hierarchy.
    Hierarchy,
    /// The entity adaptations.
    EntityAdaptations,
}

impl WorldSection {
    /// The generation kind that targets only this section.
    #[must_use]
    pub fn generation_kind(self) -> GenerationKind {
        match self {
            Self::Timeline => GenerationKind::WorldTimeline,
            Self::Hierarchy => GenerationKind::WorldHierarchy,
            Self::EntityAdaptations => GenerationKind::WorldAdaptations,
        }
    }
}

impl fmt::Display for WorldSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Timeline => "timeline",
            Self::Hierarchy => "hierarchy",
            Self::EntityAdaptations => "entity_adaptations",
        })
    }
}

/// World content as reported by the generator; every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldDraft {
    /// Generated timeline, if any.
    #[serde(default)]
    pub timeline: Option<Vec<TimelineEvent>>,
    /// Generated hierarchy, if any.
    #[serde(default)]
    pub hierarchy: Option<BTreeMap<String, Vec<Tier>>>,
    /// Generated adaptations, if any.
    #[serde(default)]
    pub entity_adaptations: Option<BTreeMap<String, EntityAdaptation>>,
}

impl From<WorldSnapshot> for WorldDraft {
    fn from(snapshot: WorldSnapshot) -> Self {
        Self {
            timeline: Some(snapshot.timeline),
            hierarchy: Some(snapshot.hierarchy),
            entity_adaptations: Some(snapshot.entity_adaptations),
        }
    }
}

/// Combines a full regeneration with the previous snapshot: sections the
/// draft omits are kept from `previous`.
#[must_use]
pub fn merge_full(generated: WorldDraft, previous: Option<&WorldSnapshot>) -> WorldSnapshot {
    let previous = previous.cloned().unwrap_or_default();
    let mut merged = WorldSnapshot {
        timeline: generated.timeline.unwrap_or(previous.timeline),
        hierarchy: generated.hierarchy.unwrap_or(previous.hierarchy),
        entity_adaptations: generated
            .entity_adaptations
            .unwrap_or(previous.entity_adaptations),
    };
    merged.sort_timeline();
    merged
}

/// Adopts only `target` from `generated`; the other two sections come from
/// `previous` unchanged. If the draft omits the target section the previous
/// one is kept as well.
#[must_use]
pub fn merge_partial(
    generated: WorldDraft,
    previous: Option<&WorldSnapshot>,
    target: WorldSection,
) -> WorldSnapshot {
    let mut merged = previous.cloned().unwrap_or_default();
    match target {
        WorldSection::Timeline => {
            if let Some(timeline) = generated.timeline {
                merged.timeline = timeline;
                merged.sort_timeline();
            }
        }
        WorldSection::Hierarchy => {
            if let Some(hierarchy) = generated.hierarchy {
                merged.hierarchy = hierarchy;
            }
        }
        WorldSection::EntityAdaptations => {
            if let Some(adaptations) = generated.entity_adaptations {
                merged.entity_adaptations = adaptations;
            }
        }
    }
    merged
}
