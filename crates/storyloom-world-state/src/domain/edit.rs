//! Manual edits applied to the live snapshot.
//!
//! Edits overwrite the snapshot at the history cursor instead of pushing a
//! new version. Indices that are out of range make the edit a no-op.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::merge::WorldSection;
use super::snapshot::{Entity, EntityAdaptation, TimelineEvent, Tier, WorldSnapshot};

/// A direct, user-driven change to the world model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WorldEdit {
    /// Moves an entity to another tier of the same category. `to_index`
    /// defaults to the end of the target tier.
    MoveEntity {
        /// Hierarchy category.
        category: String,
        /// Source tier index.
        from_tier: usize,
        /// Entity index within the source tier.
        entity_index: usize,
        /// Target tier index.
        to_tier: usize,
        /// Position within the target tier.
        #[serde(default)]
        to_index: Option<usize>,
    },
    /// Adds an entity at the end of a tier.
    AddEntity {
        /// Hierarchy category.
        category: String,
        /// Tier index.
        tier_index: usize,
        /// The new entity.
        entity: Entity,
    },
    /// Appends an empty tier to a category, creating the category if needed.
    AddTier {
        /// Hierarchy category.
        category: String,
        /// Tier name.
        name: String,
    },
    /// Moves a tier within its category.
    ReorderTier {
        /// Hierarchy category.
        category: String,
        /// Current index.
        from: usize,
        /// New index.
        to: usize,
    },
    /// Deletes a tier and its entities.
    DeleteTier {
        /// Hierarchy category.
        category: String,
        /// Tier index.
        tier_index: usize,
    },
    /// Adds a timeline event at its year position.
    AddTimelineEvent {
        /// The new event.
        event: TimelineEvent,
    },
    /// Moves a timeline event.
    ReorderTimeline {
        /// Current index.
        from: usize,
        /// New index.
        to: usize,
    },
    /// Deletes a timeline event.
    DeleteTimelineEvent {
        /// Event index.
        index: usize,
    },
    /// Empties one section.
    ClearSection {
        /// The section to clear.
        section: WorldSection,
    },
    /// Inserts or replaces an entity adaptation.
    SetAdaptation {
        /// External entity id.
        entity_id: String,
        /// The adaptation record.
        adaptation: EntityAdaptation,
    },
    /// Removes an entity adaptation.
    RemoveAdaptation {
        /// External entity id.
        entity_id: String,
    },
}

impl WorldEdit {
    /// Short operation name for logging.
    #[must_use]
    pub fn op_name(&self) -> &'static str {
        match self {
            Self::MoveEntity { .. } => "move_entity",
            Self::AddEntity { .. } => "add_entity",
            Self::AddTier { .. } => "add_tier",
            Self::ReorderTier { .. } => "reorder_tier",
            Self::DeleteTier { .. } => "delete_tier",
            Self::AddTimelineEvent { .. } => "add_timeline_event",
            Self::ReorderTimeline { .. } => "reorder_timeline",
            Self::DeleteTimelineEvent { .. } => "delete_timeline_event",
            Self::ClearSection { .. } => "clear_section",
            Self::SetAdaptation { .. } => "set_adaptation",
            Self::RemoveAdaptation { .. } => "remove_adaptation",
        }
    }

    /// Applies the edit, returning the updated snapshot.
    #[must_use]
    pub fn apply(&self, mut snapshot: WorldSnapshot) -> WorldSnapshot {
        let applied = match self {
            Self::MoveEntity {
                category,
                from_tier,
                entity_index,
                to_tier,
                to_index,
            } => snapshot.hierarchy.get_mut(category).is_some_and(|tiers| {
                move_entity(tiers, *from_tier, *entity_index, *to_tier, *to_index)
            }),
            Self::AddEntity {
                category,
                tier_index,
                entity,
            } => snapshot
                .hierarchy
                .get_mut(category)
                .and_then(|tiers| tiers.get_mut(*tier_index))
                .map(|tier| tier.entities.push(entity.clone()))
                .is_some(),
            Self::AddTier { category, name } => {
                snapshot
                    .hierarchy
                    .entry(category.clone())
                    .or_default()
                    .push(Tier {
                        name: name.clone(),
                        entities: Vec::new(),
                    });
                true
            }
            Self::ReorderTier { category, from, to } => snapshot
                .hierarchy
                .get_mut(category)
                .is_some_and(|tiers| splice(tiers, *from, *to)),
            Self::DeleteTier {
                category,
                tier_index,
            } => snapshot
                .hierarchy
                .get_mut(category)
                .filter(|tiers| *tier_index < tiers.len())
                .map(|tiers| tiers.remove(*tier_index))
                .is_some(),
            Self::AddTimelineEvent { event } => {
                let year = event.sort_year();
                let position = snapshot
                    .timeline
                    .iter()
                    .position(|e| e.sort_year() > year)
                    .unwrap_or(snapshot.timeline.len());
                snapshot.timeline.insert(position, event.clone());
                true
            }
            Self::ReorderTimeline { from, to } => splice(&mut snapshot.timeline, *from, *to),
            Self::DeleteTimelineEvent { index } => {
                if *index < snapshot.timeline.len() {
                    snapshot.timeline.remove(*index);
                    true
                } else {
                    false
                }
            }
            Self::ClearSection { section } => {
                match section {
                    WorldSection::Timeline => snapshot.timeline.clear(),
                    WorldSection::Hierarchy => snapshot.hierarchy.clear(),
                    WorldSection::EntityAdaptations => snapshot.entity_adaptations.clear(),
                }
                true
            }
            Self::SetAdaptation {
                entity_id,
                adaptation,
            } => {
                snapshot
                    .entity_adaptations
                    .insert(entity_id.clone(), adaptation.clone());
                true
            }
            Self::RemoveAdaptation { entity_id } => {
                snapshot.entity_adaptations.remove(entity_id).is_some()
            }
        };
        if !applied {
            debug!(op = self.op_name(), "world edit did not match the snapshot; ignored");
        }
        snapshot
    }
}

/// Removes the element at `from` and reinserts it at `to` (clamped to the
/// end). Returns `false` if `from` is out of range.
fn splice<T>(items: &mut Vec<T>, from: usize, to: usize) -> bool {
    if from >= items.len() {
        return false;
    }
    let item = items.remove(from);
    let to = to.min(items.len());
    items.insert(to, item);
    true
}

fn move_entity(
    tiers: &mut [Tier],
    from_tier: usize,
    entity_index: usize,
    to_tier: usize,
    to_index: Option<usize>,
) -> bool {
    if to_tier >= tiers.len() {
        return false;
    }
    let Some(source) = tiers.get_mut(from_tier) else {
        return false;
    };
    if entity_index >= source.entities.len() {
        return false;
    }
    let entity = source.entities.remove(entity_index);
    let target = &mut tiers[to_tier].entities;
    let position = to_index.map_or(target.len(), |i| i.min(target.len()));
    target.insert(position, entity);
    true
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn entity(name: &str) -> Entity {
        Entity {
            name: name.to_owned(),
            description: String::new(),
        }
    }

    fn event(year: &str, title: &str) -> TimelineEvent {
        TimelineEvent {
            year: year.to_owned(),
            title: title.to_owned(),
            description: String::new(),
        }
    }

    fn snapshot() -> WorldSnapshot {
        WorldSnapshot {
            timeline: vec![event("1", "a"), event("2", "b"), event("3", "c")],
            hierarchy: BTreeMap::from([(
                "Guilds".to_owned(),
                vec![
                    Tier {
                        name: "Masters".to_owned(),
                        entities: vec![entity("Ilsa"), entity("Brom")],
                    },
                    Tier {
                        name: "Journeymen".to_owned(),
                        entities: vec![entity("Pell")],
                    },
                ],
            )]),
            entity_adaptations: BTreeMap::new(),
        }
    }

    fn names(snapshot: &WorldSnapshot, tier: usize) -> Vec<String> {
        snapshot.hierarchy["Guilds"][tier]
            .entities
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }

    #[test]
    fn test_move_entity_between_tiers() {
        // Arrange
        let edit = WorldEdit::MoveEntity {
            category: "Guilds".to_owned(),
            from_tier: 0,
            entity_index: 1,
            to_tier: 1,
            to_index: Some(0),
        };

        // Act
        let edited = edit.apply(snapshot());

        // Assert
        assert_eq!(names(&edited, 0), vec!["Ilsa"]);
        assert_eq!(names(&edited, 1), vec!["Brom", "Pell"]);
    }

    #[test]
    fn test_move_entity_within_same_tier_appends_by_default() {
        let edit = WorldEdit::MoveEntity {
            category: "Guilds".to_owned(),
            from_tier: 0,
            entity_index: 0,
            to_tier: 0,
            to_index: None,
        };

        let edited = edit.apply(snapshot());

        assert_eq!(names(&edited, 0), vec!["Brom", "Ilsa"]);
    }

    #[test]
    fn test_out_of_range_edit_is_a_noop() {
        let edit = WorldEdit::MoveEntity {
            category: "Guilds".to_owned(),
            from_tier: 0,
            entity_index: 9,
            to_tier: 1,
            to_index: None,
        };

        assert_eq!(edit.apply(snapshot()), snapshot());
        assert_eq!(
            WorldEdit::DeleteTimelineEvent { index: 7 }.apply(snapshot()),
            snapshot()
        );
    }

    #[test]
    fn test_reorder_timeline_is_a_splice_not_a_sort() {
        let edited = WorldEdit::ReorderTimeline { from: 0, to: 2 }.apply(snapshot());

        let titles: Vec<&str> = edited.timeline.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_add_timeline_event_inserts_at_year_position() {
        let edited = WorldEdit::AddTimelineEvent {
            event: event("2", "b2"),
        }
        .apply(snapshot());

        let titles: Vec<&str> = edited.timeline.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "b2", "c"]);
    }

    #[test]
    fn test_delete_tier_and_clear_section() {
        let edited = WorldEdit::DeleteTier {
            category: "Guilds".to_owned(),
            tier_index: 0,
        }
        .apply(snapshot());
        assert_eq!(edited.hierarchy["Guilds"].len(), 1);

        let cleared = WorldEdit::ClearSection {
            section: WorldSection::Timeline,
        }
        .apply(edited);
        assert!(cleared.timeline.is_empty());
        assert_eq!(cleared.hierarchy["Guilds"].len(), 1);
    }

    #[test]
    fn test_adaptation_set_and_remove() {
        let set = WorldEdit::SetAdaptation {
            entity_id: "ext-9".to_owned(),
            adaptation: EntityAdaptation {
                role: "rival".to_owned(),
                ..EntityAdaptation::default()
            },
        }
        .apply(snapshot());
        assert_eq!(set.entity_adaptations["ext-9"].role, "rival");

        let removed = WorldEdit::RemoveAdaptation {
            entity_id: "ext-9".to_owned(),
        }
        .apply(set);
        assert!(removed.entity_adaptations.is_empty());
    }

    #[test]
    fn test_edit_decodes_from_tagged_json() {
        let edit: WorldEdit = serde_json::from_value(serde_json::json!({
            "op": "add_tier",
            "category": "Clergy",
            "name": "Bishops"
        }))
        .unwrap();

        let edited = edit.apply(WorldSnapshot::default());

        assert_eq!(edited.hierarchy["Clergy"][0].name, "Bishops");
    }
}
