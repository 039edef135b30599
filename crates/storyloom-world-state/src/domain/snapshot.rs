//! The structured world model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One event on the world timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Free-form year label, e.g. `"1204"`, `"-30 BCE"`, `"Age of Ash"`.
    #[serde(default)]
    pub year: String,
    /// Short headline.
    #[serde(default)]
    pub title: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
}

impl TimelineEvent {
    /// The sort key derived from the year label.
    #[must_use]
    pub fn sort_year(&self) -> i64 {
        parse_leading_year(&self.year)
    }
}

/// A named entity placed in a hierarchy tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// One level of a category hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    /// Tier label, e.g. "Great Houses".
    pub name: String,
    /// Entities in caller-defined order.
    #[serde(default)]
    pub entities: Vec<Entity>,
}

/// How an external entity (from imported reference material) is adapted
/// into this world.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityAdaptation {
    /// Role in the story.
    #[serde(default)]
    pub role: String,
    /// Current status (alive, exiled, ...).
    #[serde(default)]
    pub status: String,
    /// Where the entity is found.
    #[serde(default)]
    pub location: String,
    /// Adaptation notes.
    #[serde(default)]
    pub description: String,
}

/// One versioned instance of the world model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Timeline events, kept sorted by leading year.
    #[serde(default)]
    pub timeline: Vec<TimelineEvent>,
    /// Category name to ordered tiers.
    #[serde(default)]
    pub hierarchy: BTreeMap<String, Vec<Tier>>,
    /// External entity id to adaptation record.
    #[serde(default)]
    pub entity_adaptations: BTreeMap<String, EntityAdaptation>,
}

impl WorldSnapshot {
    /// Returns `true` when all three sections are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty() && self.hierarchy.is_empty() && self.entity_adaptations.is_empty()
    }

    /// Sorts the timeline by leading year. Events with equal years keep
    /// their relative order.
    pub fn sort_timeline(&mut self) {
        self.timeline.sort_by_key(TimelineEvent::sort_year);
    }
}

/// Parses the signed integer at the start of a year label.
///
/// Missing or non-numeric prefixes yield `0`.
#[must_use]
pub fn parse_leading_year(label: &str) -> i64 {
    let trimmed = label.trim_start();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().map_or(0, |year| sign * year)
}
