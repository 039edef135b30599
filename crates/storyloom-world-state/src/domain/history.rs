//! Linear undo/redo history of world snapshots.

use tracing::debug;

use super::snapshot::WorldSnapshot;

/// An ordered list of snapshots and a cursor into it.
///
/// `cursor == None` means no snapshot exists yet. Pushing while the cursor
/// is behind the end discards everything after it, so redo history is lost
/// on a new edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotHistory {
    entries: Vec<WorldSnapshot>,
    cursor: Option<usize>,
}

impl SnapshotHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A one-entry history positioned on `snapshot`, or an empty history.
    #[must_use]
    pub fn from_current(snapshot: Option<WorldSnapshot>) -> Self {
        let mut history = Self::new();
        if let Some(snapshot) = snapshot {
            history.push(snapshot);
        }
        history
    }

    /// Truncates entries after the cursor, appends `snapshot`, and moves the
    /// cursor onto it.
    pub fn push(&mut self, snapshot: WorldSnapshot) {
        let keep = self.cursor.map_or(0, |c| c + 1);
        if keep < self.entries.len() {
            debug!(
                discarded = self.entries.len() - keep,
                "discarding redo history on push"
            );
        }
        self.entries.truncate(keep);
        self.entries.push(snapshot);
        self.cursor = Some(self.entries.len() - 1);
    }

    /// Moves the cursor back one entry. Returns `false` at the oldest entry.
    pub fn undo(&mut self) -> bool {
        match self.cursor {
            Some(c) if c > 0 => {
                self.cursor = Some(c - 1);
                true
            }
            _ => false,
        }
    }

    /// Moves the cursor forward one entry. Returns `false` at the newest entry.
    pub fn redo(&mut self) -> bool {
        match self.cursor {
            Some(c) if c + 1 < self.entries.len() => {
                self.cursor = Some(c + 1);
                true
            }
            _ => false,
        }
    }

    /// The snapshot at the cursor.
    #[must_use]
    pub fn current(&self) -> Option<&WorldSnapshot> {
        self.cursor.and_then(|c| self.entries.get(c))
    }

    /// Replaces the snapshot at the cursor with `f(snapshot)` without
    /// creating a new history entry. Returns `false` if there is no current
    /// snapshot.
    pub fn mutate_current<F>(&mut self, f: F) -> bool
    where
        F: FnOnce(WorldSnapshot) -> WorldSnapshot,
    {
        let Some(slot) = self.cursor.and_then(|c| self.entries.get_mut(c)) else {
            return false;
        };
        *slot = f(std::mem::take(slot));
        true
    }

    /// The cursor position.
    #[must_use]
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Number of stored snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no snapshot has been pushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether [`SnapshotHistory::undo`] would move the cursor.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.cursor.is_some_and(|c| c > 0)
    }

    /// Whether [`SnapshotHistory::redo`] would move the cursor.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.cursor.is_some_and(|c| c + 1 < self.entries.len())
    }

    /// All snapshots, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[WorldSnapshot] {
        &self.entries
    }
}
