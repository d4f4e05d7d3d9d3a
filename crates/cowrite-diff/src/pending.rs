//! Pending, position-addressed changes waiting for a user decision.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiffState {
    Pending,
    Accepted,
    Rejected,
    Restored,
}

/// User decision on a pending change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiffResolution {
    Accept,
    Reject,
    Restore,
}

impl DiffResolution {
    fn state(self) -> DiffState {
        match self {
            Self::Accept => DiffState::Accepted,
            Self::Reject => DiffState::Rejected,
            Self::Restore => DiffState::Restored,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiffEntry {
    pub id: String,
    pub original_text: String,
    pub replacement_text: String,
    pub position: usize,
    pub state: DiffState,
    /// Round that produced the change, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_id: Option<String>,
}

fn new_diff_id() -> String {
    format!("diff_{}", ulid::Ulid::new().to_string().to_lowercase())
}

/// Every change proposed in a session, resolved ones included, in the
/// order they were added.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PendingDiffs {
    entries: Vec<DiffEntry>,
}

impl PendingDiffs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending change and return its id.
    pub fn add(
        &mut self,
        original_text: &str,
        replacement_text: &str,
        position: usize,
        round_id: Option<&str>,
    ) -> String {
        let id = new_diff_id();
        self.entries.push(DiffEntry {
            id: id.clone(),
            original_text: original_text.to_string(),
            replacement_text: replacement_text.to_string(),
            position,
            state: DiffState::Pending,
            round_id: round_id.map(str::to_string),
        });
        id
    }

    pub fn get(&self, id: &str) -> Option<&DiffEntry> {
        self.entries.iter().find(|d| d.id == id)
    }

    /// Set the state of one entry. Unknown ids return `None`.
    pub fn resolve(&mut self, id: &str, resolution: DiffResolution) -> Option<DiffEntry> {
        let entry = self.entries.iter_mut().find(|d| d.id == id)?;
        entry.state = resolution.state();
        Some(entry.clone())
    }

    /// Resolve every pending entry at once; returns the entries changed.
    pub fn resolve_all(&mut self, resolution: DiffResolution) -> Vec<DiffEntry> {
        self.entries
            .iter_mut()
            .filter(|d| d.state == DiffState::Pending)
            .map(|d| {
                d.state = resolution.state();
                d.clone()
            })
            .collect()
    }

    /// Move pending entries located after `position` by `delta` once the
    /// document has been edited there.
    pub fn shift_after(&mut self, position: usize, delta: isize) {
        for entry in self
            .entries
            .iter_mut()
            .filter(|d| d.state == DiffState::Pending && d.position > position)
        {
            entry.position = entry.position.saturating_add_signed(delta);
        }
    }

    /// Like [`shift_after`](Self::shift_after) but also moves entries that
    /// start exactly at `position`, for text inserted in front of them.
    pub fn shift_from(&mut self, position: usize, delta: isize) {
        for entry in self
            .entries
            .iter_mut()
            .filter(|d| d.state == DiffState::Pending && d.position >= position)
        {
            entry.position = entry.position.saturating_add_signed(delta);
        }
    }

    /// Entries still waiting for a decision.
    pub fn active(&self) -> Vec<&DiffEntry> {
        self.entries
            .iter()
            .filter(|d| d.state == DiffState::Pending)
            .collect()
    }

    pub fn all(&self) -> &[DiffEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
