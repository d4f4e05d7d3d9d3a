//! Flat-text offset to structural document position mapping.
//!
//! The flat text of a document is its paragraphs joined by `"\n\n"`. In the
//! structural model every paragraph is wrapped in an opening and a closing
//! token, so the two separator characters line up with the closing token of
//! one paragraph and the opening token of the next. Those slots are not
//! addressable text.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "pos", rename_all = "lowercase")]
pub enum Slot {
    Text(usize),
    Separator(usize),
}

impl Slot {
    pub fn pos(&self) -> usize {
        match *self {
            Slot::Text(p) | Slot::Separator(p) => p,
        }
    }
}

/// One slot per flat-text character, plus the position just past the end.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PositionMap {
    slots: Vec<Slot>,
    end: usize,
}

/// Separator placed between paragraphs in flat text.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

impl PositionMap {
    /// Map for a document made of `paragraphs`; text starts at position 1.
    pub fn from_paragraphs<S: AsRef<str>>(paragraphs: &[S]) -> Self {
        let mut slots = Vec::new();
        let mut pos = 1;
        for (i, para) in paragraphs.iter().enumerate() {
            if i > 0 {
                slots.push(Slot::Separator(pos));
                slots.push(Slot::Separator(pos + 1));
                pos += 2;
            }
            for _ in para.as_ref().chars() {
                slots.push(Slot::Text(pos));
                pos += 1;
            }
        }
        Self { slots, end: pos }
    }

    /// Map for flat text, splitting paragraphs on `"\n\n"`.
    pub fn from_flat_text(text: &str) -> Self {
        let paragraphs: Vec<&str> = text.split(PARAGRAPH_SEPARATOR).collect();
        Self::from_paragraphs(&paragraphs)
    }

    pub fn from_slots(slots: Vec<Slot>, end: usize) -> Self {
        Self { slots, end }
    }

    /// Number of flat-text characters covered.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, offset: usize) -> Option<Slot> {
        self.slots.get(offset).copied()
    }

    /// Structural position of the flat offset. `offset == len()` maps to the
    /// position just past the last character.
    pub fn position_at(&self, offset: usize) -> Option<usize> {
        match self.slots.get(offset) {
            Some(slot) => Some(slot.pos()),
            None if offset == self.slots.len() => Some(self.end),
            None => None,
        }
    }

    /// Flat offset of an addressable structural position.
    pub fn offset_of(&self, position: usize) -> Option<usize> {
        if position == self.end {
            return Some(self.slots.len());
        }
        self.slots
            .binary_search_by_key(&position, Slot::pos)
            .ok()
            .filter(|&i| matches!(self.slots[i], Slot::Text(_)))
    }

    /// Flat offset of any slot, separators included. Edits that join or
    /// split paragraphs start on a separator slot.
    pub fn slot_offset(&self, position: usize) -> Option<usize> {
        if position == self.end {
            return Some(self.slots.len());
        }
        self.slots.binary_search_by_key(&position, Slot::pos).ok()
    }
}
