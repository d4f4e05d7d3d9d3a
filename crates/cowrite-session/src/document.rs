//! Flat-text document whose characters carry authorship tags.
//!
//! Paragraphs are separated by `"\n\n"`. Newline characters never carry a
//! tag; every other character should end up with exactly one.

use cowrite_core::text_state::{can_apply, unmark_target};
use cowrite_core::{RoundId, TextState};
use cowrite_diff::{PositionMap, TextRange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Authorship tag of one character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub state: TextState,
    #[serde(default)]
    pub round_id: Option<RoundId>,
}

impl Tag {
    pub fn new(state: TextState, round_id: Option<&str>) -> Self {
        Self {
            state,
            round_id: round_id.map(str::to_string),
        }
    }

    pub fn user_written() -> Self {
        Self::new(TextState::UserWritten, None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Cell {
    ch: char,
    tag: Option<Tag>,
    /// State held before a delete mark, restored on unmark.
    prior: Option<TextState>,
}

impl Cell {
    fn is_break(&self) -> bool {
        self.ch == '\n'
    }

    fn state(&self) -> Option<TextState> {
        self.tag.as_ref().map(|t| t.state)
    }
}

/// A run of consecutive characters sharing tag and prior state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<TextState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_id: Option<RoundId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior: Option<TextState>,
}

/// Per-state character counts over the whole document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttributionSummary {
    pub total_chars: usize,
    pub untagged: usize,
    pub by_state: BTreeMap<TextState, usize>,
    /// Share of tagged characters in `ai-generated` or `ai-pending`.
    pub ai_share: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Span>", into = "Vec<Span>")]
pub struct Document {
    cells: Vec<Cell>,
}

impl From<Vec<Span>> for Document {
    fn from(spans: Vec<Span>) -> Self {
        let mut cells = Vec::new();
        for span in spans {
            let tag = span.state.map(|state| Tag {
                state,
                round_id: span.round_id.clone(),
            });
            for ch in span.text.chars() {
                cells.push(Cell {
                    ch,
                    tag: if ch == '\n' { None } else { tag.clone() },
                    prior: span.prior,
                });
            }
        }
        Self { cells }
    }
}

impl From<Document> for Vec<Span> {
    fn from(doc: Document) -> Self {
        doc.spans()
    }
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Document holding `text`, every character tagged with `tag`.
    pub fn from_text(text: &str, tag: Option<Tag>) -> Self {
        let mut doc = Self::new();
        doc.insert(0, text, tag);
        doc
    }

    pub fn text(&self) -> String {
        self.cells.iter().map(|c| c.ch).collect()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn slice(&self, range: TextRange) -> String {
        self.cells[self.clamp(range)].iter().map(|c| c.ch).collect()
    }

    pub fn position_map(&self) -> PositionMap {
        PositionMap::from_flat_text(&self.text())
    }

    pub fn tag_at(&self, offset: usize) -> Option<&Tag> {
        self.cells.get(offset).and_then(|c| c.tag.as_ref())
    }

    pub fn state_at(&self, offset: usize) -> Option<TextState> {
        self.cells.get(offset).and_then(Cell::state)
    }

    fn clamp(&self, range: TextRange) -> std::ops::Range<usize> {
        let to = range.to.min(self.cells.len());
        range.from.min(to)..to
    }

    // ── Editing ──

    /// Insert `text` at `offset` (clamped to the end); newlines stay untagged.
    pub fn insert(&mut self, offset: usize, text: &str, tag: Option<Tag>) {
        let at = offset.min(self.cells.len());
        let new_cells = text.chars().map(|ch| Cell {
            ch,
            tag: if ch == '\n' { None } else { tag.clone() },
            prior: None,
        });
        self.cells.splice(at..at, new_cells);
    }

    /// Remove the characters in `range` and return them.
    pub fn delete(&mut self, range: TextRange) -> String {
        let r = self.clamp(range);
        self.cells.drain(r).map(|c| c.ch).collect()
    }

    /// Replace `range` with `text` tagged `tag`; returns the removed text.
    pub fn replace(&mut self, range: TextRange, text: &str, tag: Option<Tag>) -> String {
        let removed = self.delete(range);
        self.insert(range.from.min(self.cells.len()), text, tag);
        removed
    }

    // ── Tagging ──

    /// Set `state` on every tagged-or-untagged character in `range`.
    ///
    /// All or nothing: if any character may not move to `state`, nothing
    /// changes and `false` is returned. Characters already in `state` are
    /// left alone. `round_id` replaces the tag's round when given.
    pub fn set_state(&mut self, range: TextRange, state: TextState, round_id: Option<&str>) -> bool {
        let r = self.clamp(range);
        let blocked = self.cells[r.clone()]
            .iter()
            .filter(|c| !c.is_break() && c.state() != Some(state))
            .find(|c| !can_apply(c.state(), state));
        if let Some(cell) = blocked {
            tracing::warn!(
                from = ?cell.state(),
                to = %state,
                "rejected text state transition"
            );
            return false;
        }

        for cell in self.cells[r].iter_mut().filter(|c| !c.is_break()) {
            if cell.state() == Some(state) {
                continue;
            }
            if state == TextState::MarkedDelete {
                cell.prior = cell.state();
            }
            let round = match round_id {
                Some(r) => Some(r.to_string()),
                None => cell.tag.as_ref().and_then(|t| t.round_id.clone()),
            };
            cell.tag = Some(Tag {
                state,
                round_id: round,
            });
        }
        true
    }

    /// Lift delete marks in `range`, restoring each character's prior
    /// state where the transition table allows it. Returns how many
    /// characters changed.
    pub fn unmark(&mut self, range: TextRange) -> usize {
        let r = self.clamp(range);
        let mut changed = 0;
        for cell in self.cells[r].iter_mut() {
            let Some(tag) = cell.tag.as_mut() else {
                continue;
            };
            if tag.state != TextState::MarkedDelete {
                continue;
            }
            tag.state = unmark_target(cell.prior.take());
            changed += 1;
        }
        changed
    }

    /// True when every non-newline character in `range` is in `state`.
    pub fn all_in_state(&self, range: TextRange, state: TextState) -> bool {
        let mut cells = self.cells[self.clamp(range)]
            .iter()
            .filter(|c| !c.is_break())
            .peekable();
        cells.peek().is_some() && cells.all(|c| c.state() == Some(state))
    }

    /// Representative state of a scope: `marked-delete` only when the whole
    /// scope is marked, otherwise the first tagged character's state.
    pub fn scope_state(&self, range: TextRange) -> Option<TextState> {
        if self.all_in_state(range, TextState::MarkedDelete) {
            return Some(TextState::MarkedDelete);
        }
        self.cells[self.clamp(range)]
            .iter()
            .filter(|c| !c.is_break())
            .find_map(Cell::state)
    }

    /// Distinct round ids referenced inside `range`, first-seen order.
    pub fn rounds_in(&self, range: TextRange) -> Vec<RoundId> {
        let mut out: Vec<RoundId> = Vec::new();
        for cell in &self.cells[self.clamp(range)] {
            if let Some(round) = cell.tag.as_ref().and_then(|t| t.round_id.as_ref()) {
                if !out.contains(round) {
                    out.push(round.clone());
                }
            }
        }
        out
    }

    /// Tag every untagged character as `user-written` with no round.
    /// Returns how many characters were fixed.
    pub fn fixup_untagged(&mut self) -> usize {
        let mut fixed = 0;
        for cell in self.cells.iter_mut().filter(|c| !c.is_break()) {
            if cell.tag.is_none() {
                cell.tag = Some(Tag::user_written());
                fixed += 1;
            }
        }
        if fixed > 0 {
            tracing::debug!(fixed, "untagged text corrected to user-written");
        }
        fixed
    }

    // ── Views ──

    /// Run-length view of the document. Newlines form their own spans.
    pub fn spans(&self) -> Vec<Span> {
        let mut spans: Vec<Span> = Vec::new();
        let mut last_key: Option<(Option<&Tag>, Option<TextState>, bool)> = None;
        for cell in &self.cells {
            let key = (cell.tag.as_ref(), cell.prior, cell.is_break());
            match spans.last_mut() {
                Some(span) if last_key == Some(key) => span.text.push(cell.ch),
                _ => spans.push(Span {
                    text: cell.ch.to_string(),
                    state: cell.state(),
                    round_id: cell.tag.as_ref().and_then(|t| t.round_id.clone()),
                    prior: cell.prior,
                }),
            }
            last_key = Some(key);
        }
        spans
    }

    /// Spans with their flat char ranges, newline spans skipped.
    pub fn tagged_ranges(&self) -> Vec<(TextRange, Span)> {
        let mut out = Vec::new();
        let mut offset = 0;
        for span in self.spans() {
            let len = span.text.chars().count();
            if !span.text.starts_with('\n') {
                out.push((TextRange::new(offset, offset + len), span));
            }
            offset += len;
        }
        out
    }

    pub fn attribution_summary(&self) -> AttributionSummary {
        let mut summary = AttributionSummary::default();
        for cell in self.cells.iter().filter(|c| !c.is_break()) {
            summary.total_chars += 1;
            match cell.state() {
                Some(state) => *summary.by_state.entry(state).or_insert(0) += 1,
                None => summary.untagged += 1,
            }
        }
        let tagged = summary.total_chars - summary.untagged;
        if tagged > 0 {
            let ai = [TextState::AiGenerated, TextState::AiPending]
                .iter()
                .filter_map(|s| summary.by_state.get(s))
                .sum::<usize>();
            summary.ai_share = ai as f64 / tagged as f64;
        }
        summary
    }
}
