//! Click-driven delete marking with word → phrase → sentence scope.

use crate::document::Document;
use cowrite_core::text_state::{toggle_delete, ToggleOutcome};
use cowrite_core::TextState;
use cowrite_diff::{Granularity, TextRange};
use serde::Serialize;

/// What a click did to the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClickResult {
    pub granularity: Granularity,
    pub range: TextRange,
    #[serde(skip)]
    pub toggle: ToggleOutcome,
    /// False when the transition table refused the mark.
    pub applied: bool,
    pub click_count: u32,
}

/// Rolling click counter over the last clicked region.
#[derive(Debug, Clone, Default)]
pub struct ClickTracker {
    count: u32,
    last: Option<TextRange>,
    outcome: Option<ToggleOutcome>,
}

impl ClickTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn click_count(&self) -> u32 {
        self.count
    }

    /// Handle a primary click at flat-text `offset`.
    ///
    /// The first click toggles the delete mark on the enclosing word. The
    /// second and third clicks widen the same mark to the phrase and then
    /// the sentence. Further overlapping clicks retoggle the sentence. A
    /// click outside the previous region starts over at word scope.
    pub fn click(&mut self, doc: &mut Document, offset: usize) -> Option<ClickResult> {
        let text = doc.text();
        let mut granularity = Granularity::for_click_count(self.count + 1);
        let mut range = granularity.range_at(&text, offset);

        let continues = self.count > 0
            && self.outcome.is_some()
            && self.last.is_some_and(|last| range.overlaps(&last));
        if !continues {
            self.count = 0;
            self.outcome = None;
            granularity = Granularity::Word;
            range = granularity.range_at(&text, offset);
        }
        if range.is_empty() {
            self.reset();
            return None;
        }
        self.count += 1;

        let toggle = match self.outcome {
            Some(outcome) if self.count <= 3 => outcome,
            _ => toggle_delete(doc.scope_state(range)),
        };
        let applied = apply_toggle(doc, range, toggle);

        tracing::debug!(
            count = self.count,
            ?granularity,
            from = range.from,
            to = range.to,
            applied,
            "click mark"
        );
        self.outcome = Some(toggle);
        self.last = Some(range);
        Some(ClickResult {
            granularity,
            range,
            toggle,
            applied,
            click_count: self.count,
        })
    }
}

fn apply_toggle(doc: &mut Document, range: TextRange, toggle: ToggleOutcome) -> bool {
    match toggle {
        ToggleOutcome::MarkDelete => doc.set_state(range, TextState::MarkedDelete, None),
        ToggleOutcome::Unmark => {
            doc.unmark(range);
            true
        }
    }
}
