//! Coalescing of keystrokes inside AI text into inline-edit rounds.

use crate::debounce::DebounceTimer;
use crate::document::Document;
use cowrite_core::trace::TraceEdit;
use cowrite_core::{RoundId, TextState};
use cowrite_diff::TextRange;
use std::time::{Duration, Instant};

/// The inline-edit round currently collecting keystrokes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenEdit {
    pub round_id: RoundId,
    /// Round whose AI text is being edited, if it had one.
    pub parent: Option<RoundId>,
    /// Flat offset just after the last edit.
    pub cursor: usize,
}

/// Shape of a raw edit as the editor reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Type,
    Backspace,
    ForwardDelete,
    /// Selection replace, paste, or anything else.
    Replace,
}

#[derive(Debug, Clone)]
pub struct InlineEditCoalescer {
    timer: DebounceTimer,
    open: Option<OpenEdit>,
}

impl InlineEditCoalescer {
    pub fn new(window: Duration) -> Self {
        Self {
            timer: DebounceTimer::new(window),
            open: None,
        }
    }

    pub fn current(&self) -> Option<&OpenEdit> {
        self.open.as_ref()
    }

    /// True when an edit under `parent` can join the open round.
    pub fn continues(&self, parent: &Option<RoundId>, now: Instant) -> bool {
        matches!(&self.open, Some(open) if open.parent == *parent)
            && !self.timer.is_expired(now)
    }

    pub fn begin(&mut self, round_id: RoundId, parent: Option<RoundId>, cursor: usize, now: Instant) {
        self.open = Some(OpenEdit {
            round_id,
            parent,
            cursor,
        });
        self.timer.reset(now);
    }

    /// Record a keystroke on the open round: move its cursor and restart
    /// the window.
    pub fn touch(&mut self, cursor: usize, now: Instant) {
        if let Some(open) = self.open.as_mut() {
            open.cursor = cursor;
            self.timer.reset(now);
        }
    }

    /// Close the open round if its window has run out.
    pub fn take_expired(&mut self, now: Instant) -> Option<OpenEdit> {
        if self.timer.is_expired(now) {
            self.timer.cancel();
            return self.open.take();
        }
        None
    }

    /// Close the open round regardless of the window.
    pub fn flush(&mut self) -> Option<OpenEdit> {
        self.timer.flush();
        self.open.take()
    }
}

/// Decide whether an edit over `range` lands in AI text.
///
/// Returns `Some(parent)` for an inline edit: a character in the affected
/// range (or on either side of the caret for an insertion) is
/// `ai-generated`, or is `user-edited` text of the round still open.
pub fn inline_parent(
    doc: &Document,
    range: TextRange,
    open: Option<&OpenEdit>,
) -> Option<Option<RoundId>> {
    let probes: Vec<usize> = if range.is_empty() {
        [range.from.checked_sub(1), Some(range.from)]
            .into_iter()
            .flatten()
            .collect()
    } else {
        (range.from..range.to).collect()
    };

    for offset in probes {
        let Some(tag) = doc.tag_at(offset) else {
            continue;
        };
        match tag.state {
            TextState::AiGenerated => return Some(tag.round_id.clone()),
            TextState::UserEdited => {
                if let Some(open) = open {
                    if tag.round_id.as_ref() == Some(&open.round_id) {
                        return Some(open.parent.clone());
                    }
                }
            }
            _ => {}
        }
    }
    None
}

/// Trace step for an edit joining an existing round. Keystrokes at the
/// round's cursor extend the last trace entry; anything else opens a new one.
pub fn trace_step(
    kind: EditKind,
    range: TextRange,
    removed: &str,
    inserted: &str,
    cursor: usize,
) -> TraceEdit {
    match kind {
        EditKind::Type if removed.is_empty() && range.from == cursor => {
            TraceEdit::Typed(inserted.to_string())
        }
        EditKind::Backspace if inserted.is_empty() && range.to == cursor => {
            TraceEdit::Backspace(removed.to_string())
        }
        EditKind::ForwardDelete if inserted.is_empty() && range.from == cursor => {
            TraceEdit::ForwardDelete(removed.to_string())
        }
        _ => TraceEdit::Fresh {
            original: removed.to_string(),
            replacement: inserted.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Tag;

    fn window() -> Duration {
        Duration::from_millis(2000)
    }

    #[test]
    fn same_parent_inside_window_continues() {
        let t0 = Instant::now();
        let mut c = InlineEditCoalescer::new(window());
        let parent = Some("r-1".to_string());
        c.begin("r-2".into(), parent.clone(), 4, t0);

        assert!(c.continues(&parent, t0 + Duration::from_millis(1500)));
        c.touch(5, t0 + Duration::from_millis(1500));
        assert!(c.continues(&parent, t0 + Duration::from_millis(3000)));
        assert!(!c.continues(&Some("r-9".into()), t0));
        assert_eq!(c.current().unwrap().cursor, 5);
    }

    #[test]
    fn expiry_closes_the_round() {
        let t0 = Instant::now();
        let mut c = InlineEditCoalescer::new(window());
        c.begin("r-2".into(), None, 0, t0);
        assert!(c.take_expired(t0 + Duration::from_millis(100)).is_none());
        let closed = c.take_expired(t0 + Duration::from_millis(2000)).unwrap();
        assert_eq!(closed.round_id, "r-2");
        assert!(c.current().is_none());
        assert!(!c.continues(&None, t0));
    }

    #[test]
    fn flush_closes_immediately() {
        let mut c = InlineEditCoalescer::new(window());
        c.begin("r-3".into(), None, 0, Instant::now());
        assert_eq!(c.flush().unwrap().round_id, "r-3");
        assert!(c.flush().is_none());
    }

    #[test]
    fn inline_parent_detects_ai_text_around_caret() {
        let mut doc = Document::from_text("mine ", Some(Tag::user_written()));
        doc.insert(5, "theirs", Some(Tag::new(TextState::AiGenerated, Some("r-1"))));

        assert_eq!(inline_parent(&doc, TextRange::new(2, 2), None), None);
        // caret right before the AI text
        assert_eq!(
            inline_parent(&doc, TextRange::new(5, 5), None),
            Some(Some("r-1".to_string()))
        );
        assert_eq!(
            inline_parent(&doc, TextRange::new(11, 11), None),
            Some(Some("r-1".to_string()))
        );
        assert_eq!(
            inline_parent(&doc, TextRange::new(3, 7), None),
            Some(Some("r-1".to_string()))
        );
    }

    #[test]
    fn user_edited_text_of_open_round_stays_inline() {
        let mut doc = Document::from_text("xy", Some(Tag::new(TextState::UserEdited, Some("r-2"))));
        let open = OpenEdit {
            round_id: "r-2".into(),
            parent: Some("r-1".into()),
            cursor: 2,
        };
        assert_eq!(
            inline_parent(&doc, TextRange::new(2, 2), Some(&open)),
            Some(Some("r-1".to_string()))
        );
        assert_eq!(inline_parent(&doc, TextRange::new(2, 2), None), None);

        doc.insert(2, " plain", Some(Tag::user_written()));
        assert_eq!(inline_parent(&doc, TextRange::new(8, 8), Some(&open)), None);
    }

    #[test]
    fn trace_step_shapes() {
        let r = TextRange::new(4, 4);
        assert_eq!(trace_step(EditKind::Type, r, "", "a", 4), TraceEdit::Typed("a".into()));
        assert_eq!(
            trace_step(EditKind::Type, r, "", "a", 9),
            TraceEdit::Fresh {
                original: String::new(),
                replacement: "a".into()
            }
        );
        assert_eq!(
            trace_step(EditKind::Backspace, TextRange::new(3, 4), "x", "", 4),
            TraceEdit::Backspace("x".into())
        );
        assert_eq!(
            trace_step(EditKind::ForwardDelete, TextRange::new(4, 5), "y", "", 4),
            TraceEdit::ForwardDelete("y".into())
        );
        assert!(matches!(
            trace_step(EditKind::Replace, TextRange::new(0, 3), "abc", "z", 3),
            TraceEdit::Fresh { .. }
        ));
    }
}
