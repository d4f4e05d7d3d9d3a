//! Per-session TextState machine: marks, clicks, and raw text edits.

use crate::document::{Document, Tag};
use crate::error::SessionError;
use crate::inline_edit::{inline_parent, trace_step, EditKind, InlineEditCoalescer, OpenEdit};
use crate::marking::{ClickResult, ClickTracker};
use cowrite_core::event::{EventType, ProvenanceLog};
use cowrite_core::scoring::{
    compute_d1_base, compute_d2_base, compute_d3_base, CurationAction, DirectionInput,
};
use cowrite_core::trace::TraceEdit;
use cowrite_core::{DimensionScores, RoundId, RoundNodeMetadata, RoundType, TextState};
use cowrite_diff::TextRange;
use cowrite_graph::ContributionGraph;
use cowrite_ledger::{CreateRoundParams, RoundLedger};
use serde_json::json;
use std::time::{Duration, Instant};

/// Mutable session state an edit touches.
pub struct EditContext<'a> {
    pub document: &'a mut Document,
    pub ledger: &'a mut RoundLedger,
    pub graph: &'a mut ContributionGraph,
    pub log: &'a mut ProvenanceLog,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    /// Inline-edit round the edit was recorded on, if it landed in AI text.
    pub round_id: Option<RoundId>,
    /// Caret offset after the edit.
    pub cursor: usize,
    /// Characters the safety net had to tag.
    pub fixed_up: usize,
}

#[derive(Debug, Clone)]
pub struct TextStateMachine {
    clicks: ClickTracker,
    coalescer: InlineEditCoalescer,
}

impl TextStateMachine {
    pub fn new(debounce: Duration) -> Self {
        Self {
            clicks: ClickTracker::new(),
            coalescer: InlineEditCoalescer::new(debounce),
        }
    }

    pub fn open_inline_edit(&self) -> Option<&OpenEdit> {
        self.coalescer.current()
    }

    // ── Marks ──

    /// Request `state` over `range`; `false` leaves the document untouched.
    pub fn apply(
        &self,
        ctx: &mut EditContext<'_>,
        range: TextRange,
        state: TextState,
    ) -> bool {
        let applied = ctx.document.set_state(range, state, None);
        if applied {
            ctx.log.log(
                EventType::MarkApplied,
                json!({ "from": range.from, "to": range.to, "state": state }),
            );
        }
        applied
    }

    pub fn click(&mut self, ctx: &mut EditContext<'_>, offset: usize) -> Option<ClickResult> {
        let result = self.clicks.click(ctx.document, offset)?;
        if result.applied {
            ctx.log.log(
                EventType::MarkApplied,
                json!({
                    "from": result.range.from,
                    "to": result.range.to,
                    "granularity": result.granularity,
                    "clickCount": result.click_count,
                }),
            );
        }
        Some(result)
    }

    // ── Text edits ──

    /// Replace `range` with `inserted`, as reported by the editor.
    ///
    /// Edits touching AI text are recorded on an inline-edit round scoped to
    /// the AI text's round; keystrokes under the same parent inside the
    /// debounce window reuse the open round. Everything else is user text.
    pub fn edit(
        &mut self,
        ctx: &mut EditContext<'_>,
        kind: EditKind,
        range: TextRange,
        inserted: &str,
        now: Instant,
    ) -> Result<EditOutcome, SessionError> {
        let len = ctx.document.len();
        if range.to > len || range.from > range.to {
            return Err(SessionError::OutOfBounds {
                offset: range.to.max(range.from),
                len,
            });
        }
        self.tick(ctx, now)?;

        let removed = ctx.document.slice(range);
        let cursor = range.from + inserted.chars().count();
        let round_id = match inline_parent(ctx.document, range, self.coalescer.current()) {
            Some(parent) => {
                let round_id = self.record_inline(ctx, kind, range, &removed, inserted, parent, now)?;
                ctx.document.replace(
                    range,
                    inserted,
                    Some(Tag::new(TextState::UserEdited, Some(&round_id))),
                );
                self.coalescer.touch(cursor, now);
                Some(round_id)
            }
            None => {
                ctx.document.replace(range, inserted, Some(Tag::user_written()));
                ctx.log.log(
                    EventType::TextTyped,
                    json!({ "offset": range.from, "removed": removed, "text": inserted }),
                );
                None
            }
        };

        let fixed_up = ctx.document.fixup_untagged();
        Ok(EditOutcome {
            round_id,
            cursor,
            fixed_up,
        })
    }

    /// Insert text through a path that bypasses attribution. The safety
    /// net tags whatever arrives as `user-written`.
    pub fn insert_untracked(&self, ctx: &mut EditContext<'_>, offset: usize, text: &str) -> usize {
        ctx.document.insert(offset, text, None);
        ctx.document.fixup_untagged()
    }

    #[allow(clippy::too_many_arguments)]
    fn record_inline(
        &mut self,
        ctx: &mut EditContext<'_>,
        kind: EditKind,
        range: TextRange,
        removed: &str,
        inserted: &str,
        parent: Option<RoundId>,
        now: Instant,
    ) -> Result<RoundId, SessionError> {
        let joined = self
            .coalescer
            .current()
            .filter(|_| self.coalescer.continues(&parent, now))
            .map(|open| (open.round_id.clone(), open.cursor));
        let (round_id, step) = match joined {
            Some((round_id, cursor)) => {
                let step = trace_step(kind, range, removed, inserted, cursor);
                (round_id, step)
            }
            None => {
                self.close_open(ctx)?;
                let round_id = open_inline_round(ctx, parent.as_deref())?;
                self.coalescer
                    .begin(round_id.clone(), parent.clone(), range.from, now);
                let step = TraceEdit::Fresh {
                    original: removed.to_string(),
                    replacement: inserted.to_string(),
                };
                (round_id, step)
            }
        };

        ctx.ledger.append_trace(&round_id, step)?;
        let event = ctx.log.log(
            EventType::EditInPlace,
            json!({
                "roundId": round_id,
                "parentRoundId": parent,
                "offset": range.from,
                "original": removed,
                "replacement": inserted,
            }),
        );
        ctx.ledger.attach_event(&round_id, event)?;
        Ok(round_id)
    }

    // ── Debounce ──

    /// Seal the open inline-edit round if its window has run out.
    pub fn tick(
        &mut self,
        ctx: &mut EditContext<'_>,
        now: Instant,
    ) -> Result<Option<RoundId>, SessionError> {
        match self.coalescer.take_expired(now) {
            Some(open) => {
                ctx.ledger.seal(&open.round_id)?;
                tracing::debug!(round = %open.round_id, "inline edit sealed on expiry");
                Ok(Some(open.round_id))
            }
            None => Ok(None),
        }
    }

    /// Seal the open inline-edit round now, before anything reads it.
    pub fn flush(&mut self, ctx: &mut EditContext<'_>) -> Result<Option<RoundId>, SessionError> {
        self.close_open(ctx)
    }

    fn close_open(&mut self, ctx: &mut EditContext<'_>) -> Result<Option<RoundId>, SessionError> {
        match self.coalescer.flush() {
            Some(open) => {
                ctx.ledger.seal(&open.round_id)?;
                tracing::debug!(round = %open.round_id, "inline edit sealed");
                Ok(Some(open.round_id))
            }
            None => Ok(None),
        }
    }
}

/// Create the ledger round and graph node for a new inline edit.
fn open_inline_round(
    ctx: &mut EditContext<'_>,
    parent: Option<&str>,
) -> Result<RoundId, SessionError> {
    let parents: Vec<&str> = parent.into_iter().collect();
    let round_id = ctx
        .ledger
        .create_round(
            CreateRoundParams::new(RoundType::InlineEdit)
                .with_parents(&parents)
                .with_mode(RoundType::InlineEdit.as_str()),
        )?
        .round_id
        .clone();

    let scores = DimensionScores::new(
        compute_d1_base(TextState::UserEdited, Some(RoundType::InlineEdit), false),
        compute_d2_base(DirectionInput {
            round_type: Some(RoundType::InlineEdit),
            ..Default::default()
        }),
        compute_d3_base("edited"),
    );
    ctx.graph.add_node(
        &round_id,
        scores,
        RoundNodeMetadata::new(RoundType::InlineEdit, "edited"),
    )?;

    // Editing a picked alternative changes how that pick is curated.
    if let Some(parent) = parent {
        let picked_alternative = ctx
            .ledger
            .get_round(parent)
            .is_some_and(|r| r.round_type == RoundType::Alternative);
        if picked_alternative {
            ctx.ledger
                .record_diff_action(parent, CurationAction::AltSelectedEdited)?;
            ctx.graph
                .record_curation(parent, CurationAction::AltSelectedEdited)?;
        }
    }
    tracing::info!(round = %round_id, parent = ?parent, "inline edit round opened");
    Ok(round_id)
}
