//! TextState transition table.
//!
//! A span with no prior state may take any initial state. Every other change
//! must appear in [`VALID_TRANSITIONS`]; anything else is rejected and the
//! caller leaves the span untouched.

use crate::types::TextState;

// ── Valid transitions ──

const VALID_TRANSITIONS: &[(TextState, &[TextState])] = &[
    (
        TextState::UserWritten,
        &[TextState::MarkedDelete, TextState::UserEdited],
    ),
    (
        TextState::AiGenerated,
        &[
            TextState::UserEdited,
            TextState::MarkedPreserve,
            TextState::MarkedDelete,
        ],
    ),
    (TextState::AiPending, &[TextState::AiGenerated]),
    (TextState::UserEdited, &[TextState::MarkedDelete]),
    (TextState::MarkedPreserve, &[TextState::MarkedDelete]),
    (
        TextState::MarkedDelete,
        &[
            TextState::UserWritten,
            TextState::MarkedPreserve,
            TextState::AiGenerated,
        ],
    ), // toggle back
    (TextState::OriginalRemoved, &[TextState::UserWritten]), // click to restore
];

/// States reachable from `from` in one step.
pub fn allowed_targets(from: TextState) -> &'static [TextState] {
    VALID_TRANSITIONS
        .iter()
        .find(|(f, _)| *f == from)
        .map(|(_, targets)| *targets)
        .unwrap_or(&[])
}

pub fn is_valid_transition(from: TextState, to: TextState) -> bool {
    allowed_targets(from).contains(&to)
}

/// Decide whether a span currently in `current` may take `requested`.
pub fn can_apply(current: Option<TextState>, requested: TextState) -> bool {
    match current {
        None => true,
        Some(from) => is_valid_transition(from, requested),
    }
}

/// Result of toggling the delete mark over a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Scope becomes `marked-delete`.
    MarkDelete,
    /// Scope drops its delete mark and returns to its pre-mark state.
    Unmark,
}

/// Toggle semantics at a given scope: `marked-delete` unmarks,
/// `marked-preserve` and everything else become `marked-delete`.
pub fn toggle_delete(current: Option<TextState>) -> ToggleOutcome {
    match current {
        Some(TextState::MarkedDelete) => ToggleOutcome::Unmark,
        _ => ToggleOutcome::MarkDelete,
    }
}

/// State to return to when a delete mark is removed from text that was
/// `prior` before it was marked. Falls back to `user-written` when the table
/// has no way back to `prior`.
pub fn unmark_target(prior: Option<TextState>) -> TextState {
    match prior {
        Some(state) if is_valid_transition(TextState::MarkedDelete, state) => state,
        _ => TextState::UserWritten,
    }
}
