//! Incremental edit-trace building for inline-edit rounds.

use crate::types::EditTrace;

/// Shape of a single keystroke-level edit inside an inline-edit round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEdit {
    /// Text typed at the cursor, continuing the previous edit.
    Typed(String),
    /// Backspace removed `0` from just before the cursor.
    Backspace(String),
    /// Forward-delete removed `0` from just after the cursor.
    ForwardDelete(String),
    /// Any other shape (new cursor location, selection replace).
    Fresh {
        original: String,
        replacement: String,
    },
}

/// Fold `edit` into `traces`.
///
/// Backspace prepends to the last entry's `original`, unless it is undoing
/// characters typed in that same entry. Forward-delete appends to it. Typed
/// text extends the last replacement. `Fresh` always opens a new entry, and
/// so does any edit when there is no entry yet.
pub fn apply_trace_edit(traces: &mut Vec<EditTrace>, edit: TraceEdit) {
    let Some(last) = traces.last_mut() else {
        traces.push(open_entry(edit));
        return;
    };
    match edit {
        TraceEdit::Typed(text) => last.replacement.push_str(&text),
        TraceEdit::Backspace(removed) => {
            if !last.replacement.is_empty() && last.replacement.ends_with(&removed) {
                let keep = last.replacement.len() - removed.len();
                last.replacement.truncate(keep);
            } else {
                last.original.insert_str(0, &removed);
            }
        }
        TraceEdit::ForwardDelete(removed) => last.original.push_str(&removed),
        fresh @ TraceEdit::Fresh { .. } => traces.push(open_entry(fresh)),
    }
}

fn open_entry(edit: TraceEdit) -> EditTrace {
    match edit {
        TraceEdit::Typed(text) => EditTrace {
            original: String::new(),
            replacement: text,
        },
        TraceEdit::Backspace(removed) | TraceEdit::ForwardDelete(removed) => EditTrace {
            original: removed,
            replacement: String::new(),
        },
        TraceEdit::Fresh {
            original,
            replacement,
        } => EditTrace {
            original,
            replacement,
        },
    }
}

/// Join the non-empty originals and replacements of a trace with single spaces:
/// `(previous_text, result_text)`.
pub fn trace_texts(traces: &[EditTrace]) -> (String, String) {
    let previous = join_non_empty(traces.iter().map(|t| t.original.as_str()));
    let result = join_non_empty(traces.iter().map(|t| t.replacement.as_str()));
    (previous, result)
}

fn join_non_empty<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts.filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(s: &str) -> TraceEdit {
        TraceEdit::Typed(s.to_string())
    }

    #[test]
    fn typing_extends_replacement() {
        let mut traces = Vec::new();
        apply_trace_edit(&mut traces, typed("c"));
        apply_trace_edit(&mut traces, typed("a"));
        apply_trace_edit(&mut traces, typed("t"));
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].replacement, "cat");
        assert_eq!(traces[0].original, "");
    }

    #[test]
    fn backspace_prepends_forward_delete_appends() {
        let mut traces = Vec::new();
        apply_trace_edit(&mut traces, TraceEdit::Backspace("d".into()));
        apply_trace_edit(&mut traces, TraceEdit::Backspace("r".into()));
        apply_trace_edit(&mut traces, TraceEdit::ForwardDelete("s".into()));
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].original, "rds");
    }

    #[test]
    fn backspace_over_typed_text_trims_replacement() {
        let mut traces = Vec::new();
        apply_trace_edit(&mut traces, typed("helo"));
        apply_trace_edit(&mut traces, TraceEdit::Backspace("o".into()));
        apply_trace_edit(&mut traces, typed("lo"));
        assert_eq!(traces[0].replacement, "hello");
        assert_eq!(traces[0].original, "");
    }

    #[test]
    fn fresh_edit_opens_new_entry() {
        let mut traces = Vec::new();
        apply_trace_edit(&mut traces, typed("a"));
        apply_trace_edit(
            &mut traces,
            TraceEdit::Fresh {
                original: "old".into(),
                replacement: "new".into(),
            },
        );
        apply_trace_edit(&mut traces, typed("er"));
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[1].original, "old");
        assert_eq!(traces[1].replacement, "newer");
    }

    #[test]
    fn trace_texts_skip_empty_parts() {
        let traces = vec![
            EditTrace {
                original: "quick".into(),
                replacement: "".into(),
            },
            EditTrace {
                original: "".into(),
                replacement: "swift".into(),
            },
            EditTrace {
                original: "fox".into(),
                replacement: "hare".into(),
            },
        ];
        let (prev, result) = trace_texts(&traces);
        assert_eq!(prev, "quick fox");
        assert_eq!(result, "swift hare");
    }
}
