//! Translate a rewritten document back into position-exact edit operations.

use crate::chars::{diff_chars, ChangeKind};
use crate::position::PositionMap;
use serde::{Deserialize, Serialize};

/// Unchanged gaps at most this long between two edits are folded into one.
pub const DEFAULT_MERGE_GAP: usize = 2;

/// One replacement against the original text. Pure insertions have an empty
/// `original_text`, pure deletions an empty `replacement_text`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SmartEditDiff {
    pub original_text: String,
    pub replacement_text: String,
    /// Structural document position of the first affected character.
    pub position: usize,
    /// Flat-text char offset of the first affected character.
    pub offset: usize,
}

#[derive(Debug)]
struct Pending {
    start: usize,
    end: usize,
    original: String,
    replacement: String,
}

/// Edit operations turning `original` into `edited`, positioned through
/// `map`.
///
/// Returns an empty list when the map does not cover `original` exactly;
/// callers then fall back to a whole-document replacement.
pub fn compute_smart_edit_diffs(
    original: &str,
    edited: &str,
    map: &PositionMap,
    merge_gap: usize,
) -> Vec<SmartEditDiff> {
    let original_len = original.chars().count();
    if map.len() != original_len {
        tracing::warn!(
            map_len = map.len(),
            text_len = original_len,
            "position map does not match original text"
        );
        return Vec::new();
    }

    let original_chars: Vec<char> = original.chars().collect();
    let changes = diff_chars(original, edited);

    let mut ops: Vec<Pending> = Vec::new();
    let mut cursor = 0;
    let mut i = 0;
    while i < changes.len() {
        let change = &changes[i];
        match change.kind {
            ChangeKind::Unchanged => cursor += change.len(),
            ChangeKind::Removed => {
                let len = change.len();
                let replacement = match changes.get(i + 1) {
                    Some(next) if next.kind == ChangeKind::Added => {
                        i += 1;
                        next.text.clone()
                    }
                    _ => String::new(),
                };
                push_merged(
                    &mut ops,
                    Pending {
                        start: cursor,
                        end: cursor + len,
                        original: change.text.clone(),
                        replacement,
                    },
                    &original_chars,
                    merge_gap,
                );
                cursor += len;
            }
            ChangeKind::Added => push_merged(
                &mut ops,
                Pending {
                    start: cursor,
                    end: cursor,
                    original: String::new(),
                    replacement: change.text.clone(),
                },
                &original_chars,
                merge_gap,
            ),
        }
        i += 1;
    }

    ops.into_iter()
        .filter_map(|op| {
            Some(SmartEditDiff {
                position: map.position_at(op.start)?,
                offset: op.start,
                original_text: op.original,
                replacement_text: op.replacement,
            })
        })
        .collect()
}

fn push_merged(ops: &mut Vec<Pending>, op: Pending, original: &[char], merge_gap: usize) {
    if let Some(last) = ops.last_mut() {
        if op.start - last.end <= merge_gap {
            let gap: String = original[last.end..op.start].iter().collect();
            last.original.push_str(&gap);
            last.original.push_str(&op.original);
            last.replacement.push_str(&gap);
            last.replacement.push_str(&op.replacement);
            last.end = op.end;
            return;
        }
    }
    ops.push(op);
}

/// Apply diffs (by flat offset) to `original`. Diffs must not overlap.
pub fn apply_smart_edits(original: &str, diffs: &[SmartEditDiff]) -> String {
    let chars: Vec<char> = original.chars().collect();
    let mut sorted: Vec<&SmartEditDiff> = diffs.iter().collect();
    sorted.sort_by_key(|d| d.offset);

    let mut out = String::with_capacity(original.len());
    let mut cursor = 0;
    for diff in sorted {
        let start = diff.offset.min(chars.len()).max(cursor);
        out.extend(&chars[cursor..start]);
        out.push_str(&diff.replacement_text);
        cursor = (start + diff.original_text.chars().count()).min(chars.len());
    }
    out.extend(&chars[cursor..]);
    out
}

/// How a rewrite should be applied to the live document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditPlan {
    Unchanged,
    Surgical(Vec<SmartEditDiff>),
    /// The map could not be trusted; replace everything in one op.
    WholeDocument(SmartEditDiff),
}

/// Surgical edits when possible, a single whole-document replacement
/// otherwise.
pub fn plan_edits(original: &str, edited: &str, map: &PositionMap, merge_gap: usize) -> EditPlan {
    if original == edited {
        return EditPlan::Unchanged;
    }
    let diffs = compute_smart_edit_diffs(original, edited, map, merge_gap);
    if diffs.is_empty() {
        tracing::info!("falling back to whole-document replacement");
        return EditPlan::WholeDocument(SmartEditDiff {
            original_text: original.to_string(),
            replacement_text: edited.to_string(),
            position: 1,
            offset: 0,
        });
    }
    EditPlan::Surgical(diffs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diffs(original: &str, edited: &str) -> Vec<SmartEditDiff> {
        let map = PositionMap::from_flat_text(original);
        compute_smart_edit_diffs(original, edited, &map, DEFAULT_MERGE_GAP)
    }

    #[test]
    fn replacement_is_positioned_structurally() {
        let ops = diffs("The cat sat.", "The dog sat.");
        assert_eq!(
            ops,
            vec![SmartEditDiff {
                original_text: "cat".into(),
                replacement_text: "dog".into(),
                position: 5,
                offset: 4,
            }]
        );
    }

    #[test]
    fn pure_insertion_and_deletion() {
        let ins = diffs("Hello world", "Hello brave world");
        assert_eq!(ins.len(), 1);
        assert_eq!(ins[0].original_text, "");
        assert_eq!(ins[0].replacement_text, "brave ");
        assert_eq!(apply_smart_edits("Hello world", &ins), "Hello brave world");

        let del = diffs("Hello brave world", "Hello world");
        assert_eq!(del.len(), 1);
        assert_eq!(del[0].replacement_text, "");
        assert_eq!(del[0].original_text, "brave ");
    }

    #[test]
    fn insertion_at_end_maps_past_last_char() {
        let ops = diffs("Hi", "Hi there");
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].offset, 2);
        assert_eq!(ops[0].position, 3);
    }

    #[test]
    fn close_edits_merge_and_absorb_gap() {
        // "a" and "c" changed, one unchanged char between them
        let ops = diffs("abc", "xby");
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].original_text, "abc");
        assert_eq!(ops[0].replacement_text, "xby");
        assert_eq!(ops[0].offset, 0);
    }

    #[test]
    fn distant_edits_stay_separate() {
        let original = "one two three four";
        let edited = "ONE two three FOUR";
        let ops = diffs(original, edited);
        assert_eq!(ops.len(), 2);
        assert_eq!(apply_smart_edits(original, &ops), edited);
    }

    #[test]
    fn second_paragraph_positions_skip_separators() {
        let original = "First.\n\nSecond.";
        let ops = diffs(original, "First.\n\nThird.");
        assert_eq!(ops.len(), 1);
        assert_eq!(apply_smart_edits(original, &ops), "First.\n\nThird.");
        // flat offset 8 is 'S'; two separator slots push it to position 9
        assert_eq!(ops[0].offset, 8);
        assert_eq!(ops[0].position, 9);
    }

    #[test]
    fn map_mismatch_yields_nothing() {
        let map = PositionMap::from_flat_text("short");
        assert!(compute_smart_edit_diffs("much longer text", "x", &map, 2).is_empty());
    }

    #[test]
    fn round_trip_over_mixed_edits() {
        let cases = [
            ("The quick brown fox jumps over the lazy dog.", "A quick red fox leapt over the dog!"),
            ("abc", ""),
            ("", "fresh text"),
            ("Keep this.\n\nDrop that.\n\nKeep end.", "Keep this.\n\nKeep end."),
            ("aaaa bbbb cccc", "aaXa bYbb cccc dddd"),
            ("naïve café", "naive cafe au lait"),
            ("x y z", "z y x"),
        ];
        for (original, edited) in cases {
            let ops = diffs(original, edited);
            assert_eq!(apply_smart_edits(original, &ops), edited, "{original:?} -> {edited:?}");
        }
    }

    #[test]
    fn plan_falls_back_to_whole_document() {
        let stale = PositionMap::from_flat_text("stale");
        match plan_edits("current text", "new text", &stale, 2) {
            EditPlan::WholeDocument(op) => {
                assert_eq!(op.original_text, "current text");
                assert_eq!(op.replacement_text, "new text");
            }
            other => panic!("expected whole-document plan, got {other:?}"),
        }

        let map = PositionMap::from_flat_text("same");
        assert_eq!(plan_edits("same", "same", &map, 2), EditPlan::Unchanged);
        assert!(matches!(
            plan_edits("same", "sane", &map, 2),
            EditPlan::Surgical(ops) if ops.len() == 1
        ));
    }
}
