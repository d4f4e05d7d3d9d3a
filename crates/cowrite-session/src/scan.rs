//! Document scan and request building for the generation service.

use crate::document::Document;
use cowrite_core::TextState;
use cowrite_diff::{PositionMap, TextRange};
use serde::{Deserialize, Serialize};

/// Structural position range `[from, to)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PositionRange {
    pub from: usize,
    pub to: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GapInfo {
    pub id: String,
    pub position: PositionRange,
    pub original_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConstraintInfo {
    pub text: String,
    pub position: PositionRange,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum GenerateMode {
    Regenerate,
    Selection,
    Continuation,
    SmartEdit,
}

impl GenerateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regenerate => "regenerate",
            Self::Selection => "selection",
            Self::Continuation => "continuation",
            Self::SmartEdit => "smart-edit",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub goal: String,
    /// Document text with `[GAP:<id>]` placeholders.
    pub document: String,
    pub gaps: Vec<GapInfo>,
    pub constraints: Vec<ConstraintInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_request: Option<String>,
    pub mode: GenerateMode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentScan {
    pub gaps: Vec<GapInfo>,
    pub constraints: Vec<ConstraintInfo>,
    pub document_with_gaps: String,
}

impl DocumentScan {
    /// Nothing is marked for regeneration.
    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty()
    }
}

/// Short random gap id.
fn new_gap_id() -> String {
    let id = ulid::Ulid::new().to_string().to_lowercase();
    id[id.len() - 8..].to_string()
}

fn placeholder(id: &str) -> String {
    format!("[GAP:{id}]")
}

fn positions(map: &PositionMap, range: TextRange) -> Option<PositionRange> {
    Some(PositionRange {
        from: map.position_at(range.from)?,
        to: map.position_at(range.to)?,
    })
}

/// Split the document into gaps (`marked-delete` runs) and constraints
/// (unmarked, preserved, user and AI text). `ai-pending` and
/// `original-removed` text is neither.
pub fn scan_document(doc: &Document) -> DocumentScan {
    let map = doc.position_map();
    let mut gap_ranges: Vec<(TextRange, String)> = Vec::new();
    let mut constraints = Vec::new();

    for (range, span) in doc.tagged_ranges() {
        match span.state {
            Some(TextState::MarkedDelete) => match gap_ranges.last_mut() {
                // Adjacent marked runs with different provenance form one gap.
                Some((last, text)) if last.to == range.from => {
                    last.to = range.to;
                    text.push_str(&span.text);
                }
                _ => gap_ranges.push((range, span.text)),
            },
            None
            | Some(TextState::MarkedPreserve)
            | Some(TextState::UserWritten)
            | Some(TextState::UserEdited)
            | Some(TextState::AiGenerated) => {
                if let Some(position) = positions(&map, range) {
                    constraints.push(ConstraintInfo {
                        text: span.text,
                        position,
                    });
                }
            }
            Some(TextState::AiPending) | Some(TextState::OriginalRemoved) => {}
        }
    }

    let text: Vec<char> = doc.text().chars().collect();
    let mut document_with_gaps = String::with_capacity(text.len());
    let mut gaps = Vec::new();
    let mut cursor = 0;
    for (range, original_text) in gap_ranges {
        let Some(position) = positions(&map, range) else {
            continue;
        };
        let id = new_gap_id();
        document_with_gaps.extend(&text[cursor..range.from]);
        document_with_gaps.push_str(&placeholder(&id));
        cursor = range.to;
        gaps.push(GapInfo {
            id,
            position,
            original_text,
        });
    }
    document_with_gaps.extend(&text[cursor..]);

    DocumentScan {
        gaps,
        constraints,
        document_with_gaps,
    }
}

pub fn build_request(
    goal: &str,
    scan: DocumentScan,
    mode: GenerateMode,
    user_request: Option<&str>,
) -> GenerateRequest {
    GenerateRequest {
        goal: goal.to_string(),
        document: scan.document_with_gaps,
        gaps: scan.gaps,
        constraints: scan.constraints,
        user_request: user_request.map(str::to_string),
        mode,
    }
}

/// Prompt-bar request: a non-empty `selection` becomes one gap in
/// `selection` mode; an empty one becomes an empty gap at the caret in
/// `continuation` mode.
pub fn build_prompt_bar_request(
    doc: &Document,
    goal: &str,
    prompt: &str,
    selection: TextRange,
) -> GenerateRequest {
    let map = doc.position_map();
    let text: Vec<char> = doc.text().chars().collect();
    let from = selection.from.min(text.len());
    let to = selection.to.clamp(from, text.len());
    let mode = if from == to {
        GenerateMode::Continuation
    } else {
        GenerateMode::Selection
    };

    let id = new_gap_id();
    let mut document: String = text[..from].iter().collect();
    document.push_str(&placeholder(&id));
    document.extend(&text[to..]);

    let position = positions(&map, TextRange::new(from, to)).unwrap_or(PositionRange {
        from: from + 1,
        to: to + 1,
    });
    GenerateRequest {
        goal: goal.to_string(),
        document,
        gaps: vec![GapInfo {
            id,
            position,
            original_text: text[from..to].iter().collect(),
        }],
        constraints: Vec::new(),
        user_request: Some(prompt.to_string()),
        mode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Tag;

    fn sample() -> Document {
        let mut doc = Document::from_text("Keep this. ", Some(Tag::user_written()));
        doc.insert(
            11,
            "Drop that.",
            Some(Tag::new(TextState::AiGenerated, Some("r-1"))),
        );
        doc.set_state(TextRange::new(11, 21), TextState::MarkedDelete, None);
        doc
    }

    #[test]
    fn marked_delete_becomes_gap_with_placeholder() {
        let scan = scan_document(&sample());
        assert_eq!(scan.gaps.len(), 1);
        let gap = &scan.gaps[0];
        assert_eq!(gap.id.len(), 8);
        assert_eq!(gap.original_text, "Drop that.");
        assert_eq!(gap.position, PositionRange { from: 12, to: 22 });
        assert_eq!(
            scan.document_with_gaps,
            format!("Keep this. [GAP:{}]", gap.id)
        );
        assert_eq!(scan.constraints.len(), 1);
        assert_eq!(scan.constraints[0].text, "Keep this. ");
    }

    #[test]
    fn adjacent_marked_runs_merge_into_one_gap() {
        let mut doc = Document::from_text("ab", Some(Tag::user_written()));
        doc.insert(2, "cd", Some(Tag::new(TextState::AiGenerated, Some("r-1"))));
        doc.set_state(TextRange::new(0, 4), TextState::MarkedDelete, None);
        let scan = scan_document(&doc);
        assert_eq!(scan.gaps.len(), 1);
        assert_eq!(scan.gaps[0].original_text, "abcd");
    }

    #[test]
    fn gaps_in_separate_paragraphs() {
        let mut doc = Document::from_text("One two.\n\nThree four.", Some(Tag::user_written()));
        doc.set_state(TextRange::new(4, 8), TextState::MarkedDelete, None);
        doc.set_state(TextRange::new(16, 21), TextState::MarkedDelete, None);
        let scan = scan_document(&doc);
        assert_eq!(scan.gaps.len(), 2);
        let expected = format!(
            "One [GAP:{}]\n\nThree [GAP:{}]",
            scan.gaps[0].id, scan.gaps[1].id
        );
        assert_eq!(scan.document_with_gaps, expected);
        assert_ne!(scan.gaps[0].id, scan.gaps[1].id);
    }

    #[test]
    fn nothing_marked_means_nothing_to_regenerate() {
        let doc = Document::from_text("All fine.", Some(Tag::user_written()));
        let scan = scan_document(&doc);
        assert!(scan.is_empty());
        assert_eq!(scan.document_with_gaps, "All fine.");
    }

    #[test]
    fn pending_text_is_not_a_constraint() {
        let doc = Document::from_text("maybe", Some(Tag::new(TextState::AiPending, None)));
        assert!(scan_document(&doc).constraints.is_empty());
    }

    #[test]
    fn prompt_bar_selection_and_continuation() {
        let doc = Document::from_text("Hello world", Some(Tag::user_written()));

        let req = build_prompt_bar_request(&doc, "g", "punchier", TextRange::new(6, 11));
        assert_eq!(req.mode, GenerateMode::Selection);
        assert_eq!(req.gaps[0].original_text, "world");
        assert_eq!(req.document, format!("Hello [GAP:{}]", req.gaps[0].id));
        assert_eq!(req.user_request.as_deref(), Some("punchier"));

        let req = build_prompt_bar_request(&doc, "g", "go on", TextRange::new(11, 11));
        assert_eq!(req.mode, GenerateMode::Continuation);
        assert_eq!(req.gaps[0].original_text, "");
        assert_eq!(req.gaps[0].position, PositionRange { from: 12, to: 12 });
    }

    #[test]
    fn request_wire_format() {
        let req = build_request("Write a toast", scan_document(&sample()), GenerateMode::Regenerate, None);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["mode"], "regenerate");
        assert!(json["gaps"][0]["originalText"].is_string());
        assert!(json.get("userRequest").is_none());
    }
}
