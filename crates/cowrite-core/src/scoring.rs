//! Base-score functions: map a local editing fact to a score per dimension.
//!
//! All functions are pure. Graph-level inheritance lives in `cowrite-graph`.

use crate::types::{RoundType, TextState};

/// Composite weights for D1 (authorship), D2 (direction), D3 (curation).
pub const WEIGHT_D1: f64 = 0.35;
pub const WEIGHT_D2: f64 = 0.40;
pub const WEIGHT_D3: f64 = 0.25;

/// D1 (Authorship) base score from the mark state of the text.
///
/// | Mark State    | Round Type                         | D1  |
/// |---------------|------------------------------------|-----|
/// | user-written  | any                                | 1.0 |
/// | user-edited   | any                                | 0.5 |
/// | ai-generated  | generation                         | 0.0 |
/// | ai-generated  | alternative (with subsequent edit) | 0.5 |
/// | ai-generated  | alternative (no edit)              | 0.1 |
/// | anything else |                                    | 0.0 |
pub fn compute_d1_base(
    mark_state: TextState,
    round_type: Option<RoundType>,
    has_subsequent_edit: bool,
) -> f64 {
    match (mark_state, round_type) {
        (TextState::UserWritten, _) => 1.0,
        (TextState::UserEdited, _) => 0.5,
        (TextState::AiGenerated, Some(RoundType::Alternative)) => {
            if has_subsequent_edit {
                0.5
            } else {
                0.1
            }
        }
        _ => 0.0,
    }
}

/// Inputs for the D2 (Direction-Setting) base score.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectionInput {
    pub prompt_length: usize,
    pub constraint_count: usize,
    pub round_type: Option<RoundType>,
}

/// Constraints beyond this many add nothing.
const MAX_SCORED_CONSTRAINTS: usize = 3;

/// D2 (Direction-Setting) base score.
///
/// Alternative rounds start at 0.3. Prompt adds 0.1 below 15 chars, 0.3 for
/// 15..=50, 0.5 above 50. Each constraint adds 0.2 (max three). Capped at 1.0.
pub fn compute_d2_base(input: DirectionInput) -> f64 {
    let mut score = match input.round_type {
        Some(RoundType::Alternative) => 0.3,
        _ => 0.0,
    };

    score += match input.prompt_length {
        0 => 0.0,
        1..=14 => 0.1,
        15..=50 => 0.3,
        _ => 0.5,
    };

    score += input.constraint_count.min(MAX_SCORED_CONSTRAINTS) as f64 * 0.2;

    score.min(1.0)
}

/// How the user resolved an AI proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurationAction {
    Accepted,
    Edited,
    Rejected,
    AltSelected,
    AltSelectedEdited,
}

impl CurationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Edited => "edited",
            Self::Rejected => "rejected",
            Self::AltSelected => "alt-selected",
            Self::AltSelectedEdited => "alt-selected-edited",
        }
    }

    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "accepted" => Some(Self::Accepted),
            "edited" => Some(Self::Edited),
            "rejected" => Some(Self::Rejected),
            "alt-selected" => Some(Self::AltSelected),
            "alt-selected-edited" => Some(Self::AltSelectedEdited),
            _ => None,
        }
    }

    pub fn d3_score(&self) -> f64 {
        match self {
            Self::Accepted => 0.2,
            Self::Edited => 0.7,
            Self::Rejected => 1.0,
            Self::AltSelected => 0.6,
            Self::AltSelectedEdited => 0.8,
        }
    }
}

/// D3 (Curation) base score from a diff action string. Unknown actions score 0.
pub fn compute_d3_base(action: &str) -> f64 {
    CurationAction::parse(action)
        .map(|a| a.d3_score())
        .unwrap_or(0.0)
}

/// Weighted composite: `0.35*d1 + 0.40*d2 + 0.25*d3`.
pub fn compute_composite_score(d1: f64, d2: f64, d3: f64) -> f64 {
    WEIGHT_D1 * d1 + WEIGHT_D2 * d2 + WEIGHT_D3 * d3
}

/// Bucket a composite score into a 1..=5 contribution level.
/// Lower bounds are inclusive: 0.20 is level 2, 0.80 is level 5.
pub fn score_to_level(score: f64) -> u8 {
    if score < 0.2 {
        1
    } else if score < 0.4 {
        2
    } else if score < 0.6 {
        3
    } else if score < 0.8 {
        4
    } else {
        5
    }
}
