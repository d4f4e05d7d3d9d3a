use serde::{Deserialize, Serialize};
use std::fmt;

/// Current schema version for snapshots.
pub const SCHEMA_VERSION: u32 = 1;

/// Round ID format: `r-<n>`, `n` starting at 1.
pub type RoundId = String;

/// Provenance event ID format: `evt_<ulid>`
pub type EventId = String;

/// Error returned when parsing one of the string-tagged enums below.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseTagError {
    #[error("unknown text state: {0}")]
    TextState(String),
    #[error("invalid round type: \"{0}\" (expected generation, alternative or inline-edit)")]
    RoundType(String),
    #[error("unknown dimension: {0} (expected d1, d2 or d3)")]
    Dimension(String),
}

// ── TextState ──

/// Authorship tag attached to a document span.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum TextState {
    UserWritten,
    AiGenerated,
    AiPending,
    UserEdited,
    MarkedPreserve,
    MarkedDelete,
    OriginalRemoved,
}

impl TextState {
    pub const ALL: [TextState; 7] = [
        TextState::UserWritten,
        TextState::AiGenerated,
        TextState::AiPending,
        TextState::UserEdited,
        TextState::MarkedPreserve,
        TextState::MarkedDelete,
        TextState::OriginalRemoved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserWritten => "user-written",
            Self::AiGenerated => "ai-generated",
            Self::AiPending => "ai-pending",
            Self::UserEdited => "user-edited",
            Self::MarkedPreserve => "marked-preserve",
            Self::MarkedDelete => "marked-delete",
            Self::OriginalRemoved => "original-removed",
        }
    }
}

impl fmt::Display for TextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TextState {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TextState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| ParseTagError::TextState(s.to_string()))
    }
}

// ── RoundType ──

/// Kind of editing event recorded as a round.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum RoundType {
    Generation,
    Alternative,
    InlineEdit,
}

impl RoundType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generation => "generation",
            Self::Alternative => "alternative",
            Self::InlineEdit => "inline-edit",
        }
    }
}

impl fmt::Display for RoundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RoundType {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generation" => Ok(Self::Generation),
            "alternative" => Ok(Self::Alternative),
            "inline-edit" => Ok(Self::InlineEdit),
            other => Err(ParseTagError::RoundType(other.to_string())),
        }
    }
}

// ── Dimension ──

/// Contribution axis: D1 authorship, D2 direction-setting, D3 curation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    D1,
    D2,
    D3,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::D1, Dimension::D2, Dimension::D3];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::D1 => "d1",
            Self::D2 => "d2",
            Self::D3 => "d3",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Dimension {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "d1" => Ok(Self::D1),
            "d2" => Ok(Self::D2),
            "d3" => Ok(Self::D3),
            _ => Err(ParseTagError::Dimension(s.to_string())),
        }
    }
}

/// Per-dimension scores, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct DimensionScores {
    pub d1: f64,
    pub d2: f64,
    pub d3: f64,
}

impl DimensionScores {
    pub fn new(d1: f64, d2: f64, d3: f64) -> Self {
        Self { d1, d2, d3 }
    }

    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::D1 => self.d1,
            Dimension::D2 => self.d2,
            Dimension::D3 => self.d3,
        }
    }

    /// First dimension whose score is NaN or outside `[0, 1]`.
    pub fn out_of_range(&self) -> Option<(Dimension, f64)> {
        Dimension::ALL
            .into_iter()
            .map(|d| (d, self.get(d)))
            .find(|(_, v)| !(0.0..=1.0).contains(v))
    }
}

// ── Rounds ──

/// Counters of how the user resolved the diffs produced by a round.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffActionCounts {
    pub accepted: u32,
    pub rejected: u32,
    pub edited: u32,
}

/// One contiguous inline edit: what was there, what replaced it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EditTrace {
    pub original: String,
    pub replacement: String,
}

/// One attributable editing event. Owned by the round ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Round {
    pub round_id: RoundId,
    pub round_number: u64,
    #[serde(rename = "type")]
    pub round_type: RoundType,
    pub ts: String,
    #[serde(default)]
    pub parent_rounds: Vec<RoundId>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub prompt_length: usize,
    #[serde(default)]
    pub constraint_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraint_types: Vec<String>,
    #[serde(default)]
    pub generation_mode: String,
    #[serde(default)]
    pub diff_actions: DiffActionCounts,
    /// Provenance event ids that produced this round.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<EventId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edit_trace: Vec<EditTrace>,
    /// Set once the round is finalized; a sealed round no longer takes trace edits.
    #[serde(default)]
    pub sealed: bool,
}

impl Round {
    /// Total characters touched by the edit trace (originals + replacements).
    pub fn trace_len(&self) -> usize {
        self.edit_trace
            .iter()
            .map(|t| t.original.chars().count() + t.replacement.chars().count())
            .sum()
    }
}

// ── Contribution graph entities ──

/// Weighted credit-inheritance link from a node to an earlier round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub to: RoundId,
    pub dimension: Dimension,
    pub strength: f64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundNodeMetadata {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub action: String,
    #[serde(rename = "type")]
    pub round_type: RoundType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_text: Option<String>,
}

impl RoundNodeMetadata {
    pub fn new(round_type: RoundType, action: &str) -> Self {
        Self {
            prompt: None,
            constraints: Vec::new(),
            action: action.to_string(),
            round_type,
            previous_text: None,
            result_text: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Narrative {
    pub concepts_preserved: Vec<String>,
    pub concepts_added: Vec<String>,
    pub concepts_lost: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundNode {
    pub round_id: RoundId,
    pub scores: DimensionScores,
    #[serde(default)]
    pub edges: Vec<Edge>,
    pub metadata: RoundNodeMetadata,
    #[serde(default)]
    pub narrative: Option<Narrative>,
}

impl RoundNode {
    pub fn edges_in(&self, dimension: Dimension) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.dimension == dimension)
    }
}

/// Refined scores and edges returned by the round-analysis service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoundAnalysis {
    pub round_id: RoundId,
    pub scores: DimensionScores,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub concepts_preserved: Vec<String>,
    #[serde(default)]
    pub concepts_added: Vec<String>,
    #[serde(default)]
    pub concepts_lost: Vec<String>,
    #[serde(default)]
    pub narrative_summary: String,
}

impl RoundAnalysis {
    pub fn narrative(&self) -> Narrative {
        Narrative {
            concepts_preserved: self.concepts_preserved.clone(),
            concepts_added: self.concepts_added.clone(),
            concepts_lost: self.concepts_lost.clone(),
            summary: self.narrative_summary.clone(),
        }
    }
}
