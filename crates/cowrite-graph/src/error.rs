use cowrite_core::{Dimension, RoundId};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("invalid round type: {0} (expected generation, alternative or inline-edit)")]
    InvalidRoundType(String),

    #[error("node {0} not found")]
    NodeNotFound(RoundId),

    #[error("node {0} already exists")]
    DuplicateNode(RoundId),

    #[error("{dimension} score {value} for {round_id} is outside [0, 1]")]
    ScoreOutOfRange {
        round_id: RoundId,
        dimension: Dimension,
        value: f64,
    },

    #[error("edge {from} -> {to} has strength {strength} outside [0, 1]")]
    EdgeStrengthOutOfRange {
        from: RoundId,
        to: RoundId,
        strength: f64,
    },
}
