use cowrite_core::RoundId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("round {0} not found")]
    UnknownRound(RoundId),

    #[error("parent round {parent} does not exist (creating {child})")]
    UnknownParent { child: RoundId, parent: RoundId },

    #[error("parent round {0} listed more than once")]
    DuplicateParent(RoundId),

    #[error("round {0} is sealed and can no longer change")]
    Sealed(RoundId),

    #[error("round {0} is not an inline-edit round")]
    NotInlineEdit(RoundId),

    #[error("snapshot is inconsistent: {0}")]
    InvalidSnapshot(String),
}
