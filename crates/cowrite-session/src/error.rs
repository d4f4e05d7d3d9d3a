use crate::generation::GenerationError;
use cowrite_graph::GraphError;
use cowrite_ledger::LedgerError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("document is read-only while a generation request is in flight")]
    ReadOnly,

    #[error("offset {offset} is past the end of the document (length {len})")]
    OutOfBounds { offset: usize, len: usize },

    #[error("unknown diff: {0}")]
    UnknownDiff(String),

    #[error("diff {0} is no longer pending")]
    StaleDiff(String),

    #[error("diff {0} no longer matches the document")]
    DiffDrifted(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}
