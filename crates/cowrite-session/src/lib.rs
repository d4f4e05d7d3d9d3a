//! Co-writing session engine.
//!
//! Everything that happens to one document between opening and export:
//! attributed text, click marking, inline-edit rounds, generation
//! requests and pending diffs, analysis passes, and snapshots.

pub mod analysis;
pub mod config;
pub mod debounce;
pub mod document;
pub mod error;
pub mod generation;
pub mod inline_edit;
pub mod machine;
pub mod marking;
pub mod paths;
pub mod persist;
pub mod scan;
pub mod session;

pub use analysis::{AnalysisReport, ChatMessage, MockAnalyzer, RoundAnalyzer, UserConstraint};
pub use config::SessionConfig;
pub use document::{AttributionSummary, Document, Span, Tag};
pub use error::SessionError;
pub use generation::{GenerateResponse, GenerationError, Generator, MockGenerator};
pub use inline_edit::EditKind;
pub use machine::{EditOutcome, TextStateMachine};
pub use marking::ClickResult;
pub use paths::CowritePaths;
pub use persist::SessionSnapshot;
pub use scan::{GenerateMode, GenerateRequest};
pub use session::{
    BatchResolution, GenerationOutcome, GoalChange, GoalSource, PreparedGeneration,
    RoundContribution, Session,
};
