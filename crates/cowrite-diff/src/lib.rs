pub mod boundaries;
pub mod chars;
pub mod pending;
pub mod position;
pub mod smart_edit;

pub use boundaries::{phrase_boundary, sentence_boundary, word_boundary, Granularity, TextRange};
pub use chars::{diff_chars, Change, ChangeKind};
pub use pending::{DiffEntry, DiffResolution, DiffState, PendingDiffs};
pub use position::{PositionMap, Slot};
pub use smart_edit::{
    apply_smart_edits, compute_smart_edit_diffs, plan_edits, EditPlan, SmartEditDiff,
    DEFAULT_MERGE_GAP,
};
