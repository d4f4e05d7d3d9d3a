use anyhow::Context;
use cowrite_diff::{diff_chars, plan_edits, ChangeKind, EditPlan, PositionMap, SmartEditDiff};
use std::path::Path;

pub struct DiffParams<'a> {
    pub original: &'a Path,
    pub edited: &'a Path,
    pub merge_gap: usize,
    pub chars: bool,
    pub json: bool,
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// Edit operations that turn `original` into `edited`.
pub fn edit_ops(original: &str, edited: &str, merge_gap: usize) -> Vec<SmartEditDiff> {
    let map = PositionMap::from_flat_text(original);
    match plan_edits(original, edited, &map, merge_gap) {
        EditPlan::Unchanged => Vec::new(),
        EditPlan::Surgical(ops) => ops,
        EditPlan::WholeDocument(op) => vec![op],
    }
}

/// `cowrite diff <original> <edited>`
pub fn execute(params: &DiffParams<'_>) -> anyhow::Result<()> {
    let original = read(params.original)?;
    let edited = read(params.edited)?;

    if params.chars {
        let changes = diff_chars(&original, &edited);
        if params.json {
            println!("{}", serde_json::to_string_pretty(&changes)?);
            return Ok(());
        }
        for change in &changes {
            let sign = match change.kind {
                ChangeKind::Unchanged => ' ',
                ChangeKind::Removed => '-',
                ChangeKind::Added => '+',
            };
            println!("{sign} {:?}", change.text);
        }
        return Ok(());
    }

    let ops = edit_ops(&original, &edited, params.merge_gap);
    if params.json {
        println!("{}", serde_json::to_string_pretty(&ops)?);
        return Ok(());
    }
    if ops.is_empty() {
        println!("(no changes)");
    }
    for op in &ops {
        println!(
            "@{} (offset {}): {:?} -> {:?}",
            op.position, op.offset, op.original_text, op.replacement_text
        );
    }
    Ok(())
}
