use cowrite_core::{Dimension, RoundId};
use std::collections::HashMap;

/// Accumulated-score cache owned by one graph.
///
/// Any structural change bumps `generation` and drops every entry; entries
/// are never patched individually.
#[derive(Debug, Default)]
pub(crate) struct MemoCache {
    entries: HashMap<(RoundId, Dimension), f64>,
    generation: u64,
}

impl MemoCache {
    pub(crate) fn get(&self, round_id: &str, dimension: Dimension) -> Option<f64> {
        // HashMap<(String, _)> can't be probed with (&str, _) without an owned key.
        self.entries
            .get(&(round_id.to_string(), dimension))
            .copied()
    }

    pub(crate) fn insert(&mut self, round_id: &str, dimension: Dimension, value: f64) {
        self.entries.insert((round_id.to_string(), dimension), value);
    }

    pub(crate) fn invalidate(&mut self) {
        self.entries.clear();
        self.generation += 1;
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }
}
