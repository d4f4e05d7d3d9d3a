use crate::error::GraphError;
use crate::memo::MemoCache;
use cowrite_core::scoring::{compute_composite_score, CurationAction};
use cowrite_core::{
    Dimension, DimensionScores, RoundAnalysis, RoundId, RoundNode, RoundNodeMetadata, RoundType,
};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

/// Serializable image of the graph. Nodes keep insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphSnapshot {
    pub nodes: Vec<RoundNode>,
}

/// One node per round, with per-dimension credit edges pointing at the
/// rounds it inherits from.
///
/// Accumulated scores are memoized in a cache owned by the graph. The cache
/// sits behind a `RefCell` so reads stay `&self`; a graph is meant to be
/// owned by one session and is not `Sync`.
#[derive(Debug, Default)]
pub struct ContributionGraph {
    nodes: Vec<RoundNode>,
    index: HashMap<RoundId, usize>,
    memo: RefCell<MemoCache>,
}

fn check_scores(round_id: &str, scores: &DimensionScores) -> Result<(), GraphError> {
    match scores.out_of_range() {
        Some((dimension, value)) => Err(GraphError::ScoreOutOfRange {
            round_id: round_id.to_string(),
            dimension,
            value,
        }),
        None => Ok(()),
    }
}

impl ContributionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the node for a freshly created round: base scores, no edges,
    /// no narrative.
    pub fn add_node(
        &mut self,
        round_id: &str,
        scores: DimensionScores,
        metadata: RoundNodeMetadata,
    ) -> Result<&RoundNode, GraphError> {
        if self.index.contains_key(round_id) {
            return Err(GraphError::DuplicateNode(round_id.to_string()));
        }
        check_scores(round_id, &scores)?;

        self.index.insert(round_id.to_string(), self.nodes.len());
        self.nodes.push(RoundNode {
            round_id: round_id.to_string(),
            scores,
            edges: Vec::new(),
            metadata,
            narrative: None,
        });
        self.memo.borrow_mut().invalidate();
        tracing::debug!(round = %round_id, "graph node added");
        Ok(&self.nodes[self.nodes.len() - 1])
    }

    /// Like [`add_node`](Self::add_node), for callers holding the wire form
    /// of the metadata. An unrecognized `type` is rejected.
    pub fn add_node_json(
        &mut self,
        round_id: &str,
        scores: DimensionScores,
        metadata: &serde_json::Value,
    ) -> Result<&RoundNode, GraphError> {
        let raw_type = metadata.get("type").and_then(|t| t.as_str()).unwrap_or("");
        let round_type: RoundType = raw_type
            .parse()
            .map_err(|_| GraphError::InvalidRoundType(raw_type.to_string()))?;

        let strings = |key: &str| -> Vec<String> {
            metadata
                .get(key)
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|i| i.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        };
        let text = |key: &str| metadata.get(key).and_then(|v| v.as_str()).map(str::to_string);

        let mut parsed = RoundNodeMetadata::new(round_type, &text("action").unwrap_or_default());
        parsed.prompt = text("prompt");
        parsed.constraints = strings("constraints");
        parsed.previous_text = text("previousText").or_else(|| text("previous_text"));
        parsed.result_text = text("resultText").or_else(|| text("result_text"));
        self.add_node(round_id, scores, parsed)
    }

    /// Replace a node's scores, edges and narrative with the refined values
    /// from an analysis pass. Metadata is kept.
    pub fn update_node_with_analysis(
        &mut self,
        round_id: &str,
        analysis: &RoundAnalysis,
    ) -> Result<(), GraphError> {
        let &i = self
            .index
            .get(round_id)
            .ok_or_else(|| GraphError::NodeNotFound(round_id.to_string()))?;
        check_scores(round_id, &analysis.scores)?;
        if let Some(edge) = analysis
            .edges
            .iter()
            .find(|e| !(0.0..=1.0).contains(&e.strength))
        {
            return Err(GraphError::EdgeStrengthOutOfRange {
                from: round_id.to_string(),
                to: edge.to.clone(),
                strength: edge.strength,
            });
        }

        let node = &mut self.nodes[i];
        node.scores = analysis.scores;
        node.edges = analysis.edges.clone();
        node.narrative = Some(analysis.narrative());
        self.memo.borrow_mut().invalidate();
        tracing::info!(
            round = %round_id,
            edges = analysis.edges.len(),
            "analysis applied to graph node"
        );
        Ok(())
    }

    /// Record how the user resolved the round's output. Until the node has
    /// been analyzed, its D3 base score follows the action.
    pub fn record_curation(
        &mut self,
        round_id: &str,
        action: CurationAction,
    ) -> Result<(), GraphError> {
        let &i = self
            .index
            .get(round_id)
            .ok_or_else(|| GraphError::NodeNotFound(round_id.to_string()))?;
        let node = &mut self.nodes[i];
        node.metadata.action = action.as_str().to_string();
        if node.narrative.is_none() {
            node.scores.d3 = action.d3_score();
        }
        self.memo.borrow_mut().invalidate();
        Ok(())
    }

    pub fn get_node(&self, round_id: &str) -> Option<&RoundNode> {
        self.index.get(round_id).map(|&i| &self.nodes[i])
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> &[RoundNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ── Scoring ──

    /// Own score blended with the strength-weighted average of the
    /// accumulated scores of the nodes this one points at.
    ///
    /// With total edge strength `S`, the own score weighs `1/(1+S)` and the
    /// inherited average `S/(1+S)`. A node without edges in `dimension` (or
    /// whose edges all have zero strength) keeps its own score. Re-entering
    /// a node already on the current path yields that node's own score. An
    /// unknown round scores 0.
    pub fn accumulated_score(&self, round_id: &str, dimension: Dimension) -> f64 {
        let mut in_progress = HashSet::new();
        self.accumulate(round_id, dimension, &mut in_progress).0
    }

    /// Returns the score and whether a cycle was cut below this node. A cut
    /// value depends on the path that reached it and is never cached.
    fn accumulate(
        &self,
        round_id: &str,
        dimension: Dimension,
        in_progress: &mut HashSet<RoundId>,
    ) -> (f64, bool) {
        let cached = self.memo.borrow().get(round_id, dimension);
        if let Some(value) = cached {
            return (value, false);
        }
        let Some(node) = self.get_node(round_id) else {
            return (0.0, false);
        };
        let own = node.scores.get(dimension);

        if !in_progress.insert(round_id.to_string()) {
            tracing::warn!(round = %round_id, %dimension, "cycle in contribution graph, using own score");
            return (own, true);
        }

        let mut total_strength = 0.0;
        let mut weighted = 0.0;
        let mut cut = false;
        for edge in node.edges_in(dimension) {
            let (score, edge_cut) = self.accumulate(&edge.to, dimension, in_progress);
            weighted += score * edge.strength;
            total_strength += edge.strength;
            cut |= edge_cut;
        }
        in_progress.remove(round_id);

        let result = if total_strength > 0.0 {
            let inherited = weighted / total_strength;
            let self_weight = 1.0 / (1.0 + total_strength);
            let inherit_weight = total_strength / (1.0 + total_strength);
            own * self_weight + inherited * inherit_weight
        } else {
            own
        };

        if !cut {
            self.memo.borrow_mut().insert(round_id, dimension, result);
        }
        (result, cut)
    }

    /// Accumulated scores for all three dimensions.
    pub fn accumulated_scores(&self, round_id: &str) -> DimensionScores {
        DimensionScores::new(
            self.accumulated_score(round_id, Dimension::D1),
            self.accumulated_score(round_id, Dimension::D2),
            self.accumulated_score(round_id, Dimension::D3),
        )
    }

    /// Weighted composite of the accumulated (not base) scores.
    pub fn composite_score(&self, round_id: &str) -> f64 {
        let s = self.accumulated_scores(round_id);
        compute_composite_score(s.d1, s.d2, s.d3)
    }

    pub fn cache_len(&self) -> usize {
        self.memo.borrow().len()
    }

    /// Bumped on every invalidation.
    pub fn cache_generation(&self) -> u64 {
        self.memo.borrow().generation()
    }

    pub fn clear_graph(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.memo.borrow_mut().invalidate();
    }

    // ── Snapshot ──

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.clone(),
        }
    }

    pub fn restore(snapshot: GraphSnapshot) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        for node in snapshot.nodes {
            if graph.index.contains_key(&node.round_id) {
                return Err(GraphError::DuplicateNode(node.round_id));
            }
            check_scores(&node.round_id, &node.scores)?;
            graph.index.insert(node.round_id.clone(), graph.nodes.len());
            graph.nodes.push(node);
        }
        Ok(graph)
    }
}
