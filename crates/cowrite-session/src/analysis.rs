//! Round-analysis service seam and the runner that feeds it.
//!
//! Each eligible round is sent at most once. Failures are logged and the
//! round keeps its base scores.

use cowrite_core::trace::trace_texts;
use cowrite_core::{RoundAnalysis, RoundId, RoundNode, RoundType};
use cowrite_graph::ContributionGraph;
use cowrite_ledger::RoundLedger;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserConstraint {
    #[serde(rename = "type")]
    pub constraint_type: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostAction {
    Accepted,
    Edited,
    Rejected,
}

impl PostAction {
    /// `edited` and `rejected` map through; anything else counts as accepted.
    pub fn from_action(action: &str) -> Self {
        match action {
            "edited" => Self::Edited,
            "rejected" => Self::Rejected,
            _ => Self::Accepted,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoundAnalysisRequest {
    pub round_id: RoundId,
    pub action_type: RoundType,
    pub previous_text: String,
    pub result_text: String,
    pub user_post_action: PostAction,
    pub recent_chat_history: Vec<ChatMessage>,
    pub user_constraints: Vec<UserConstraint>,
    pub parent_round_ids: Vec<RoundId>,
}

#[async_trait::async_trait]
pub trait RoundAnalyzer: Send + Sync {
    async fn analyze(&self, request: &RoundAnalysisRequest) -> anyhow::Result<RoundAnalysis>;
}

/// Mock analyzer for testing. Answers per round id; rounds without a
/// configured answer fail.
pub struct MockAnalyzer {
    results: std::sync::Mutex<HashMap<RoundId, RoundAnalysis>>,
    requests: std::sync::Mutex<Vec<RoundAnalysisRequest>>,
}

impl Default for MockAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAnalyzer {
    pub fn new() -> Self {
        Self {
            results: std::sync::Mutex::new(HashMap::new()),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn set_result(&self, analysis: RoundAnalysis) {
        self.results
            .lock()
            .unwrap()
            .insert(analysis.round_id.clone(), analysis);
    }

    pub fn requests(&self) -> Vec<RoundAnalysisRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RoundAnalyzer for MockAnalyzer {
    async fn analyze(&self, request: &RoundAnalysisRequest) -> anyhow::Result<RoundAnalysis> {
        self.requests.lock().unwrap().push(request.clone());
        self.results
            .lock()
            .unwrap()
            .get(&request.round_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no analysis configured for {}", request.round_id))
    }
}

/// Inputs that shape every request of one pass.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisSettings {
    pub min_inline_edit_chars: usize,
    pub max_recent_chat_messages: usize,
    pub timeout: Duration,
}

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisReport {
    pub applied: Vec<RoundId>,
    pub failed: Vec<RoundId>,
}

/// Remembers which rounds were already sent for analysis.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRunner {
    attempted: HashSet<RoundId>,
}

impl AnalysisRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn was_attempted(&self, round_id: &str) -> bool {
        self.attempted.contains(round_id)
    }

    /// Rounds that would be analyzed by the next pass, in graph order.
    pub fn eligible(
        &self,
        graph: &ContributionGraph,
        ledger: &RoundLedger,
        min_inline_edit_chars: usize,
    ) -> Vec<RoundId> {
        graph
            .nodes()
            .iter()
            .filter(|node| node.narrative.is_none())
            .filter(|node| !self.attempted.contains(&node.round_id))
            .filter(|node| analyzable(node, ledger, min_inline_edit_chars))
            .map(|node| node.round_id.clone())
            .collect()
    }

    /// Analyze every eligible round, one request at a time.
    pub async fn run(
        &mut self,
        analyzer: &dyn RoundAnalyzer,
        graph: &mut ContributionGraph,
        ledger: &RoundLedger,
        chat: &[ChatMessage],
        constraints: &[UserConstraint],
        settings: AnalysisSettings,
    ) -> AnalysisReport {
        let mut report = AnalysisReport::default();
        let pending = self.eligible(graph, ledger, settings.min_inline_edit_chars);
        let recent_start = chat.len().saturating_sub(settings.max_recent_chat_messages);

        for round_id in pending {
            self.attempted.insert(round_id.clone());
            let Some(node) = graph.get_node(&round_id) else {
                continue;
            };
            let request = build_request(node, ledger, &chat[recent_start..], constraints);

            let outcome = match tokio::time::timeout(settings.timeout, analyzer.analyze(&request)).await {
                Ok(Ok(analysis)) => graph
                    .update_node_with_analysis(&round_id, &analysis)
                    .map_err(anyhow::Error::from),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(anyhow::anyhow!(
                    "analysis timed out after {}s",
                    settings.timeout.as_secs()
                )),
            };
            match outcome {
                Ok(()) => report.applied.push(round_id),
                Err(e) => {
                    tracing::warn!(round = %round_id, error = %e, "round analysis failed");
                    report.failed.push(round_id);
                }
            }
        }
        report
    }
}

fn analyzable(node: &RoundNode, ledger: &RoundLedger, min_inline_edit_chars: usize) -> bool {
    match node.metadata.round_type {
        RoundType::Generation | RoundType::Alternative => node
            .metadata
            .result_text
            .as_deref()
            .is_some_and(|t| !t.is_empty()),
        RoundType::InlineEdit => ledger.get_round(&node.round_id).is_some_and(|round| {
            round.sealed
                && !round.edit_trace.is_empty()
                && round.trace_len() >= min_inline_edit_chars
        }),
    }
}

fn build_request(
    node: &RoundNode,
    ledger: &RoundLedger,
    recent_chat: &[ChatMessage],
    constraints: &[UserConstraint],
) -> RoundAnalysisRequest {
    let round = ledger.get_round(&node.round_id);
    let (previous_text, result_text) = match round {
        Some(round) if node.metadata.round_type == RoundType::InlineEdit => {
            trace_texts(&round.edit_trace)
        }
        _ => (
            node.metadata.previous_text.clone().unwrap_or_default(),
            node.metadata.result_text.clone().unwrap_or_default(),
        ),
    };
    RoundAnalysisRequest {
        round_id: node.round_id.clone(),
        action_type: node.metadata.round_type,
        previous_text,
        result_text,
        user_post_action: PostAction::from_action(&node.metadata.action),
        recent_chat_history: recent_chat.to_vec(),
        user_constraints: constraints.to_vec(),
        parent_round_ids: round.map(|r| r.parent_rounds.clone()).unwrap_or_default(),
    }
}
