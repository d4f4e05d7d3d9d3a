//! One co-writing session: the attributed document plus everything that
//! explains how it got that way.
//!
//! A [`Session`] owns the document, round ledger, contribution graph,
//! pending diffs and provenance log, and is the only place they are
//! mutated together. While a generation request is in flight the document
//! is read-only; a newer request cancels the older one, whose response is
//! then discarded.

use crate::analysis::{
    AnalysisReport, AnalysisRunner, AnalysisSettings, ChatMessage, RoundAnalyzer, UserConstraint,
};
use crate::config::SessionConfig;
use crate::document::{AttributionSummary, Document, Tag};
use crate::error::SessionError;
use crate::generation::{run_generation, GenerateResponse, GenerationError, Generator};
use crate::inline_edit::EditKind;
use crate::machine::{EditContext, EditOutcome, TextStateMachine};
use crate::marking::ClickResult;
use crate::persist::{self, SessionSnapshot};
use crate::scan::{
    build_prompt_bar_request, build_request, scan_document, GapInfo, GenerateMode, GenerateRequest,
};
use cowrite_core::event::{now_rfc3339, EventType, ProvenanceLog};
use cowrite_core::scoring::{
    compute_composite_score, compute_d1_base, compute_d2_base, score_to_level, CurationAction,
    DirectionInput,
};
use cowrite_core::{
    DimensionScores, EventId, RoundId, RoundNodeMetadata, RoundType, TextState, SCHEMA_VERSION,
};
use cowrite_diff::{
    plan_edits, DiffEntry, DiffResolution, DiffState, EditPlan, PendingDiffs, TextRange,
};
use cowrite_graph::ContributionGraph;
use cowrite_ledger::{CreateRoundParams, RoundLedger};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

// ── Goal ──

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GoalSource {
    Manual,
    Process2,
    Inferred,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoalChange {
    pub previous_goal: String,
    pub new_goal: String,
    pub source: GoalSource,
    pub ts: String,
}

// ── Generation handles ──

/// A generation request ready to send. Hand it to [`run_generation`] and
/// pass the result back to [`Session::finish_generation`].
#[derive(Debug, Clone)]
pub struct PreparedGeneration {
    pub id: u64,
    pub request: GenerateRequest,
    pub cancel: CancellationToken,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
struct InFlight {
    id: u64,
    cancel: CancellationToken,
    request: GenerateRequest,
    events: Vec<EventId>,
}

/// What a finished generation did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Replacements waiting for accept/reject.
    Proposed {
        round_id: RoundId,
        diff_ids: Vec<String>,
    },
    /// Continuation text inserted directly.
    Inserted { round_id: RoundId, range: TextRange },
    /// The rewrite matched the current text.
    Unchanged,
}

/// What a bulk resolve did, by diff id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResolution {
    pub resolved: Vec<String>,
    pub drifted: Vec<String>,
}

/// Base and inherited scores of one round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundContribution {
    pub round_id: RoundId,
    pub round_type: RoundType,
    pub action: String,
    pub base: DimensionScores,
    pub accumulated: DimensionScores,
    pub composite: f64,
    pub level: u8,
}

pub struct Session {
    id: String,
    created_at: String,
    config: SessionConfig,
    goal: String,
    goal_history: Vec<GoalChange>,
    document: Document,
    ledger: RoundLedger,
    graph: ContributionGraph,
    machine: TextStateMachine,
    diffs: PendingDiffs,
    log: ProvenanceLog,
    chat: Vec<ChatMessage>,
    constraints: Vec<UserConstraint>,
    analysis: AnalysisRunner,
    in_flight: Option<InFlight>,
    next_request: u64,
}

fn new_session_id() -> String {
    format!("ses_{}", ulid::Ulid::new().to_string().to_lowercase())
}

/// Structural position of the character at flat `offset`. Separators take
/// two slots each, so this holds across paragraph breaks.
fn position_after(offset: usize) -> usize {
    offset + 1
}

impl Session {
    pub fn new(goal: &str, config: SessionConfig) -> Self {
        Self {
            id: new_session_id(),
            created_at: now_rfc3339(),
            machine: TextStateMachine::new(config.debounce()),
            config,
            goal: goal.to_string(),
            goal_history: Vec::new(),
            document: Document::new(),
            ledger: RoundLedger::new(),
            graph: ContributionGraph::new(),
            diffs: PendingDiffs::new(),
            log: ProvenanceLog::new(),
            chat: Vec::new(),
            constraints: Vec::new(),
            analysis: AnalysisRunner::new(),
            in_flight: None,
            next_request: 0,
        }
    }

    /// Start from text the user brought with them.
    pub fn with_text(goal: &str, text: &str, config: SessionConfig) -> Self {
        let mut session = Self::new(goal, config);
        session.document = Document::from_text(text, Some(Tag::user_written()));
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn goal_history(&self) -> &[GoalChange] {
        &self.goal_history
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn text(&self) -> String {
        self.document.text()
    }

    pub fn ledger(&self) -> &RoundLedger {
        &self.ledger
    }

    pub fn graph(&self) -> &ContributionGraph {
        &self.graph
    }

    pub fn diffs(&self) -> &PendingDiffs {
        &self.diffs
    }

    pub fn provenance(&self) -> &ProvenanceLog {
        &self.log
    }

    /// Edits are refused while a generation request is outstanding.
    pub fn is_read_only(&self) -> bool {
        self.in_flight.is_some()
    }

    fn split(&mut self) -> (&mut TextStateMachine, EditContext<'_>) {
        (
            &mut self.machine,
            EditContext {
                document: &mut self.document,
                ledger: &mut self.ledger,
                graph: &mut self.graph,
                log: &mut self.log,
            },
        )
    }

    fn writable(&self) -> Result<(), SessionError> {
        if self.is_read_only() {
            return Err(SessionError::ReadOnly);
        }
        Ok(())
    }

    // ── Goal, chat, constraints ──

    pub fn set_goal(&mut self, new_goal: &str, source: GoalSource) {
        if new_goal == self.goal {
            return;
        }
        let change = GoalChange {
            previous_goal: std::mem::replace(&mut self.goal, new_goal.to_string()),
            new_goal: new_goal.to_string(),
            source,
            ts: now_rfc3339(),
        };
        self.log.log(
            EventType::GoalChanged,
            json!({
                "previousGoal": change.previous_goal,
                "newGoal": change.new_goal,
                "source": source,
            }),
        );
        tracing::info!(source = ?source, "goal changed");
        self.goal_history.push(change);
    }

    pub fn add_chat_message(&mut self, role: &str, content: &str) {
        self.chat.push(ChatMessage {
            role: role.to_string(),
            content: content.to_string(),
        });
    }

    pub fn add_constraint(&mut self, constraint_type: &str, text: &str) {
        self.constraints.push(UserConstraint {
            constraint_type: constraint_type.to_string(),
            text: text.to_string(),
        });
    }

    fn constraint_types(&self) -> Vec<String> {
        self.constraints
            .iter()
            .map(|c| c.constraint_type.clone())
            .collect()
    }

    // ── Marks ──

    pub fn mark(&mut self, range: TextRange, state: TextState) -> Result<bool, SessionError> {
        self.writable()?;
        let (machine, mut ctx) = self.split();
        Ok(machine.apply(&mut ctx, range, state))
    }

    pub fn unmark(&mut self, range: TextRange) -> Result<usize, SessionError> {
        self.writable()?;
        Ok(self.document.unmark(range))
    }

    pub fn click(&mut self, offset: usize) -> Result<Option<ClickResult>, SessionError> {
        self.writable()?;
        let (machine, mut ctx) = self.split();
        Ok(machine.click(&mut ctx, offset))
    }

    // ── Text edits ──

    pub fn type_text(
        &mut self,
        offset: usize,
        text: &str,
        now: Instant,
    ) -> Result<EditOutcome, SessionError> {
        self.edit(EditKind::Type, TextRange::new(offset, offset), text, now)
    }

    /// Delete the character before `offset`.
    pub fn backspace(&mut self, offset: usize, now: Instant) -> Result<EditOutcome, SessionError> {
        if offset == 0 {
            self.writable()?;
            return Ok(EditOutcome {
                round_id: None,
                cursor: 0,
                fixed_up: 0,
            });
        }
        self.edit(EditKind::Backspace, TextRange::new(offset - 1, offset), "", now)
    }

    /// Delete the character at `offset`.
    pub fn forward_delete(
        &mut self,
        offset: usize,
        now: Instant,
    ) -> Result<EditOutcome, SessionError> {
        self.edit(EditKind::ForwardDelete, TextRange::new(offset, offset + 1), "", now)
    }

    pub fn replace_text(
        &mut self,
        range: TextRange,
        text: &str,
        now: Instant,
    ) -> Result<EditOutcome, SessionError> {
        self.edit(EditKind::Replace, range, text, now)
    }

    /// Paste through a path that skips attribution; the safety net tags it.
    pub fn paste_untracked(&mut self, offset: usize, text: &str) -> Result<usize, SessionError> {
        self.writable()?;
        let len = self.document.len();
        if offset > len {
            return Err(SessionError::OutOfBounds { offset, len });
        }
        let (machine, mut ctx) = self.split();
        let fixed = machine.insert_untracked(&mut ctx, offset, text);
        self.diffs
            .shift_from(position_after(offset), text.chars().count() as isize);
        Ok(fixed)
    }

    fn edit(
        &mut self,
        kind: EditKind,
        range: TextRange,
        text: &str,
        now: Instant,
    ) -> Result<EditOutcome, SessionError> {
        self.writable()?;
        let (machine, mut ctx) = self.split();
        let outcome = machine.edit(&mut ctx, kind, range, text, now)?;
        let delta = text.chars().count() as isize - range.len() as isize;
        if delta != 0 {
            self.diffs.shift_from(position_after(range.to), delta);
        }
        Ok(outcome)
    }

    /// Seal the open inline-edit round once its debounce window has passed.
    pub fn tick(&mut self, now: Instant) -> Result<Option<RoundId>, SessionError> {
        let (machine, mut ctx) = self.split();
        machine.tick(&mut ctx, now)
    }

    /// Seal the open inline-edit round immediately.
    pub fn flush(&mut self) -> Result<Option<RoundId>, SessionError> {
        let (machine, mut ctx) = self.split();
        machine.flush(&mut ctx)
    }

    // ── Generation ──

    /// Regenerate every `marked-delete` run. `None` when nothing is marked.
    pub fn prepare_regenerate(&mut self) -> Result<Option<PreparedGeneration>, SessionError> {
        let scan = scan_document(&self.document);
        if scan.is_empty() {
            tracing::debug!("nothing marked for regeneration");
            return Ok(None);
        }
        let request = build_request(&self.goal, scan, GenerateMode::Regenerate, None);
        self.begin_generation(request, Vec::new()).map(Some)
    }

    /// Prompt-bar request over `selection`; an empty selection continues
    /// the text at the caret.
    pub fn prepare_prompt_request(
        &mut self,
        prompt: &str,
        selection: TextRange,
    ) -> Result<PreparedGeneration, SessionError> {
        let request = build_prompt_bar_request(&self.document, &self.goal, prompt, selection);
        let event = self.log.log(
            EventType::PromptRequest,
            json!({
                "prompt": prompt,
                "from": selection.from,
                "to": selection.to,
                "mode": request.mode,
            }),
        );
        self.begin_generation(request, vec![event])
    }

    /// Ask for a rewrite of the whole document following `instruction`.
    pub fn prepare_smart_edit(
        &mut self,
        instruction: &str,
    ) -> Result<PreparedGeneration, SessionError> {
        let scan = scan_document(&self.document);
        let mut request = build_request(&self.goal, scan, GenerateMode::SmartEdit, Some(instruction));
        request.document = self.document.text();
        let event = self.log.log(
            EventType::PromptRequest,
            json!({ "prompt": instruction, "mode": GenerateMode::SmartEdit }),
        );
        self.begin_generation(request, vec![event])
    }

    fn begin_generation(
        &mut self,
        request: GenerateRequest,
        mut events: Vec<EventId>,
    ) -> Result<PreparedGeneration, SessionError> {
        self.flush()?;
        if let Some(previous) = self.in_flight.take() {
            previous.cancel.cancel();
            tracing::info!(request = previous.id, "superseded in-flight generation");
        }

        self.next_request += 1;
        let id = self.next_request;
        let cancel = CancellationToken::new();
        events.push(self.log.log(
            EventType::AiGenerationRequested,
            json!({
                "requestId": id,
                "mode": request.mode,
                "gaps": request.gaps.len(),
                "constraints": request.constraints.len(),
            }),
        ));
        self.in_flight = Some(InFlight {
            id,
            cancel: cancel.clone(),
            request: request.clone(),
            events,
        });
        tracing::debug!(request = id, mode = request.mode.as_str(), "generation requested");
        Ok(PreparedGeneration {
            id,
            request,
            cancel,
            timeout: self.config.generation_timeout(),
        })
    }

    /// Drop the outstanding request, if any, and make the document writable.
    pub fn cancel_generation(&mut self) -> bool {
        match self.in_flight.take() {
            Some(flight) => {
                flight.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Apply the result of request `id`. Results of superseded requests are
    /// discarded with [`GenerationError::Aborted`].
    pub fn finish_generation(
        &mut self,
        id: u64,
        result: Result<GenerateResponse, GenerationError>,
    ) -> Result<GenerationOutcome, SessionError> {
        let flight = match self.in_flight.take() {
            Some(flight) if flight.id == id => flight,
            other => {
                self.in_flight = other;
                tracing::debug!(request = id, "discarding stale generation result");
                return Err(GenerationError::Aborted.into());
            }
        };

        let response = result.inspect_err(|e| {
            tracing::warn!(request = id, error = %e, retryable = e.retryable(), "generation failed");
        })?;

        match (flight.request.mode, response) {
            (GenerateMode::Continuation, GenerateResponse::Gaps { gaps }) => {
                let text = gaps
                    .into_iter()
                    .find(|g| flight.request.gaps.iter().any(|info| info.id == g.id))
                    .map(|g| g.text)
                    .unwrap_or_default();
                self.insert_continuation(&flight, &text)
            }
            (GenerateMode::Regenerate | GenerateMode::Selection, GenerateResponse::Gaps { gaps }) => {
                let fills: Vec<(&GapInfo, String)> = flight
                    .request
                    .gaps
                    .iter()
                    .filter_map(|info| {
                        let fill = gaps.iter().find(|g| g.id == info.id);
                        if fill.is_none() {
                            tracing::warn!(gap = %info.id, "response left a gap unfilled");
                        }
                        fill.map(|g| (info, g.text.clone()))
                    })
                    .collect();
                self.propose_fills(&flight, &fills)
            }
            (GenerateMode::SmartEdit, GenerateResponse::SmartEdit { edited_document }) => {
                self.propose_rewrite(&flight, &edited_document)
            }
            (mode, _) => Err(GenerationError::Service {
                message: format!("response shape does not match {} request", mode.as_str()),
                retryable: false,
            }
            .into()),
        }
    }

    async fn drive(
        &mut self,
        generator: &dyn Generator,
        prepared: PreparedGeneration,
    ) -> Result<GenerationOutcome, SessionError> {
        let result = run_generation(
            generator,
            &prepared.request,
            prepared.timeout,
            prepared.cancel.clone(),
        )
        .await;
        self.finish_generation(prepared.id, result)
    }

    pub async fn regenerate(
        &mut self,
        generator: &dyn Generator,
    ) -> Result<Option<GenerationOutcome>, SessionError> {
        match self.prepare_regenerate()? {
            Some(prepared) => self.drive(generator, prepared).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn prompt_request(
        &mut self,
        generator: &dyn Generator,
        prompt: &str,
        selection: TextRange,
    ) -> Result<GenerationOutcome, SessionError> {
        let prepared = self.prepare_prompt_request(prompt, selection)?;
        self.drive(generator, prepared).await
    }

    pub async fn smart_edit(
        &mut self,
        generator: &dyn Generator,
        instruction: &str,
    ) -> Result<GenerationOutcome, SessionError> {
        let prepared = self.prepare_smart_edit(instruction)?;
        self.drive(generator, prepared).await
    }

    /// Ledger round and graph node for a generation response.
    fn open_generation_round(
        &mut self,
        flight: &InFlight,
        parents: Vec<RoundId>,
        previous_text: String,
        result_text: String,
    ) -> Result<RoundId, SessionError> {
        let request = &flight.request;
        let parent_refs: Vec<&str> = parents
            .iter()
            .filter(|p| self.ledger.get_round(p).is_some())
            .map(String::as_str)
            .collect();
        let mut params = CreateRoundParams::new(RoundType::Generation)
            .with_parents(&parent_refs)
            .with_constraints(self.constraint_types())
            .with_mode(request.mode.as_str());
        if let Some(prompt) = request.user_request.as_deref() {
            params = params.with_prompt(prompt);
        }
        let round = self.ledger.create_round(params)?;
        let round_id = round.round_id.clone();

        let scores = DimensionScores::new(
            compute_d1_base(TextState::AiGenerated, Some(RoundType::Generation), false),
            compute_d2_base(DirectionInput {
                prompt_length: round.prompt_length,
                constraint_count: round.constraint_count,
                round_type: Some(RoundType::Generation),
            }),
            0.0,
        );
        let mut metadata = RoundNodeMetadata::new(RoundType::Generation, "");
        metadata.prompt = request.user_request.clone();
        metadata.constraints = self.constraints.iter().map(|c| c.text.clone()).collect();
        metadata.previous_text = Some(previous_text);
        metadata.result_text = Some(result_text);
        self.graph.add_node(&round_id, scores, metadata)?;

        let received = self.log.log(
            EventType::AiGenerationReceived,
            json!({ "requestId": flight.id, "roundId": round_id, "mode": request.mode }),
        );
        for event in flight.events.iter().cloned().chain(std::iter::once(received)) {
            self.ledger.attach_event(&round_id, event)?;
        }
        Ok(round_id)
    }

    fn propose_fills(
        &mut self,
        flight: &InFlight,
        fills: &[(&GapInfo, String)],
    ) -> Result<GenerationOutcome, SessionError> {
        if fills.is_empty() {
            return Err(GenerationError::Service {
                message: "response filled no gaps".into(),
                retryable: true,
            }
            .into());
        }

        let map = self.document.position_map();
        let mut parents: Vec<RoundId> = Vec::new();
        for (gap, _) in fills {
            if let Some(from) = map.slot_offset(gap.position.from) {
                let range = TextRange::new(from, from + gap.original_text.chars().count());
                for round in self.document.rounds_in(range) {
                    if !parents.contains(&round) {
                        parents.push(round);
                    }
                }
            }
        }
        let previous: Vec<&str> = fills.iter().map(|(g, _)| g.original_text.as_str()).collect();
        let results: Vec<&str> = fills.iter().map(|(_, text)| text.as_str()).collect();
        let round_id =
            self.open_generation_round(flight, parents, previous.join(" "), results.join(" "))?;

        let diff_ids = fills
            .iter()
            .map(|(gap, text)| {
                self.diffs
                    .add(&gap.original_text, text, gap.position.from, Some(&round_id))
            })
            .collect();
        Ok(GenerationOutcome::Proposed { round_id, diff_ids })
    }

    fn insert_continuation(
        &mut self,
        flight: &InFlight,
        text: &str,
    ) -> Result<GenerationOutcome, SessionError> {
        if text.is_empty() {
            return Err(GenerationError::Service {
                message: "continuation came back empty".into(),
                retryable: true,
            }
            .into());
        }
        let map = self.document.position_map();
        let offset = flight
            .request
            .gaps
            .first()
            .and_then(|gap| map.slot_offset(gap.position.from))
            .unwrap_or(self.document.len());
        let parents = self
            .document
            .rounds_in(TextRange::new(offset.saturating_sub(1), offset + 1));
        let round_id = self.open_generation_round(flight, parents, String::new(), text.to_string())?;

        self.document.insert(
            offset,
            text,
            Some(Tag::new(TextState::AiGenerated, Some(&round_id))),
        );
        let added = text.chars().count();
        self.diffs.shift_from(position_after(offset), added as isize);
        self.ledger
            .record_diff_action(&round_id, CurationAction::Accepted)?;
        self.graph
            .record_curation(&round_id, CurationAction::Accepted)?;
        Ok(GenerationOutcome::Inserted {
            round_id,
            range: TextRange::new(offset, offset + added),
        })
    }

    fn propose_rewrite(
        &mut self,
        flight: &InFlight,
        edited: &str,
    ) -> Result<GenerationOutcome, SessionError> {
        let original = self.document.text();
        let map = self.document.position_map();
        let ops = match plan_edits(&original, edited, &map, self.config.merge_gap_chars) {
            EditPlan::Unchanged => return Ok(GenerationOutcome::Unchanged),
            EditPlan::Surgical(ops) => ops,
            EditPlan::WholeDocument(op) => vec![op],
        };

        let mut parents: Vec<RoundId> = Vec::new();
        for op in &ops {
            let range = TextRange::new(op.offset, op.offset + op.original_text.chars().count());
            for round in self.document.rounds_in(range) {
                if !parents.contains(&round) {
                    parents.push(round);
                }
            }
        }
        let round_id =
            self.open_generation_round(flight, parents, original, edited.to_string())?;

        let diff_ids = ops
            .iter()
            .map(|op| {
                self.diffs.add(
                    &op.original_text,
                    &op.replacement_text,
                    op.position,
                    Some(&round_id),
                )
            })
            .collect();
        Ok(GenerationOutcome::Proposed { round_id, diff_ids })
    }

    // ── Diff resolution ──

    /// Flat range the diff's original text occupies now, if it still does.
    fn locate(&self, entry: &DiffEntry) -> Result<TextRange, SessionError> {
        let map = self.document.position_map();
        let from = map
            .slot_offset(entry.position)
            .ok_or_else(|| SessionError::DiffDrifted(entry.id.clone()))?;
        let range = TextRange::new(from, from + entry.original_text.chars().count());
        if range.to > self.document.len() || self.document.slice(range) != entry.original_text {
            return Err(SessionError::DiffDrifted(entry.id.clone()));
        }
        Ok(range)
    }

    /// Accept, reject, or restore one pending diff.
    ///
    /// Accept swaps the original for the replacement, tagged as the
    /// round's AI text. Reject keeps the document as it is. Restore keeps
    /// the original and lifts the `marked-delete` mark from it.
    pub fn resolve_diff(
        &mut self,
        diff_id: &str,
        resolution: DiffResolution,
    ) -> Result<(), SessionError> {
        self.writable()?;
        let entry = self
            .diffs
            .get(diff_id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownDiff(diff_id.to_string()))?;
        if entry.state != DiffState::Pending {
            return Err(SessionError::StaleDiff(diff_id.to_string()));
        }
        let range = self.locate(&entry)?;

        let curation = match resolution {
            DiffResolution::Accept => {
                let tag = Tag::new(TextState::AiGenerated, entry.round_id.as_deref());
                self.document.replace(range, &entry.replacement_text, Some(tag));
                let delta = entry.replacement_text.chars().count() as isize - range.len() as isize;
                self.diffs.resolve(diff_id, resolution);
                self.diffs.shift_after(entry.position, delta);
                CurationAction::Accepted
            }
            DiffResolution::Reject => {
                self.diffs.resolve(diff_id, resolution);
                CurationAction::Rejected
            }
            DiffResolution::Restore => {
                self.document.unmark(range);
                self.diffs.resolve(diff_id, resolution);
                CurationAction::Rejected
            }
        };

        let event = self.log.log(
            EventType::DiffResolved,
            json!({ "diffId": diff_id, "action": resolution }),
        );
        if let Some(round_id) = entry.round_id.as_deref() {
            if self.ledger.get_round(round_id).is_some() {
                self.ledger.record_diff_action(round_id, curation)?;
                self.ledger.attach_event(round_id, event)?;
            }
            if self.graph.get_node(round_id).is_some() {
                self.graph.record_curation(round_id, curation)?;
            }
        }
        tracing::debug!(diff = %diff_id, action = ?resolution, "diff resolved");
        Ok(())
    }

    /// Resolve every pending diff the same way. Diffs whose text has moved
    /// stay pending and are reported as drifted.
    pub fn resolve_all(
        &mut self,
        resolution: DiffResolution,
    ) -> Result<BatchResolution, SessionError> {
        self.writable()?;
        let ids: Vec<String> = self.diffs.active().iter().map(|d| d.id.clone()).collect();
        let mut batch = BatchResolution::default();
        for id in ids {
            match self.resolve_diff(&id, resolution) {
                Ok(()) => batch.resolved.push(id),
                Err(SessionError::DiffDrifted(_)) => {
                    tracing::warn!(diff = %id, "diff drifted, left pending");
                    batch.drifted.push(id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(batch)
    }

    // ── Alternatives ──

    /// Replace `range` with an alternative phrasing the user picked.
    pub fn apply_alternative(
        &mut self,
        range: TextRange,
        text: &str,
    ) -> Result<RoundId, SessionError> {
        self.writable()?;
        let len = self.document.len();
        if range.to > len || range.from > range.to {
            return Err(SessionError::OutOfBounds {
                offset: range.to.max(range.from),
                len,
            });
        }
        self.flush()?;

        let parents = self.document.rounds_in(range);
        let parent_refs: Vec<&str> = parents.iter().map(String::as_str).collect();
        let round_id = self
            .ledger
            .create_round(
                CreateRoundParams::new(RoundType::Alternative)
                    .with_parents(&parent_refs)
                    .with_mode(RoundType::Alternative.as_str()),
            )?
            .round_id
            .clone();

        let previous = self.document.slice(range);
        let scores = DimensionScores::new(
            compute_d1_base(TextState::AiGenerated, Some(RoundType::Alternative), false),
            compute_d2_base(DirectionInput {
                round_type: Some(RoundType::Alternative),
                ..Default::default()
            }),
            CurationAction::AltSelected.d3_score(),
        );
        let mut metadata =
            RoundNodeMetadata::new(RoundType::Alternative, CurationAction::AltSelected.as_str());
        metadata.previous_text = Some(previous.clone());
        metadata.result_text = Some(text.to_string());
        self.graph.add_node(&round_id, scores, metadata)?;
        self.ledger
            .record_diff_action(&round_id, CurationAction::AltSelected)?;

        self.document.replace(
            range,
            text,
            Some(Tag::new(TextState::AiGenerated, Some(&round_id))),
        );
        let delta = text.chars().count() as isize - range.len() as isize;
        self.diffs.shift_from(position_after(range.to), delta);

        let event = self.log.log(
            EventType::AiGenerationReceived,
            json!({
                "roundId": round_id,
                "mode": RoundType::Alternative.as_str(),
                "previous": previous,
                "text": text,
            }),
        );
        self.ledger.attach_event(&round_id, event)?;
        Ok(round_id)
    }

    // ── Analysis and reporting ──

    /// Seal any open inline edit, then analyze every eligible round.
    pub async fn analyze(
        &mut self,
        analyzer: &dyn RoundAnalyzer,
    ) -> Result<AnalysisReport, SessionError> {
        self.flush()?;
        let settings = AnalysisSettings {
            min_inline_edit_chars: self.config.min_inline_edit_chars,
            max_recent_chat_messages: self.config.max_recent_chat_messages,
            timeout: self.config.analysis_timeout(),
        };
        let report = self
            .analysis
            .run(
                analyzer,
                &mut self.graph,
                &self.ledger,
                &self.chat,
                &self.constraints,
                settings,
            )
            .await;
        tracing::info!(
            applied = report.applied.len(),
            failed = report.failed.len(),
            "analysis pass finished"
        );
        Ok(report)
    }

    /// Per-round scores in ledger order.
    pub fn contributions(&self) -> Vec<RoundContribution> {
        self.graph
            .nodes()
            .iter()
            .map(|node| {
                let accumulated = self.graph.accumulated_scores(&node.round_id);
                let composite =
                    compute_composite_score(accumulated.d1, accumulated.d2, accumulated.d3);
                RoundContribution {
                    round_id: node.round_id.clone(),
                    round_type: node.metadata.round_type,
                    action: node.metadata.action.clone(),
                    base: node.scores,
                    accumulated,
                    composite,
                    level: score_to_level(composite),
                }
            })
            .collect()
    }

    pub fn attribution_summary(&self) -> AttributionSummary {
        self.document.attribution_summary()
    }

    // ── Persistence ──

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            version: SCHEMA_VERSION,
            id: self.id.clone(),
            created_at: self.created_at.clone(),
            goal: self.goal.clone(),
            goal_history: self.goal_history.clone(),
            document: self.document.clone(),
            ledger: self.ledger.snapshot(),
            graph: self.graph.snapshot(),
            diffs: self.diffs.clone(),
            provenance: self.log.clone(),
            chat: self.chat.clone(),
            constraints: self.constraints.clone(),
        }
    }

    /// Rebuild a session. Open inline edits and in-flight requests are not
    /// part of a snapshot.
    pub fn from_snapshot(snapshot: SessionSnapshot, config: SessionConfig) -> anyhow::Result<Self> {
        let mut session = Self::new(&snapshot.goal, config);
        session.id = snapshot.id;
        session.created_at = snapshot.created_at;
        session.goal_history = snapshot.goal_history;
        session.document = snapshot.document;
        session.ledger = RoundLedger::restore(snapshot.ledger)?;
        session.graph = ContributionGraph::restore(snapshot.graph)?;
        session.diffs = snapshot.diffs;
        session.log = snapshot.provenance;
        session.chat = snapshot.chat;
        session.constraints = snapshot.constraints;
        Ok(session)
    }

    /// Seal the open inline edit and write the session to `path`.
    pub fn save(&mut self, path: &Path) -> anyhow::Result<()> {
        self.flush()?;
        persist::save_snapshot(path, &self.snapshot())
    }

    pub fn load(path: &Path, config: SessionConfig) -> anyhow::Result<Self> {
        Self::from_snapshot(persist::load_snapshot(path)?, config)
    }

    /// Download name for today's export of this session.
    pub fn export_file_name(&self) -> String {
        persist::export_file_name(&self.id, time::OffsetDateTime::now_utc().date())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GapFill, MockGenerator};

    fn session() -> Session {
        Session::with_text("A short toast", "Hi. ", SessionConfig::default())
    }

    /// "Hi. The cat sat." with the second sentence from round r-1.
    fn with_ai_sentence() -> Session {
        let mut s = session();
        s.ledger
            .create_round(CreateRoundParams::new(RoundType::Generation))
            .unwrap();
        s.graph
            .add_node(
                "r-1",
                DimensionScores::new(0.0, 0.0, 0.0),
                RoundNodeMetadata::new(RoundType::Generation, ""),
            )
            .unwrap();
        s.document.insert(
            4,
            "The cat sat.",
            Some(Tag::new(TextState::AiGenerated, Some("r-1"))),
        );
        s
    }

    #[test]
    fn goal_change_is_logged_once() {
        let mut s = session();
        s.set_goal("A long toast", GoalSource::Manual);
        s.set_goal("A long toast", GoalSource::Manual);
        assert_eq!(s.goal(), "A long toast");
        assert_eq!(s.goal_history().len(), 1);
        assert_eq!(s.goal_history()[0].previous_goal, "A short toast");
        assert_eq!(s.provenance().by_type(EventType::GoalChanged).count(), 1);
    }

    #[test]
    fn nothing_marked_means_no_request() {
        let mut s = session();
        assert!(s.prepare_regenerate().unwrap().is_none());
        assert!(!s.is_read_only());
    }

    #[test]
    fn in_flight_request_blocks_edits() {
        let mut s = with_ai_sentence();
        assert!(s.mark(TextRange::new(8, 11), TextState::MarkedDelete).unwrap());
        let prepared = s.prepare_regenerate().unwrap().unwrap();
        assert!(s.is_read_only());
        assert!(matches!(
            s.type_text(0, "x", Instant::now()),
            Err(SessionError::ReadOnly)
        ));
        assert!(matches!(s.click(5), Err(SessionError::ReadOnly)));

        let gap = prepared.request.gaps[0].id.clone();
        let out = s
            .finish_generation(
                prepared.id,
                Ok(GenerateResponse::Gaps {
                    gaps: vec![GapFill {
                        id: gap,
                        text: "dog".into(),
                    }],
                }),
            )
            .unwrap();
        assert!(!s.is_read_only());
        let GenerationOutcome::Proposed { round_id, diff_ids } = out else {
            panic!("expected proposal");
        };
        assert_eq!(round_id, "r-2");
        assert_eq!(s.ledger().get_round("r-2").unwrap().parent_rounds, vec!["r-1"]);
        assert_eq!(diff_ids.len(), 1);
        assert_eq!(s.text(), "Hi. The cat sat.");
    }

    #[test]
    fn newer_request_discards_older_result() {
        let mut s = with_ai_sentence();
        s.mark(TextRange::new(8, 11), TextState::MarkedDelete).unwrap();
        let first = s.prepare_regenerate().unwrap().unwrap();
        let second = s.prepare_regenerate().unwrap().unwrap();
        assert!(first.cancel.is_cancelled());

        let err = s
            .finish_generation(first.id, Ok(GenerateResponse::Gaps { gaps: Vec::new() }))
            .unwrap_err();
        assert!(matches!(err, SessionError::Generation(GenerationError::Aborted)));
        assert!(s.is_read_only());

        let err = s
            .finish_generation(second.id, Err(GenerationError::Timeout { secs: 30 }))
            .unwrap_err();
        assert!(matches!(err, SessionError::Generation(GenerationError::Timeout { .. })));
        assert!(!s.is_read_only());
        assert_eq!(s.ledger().len(), 1);
    }

    #[test]
    fn accept_replaces_and_scores_curation() {
        let mut s = with_ai_sentence();
        s.mark(TextRange::new(8, 11), TextState::MarkedDelete).unwrap();
        let prepared = s.prepare_regenerate().unwrap().unwrap();
        let gap = prepared.request.gaps[0].id.clone();
        let GenerationOutcome::Proposed { diff_ids, .. } = s
            .finish_generation(
                prepared.id,
                Ok(GenerateResponse::Gaps {
                    gaps: vec![GapFill {
                        id: gap,
                        text: "parrot".into(),
                    }],
                }),
            )
            .unwrap()
        else {
            panic!("expected proposal");
        };

        s.resolve_diff(&diff_ids[0], DiffResolution::Accept).unwrap();
        assert_eq!(s.text(), "Hi. The parrot sat.");
        assert_eq!(s.document().state_at(8), Some(TextState::AiGenerated));
        assert_eq!(
            s.document().tag_at(8).and_then(|t| t.round_id.as_deref()),
            Some("r-2")
        );
        let node = s.graph().get_node("r-2").unwrap();
        assert_eq!(node.metadata.action, "accepted");
        assert!((node.scores.d3 - 0.2).abs() < 1e-9);
        assert!(matches!(
            s.resolve_diff(&diff_ids[0], DiffResolution::Reject),
            Err(SessionError::StaleDiff(_))
        ));
    }

    #[test]
    fn restore_lifts_the_mark_and_keeps_text() {
        let mut s = with_ai_sentence();
        s.mark(TextRange::new(8, 11), TextState::MarkedDelete).unwrap();
        let prepared = s.prepare_regenerate().unwrap().unwrap();
        let gap = prepared.request.gaps[0].id.clone();
        s.finish_generation(
            prepared.id,
            Ok(GenerateResponse::Gaps {
                gaps: vec![GapFill {
                    id: gap,
                    text: "dog".into(),
                }],
            }),
        )
        .unwrap();

        let batch = s.resolve_all(DiffResolution::Restore).unwrap();
        assert_eq!(batch.resolved.len(), 1);
        assert!(batch.drifted.is_empty());
        assert_eq!(s.text(), "Hi. The cat sat.");
        assert_eq!(s.document().state_at(8), Some(TextState::AiGenerated));
        assert_eq!(s.graph().get_node("r-2").unwrap().metadata.action, "rejected");
        assert_eq!(s.ledger().get_round("r-2").unwrap().diff_actions.rejected, 1);
    }

    #[test]
    fn edits_before_a_diff_shift_it() {
        let mut s = with_ai_sentence();
        s.mark(TextRange::new(8, 11), TextState::MarkedDelete).unwrap();
        let prepared = s.prepare_regenerate().unwrap().unwrap();
        let gap = prepared.request.gaps[0].id.clone();
        let GenerationOutcome::Proposed { diff_ids, .. } = s
            .finish_generation(
                prepared.id,
                Ok(GenerateResponse::Gaps {
                    gaps: vec![GapFill {
                        id: gap,
                        text: "dog".into(),
                    }],
                }),
            )
            .unwrap()
        else {
            panic!("expected proposal");
        };

        s.type_text(0, "Oh! ", Instant::now()).unwrap();
        s.resolve_diff(&diff_ids[0], DiffResolution::Accept).unwrap();
        assert_eq!(s.text(), "Oh! Hi. The dog sat.");
    }

    #[test]
    fn alternative_round_scores() {
        let mut s = with_ai_sentence();
        let round_id = s
            .apply_alternative(TextRange::new(8, 11), "kitten")
            .unwrap();
        assert_eq!(s.text(), "Hi. The kitten sat.");
        let node = s.graph().get_node(&round_id).unwrap();
        assert!((node.scores.d1 - 0.1).abs() < 1e-9);
        assert!((node.scores.d2 - 0.3).abs() < 1e-9);
        assert!((node.scores.d3 - 0.6).abs() < 1e-9);
        assert_eq!(s.ledger().get_round(&round_id).unwrap().parent_rounds, vec!["r-1"]);
    }

    #[tokio::test]
    async fn continuation_inserts_at_the_caret() {
        let mut s = session();
        let generator = MockGenerator::new();
        let prepared = s
            .prepare_prompt_request("keep going", TextRange::new(4, 4))
            .unwrap();
        let gap = prepared.request.gaps[0].id.clone();
        generator.push_gaps(&[(gap.as_str(), "Welcome all.")]);
        let result = run_generation(
            &generator,
            &prepared.request,
            prepared.timeout,
            prepared.cancel.clone(),
        )
        .await;
        let out = s.finish_generation(prepared.id, result).unwrap();

        assert_eq!(
            out,
            GenerationOutcome::Inserted {
                round_id: "r-1".into(),
                range: TextRange::new(4, 16),
            }
        );
        assert_eq!(s.text(), "Hi. Welcome all.");
        let round = s.ledger().get_round("r-1").unwrap();
        assert_eq!(round.prompt.as_deref(), Some("keep going"));
        assert_eq!(round.generation_mode, "continuation");
        assert_eq!(round.events.len(), 3);
    }

    #[test]
    fn continuation_at_paragraph_end_stays_in_that_paragraph() {
        let mut s = Session::with_text("g", "Hi.\n\nBye.", SessionConfig::default());
        let prepared = s
            .prepare_prompt_request("more", TextRange::new(3, 3))
            .unwrap();
        let gap = prepared.request.gaps[0].id.clone();
        s.finish_generation(
            prepared.id,
            Ok(GenerateResponse::Gaps {
                gaps: vec![GapFill {
                    id: gap,
                    text: " Welcome.".into(),
                }],
            }),
        )
        .unwrap();
        assert_eq!(s.text(), "Hi. Welcome.\n\nBye.");
    }

    #[tokio::test]
    async fn smart_edit_proposes_surgical_diffs() {
        let mut s = Session::with_text("g", "The cat sat on the mat.", SessionConfig::default());
        let generator = MockGenerator::new();
        generator.push(Ok(GenerateResponse::SmartEdit {
            edited_document: "The dog sat on the mat.".into(),
        }));
        let out = s.smart_edit(&generator, "make it a dog").await.unwrap();
        let GenerationOutcome::Proposed { diff_ids, .. } = out else {
            panic!("expected proposal");
        };
        assert_eq!(diff_ids.len(), 1);
        let diff = s.diffs().get(&diff_ids[0]).unwrap();
        assert_eq!(diff.original_text, "cat");
        assert_eq!(diff.replacement_text, "dog");

        s.resolve_diff(&diff_ids[0], DiffResolution::Accept).unwrap();
        assert_eq!(s.text(), "The dog sat on the mat.");
    }

    async fn propose_rewrite(s: &mut Session, edited: &str) -> Vec<String> {
        let generator = MockGenerator::new();
        generator.push(Ok(GenerateResponse::SmartEdit {
            edited_document: edited.into(),
        }));
        match s.smart_edit(&generator, "rewrite").await.unwrap() {
            GenerationOutcome::Proposed { diff_ids, .. } => diff_ids,
            other => panic!("expected proposal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn merging_paragraphs_resolves_across_the_break() {
        let mut s = Session::with_text("g", "First.\n\nSecond.", SessionConfig::default());
        let diff_ids = propose_rewrite(&mut s, "First. Second.").await;
        assert_eq!(diff_ids.len(), 1);
        let diff = s.diffs().get(&diff_ids[0]).unwrap();
        assert_eq!(diff.original_text, "\n\n");
        assert_eq!(diff.position, 7);

        let batch = s.resolve_all(DiffResolution::Accept).unwrap();
        assert_eq!(batch.resolved, diff_ids);
        assert!(batch.drifted.is_empty());
        assert_eq!(s.text(), "First. Second.");
    }

    #[tokio::test]
    async fn typing_right_before_a_diff_moves_it() {
        let mut s = Session::with_text("g", "The cat sat.", SessionConfig::default());
        let diff_ids = propose_rewrite(&mut s, "The dog sat.").await;
        assert_eq!(s.diffs().get(&diff_ids[0]).unwrap().position, 5);

        s.type_text(4, "big ", Instant::now()).unwrap();
        assert_eq!(s.diffs().get(&diff_ids[0]).unwrap().position, 9);
        s.resolve_diff(&diff_ids[0], DiffResolution::Accept).unwrap();
        assert_eq!(s.text(), "The big dog sat.");
    }

    #[tokio::test]
    async fn resolve_all_skips_drifted_diffs() {
        let mut s = Session::with_text("g", "The cat sat on the mat.", SessionConfig::default());
        let diff_ids = propose_rewrite(&mut s, "The dog sat on the rug.").await;
        assert_eq!(diff_ids.len(), 2);

        // overwrite "mat" so the second diff no longer matches
        s.replace_text(TextRange::new(19, 22), "bed", Instant::now())
            .unwrap();
        let batch = s.resolve_all(DiffResolution::Accept).unwrap();
        assert_eq!(batch.resolved, vec![diff_ids[0].clone()]);
        assert_eq!(batch.drifted, vec![diff_ids[1].clone()]);
        assert_eq!(s.text(), "The dog sat on the bed.");
        assert_eq!(s.diffs().active().len(), 1);
        assert_eq!(s.diffs().active()[0].id, diff_ids[1]);
    }

    #[tokio::test]
    async fn identical_rewrite_is_unchanged() {
        let mut s = session();
        let generator = MockGenerator::new();
        generator.push(Ok(GenerateResponse::SmartEdit {
            edited_document: "Hi. ".into(),
        }));
        assert_eq!(
            s.smart_edit(&generator, "tidy").await.unwrap(),
            GenerationOutcome::Unchanged
        );
        assert!(s.ledger().is_empty());
    }

    #[test]
    fn snapshot_restores_state() {
        let mut s = with_ai_sentence();
        s.add_chat_message("user", "make it warmer");
        s.add_constraint("tone", "warm");
        s.set_goal("A warm toast", GoalSource::Inferred);

        let restored = Session::from_snapshot(s.snapshot(), SessionConfig::default()).unwrap();
        assert_eq!(restored.id(), s.id());
        assert_eq!(restored.text(), s.text());
        assert_eq!(restored.snapshot(), s.snapshot());
        assert_eq!(restored.ledger().next_round_id(), "r-2");
    }
}
