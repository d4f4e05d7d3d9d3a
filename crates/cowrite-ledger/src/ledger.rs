use crate::error::LedgerError;
use cowrite_core::event::now_rfc3339;
use cowrite_core::scoring::CurationAction;
use cowrite_core::trace::{apply_trace_edit, TraceEdit};
use cowrite_core::{DiffActionCounts, EventId, Round, RoundId, RoundType};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Parameters for [`RoundLedger::create_round`].
#[derive(Debug, Clone)]
pub struct CreateRoundParams {
    pub round_type: RoundType,
    pub parent_rounds: Vec<RoundId>,
    pub prompt: Option<String>,
    pub prompt_length: usize,
    pub constraint_count: usize,
    pub constraint_types: Vec<String>,
    pub generation_mode: String,
    pub diff_actions: DiffActionCounts,
    pub events: Vec<EventId>,
}

impl CreateRoundParams {
    pub fn new(round_type: RoundType) -> Self {
        Self {
            round_type,
            parent_rounds: Vec::new(),
            prompt: None,
            prompt_length: 0,
            constraint_count: 0,
            constraint_types: Vec::new(),
            generation_mode: String::new(),
            diff_actions: DiffActionCounts::default(),
            events: Vec::new(),
        }
    }

    /// Set the prompt and its character length together.
    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt_length = prompt.chars().count();
        self.prompt = Some(prompt.to_string());
        self
    }

    pub fn with_parents(mut self, parents: &[&str]) -> Self {
        self.parent_rounds = parents.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_constraints(mut self, constraint_types: Vec<String>) -> Self {
        self.constraint_count = constraint_types.len();
        self.constraint_types = constraint_types;
        self
    }

    pub fn with_mode(mut self, mode: &str) -> Self {
        self.generation_mode = mode.to_string();
        self
    }
}

/// Serializable image of the ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LedgerSnapshot {
    pub counter: u64,
    pub rounds: Vec<Round>,
}

/// Append-only store of rounds, numbered `r-1`, `r-2`, ... in creation order.
#[derive(Debug, Default)]
pub struct RoundLedger {
    rounds: Vec<Round>,
    index: HashMap<RoundId, usize>,
    counter: u64,
}

fn round_id_for(n: u64) -> RoundId {
    format!("r-{n}")
}

impl RoundLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next `create_round` will assign. Does not consume it.
    pub fn next_round_id(&self) -> RoundId {
        round_id_for(self.counter + 1)
    }

    /// Record a new round. Every parent must already exist in the ledger.
    pub fn create_round(&mut self, params: CreateRoundParams) -> Result<&Round, LedgerError> {
        let round_id = self.next_round_id();

        let mut seen = HashSet::new();
        for parent in &params.parent_rounds {
            if !seen.insert(parent.as_str()) {
                return Err(LedgerError::DuplicateParent(parent.clone()));
            }
            if !self.index.contains_key(parent) {
                return Err(LedgerError::UnknownParent {
                    child: round_id,
                    parent: parent.clone(),
                });
            }
        }

        let number = self.counter + 1;
        let round = Round {
            round_id: round_id.clone(),
            round_number: number,
            round_type: params.round_type,
            ts: now_rfc3339(),
            parent_rounds: params.parent_rounds,
            prompt: params.prompt,
            prompt_length: params.prompt_length,
            constraint_count: params.constraint_count,
            constraint_types: params.constraint_types,
            generation_mode: params.generation_mode,
            diff_actions: params.diff_actions,
            events: params.events,
            edit_trace: Vec::new(),
            sealed: false,
        };

        tracing::debug!(
            round = %round_id,
            kind = %round.round_type,
            parents = round.parent_rounds.len(),
            "round created"
        );

        self.counter = number;
        self.index.insert(round_id, self.rounds.len());
        self.rounds.push(round);
        Ok(&self.rounds[self.rounds.len() - 1])
    }

    pub fn get_round(&self, round_id: &str) -> Option<&Round> {
        self.index.get(round_id).map(|&i| &self.rounds[i])
    }

    /// All rounds in creation order.
    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    /// Every round reachable from `round_id` through `parent_rounds`, the
    /// round itself included, each once, oldest first. Unknown id yields an
    /// empty chain.
    pub fn ancestry_chain(&self, round_id: &str) -> Vec<&Round> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut chain: Vec<&Round> = Vec::new();
        let mut stack: Vec<&str> = vec![round_id];

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(round) = self.get_round(id) else {
                continue;
            };
            chain.push(round);
            stack.extend(round.parent_rounds.iter().map(String::as_str));
        }

        chain.sort_by_key(|r| r.round_number);
        chain
    }

    fn round_mut(&mut self, round_id: &str) -> Result<&mut Round, LedgerError> {
        let i = *self
            .index
            .get(round_id)
            .ok_or_else(|| LedgerError::UnknownRound(round_id.to_string()))?;
        let round = &mut self.rounds[i];
        if round.sealed {
            return Err(LedgerError::Sealed(round_id.to_string()));
        }
        Ok(round)
    }

    /// Fold one keystroke-level edit into an inline-edit round's trace.
    pub fn append_trace(&mut self, round_id: &str, edit: TraceEdit) -> Result<(), LedgerError> {
        let round = self.round_mut(round_id)?;
        if round.round_type != RoundType::InlineEdit {
            return Err(LedgerError::NotInlineEdit(round_id.to_string()));
        }
        apply_trace_edit(&mut round.edit_trace, edit);
        Ok(())
    }

    /// Count a user resolution against the round's diff actions.
    pub fn record_diff_action(
        &mut self,
        round_id: &str,
        action: CurationAction,
    ) -> Result<(), LedgerError> {
        let round = self.round_mut(round_id)?;
        match action {
            CurationAction::Accepted | CurationAction::AltSelected => {
                round.diff_actions.accepted += 1
            }
            CurationAction::Rejected => round.diff_actions.rejected += 1,
            CurationAction::Edited | CurationAction::AltSelectedEdited => {
                round.diff_actions.edited += 1
            }
        }
        Ok(())
    }

    /// Attach a provenance event to an open round.
    pub fn attach_event(&mut self, round_id: &str, event_id: EventId) -> Result<(), LedgerError> {
        self.round_mut(round_id)?.events.push(event_id);
        Ok(())
    }

    /// Freeze a round. Sealing twice is a no-op.
    pub fn seal(&mut self, round_id: &str) -> Result<(), LedgerError> {
        let i = *self
            .index
            .get(round_id)
            .ok_or_else(|| LedgerError::UnknownRound(round_id.to_string()))?;
        self.rounds[i].sealed = true;
        Ok(())
    }

    /// Reset to an empty ledger; numbering restarts at `r-1`.
    pub fn clear_rounds(&mut self) {
        self.rounds.clear();
        self.index.clear();
        self.counter = 0;
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            counter: self.counter,
            rounds: self.rounds.clone(),
        }
    }

    /// Rebuild a ledger from a snapshot, rejecting duplicate ids, dangling
    /// or forward parent references, and a counter behind the last round.
    pub fn restore(snapshot: LedgerSnapshot) -> Result<Self, LedgerError> {
        let mut ledger = Self::new();
        for round in snapshot.rounds {
            if ledger.index.contains_key(&round.round_id) {
                return Err(LedgerError::InvalidSnapshot(format!(
                    "duplicate round id {}",
                    round.round_id
                )));
            }
            if let Some(prev) = ledger.rounds.last() {
                if round.round_number <= prev.round_number {
                    return Err(LedgerError::InvalidSnapshot(format!(
                        "round {} is out of order",
                        round.round_id
                    )));
                }
            }
            if let Some(parent) = round
                .parent_rounds
                .iter()
                .find(|p| !ledger.index.contains_key(*p))
            {
                return Err(LedgerError::InvalidSnapshot(format!(
                    "round {} references unknown parent {parent}",
                    round.round_id
                )));
            }
            ledger.counter = round.round_number;
            ledger
                .index
                .insert(round.round_id.clone(), ledger.rounds.len());
            ledger.rounds.push(round);
        }
        if snapshot.counter < ledger.counter {
            return Err(LedgerError::InvalidSnapshot(format!(
                "counter {} is behind round number {}",
                snapshot.counter, ledger.counter
            )));
        }
        ledger.counter = snapshot.counter;
        Ok(ledger)
    }
}
