use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::EventId;

/// Kind of provenance event recorded in a session log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    TextTyped,
    AiGenerationRequested,
    AiGenerationReceived,
    MarkApplied,
    EditInPlace,
    PromptRequest,
    DiffResolved,
    PushbackShown,
    PushbackResponse,
    AwarenessToggled,
    GoalChanged,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        f.write_str(&s)
    }
}

/// A single entry in the provenance log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProvenanceEvent {
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub ts: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

fn new_event_id() -> EventId {
    format!("evt_{}", ulid::Ulid::new().to_string().to_lowercase())
}

pub fn now_rfc3339() -> String {
    let now = time::OffsetDateTime::now_utc();
    now.format(&time::format_description::well_known::Rfc3339)
        .expect("RFC3339 formatting should not fail")
}

/// Create a new provenance event stamped with the current time.
pub fn new_provenance_event(event_type: EventType, data: serde_json::Value) -> ProvenanceEvent {
    ProvenanceEvent {
        id: new_event_id(),
        event_type,
        ts: now_rfc3339(),
        data,
    }
}

/// Append-only provenance log for one editing session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProvenanceLog {
    events: Vec<ProvenanceEvent>,
}

impl ProvenanceLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event and return its id.
    pub fn log(&mut self, event_type: EventType, data: serde_json::Value) -> EventId {
        let event = new_provenance_event(event_type, data);
        let id = event.id.clone();
        self.events.push(event);
        id
    }

    pub fn events(&self) -> &[ProvenanceEvent] {
        &self.events
    }

    pub fn by_type(&self, event_type: EventType) -> impl Iterator<Item = &ProvenanceEvent> {
        self.events.iter().filter(move |e| e.event_type == event_type)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
