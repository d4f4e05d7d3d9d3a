//! Session snapshots on disk: versioned JSON body plus a SHA-256 digest of
//! its canonical form.

use crate::analysis::{ChatMessage, UserConstraint};
use crate::document::Document;
use crate::session::GoalChange;
use anyhow::{Context, Result};
use cowrite_core::digest::{digest_of, Digest};
use cowrite_core::event::ProvenanceLog;
use cowrite_core::SCHEMA_VERSION;
use cowrite_diff::PendingDiffs;
use cowrite_graph::GraphSnapshot;
use cowrite_ledger::LedgerSnapshot;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot digest mismatch: {0}")]
    DigestMismatch(String),

    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// Everything needed to rebuild a session verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    pub version: u32,
    pub id: String,
    pub created_at: String,
    pub goal: String,
    #[serde(default)]
    pub goal_history: Vec<GoalChange>,
    pub document: Document,
    pub ledger: LedgerSnapshot,
    pub graph: GraphSnapshot,
    #[serde(default)]
    pub diffs: PendingDiffs,
    #[serde(default)]
    pub provenance: ProvenanceLog,
    #[serde(default)]
    pub chat: Vec<ChatMessage>,
    #[serde(default)]
    pub constraints: Vec<UserConstraint>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    digest: Digest,
    body: serde_json::Value,
}

/// Write `data` to `path` through a temp file in the same directory.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("no parent dir for {}", path.display()))?;
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}

pub fn save_snapshot(path: &Path, snapshot: &SessionSnapshot) -> Result<()> {
    let body = serde_json::to_value(snapshot)?;
    let file = SnapshotFile {
        digest: digest_of(&body)?,
        body,
    };
    let data = serde_json::to_string_pretty(&file)?;
    write_atomic(path, data.as_bytes())
        .with_context(|| format!("saving snapshot: {}", path.display()))?;
    tracing::debug!(path = %path.display(), "snapshot saved");
    Ok(())
}

/// Read a snapshot, checking its digest and version before decoding.
pub fn load_snapshot(path: &Path) -> Result<SessionSnapshot> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading snapshot: {}", path.display()))?;
    parse_snapshot(&content).with_context(|| format!("loading snapshot: {}", path.display()))
}

pub fn parse_snapshot(content: &str) -> Result<SessionSnapshot> {
    let file: SnapshotFile = serde_json::from_str(content).context("parsing snapshot file")?;
    if digest_of(&file.body)? != file.digest {
        return Err(SnapshotError::DigestMismatch(file.digest.value).into());
    }
    let found = file
        .body
        .get("version")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;
    if found != SCHEMA_VERSION {
        return Err(SnapshotError::UnsupportedVersion {
            found,
            expected: SCHEMA_VERSION,
        }
        .into());
    }
    let snapshot = serde_json::from_value(file.body).context("decoding snapshot body")?;
    Ok(snapshot)
}

/// `cowrite-session-<id>-<YYYY-MM-DD>.json`
pub fn export_file_name(session_id: &str, date: time::Date) -> String {
    format!(
        "cowrite-session-{session_id}-{:04}-{:02}-{:02}.json",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Tag;
    use cowrite_core::TextState;

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            version: SCHEMA_VERSION,
            id: "ses_test".into(),
            created_at: "2026-10-16T09:00:00Z".into(),
            goal: "A wedding toast".into(),
            goal_history: Vec::new(),
            document: Document::from_text(
                "Friends, family.",
                Some(Tag::new(TextState::UserWritten, None)),
            ),
            ledger: LedgerSnapshot::default(),
            graph: GraphSnapshot::default(),
            diffs: PendingDiffs::new(),
            provenance: ProvenanceLog::new(),
            chat: Vec::new(),
            constraints: Vec::new(),
        }
    }

    #[test]
    fn write_atomic_creates_parent_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a").join("b.json");
        write_atomic(&path, b"{}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn save_and_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sessions").join("ses_test.json");
        save_snapshot(&path, &snapshot()).unwrap();
        assert_eq!(load_snapshot(&path).unwrap(), snapshot());
    }

    #[test]
    fn tampered_body_fails_digest() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("s.json");
        save_snapshot(&path, &snapshot()).unwrap();
        let tampered = fs::read_to_string(&path)
            .unwrap()
            .replace("A wedding toast", "A eulogy");
        fs::write(&path, tampered).unwrap();

        let err = load_snapshot(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SnapshotError>(),
            Some(SnapshotError::DigestMismatch(_))
        ));
    }

    #[test]
    fn future_version_is_rejected() {
        let mut snap = snapshot();
        snap.version = SCHEMA_VERSION + 1;
        let body = serde_json::to_value(&snap).unwrap();
        let file = SnapshotFile {
            digest: digest_of(&body).unwrap(),
            body,
        };
        let err = parse_snapshot(&serde_json::to_string(&file).unwrap()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SnapshotError>(),
            Some(SnapshotError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_snapshot(Path::new("/nonexistent/s.json")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/s.json"));
    }

    #[test]
    fn export_name_format() {
        let date = time::Date::from_calendar_date(2026, time::Month::March, 7).unwrap();
        assert_eq!(
            export_file_name("ses_01", date),
            "cowrite-session-ses_01-2026-03-07.json"
        );
    }
}
