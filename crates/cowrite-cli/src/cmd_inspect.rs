use cowrite_diff::DiffState;
use cowrite_session::{CowritePaths, Session, SessionConfig};
use std::path::{Path, PathBuf};

/// An existing file path, or else a session id under `.cowrite/sessions/`.
fn resolve_snapshot(paths: &CowritePaths, snapshot: &str) -> PathBuf {
    let path = Path::new(snapshot);
    if path.exists() {
        path.to_path_buf()
    } else {
        paths.session_file(snapshot)
    }
}

fn load(root: &Path, snapshot: &str) -> anyhow::Result<Session> {
    let paths = CowritePaths::discover(root);
    let config = SessionConfig::load(&paths.config_json)?;
    Session::load(&resolve_snapshot(&paths, snapshot), config)
}

/// Machine-readable view of a session's attribution.
pub fn report(session: &Session) -> serde_json::Value {
    let pending: Vec<_> = session
        .diffs()
        .all()
        .iter()
        .filter(|d| d.state == DiffState::Pending)
        .collect();
    serde_json::json!({
        "id": session.id(),
        "goal": session.goal(),
        "createdAt": session.created_at(),
        "attribution": session.attribution_summary(),
        "rounds": session.contributions(),
        "pendingDiffs": pending,
        "events": session.provenance().len(),
    })
}

/// `cowrite inspect <snapshot|session-id>`
pub fn execute(root: &Path, snapshot: &str, json: bool) -> anyhow::Result<()> {
    let session = load(root, snapshot)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report(&session))?);
        return Ok(());
    }

    println!("Session {} ({})", session.id(), session.created_at());
    println!("Goal: {}", session.goal());

    let summary = session.attribution_summary();
    println!();
    println!("Attribution: {} chars", summary.total_chars);
    for (state, count) in &summary.by_state {
        println!("  {state:<17} {count}");
    }
    if summary.untagged > 0 {
        println!("  {:<17} {}", "(untagged)", summary.untagged);
    }
    println!("  AI share: {:.1}%", summary.ai_share * 100.0);

    let rounds = session.contributions();
    println!();
    if rounds.is_empty() {
        println!("Rounds: (none)");
    } else {
        println!("Rounds:");
        println!(
            "  {:<6} {:<12} {:<20} {:>5} {:>5} {:>5} {:>9} {:>5}",
            "id", "type", "action", "D1", "D2", "D3", "composite", "level"
        );
        for r in &rounds {
            println!(
                "  {:<6} {:<12} {:<20} {:>5.2} {:>5.2} {:>5.2} {:>9.3} {:>5}",
                r.round_id,
                r.round_type.as_str(),
                if r.action.is_empty() { "-" } else { r.action.as_str() },
                r.accumulated.d1,
                r.accumulated.d2,
                r.accumulated.d3,
                r.composite,
                r.level
            );
        }
    }

    let pending = session.diffs().active();
    println!();
    println!("Pending diffs: {}", pending.len());
    for d in pending {
        println!(
            "  {} @{}: {:?} -> {:?}",
            d.id, d.position, d.original_text, d.replacement_text
        );
    }
    println!("Events: {}", session.provenance().len());
    Ok(())
}
