use cowrite_core::text_state::allowed_targets;
use cowrite_core::TextState;

/// `cowrite states [from]`: the text state transition table.
pub fn execute(from: Option<TextState>) -> anyhow::Result<()> {
    let sources: Vec<TextState> = match from {
        Some(state) => vec![state],
        None => TextState::ALL.to_vec(),
    };
    for state in sources {
        let targets: Vec<&str> = allowed_targets(state).iter().map(|t| t.as_str()).collect();
        let targets = if targets.is_empty() {
            "(none)".to_string()
        } else {
            targets.join(", ")
        };
        println!("{:<17} -> {targets}", state.as_str());
    }
    Ok(())
}
