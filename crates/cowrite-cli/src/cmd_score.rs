use clap::Subcommand;
use cowrite_core::scoring::{
    compute_composite_score, compute_d1_base, compute_d2_base, compute_d3_base, score_to_level,
    DirectionInput,
};
use cowrite_core::{RoundType, TextState};

// ── CLI Schema ──

#[derive(Subcommand)]
pub enum ScoreCmd {
    /// Weighted composite and contribution level of three scores
    Composite {
        d1: f64,
        d2: f64,
        d3: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// D1 (authorship) base score for a text state
    D1 {
        /// Text state (e.g. user-written, ai-generated)
        state: TextState,
        /// Round type that produced the text
        #[arg(long)]
        round_type: Option<RoundType>,
        /// The text was edited after it was picked
        #[arg(long)]
        edited: bool,
    },
    /// D2 (direction-setting) base score
    D2 {
        /// Prompt length in characters
        #[arg(long, default_value_t = 0)]
        prompt_length: usize,
        /// Number of user constraints
        #[arg(long, default_value_t = 0)]
        constraints: usize,
        #[arg(long)]
        round_type: Option<RoundType>,
    },
    /// D3 (curation) base score for a diff action
    D3 {
        /// accepted, edited, rejected, alt-selected or alt-selected-edited
        action: String,
    },
}

// ── Dispatch ──

pub fn run(cmd: ScoreCmd) -> anyhow::Result<()> {
    match cmd {
        ScoreCmd::Composite { d1, d2, d3, json } => composite(d1, d2, d3, json),
        ScoreCmd::D1 {
            state,
            round_type,
            edited,
        } => {
            println!("{:.2}", compute_d1_base(state, round_type, edited));
            Ok(())
        }
        ScoreCmd::D2 {
            prompt_length,
            constraints,
            round_type,
        } => {
            let score = compute_d2_base(DirectionInput {
                prompt_length,
                constraint_count: constraints,
                round_type,
            });
            println!("{score:.2}");
            Ok(())
        }
        ScoreCmd::D3 { action } => {
            println!("{:.2}", compute_d3_base(&action));
            Ok(())
        }
    }
}

// ── Command Implementations ──

fn check_unit(name: &str, value: f64) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&value) {
        anyhow::bail!("{name} must be within [0, 1], got {value}");
    }
    Ok(())
}

/// `cowrite score composite <d1> <d2> <d3>`
pub fn composite(d1: f64, d2: f64, d3: f64, json: bool) -> anyhow::Result<()> {
    check_unit("d1", d1)?;
    check_unit("d2", d2)?;
    check_unit("d3", d3)?;
    let score = compute_composite_score(d1, d2, d3);
    let level = score_to_level(score);
    if json {
        println!(
            "{}",
            serde_json::json!({ "composite": score, "level": level })
        );
    } else {
        println!("composite: {score:.3}");
        println!("level:     {level}");
    }
    Ok(())
}
