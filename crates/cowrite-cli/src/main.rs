mod cmd_boundary;
mod cmd_config;
mod cmd_diff;
mod cmd_inspect;
mod cmd_score;
mod cmd_states;

use clap::{Parser, Subcommand};
use cowrite_core::TextState;
use cowrite_diff::DEFAULT_MERGE_GAP;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "cowrite",
    version,
    about = "Authorship attribution for human/AI co-writing"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Contribution scoring functions
    Score {
        #[command(subcommand)]
        cmd: cmd_score::ScoreCmd,
    },
    /// Edit operations turning one text file into another
    Diff {
        /// Original text file
        original: PathBuf,
        /// Rewritten text file
        edited: PathBuf,
        /// Fold unchanged runs up to this many chars into one edit
        #[arg(long, default_value_t = DEFAULT_MERGE_GAP)]
        merge_gap: usize,
        /// Show the raw character diff instead of edit operations
        #[arg(long)]
        chars: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Word, phrase or sentence range around an offset
    Boundary {
        /// Text to probe
        text: String,
        /// Char offset into the text
        offset: usize,
        #[arg(long, value_enum, default_value = "word")]
        scope: cmd_boundary::Scope,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Allowed text state transitions
    States {
        /// Only show transitions out of this state
        from: Option<TextState>,
    },
    /// Summarize a saved session snapshot
    Inspect {
        /// Snapshot file, or a session id saved under .cowrite/sessions/
        snapshot: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Configuration management (.cowrite/config.json)
    Config {
        #[command(subcommand)]
        cmd: cmd_config::ConfigCmd,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("COWRITE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let root = std::env::current_dir()?;

    match cli.cmd {
        Command::Score { cmd } => cmd_score::run(cmd),
        Command::Diff {
            original,
            edited,
            merge_gap,
            chars,
            json,
        } => cmd_diff::execute(&cmd_diff::DiffParams {
            original: &original,
            edited: &edited,
            merge_gap,
            chars,
            json,
        }),
        Command::Boundary {
            text,
            offset,
            scope,
            json,
        } => cmd_boundary::execute(&text, offset, scope, json),
        Command::States { from } => cmd_states::execute(from),
        Command::Inspect { snapshot, json } => cmd_inspect::execute(&root, &snapshot, json),
        Command::Config { cmd } => cmd_config::run(cmd, &root),
    }
}
