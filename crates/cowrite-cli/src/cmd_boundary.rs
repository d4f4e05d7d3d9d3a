use clap::ValueEnum;
use cowrite_diff::Granularity;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Scope {
    Word,
    Phrase,
    Sentence,
}

impl From<Scope> for Granularity {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Word => Granularity::Word,
            Scope::Phrase => Granularity::Phrase,
            Scope::Sentence => Granularity::Sentence,
        }
    }
}

/// `cowrite boundary <text> <offset>`
pub fn execute(text: &str, offset: usize, scope: Scope, json: bool) -> anyhow::Result<()> {
    let len = text.chars().count();
    if offset > len {
        anyhow::bail!("offset {offset} is past the end of the text (length {len})");
    }
    let range = Granularity::from(scope).range_at(text, offset);
    let selected = range.slice(text);
    if json {
        println!(
            "{}",
            serde_json::json!({ "from": range.from, "to": range.to, "text": selected })
        );
    } else {
        println!("{}..{} {selected:?}", range.from, range.to);
    }
    Ok(())
}
