use clap::Subcommand;
use cowrite_session::persist::write_atomic;
use cowrite_session::{CowritePaths, SessionConfig};
use std::path::Path;

// ── CLI Schema ──

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Set a config value
    Set {
        /// Config key (e.g. generation_timeout_secs)
        key: String,
        /// Config value (number or string)
        value: String,
    },
    /// Get a config value
    Get {
        /// Config key
        key: String,
    },
    /// List config values, defaults included
    List,
}

// ── Dispatch ──

pub fn run(cmd: ConfigCmd, root: &Path) -> anyhow::Result<()> {
    match cmd {
        ConfigCmd::Set { key, value } => set(root, &key, &value),
        ConfigCmd::Get { key } => get(root, &key),
        ConfigCmd::List => list(root),
    }
}

// ── Command Implementations ──

/// Read `.cowrite/config.json`. Returns an empty map if the file doesn't exist.
fn read_config(path: &Path) -> anyhow::Result<serde_json::Map<String, serde_json::Value>> {
    if !path.exists() {
        return Ok(serde_json::Map::new());
    }
    let content = std::fs::read_to_string(path)?;
    let val: serde_json::Value = serde_json::from_str(&content)?;
    match val {
        serde_json::Value::Object(map) => Ok(map),
        _ => Ok(serde_json::Map::new()),
    }
}

/// Parse a string value into a JSON number when it looks like one.
fn parse_value(s: &str) -> serde_json::Value {
    match s.parse::<u64>() {
        Ok(n) => serde_json::Value::Number(n.into()),
        Err(_) => serde_json::Value::String(s.to_string()),
    }
}

/// `cowrite config set <key> <value>`
pub fn set(root: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    let paths = CowritePaths::discover(root);
    let mut config = read_config(&paths.config_json)?;
    config.insert(key.to_string(), parse_value(value));

    // Refuse anything the session loader would reject.
    let object = serde_json::Value::Object(config);
    SessionConfig::from_value(object.clone())?;

    let json = serde_json::to_string_pretty(&object)?;
    write_atomic(&paths.config_json, json.as_bytes())?;
    tracing::debug!(key, path = %paths.config_json.display(), "config updated");
    println!("{key} = {value}");
    Ok(())
}

/// `cowrite config get <key>`
pub fn get(root: &Path, key: &str) -> anyhow::Result<()> {
    let paths = CowritePaths::discover(root);
    let config = read_config(&paths.config_json)?;
    match config.get(key) {
        Some(val) => println!("{val}"),
        None => println!("(not set)"),
    }
    Ok(())
}

/// `cowrite config list`
pub fn list(root: &Path) -> anyhow::Result<()> {
    let paths = CowritePaths::discover(root);
    let config = read_config(&paths.config_json)?;
    if config.is_empty() {
        println!("(no config set)");
    }

    let effective = serde_json::to_value(SessionConfig::load(&paths.config_json)?)?;
    if let serde_json::Value::Object(map) = effective {
        for (k, v) in &map {
            let origin = if config.contains_key(k) { "" } else { " (default)" };
            println!("{k} = {v}{origin}");
        }
    }
    Ok(())
}
