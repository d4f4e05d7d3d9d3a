//! Session tuning knobs, read from `.cowrite/config.json`.

use crate::persist::write_atomic;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub inline_edit_debounce_ms: u64,
    pub generation_timeout_secs: u64,
    pub analysis_timeout_secs: u64,
    pub min_inline_edit_chars: usize,
    pub max_recent_chat_messages: usize,
    pub merge_gap_chars: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inline_edit_debounce_ms: 2000,
            generation_timeout_secs: 30,
            analysis_timeout_secs: 15,
            min_inline_edit_chars: 3,
            max_recent_chat_messages: 10,
            merge_gap_chars: 2,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.inline_edit_debounce_ms == 0 {
            anyhow::bail!("inline_edit_debounce_ms must be greater than 0");
        }
        if self.generation_timeout_secs == 0 {
            anyhow::bail!("generation_timeout_secs must be greater than 0");
        }
        if self.analysis_timeout_secs == 0 {
            anyhow::bail!("analysis_timeout_secs must be greater than 0");
        }
        if !(15..=30).contains(&self.generation_timeout_secs) {
            tracing::warn!(
                secs = self.generation_timeout_secs,
                "generation timeout outside the recommended 15..=30s"
            );
        }
        Ok(())
    }

    /// Parse and validate a config object.
    pub fn from_value(value: serde_json::Value) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_value(value).context("parsing config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let value: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        Self::from_value(value)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.inline_edit_debounce_ms)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }
}
