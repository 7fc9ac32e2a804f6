//! Core tuning knobs with TOML support.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use votebox_types::VotingMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration for the client core.
///
/// Loaded from the `[core]` table of the CLI config file or built
/// programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Quiet interval after the last keystroke before a similarity query.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Trimmed input shorter than this clears results without querying.
    #[serde(default = "default_min_query_len")]
    pub min_query_len: usize,

    /// Maximum matches requested per similarity query.
    #[serde(default = "default_similarity_limit")]
    pub similarity_limit: usize,

    /// Which voting contract the backend exposes.
    #[serde(default)]
    pub voting_mode: VotingMode,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_debounce_ms() -> u64 {
    500
}

fn default_min_query_len() -> usize {
    3
}

fn default_similarity_limit() -> usize {
    5
}

// ── Impl ───────────────────────────────────────────────────────────────

impl CoreConfig {
    /// Preset for the single free-text field, which only checks once the
    /// text is longer than 10 characters.
    pub fn single_field() -> Self {
        Self {
            min_query_len: 11,
            ..Self::default()
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Parse configuration from a TOML string and validate it.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_query_len == 0 {
            return Err(ConfigError::Invalid("min_query_len must be at least 1".into()));
        }
        if self.similarity_limit == 0 {
            return Err(ConfigError::Invalid(
                "similarity_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            min_query_len: default_min_query_len(),
            similarity_limit: default_similarity_limit(),
            voting_mode: VotingMode::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let config = CoreConfig::from_toml_str("").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.debounce(), Duration::from_millis(500));
        assert_eq!(config.voting_mode, VotingMode::Toggle);
    }

    #[test]
    fn partial_toml_overrides() {
        let config = CoreConfig::from_toml_str(
            r#"
            debounce_ms = 250
            voting_mode = "directional"
        "#,
        )
        .unwrap();
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.voting_mode, VotingMode::Directional);
        assert_eq!(config.min_query_len, 3);
    }

    #[test]
    fn zero_limit_is_rejected() {
        let err = CoreConfig::from_toml_str("similarity_limit = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn single_field_preset_requires_more_than_ten_chars() {
        assert_eq!(CoreConfig::single_field().min_query_len, 11);
    }
}
