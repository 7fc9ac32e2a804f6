//! CLI configuration file.
//!
//! ```toml
//! api_url = "https://votes.example.org"
//! request_timeout_secs = 15
//! log_format = "json"
//!
//! [core]
//! debounce_ms = 300
//! voting_mode = "directional"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use votebox_core::{ConfigError, CoreConfig};
use votebox_utils::LogFormat;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Backend base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub core: CoreConfig,
}

fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl CliConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "api_url must be an http(s) URL, got {:?}",
                self.api_url
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        self.core.validate()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            request_timeout_secs: default_request_timeout_secs(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            core: CoreConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use votebox_types::VotingMode;

    #[test]
    fn defaults_are_valid() {
        let config = CliConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
api_url = "https://votes.example.org"
log_format = "json"

[core]
debounce_ms = 300
voting_mode = "directional"
"#
        )
        .unwrap();

        let config = CliConfig::load(file.path()).unwrap();

        assert_eq!(config.api_url, "https://votes.example.org");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.core.debounce_ms, 300);
        assert_eq!(config.core.voting_mode, VotingMode::Directional);
        assert_eq!(config.core.min_query_len, 3);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CliConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn bad_url_is_rejected() {
        let err = CliConfig::from_toml_str(r#"api_url = "localhost:8000""#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn invalid_core_section_is_rejected() {
        let err = CliConfig::from_toml_str("[core]\nmin_query_len = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
