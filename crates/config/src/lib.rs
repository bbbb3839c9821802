//! Configuration loading, validation, and defaults for Agentry.
//!
//! Configuration comes from a TOML file (default `./config.toml`) with a
//! small set of environment variable overrides. A missing file means
//! defaults; a malformed file is an error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The root configuration structure. Maps directly to `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    /// Provider configurations keyed by provider name (e.g. "ollama").
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            providers: default_providers(),
            logging: LoggingConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

fn default_providers() -> HashMap<String, ProviderConfig> {
    let mut providers = HashMap::new();
    providers.insert(
        "ollama".into(),
        ProviderConfig {
            base_url: "http://localhost:11434".into(),
            api_key: None,
        },
    );
    providers
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "./data/agentry.db".into()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "json" or "text".
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "json".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Per-call execution deadline in seconds.
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

fn default_tool_timeout() -> u64 {
    60
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist. Environment overrides are applied afterwards.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)?;
                toml::from_str(&raw)?
            }
            Some(p) => {
                return Err(ConfigError::Invalid(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            None => {
                let default_path = Path::new("config.toml");
                if default_path.exists() {
                    let raw = std::fs::read_to_string(default_path)?;
                    toml::from_str(&raw)?
                } else {
                    debug!("no config file found, using defaults");
                    Self::default()
                }
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply the supported environment overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("AGENTRY_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
        }
        if let Ok(path) = std::env::var("AGENTRY_DB_PATH") {
            self.database.path = path;
        }
        if let Ok(url) = std::env::var("AGENTRY_OLLAMA_URL")
            && let Some(provider) = self.providers.get_mut("ollama")
        {
            provider.base_url = url;
        }
        if let Ok(level) = std::env::var("AGENTRY_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server port cannot be 0".into()));
        }
        if self.database.path.is_empty() {
            return Err(ConfigError::Invalid("database path cannot be empty".into()));
        }
        if self.tools.timeout_secs == 0 {
            return Err(ConfigError::Invalid("tool timeout cannot be 0".into()));
        }
        match self.logging.format.as_str() {
            "json" | "text" => {}
            other => {
                return Err(ConfigError::Invalid(format!("unknown log format: {other}")));
            }
        }
        Ok(())
    }

    /// The server bind address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.address(), "0.0.0.0:8080");
        assert!(config.providers.contains_key("ollama"));
        assert_eq!(config.tools.timeout_secs, 60);
    }

    #[test]
    fn parses_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [server]
            port = 9090

            [providers.ollama]
            base_url = "http://ollama.internal:11434"
            "#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(
            config.providers["ollama"].base_url,
            "http://ollama.internal:11434"
        );
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/config.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn rejects_zero_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_db_path() {
        let mut config = AppConfig::default();
        config.database.path = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_log_format() {
        let mut config = AppConfig::default();
        config.logging.format = "xml".into();
        assert!(config.validate().is_err());
    }
}
