//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/mirrorwatch/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/mirrorwatch/` (~/.config/mirrorwatch/)
//! - Data: `$XDG_DATA_HOME/mirrorwatch/` (~/.local/share/mirrorwatch/)
//! - State/Logs: `$XDG_STATE_HOME/mirrorwatch/` (~/.local/state/mirrorwatch/)

use crate::error::{Error, Result};
use crate::types::ConsoleLevel;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Recovered queues larger than this are dropped in local/test environments.
pub const LOCAL_RECOVERY_CEILING: usize = 100;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Agent configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Deployment environment of the observed application
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Local,
    Test,
    Staging,
    #[default]
    Production,
}

impl Environment {
    /// Local and test environments cap how much of a previous queue is replayed.
    pub fn limits_recovery(&self) -> bool {
        matches!(self, Environment::Local | Environment::Test)
    }
}

/// Agent configuration
///
/// Set once when the agent is built and immutable for the rest of the session.
#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    /// Project identifier; the agent stays inert without it
    pub system_id: Option<String>,

    /// Collector endpoint receiving form-encoded reports
    pub collector_url: Option<String>,

    /// Per-report request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Queue length that triggers an immediate flush
    #[serde(default = "default_immediate_flush_threshold")]
    pub immediate_flush_threshold: usize,

    /// Debounce window before a smaller queue is flushed
    #[serde(default = "default_delayed_flush_ms")]
    pub delayed_flush_ms: u64,

    /// Hard cap on report calls for the lifetime of the session
    #[serde(default = "default_max_report_attempts")]
    pub max_report_attempts: u32,

    /// Report on every capture instead of batching
    #[serde(default)]
    pub flush_on_every_capture: bool,

    /// Environment tag, drives the local retention policy
    #[serde(default)]
    pub environment: Environment,

    /// Console levels the console interceptor records
    #[serde(default = "default_console_levels")]
    pub console_levels: Vec<ConsoleLevel>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_id: None,
            collector_url: None,
            request_timeout_ms: default_request_timeout_ms(),
            immediate_flush_threshold: default_immediate_flush_threshold(),
            delayed_flush_ms: default_delayed_flush_ms(),
            max_report_attempts: default_max_report_attempts(),
            flush_on_every_capture: false,
            environment: Environment::default(),
            console_levels: default_console_levels(),
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    1000
}

fn default_immediate_flush_threshold() -> usize {
    10
}

fn default_delayed_flush_ms() -> u64 {
    3000
}

fn default_max_report_attempts() -> u32 {
    30
}

fn default_console_levels() -> Vec<ConsoleLevel> {
    vec![ConsoleLevel::Error]
}

impl AgentConfig {
    /// Create a config for a system id with every other field defaulted
    pub fn for_system(system_id: impl Into<String>) -> Self {
        Self {
            system_id: Some(system_id.into()),
            ..Default::default()
        }
    }

    /// Non-empty system id, if any
    pub fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref().filter(|s| !s.is_empty())
    }

    /// Non-empty collector URL, if any
    pub fn collector_url(&self) -> Option<&str> {
        self.collector_url.as_deref().filter(|s| !s.is_empty())
    }

    /// Check if the agent can both capture and transmit
    pub fn is_ready(&self) -> bool {
        self.system_id().is_some() && self.collector_url().is_some()
    }

    /// Durable storage key for this system's queue
    pub fn storage_key(&self) -> Option<String> {
        self.system_id().map(|id| format!("{}_Logs", id))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn delayed_flush(&self) -> Duration {
        Duration::from_millis(self.delayed_flush_ms)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.system_id().is_none() {
            return Err(Error::Config("agent.system_id is required".to_string()));
        }
        if self.immediate_flush_threshold == 0 {
            return Err(Error::Config(
                "agent.immediate_flush_threshold must be at least 1".to_string(),
            ));
        }
        if let Some(url) = self.collector_url() {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::Config(format!(
                    "agent.collector_url must be an http(s) URL, got {}",
                    url
                )));
            }
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/mirrorwatch/config.toml` (~/.config/mirrorwatch/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("mirrorwatch").join("config.toml")
    }

    /// Returns the data directory path (durable log mirrors)
    ///
    /// `$XDG_DATA_HOME/mirrorwatch/` (~/.local/share/mirrorwatch/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("mirrorwatch")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/mirrorwatch/` (~/.local/state/mirrorwatch/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("mirrorwatch")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join(crate::logging::LOG_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.agent.system_id.is_none());
        assert_eq!(config.agent.request_timeout_ms, 1000);
        assert_eq!(config.agent.immediate_flush_threshold, 10);
        assert_eq!(config.agent.delayed_flush_ms, 3000);
        assert_eq!(config.agent.max_report_attempts, 30);
        assert!(!config.agent.flush_on_every_capture);
        assert_eq!(config.agent.environment, Environment::Production);
        assert_eq!(config.agent.console_levels, vec![ConsoleLevel::Error]);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[agent]
system_id = "app1"
collector_url = "https://collector.example.com/report"
immediate_flush_threshold = 5
delayed_flush_ms = 1500
environment = "local"
console_levels = ["error", "warn"]

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.agent.system_id(), Some("app1"));
        assert_eq!(config.agent.immediate_flush_threshold, 5);
        assert_eq!(config.agent.delayed_flush(), Duration::from_millis(1500));
        assert_eq!(config.agent.environment, Environment::Local);
        assert_eq!(
            config.agent.console_levels,
            vec![ConsoleLevel::Error, ConsoleLevel::Warn]
        );
        assert_eq!(config.logging.level, "debug");
        assert!(config.agent.is_ready());
    }

    #[test]
    fn test_storage_key() {
        let config = AgentConfig::for_system("app1");
        assert_eq!(config.storage_key().as_deref(), Some("app1_Logs"));

        let config = AgentConfig {
            system_id: Some(String::new()),
            ..Default::default()
        };
        assert!(config.storage_key().is_none());
    }

    #[test]
    fn test_agent_config_validation() {
        assert!(AgentConfig::default().validate().is_err());
        assert!(AgentConfig::for_system("app1").validate().is_ok());

        let config = AgentConfig {
            collector_url: Some("ftp://nope".to_string()),
            ..AgentConfig::for_system("app1")
        };
        assert!(config.validate().is_err());

        let config = AgentConfig {
            immediate_flush_threshold: 0,
            ..AgentConfig::for_system("app1")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_recovery_limit_by_environment() {
        assert!(Environment::Local.limits_recovery());
        assert!(Environment::Test.limits_recovery());
        assert!(!Environment::Staging.limits_recovery());
        assert!(!Environment::Production.limits_recovery());
    }

    #[test]
    fn test_not_ready_without_collector() {
        let config = AgentConfig::for_system("app1");
        assert!(!config.is_ready());
    }
}
