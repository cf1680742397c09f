//! Configuration loading, validation, and management for Ferrocode.
//!
//! Loads configuration from `~/.ferrocode/config.toml` with environment
//! variable overrides. Validates all settings at startup. Every threshold the
//! runtime uses lives here and is passed down explicitly at construction.

pub mod agent_file;

pub use agent_file::load_agent_spec;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ferrocode/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Approve every tool action without asking
    #[serde(default)]
    pub yolo: bool,

    /// Agent spec file used when none is given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_agent_file: Option<PathBuf>,

    /// Model settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Step loop limits
    #[serde(default)]
    pub loop_control: LoopControl,

    /// Session log settings
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Subagent delegation settings
    #[serde(default)]
    pub subagent: SubagentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub name: String,

    /// Context window of the model, in tokens
    #[serde(default = "default_max_context_size")]
    pub max_context_size: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

fn default_model() -> String {
    "kimi-k2".into()
}
fn default_max_context_size() -> u64 {
    250_000
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            max_context_size: default_max_context_size(),
            max_output_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopControl {
    /// Hard limit on steps within one run
    #[serde(default = "default_max_steps")]
    pub max_steps_per_run: u32,

    /// Consecutive steps without tool calls before the run is forced to end
    #[serde(default = "default_max_thinking_steps")]
    pub max_thinking_steps: u32,

    /// Tokens kept free below the context size; compaction starts above it
    #[serde(default = "default_reserved_context_tokens")]
    pub reserved_context_tokens: u64,

    /// User/assistant messages kept verbatim by compaction
    #[serde(default = "default_preserved_messages")]
    pub preserved_messages: usize,

    /// Hard timeout for a single tool execution
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Identical failures after which the error text tells the model to change course
    #[serde(default = "default_error_streak_threshold")]
    pub error_streak_threshold: u32,

    /// Insert a visible user message at every per-step checkpoint
    #[serde(default)]
    pub checkpoint_markers: bool,
}

fn default_max_steps() -> u32 {
    100
}
fn default_max_thinking_steps() -> u32 {
    5
}
fn default_reserved_context_tokens() -> u64 {
    50_000
}
fn default_preserved_messages() -> usize {
    2
}
fn default_tool_timeout_secs() -> u64 {
    120
}
fn default_error_streak_threshold() -> u32 {
    3
}

impl Default for LoopControl {
    fn default() -> Self {
        Self {
            max_steps_per_run: default_max_steps(),
            max_thinking_steps: default_max_thinking_steps(),
            reserved_context_tokens: default_reserved_context_tokens(),
            preserved_messages: default_preserved_messages(),
            tool_timeout_secs: default_tool_timeout_secs(),
            error_streak_threshold: default_error_streak_threshold(),
            checkpoint_markers: false,
        }
    }
}

/// How appended log records reach the disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceMode {
    /// Write every append immediately
    #[default]
    Sync,
    /// Queue records and flush in batches or on a timer
    Batched,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub mode: PersistenceMode,

    /// Queued records that trigger an immediate flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Periodic flush interval
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Where session logs are created
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: PathBuf,
}

fn default_batch_size() -> usize {
    32
}
fn default_flush_interval_ms() -> u64 {
    500
}
fn default_sessions_dir() -> PathBuf {
    AppConfig::config_dir().join("sessions")
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            mode: PersistenceMode::default(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            sessions_dir: default_sessions_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentConfig {
    /// Answers shorter than this get one request to elaborate
    #[serde(default = "default_min_answer_chars")]
    pub min_answer_chars: usize,
}

fn default_min_answer_chars() -> usize {
    200
}

impl Default for SubagentConfig {
    fn default() -> Self {
        Self {
            min_answer_chars: default_min_answer_chars(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.ferrocode/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `FERROCODE_MODEL`
    /// - `FERROCODE_MAX_STEPS`
    /// - `FERROCODE_SESSIONS_DIR`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(model) = std::env::var("FERROCODE_MODEL") {
            config.model.name = model;
        }

        if let Ok(steps) = std::env::var("FERROCODE_MAX_STEPS") {
            config.loop_control.max_steps_per_run = steps.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "FERROCODE_MAX_STEPS must be a positive integer, got '{steps}'"
                ))
            })?;
        }

        if let Ok(dir) = std::env::var("FERROCODE_SESSIONS_DIR") {
            config.persistence.sessions_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ferrocode")
    }

    /// Token count above which compaction runs.
    pub fn compaction_threshold(&self) -> u64 {
        self.model
            .max_context_size
            .saturating_sub(self.loop_control.reserved_context_tokens)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.loop_control.max_steps_per_run == 0 {
            return Err(ConfigError::ValidationError(
                "loop_control.max_steps_per_run must be at least 1".into(),
            ));
        }

        if self.loop_control.max_thinking_steps == 0 {
            return Err(ConfigError::ValidationError(
                "loop_control.max_thinking_steps must be at least 1".into(),
            ));
        }

        if self.loop_control.reserved_context_tokens >= self.model.max_context_size {
            return Err(ConfigError::ValidationError(
                "loop_control.reserved_context_tokens must be smaller than model.max_context_size"
                    .into(),
            ));
        }

        if self.persistence.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "persistence.batch_size must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            yolo: false,
            default_agent_file: None,
            model: ModelConfig::default(),
            loop_control: LoopControl::default(),
            persistence: PersistenceConfig::default(),
            subagent: SubagentConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.loop_control.max_thinking_steps, 5);
        assert_eq!(config.subagent.min_answer_chars, 200);
        assert_eq!(config.persistence.mode, PersistenceMode::Sync);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model.name, config.model.name);
        assert_eq!(
            parsed.loop_control.reserved_context_tokens,
            config.loop_control.reserved_context_tokens
        );
    }

    #[test]
    fn reserved_tokens_must_fit_context() {
        let mut config = AppConfig::default();
        config.loop_control.reserved_context_tokens = config.model.max_context_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn compaction_threshold_subtracts_reserve() {
        let mut config = AppConfig::default();
        config.model.max_context_size = 1000;
        config.loop_control.reserved_context_tokens = 200;
        assert_eq!(config.compaction_threshold(), 800);
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().loop_control.max_steps_per_run, 100);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
yolo = true

[persistence]
mode = "batched"
batch_size = 4

[loop_control]
max_steps_per_run = 7
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert!(config.yolo);
        assert_eq!(config.persistence.mode, PersistenceMode::Batched);
        assert_eq!(config.persistence.batch_size, 4);
        assert_eq!(config.persistence.flush_interval_ms, 500);
        assert_eq!(config.loop_control.max_steps_per_run, 7);
        assert_eq!(config.loop_control.max_thinking_steps, 5);
    }

    #[test]
    fn unparsable_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "yolo = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("max_steps_per_run"));
        assert!(toml_str.contains("kimi-k2"));
    }
}
