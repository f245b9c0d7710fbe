//! Configuration management
//!
//! This module handles loading, validation, and management of the colloquy
//! configuration. Configuration is stored in TOML format at
//! ~/.colloquy/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level
//! - **backend**: Ollama endpoint, default model, request timeout
//! - **conversation**: Turn caps and transcript window sizes
//!
//! Every field has a sensible default, so an empty file (or a file with only
//! the sections you care about) is a valid configuration.
//!
//! # Examples
//!
//! ```no_run
//! use colloquy_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration from the default location
//! let config = Config::load_or_create()?;
//!
//! println!("Backend: {}", config.backend.base_url);
//! println!("Default model: {}", config.backend.default_model);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        /// Path that was being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The configuration file could not be written
    #[error("Failed to write config file {path:?}: {source}")]
    Write {
        /// Path that was being written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The file was read but is not valid TOML for this schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The file parsed but holds values the engine cannot run with
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// The home directory could not be determined
    #[error("Could not determine home directory")]
    NoHome,
}

/// Main configuration structure
///
/// This structure represents the complete colloquy configuration loaded from
/// ~/.colloquy/config.toml. All sections are optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Chat backend settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Conversation loop settings
    #[serde(default)]
    pub conversation: ConversationConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Chat backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL for the Ollama API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used when a persona does not name one
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Whole-call deadline for a single chat request, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Log full request and reply payloads at debug level
    #[serde(default)]
    pub debug_payloads: bool,
}

/// Conversation loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Hard cap on total turns before the judge is forced
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Cap on debater turns before the judge is forced
    #[serde(default = "default_max_debater_turns")]
    pub max_debater_turns: usize,

    /// Transcript entries shown to a persona that sets no window of its own
    #[serde(default = "default_transcript_window")]
    pub default_transcript_window: usize,

    /// Transcript entries shown to the moderator when picking a speaker
    #[serde(default = "default_moderator_context_entries")]
    pub moderator_context_entries: usize,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_turns() -> usize {
    24
}

fn default_max_debater_turns() -> usize {
    12
}

fn default_transcript_window() -> usize {
    8
}

fn default_moderator_context_entries() -> usize {
    6
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            backend: BackendConfig::default(),
            conversation: ConversationConfig::default(),
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_model: default_model(),
            request_timeout_secs: default_request_timeout_secs(),
            debug_payloads: false,
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_debater_turns: default_max_debater_turns(),
            default_transcript_window: default_transcript_window(),
            moderator_context_entries: default_moderator_context_entries(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.colloquy/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default one there.
    /// Validates the configuration after loading and returns descriptive
    /// errors if validation fails.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The home directory cannot be determined
    /// - The configuration file cannot be read or written
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&contents)?;
        config.validate()?;

        Ok(config)
    }

    /// Create a default configuration and save it to the given path
    ///
    /// Creates the parent directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation or the file write fails.
    pub fn create_default(path: &Path) -> Result<Self, ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let config = Self::default();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| ConfigError::Invalid(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.colloquy/config.toml)
    fn default_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHome)?;

        Ok(home.join(".colloquy").join("config.toml"))
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error if any field holds a value the engine cannot run
    /// with, such as a zero turn cap or an unknown log level.
    fn validate(&self) -> Result<(), ConfigError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "backend.base_url must not be empty".to_string(),
            ));
        }

        if self.backend.default_model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "backend.default_model must not be empty".to_string(),
            ));
        }

        if self.backend.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "backend.request_timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.conversation.max_turns == 0 {
            return Err(ConfigError::Invalid(
                "conversation.max_turns must be at least 1".to_string(),
            ));
        }

        if self.conversation.max_debater_turns == 0 {
            return Err(ConfigError::Invalid(
                "conversation.max_debater_turns must be at least 1".to_string(),
            ));
        }

        if self.conversation.max_debater_turns > self.conversation.max_turns {
            return Err(ConfigError::Invalid(format!(
                "conversation.max_debater_turns ({}) must not exceed conversation.max_turns ({})",
                self.conversation.max_debater_turns, self.conversation.max_turns
            )));
        }

        if self.conversation.default_transcript_window == 0 {
            return Err(ConfigError::Invalid(
                "conversation.default_transcript_window must be at least 1".to_string(),
            ));
        }

        if self.conversation.moderator_context_entries == 0 {
            return Err(ConfigError::Invalid(
                "conversation.moderator_context_entries must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
