//! Session configuration.
//!
//! Configuration merges three layers, each overriding the previous:
//!
//! 1. Compile-time defaults
//! 2. A TOML file (`hive.toml`)
//! 3. Environment variables (`HIVE_*`)
//!
//! Per-character keybindings and detection parameters live in their
//! own files, one per in-game name, under the configured directory.
//! Everything is read once at startup and never reloaded.
//!
//! # Environment Variables
//!
//! - `HIVE_DEBUG`: enable debug mode (`true`/`false`)
//! - `HIVE_CHARACTERS`: comma-separated in-game names
//! - `HIVE_CHARACTER_DIR`: per-character config directory
//! - `HIVE_PIPE_CAPACITY`: per-direction pipe queue depth
//! - `HIVE_SHUTDOWN_GRACE_MS`: worker join grace period
//! - `HIVE_RECORD_PERIOD_SECS`: recorder capture period
//! - `HIVE_TASK_WARN_THRESHOLD`: scheduler overload warning level

use hive_types::ErrorCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Helper for boolean environment overrides.
macro_rules! parse_env_bool {
    ($field:expr, $var:literal) => {
        if let Ok(val) = std::env::var($var) {
            $field = parse_bool(&val)
                .ok_or_else(|| ConfigError::InvalidEnvVar { var: $var })?;
        }
    };
}

/// Helper for numeric environment overrides.
macro_rules! parse_env_number {
    ($field:expr, $var:literal) => {
        if let Ok(val) = std::env::var($var) {
            $field = val
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnvVar { var: $var })?;
        }
    };
}

/// Unified session configuration after merging all layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Enable debug mode (verbose logging).
    pub debug: bool,

    /// In-game names to spawn workers for.
    pub characters: Vec<String>,

    /// Directory holding one `<ign>.toml` per character.
    pub character_dir: PathBuf,

    /// Per-direction pipe queue depth.
    pub pipe_capacity: usize,

    /// Grace period for joining workers at teardown, milliseconds.
    pub shutdown_grace_ms: u64,

    /// Recorder capture period, seconds.
    pub record_period_secs: u64,

    /// Scheduler overload warning threshold.
    pub task_warn_threshold: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debug: false,
            characters: Vec::new(),
            character_dir: PathBuf::from("config/characters"),
            pipe_capacity: 64,
            shutdown_grace_ms: 5_000,
            record_period_secs: 60,
            task_warn_threshold: 30,
        }
    }
}

/// Configuration loader with builder-style knobs.
///
/// # Example
///
/// ```ignore
/// use hive_runtime::config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_file("hive.toml")
///     .skip_env_vars() // for tests
///     .load()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    skip_env: bool,
}

impl ConfigLoader {
    /// Creates a loader with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the TOML file to merge over the defaults. A missing file
    /// is an error; omit the call for defaults-plus-env.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Skips the environment layer (tests).
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Merges the layers.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] / [`ConfigError::Parse`] for file trouble,
    /// [`ConfigError::InvalidEnvVar`] for malformed overrides.
    pub fn load(self) -> Result<SessionConfig, ConfigError> {
        let mut config = SessionConfig::default();

        if let Some(path) = &self.file {
            let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            config = toml::from_str(&text).map_err(|e| ConfigError::Parse {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            debug!(path = %path.display(), "config file merged");
        }

        if !self.skip_env {
            apply_env(&mut config)?;
        }

        Ok(config)
    }
}

fn apply_env(config: &mut SessionConfig) -> Result<(), ConfigError> {
    parse_env_bool!(config.debug, "HIVE_DEBUG");

    if let Ok(val) = std::env::var("HIVE_CHARACTERS") {
        config.characters = val
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    if let Ok(val) = std::env::var("HIVE_CHARACTER_DIR") {
        config.character_dir = PathBuf::from(val);
    }

    parse_env_number!(config.pipe_capacity, "HIVE_PIPE_CAPACITY");
    parse_env_number!(config.shutdown_grace_ms, "HIVE_SHUTDOWN_GRACE_MS");
    parse_env_number!(config.record_period_secs, "HIVE_RECORD_PERIOD_SECS");
    parse_env_number!(config.task_warn_threshold, "HIVE_TASK_WARN_THRESHOLD");

    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Per-character keybindings and detection parameters.
///
/// Loaded from `<character_dir>/<ign>.toml`:
///
/// ```toml
/// [keys]
/// jump = "alt"
/// teleport = "shift"
///
/// [detection]
/// mob_confidence = 0.82
/// minimap_scale = 1.5
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterProfile {
    /// Action name → key name.
    pub keys: HashMap<String, String>,
    /// Detection parameter name → value.
    pub detection: HashMap<String, f64>,
}

impl CharacterProfile {
    /// Loads the profile for one in-game name.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingCharacter`] when the file does not
    /// exist; [`ConfigError::Parse`] when it is malformed.
    pub fn load(dir: &Path, ign: &str) -> Result<Self, ConfigError> {
        let path = dir.join(format!("{ign}.toml"));
        if !path.exists() {
            return Err(ConfigError::MissingCharacter {
                ign: ign.to_string(),
            });
        }
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path,
            reason: e.to_string(),
        })
    }

    /// Looks up the key bound to an action.
    #[must_use]
    pub fn key(&self, action: &str) -> Option<&str> {
        self.keys.get(action).map(String::as_str)
    }

    /// Looks up a detection parameter.
    #[must_use]
    pub fn detection(&self, name: &str) -> Option<f64> {
        self.detection.get(name).copied()
    }
}

/// Configuration errors.
///
/// | Error | Code | Recoverable |
/// |-------|------|-------------|
/// | [`Io`](ConfigError::Io) | `CONFIG_IO_FAILED` | Yes |
/// | [`Parse`](ConfigError::Parse) | `CONFIG_PARSE_FAILED` | No |
/// | [`MissingCharacter`](ConfigError::MissingCharacter) | `CONFIG_MISSING_CHARACTER` | No |
/// | [`InvalidEnvVar`](ConfigError::InvalidEnvVar) | `CONFIG_INVALID_ENV_VAR` | No |
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// File read failure.
    #[error("cannot read {path}: {reason}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// OS-level reason.
        reason: String,
    },

    /// TOML syntax or shape error.
    #[error("cannot parse {path}: {reason}")]
    Parse {
        /// Offending path.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// A configured character has no profile file.
    #[error("no profile for character '{ign}'")]
    MissingCharacter {
        /// The in-game name.
        ign: String,
    },

    /// An environment override that does not parse.
    #[error("invalid value in {var}")]
    InvalidEnvVar {
        /// The variable name.
        var: &'static str,
    },
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "CONFIG_IO_FAILED",
            Self::Parse { .. } => "CONFIG_PARSE_FAILED",
            Self::MissingCharacter { .. } => "CONFIG_MISSING_CHARACTER",
            Self::InvalidEnvVar { .. } => "CONFIG_INVALID_ENV_VAR",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}
