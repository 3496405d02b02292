//! Configuration loading and validation for the Parley turn engine.
//!
//! Loads engine settings from a TOML file with environment variable
//! overrides. Validates all settings before they reach the engine.
//!
//! ```toml
//! max_steps = 100
//! event_capacity = 256
//!
//! [format]
//! turn_separator = "\n"
//! name_suffix = ":"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use parley_core::FormatScheme;

/// Environment variable naming the config file path.
pub const CONFIG_PATH_ENV: &str = "PARLEY_CONFIG";

/// Errors from loading or validating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// Engine configuration.
///
/// Maps directly to the TOML file; every field has a default so an empty
/// or missing file yields a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hard cap on phase transitions per turn (tool rounds and repeats
    /// included). Exceeding it aborts the turn.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Capacity of the domain event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Optional transcript flattening scheme applied to every turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FormatConfig>,
}

fn default_max_steps() -> u32 {
    100
}
fn default_event_capacity() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            event_capacity: default_event_capacity(),
            format: None,
        }
    }
}

/// The `[format]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatConfig {
    #[serde(default)]
    pub turn_separator: String,

    #[serde(default)]
    pub name_suffix: String,
}

impl FormatConfig {
    pub fn to_scheme(&self) -> FormatScheme {
        FormatScheme::new(self.turn_separator.clone(), self.name_suffix.clone())
    }
}

impl EngineConfig {
    /// Load configuration from the path named by `PARLEY_CONFIG`, falling
    /// back to defaults when the variable is unset.
    pub fn load() -> Result<Self, ConfigFileError> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load_from(Path::new(&path)),
            Err(_) => {
                let mut config = Self::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Load configuration from a specific file. A missing file yields the
    /// defaults; a malformed file is an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
                path: path.display().to_string(),
                source,
            })?;
            toml::from_str(&raw).map_err(|source| ConfigFileError::Parse {
                path: path.display().to_string(),
                source,
            })?
        } else {
            debug!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Environment variables take priority over the file.
    fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var("PARLEY_MAX_STEPS") {
            if let Ok(value) = raw.parse() {
                debug!(max_steps = value, "Overriding max_steps from environment");
                self.max_steps = value;
            }
        }
        if let Ok(raw) = std::env::var("PARLEY_EVENT_CAPACITY") {
            if let Ok(value) = raw.parse() {
                debug!(event_capacity = value, "Overriding event_capacity from environment");
                self.event_capacity = value;
            }
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigFileError> {
        if self.max_steps == 0 {
            return Err(ConfigFileError::Invalid {
                field: "max_steps".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.event_capacity == 0 {
            return Err(ConfigFileError::Invalid {
                field: "event_capacity".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// The configured flattening scheme, if any.
    pub fn format_scheme(&self) -> Option<FormatScheme> {
        self.format.as_ref().map(FormatConfig::to_scheme)
    }
}
