//! Configuration file handling for `~/.ngbridge/config.ini`.
//!
//! ```ini
//! [draw]
//! debounce_ms = 350
//!
//! [notify]
//! scratch_path = ngc://tmp
//!
//! [logging]
//! directory = ~/.ngbridge/logs
//! file = ngbridge.log
//! ```
//!
//! Every key is optional; missing keys and a missing file give defaults.

mod parser;

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::bridge::DEFAULT_SCRATCH_PATH;
use crate::draw::DEFAULT_DEBOUNCE;

pub use parser::expand_tilde;

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "ngbridge.log";

/// Upper bound for `draw.debounce_ms`.
pub const MAX_DEBOUNCE_MS: u64 = 60_000;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read or parse the file.
    #[error("Failed to read config file: {0}")]
    Read(#[from] ini::Error),

    /// A key has a value outside its domain.
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

/// `[draw]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawSettings {
    /// Quiet period before a scheduled draw fires.
    pub debounce: Duration,
}

impl Default for DrawSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// `[notify]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifySettings {
    /// Change events under this catalog path never trigger redraws.
    pub scratch_path: String,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            scratch_path: DEFAULT_SCRATCH_PATH.to_string(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: config_directory().join("logs"),
            file: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

/// All ngbridge settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeConfig {
    pub draw: DrawSettings,
    pub notify: NotifySettings,
    pub logging: LoggingSettings,
}

impl BridgeConfig {
    /// Load configuration from the default path (`~/.ngbridge/config.ini`).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        parser::parse_ini(&ini)
    }

    /// Parse configuration from INI text.
    pub fn from_ini_str(content: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(content).map_err(|e| ConfigError::Read(ini::Error::Parse(e)))?;
        parser::parse_ini(&ini)
    }
}

/// Get the path to the config directory (`~/.ngbridge`).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ngbridge")
}

/// Get the path to the config file (`~/.ngbridge/config.ini`).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}
