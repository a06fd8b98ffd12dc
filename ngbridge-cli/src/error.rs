//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use ngbridge::config::ConfigError;
use ngbridge::BridgeError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(ConfigError),
    /// Failed to install the Ctrl+C handler
    Signal(String),
    /// Invalid command-line value
    InvalidArgument(String),
    /// Failed to start the async runtime
    Runtime(std::io::Error),
    /// The bridge reported an error
    Bridge(BridgeError),
    /// An operation was cancelled by the user
    Cancelled(String),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Config(_) => {
                eprintln!();
                eprintln!("Check ~/.ngbridge/config.ini or pass --config <path>.");
            }
            CliError::Cancelled(_) => process::exit(130),
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Signal(msg) => write!(f, "Failed to install signal handler: {}", msg),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::Runtime(e) => write!(f, "Failed to start runtime: {}", e),
            CliError::Bridge(e) => write!(f, "{}", e),
            CliError::Cancelled(what) => write!(f, "{} cancelled", what),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            CliError::Bridge(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BridgeError> for CliError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Cancelled(what) => CliError::Cancelled(what),
            other => CliError::Bridge(other),
        }
    }
}
