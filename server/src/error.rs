//! Error types for the server core.
//!
//! None of these reach a client as-is: the network layer turns them into
//! `ForceClose`, `ExceptionReport` or failure responses.

use std::io::Error as IoError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while locating, linking or rebuilding a game module.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("No artifact for game type '{name}' found in {dir}: missing {missing}")]
    MissingArtifact {
        name: String,
        dir: PathBuf,
        missing: String,
    },

    #[error("Game type '{0}' has no registered entry point")]
    MissingEntryPoint(String),

    #[error("Game type '{name}' could not be constructed: {reason}")]
    Construction { name: String, reason: String },

    #[error("Module build failed: {0}")]
    BuildFailed(String),

    #[error("Failed to read module directory {0}: {1}")]
    Io(PathBuf, IoError),
}

/// Durable user store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read user store {0}: {1}")]
    Read(PathBuf, IoError),

    #[error("Failed to write user store {0}: {1}")]
    Write(PathBuf, IoError),

    #[error("Failed to parse user store {0}: {1}")]
    Parse(PathBuf, serde_json::Error),

    #[error("Failed to serialize user store: {0}")]
    Serialize(serde_json::Error),
}

/// Errors raised by a game module's own logic.
#[derive(Debug, Error)]
pub enum GameError {
    /// The action was rejected; the session carries on.
    #[error("Illegal move: {0}")]
    IllegalMove(String),

    /// The session cannot continue.
    #[error("{0}")]
    Fault(String),
}

impl From<bincode::Error> for GameError {
    fn from(e: bincode::Error) -> Self {
        GameError::IllegalMove(format!("malformed payload: {}", e))
    }
}

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Read(PathBuf, IoError),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),
}
