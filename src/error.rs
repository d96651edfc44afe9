//! Error types for loanbench

use crate::channel::ChannelError;
use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (invalid mix, timeout, delays, ...)
    #[error("configuration error: {0}")]
    Config(String),

    /// Channel-level failure surfaced by a session
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Orchestration error (all sessions failed, collector died, ...)
    #[error("orchestration error: {0}")]
    Orchestration(String),

    /// Malformed outcome log content
    #[error("log error: {0}")]
    Log(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
