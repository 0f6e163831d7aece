//! Error types for notestream-session

use thiserror::Error;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in a session
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A request was issued while no connection is open
    #[error("Not connected")]
    NotConnected,

    /// Prompt is empty after sanitizing
    #[error("Prompt cannot be empty")]
    EmptyPrompt,

    /// Prompt exceeds the accepted length
    #[error("Prompt too long ({len} chars, max {max})")]
    PromptTooLong { len: usize, max: usize },

    /// Gallery storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}
