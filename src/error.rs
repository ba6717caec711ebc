//! Error types for ShipShow.

use thiserror::Error;

/// Library-level error type for ShipShow operations.
///
/// Tool failures and fatal run failures have their own types
/// ([`crate::tools::ToolError`] and [`crate::workflow::EngineError`]) because
/// they travel through the transcript and the event stream as data.
#[derive(Error, Debug)]
pub enum ShipShowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Agent graph error: {0}")]
    AgentGraph(String),

    #[error("Audit log error: {0}")]
    Audit(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for ShipShow operations.
pub type Result<T> = std::result::Result<T, ShipShowError>;
