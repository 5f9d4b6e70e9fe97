//! Error types shared across the engine.

use std::fmt::{Display, Formatter};

/// Shared engine result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Engine error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// Malformed input document, e.g. an invalid backup file.
    Validation(String),
    /// Backend call rejected, timed out, or answered with a non-success status.
    Network(String),
    /// No usable credential; the backend call was not attempted.
    AuthRequired(String),
    /// Durable slice write failed.
    Storage(String),
    /// Workflow event is not legal from the current status.
    InvalidTransition(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::Network(msg) => write!(f, "network: {msg}"),
            Self::AuthRequired(msg) => write!(f, "auth required: {msg}"),
            Self::Storage(msg) => write!(f, "storage: {msg}"),
            Self::InvalidTransition(msg) => write!(f, "invalid transition: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("malformed json: {err}"))
    }
}
