use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid link rule {id}: {reason}")]
    InvalidRule { id: u32, reason: String },

    #[error("Duplicate link rule id: {0}")]
    DuplicateRuleId(u32),

    #[error("Database not found: {}", .0.display())]
    MissingDatabase(PathBuf),

    #[error("Schema error: {0}")]
    Schema(String),
}

impl MigrateError {
    pub(crate) fn invalid_rule(id: u32, reason: impl Into<String>) -> Self {
        MigrateError::InvalidRule {
            id,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MigrateError>;
