use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "database")]
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "fs-watch")]
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("File not moved, source and destination are the same: {}", .0.display())]
    SameFilename(PathBuf),

    #[error("Source file does not exist: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Root folder '{}' was not found", .0.display())]
    DestinationRootMissing(PathBuf),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Source and destination were identical; callers treat this as a no-op.
    pub fn is_same_filename(&self) -> bool {
        matches!(self, MediaError::SameFilename(_))
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;
