use thiserror::Error;

use parley_shared::SharedError;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite / SQLCipher error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A record failed validation and was not written.
    #[error("Validation error: {0}")]
    Validation(String),

    /// JSON (de)serialization of an embedded snapshot.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Stored enum code outside the known range.
    #[error("Invalid stored value: {0}")]
    InvalidValue(#[from] SharedError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
