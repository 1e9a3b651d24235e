//! Error types for the fallible persistence surface.
//!
//! Reads never fail: missing or corrupt data degrades to the caller's
//! default. Only opening a store and committing a batch can error.

use thiserror::Error;

/// Errors from opening the store or committing a batch of writes.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing database could not be opened or initialized.
    #[error("Failed to open store at {path}: {reason}")]
    Open { path: String, reason: String },

    /// A batch commit failed or only partially applied. Not retried within
    /// the same run; a resulting crash loop is caught by safe mode.
    #[error("Batch commit failed after staging {staged} entries: {reason}")]
    Commit { staged: usize, reason: String },

    /// Database error that fits no more specific variant.
    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
