//! Store error types.

use crudguard_core::SecurityError;
use thiserror::Error;

/// Document store errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Document encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A guarded operation was refused or its policy failed.
    #[error(transparent)]
    Security(#[from] SecurityError),

    /// Document shape is not storable.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

impl Error {
    /// Check if this error is an access denial.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Error::Security(err) if err.is_access_denied())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for SecurityError {
    fn from(err: Error) -> Self {
        match err {
            Error::Security(err) => err,
            other => SecurityError::Store(other.to_string()),
        }
    }
}
