//! Core error types.

use thiserror::Error;

use crate::security::SecurityError;

/// Core errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Permission resolution or enforcement failed.
    #[error(transparent)]
    Security(#[from] SecurityError),

    /// Store-facing type error.
    #[error("protocol error: {0}")]
    Protocol(#[from] crudguard_proto::Error),

    /// Entity is not registered in the catalog.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// Projection path names neither an attribute nor an association.
    #[error("unknown path '{path}' on entity '{entity}'")]
    UnknownPath {
        /// Entity the path was resolved against.
        entity: String,
        /// Offending path (relative to the entity).
        path: String,
    },

    /// Catalog definitions are inconsistent.
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
