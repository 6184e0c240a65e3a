//! Protocol error types.

use thiserror::Error;

/// Errors raised while building or decoding query option types.
#[derive(Debug, Error)]
pub enum Error {
    /// A value could not be converted to JSON.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A JSON value did not have the expected shape.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// A field path was empty or malformed.
    #[error("invalid field path: {0:?}")]
    InvalidPath(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Deserialization(err.to_string())
    }
}
