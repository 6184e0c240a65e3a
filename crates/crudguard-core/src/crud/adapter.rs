//! Store adapter contract for the CRUD facade.

use async_trait::async_trait;
use crudguard_proto::{Filter, GetAllOptions, GetOneOptions};
use serde_json::Value;
use thiserror::Error;

use crate::security::SecurityError;

/// Persistence operations the facade delegates to.
///
/// Filters and projections arrive fully composed; adapters execute them
/// as given.
#[async_trait]
pub trait CrudAdapter: Send + Sync {
    /// Store error, surfaced to callers unmodified.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read one page of records.
    async fn exec_get_all(&self, options: GetAllOptions) -> Result<Vec<Value>, Self::Error>;

    /// Count matching records.
    async fn exec_count(&self, filter: Option<Filter>) -> Result<u64, Self::Error>;

    /// Read the first matching record.
    async fn exec_get_one(&self, options: GetOneOptions) -> Result<Option<Value>, Self::Error>;

    /// Insert a record, returning it as stored.
    async fn exec_add_one(&self, payload: Value) -> Result<Value, Self::Error>;

    /// Apply `payload` to the first matching record, returning the updated record.
    async fn exec_update_one(
        &self,
        filter: Option<Filter>,
        payload: Value,
    ) -> Result<Option<Value>, Self::Error>;

    /// Remove the first matching record, returning it.
    async fn exec_delete_one(&self, filter: Option<Filter>) -> Result<Option<Value>, Self::Error>;
}

/// Facade errors.
#[derive(Debug, Error)]
pub enum CrudError<E>
where
    E: std::error::Error + 'static,
{
    /// Access denied or policy failure.
    #[error(transparent)]
    Security(#[from] SecurityError),

    /// Adapter failure.
    #[error(transparent)]
    Store(E),
}

impl<E> CrudError<E>
where
    E: std::error::Error + 'static,
{
    /// Check if this error is an access denial.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, CrudError::Security(err) if err.is_access_denied())
    }
}

/// Result type for facade operations.
pub type CrudResult<T, E> = Result<T, CrudError<E>>;
