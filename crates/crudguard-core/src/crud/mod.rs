//! Permission-aware CRUD facade over a pluggable store adapter.
//!
//! The facade composes filters and projections from a [`PermissionSet`]
//! and the entity's [`EntityConfig`](crate::config::EntityConfig), then
//! delegates persistence to a [`CrudAdapter`].
//!
//! [`PermissionSet`]: crate::security::PermissionSet

mod adapter;
mod facade;

pub use adapter::{CrudAdapter, CrudError, CrudResult};
pub use facade::{CrudFacade, ListRequest, QueryFilter};
