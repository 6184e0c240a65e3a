//! Security module for crudguard.
//!
//! This module decides what a caller may see and change:
//! - Per-role policies with row filters and field projections
//! - Multi-role permission resolution
//! - Projection mask encoding and decoding
//! - Field redaction and restore-on-update for JSON documents
//! - Store hooks that apply all of the above
//!
//! # Security Model
//!
//! The authentication layer supplies an [`Identity`] carrying a role list,
//! which is trusted as given. For each operation the roles are folded
//! against the entity's [`SecurityPolicy`] into a [`Permission`]:
//! granted, denied, or scoped to a row filter and field projection.
//!
//! # Example
//!
//! ```ignore
//! use crudguard_core::security::{
//!     Action, FilterTemplate, Identity, PermissionResolver, RolePermissions, ScopedRule,
//!     SecurityPolicy,
//! };
//!
//! let policy = SecurityPolicy::new().with_role(
//!     "USER",
//!     RolePermissions::new().scoped(
//!         Action::Read,
//!         ScopedRule::new()
//!             .with_where(FilterTemplate::attribute_eq("owner", "id"))
//!             .with_projection("-password"),
//!     ),
//! );
//!
//! let resolver = PermissionResolver::new("User", Some(Arc::new(policy)));
//! let identity = Identity::new(["USER"]).with_id("u-1");
//! let permission = resolver.require(Some(&identity), Action::Read)?;
//! ```

pub mod error;
pub mod identity;
pub mod interceptor;
pub mod policy;
pub mod projection;
pub mod redact;
pub mod resolver;

// Error types
pub use error::{SecurityError, SecurityResult};

// Identity
pub use identity::Identity;

// Policy types
pub use policy::{
    Action, FilterTemplate, PermissionRule, RolePermissions, ScopedRule, SecurityPolicy,
    WhereClause,
};

// Projection types
pub use projection::{ProjectionMask, ProjectionSpec};

// Resolution
pub use resolver::{
    resolve, resolve_with_roles, Permission, PermissionResolver, PermissionSet, ScopedPermission,
};

// Redaction
pub use redact::{redact_document, restore_removed, strip_removed};

// Hooks
pub use interceptor::{DocumentInterceptor, DocumentQuery, DocumentReader, HookContext, UpdateQuery};
