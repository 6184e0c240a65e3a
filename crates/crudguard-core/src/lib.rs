//! crudguard core - permission resolution, field redaction, and include planning.
//!
//! This crate sits between a CRUD surface and a backing store. Given an
//! identity's roles and an entity's security policy it decides which
//! records and which fields an operation may touch, and compiles that
//! into store-facing query options.
//!
//! # Modules
//!
//! - [`security`] - Policies, permission resolution, projection masks, redaction, store hooks
//! - [`catalog`] - Entity model metadata
//! - [`planner`] - Include-tree planning for relational stores
//! - [`crud`] - CRUD facade over a store adapter
//! - [`config`] - Guard and per-entity configuration

pub mod catalog;
pub mod config;
pub mod crud;
pub mod error;
pub mod planner;
pub mod security;

pub use catalog::{AssociationDef, Catalog, ModelMeta};
pub use config::{EntityConfig, GuardConfig, ReservedRoles};
pub use crud::{CrudAdapter, CrudError, CrudFacade, CrudResult, ListRequest, QueryFilter};
pub use error::{Error, Result};
pub use planner::{
    cascade_fields_to_include, AssociationQueryPlanner, PlannerProjection, QueryOptionsRequest,
};

// Security exports
pub use security::{
    Action, DocumentInterceptor, DocumentQuery, DocumentReader, FilterTemplate, HookContext,
    Identity, Permission, PermissionResolver, PermissionRule, PermissionSet, ProjectionMask,
    ProjectionSpec, RolePermissions, ScopedPermission, ScopedRule, SecurityError, SecurityPolicy,
    SecurityResult, UpdateQuery,
};

/// Re-export store-facing types.
pub use crudguard_proto as proto;
