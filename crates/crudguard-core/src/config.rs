//! Configuration for the security core and per-entity CRUD behaviour.

use crudguard_proto::{CascadeField, CascadeInclude};
use serde::{Deserialize, Serialize};

use crate::planner::cascade_fields_to_include;
use crate::security::ProjectionSpec;

/// Default prefix of store-internal document fields.
pub const DEFAULT_RESERVED_PREFIX: &str = "_";

/// Default role granted unconditional access to every action.
pub const DEFAULT_ADMIN_ROLE: &str = "ADMIN";

/// Default role granted unconditional read access.
pub const DEFAULT_READ_ADMIN_ROLE: &str = "ADMIN_READ";

/// Default page size for list reads.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Default store-internal identifier field.
pub const DEFAULT_INTERNAL_ID_FIELD: &str = "_id";

/// Externally exposed identifier field.
pub const EXTERNAL_ID_FIELD: &str = "id";

/// Roles that bypass policy lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservedRoles {
    /// Role granted every action.
    pub admin: String,
    /// Role granted `read`.
    pub read_admin: String,
}

impl Default for ReservedRoles {
    fn default() -> Self {
        Self {
            admin: DEFAULT_ADMIN_ROLE.to_string(),
            read_admin: DEFAULT_READ_ADMIN_ROLE.to_string(),
        }
    }
}

/// Security core configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Fields starting with this prefix are never redacted or restored.
    pub reserved_prefix: String,
    /// Reserved role names.
    pub reserved_roles: ReservedRoles,
}

impl GuardConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reserved field prefix.
    pub fn with_reserved_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.reserved_prefix = prefix.into();
        self
    }

    /// Set the reserved role names.
    pub fn with_reserved_roles(mut self, roles: ReservedRoles) -> Self {
        self.reserved_roles = roles;
        self
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            reserved_prefix: DEFAULT_RESERVED_PREFIX.to_string(),
            reserved_roles: ReservedRoles::default(),
        }
    }
}

/// Per-entity CRUD configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    /// Entity name, used in logs and access-denied errors.
    pub name: String,
    /// Projection for list and single reads that overrides the permission projection.
    pub excerpt_projection: Option<ProjectionSpec>,
    /// Fields matched by the free-text `search` filter.
    pub search_fields: Vec<String>,
    /// Translate `id` to the internal identifier in filters.
    pub underscored_id: bool,
    /// Internal identifier field name.
    pub internal_id_field: String,
    /// Associations to include on writes.
    pub cascade_fields: Vec<CascadeField>,
    /// Page size when a list request does not name one.
    pub default_page_size: u32,
}

impl EntityConfig {
    /// Create a configuration for an entity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the excerpt projection.
    pub fn with_excerpt_projection(mut self, projection: impl Into<ProjectionSpec>) -> Self {
        self.excerpt_projection = Some(projection.into());
        self
    }

    /// Set the searchable fields.
    pub fn with_search_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Expose the internal identifier as `id`.
    pub fn with_underscored_id(mut self) -> Self {
        self.underscored_id = true;
        self
    }

    /// Set the internal identifier field.
    pub fn with_internal_id_field(mut self, field: impl Into<String>) -> Self {
        self.internal_id_field = field.into();
        self
    }

    /// Set the cascade fields.
    pub fn with_cascade_fields(mut self, fields: Vec<CascadeField>) -> Self {
        self.cascade_fields = fields;
        self
    }

    /// Set the default page size.
    pub fn with_default_page_size(mut self, size: u32) -> Self {
        self.default_page_size = size.max(1);
        self
    }

    /// Cascade fields compiled into include form.
    pub fn cascade_includes(&self) -> Vec<CascadeInclude> {
        cascade_fields_to_include(&self.cascade_fields)
    }
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            excerpt_projection: None,
            search_fields: Vec::new(),
            underscored_id: false,
            internal_id_field: DEFAULT_INTERNAL_ID_FIELD.to_string(),
            cascade_fields: Vec::new(),
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_defaults() {
        let config = GuardConfig::default();
        assert_eq!(config.reserved_prefix, "_");
        assert_eq!(config.reserved_roles.admin, "ADMIN");
        assert_eq!(config.reserved_roles.read_admin, "ADMIN_READ");
    }

    #[test]
    fn test_entity_builder() {
        let config = EntityConfig::new("User")
            .with_search_fields(["firstName", "lastName"])
            .with_underscored_id()
            .with_default_page_size(0)
            .with_cascade_fields(vec![CascadeField::name("individual")]);

        assert_eq!(config.search_fields, vec!["firstName", "lastName"]);
        assert!(config.underscored_id);
        assert_eq!(config.internal_id_field, "_id");
        assert_eq!(config.default_page_size, 1);
        assert_eq!(
            config.cascade_includes(),
            vec![CascadeInclude::Name("individual".into())]
        );
    }

    #[test]
    fn test_entity_config_from_json() {
        let config: EntityConfig = serde_json::from_str(
            r#"{ "name": "User", "excerpt_projection": "firstName lastName", "search_fields": ["firstName"] }"#,
        )
        .unwrap();

        assert_eq!(config.name, "User");
        assert_eq!(config.default_page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(
            config.excerpt_projection,
            Some(ProjectionSpec::Text("firstName lastName".into()))
        );
    }
}
