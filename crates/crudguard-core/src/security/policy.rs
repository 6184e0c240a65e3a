//! Per-role security policy definitions.
//!
//! A policy maps role names to per-action rules. Rules are either a flag
//! (`true` grants everything, `false` is the same as no rule) or a scoped
//! rule carrying a row filter and a field projection.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crudguard_proto::Filter;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::error::{SecurityError, SecurityResult};
use super::identity::Identity;
use super::projection::ProjectionSpec;

/// Operation a permission is resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Insert a new record.
    Create,
    /// Read records.
    Read,
    /// Modify an existing record.
    Update,
    /// Remove a record.
    Delete,
}

impl Action {
    /// Every action, in CRUD order.
    pub const ALL: [Action; 4] = [Action::Create, Action::Read, Action::Update, Action::Delete];

    /// Lowercase name, as used in policy documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(Action::Create),
            "read" => Ok(Action::Read),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            other => Err(SecurityError::InvalidPolicy(format!("unknown action: {}", other))),
        }
    }
}

/// Row filter that can reference identity attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterTemplate {
    /// A literal filter.
    Standard(Filter),
    /// Field equals an identity attribute.
    /// Example: `owner = identity.id`
    AttributeEq {
        /// Field in the entity.
        field: String,
        /// Identity attribute name.
        attribute: String,
    },
    /// Field is one of the values held by an identity attribute.
    AttributeIn {
        /// Field in the entity.
        field: String,
        /// Identity attribute name; an array or a single value.
        attribute: String,
    },
    /// All templates must match.
    And(Vec<FilterTemplate>),
    /// At least one template must match.
    Or(Vec<FilterTemplate>),
}

impl FilterTemplate {
    /// Create an attribute equality template.
    pub fn attribute_eq(field: impl Into<String>, attribute: impl Into<String>) -> Self {
        FilterTemplate::AttributeEq {
            field: field.into(),
            attribute: attribute.into(),
        }
    }

    /// Create an attribute IN template.
    pub fn attribute_in(field: impl Into<String>, attribute: impl Into<String>) -> Self {
        FilterTemplate::AttributeIn {
            field: field.into(),
            attribute: attribute.into(),
        }
    }

    /// Resolve attribute references against an identity.
    pub fn resolve(&self, identity: &Identity) -> SecurityResult<Filter> {
        match self {
            FilterTemplate::Standard(filter) => Ok(filter.clone()),
            FilterTemplate::AttributeEq { field, attribute } => {
                let value = Self::lookup(identity, attribute)?;
                Ok(Filter::eq(field.clone(), value))
            }
            FilterTemplate::AttributeIn { field, attribute } => {
                let values = match Self::lookup(identity, attribute)? {
                    Value::Array(values) => values,
                    single => vec![single],
                };
                Ok(Filter::in_values(field.clone(), values))
            }
            FilterTemplate::And(templates) => {
                let filters = templates
                    .iter()
                    .map(|t| t.resolve(identity))
                    .collect::<SecurityResult<Vec<_>>>()?;
                Ok(Filter::all_of(filters).unwrap_or_else(|| Filter::and(Vec::new())))
            }
            FilterTemplate::Or(templates) => {
                let filters = templates
                    .iter()
                    .map(|t| t.resolve(identity))
                    .collect::<SecurityResult<Vec<_>>>()?;
                Ok(Filter::any_of(filters).unwrap_or_else(|| Filter::or(Vec::new())))
            }
        }
    }

    fn lookup(identity: &Identity, attribute: &str) -> SecurityResult<Value> {
        identity.attribute(attribute).ok_or_else(|| {
            SecurityError::PolicyCompilation(format!("missing identity attribute: {}", attribute))
        })
    }
}

/// Closure computing a row filter from the caller.
pub type WhereFn = dyn Fn(&Identity) -> Filter + Send + Sync;

/// Row filter of a scoped rule.
#[derive(Clone)]
pub enum WhereClause {
    /// Declarative template, serializable.
    Template(FilterTemplate),
    /// Filter computed in code. Cannot be serialized.
    Dynamic(Arc<WhereFn>),
}

impl WhereClause {
    /// Wrap a closure.
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&Identity) -> Filter + Send + Sync + 'static,
    {
        WhereClause::Dynamic(Arc::new(f))
    }

    /// Compute the filter for an identity.
    pub fn evaluate(&self, identity: &Identity) -> SecurityResult<Filter> {
        match self {
            WhereClause::Template(template) => template.resolve(identity),
            WhereClause::Dynamic(f) => Ok(f(identity)),
        }
    }
}

impl fmt::Debug for WhereClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WhereClause::Template(template) => f.debug_tuple("Template").field(template).finish(),
            WhereClause::Dynamic(_) => f.write_str("Dynamic(<fn>)"),
        }
    }
}

impl From<FilterTemplate> for WhereClause {
    fn from(template: FilterTemplate) -> Self {
        WhereClause::Template(template)
    }
}

impl Serialize for WhereClause {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WhereClause::Template(template) => template.serialize(serializer),
            WhereClause::Dynamic(_) => Err(serde::ser::Error::custom(
                "dynamic where clauses cannot be serialized",
            )),
        }
    }
}

impl<'de> Deserialize<'de> for WhereClause {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        FilterTemplate::deserialize(deserializer).map(WhereClause::Template)
    }
}

/// A rule that grants access within a row filter and/or a field projection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopedRule {
    /// Row filter. Without one, this role places no row restriction.
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<WhereClause>,
    /// Field projection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<ProjectionSpec>,
}

impl ScopedRule {
    /// Create an empty scoped rule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a declarative row filter.
    pub fn with_where(mut self, template: FilterTemplate) -> Self {
        self.where_clause = Some(WhereClause::Template(template));
        self
    }

    /// Set a computed row filter.
    pub fn with_where_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Identity) -> Filter + Send + Sync + 'static,
    {
        self.where_clause = Some(WhereClause::dynamic(f));
        self
    }

    /// Set the projection.
    pub fn with_projection(mut self, projection: impl Into<ProjectionSpec>) -> Self {
        self.projection = Some(projection.into());
        self
    }
}

/// Rule for one role and action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionRule {
    /// `true` grants unconditionally; `false` is treated as absent.
    Flag(bool),
    /// Filter and/or projection.
    Scoped(ScopedRule),
}

impl From<bool> for PermissionRule {
    fn from(flag: bool) -> Self {
        PermissionRule::Flag(flag)
    }
}

impl From<ScopedRule> for PermissionRule {
    fn from(rule: ScopedRule) -> Self {
        PermissionRule::Scoped(rule)
    }
}

/// Rules of a single role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RolePermissions {
    rules: HashMap<Action, PermissionRule>,
}

impl RolePermissions {
    /// Create a role with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant an action unconditionally.
    pub fn allow(self, action: Action) -> Self {
        self.with_rule(action, PermissionRule::Flag(true))
    }

    /// Record an explicit `false` rule.
    pub fn deny(self, action: Action) -> Self {
        self.with_rule(action, PermissionRule::Flag(false))
    }

    /// Grant an action within a scope.
    pub fn scoped(self, action: Action, rule: ScopedRule) -> Self {
        self.with_rule(action, PermissionRule::Scoped(rule))
    }

    /// Set the rule for an action.
    pub fn with_rule(mut self, action: Action, rule: impl Into<PermissionRule>) -> Self {
        self.rules.insert(action, rule.into());
        self
    }

    /// Rule for an action.
    pub fn rule(&self, action: Action) -> Option<&PermissionRule> {
        self.rules.get(&action)
    }
}

/// Role name -> role rules. Immutable once built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecurityPolicy {
    roles: HashMap<String, RolePermissions>,
}

impl SecurityPolicy {
    /// Create an empty policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a role.
    pub fn with_role(mut self, role: impl Into<String>, permissions: RolePermissions) -> Self {
        self.roles.insert(role.into(), permissions);
        self
    }

    /// Rules of a role.
    pub fn role(&self, role: &str) -> Option<&RolePermissions> {
        self.roles.get(role)
    }

    /// Role names, unordered.
    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    /// Parse a policy document.
    pub fn from_json(json: &str) -> SecurityResult<Self> {
        serde_json::from_str(json).map_err(|e| SecurityError::InvalidPolicy(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_parse_and_display() {
        assert_eq!("READ".parse::<Action>().unwrap(), Action::Read);
        assert_eq!(Action::Delete.to_string(), "delete");
        assert!("drop".parse::<Action>().is_err());
    }

    #[test]
    fn test_template_resolution() {
        let identity = Identity::new(["USER"])
            .with_id("u-1")
            .with_attribute("orgs", json!(["a", "b"]))
            .with_attribute("number", 5);

        let filter = FilterTemplate::attribute_eq("owner", "id")
            .resolve(&identity)
            .unwrap();
        assert_eq!(filter, Filter::eq("owner", "u-1"));

        let filter = FilterTemplate::attribute_in("org", "orgs")
            .resolve(&identity)
            .unwrap();
        assert_eq!(filter, Filter::in_values("org", vec![json!("a"), json!("b")]));

        let filter = FilterTemplate::attribute_in("number", "number")
            .resolve(&identity)
            .unwrap();
        assert_eq!(filter, Filter::in_values("number", vec![json!(5)]));
    }

    #[test]
    fn test_template_missing_attribute() {
        let identity = Identity::new(["USER"]);
        let err = FilterTemplate::And(vec![
            FilterTemplate::Standard(Filter::eq("active", true)),
            FilterTemplate::attribute_eq("org", "org_id"),
        ])
        .resolve(&identity)
        .unwrap_err();
        assert!(matches!(err, SecurityError::PolicyCompilation(_)));
    }

    #[test]
    fn test_dynamic_where() {
        let rule = ScopedRule::new().with_where_fn(|identity: &Identity| {
            Filter::eq("number", identity.attribute("number").unwrap_or(Value::Null))
        });
        let identity = Identity::new(["USER"]).with_attribute("number", 3);
        let filter = rule.where_clause.unwrap().evaluate(&identity).unwrap();
        assert_eq!(filter, Filter::eq("number", 3));
    }

    #[test]
    fn test_policy_from_json() {
        let policy = SecurityPolicy::from_json(
            r#"{
                "USER": {
                    "read": {
                        "where": { "attribute_eq": { "field": "number", "attribute": "number" } },
                        "projection": "-password"
                    },
                    "create": true,
                    "delete": false
                }
            }"#,
        )
        .unwrap();

        let role = policy.role("USER").unwrap();
        assert!(matches!(role.rule(Action::Create), Some(PermissionRule::Flag(true))));
        assert!(matches!(role.rule(Action::Delete), Some(PermissionRule::Flag(false))));
        assert!(role.rule(Action::Update).is_none());
        match role.rule(Action::Read) {
            Some(PermissionRule::Scoped(rule)) => {
                assert!(rule.where_clause.is_some());
                assert_eq!(rule.projection, Some(ProjectionSpec::from("-password")));
            }
            other => panic!("unexpected rule: {:?}", other),
        }
    }

    #[test]
    fn test_policy_rejects_unknown_action() {
        let err = SecurityPolicy::from_json(r#"{ "USER": { "drop": true } }"#).unwrap_err();
        assert!(matches!(err, SecurityError::InvalidPolicy(_)));
    }

    #[test]
    fn test_dynamic_where_does_not_serialize() {
        let policy = SecurityPolicy::new().with_role(
            "USER",
            RolePermissions::new().scoped(
                Action::Read,
                ScopedRule::new().with_where_fn(|_: &Identity| Filter::eq("a", 1)),
            ),
        );
        assert!(serde_json::to_string(&policy).is_err());

        let policy = SecurityPolicy::new().with_role(
            "USER",
            RolePermissions::new().scoped(
                Action::Read,
                ScopedRule::new().with_where(FilterTemplate::attribute_eq("a", "id")),
            ),
        );
        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(
            json,
            json!({ "USER": { "read": { "where": { "attribute_eq": { "field": "a", "attribute": "id" } } } } })
        );
    }
}
