//! Multi-role permission resolution.
//!
//! Roles are folded in the order the identity lists them. A grant reached
//! at any point dominates the rest of the fold; a role with no rule for
//! the action resets the accumulator to denied, discarding any partial
//! scope collected from earlier roles.

use std::sync::Arc;

use crudguard_proto::Filter;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::{debug, trace};

use super::error::{SecurityError, SecurityResult};
use super::identity::Identity;
use super::policy::{Action, PermissionRule, ScopedRule, SecurityPolicy};
use super::projection::ProjectionMask;
use crate::config::ReservedRoles;

/// Resolved access for one action.
#[derive(Debug, Clone, PartialEq)]
pub enum Permission {
    /// Unrestricted.
    Granted,
    /// No access.
    Denied,
    /// Access within a row scope and/or field projection.
    Scoped(ScopedPermission),
}

/// Row and field restrictions of a scoped permission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopedPermission {
    /// Row filter alternatives, OR-combined. Empty means no row restriction.
    pub filters: Vec<Filter>,
    /// Merged field projection.
    pub projection: Option<ProjectionMask>,
}

impl Permission {
    /// Check for an unconditional grant.
    pub fn is_granted(&self) -> bool {
        matches!(self, Permission::Granted)
    }

    /// Check for a denial.
    pub fn is_denied(&self) -> bool {
        matches!(self, Permission::Denied)
    }

    /// Row filter: the single fragment, or an OR of all fragments.
    pub fn filter(&self) -> Option<Filter> {
        match self {
            Permission::Scoped(scoped) => Filter::any_of(scoped.filters.clone()),
            _ => None,
        }
    }

    /// Raw filter fragments.
    pub fn filters(&self) -> &[Filter] {
        match self {
            Permission::Scoped(scoped) => &scoped.filters,
            _ => &[],
        }
    }

    /// Field projection. Empty masks count as no projection.
    pub fn projection(&self) -> Option<&ProjectionMask> {
        match self {
            Permission::Scoped(scoped) => scoped.projection.as_ref().filter(|m| !m.is_empty()),
            _ => None,
        }
    }
}

impl Serialize for Permission {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Permission::Granted => serializer.serialize_bool(true),
            Permission::Denied => serializer.serialize_bool(false),
            Permission::Scoped(scoped) => {
                let mut map = serializer.serialize_map(None)?;
                if !scoped.filters.is_empty() {
                    map.serialize_entry("where", &scoped.filters)?;
                }
                if let Some(projection) = &scoped.projection {
                    map.serialize_entry("projection", projection)?;
                }
                map.end()
            }
        }
    }
}

/// Resolve with the default reserved roles.
pub fn resolve(
    policy: Option<&SecurityPolicy>,
    identity: Option<&Identity>,
    action: Action,
) -> SecurityResult<Permission> {
    resolve_with_roles(policy, identity, action, &ReservedRoles::default())
}

/// Resolve a permission for an identity.
///
/// Without an identity the call is trusted and access is granted.
pub fn resolve_with_roles(
    policy: Option<&SecurityPolicy>,
    identity: Option<&Identity>,
    action: Action,
    reserved: &ReservedRoles,
) -> SecurityResult<Permission> {
    match identity {
        None => Ok(Permission::Granted),
        Some(identity) => fold_roles(policy, identity, action, reserved),
    }
}

fn fold_roles(
    policy: Option<&SecurityPolicy>,
    identity: &Identity,
    action: Action,
    reserved: &ReservedRoles,
) -> SecurityResult<Permission> {
    let mut acc = Permission::Denied;

    for role in &identity.roles {
        if acc.is_granted()
            || *role == reserved.admin
            || (action == Action::Read && *role == reserved.read_admin)
        {
            acc = Permission::Granted;
            continue;
        }

        let Some(policy) = policy else {
            acc = Permission::Denied;
            continue;
        };

        acc = match policy.role(role).and_then(|r| r.rule(action)) {
            Some(PermissionRule::Flag(true)) => Permission::Granted,
            None | Some(PermissionRule::Flag(false)) => Permission::Denied,
            Some(PermissionRule::Scoped(rule)) => merge_scoped(acc, rule, identity)?,
        };
        trace!(role = %role, action = %action, "folded role");
    }

    Ok(acc)
}

fn merge_scoped(
    acc: Permission,
    rule: &ScopedRule,
    identity: &Identity,
) -> SecurityResult<Permission> {
    let (previous_filters, previous_projection) = match acc {
        Permission::Scoped(scoped) => (scoped.filters, scoped.projection),
        _ => (Vec::new(), None),
    };

    let filters = match &rule.where_clause {
        Some(clause) => {
            let mut filters = previous_filters;
            filters.push(clause.evaluate(identity)?);
            filters
        }
        None => Vec::new(),
    };

    let mut projection = previous_projection.unwrap_or_default();
    if let Some(spec) = &rule.projection {
        projection.merge(&spec.decode());
    }

    Ok(Permission::Scoped(ScopedPermission {
        filters,
        projection: (!projection.is_empty()).then_some(projection),
    }))
}

/// Permission for each action, as handed to the CRUD facade.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionSet {
    /// Create permission.
    pub create: Permission,
    /// Read permission.
    pub read: Permission,
    /// Update permission.
    pub update: Permission,
    /// Delete permission.
    pub delete: Permission,
}

impl PermissionSet {
    /// Grant every action.
    pub fn granted() -> Self {
        Self {
            create: Permission::Granted,
            read: Permission::Granted,
            update: Permission::Granted,
            delete: Permission::Granted,
        }
    }

    /// Permission for an action.
    pub fn get(&self, action: Action) -> &Permission {
        match action {
            Action::Create => &self.create,
            Action::Read => &self.read,
            Action::Update => &self.update,
            Action::Delete => &self.delete,
        }
    }

    /// Replace the permission for an action.
    pub fn with(mut self, action: Action, permission: Permission) -> Self {
        match action {
            Action::Create => self.create = permission,
            Action::Read => self.read = permission,
            Action::Update => self.update = permission,
            Action::Delete => self.delete = permission,
        }
        self
    }
}

impl Default for PermissionSet {
    fn default() -> Self {
        Self::granted()
    }
}

/// Permission resolver bound to one entity's policy.
#[derive(Debug, Clone)]
pub struct PermissionResolver {
    entity: String,
    policy: Option<Arc<SecurityPolicy>>,
    reserved: ReservedRoles,
}

impl PermissionResolver {
    /// Create a resolver for an entity.
    pub fn new(entity: impl Into<String>, policy: Option<Arc<SecurityPolicy>>) -> Self {
        Self {
            entity: entity.into(),
            policy,
            reserved: ReservedRoles::default(),
        }
    }

    /// Override the reserved role names.
    pub fn with_reserved_roles(mut self, reserved: ReservedRoles) -> Self {
        self.reserved = reserved;
        self
    }

    /// Entity name.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Resolve the permission for an action.
    pub fn resolve(&self, identity: Option<&Identity>, action: Action) -> SecurityResult<Permission> {
        let permission =
            resolve_with_roles(self.policy.as_deref(), identity, action, &self.reserved)?;
        debug!(
            entity = %self.entity,
            action = %action,
            outcome = outcome_kind(&permission),
            "resolved permission"
        );
        Ok(permission)
    }

    /// Resolve, turning a denial into an error.
    pub fn require(&self, identity: Option<&Identity>, action: Action) -> SecurityResult<Permission> {
        match self.resolve(identity, action)? {
            Permission::Denied => Err(SecurityError::access_denied(&self.entity, action)),
            permission => Ok(permission),
        }
    }

    /// Resolve every action.
    pub fn resolve_all(&self, identity: Option<&Identity>) -> SecurityResult<PermissionSet> {
        Ok(PermissionSet {
            create: self.resolve(identity, Action::Create)?,
            read: self.resolve(identity, Action::Read)?,
            update: self.resolve(identity, Action::Update)?,
            delete: self.resolve(identity, Action::Delete)?,
        })
    }
}

fn outcome_kind(permission: &Permission) -> &'static str {
    match permission {
        Permission::Granted => "granted",
        Permission::Denied => "denied",
        Permission::Scoped(_) => "scoped",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::policy::{FilterTemplate, RolePermissions};
    use serde_json::json;

    fn scoped_policy() -> SecurityPolicy {
        SecurityPolicy::new()
            .with_role(
                "USER",
                RolePermissions::new()
                    .scoped(
                        Action::Read,
                        ScopedRule::new()
                            .with_where(FilterTemplate::attribute_eq("number", "number"))
                            .with_projection("-password -number"),
                    )
                    .allow(Action::Create),
            )
            .with_role(
                "OWNER",
                RolePermissions::new().scoped(
                    Action::Read,
                    ScopedRule::new()
                        .with_where(FilterTemplate::attribute_eq("owner", "id"))
                        .with_projection("number"),
                ),
            )
            .with_role(
                "VIEWER",
                RolePermissions::new().scoped(
                    Action::Read,
                    ScopedRule::new().with_projection("-salary"),
                ),
            )
            .with_role("GUEST", RolePermissions::new().deny(Action::Read))
    }

    fn user(roles: &[&str]) -> Identity {
        Identity::new(roles.iter().copied())
            .with_id("u-1")
            .with_attribute("number", 5)
    }

    #[test]
    fn test_no_identity_is_granted() {
        let policy = scoped_policy();
        for action in Action::ALL {
            assert!(resolve(Some(&policy), None, action).unwrap().is_granted());
        }
        assert!(resolve(None, None, Action::Delete).unwrap().is_granted());
    }

    #[test]
    fn test_admin_roles() {
        let policy = scoped_policy();
        let admin = user(&["USER", "ADMIN"]);
        assert!(resolve(Some(&policy), Some(&admin), Action::Delete)
            .unwrap()
            .is_granted());

        let reader = user(&["ADMIN_READ"]);
        assert!(resolve(Some(&policy), Some(&reader), Action::Read)
            .unwrap()
            .is_granted());
        assert!(resolve(Some(&policy), Some(&reader), Action::Update)
            .unwrap()
            .is_denied());
    }

    #[test]
    fn test_grant_dominates_later_roles() {
        let policy = scoped_policy();
        let identity = user(&["ADMIN", "GUEST"]);
        assert!(resolve(Some(&policy), Some(&identity), Action::Read)
            .unwrap()
            .is_granted());

        let identity = user(&["USER", "GUEST"]);
        assert!(resolve(Some(&policy), Some(&identity), Action::Create)
            .unwrap()
            .is_granted());
    }

    #[test]
    fn test_single_scoped_role() {
        let policy = scoped_policy();
        let permission = resolve(Some(&policy), Some(&user(&["USER"])), Action::Read).unwrap();

        assert_eq!(permission.filters(), &[Filter::eq("number", 5)]);
        assert_eq!(permission.filter(), Some(Filter::eq("number", 5)));
        assert_eq!(
            permission.projection(),
            Some(&ProjectionMask::decode("-password -number"))
        );
    }

    #[test]
    fn test_scoped_roles_or_filters_and_merge_projection() {
        let policy = scoped_policy();
        let permission =
            resolve(Some(&policy), Some(&user(&["USER", "OWNER"])), Action::Read).unwrap();

        assert_eq!(
            permission.filter(),
            Some(Filter::or(vec![Filter::eq("number", 5), Filter::eq("owner", "u-1")]))
        );
        // Later role wins on `number`, which keeps its original position.
        let projection = permission.projection().unwrap();
        assert_eq!(
            projection.iter().collect::<Vec<_>>(),
            vec![("password", false), ("number", true)]
        );
        assert!(projection.is_exclusive());
    }

    #[test]
    fn test_rule_without_where_clears_filters() {
        let policy = scoped_policy();
        let permission =
            resolve(Some(&policy), Some(&user(&["USER", "VIEWER"])), Action::Read).unwrap();

        assert!(permission.filters().is_empty());
        assert_eq!(permission.filter(), None);
        assert_eq!(
            permission.projection(),
            Some(&ProjectionMask::decode("-password -number -salary"))
        );
    }

    #[test]
    fn test_missing_rule_discards_partial_scope() {
        let policy = scoped_policy();
        for roles in [&["USER", "GUEST"][..], &["USER", "STRANGER"][..]] {
            let permission = resolve(Some(&policy), Some(&user(roles)), Action::Read).unwrap();
            assert!(permission.is_denied(), "roles {:?}", roles);
        }

        // Order matters: the scoped role applies after the unknown one.
        let permission =
            resolve(Some(&policy), Some(&user(&["STRANGER", "USER"])), Action::Read).unwrap();
        assert!(matches!(permission, Permission::Scoped(_)));
    }

    #[test]
    fn test_no_policy_denies_non_admin() {
        let identity = user(&["USER"]);
        assert!(resolve(None, Some(&identity), Action::Read).unwrap().is_denied());
        let identity = user(&["ADMIN_READ", "USER"]);
        assert!(resolve(None, Some(&identity), Action::Read).unwrap().is_granted());
        assert!(resolve(None, Some(&Identity::new(Vec::<String>::new())), Action::Read)
            .unwrap()
            .is_denied());
    }

    #[test]
    fn test_missing_template_attribute_errors() {
        let policy = scoped_policy();
        let identity = Identity::new(["OWNER"]);
        let err = resolve(Some(&policy), Some(&identity), Action::Read).unwrap_err();
        assert!(matches!(err, SecurityError::PolicyCompilation(_)));
    }

    #[test]
    fn test_resolver_require_and_reserved_roles() {
        let resolver = PermissionResolver::new("User", Some(Arc::new(scoped_policy())))
            .with_reserved_roles(ReservedRoles {
                admin: "ROOT".to_string(),
                read_admin: "AUDITOR".to_string(),
            });

        let err = resolver
            .require(Some(&user(&["GUEST"])), Action::Read)
            .unwrap_err();
        assert_eq!(err.to_string(), "Access is denied: cannot read User");

        assert!(resolver
            .require(Some(&user(&["ROOT"])), Action::Delete)
            .unwrap()
            .is_granted());
        assert!(resolver
            .resolve(Some(&user(&["ADMIN"])), Action::Delete)
            .unwrap()
            .is_denied());
        assert!(resolver
            .resolve(Some(&user(&["AUDITOR"])), Action::Read)
            .unwrap()
            .is_granted());
    }

    #[test]
    fn test_resolve_all() {
        let resolver = PermissionResolver::new("User", Some(Arc::new(scoped_policy())));
        let set = resolver.resolve_all(Some(&user(&["USER"]))).unwrap();
        assert!(set.create.is_granted());
        assert!(matches!(set.get(Action::Read), Permission::Scoped(_)));
        assert!(set.update.is_denied());
        assert!(set.delete.is_denied());

        assert_eq!(PermissionSet::default(), PermissionSet::granted());
    }

    #[test]
    fn test_permission_serialization() {
        assert_eq!(serde_json::to_value(Permission::Granted).unwrap(), json!(true));
        assert_eq!(serde_json::to_value(Permission::Denied).unwrap(), json!(false));

        let permission = resolve(
            Some(&scoped_policy()),
            Some(&user(&["USER"])),
            Action::Read,
        )
        .unwrap();
        assert_eq!(
            serde_json::to_value(&permission).unwrap(),
            json!({
                "where": [{ "eq": { "field": "number", "value": 5 } }],
                "projection": { "password": 0, "number": 0 }
            })
        );
    }
}
