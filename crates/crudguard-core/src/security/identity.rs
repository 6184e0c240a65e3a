//! Authenticated identity handed to the core by the authentication layer.
//!
//! The core never proves identity; it trusts the role list it is given.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An already-authenticated caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Caller identifier, if the authentication layer supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Role names, in the order permissions are folded.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Extra attributes referenced by policy filter templates (e.g. `org_id`).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, Value>,
}

impl Identity {
    /// Create an identity with the given roles.
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: None,
            roles: roles.into_iter().map(Into::into).collect(),
            attributes: HashMap::new(),
        }
    }

    /// Set the caller identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Append a role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Set an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Check if the identity carries a role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Look up an attribute for filter template resolution.
    ///
    /// `id` and `roles` resolve to the identity's own fields unless an
    /// attribute of the same name was set explicitly.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.attributes.get(name) {
            return Some(value.clone());
        }
        match name {
            "id" => self.id.clone().map(Value::String),
            "roles" => Some(Value::from(self.roles.clone())),
            _ => None,
        }
    }
}
