//! Entity model metadata.

use serde::{Deserialize, Serialize};

/// An association from one entity to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationDef {
    /// Association name as used in projection paths.
    pub name: String,
    /// Target entity name.
    pub target: String,
}

impl AssociationDef {
    /// Create an association.
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
        }
    }
}

/// Scalar attributes and associations of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMeta {
    /// Entity name.
    pub name: String,
    /// Scalar attribute names, in declaration order.
    #[serde(default)]
    pub attributes: Vec<String>,
    /// Associations, in declaration order.
    #[serde(default)]
    pub associations: Vec<AssociationDef>,
}

impl ModelMeta {
    /// Create a model with no attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            associations: Vec::new(),
        }
    }

    /// Add a scalar attribute.
    pub fn with_attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(name.into());
        self
    }

    /// Add several scalar attributes.
    pub fn with_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.extend(names.into_iter().map(Into::into));
        self
    }

    /// Add an association.
    pub fn with_association(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.associations.push(AssociationDef::new(name, target));
        self
    }

    /// Check if a name is a scalar attribute.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }

    /// Look up an association by name.
    pub fn association(&self, name: &str) -> Option<&AssociationDef> {
        self.associations.iter().find(|a| a.name == name)
    }
}
