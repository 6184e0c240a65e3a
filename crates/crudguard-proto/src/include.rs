//! Include trees for relational backing stores.
//!
//! An include tree mirrors the association structure of an entity. Each
//! node names an association, optionally restricts its attributes, and
//! lists nested includes. The JSON form matches what ORM-style relational
//! bindings take as eager-loading options.

use serde::{Deserialize, Serialize};

/// Attribute restriction on an include node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attributes {
    /// Load only these attributes.
    Only(Vec<String>),
    /// Load every attribute except these.
    Exclude {
        /// Attributes to leave out.
        exclude: Vec<String>,
    },
}

impl Attributes {
    /// Attribute names mentioned by this restriction.
    pub fn names(&self) -> &[String] {
        match self {
            Attributes::Only(names) => names,
            Attributes::Exclude { exclude } => exclude,
        }
    }
}

/// One level of an include tree.
///
/// The root node carries no association; every nested node does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeNode {
    /// Association name, absent on the root.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub association: Option<String>,
    /// Attribute restriction at this level.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub attributes: Option<Attributes>,
    /// Nested includes. Absent (not empty) at terminal nodes.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub include: Option<Vec<IncludeNode>>,
    /// Whether the store may duplicate parent rows when joining.
    pub duplicating: bool,
}

impl IncludeNode {
    /// Create a root node.
    pub fn root() -> Self {
        Self {
            association: None,
            attributes: None,
            include: None,
            duplicating: false,
        }
    }

    /// Create a node for an association.
    pub fn association(name: impl Into<String>) -> Self {
        Self {
            association: Some(name.into()),
            ..Self::root()
        }
    }

    /// Set the attribute restriction.
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Set nested includes; an empty list leaves the key absent.
    pub fn with_includes(mut self, include: Vec<IncludeNode>) -> Self {
        self.include = if include.is_empty() {
            None
        } else {
            Some(include)
        };
        self
    }

    /// Find a direct child by association name.
    pub fn child(&self, association: &str) -> Option<&IncludeNode> {
        self.include
            .as_deref()?
            .iter()
            .find(|node| node.association.as_deref() == Some(association))
    }

    /// Depth of the deepest include below this node (0 for a leaf).
    pub fn depth(&self) -> usize {
        self.include
            .as_deref()
            .map(|children| 1 + children.iter().map(IncludeNode::depth).max().unwrap_or(0))
            .unwrap_or(0)
    }
}

/// Caller-declared cascade entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CascadeField {
    /// Cascade into an association with no further constraint.
    Name(String),
    /// Cascade into an association and, optionally, its own cascade fields.
    Nested {
        /// Association name.
        field: String,
        /// Nested cascade entries.
        #[serde(
            rename = "cascadeFields",
            skip_serializing_if = "Option::is_none",
            default
        )]
        cascade_fields: Option<Vec<CascadeField>>,
    },
}

impl CascadeField {
    /// Bare association entry.
    pub fn name(field: impl Into<String>) -> Self {
        CascadeField::Name(field.into())
    }

    /// Nested entry.
    pub fn nested(field: impl Into<String>, cascade_fields: Vec<CascadeField>) -> Self {
        CascadeField::Nested {
            field: field.into(),
            cascade_fields: Some(cascade_fields),
        }
    }
}

/// Cascade entry compiled into include form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CascadeInclude {
    /// Bare association name, passed through.
    Name(String),
    /// Association with optional nested includes.
    Association {
        /// Association name.
        association: String,
        /// Nested includes.
        #[serde(skip_serializing_if = "Option::is_none", default)]
        include: Option<Vec<CascadeInclude>>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_root_serializes_without_optional_keys() {
        assert_eq!(
            serde_json::to_value(IncludeNode::root()).unwrap(),
            json!({ "duplicating": false })
        );
    }

    #[test]
    fn test_attributes_shapes() {
        let only = IncludeNode::root().with_attributes(Attributes::Only(vec!["name".into()]));
        assert_eq!(
            serde_json::to_value(only).unwrap(),
            json!({ "duplicating": false, "attributes": ["name"] })
        );

        let exclude = IncludeNode::association("individual").with_attributes(Attributes::Exclude {
            exclude: vec!["id".into()],
        });
        assert_eq!(
            serde_json::to_value(exclude).unwrap(),
            json!({
                "duplicating": false,
                "association": "individual",
                "attributes": { "exclude": ["id"] }
            })
        );
    }

    #[test]
    fn test_empty_includes_are_absent() {
        let node = IncludeNode::association("roles").with_includes(vec![]);
        assert!(node.include.is_none());
        assert_eq!(node.depth(), 0);
    }

    #[test]
    fn test_depth_and_child() {
        let root = IncludeNode::root().with_includes(vec![IncludeNode::association("individual")
            .with_includes(vec![IncludeNode::association("address")])]);
        assert_eq!(root.depth(), 2);
        assert!(root.child("individual").is_some());
        assert!(root.child("roles").is_none());
    }

    #[test]
    fn test_cascade_field_from_json() {
        let fields: Vec<CascadeField> = serde_json::from_value(json!([
            { "field": "employees", "cascadeFields": ["address"] },
            "individual"
        ]))
        .unwrap();

        assert_eq!(
            fields,
            vec![
                CascadeField::nested("employees", vec![CascadeField::name("address")]),
                CascadeField::name("individual"),
            ]
        );
    }
}
