//! Catalog of entity models.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::model::ModelMeta;
use crate::error::{Error, Result};

/// Entity models keyed by name.
///
/// Serializes as a list of models; deserialization validates the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ModelMeta>", into = "Vec<ModelMeta>")]
pub struct Catalog {
    models: HashMap<String, ModelMeta>,
    /// Registration order, for stable listing.
    order: Vec<String>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from models, validating association targets.
    pub fn from_models(models: impl IntoIterator<Item = ModelMeta>) -> Result<Self> {
        let mut catalog = Self::new();
        for model in models {
            catalog.insert(model)?;
        }
        catalog.validate()?;
        Ok(catalog)
    }

    /// Add a model. Targets are not checked until [`Catalog::validate`].
    pub fn with_model(mut self, model: ModelMeta) -> Result<Self> {
        self.insert(model)?;
        Ok(self)
    }

    fn insert(&mut self, model: ModelMeta) -> Result<()> {
        if self.models.contains_key(&model.name) {
            return Err(Error::InvalidCatalog(format!(
                "duplicate model: {}",
                model.name
            )));
        }

        let mut seen = HashSet::new();
        let names = model
            .attributes
            .iter()
            .chain(model.associations.iter().map(|a| &a.name));
        for name in names {
            if !seen.insert(name.as_str()) {
                return Err(Error::InvalidCatalog(format!(
                    "duplicate member '{}' on model '{}'",
                    name, model.name
                )));
            }
        }

        self.order.push(model.name.clone());
        self.models.insert(model.name.clone(), model);
        Ok(())
    }

    /// Check that every association targets a registered model.
    pub fn validate(&self) -> Result<()> {
        for model in self.models() {
            for association in &model.associations {
                if !self.models.contains_key(&association.target) {
                    return Err(Error::InvalidCatalog(format!(
                        "association '{}.{}' targets unknown model '{}'",
                        model.name, association.name, association.target
                    )));
                }
            }
        }
        Ok(())
    }

    /// Look up a model.
    pub fn get(&self, name: &str) -> Option<&ModelMeta> {
        self.models.get(name)
    }

    /// Look up a model, failing for unknown names.
    pub fn model(&self, name: &str) -> Result<&ModelMeta> {
        self.get(name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// Model an association of `entity` points at.
    pub fn target_of(&self, entity: &str, association: &str) -> Result<&ModelMeta> {
        let model = self.model(entity)?;
        let def = model.association(association).ok_or_else(|| Error::UnknownPath {
            entity: entity.to_string(),
            path: association.to_string(),
        })?;
        self.model(&def.target)
    }

    /// Models in registration order.
    pub fn models(&self) -> impl Iterator<Item = &ModelMeta> {
        self.order.iter().filter_map(|name| self.models.get(name))
    }

    /// Number of models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Check if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl TryFrom<Vec<ModelMeta>> for Catalog {
    type Error = Error;

    fn try_from(models: Vec<ModelMeta>) -> Result<Self> {
        Self::from_models(models)
    }
}

impl From<Catalog> for Vec<ModelMeta> {
    fn from(mut catalog: Catalog) -> Self {
        catalog
            .order
            .iter()
            .filter_map(|name| catalog.models.remove(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Catalog {
        Catalog::from_models([
            ModelMeta::new("User")
                .with_attributes(["id", "name"])
                .with_association("manager", "User"),
            ModelMeta::new("Role").with_attributes(["id", "key"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_lookup() {
        let catalog = sample();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.model("User").unwrap().name, "User");
        assert!(matches!(catalog.model("Nope"), Err(Error::UnknownEntity(_))));
        // Cycles are fine.
        assert_eq!(catalog.target_of("User", "manager").unwrap().name, "User");
        assert!(matches!(
            catalog.target_of("User", "roles"),
            Err(Error::UnknownPath { .. })
        ));
    }

    #[test]
    fn test_rejects_dangling_target() {
        let err = Catalog::from_models([ModelMeta::new("User").with_association("roles", "Role")])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCatalog(_)));
    }

    #[test]
    fn test_rejects_duplicates() {
        let err = Catalog::new()
            .with_model(ModelMeta::new("User"))
            .unwrap()
            .with_model(ModelMeta::new("User"))
            .unwrap_err();
        assert!(err.to_string().contains("duplicate model"));

        let err = Catalog::from_models([ModelMeta::new("User")
            .with_attribute("role")
            .with_association("role", "User")])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate member"));
    }

    #[test]
    fn test_json_round_trip_keeps_order() {
        let json = json!([
            { "name": "User", "attributes": ["id"], "associations": [{ "name": "roles", "target": "Role" }] },
            { "name": "Role", "attributes": ["id", "key"] }
        ]);
        let catalog: Catalog = serde_json::from_value(json).unwrap();
        let names: Vec<_> = catalog.models().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["User", "Role"]);

        let back = serde_json::to_value(&catalog).unwrap();
        assert_eq!(back[1]["name"], "Role");
        assert_eq!(back[1]["associations"], json!([]));

        let bad = json!([{ "name": "User", "associations": [{ "name": "roles", "target": "Role" }] }]);
        assert!(serde_json::from_value::<Catalog>(bad).is_err());
    }
}
