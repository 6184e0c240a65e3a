//! Projection to include-tree compilation.

use std::collections::HashMap;

use crudguard_proto::path::{join, split_first};
use crudguard_proto::{Attributes, IncludeNode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{Catalog, ModelMeta};
use crate::error::{Error, Result};
use crate::security::ProjectionMask;

/// Projection as the planner consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawProjection", into = "RawProjection")]
pub enum PlannerProjection {
    /// Load only these paths.
    Inclusive(Vec<String>),
    /// Load everything except these paths.
    Exclusive(Vec<String>),
}

impl PlannerProjection {
    /// Paths named by the projection.
    pub fn paths(&self) -> &[String] {
        match self {
            PlannerProjection::Inclusive(paths) | PlannerProjection::Exclusive(paths) => paths,
        }
    }
}

impl From<&ProjectionMask> for PlannerProjection {
    fn from(mask: &ProjectionMask) -> Self {
        if mask.is_exclusive() {
            PlannerProjection::Exclusive(mask.excluded_paths())
        } else {
            PlannerProjection::Inclusive(mask.included_paths())
        }
    }
}

/// JSON forms: a path array, or `{exclusive, paths}`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawProjection {
    Paths(Vec<String>),
    Tagged {
        #[serde(default)]
        exclusive: bool,
        paths: Vec<String>,
    },
}

impl From<RawProjection> for PlannerProjection {
    fn from(raw: RawProjection) -> Self {
        match raw {
            RawProjection::Paths(paths) => PlannerProjection::Inclusive(paths),
            RawProjection::Tagged {
                exclusive: true,
                paths,
            } => PlannerProjection::Exclusive(paths),
            RawProjection::Tagged { paths, .. } => PlannerProjection::Inclusive(paths),
        }
    }
}

impl From<PlannerProjection> for RawProjection {
    fn from(projection: PlannerProjection) -> Self {
        match projection {
            PlannerProjection::Inclusive(paths) => RawProjection::Paths(paths),
            PlannerProjection::Exclusive(paths) => RawProjection::Tagged {
                exclusive: true,
                paths,
            },
        }
    }
}

/// Input to [`AssociationQueryPlanner::query_options`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueryOptionsRequest {
    /// Projection; `None` loads every association.
    pub projection: Option<PlannerProjection>,
    /// Deepest association level to load. `0` and `1` both mean direct
    /// associations of the root only.
    pub depth_level: usize,
}

impl QueryOptionsRequest {
    /// Request without a projection.
    pub fn new(depth_level: usize) -> Self {
        Self {
            projection: None,
            depth_level,
        }
    }

    /// Set the projection.
    pub fn with_projection(mut self, projection: PlannerProjection) -> Self {
        self.projection = Some(projection);
        self
    }
}

#[derive(Clone, Copy)]
enum Mode {
    Inclusive,
    Exclusive,
}

/// Paths grouped by their first segment at one level.
struct LevelPaths<'p> {
    attributes: Vec<&'p str>,
    /// Association name -> remainders (`None` for the bare association).
    associations: HashMap<&'p str, Vec<Option<&'p str>>>,
}

/// Compiles projections into include trees for a relational store.
pub struct AssociationQueryPlanner<'a> {
    catalog: &'a Catalog,
}

impl<'a> AssociationQueryPlanner<'a> {
    /// Create a planner over a catalog.
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Build the include tree for an entity.
    ///
    /// Associations at level `L` (direct associations are level 1) are
    /// included while `L <= max(depth_level, 1)`. Every node is
    /// non-duplicating and terminal nodes carry no `include` key.
    pub fn query_options(&self, entity: &str, request: &QueryOptionsRequest) -> Result<IncludeNode> {
        let model = self.catalog.model(entity)?;
        let max_level = request.depth_level.max(1);

        let (mode, paths): (Mode, Vec<&str>) = match &request.projection {
            None => (Mode::Exclusive, Vec::new()),
            Some(PlannerProjection::Inclusive(paths)) => {
                (Mode::Inclusive, paths.iter().map(String::as_str).collect())
            }
            Some(PlannerProjection::Exclusive(paths)) => {
                (Mode::Exclusive, paths.iter().map(String::as_str).collect())
            }
        };

        let root = self.plan_level(IncludeNode::root(), model, &paths, "", 1, max_level, mode)?;
        debug!(
            entity = %entity,
            depth = root.depth(),
            max_level,
            "planned include tree"
        );
        Ok(root)
    }

    /// Build the include tree for a resolved security mask.
    ///
    /// An empty mask plans as no projection.
    pub fn query_options_for_mask(
        &self,
        entity: &str,
        mask: &ProjectionMask,
        depth_level: usize,
    ) -> Result<IncludeNode> {
        let mut request = QueryOptionsRequest::new(depth_level);
        if !mask.is_empty() {
            request = request.with_projection(PlannerProjection::from(mask));
        }
        self.query_options(entity, &request)
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_level(
        &self,
        node: IncludeNode,
        model: &ModelMeta,
        paths: &[&str],
        prefix: &str,
        level: usize,
        max_level: usize,
        mode: Mode,
    ) -> Result<IncludeNode> {
        let grouped = self.group(model, paths, prefix)?;

        let mut node = node;
        if !grouped.attributes.is_empty() {
            let names = grouped.attributes.iter().map(|s| s.to_string()).collect();
            node = node.with_attributes(match mode {
                Mode::Inclusive => Attributes::Only(names),
                Mode::Exclusive => Attributes::Exclude { exclude: names },
            });
        }

        if level > max_level {
            return Ok(node);
        }

        let mut includes = Vec::new();
        for association in &model.associations {
            let remainders = grouped.associations.get(association.name.as_str());
            if matches!(mode, Mode::Inclusive) && remainders.is_none() {
                continue;
            }
            let child_paths: Vec<&str> = remainders
                .map(|r| r.iter().flatten().copied().collect())
                .unwrap_or_default();
            let target = self.catalog.model(&association.target)?;
            let child = self.plan_level(
                IncludeNode::association(&association.name),
                target,
                &child_paths,
                &join(prefix, &association.name),
                level + 1,
                max_level,
                mode,
            )?;
            includes.push(child);
        }

        Ok(node.with_includes(includes))
    }

    fn group<'p>(&self, model: &ModelMeta, paths: &[&'p str], prefix: &str) -> Result<LevelPaths<'p>> {
        let mut grouped = LevelPaths {
            attributes: Vec::new(),
            associations: HashMap::new(),
        };

        for &path in paths {
            let (head, rest) = split_first(path);
            if model.has_attribute(head) && rest.is_none() {
                if !grouped.attributes.contains(&head) {
                    grouped.attributes.push(head);
                }
            } else if model.association(head).is_some() {
                grouped.associations.entry(head).or_default().push(rest);
            } else {
                return Err(Error::UnknownPath {
                    entity: model.name.clone(),
                    path: join(prefix, path),
                });
            }
        }
        Ok(grouped)
    }
}
