//! Model metadata for association planning.
//!
//! The catalog holds each entity's scalar attributes and its associations.
//! Associations point at other entities by name, so cyclic graphs (a user
//! with a manager who is a user) are expressible; planners bound recursion
//! by depth.

mod catalog;
mod model;

pub use catalog::Catalog;
pub use model::{AssociationDef, ModelMeta};
