//! Include planning for relational backing stores.
//!
//! The planner turns a field projection into a nested include tree using
//! the catalog's association graph; the cascade mapper turns declared
//! cascade fields into include form for writes.

mod cascade;
mod include;

pub use cascade::cascade_fields_to_include;
pub use include::{AssociationQueryPlanner, PlannerProjection, QueryOptionsRequest};
