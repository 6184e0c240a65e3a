//! crudguard store-facing types.
//!
//! This crate defines the query option types the security core produces and
//! backing-store adapters consume. None of them carry behaviour beyond
//! construction helpers; the core decides what goes into them and the
//! adapter decides how to execute them.
//!
//! # Modules
//!
//! - [`filter`] - Recursive predicate tree over document fields
//! - [`query`] - Field selections, ordering, and adapter request options
//! - [`include`] - Include trees and cascade specifications for relational stores
//! - [`path`] - Dotted-path access into JSON documents
//! - [`error`] - Error types
//!
//! Every type is `serde`-serializable so plans can be logged, inspected, or
//! handed to a store binding in another process as JSON.

pub mod error;
pub mod filter;
pub mod include;
pub mod path;
pub mod query;

pub use error::Error;

pub use filter::Filter;
pub use include::{Attributes, CascadeField, CascadeInclude, IncludeNode};
pub use query::{FieldSelection, GetAllOptions, GetOneOptions, OrderDirection, OrderSpec};

/// Documents exchanged with backing stores.
pub type Document = serde_json::Value;
