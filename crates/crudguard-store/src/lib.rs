//! crudguard store - a sled-backed document store with permission hooks.
//!
//! [`DocumentStore`] keeps each collection in its own sled tree.
//! [`Collection`] implements both the CRUD facade's adapter contract and the
//! read-back capability the update hook needs, so it can sit behind either
//! integration style:
//!
//! - [`crudguard_core::CrudFacade`] over a [`Collection`]
//! - [`GuardedCollection`], which runs the document hooks inline

pub mod config;
pub mod error;
pub mod filter;
pub mod guarded;
pub mod store;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use filter::{apply_selection, sort_documents, FilterEvaluator};
pub use guarded::GuardedCollection;
pub use store::{Collection, DocumentStore, FindOptions};
