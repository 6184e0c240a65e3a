//! Sled-backed document store.
//!
//! Each collection is a sled tree keyed by document identifier, holding
//! JSON-encoded documents. Queries scan the tree and evaluate filters in
//! memory.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use crudguard_core::crud::CrudAdapter;
use crudguard_core::security::{DocumentReader, SecurityResult};
use crudguard_proto::{FieldSelection, Filter, GetAllOptions, GetOneOptions, OrderSpec};
use serde_json::Value;
use sled::{Db, Tree};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::filter::{apply_selection, sort_documents, FilterEvaluator};

/// Prefix for collection tree names.
const COLLECTION_PREFIX: &str = "collection:";

/// The document store wrapping sled.
pub struct DocumentStore {
    /// The underlying sled database.
    db: Db,
    /// Identifier field for every collection.
    id_field: String,
}

impl DocumentStore {
    /// Open or create a store with the given configuration.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let db = config.to_sled_config().open()?;
        info!(
            path = %config.path.display(),
            temporary = config.temporary,
            recovered = db.was_recovered(),
            "opened document store"
        );
        Ok(Self {
            db,
            id_field: config.id_field,
        })
    }

    /// Open (or create) a collection.
    pub fn collection(&self, name: &str) -> Result<Collection> {
        let tree = self.db.open_tree(format!("{}{}", COLLECTION_PREFIX, name))?;
        Ok(Collection {
            name: name.to_string(),
            tree,
            id_field: self.id_field.clone(),
        })
    }

    /// Names of existing collections.
    pub fn collection_names(&self) -> Vec<String> {
        self.db
            .tree_names()
            .iter()
            .filter_map(|name| {
                std::str::from_utf8(name)
                    .ok()?
                    .strip_prefix(COLLECTION_PREFIX)
                    .map(str::to_string)
            })
            .collect()
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Generate a new document identifier.
    ///
    /// Time-ordered: nanosecond timestamp followed by a process-wide counter,
    /// hex-encoded.
    pub fn generate_id() -> String {
        // Counter to ensure uniqueness even with same timestamp
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let counter = COUNTER.fetch_add(1, Ordering::SeqCst);

        format!("{:016x}{:016x}", now, counter)
    }
}

/// Options for [`Collection::find`].
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Field selection for each result.
    pub selection: Option<FieldSelection>,
    /// Ordering.
    pub sort: Vec<OrderSpec>,
    /// Number of matches to skip.
    pub skip: usize,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

/// A named collection of JSON documents.
#[derive(Clone)]
pub struct Collection {
    name: String,
    tree: Tree,
    id_field: String,
}

impl Collection {
    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier field.
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Insert a document, assigning an identifier when it has none.
    pub fn insert(&self, mut document: Value) -> Result<Value> {
        let object = document
            .as_object_mut()
            .ok_or_else(|| Error::InvalidDocument("document must be an object".into()))?;
        let id = object
            .entry(self.id_field.clone())
            .or_insert_with(|| Value::String(DocumentStore::generate_id()))
            .clone();

        let key = Self::key_for(&id)?;
        let bytes = serde_json::to_vec(&document)?;
        if self
            .tree
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(bytes))?
            .is_err()
        {
            return Err(Error::InvalidDocument(format!("duplicate id: {}", key)));
        }
        debug!(collection = %self.name, id = %key, "inserted document");
        Ok(document)
    }

    /// Find matching documents.
    pub fn find(&self, filter: Option<&Filter>, options: &FindOptions) -> Result<Vec<Value>> {
        let mut documents = self.scan_matching(filter)?;
        sort_documents(&mut documents, &options.sort);

        let limit = options.limit.unwrap_or(usize::MAX);
        Ok(documents
            .into_iter()
            .skip(options.skip)
            .take(limit)
            .map(|doc| self.select(doc, options.selection.as_ref()))
            .collect())
    }

    /// Find the first matching document.
    pub fn find_one(
        &self,
        filter: Option<&Filter>,
        selection: Option<&FieldSelection>,
    ) -> Result<Option<Value>> {
        Ok(self
            .first_match(filter)?
            .map(|(_, doc)| self.select(doc, selection)))
    }

    /// Count matching documents.
    pub fn count(&self, filter: Option<&Filter>) -> Result<u64> {
        Ok(self.scan_matching(filter)?.len() as u64)
    }

    /// Set the top-level fields of `update` on the first matching document.
    ///
    /// The identifier never changes. Returns the updated document.
    pub fn update_one(&self, filter: Option<&Filter>, update: Value) -> Result<Option<Value>> {
        let Value::Object(fields) = update else {
            return Err(Error::InvalidDocument("update must be an object".into()));
        };
        let Some((key, mut document)) = self.first_match(filter)? else {
            return Ok(None);
        };

        if let Some(object) = document.as_object_mut() {
            for (field, value) in fields {
                if field != self.id_field {
                    object.insert(field, value);
                }
            }
        }
        self.tree.insert(key.as_bytes(), serde_json::to_vec(&document)?)?;
        debug!(collection = %self.name, id = %key, "updated document");
        Ok(Some(document))
    }

    /// Remove the first matching document, returning it.
    pub fn delete_one(&self, filter: Option<&Filter>) -> Result<Option<Value>> {
        let Some((key, document)) = self.first_match(filter)? else {
            return Ok(None);
        };
        self.tree.remove(key.as_bytes())?;
        debug!(collection = %self.name, id = %key, "deleted document");
        Ok(Some(document))
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Check if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Remove every document.
    pub fn clear(&self) -> Result<()> {
        self.tree.clear()?;
        Ok(())
    }

    fn select(&self, document: Value, selection: Option<&FieldSelection>) -> Value {
        match selection {
            Some(selection) => apply_selection(document, selection, &self.id_field),
            None => document,
        }
    }

    fn scan_matching(&self, filter: Option<&Filter>) -> Result<Vec<Value>> {
        let mut documents = Vec::new();
        for entry in self.tree.iter() {
            let (_, bytes) = entry?;
            let document: Value = serde_json::from_slice(&bytes)?;
            if FilterEvaluator::matches(filter, &document) {
                documents.push(document);
            }
        }
        Ok(documents)
    }

    fn first_match(&self, filter: Option<&Filter>) -> Result<Option<(String, Value)>> {
        for entry in self.tree.iter() {
            let (key, bytes) = entry?;
            let document: Value = serde_json::from_slice(&bytes)?;
            if FilterEvaluator::matches(filter, &document) {
                let key = String::from_utf8_lossy(&key).into_owned();
                return Ok(Some((key, document)));
            }
        }
        Ok(None)
    }

    fn key_for(id: &Value) -> Result<String> {
        match id {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(Error::InvalidDocument(format!(
                "identifier must be a string or number, got {}",
                other
            ))),
        }
    }
}

#[async_trait]
impl CrudAdapter for Collection {
    type Error = Error;

    async fn exec_get_all(&self, options: GetAllOptions) -> Result<Vec<Value>> {
        let find = FindOptions {
            selection: options.projection.clone(),
            sort: options.sort.clone(),
            skip: options.offset(),
            limit: Some(options.size as usize),
        };
        self.find(options.filter.as_ref(), &find)
    }

    async fn exec_count(&self, filter: Option<Filter>) -> Result<u64> {
        self.count(filter.as_ref())
    }

    async fn exec_get_one(&self, options: GetOneOptions) -> Result<Option<Value>> {
        self.find_one(options.filter.as_ref(), options.projection.as_ref())
    }

    async fn exec_add_one(&self, payload: Value) -> Result<Value> {
        self.insert(payload)
    }

    async fn exec_update_one(&self, filter: Option<Filter>, payload: Value) -> Result<Option<Value>> {
        self.update_one(filter.as_ref(), payload)
    }

    async fn exec_delete_one(&self, filter: Option<Filter>) -> Result<Option<Value>> {
        self.delete_one(filter.as_ref())
    }
}

#[async_trait]
impl DocumentReader for Collection {
    async fn find_one(&self, filter: Option<&Filter>) -> SecurityResult<Option<Value>> {
        Ok(Collection::find_one(self, filter, None)?)
    }
}
