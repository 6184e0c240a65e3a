//! Collections that run permission hooks before every operation.

use std::sync::Arc;

use crudguard_core::security::{
    DocumentInterceptor, DocumentQuery, HookContext, PermissionResolver, UpdateQuery,
};
use crudguard_core::GuardConfig;
use crudguard_proto::{FieldSelection, Filter, OrderSpec};
use serde_json::Value;

use crate::error::Result;
use crate::store::{Collection, FindOptions};

/// A collection guarded by an entity's security policy.
#[derive(Clone)]
pub struct GuardedCollection {
    collection: Collection,
    interceptor: DocumentInterceptor,
}

impl GuardedCollection {
    /// Guard `collection` with `resolver`.
    pub fn new(collection: Collection, resolver: PermissionResolver, guard: GuardConfig) -> Self {
        let reader = Arc::new(collection.clone());
        Self {
            interceptor: DocumentInterceptor::new(resolver, reader, guard),
            collection,
        }
    }

    /// The unguarded collection.
    pub fn inner(&self) -> &Collection {
        &self.collection
    }

    /// Hooks applied by this collection.
    pub fn interceptor(&self) -> &DocumentInterceptor {
        &self.interceptor
    }

    /// Find documents visible to the caller.
    pub async fn find(
        &self,
        ctx: HookContext<'_>,
        filter: Option<Filter>,
        sort: Vec<OrderSpec>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>> {
        let mut query = DocumentQuery::new(filter);
        self.interceptor.pre_find(ctx, &mut query).await?;
        let options = FindOptions {
            selection: query.selection,
            sort,
            skip: 0,
            limit,
        };
        self.collection.find(query.filter.as_ref(), &options)
    }

    /// Find the first document visible to the caller.
    pub async fn find_one(
        &self,
        ctx: HookContext<'_>,
        filter: Option<Filter>,
        selection: Option<FieldSelection>,
    ) -> Result<Option<Value>> {
        let mut query = DocumentQuery {
            filter,
            selection,
        };
        self.interceptor.pre_find_one(ctx, &mut query).await?;
        self.collection
            .find_one(query.filter.as_ref(), query.selection.as_ref())
    }

    /// Update the first document the caller may update.
    ///
    /// Changes to fields outside the caller's update projection are
    /// reverted before the write.
    pub async fn find_one_and_update(
        &self,
        ctx: HookContext<'_>,
        filter: Option<Filter>,
        update: Value,
    ) -> Result<Option<Value>> {
        let mut query = UpdateQuery::new(filter, update);
        self.interceptor.pre_update(ctx, &mut query).await?;
        self.collection.update_one(query.filter.as_ref(), query.update)
    }

    /// Remove the first document the caller may delete.
    pub async fn find_one_and_remove(
        &self,
        ctx: HookContext<'_>,
        filter: Option<Filter>,
    ) -> Result<Option<Value>> {
        let mut query = DocumentQuery::new(filter);
        self.interceptor.pre_delete(ctx, &mut query).await?;
        self.collection.delete_one(query.filter.as_ref())
    }

    /// Insert a document, dropping fields the caller may not create.
    pub async fn save(&self, ctx: HookContext<'_>, mut document: Value) -> Result<Value> {
        self.interceptor.pre_save(ctx, &mut document).await?;
        self.collection.insert(document)
    }
}
