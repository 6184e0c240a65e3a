//! Store hooks that enforce permissions on queries and documents.
//!
//! A document store calls the matching hook before executing each
//! operation. Read and delete hooks narrow the query; the save hook strips
//! fields from a new document; the update hook narrows the query and
//! reverts changes to fields the caller may not modify.

use std::sync::Arc;

use async_trait::async_trait;
use crudguard_proto::{FieldSelection, Filter};
use serde_json::Value;
use tracing::debug;

use super::error::SecurityResult;
use super::identity::Identity;
use super::policy::Action;
use super::redact::{restore_removed, strip_removed};
use super::resolver::{Permission, PermissionResolver};
use crate::config::GuardConfig;

/// Read-back capability the update hook needs.
#[async_trait]
pub trait DocumentReader: Send + Sync {
    /// Fetch the first stored document matching `filter`, unprojected.
    async fn find_one(&self, filter: Option<&Filter>) -> SecurityResult<Option<Value>>;
}

/// Caller context passed to every hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct HookContext<'a> {
    /// Authenticated caller; `None` for trusted internal calls.
    pub identity: Option<&'a Identity>,
}

impl<'a> HookContext<'a> {
    /// Context for an authenticated caller.
    pub fn new(identity: &'a Identity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    /// Context for a trusted internal call.
    pub fn internal() -> Self {
        Self { identity: None }
    }
}

/// A pending find, find-one or delete.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentQuery {
    /// Caller conditions.
    pub filter: Option<Filter>,
    /// Field selection.
    pub selection: Option<FieldSelection>,
}

impl DocumentQuery {
    /// Query with the given conditions.
    pub fn new(filter: Option<Filter>) -> Self {
        Self {
            filter,
            selection: None,
        }
    }

    /// Require at least one alternative to match, on top of the existing
    /// conditions. An empty list leaves the query unchanged.
    pub fn or(&mut self, alternatives: Vec<Filter>) -> &mut Self {
        if let Some(alternatives) = Filter::any_of(alternatives) {
            self.filter = Filter::conjoin(self.filter.take(), Some(alternatives));
        }
        self
    }

    /// Narrow the field selection.
    ///
    /// The result never shows a field that either selection hides.
    pub fn select(&mut self, selection: FieldSelection) -> &mut Self {
        self.selection = Some(match self.selection.take() {
            None => selection,
            Some(current) => narrow_selection(current, selection),
        });
        self
    }
}

fn narrow_selection(current: FieldSelection, restriction: FieldSelection) -> FieldSelection {
    use FieldSelection::{Exclude, Include};

    match (current, restriction) {
        (Exclude(mut current), Exclude(restriction)) => {
            for path in restriction {
                if !current.contains(&path) {
                    current.push(path);
                }
            }
            Exclude(current)
        }
        (Include(current), Include(restriction)) => {
            let kept: Vec<String> = current
                .into_iter()
                .filter(|p| restriction.contains(p))
                .collect();
            if kept.is_empty() {
                Include(restriction)
            } else {
                Include(kept)
            }
        }
        (Include(current), Exclude(restriction)) => {
            Include(current.into_iter().filter(|p| !restriction.contains(p)).collect())
        }
        (Exclude(current), Include(restriction)) => {
            Include(restriction.into_iter().filter(|p| !current.contains(p)).collect())
        }
    }
}

/// A pending find-and-update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateQuery {
    /// Conditions selecting the record.
    pub filter: Option<Filter>,
    /// Partial document of fields to set.
    pub update: Value,
}

impl UpdateQuery {
    /// Create an update query.
    pub fn new(filter: Option<Filter>, update: Value) -> Self {
        Self { filter, update }
    }
}

/// Permission hooks for one entity's store operations.
#[derive(Clone)]
pub struct DocumentInterceptor {
    resolver: PermissionResolver,
    reader: Arc<dyn DocumentReader>,
    config: GuardConfig,
}

impl DocumentInterceptor {
    /// Create an interceptor. The resolver takes the configured reserved roles.
    pub fn new(
        resolver: PermissionResolver,
        reader: Arc<dyn DocumentReader>,
        config: GuardConfig,
    ) -> Self {
        Self {
            resolver: resolver.with_reserved_roles(config.reserved_roles.clone()),
            reader,
            config,
        }
    }

    /// Entity this interceptor guards.
    pub fn entity(&self) -> &str {
        self.resolver.entity()
    }

    /// Resolver used by the hooks.
    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    /// Guard a find.
    pub async fn pre_find(&self, ctx: HookContext<'_>, query: &mut DocumentQuery) -> SecurityResult<()> {
        self.scope_query(ctx, query, Action::Read)
    }

    /// Guard a find-one.
    pub async fn pre_find_one(
        &self,
        ctx: HookContext<'_>,
        query: &mut DocumentQuery,
    ) -> SecurityResult<()> {
        self.scope_query(ctx, query, Action::Read)
    }

    /// Guard a find-and-remove.
    pub async fn pre_delete(
        &self,
        ctx: HookContext<'_>,
        query: &mut DocumentQuery,
    ) -> SecurityResult<()> {
        self.scope_query(ctx, query, Action::Delete)
    }

    /// Guard a save: strip fields the caller may not create.
    pub async fn pre_save(&self, ctx: HookContext<'_>, document: &mut Value) -> SecurityResult<()> {
        let permission = self.resolver.require(ctx.identity, Action::Create)?;
        if let Some(mask) = permission.projection() {
            let removed = strip_removed(document, mask, &self.config.reserved_prefix);
            debug!(entity = %self.entity(), removed = removed.len(), "applied create projection");
        }
        Ok(())
    }

    /// Guard a find-and-update.
    ///
    /// Reads the stored record (with the caller's own conditions) before
    /// the update proceeds, so restricted fields keep their stored value.
    /// The read-back takes the first record matching those conditions, so
    /// callers updating under a projection should pass a filter that
    /// identifies a single record. Otherwise restored values may come from
    /// a different record than the one updated.
    pub async fn pre_update(&self, ctx: HookContext<'_>, query: &mut UpdateQuery) -> SecurityResult<()> {
        let permission = self.resolver.require(ctx.identity, Action::Update)?;
        let caller_filter = query.filter.clone();

        if let Permission::Scoped(scoped) = &permission {
            if let Some(alternatives) = Filter::any_of(scoped.filters.clone()) {
                query.filter = Filter::conjoin(query.filter.take(), Some(alternatives));
            }
        }

        if let Some(mask) = permission.projection() {
            let previous = self.reader.find_one(caller_filter.as_ref()).await?;
            let restored = restore_removed(
                &mut query.update,
                mask,
                previous.as_ref(),
                &self.config.reserved_prefix,
            );
            debug!(entity = %self.entity(), restored = restored.len(), "applied update projection");
        }
        Ok(())
    }

    fn scope_query(
        &self,
        ctx: HookContext<'_>,
        query: &mut DocumentQuery,
        action: Action,
    ) -> SecurityResult<()> {
        let permission = self.resolver.require(ctx.identity, action)?;
        query.or(permission.filters().to_vec());
        if let Some(mask) = permission.projection() {
            query.select(mask.to_selection());
        }
        Ok(())
    }
}
