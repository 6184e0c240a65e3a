//! CRUD facade.

use crudguard_proto::{FieldSelection, Filter, GetAllOptions, GetOneOptions, OrderSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::adapter::{CrudAdapter, CrudError, CrudResult};
use crate::config::{EntityConfig, GuardConfig, EXTERNAL_ID_FIELD};
use crate::security::{
    restore_removed, strip_removed, Action, Permission, PermissionSet, SecurityError,
};

/// Caller-supplied record selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryFilter {
    /// Structured criteria.
    pub criteria: Option<Filter>,
    /// Free-text term matched against the entity's search fields.
    pub search: Option<String>,
}

impl QueryFilter {
    /// No restriction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select by criteria.
    pub fn criteria(filter: Filter) -> Self {
        Self {
            criteria: Some(filter),
            search: None,
        }
    }

    /// Add a free-text term.
    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }
}

impl From<Filter> for QueryFilter {
    fn from(filter: Filter) -> Self {
        Self::criteria(filter)
    }
}

/// A paged list request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListRequest {
    /// Zero-based page index.
    pub page: u32,
    /// Page size; the entity's default when absent.
    pub size: Option<u32>,
    /// Record selection.
    pub filter: QueryFilter,
    /// Ordering.
    pub sort: Vec<OrderSpec>,
}

impl ListRequest {
    /// First page with the default size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page.
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    /// Set the page size.
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Set the record selection.
    pub fn with_filter(mut self, filter: impl Into<QueryFilter>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Add an ordering.
    pub fn with_sort(mut self, order: OrderSpec) -> Self {
        self.sort.push(order);
        self
    }
}

/// Permission-aware CRUD operations for one entity.
///
/// The permission filter is a hard scope; the caller's filter refines
/// within it, so the two are AND-combined.
pub struct CrudFacade<A> {
    adapter: A,
    config: EntityConfig,
    guard: GuardConfig,
}

impl<A: CrudAdapter> CrudFacade<A> {
    /// Create a facade.
    pub fn new(adapter: A, config: EntityConfig) -> Self {
        Self {
            adapter,
            config,
            guard: GuardConfig::default(),
        }
    }

    /// Set the guard configuration (reserved prefix).
    pub fn with_guard(mut self, guard: GuardConfig) -> Self {
        self.guard = guard;
        self
    }

    /// Underlying adapter.
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Entity configuration.
    pub fn config(&self) -> &EntityConfig {
        &self.config
    }

    /// Read one page of records.
    pub async fn get_all(
        &self,
        request: ListRequest,
        permissions: &PermissionSet,
    ) -> CrudResult<Vec<Value>, A::Error> {
        let permission = self.permission(permissions, Action::Read)?;
        let options = GetAllOptions {
            page: request.page,
            size: request.size.unwrap_or(self.config.default_page_size),
            projection: self.read_selection(permission),
            filter: self.result_filter(request.filter, permission.filter()),
            sort: request.sort,
        };
        debug!(entity = %self.config.name, page = options.page, size = options.size, "get_all");
        self.adapter
            .exec_get_all(options)
            .await
            .map_err(CrudError::Store)
    }

    /// Count matching records.
    pub async fn count(
        &self,
        filter: QueryFilter,
        permissions: &PermissionSet,
    ) -> CrudResult<u64, A::Error> {
        let permission = self.permission(permissions, Action::Read)?;
        let filter = self.result_filter(filter, permission.filter());
        self.adapter.exec_count(filter).await.map_err(CrudError::Store)
    }

    /// Read the first matching record.
    pub async fn get_one(
        &self,
        filter: QueryFilter,
        permissions: &PermissionSet,
    ) -> CrudResult<Option<Value>, A::Error> {
        let permission = self.permission(permissions, Action::Read)?;
        let options = GetOneOptions {
            filter: self.result_filter(filter, permission.filter()),
            projection: self.read_selection(permission),
        };
        self.adapter
            .exec_get_one(options)
            .await
            .map_err(CrudError::Store)
    }

    /// Insert a record, dropping fields the caller may not create.
    pub async fn add_one(
        &self,
        mut payload: Value,
        permissions: &PermissionSet,
    ) -> CrudResult<Value, A::Error> {
        let permission = self.permission(permissions, Action::Create)?;
        if let Some(mask) = permission.projection() {
            let removed = strip_removed(&mut payload, mask, &self.guard.reserved_prefix);
            debug!(entity = %self.config.name, removed = ?removed, "applied create projection");
        }
        self.adapter
            .exec_add_one(payload)
            .await
            .map_err(CrudError::Store)
    }

    /// Update the first matching record.
    ///
    /// Fields the caller may not change are reset to their stored value
    /// rather than failing the update. Stored values are read with the
    /// caller's filter alone, which should identify a single record.
    pub async fn update_one(
        &self,
        filter: QueryFilter,
        mut payload: Value,
        permissions: &PermissionSet,
    ) -> CrudResult<Option<Value>, A::Error> {
        let permission = self.permission(permissions, Action::Update)?;

        if let Some(mask) = permission.projection() {
            let caller_filter = self.result_filter(filter.clone(), None);
            let existing = self
                .adapter
                .exec_get_one(GetOneOptions::by_filter(caller_filter))
                .await
                .map_err(CrudError::Store)?;
            let restored = restore_removed(
                &mut payload,
                mask,
                existing.as_ref(),
                &self.guard.reserved_prefix,
            );
            debug!(entity = %self.config.name, restored = ?restored, "applied update projection");
        }

        let filter = self.result_filter(filter, permission.filter());
        self.adapter
            .exec_update_one(filter, payload)
            .await
            .map_err(CrudError::Store)
    }

    /// Remove the first matching record.
    pub async fn delete_one(
        &self,
        filter: QueryFilter,
        permissions: &PermissionSet,
    ) -> CrudResult<Option<Value>, A::Error> {
        let permission = self.permission(permissions, Action::Delete)?;
        let filter = self.result_filter(filter, permission.filter());
        self.adapter
            .exec_delete_one(filter)
            .await
            .map_err(CrudError::Store)
    }

    fn permission<'p>(
        &self,
        permissions: &'p PermissionSet,
        action: Action,
    ) -> Result<&'p Permission, SecurityError> {
        match permissions.get(action) {
            Permission::Denied => Err(SecurityError::access_denied(&self.config.name, action)),
            permission => Ok(permission),
        }
    }

    /// Permission filter AND caller criteria AND search.
    fn result_filter(&self, query: QueryFilter, permission_filter: Option<Filter>) -> Option<Filter> {
        let mut criteria = query.criteria;
        if let Some(term) = query.search {
            match self.search_filter(&term) {
                Some(search) => criteria = Filter::conjoin(criteria, Some(search)),
                None => warn!(
                    entity = %self.config.name,
                    "search term ignored: entity declares no search fields"
                ),
            }
        }

        let mut filter = Filter::conjoin(permission_filter, criteria);
        if self.config.underscored_id {
            if let Some(filter) = filter.as_mut() {
                filter.rename_field(EXTERNAL_ID_FIELD, &self.config.internal_id_field);
            }
        }
        filter
    }

    fn search_filter(&self, term: &str) -> Option<Filter> {
        let pattern = format!("%{}%", escape_like(term));
        Filter::any_of(
            self.config
                .search_fields
                .iter()
                .map(|field| Filter::ilike(field.clone(), pattern.clone()))
                .collect(),
        )
    }

    /// Excerpt projection wins over the permission's.
    fn read_selection(&self, permission: &Permission) -> Option<FieldSelection> {
        let excerpt = self
            .config
            .excerpt_projection
            .as_ref()
            .map(|spec| spec.decode())
            .filter(|mask| !mask.is_empty());
        match excerpt {
            Some(mask) => Some(mask.to_selection()),
            None => permission.projection().map(|mask| mask.to_selection()),
        }
    }
}

/// Escape LIKE wildcards so a search term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{ProjectionMask, ScopedPermission};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, thiserror::Error)]
    #[error("mock store failure")]
    struct MockError;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        GetAll(GetAllOptions),
        Count(Option<Filter>),
        GetOne(GetOneOptions),
        AddOne(Value),
        UpdateOne(Option<Filter>, Value),
        DeleteOne(Option<Filter>),
    }

    #[derive(Default)]
    struct MockAdapter {
        calls: Mutex<Vec<Call>>,
        stored: Option<Value>,
        fail: bool,
    }

    impl MockAdapter {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) -> Result<(), MockError> {
            self.calls.lock().unwrap().push(call);
            if self.fail {
                Err(MockError)
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl CrudAdapter for MockAdapter {
        type Error = MockError;

        async fn exec_get_all(&self, options: GetAllOptions) -> Result<Vec<Value>, MockError> {
            self.record(Call::GetAll(options))?;
            Ok(self.stored.clone().into_iter().collect())
        }

        async fn exec_count(&self, filter: Option<Filter>) -> Result<u64, MockError> {
            self.record(Call::Count(filter))?;
            Ok(7)
        }

        async fn exec_get_one(&self, options: GetOneOptions) -> Result<Option<Value>, MockError> {
            self.record(Call::GetOne(options))?;
            Ok(self.stored.clone())
        }

        async fn exec_add_one(&self, payload: Value) -> Result<Value, MockError> {
            self.record(Call::AddOne(payload.clone()))?;
            Ok(payload)
        }

        async fn exec_update_one(
            &self,
            filter: Option<Filter>,
            payload: Value,
        ) -> Result<Option<Value>, MockError> {
            self.record(Call::UpdateOne(filter, payload.clone()))?;
            Ok(Some(payload))
        }

        async fn exec_delete_one(&self, filter: Option<Filter>) -> Result<Option<Value>, MockError> {
            self.record(Call::DeleteOne(filter))?;
            Ok(self.stored.clone())
        }
    }

    fn scoped(filters: Vec<Filter>, projection: &str) -> Permission {
        let mask = ProjectionMask::decode(projection);
        Permission::Scoped(ScopedPermission {
            filters,
            projection: (!mask.is_empty()).then_some(mask),
        })
    }

    fn facade(config: EntityConfig) -> CrudFacade<MockAdapter> {
        CrudFacade::new(MockAdapter::default(), config)
    }

    #[tokio::test]
    async fn test_get_all_defaults() {
        let facade = facade(EntityConfig::new("User"));
        facade
            .get_all(ListRequest::new(), &PermissionSet::default())
            .await
            .unwrap();

        assert_eq!(
            facade.adapter().calls(),
            vec![Call::GetAll(GetAllOptions {
                page: 0,
                size: 20,
                projection: None,
                filter: None,
                sort: Vec::new(),
            })]
        );
    }

    #[tokio::test]
    async fn test_filters_are_and_combined() {
        let facade = facade(EntityConfig::new("User"));
        let permissions = PermissionSet::default().with(
            Action::Read,
            scoped(vec![Filter::eq("number", 5), Filter::eq("owner", "u-1")], "-password"),
        );

        facade
            .get_all(
                ListRequest::new()
                    .with_page(2)
                    .with_size(5)
                    .with_filter(Filter::eq("firstName", "Bill"))
                    .with_sort(OrderSpec::asc("number")),
                &permissions,
            )
            .await
            .unwrap();

        assert_eq!(
            facade.adapter().calls(),
            vec![Call::GetAll(GetAllOptions {
                page: 2,
                size: 5,
                projection: Some(FieldSelection::Exclude(vec!["password".into()])),
                filter: Some(Filter::and(vec![
                    Filter::or(vec![Filter::eq("number", 5), Filter::eq("owner", "u-1")]),
                    Filter::eq("firstName", "Bill"),
                ])),
                sort: vec![OrderSpec::asc("number")],
            })]
        );
    }

    #[tokio::test]
    async fn test_search_becomes_or_of_fields() {
        let facade = facade(
            EntityConfig::new("User").with_search_fields(["firstName", "lastName"]),
        );
        let filter = QueryFilter::criteria(Filter::eq("active", true)).with_search("bil");

        assert_eq!(facade.count(filter, &PermissionSet::default()).await.unwrap(), 7);
        assert_eq!(
            facade.adapter().calls(),
            vec![Call::Count(Some(Filter::and(vec![
                Filter::eq("active", true),
                Filter::or(vec![
                    Filter::ilike("firstName", "%bil%"),
                    Filter::ilike("lastName", "%bil%"),
                ]),
            ])))]
        );
    }

    #[tokio::test]
    async fn test_search_without_fields_is_dropped() {
        let facade = facade(EntityConfig::new("User"));
        facade
            .count(QueryFilter::new().with_search("bil"), &PermissionSet::default())
            .await
            .unwrap();
        assert_eq!(facade.adapter().calls(), vec![Call::Count(None)]);
    }

    #[tokio::test]
    async fn test_excerpt_beats_permission_projection() {
        let facade = facade(EntityConfig::new("User").with_excerpt_projection("firstName lastName"));
        let permissions =
            PermissionSet::default().with(Action::Read, scoped(Vec::new(), "-password"));

        facade.get_one(QueryFilter::new(), &permissions).await.unwrap();

        assert_eq!(
            facade.adapter().calls(),
            vec![Call::GetOne(GetOneOptions {
                filter: None,
                projection: Some(FieldSelection::Include(vec![
                    "firstName".into(),
                    "lastName".into()
                ])),
            })]
        );
    }

    #[tokio::test]
    async fn test_underscored_id() {
        let facade = facade(EntityConfig::new("User").with_underscored_id());
        let permissions = PermissionSet::default()
            .with(Action::Delete, scoped(vec![Filter::eq("id", "p-1")], ""));

        facade
            .delete_one(QueryFilter::criteria(Filter::eq("id", "abc")), &permissions)
            .await
            .unwrap();

        assert_eq!(
            facade.adapter().calls(),
            vec![Call::DeleteOne(Some(Filter::and(vec![
                Filter::eq("_id", "p-1"),
                Filter::eq("_id", "abc"),
            ])))]
        );
    }

    #[tokio::test]
    async fn test_denied_never_reaches_adapter() {
        let facade = facade(EntityConfig::new("User"));
        let permissions = PermissionSet::default().with(Action::Update, Permission::Denied);

        let err = facade
            .update_one(QueryFilter::new(), json!({ "a": 1 }), &permissions)
            .await
            .unwrap_err();

        assert!(err.is_access_denied());
        assert_eq!(err.to_string(), "Access is denied: cannot update User");
        assert!(facade.adapter().calls().is_empty());
    }

    #[tokio::test]
    async fn test_add_one_strips_create_projection() {
        let facade = facade(EntityConfig::new("User"));
        let permissions =
            PermissionSet::default().with(Action::Create, scoped(Vec::new(), "-roles"));

        let stored = facade
            .add_one(json!({ "_id": "1", "firstName": "Bill", "roles": ["ADMIN"] }), &permissions)
            .await
            .unwrap();

        assert_eq!(stored, json!({ "_id": "1", "firstName": "Bill" }));
    }

    #[tokio::test]
    async fn test_update_one_restores_forbidden_fields() {
        let adapter = MockAdapter {
            stored: Some(json!({ "_id": "1", "firstName": "Bill", "number": 5 })),
            ..MockAdapter::default()
        };
        let facade = CrudFacade::new(adapter, EntityConfig::new("User"));
        let permissions = PermissionSet::default().with(
            Action::Update,
            scoped(vec![Filter::eq("number", 5)], "-number"),
        );

        let updated = facade
            .update_one(
                QueryFilter::criteria(Filter::eq("_id", "1")),
                json!({ "firstName": "William", "number": 99 }),
                &permissions,
            )
            .await
            .unwrap();

        assert_eq!(updated, Some(json!({ "firstName": "William", "number": 5 })));
        assert_eq!(
            facade.adapter().calls(),
            vec![
                Call::GetOne(GetOneOptions::by_filter(Some(Filter::eq("_id", "1")))),
                Call::UpdateOne(
                    Some(Filter::and(vec![Filter::eq("number", 5), Filter::eq("_id", "1")])),
                    json!({ "firstName": "William", "number": 5 }),
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let adapter = MockAdapter {
            fail: true,
            ..MockAdapter::default()
        };
        let facade = CrudFacade::new(adapter, EntityConfig::new("User"));
        let err = facade
            .count(QueryFilter::new(), &PermissionSet::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CrudError::Store(MockError)));
        assert_eq!(err.to_string(), "mock store failure");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("bil"), "bil");
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
    }
}
