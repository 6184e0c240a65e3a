//! Request types passed from the CRUD facade to a backing-store adapter.

use serde::{Deserialize, Serialize};

use crate::filter::Filter;

/// Store-native field selection derived from a projection mask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSelection {
    /// Return only these paths (plus the store's identifier).
    Include(Vec<String>),
    /// Return everything except these paths.
    Exclude(Vec<String>),
}

impl FieldSelection {
    /// The paths named by this selection.
    pub fn paths(&self) -> &[String] {
        match self {
            FieldSelection::Include(paths) | FieldSelection::Exclude(paths) => paths,
        }
    }

    /// Check if this selection is a whitelist.
    pub fn is_inclusive(&self) -> bool {
        matches!(self, FieldSelection::Include(_))
    }
}

/// Ordering specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Field to order by.
    pub field: String,
    /// Sort direction.
    pub direction: OrderDirection,
}

impl OrderSpec {
    /// Create an ascending order spec.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    /// Create a descending order spec.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

/// Options for a paged list read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetAllOptions {
    /// Zero-based page index.
    pub page: u32,
    /// Page size.
    pub size: u32,
    /// Field selection to apply to each record.
    pub projection: Option<FieldSelection>,
    /// Combined permission and caller filter.
    pub filter: Option<Filter>,
    /// Ordering.
    pub sort: Vec<OrderSpec>,
}

impl GetAllOptions {
    /// Number of records to skip for this page.
    pub fn offset(&self) -> usize {
        self.page as usize * self.size as usize
    }
}

/// Options for a single-record read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetOneOptions {
    /// Filter selecting the record.
    pub filter: Option<Filter>,
    /// Field selection to apply.
    pub projection: Option<FieldSelection>,
}

impl GetOneOptions {
    /// Read the first record matching `filter`, unprojected.
    pub fn by_filter(filter: Option<Filter>) -> Self {
        Self {
            filter,
            projection: None,
        }
    }
}
