//! Predicate tree handed to backing-store adapters.
//!
//! Unlike a wire format constrained by zero-copy archiving, this tree is
//! freely recursive: security scoping nests caller criteria inside
//! permission alternatives, so `And`/`Or` hold whole sub-filters.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Filter expression over document fields.
///
/// Field names may be dotted paths into embedded documents
/// (e.g. `"address.city"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// Field equals value.
    Eq { field: String, value: Value },
    /// Field not equals value.
    Ne { field: String, value: Value },
    /// Field less than value.
    Lt { field: String, value: Value },
    /// Field less than or equal to value.
    Le { field: String, value: Value },
    /// Field greater than value.
    Gt { field: String, value: Value },
    /// Field greater than or equal to value.
    Ge { field: String, value: Value },
    /// Field is in a set of values.
    In { field: String, values: Vec<Value> },
    /// Field is not in a set of values.
    NotIn { field: String, values: Vec<Value> },
    /// Field is null or missing.
    IsNull { field: String },
    /// Field is present and not null.
    IsNotNull { field: String },
    /// Field matches a LIKE pattern (`%` any run, `_` one char).
    Like { field: String, pattern: String },
    /// Case-insensitive LIKE.
    ILike { field: String, pattern: String },
    /// All sub-filters must match.
    And(Vec<Filter>),
    /// At least one sub-filter must match.
    Or(Vec<Filter>),
}

impl Filter {
    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a not-equal filter.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a less-than filter.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Lt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a less-than-or-equal filter.
    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Le {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a greater-than filter.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Gt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a greater-than-or-equal filter.
    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Ge {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create an IN filter.
    pub fn in_values(field: impl Into<String>, values: Vec<Value>) -> Self {
        Filter::In {
            field: field.into(),
            values,
        }
    }

    /// Create a NOT IN filter.
    pub fn not_in_values(field: impl Into<String>, values: Vec<Value>) -> Self {
        Filter::NotIn {
            field: field.into(),
            values,
        }
    }

    /// Create an IS NULL filter.
    pub fn is_null(field: impl Into<String>) -> Self {
        Filter::IsNull {
            field: field.into(),
        }
    }

    /// Create an IS NOT NULL filter.
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Filter::IsNotNull {
            field: field.into(),
        }
    }

    /// Create a LIKE filter.
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::Like {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    /// Create a case-insensitive LIKE filter.
    pub fn ilike(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::ILike {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    /// Create an AND combination.
    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    /// Create an OR combination.
    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    /// OR a list of alternatives together, collapsing the single-element case.
    ///
    /// Returns `None` for an empty list.
    pub fn any_of(mut filters: Vec<Filter>) -> Option<Self> {
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Filter::Or(filters)),
        }
    }

    /// AND a list of filters together, collapsing the single-element case.
    ///
    /// Returns `None` for an empty list.
    pub fn all_of(mut filters: Vec<Filter>) -> Option<Self> {
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Filter::And(filters)),
        }
    }

    /// Combine two optional filters with AND.
    pub fn conjoin(left: Option<Filter>, right: Option<Filter>) -> Option<Filter> {
        match (left, right) {
            (Some(l), Some(r)) => Some(Filter::And(vec![l, r])),
            (Some(f), None) | (None, Some(f)) => Some(f),
            (None, None) => None,
        }
    }

    /// Rename every reference to `from` (and its sub-paths) to `to`.
    pub fn rename_field(&mut self, from: &str, to: &str) {
        match self {
            Filter::Eq { field, .. }
            | Filter::Ne { field, .. }
            | Filter::Lt { field, .. }
            | Filter::Le { field, .. }
            | Filter::Gt { field, .. }
            | Filter::Ge { field, .. }
            | Filter::In { field, .. }
            | Filter::NotIn { field, .. }
            | Filter::IsNull { field }
            | Filter::IsNotNull { field }
            | Filter::Like { field, .. }
            | Filter::ILike { field, .. } => {
                if field == from {
                    *field = to.to_string();
                } else if let Some(rest) = field
                    .strip_prefix(from)
                    .and_then(|rest| rest.strip_prefix('.'))
                {
                    *field = format!("{}.{}", to, rest);
                }
            }
            Filter::And(filters) | Filter::Or(filters) => {
                for filter in filters {
                    filter.rename_field(from, to);
                }
            }
        }
    }

    /// All field paths referenced by this filter.
    pub fn fields(&self) -> HashSet<String> {
        let mut fields = HashSet::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields(&self, fields: &mut HashSet<String>) {
        match self {
            Filter::Eq { field, .. }
            | Filter::Ne { field, .. }
            | Filter::Lt { field, .. }
            | Filter::Le { field, .. }
            | Filter::Gt { field, .. }
            | Filter::Ge { field, .. }
            | Filter::In { field, .. }
            | Filter::NotIn { field, .. }
            | Filter::IsNull { field }
            | Filter::IsNotNull { field }
            | Filter::Like { field, .. }
            | Filter::ILike { field, .. } => {
                fields.insert(field.clone());
            }
            Filter::And(filters) | Filter::Or(filters) => {
                for filter in filters {
                    filter.collect_fields(fields);
                }
            }
        }
    }
}
