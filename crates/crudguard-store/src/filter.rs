//! Filter evaluation against JSON documents.
//!
//! This module provides the `FilterEvaluator` that evaluates `Filter` trees
//! against stored documents, plus field selection and ordering helpers
//! used when returning results.

use std::cmp::Ordering;

use crudguard_core::security::{strip_removed, ProjectionMask};
use crudguard_proto::{path, FieldSelection, Filter, OrderDirection, OrderSpec};
use serde_json::{Map, Value};

/// Evaluates filters against documents.
pub struct FilterEvaluator;

impl FilterEvaluator {
    /// Evaluate a filter against a document.
    ///
    /// Fields are dotted paths. A field holding an array matches a scalar
    /// comparison when any element does.
    pub fn evaluate(filter: &Filter, document: &Value) -> bool {
        match filter {
            Filter::Eq { field, value } => {
                Self::compare_field(document, field, value, Self::values_equal)
            }
            Filter::Ne { field, value } => {
                !Self::compare_field(document, field, value, Self::values_equal)
            }
            Filter::Lt { field, value } => Self::compare_field(document, field, value, |a, b| {
                Self::compare_values(a, b).map(|ord| ord.is_lt()).unwrap_or(false)
            }),
            Filter::Le { field, value } => Self::compare_field(document, field, value, |a, b| {
                Self::compare_values(a, b).map(|ord| ord.is_le()).unwrap_or(false)
            }),
            Filter::Gt { field, value } => Self::compare_field(document, field, value, |a, b| {
                Self::compare_values(a, b).map(|ord| ord.is_gt()).unwrap_or(false)
            }),
            Filter::Ge { field, value } => Self::compare_field(document, field, value, |a, b| {
                Self::compare_values(a, b).map(|ord| ord.is_ge()).unwrap_or(false)
            }),
            Filter::In { field, values } => values
                .iter()
                .any(|v| Self::compare_field(document, field, v, Self::values_equal)),
            Filter::NotIn { field, values } => !values
                .iter()
                .any(|v| Self::compare_field(document, field, v, Self::values_equal)),
            Filter::IsNull { field } => {
                matches!(path::get(document, field), None | Some(Value::Null))
            }
            Filter::IsNotNull { field } => {
                !matches!(path::get(document, field), None | Some(Value::Null))
            }
            Filter::Like { field, pattern } => match path::get(document, field) {
                Some(Value::String(s)) => Self::like_match(s, pattern),
                _ => false,
            },
            Filter::ILike { field, pattern } => match path::get(document, field) {
                Some(Value::String(s)) => {
                    Self::like_match(&s.to_lowercase(), &pattern.to_lowercase())
                }
                _ => false,
            },
            Filter::And(filters) => filters.iter().all(|f| Self::evaluate(f, document)),
            Filter::Or(filters) => filters.iter().any(|f| Self::evaluate(f, document)),
        }
    }

    /// Evaluate an optional filter; `None` matches everything.
    pub fn matches(filter: Option<&Filter>, document: &Value) -> bool {
        filter.map_or(true, |f| Self::evaluate(f, document))
    }

    fn compare_field<F>(document: &Value, field: &str, value: &Value, comparator: F) -> bool
    where
        F: Fn(&Value, &Value) -> bool,
    {
        match path::get(document, field) {
            Some(Value::Array(items)) if !value.is_array() => {
                items.iter().any(|item| comparator(item, value))
            }
            Some(fv) => comparator(fv, value),
            None => false, // Missing field doesn't match
        }
    }

    /// Check if two values are equal, comparing numbers by value.
    fn values_equal(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
                (Some(a), Some(b)) => a == b,
                _ => a.as_f64() == b.as_f64(),
            },
            _ => a == b,
        }
    }

    /// Compare two values, returning their ordering if comparable.
    pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
        match (a, b) {
            (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
            },
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None, // Incompatible types
        }
    }

    /// Match a string against a SQL LIKE pattern.
    ///
    /// Supports:
    /// - `%` matches zero or more characters
    /// - `_` matches exactly one character
    /// - `\%` and `\_` match the literal character
    pub fn like_match(value: &str, pattern: &str) -> bool {
        let value: Vec<char> = value.chars().collect();
        let pattern: Vec<char> = pattern.chars().collect();
        Self::like_match_from(&value, &pattern)
    }

    fn like_match_from(value: &[char], pattern: &[char]) -> bool {
        match pattern.split_first() {
            None => value.is_empty(),
            Some(('%', rest)) => {
                if rest.is_empty() {
                    return true;
                }
                (0..=value.len()).any(|skip| Self::like_match_from(&value[skip..], rest))
            }
            Some(('_', rest)) => !value.is_empty() && Self::like_match_from(&value[1..], rest),
            Some(('\\', rest)) => match (rest.split_first(), value.split_first()) {
                (Some((p, pattern_rest)), Some((c, value_rest))) if p == c => {
                    Self::like_match_from(value_rest, pattern_rest)
                }
                _ => false,
            },
            Some((p, rest)) => match value.split_first() {
                Some((c, value_rest)) if c == p => Self::like_match_from(value_rest, rest),
                _ => false,
            },
        }
    }
}

/// Apply a field selection to a document.
///
/// Inclusive selections always keep `id_field`. Both modes reach fields
/// inside arrays of objects.
pub fn apply_selection(document: Value, selection: &FieldSelection, id_field: &str) -> Value {
    match selection {
        FieldSelection::Include(paths) => {
            let mut selected = select_included(&document, "", paths);
            if let Some(id) = path::get(&document, id_field) {
                let _ = path::set(&mut selected, id_field, id.clone());
            }
            selected
        }
        FieldSelection::Exclude(paths) => {
            let mut document = document;
            let mask: ProjectionMask = paths.iter().map(|p| (p.as_str(), false)).collect();
            strip_removed(&mut document, &mask, "");
            document
        }
    }
}

/// Copy of `value` holding only the included paths below `parent`.
///
/// Array elements are projected one by one; scalar elements of an array
/// the projection descends into are dropped.
fn select_included(value: &Value, parent: &str, paths: &[String]) -> Value {
    match value {
        Value::Object(map) => {
            let mut selected = Map::new();
            for (key, child) in map {
                let full = path::join(parent, key);
                if paths.contains(&full) {
                    selected.insert(key.clone(), child.clone());
                    continue;
                }
                let nested_prefix = format!("{}.", full);
                if (child.is_object() || child.is_array())
                    && paths.iter().any(|p| p.starts_with(&nested_prefix))
                {
                    selected.insert(key.clone(), select_included(child, &full, paths));
                }
            }
            Value::Object(selected)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter(|item| item.is_object() || item.is_array())
                .map(|item| select_included(item, parent, paths))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Sort documents in place. Missing or incomparable values sort first.
pub fn sort_documents(documents: &mut [Value], sort: &[OrderSpec]) {
    if sort.is_empty() {
        return;
    }
    documents.sort_by(|a, b| {
        for order in sort {
            let ordering = match (path::get(a, &order.field), path::get(b, &order.field)) {
                (Some(x), Some(y)) => FilterEvaluator::compare_values(x, y).unwrap_or(Ordering::Equal),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            let ordering = match order.direction {
                OrderDirection::Asc => ordering,
                OrderDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "_id": "1",
            "firstName": "Bill",
            "number": 5,
            "score": 2.5,
            "roles": ["USER", "EDITOR"],
            "address": { "city": "Oslo" },
            "nick": null
        })
    }

    #[test]
    fn test_eq_filter() {
        let d = doc();
        assert!(FilterEvaluator::evaluate(&Filter::eq("firstName", "Bill"), &d));
        assert!(!FilterEvaluator::evaluate(&Filter::eq("firstName", "Bob"), &d));
        assert!(FilterEvaluator::evaluate(&Filter::eq("address.city", "Oslo"), &d));
        assert!(FilterEvaluator::evaluate(&Filter::eq("number", 5.0), &d));
        assert!(!FilterEvaluator::evaluate(&Filter::eq("missing", 5), &d));
    }

    #[test]
    fn test_array_membership() {
        let d = doc();
        assert!(FilterEvaluator::evaluate(&Filter::eq("roles", "EDITOR"), &d));
        assert!(!FilterEvaluator::evaluate(&Filter::eq("roles", "ADMIN"), &d));
        assert!(FilterEvaluator::evaluate(&Filter::eq("roles", json!(["USER", "EDITOR"])), &d));
        assert!(FilterEvaluator::evaluate(
            &Filter::in_values("roles", vec![json!("ADMIN"), json!("USER")]),
            &d
        ));
    }

    #[test]
    fn test_comparison_filters() {
        let d = doc();
        assert!(FilterEvaluator::evaluate(&Filter::lt("number", 6), &d));
        assert!(FilterEvaluator::evaluate(&Filter::le("number", 5), &d));
        assert!(FilterEvaluator::evaluate(&Filter::gt("score", 2), &d));
        assert!(!FilterEvaluator::evaluate(&Filter::ge("number", "5"), &d));
    }

    #[test]
    fn test_null_filters() {
        let d = doc();
        assert!(FilterEvaluator::evaluate(&Filter::is_null("nick"), &d));
        assert!(FilterEvaluator::evaluate(&Filter::is_null("missing"), &d));
        assert!(FilterEvaluator::evaluate(&Filter::is_not_null("number"), &d));
        assert!(FilterEvaluator::evaluate(&Filter::ne("missing", 1), &d));
        assert!(FilterEvaluator::evaluate(&Filter::not_in_values("number", vec![json!(6)]), &d));
    }

    #[test]
    fn test_like_filters() {
        assert!(FilterEvaluator::like_match("Bill", "B%"));
        assert!(FilterEvaluator::like_match("Bill", "_ill"));
        assert!(FilterEvaluator::like_match("Bill", "%il%"));
        assert!(!FilterEvaluator::like_match("Bill", "%x%"));
        assert!(FilterEvaluator::like_match("50%", "50\\%"));
        assert!(!FilterEvaluator::like_match("50x", "50\\%"));
        assert!(FilterEvaluator::like_match("", "%"));

        let d = doc();
        assert!(FilterEvaluator::evaluate(&Filter::ilike("firstName", "%BIL%"), &d));
        assert!(!FilterEvaluator::evaluate(&Filter::like("firstName", "%BIL%"), &d));
    }

    #[test]
    fn test_compound_filters() {
        let d = doc();
        let filter = Filter::and(vec![
            Filter::eq("number", 5),
            Filter::or(vec![Filter::eq("firstName", "Bob"), Filter::eq("address.city", "Oslo")]),
        ]);
        assert!(FilterEvaluator::evaluate(&filter, &d));
        assert!(FilterEvaluator::evaluate(&Filter::and(vec![]), &d));
        assert!(!FilterEvaluator::evaluate(&Filter::or(vec![]), &d));
        assert!(FilterEvaluator::matches(None, &d));
    }

    #[test]
    fn test_apply_selection() {
        let selected = apply_selection(
            doc(),
            &FieldSelection::Include(vec!["firstName".into(), "address.city".into()]),
            "_id",
        );
        assert_eq!(
            selected,
            json!({ "_id": "1", "firstName": "Bill", "address": { "city": "Oslo" } })
        );

        let selected = apply_selection(
            json!({ "_id": "1", "a": 1, "items": [{ "x": 1, "y": 2 }] }),
            &FieldSelection::Exclude(vec!["a".into(), "items.y".into()]),
            "_id",
        );
        assert_eq!(selected, json!({ "_id": "1", "items": [{ "x": 1 }] }));
    }

    #[test]
    fn test_include_selection_inside_arrays() {
        let document = json!({
            "_id": "1",
            "name": "Bill",
            "phones": [{ "number": "1", "pin": "0000" }, { "pin": "1111" }, "loose"],
            "meta": { "tags": [{ "label": "a", "hidden": true }] }
        });
        let selected = apply_selection(
            document,
            &FieldSelection::Include(vec!["phones.number".into(), "meta.tags.label".into()]),
            "_id",
        );
        assert_eq!(
            selected,
            json!({
                "_id": "1",
                "phones": [{ "number": "1" }, {}],
                "meta": { "tags": [{ "label": "a" }] }
            })
        );
    }

    #[test]
    fn test_sort_documents() {
        let mut docs = vec![
            json!({ "n": 2, "s": "b" }),
            json!({ "n": 1, "s": "z" }),
            json!({ "s": "a" }),
            json!({ "n": 2, "s": "a" }),
        ];
        sort_documents(&mut docs, &[OrderSpec::desc("n"), OrderSpec::asc("s")]);
        assert_eq!(
            docs,
            vec![
                json!({ "n": 2, "s": "a" }),
                json!({ "n": 2, "s": "b" }),
                json!({ "n": 1, "s": "z" }),
                json!({ "s": "a" }),
            ]
        );
    }
}
