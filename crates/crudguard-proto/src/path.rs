//! Dotted field paths into JSON documents.

use serde_json::{Map, Value};

use crate::error::Error;

/// Split a path into its first segment and the remainder, if any.
pub fn split_first(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}

/// Join a parent path and a key.
pub fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

/// Look up the value at a dotted path.
///
/// Only object members are traversed; a path running through an array or
/// scalar yields `None`.
pub fn get<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |current, segment| current.as_object()?.get(segment))
}

/// Set the value at a dotted path, creating intermediate objects.
///
/// Fails when an intermediate segment exists but is not an object.
pub fn set(document: &mut Value, path: &str, value: Value) -> Result<(), Error> {
    if path.is_empty() {
        return Err(Error::InvalidPath(path.to_string()));
    }
    if document.is_null() {
        *document = Value::Object(Map::new());
    }

    let mut current = document;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let object = current
            .as_object_mut()
            .ok_or_else(|| Error::InvalidPath(path.to_string()))?;
        if segments.peek().is_none() {
            object.insert(segment.to_string(), value);
            return Ok(());
        }
        let next = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if next.is_null() {
            *next = Value::Object(Map::new());
        }
        current = next;
    }
    Ok(())
}

/// Remove the value at a dotted path, returning it.
pub fn remove(document: &mut Value, path: &str) -> Option<Value> {
    let (parent, key) = match path.rsplit_once('.') {
        Some((parent, key)) => (get_mut(document, parent)?, key),
        None => (document, path),
    };
    parent.as_object_mut()?.remove(key)
}

fn get_mut<'a>(document: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.').try_fold(document, |current, segment| {
        current.as_object_mut()?.get_mut(segment)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_first() {
        assert_eq!(split_first("a"), ("a", None));
        assert_eq!(split_first("a.b.c"), ("a", Some("b.c")));
    }

    #[test]
    fn test_get_nested() {
        let doc = json!({ "address": { "city": "Riga" }, "tags": ["x"] });
        assert_eq!(get(&doc, "address.city"), Some(&json!("Riga")));
        assert_eq!(get(&doc, "address.zip"), None);
        assert_eq!(get(&doc, "tags.0"), None);
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let mut doc = json!({ "name": "Bill" });
        set(&mut doc, "address.city", json!("Riga")).unwrap();
        assert_eq!(doc, json!({ "name": "Bill", "address": { "city": "Riga" } }));
    }

    #[test]
    fn test_set_through_scalar_fails() {
        let mut doc = json!({ "name": "Bill" });
        assert!(set(&mut doc, "name.first", json!("B")).is_err());
    }

    #[test]
    fn test_remove() {
        let mut doc = json!({ "address": { "city": "Riga", "zip": "1" } });
        assert_eq!(remove(&mut doc, "address.zip"), Some(json!("1")));
        assert_eq!(doc, json!({ "address": { "city": "Riga" } }));
        assert_eq!(remove(&mut doc, "missing.path"), None);
    }
}
