//! Field redaction over JSON documents.
//!
//! Writes never fail because of a projection: disallowed fields are
//! stripped from new documents and reverted to their stored value in
//! update payloads.

use crudguard_proto::path;
use serde_json::{Map, Value};
use tracing::trace;

use super::projection::ProjectionMask;

fn is_reserved(key: &str, prefix: &str) -> bool {
    !prefix.is_empty() && key.starts_with(prefix)
}

/// Delete every path the mask removes, children before parents.
///
/// Objects nested in arrays are walked under the array's own path. Keys
/// starting with `reserved_prefix` are neither walked nor deleted.
/// Returns the deleted paths.
pub fn strip_removed(
    document: &mut Value,
    mask: &ProjectionMask,
    reserved_prefix: &str,
) -> Vec<String> {
    let mut removed = Vec::new();
    if !mask.is_empty() {
        strip_value(document, "", mask, reserved_prefix, &mut removed);
    }
    removed
}

/// Apply a read projection to a loaded document.
pub fn redact_document(document: &mut Value, mask: &ProjectionMask, reserved_prefix: &str) {
    let removed = strip_removed(document, mask, reserved_prefix);
    if !removed.is_empty() {
        trace!(paths = ?removed, "redacted document");
    }
}

fn strip_value(
    value: &mut Value,
    path: &str,
    mask: &ProjectionMask,
    prefix: &str,
    removed: &mut Vec<String>,
) {
    match value {
        Value::Object(map) => strip_object(map, path, mask, prefix, removed),
        Value::Array(items) => {
            for item in items {
                strip_value(item, path, mask, prefix, removed);
            }
        }
        _ => {}
    }
}

fn strip_object(
    map: &mut Map<String, Value>,
    parent: &str,
    mask: &ProjectionMask,
    prefix: &str,
    removed: &mut Vec<String>,
) {
    let keys: Vec<String> = map.keys().cloned().collect();
    for key in keys {
        if is_reserved(&key, prefix) {
            continue;
        }
        let full = path::join(parent, &key);
        if let Some(child) = map.get_mut(&key) {
            strip_value(child, &full, mask, prefix, removed);
        }
        if mask.removes(&full) {
            map.remove(&key);
            trace!(path = %full, "stripped field");
            if !removed.contains(&full) {
                removed.push(full);
            }
        }
    }
}

/// Revert disallowed changes in an update payload.
///
/// Every restricted path the payload touches takes the value stored in
/// `previous`, or is dropped from the payload when nothing is stored
/// there. Exclusive masks restrict their excluded paths. Inclusive masks
/// restrict every payload path not covered by an included path.
///
/// Nested objects replace their stored counterpart wholesale, so restricted
/// fields missing from a nested payload object are filled back in. Arrays
/// are walked element by element, pairing payload and stored items by
/// index. Returns the paths whose payload value changed.
pub fn restore_removed(
    payload: &mut Value,
    mask: &ProjectionMask,
    previous: Option<&Value>,
    reserved_prefix: &str,
) -> Vec<String> {
    if mask.is_empty() {
        return Vec::new();
    }

    let mut restorer = Restorer {
        mask,
        prefix: reserved_prefix,
        exclusive: mask.is_exclusive(),
        restored: Vec::new(),
    };
    restorer.restore_value(payload, previous, "");
    restorer.restored
}

/// How a payload path is treated on update.
enum Rule {
    /// The caller may write it.
    Allowed,
    /// The caller may not write it.
    Restricted,
    /// Some paths below it are restricted.
    Descend,
}

struct Restorer<'m> {
    mask: &'m ProjectionMask,
    prefix: &'m str,
    exclusive: bool,
    restored: Vec<String>,
}

impl Restorer<'_> {
    fn rule(&self, path: &str) -> Rule {
        let nested_prefix = format!("{}.", path);
        let flag = self.mask.get(path);
        let leads_below = self
            .mask
            .iter()
            .any(|(p, included)| included != self.exclusive && p.starts_with(&nested_prefix));

        match (self.exclusive, flag) {
            (true, Some(false)) => Rule::Restricted,
            (false, Some(true)) => Rule::Allowed,
            _ if leads_below => Rule::Descend,
            (true, _) => Rule::Allowed,
            (false, _) => Rule::Restricted,
        }
    }

    fn restore_value(&mut self, value: &mut Value, previous: Option<&Value>, path: &str) {
        match value {
            Value::Object(map) => {
                self.restore_object(map, previous.and_then(Value::as_object), path)
            }
            Value::Array(items) => {
                let stored = previous.and_then(Value::as_array);
                for (i, item) in items.iter_mut().enumerate() {
                    self.restore_value(item, stored.and_then(|s| s.get(i)), path);
                }
            }
            _ => {}
        }
    }

    fn restore_object(
        &mut self,
        map: &mut Map<String, Value>,
        previous: Option<&Map<String, Value>>,
        parent: &str,
    ) {
        let mut keys: Vec<String> = map.keys().cloned().collect();
        // A top-level key the payload omits is left as stored.
        if !parent.is_empty() {
            if let Some(previous) = previous {
                keys.extend(previous.keys().filter(|k| !map.contains_key(*k)).cloned());
            }
        }

        for key in keys {
            if is_reserved(&key, self.prefix) {
                continue;
            }
            let full = path::join(parent, &key);
            let stored = previous.and_then(|m| m.get(&key));
            match self.rule(&full) {
                Rule::Allowed => {}
                Rule::Restricted => self.revert(map, &key, stored, full),
                Rule::Descend => {
                    let container = map
                        .get(&key)
                        .is_some_and(|child| child.is_object() || child.is_array());
                    if !container {
                        self.revert(map, &key, stored, full);
                    } else if let Some(child) = map.get_mut(&key) {
                        self.restore_value(child, stored, &full);
                    }
                }
            }
        }
    }

    fn revert(
        &mut self,
        map: &mut Map<String, Value>,
        key: &str,
        stored: Option<&Value>,
        full: String,
    ) {
        match (map.get(key), stored) {
            (Some(current), Some(stored)) if current == stored => return,
            (None, None) => return,
            (_, Some(stored)) => {
                map.insert(key.to_string(), stored.clone());
                trace!(path = %full, "restored field");
            }
            (Some(_), None) => {
                map.remove(key);
                trace!(path = %full, "dropped field with no stored value");
            }
        }
        if !self.restored.contains(&full) {
            self.restored.push(full);
        }
    }
}
