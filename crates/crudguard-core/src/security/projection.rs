//! Projection masks: which field paths a caller may see or change.
//!
//! A mask maps dotted field paths to include (`true`) or exclude
//! (`false`). Masks do not declare their mode; the value of the first
//! entry decides it everywhere a mask is consumed. Mixing modes in one
//! mask is not supported.

use std::fmt;

use crudguard_proto::FieldSelection;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Insertion-ordered path -> include/exclude mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionMask {
    entries: Vec<(String, bool)>,
}

impl ProjectionMask {
    /// Create an empty mask.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the compact string form.
    ///
    /// Tokens are whitespace separated; a leading `-` excludes the field,
    /// anything else includes it.
    pub fn decode(projection: &str) -> Self {
        let mut mask = Self::new();
        for token in projection.split_whitespace() {
            match token.strip_prefix('-') {
                Some(field) => mask.set(field, false),
                None => mask.set(token, true),
            }
        }
        mask
    }

    /// Encode back to the compact string form.
    pub fn encode(&self) -> String {
        self.entries
            .iter()
            .map(|(path, included)| {
                if *included {
                    path.clone()
                } else {
                    format!("-{}", path)
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Add an included path.
    pub fn include(mut self, path: impl Into<String>) -> Self {
        self.set(path, true);
        self
    }

    /// Add an excluded path.
    pub fn exclude(mut self, path: impl Into<String>) -> Self {
        self.set(path, false);
        self
    }

    /// Set a path's value. An existing path keeps its position.
    pub fn set(&mut self, path: impl Into<String>, included: bool) {
        let path = path.into();
        match self.entries.iter_mut().find(|(p, _)| *p == path) {
            Some(entry) => entry.1 = included,
            None => self.entries.push((path, included)),
        }
    }

    /// Value recorded for a path.
    pub fn get(&self, path: &str) -> Option<bool> {
        self.entries
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, included)| *included)
    }

    /// Check if the mask has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.entries.iter().map(|(path, included)| (path.as_str(), *included))
    }

    /// Check if the mask is a blacklist (first entry excludes).
    pub fn is_exclusive(&self) -> bool {
        matches!(self.entries.first(), Some((_, false)))
    }

    /// Check if a path is masked out.
    ///
    /// Exclusive masks remove paths marked excluded; inclusive masks
    /// remove every path not marked included.
    pub fn removes(&self, path: &str) -> bool {
        if self.is_exclusive() {
            self.get(path) == Some(false)
        } else {
            self.get(path) != Some(true)
        }
    }

    /// Paths marked included.
    pub fn included_paths(&self) -> Vec<String> {
        self.paths_with(true)
    }

    /// Paths marked excluded.
    pub fn excluded_paths(&self) -> Vec<String> {
        self.paths_with(false)
    }

    fn paths_with(&self, included: bool) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, v)| *v == included)
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Shallow-merge another mask into this one, the other mask winning
    /// on collision.
    pub fn merge(&mut self, other: &ProjectionMask) {
        for (path, included) in &other.entries {
            self.set(path.clone(), *included);
        }
    }

    /// Merged copy.
    pub fn merged(&self, other: &ProjectionMask) -> Self {
        let mut mask = self.clone();
        mask.merge(other);
        mask
    }

    /// Store-native field selection for this mask.
    pub fn to_selection(&self) -> FieldSelection {
        if self.is_exclusive() {
            FieldSelection::Exclude(self.excluded_paths())
        } else {
            FieldSelection::Include(self.included_paths())
        }
    }
}

impl fmt::Display for ProjectionMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl<S: Into<String>> FromIterator<(S, bool)> for ProjectionMask {
    fn from_iter<T: IntoIterator<Item = (S, bool)>>(iter: T) -> Self {
        let mut mask = Self::new();
        for (path, included) in iter {
            mask.set(path, included);
        }
        mask
    }
}

impl Serialize for ProjectionMask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (path, included) in &self.entries {
            map.serialize_entry(path, &u8::from(*included))?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ProjectionMask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(MaskVisitor)
    }
}

struct MaskVisitor;

impl<'de> Visitor<'de> for MaskVisitor {
    type Value = ProjectionMask;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of field paths to 0/1 or false/true")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut mask = ProjectionMask::new();
        while let Some((path, flag)) = access.next_entry::<String, MaskFlag>()? {
            mask.set(path, flag.0);
        }
        Ok(mask)
    }
}

/// Accepts `0`/`1` as well as booleans.
struct MaskFlag(bool);

impl<'de> Deserialize<'de> for MaskFlag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Bool(b) => Ok(MaskFlag(b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(0) => Ok(MaskFlag(false)),
                Some(1) => Ok(MaskFlag(true)),
                _ => Err(de::Error::custom(format!("mask value must be 0 or 1, got {}", n))),
            },
            other => Err(de::Error::custom(format!(
                "mask value must be 0, 1, true or false, got {}",
                other
            ))),
        }
    }
}

/// A projection as written in a policy: compact string or mask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProjectionSpec {
    /// Compact string form, e.g. `"name -password"`.
    Text(String),
    /// Already-decoded mask.
    Mask(ProjectionMask),
}

impl ProjectionSpec {
    /// Decode into a mask. A mask is returned unchanged.
    pub fn decode(&self) -> ProjectionMask {
        match self {
            ProjectionSpec::Text(text) => ProjectionMask::decode(text),
            ProjectionSpec::Mask(mask) => mask.clone(),
        }
    }
}

impl From<&str> for ProjectionSpec {
    fn from(text: &str) -> Self {
        ProjectionSpec::Text(text.to_string())
    }
}

impl From<String> for ProjectionSpec {
    fn from(text: String) -> Self {
        ProjectionSpec::Text(text)
    }
}

impl From<ProjectionMask> for ProjectionSpec {
    fn from(mask: ProjectionMask) -> Self {
        ProjectionSpec::Mask(mask)
    }
}
