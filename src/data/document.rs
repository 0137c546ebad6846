use crate::{Error, Result};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// The parsed contents of one database.
///
/// The root is always a JSON object. Below it, each value is either a scalar, an array
/// or a nested object. Arrays are leaves: paths never descend into them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub struct Document {
    root: Value,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.root.serialize(serializer)
    }
}

impl TryFrom<Value> for Document {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        match value {
            Value::Object(_) => Ok(Self { root: value }),
            other => Err(format!("expected a JSON object, found {}", kind(&other))),
        }
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self {
            root: Value::Object(map),
        }
    }
}

impl Document {
    /// Creates an empty document, `{}`.
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    /// The whole document as a JSON value (always an object).
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Consumes the document, returning the root object.
    pub fn into_value(self) -> Value {
        self.root
    }

    /// Returns true if the root object has no keys.
    pub fn is_empty(&self) -> bool {
        self.root.as_object().is_none_or(Map::is_empty)
    }

    /// Looks up the value at `segments`.
    ///
    /// Returns `None` as soon as a segment is missing or the current node is not an
    /// object. An empty segment list returns the root.
    pub fn get<S: AsRef<str>>(&self, segments: &[S]) -> Option<&Value> {
        let mut node = &self.root;
        for segment in segments {
            match node {
                Value::Object(map) => node = map.get(segment.as_ref())?,
                _ => return None,
            }
        }
        Some(node)
    }

    /// Stores `value` at `segments`, creating intermediate objects as needed.
    ///
    /// Any intermediate node that is not an object (a scalar or an array) is replaced
    /// by an empty object. With an empty segment list the value replaces the root and
    /// must itself be an object.
    pub fn set<S: AsRef<str>>(&mut self, segments: &[S], value: Value) -> Result<()> {
        let Some((last, parents)) = segments.split_last() else {
            return match value {
                Value::Object(_) => {
                    self.root = value;
                    Ok(())
                }
                other => Err(Error::InvalidOperation(format!(
                    "the database root must be an object, not {}",
                    kind(&other)
                ))),
            };
        };

        let mut map = coerce_object(&mut self.root);
        for segment in parents {
            let child = map
                .entry(segment.as_ref())
                .or_insert_with(|| Value::Object(Map::new()));
            map = coerce_object(child);
        }
        map.insert(last.as_ref().to_string(), value);
        Ok(())
    }

    /// Removes the key at `segments`.
    ///
    /// Returns `false` if an intermediate segment is missing or not an object, if the
    /// final key does not exist, or if `segments` is empty.
    pub fn delete<S: AsRef<str>>(&mut self, segments: &[S]) -> bool {
        let Some((last, parents)) = segments.split_last() else {
            return false;
        };

        let mut node = &mut self.root;
        for segment in parents {
            node = match node {
                Value::Object(map) => match map.get_mut(segment.as_ref()) {
                    Some(child) => child,
                    None => return false,
                },
                _ => return false,
            };
        }

        match node {
            Value::Object(map) => map.remove(last.as_ref()).is_some(),
            _ => false,
        }
    }

    /// Every reachable key path, depth first.
    ///
    /// A parent is listed before its children and siblings appear in key order, so
    /// `{"x": {"y": 1}, "z": 2}` yields `["x", "x/y", "z"]`. Arrays are not descended into.
    pub fn key_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Value::Object(map) = &self.root {
            collect_paths(map, "", &mut out);
        }
        out
    }
}

/// Combines an existing value with a patch, overwriting top-level keys only.
///
/// If both are objects the patch's keys win and the remaining keys of `existing` are
/// kept; nested objects are replaced wholesale, never merged. In every other case
/// (existing is absent, a scalar or an array, or the patch is not an object) the result
/// is the patch itself.
pub fn shallow_merge(existing: Option<&Value>, patch: Value) -> Value {
    match (existing, patch) {
        (Some(Value::Object(existing)), Value::Object(patch)) => {
            let mut merged = existing.clone();
            merged.extend(patch);
            Value::Object(merged)
        }
        (_, patch) => patch,
    }
}

fn collect_paths(map: &Map<String, Value>, prefix: &str, out: &mut Vec<String>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}{}{key}", crate::path::SEPARATOR)
        };
        out.push(path.clone());
        if let Value::Object(child) = value {
            collect_paths(child, &path, out);
        }
    }
}

/// Turns `node` into an object if it is not one already and returns its map.
fn coerce_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced by an object"),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
