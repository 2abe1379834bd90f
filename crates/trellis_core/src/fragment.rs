//! Configuration fragments.
//!
//! A [`Fragment`] is a string-keyed map of scalars, sequences and nested
//! fragments describing one resource's declarative properties. Typed props
//! structs enter the merge pipeline through [`Fragment::from_props`] and leave
//! it again through [`Fragment::to_settings`], which is where the closed
//! per-family schema is enforced.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConstructError, ConstructResult};

/// A nested key-value configuration unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fragment(Map<String, Value>);

impl Fragment {
    /// Create an empty fragment.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value. Anything but an object is rejected.
    pub fn from_value(value: Value) -> ConstructResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ConstructError::configuration(
                "<root>",
                format!("expected a mapping, found {}", value_kind(&other)),
            )),
        }
    }

    /// Serialize a typed props struct into a fragment.
    ///
    /// Props structs skip unset optional fields, so only keys the caller
    /// actually supplied end up in the fragment.
    pub fn from_props<T: Serialize>(props: &T) -> ConstructResult<Self> {
        Self::from_value(serde_json::to_value(props)?)
    }

    /// Decode a merged fragment into the fully specified settings of a family.
    pub fn to_settings<T: DeserializeOwned>(&self, resource: &str) -> ConstructResult<T> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| ConstructError::configuration(resource, e.to_string()))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Look up a dotted key path such as `tableInput.storageDescriptor.location`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.get_path(path).is_some()
    }

    /// Whether the key path is present with a non-null value.
    pub fn is_set(&self, path: &str) -> bool {
        matches!(self.get_path(path), Some(value) if !value.is_null())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Check that every required key path is present and non-null.
    pub fn require_keys(&self, resource: &str, paths: &[&str]) -> ConstructResult<()> {
        for path in paths {
            if !self.is_set(path) {
                return Err(ConstructError::configuration(
                    format!("{}.{}", resource, path),
                    "required key is missing or null after merge",
                ));
            }
        }
        Ok(())
    }
}

impl From<Map<String, Value>> for Fragment {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Fragment {
    type Error = ConstructError;

    fn try_from(value: Value) -> ConstructResult<Self> {
        Self::from_value(value)
    }
}

impl From<Fragment> for Value {
    fn from(fragment: Fragment) -> Self {
        fragment.into_value()
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
