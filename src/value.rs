//! The value tree held by a form.
//!
//! A JSON-like tree whose containers are reference counted. Writes through
//! [`crate::path::set`] copy only the spine from the root to the written
//! node, so every untouched branch of a new tree is the *same allocation*
//! as in the old one. [`Value::ptr_eq`] exposes that identity and
//! [`PartialEq`] uses it as a fast path before comparing structurally.

use crate::file::FileData;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;

/// Ordered map backing object nodes.
pub type Map = IndexMap<String, Value>;

#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Arc<Vec<Value>>),
    Object(Arc<Map>),
    File(Arc<FileData>),
}

impl Value {
    pub fn object() -> Self {
        Value::Object(Arc::new(Map::new()))
    }

    pub fn array() -> Self {
        Value::Array(Arc::new(Vec::new()))
    }

    pub fn from_items(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(items))
    }

    pub fn from_map(map: Map) -> Self {
        Value::Object(Arc::new(map))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&Arc<FileData>> {
        match self {
            Value::File(file) => Some(file),
            _ => None,
        }
    }

    /// Child lookup by a single path segment.
    ///
    /// Arrays are indexed by numeric segments; objects by key (a numeric
    /// segment is an ordinary key there).
    pub fn child(&self, segment: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// "Blank" in the sense of a required-field check: null, empty string,
    /// empty array or empty object.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    /// True when both values are the same allocation (containers and files)
    /// or identical scalars.
    ///
    /// This is the identity check selector-based consumers use to skip work
    /// for branches a write did not touch.
    pub fn ptr_eq(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Array(x), Value::Array(y)) => Arc::ptr_eq(x, y),
            (Value::Object(x), Value::Object(y)) => Arc::ptr_eq(x, y),
            (Value::File(x), Value::File(y)) => Arc::ptr_eq(x, y),
            (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Number(x), Value::Number(y)) => x == y,
            (Value::String(x), Value::String(y)) => x == y,
            _ => false,
        }
    }

    /// Converts to a plain `serde_json::Value`. Files become their descriptor.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => {
                let obj: serde_json::Map<String, serde_json::Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                serde_json::Value::Object(obj)
            }
            Value::File(file) => serde_json::to_value(file.descriptor())
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

fn integer(n: &serde_json::Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

/// Integers compare exactly; a float equals an integer only when it is
/// integral and of the same magnitude.
fn numbers_eq(a: &serde_json::Number, b: &serde_json::Number) -> bool {
    match (integer(a), integer(b)) {
        (Some(x), Some(y)) => x == y,
        (Some(i), None) => float_is_integer(b, i),
        (None, Some(i)) => float_is_integer(a, i),
        (None, None) => a.as_f64() == b.as_f64(),
    }
}

fn float_is_integer(n: &serde_json::Number, i: i128) -> bool {
    n.as_f64()
        .is_some_and(|f| f.fract() == 0.0 && f.abs() < 1e38 && f as i128 == i)
}

/// Structural equality.
///
/// Integer 42 equals float 42.0; object key order is irrelevant; arrays
/// compare element-wise. Shared allocations short-circuit to `true`.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => numbers_eq(a, b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                Arc::ptr_eq(a, b)
                    || (a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y))
            }
            (Value::Object(a), Value::Object(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|bv| v == bv))
            }
            (Value::File(a), Value::File(b)) => Arc::ptr_eq(a, b) || a.id == b.id,
            _ => false,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::{SerializeMap, SerializeSeq};
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => n.serialize(serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(obj) => {
                let mut map = serializer.serialize_map(Some(obj.len()))?;
                for (k, v) in obj.iter() {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Value::File(file) => file.descriptor().serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::from(value))
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::from_items(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(obj) => {
                Value::from_map(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::from_items(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::from_map(map)
    }
}

impl From<FileData> for Value {
    fn from(file: FileData) -> Self {
        Value::File(Arc::new(file))
    }
}

impl From<Arc<FileData>> for Value {
    fn from(file: Arc<FileData>) -> Self {
        Value::File(file)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Walks every node below `root`, calling `visit` with the node's path.
///
/// The root itself is visited with the empty path. Containers are visited
/// before their children.
pub fn walk<'a>(root: &'a Value, visit: &mut dyn FnMut(&str, &'a Value)) {
    fn inner<'a>(prefix: &str, value: &'a Value, visit: &mut dyn FnMut(&str, &'a Value)) {
        visit(prefix, value);
        match value {
            Value::Object(map) => {
                for (key, child) in map.iter() {
                    inner(&crate::path::join(prefix, key), child, visit);
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    inner(&crate::path::join(prefix, &i.to_string()), child, visit);
                }
            }
            _ => {}
        }
    }
    inner("", root, visit);
}
