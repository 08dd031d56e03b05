//! Shape-checked accessors over the loosely-typed attribute representation.
//!
//! Persisted attributes are nested `serde_json` values. Migration code never
//! downcasts blindly; every structural expectation goes through one of these
//! helpers so a malformed bag surfaces as a [`MigrationError`] instead of a
//! panic.

use serde_json::{Map, Value};

use crate::error::MigrationError;

/// Attribute bag payload: string keys to tagged values.
pub type Attrs = Map<String, Value>;

/// Human-readable tag for a value's shape, used in error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

pub(crate) fn malformed(path: &str, expected: &'static str, value: &Value) -> MigrationError {
    MigrationError::MalformedState {
        path: path.to_string(),
        expected,
        found: type_name(value),
    }
}

/// Unwrap a map-shaped value or fail with the path that was malformed.
pub fn expect_object(value: Value, path: &str) -> Result<Attrs, MigrationError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(malformed(path, "map", &other)),
    }
}

/// Unwrap a list-shaped value or fail with the path that was malformed.
pub fn expect_array(value: Value, path: &str) -> Result<Vec<Value>, MigrationError> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(malformed(path, "list", &other)),
    }
}

/// Read a string value or fail with the path that was malformed.
pub fn expect_string<'a>(value: &'a Value, path: &str) -> Result<&'a str, MigrationError> {
    value.as_str().ok_or_else(|| malformed(path, "string", value))
}

/// Read a non-negative integer value or fail with the path that was malformed.
pub fn expect_u64(value: &Value, path: &str) -> Result<u64, MigrationError> {
    value.as_u64().ok_or_else(|| malformed(path, "number", value))
}

/// Join a dotted attribute path with a child key.
pub(crate) fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}
