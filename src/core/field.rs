//! Field types, field values and per-type coercion

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

use crate::core::error::FieldIssue;

/// Declared type of a model field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    Float,
    String,
    Boolean,
    Uuid,
}

/// A polymorphic field value that can hold different types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Uuid(Uuid),
    Null,
}

/// Why a raw value could not be coerced to a declared type
#[derive(Debug, Clone, PartialEq)]
pub struct CoercionError {
    pub expected: FieldType,
    pub message: String,
}

impl CoercionError {
    fn new(expected: FieldType, message: impl Into<String>) -> Self {
        Self {
            expected,
            message: message.into(),
        }
    }

    /// Attach the field name, producing a reportable issue
    pub fn into_issue(self, field: &str) -> FieldIssue {
        FieldIssue::new(field, format!("{}_parsing", self.expected), self.message)
    }
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
            FieldType::Uuid => "uuid",
        }
    }

    /// Coerce a raw query-string token.
    ///
    /// Accepted literals:
    /// - integer: optional sign followed by decimal digits (64-bit)
    /// - float: decimal or exponent notation, finite values only
    /// - string: verbatim
    /// - boolean: exactly `true` or `false`
    /// - uuid: hyphenated or 32 hex digits, normalised to lowercase hyphenated
    pub fn coerce_str(&self, raw: &str) -> Result<FieldValue, CoercionError> {
        match self {
            FieldType::Integer => raw.parse::<i64>().map(FieldValue::Integer).map_err(|_| {
                CoercionError::new(
                    *self,
                    format!("Input should be a valid integer, unable to parse '{}'", raw),
                )
            }),
            FieldType::Float => match raw.parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(FieldValue::Float(f)),
                _ => Err(CoercionError::new(
                    *self,
                    format!("Input should be a valid number, unable to parse '{}'", raw),
                )),
            },
            FieldType::String => Ok(FieldValue::String(raw.to_string())),
            FieldType::Boolean => match raw {
                "true" => Ok(FieldValue::Boolean(true)),
                "false" => Ok(FieldValue::Boolean(false)),
                _ => Err(CoercionError::new(
                    *self,
                    format!("Input should be 'true' or 'false', got '{}'", raw),
                )),
            },
            FieldType::Uuid => parse_uuid(raw).map(FieldValue::Uuid),
        }
    }

    /// Coerce a JSON body value. `null` is not handled here; callers decide
    /// whether a missing value is acceptable.
    pub fn coerce_json(&self, value: &Value) -> Result<FieldValue, CoercionError> {
        match (self, value) {
            (FieldType::Integer, Value::Number(n)) => n.as_i64().map(FieldValue::Integer).ok_or_else(|| {
                CoercionError::new(*self, format!("Input should be a valid integer, got {}", n))
            }),
            (FieldType::Float, Value::Number(n)) => n
                .as_f64()
                .map(FieldValue::Float)
                .ok_or_else(|| CoercionError::new(*self, "Input should be a valid number")),
            (FieldType::String, Value::String(s)) => Ok(FieldValue::String(s.clone())),
            (FieldType::Boolean, Value::Bool(b)) => Ok(FieldValue::Boolean(*b)),
            (FieldType::Uuid, Value::String(s)) => parse_uuid(s).map(FieldValue::Uuid),
            (_, other) => Err(CoercionError::new(
                *self,
                format!(
                    "Input should be a valid {}, got {}",
                    self.as_str(),
                    json_kind(other)
                ),
            )),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, CoercionError> {
    if raw.len() != 32 && raw.len() != 36 {
        return Err(CoercionError::new(
            FieldType::Uuid,
            format!("Input should be a valid UUID, got '{}'", raw),
        ));
    }
    Uuid::parse_str(raw).map_err(|e| {
        CoercionError::new(FieldType::Uuid, format!("Input should be a valid UUID, {}", e))
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl FieldValue {
    /// Get the value as a string if possible
    pub fn as_string(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as an integer if possible
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the value as a float, widening integers
    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Convert into a JSON value
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Float(f) => Value::from(*f),
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Uuid(u) => Value::String(u.to_string()),
            FieldValue::Null => Value::Null,
        }
    }

    /// Compare two values of compatible types.
    ///
    /// Integers and floats compare numerically with each other. Values of
    /// unrelated types are unordered.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Integer(a), FieldValue::Integer(b)) => Some(a.cmp(b)),
            (FieldValue::String(a), FieldValue::String(b)) => Some(a.cmp(b)),
            (FieldValue::Boolean(a), FieldValue::Boolean(b)) => Some(a.cmp(b)),
            (FieldValue::Uuid(a), FieldValue::Uuid(b)) => Some(a.cmp(b)),
            (FieldValue::Null, FieldValue::Null) => Some(Ordering::Equal),
            (a, b) => match (a.as_float(), b.as_float()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        FieldValue::Uuid(value)
    }
}
