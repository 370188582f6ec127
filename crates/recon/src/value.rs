//! Cell values and the one comparison rule every diff path goes through.

use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Field types
// ---------------------------------------------------------------------------

/// Declared type of an attribute column.
///
/// Geometry never appears here: the geometry column of a snapshot is held
/// separately and is opaque to attribute comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Boolean,
}

impl Default for FieldType {
    fn default() -> Self {
        Self::Text
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Number => write!(f, "number"),
            Self::Boolean => write!(f, "boolean"),
        }
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A single attribute value.
///
/// Numbers are wrapped in `OrderedFloat` so values can serve as keys
/// (`Eq + Hash + Ord`). The derived ordering sorts by variant first, which
/// only matters for mixed-type key columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Text(String),
    Number(OrderedFloat<f64>),
    Bool(bool),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn number(n: f64) -> Self {
        Self::Number(OrderedFloat(n))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(n.0),
            _ => None,
        }
    }

    /// Null, or an empty string.
    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// `None` for null-like values, the value itself otherwise.
    pub fn present(&self) -> Option<&Value> {
        if self.is_null() {
            None
        } else {
            Some(self)
        }
    }

    /// The column type this value fits, `None` for null.
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            Self::Null => None,
            Self::Text(_) => Some(FieldType::Text),
            Self::Number(_) => Some(FieldType::Number),
            Self::Bool(_) => Some(FieldType::Boolean),
        }
    }

    /// Whether the value can live in a column of type `ty`. Null fits anywhere.
    pub fn fits(&self, ty: FieldType) -> bool {
        self.field_type().map_or(true, |t| t == ty)
    }

    /// Parse a raw cell according to its declared column type.
    /// Empty cells become `Null`.
    pub fn parse_as(raw: &str, ty: FieldType) -> Result<Value, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Value::Null);
        }
        match ty {
            FieldType::Text => Ok(Value::Text(raw.to_string())),
            FieldType::Number => trimmed
                .parse::<f64>()
                .map(Value::number)
                .map_err(|_| format!("'{raw}' is not a number")),
            FieldType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "y" => Ok(Value::Bool(true)),
                "false" | "0" | "no" | "n" => Ok(Value::Bool(false)),
                _ => Err(format!("'{raw}' is not a boolean")),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Text(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{}", n.0),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

// ---------------------------------------------------------------------------
// Null-aware equality
// ---------------------------------------------------------------------------

/// Null-aware equality: two absent values are equal, an absent and a present
/// value are not, two present values compare with `==`.
///
/// Attribute diffing feeds it `Value::present()`, geometry diffing feeds it
/// the optional geometry of each side.
pub fn null_aware_eq<T: PartialEq + ?Sized>(old: Option<&T>, new: Option<&T>) -> bool {
    match (old, new) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// `null_aware_eq` over attribute values.
pub fn values_equal(old: &Value, new: &Value) -> bool {
    null_aware_eq(old.present(), new.present())
}
