//! Cell values and timestamp-keyed series

use serde_json::Value as Json;

/// A single cell in an accumulation table
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Timestamp, ns since epoch UTC
    Timestamp(i64),
    /// A decoded enum sample: numeric code plus human-readable name
    Enum(i64, String),
}

impl Value {
    /// Convert a JSON wire value into a cell
    pub fn from_json(json: &Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Json::String(s) => Value::Str(s.clone()),
            other => Value::Str(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the cell, if any
    pub fn as_f64(&self) -> Option<f64> {
        #[allow(clippy::cast_precision_loss)]
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(f64::from(*b)),
            _ => None,
        }
    }

    /// String view of the cell, if it is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Render for a Utf8 output column
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.clone(),
            Value::Timestamp(ns) => ns.to_string(),
            Value::Enum(code, name) => format!("({code}, {name})"),
        }
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Value::from_json(&json)
    }
}

/// A timestamp-keyed series of cells
///
/// Keys are ns since epoch UTC, ascending as produced by the paginator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    pub keys: Vec<i64>,
    pub values: Vec<Value>,
}

impl Series {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            keys: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, key: i64, value: Value) {
        self.keys.push(key);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Last key, if any
    pub fn last_key(&self) -> Option<i64> {
        self.keys.last().copied()
    }

    /// Append all rows of `other`
    pub fn extend(&mut self, other: Series) {
        self.keys.extend(other.keys);
        self.values.extend(other.values);
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &Value)> {
        self.keys.iter().copied().zip(self.values.iter())
    }
}
