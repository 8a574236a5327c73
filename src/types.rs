use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::DbError;

/// Column name to value mapping used for generic records, payloads and map destinations.
pub type ValueMap = BTreeMap<String, Value>;

/// Values that can be stored in a row, bound as a parameter or used inside a condition.
///
/// Reuse the same enum across backends so mapping and filtering code can match on it
/// exhaustively instead of branching on driver types:
/// ```rust
/// use dbmux::prelude::*;
///
/// let params = vec![
///     Value::Int(1),
///     Value::Text("alice".into()),
///     Value::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// Binary data
    Blob(Vec<u8>),
    /// Nested record
    Record(ValueMap),
    /// Ordered list of values
    List(Vec<Value>),
}

impl Value {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this value equals the zero value of its type (`omitempty` test).
    #[must_use]
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !*b,
            Value::Int(i) => *i == 0,
            Value::Float(f) => *f == 0.0,
            Value::Text(s) => s.is_empty(),
            Value::Timestamp(ts) => *ts == NaiveDateTime::default(),
            Value::Blob(b) => b.is_empty(),
            Value::Record(map) => map.values().all(Value::is_zero),
            Value::List(items) => items.is_empty(),
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let Value::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            Value::Int(1) => Some(true),
            Value::Int(0) => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let Value::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            // Try "YYYY-MM-DD HH:MM:SS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            // Try "YYYY-MM-DD HH:MM:SS.f"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt);
            }
        }
        None
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let Value::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_record(&self) -> Option<&ValueMap> {
        if let Value::Record(map) = self {
            Some(map)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        if let Value::List(items) = self {
            Some(items)
        } else {
            None
        }
    }

    /// Short type label used in conversion errors.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
            Value::Blob(_) => "blob",
            Value::Record(_) => "record",
            Value::List(_) => "list",
        }
    }

    /// Compare two values of compatible types.
    ///
    /// Returns `None` when either side is NULL or the types cannot be ordered against
    /// each other. Integers and floats compare numerically.
    #[must_use]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_float()?.partial_cmp(&other.as_float()?)
            }
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Bool(_), Value::Int(_)) | (Value::Int(_), Value::Bool(_)) => {
                Some(self.as_int()?.cmp(&other.as_int()?))
            }
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Text(_)) => Some(a.cmp(&other.as_timestamp()?)),
            (Value::Text(_), Value::Timestamp(b)) => Some(self.as_timestamp()?.cmp(b)),
            (Value::Blob(a), Value::Blob(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) if a == b => Some(Ordering::Equal),
            (Value::Record(a), Value::Record(b)) if a == b => Some(Ordering::Equal),
            _ => None,
        }
    }

    /// Total order used when sorting rows: NULL first, then by `compare`, falling back to
    /// the type rank for values that cannot be compared.
    #[must_use]
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            _ => self
                .compare(other)
                .unwrap_or_else(|| self.type_rank().cmp(&other.type_rank())),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) | Value::Int(_) | Value::Float(_) => 1,
            Value::Text(_) | Value::Timestamp(_) => 2,
            Value::Blob(_) => 3,
            Value::List(_) => 4,
            Value::Record(_) => 5,
        }
    }

    /// Render nested values as JSON for backends that store them as text.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Timestamp(ts) => {
                serde_json::Value::String(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string())
            }
            Value::Blob(bytes) => {
                serde_json::Value::Array(bytes.iter().map(|b| serde_json::Value::from(*b)).collect())
            }
            Value::Record(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
        }
    }

    /// Inverse of [`Value::to_json`] for the shapes JSON can express.
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Record(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

macro_rules! value_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Int(i64::from(v))
                }
            }

            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self, DbError> {
                    let raw = match &value {
                        Value::Int(i) => *i,
                        Value::Bool(b) => i64::from(*b),
                        Value::Text(s) => s.trim().parse::<i64>().map_err(|e| {
                            DbError::ConversionError(format!("cannot parse {s:?} as integer: {e}"))
                        })?,
                        other => {
                            return Err(DbError::ConversionError(format!(
                                "expected integer, found {}",
                                other.type_name()
                            )));
                        }
                    };
                    <$ty>::try_from(raw).map_err(|e| {
                        DbError::ConversionError(format!(
                            "integer {raw} out of range for {}: {e}",
                            stringify!($ty)
                        ))
                    })
                }
            }
        )*
    };
}

/// Conversion from a backend [`Value`] into a Rust field type.
pub trait FromValue: Sized {
    /// Convert the value, failing with `DbError::ConversionError` on a type mismatch.
    ///
    /// # Errors
    /// Returns `DbError::ConversionError` when the value cannot represent `Self`.
    fn from_value(value: Value) -> Result<Self, DbError>;
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl From<ValueMap> for Value {
    fn from(v: ValueMap) -> Self {
        Value::Record(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, DbError> {
        Ok(value)
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, DbError> {
        match &value {
            Value::Text(s) => s.trim().parse::<f64>().map_err(|e| {
                DbError::ConversionError(format!("cannot parse {s:?} as float: {e}"))
            }),
            other => other.as_float().ok_or_else(|| {
                DbError::ConversionError(format!("expected float, found {}", other.type_name()))
            }),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, DbError> {
        value.as_bool().ok_or_else(|| {
            DbError::ConversionError(format!("expected bool, found {}", value.type_name()))
        })
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, DbError> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) => Ok(f.to_string()),
            Value::Timestamp(ts) => Ok(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            other => Err(DbError::ConversionError(format!(
                "expected text, found {}",
                other.type_name()
            ))),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self, DbError> {
        value.as_timestamp().ok_or_else(|| {
            DbError::ConversionError(format!("expected timestamp, found {}", value.type_name()))
        })
    }
}

impl FromValue for ValueMap {
    fn from_value(value: Value) -> Result<Self, DbError> {
        match value {
            Value::Record(map) => Ok(map),
            Value::Text(s) => match Value::from_json(serde_json::from_str(&s).map_err(|e| {
                DbError::ConversionError(format!("stored record is not valid JSON: {e}"))
            })?) {
                Value::Record(map) => Ok(map),
                other => Err(DbError::ConversionError(format!(
                    "expected record, found {}",
                    other.type_name()
                ))),
            },
            other => Err(DbError::ConversionError(format!(
                "expected record, found {}",
                other.type_name()
            ))),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, DbError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self, DbError> {
        let items = match value {
            Value::List(items) => items,
            Value::Text(s) => match Value::from_json(serde_json::from_str(&s).map_err(|e| {
                DbError::ConversionError(format!("stored list is not valid JSON: {e}"))
            })?) {
                Value::List(items) => items,
                other => {
                    return Err(DbError::ConversionError(format!(
                        "expected list, found {}",
                        other.type_name()
                    )));
                }
            },
            Value::Null => Vec::new(),
            other => {
                return Err(DbError::ConversionError(format!(
                    "expected list, found {}",
                    other.type_name()
                )));
            }
        };
        items.into_iter().map(T::from_value).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values() {
        assert!(Value::Int(0).is_zero());
        assert!(Value::Text(String::new()).is_zero());
        assert!(Value::Null.is_zero());
        assert!(!Value::Int(3).is_zero());
        assert!(!Value::Bool(true).is_zero());
    }

    #[test]
    fn numeric_compare_crosses_int_and_float() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Some(Ordering::Less));
        assert_eq!(Value::Float(3.0).compare(&Value::Int(3)), Some(Ordering::Equal));
        assert_eq!(Value::Null.compare(&Value::Int(1)), None);
    }

    #[test]
    fn sort_places_null_first() {
        let mut values = vec![Value::Int(3), Value::Null, Value::Int(1)];
        values.sort_by(Value::sort_cmp);
        assert_eq!(values, vec![Value::Null, Value::Int(1), Value::Int(3)]);
    }

    #[test]
    fn integer_conversion_checks_range() {
        assert_eq!(i32::from_value(Value::Int(40)).unwrap(), 40);
        assert!(u8::from_value(Value::Int(300)).is_err());
        assert!(i64::from_value(Value::Text("x".into())).is_err());
    }

    #[test]
    fn json_round_trip_for_nested_values() {
        let mut inner = ValueMap::new();
        inner.insert("city".into(), Value::Text("Oslo".into()));
        let value = Value::List(vec![Value::Int(1), Value::Record(inner)]);
        assert_eq!(Value::from_json(value.to_json()), value);
    }
}
