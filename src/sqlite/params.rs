use std::fmt::Write;

use rusqlite::types::Value as SqliteValue;

use crate::types::Value;

// Thread-local buffer for timestamp formatting
thread_local! {
    static TIMESTAMP_BUF: std::cell::RefCell<String> = std::cell::RefCell::new(String::with_capacity(32));
}

/// Convert a single [`Value`] to a rusqlite value.
///
/// Booleans become integers, timestamps ISO text, records and lists JSON text.
#[must_use]
pub fn value_to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Int(i) => SqliteValue::Integer(*i),
        Value::Float(f) => SqliteValue::Real(*f),
        Value::Text(s) => SqliteValue::Text(s.clone()),
        Value::Timestamp(dt) => TIMESTAMP_BUF.with(|buf| {
            let mut borrow = buf.borrow_mut();
            borrow.clear();
            let _ = write!(borrow, "{}", dt.format("%F %T%.f"));
            SqliteValue::Text(borrow.clone())
        }),
        Value::Blob(bytes) => SqliteValue::Blob(bytes.clone()),
        Value::Record(_) | Value::List(_) => SqliteValue::Text(value.to_json().to_string()),
    }
}

/// Convert a rusqlite value back to a [`Value`].
#[must_use]
pub fn sqlite_to_value(value: SqliteValue) -> Value {
    match value {
        SqliteValue::Null => Value::Null,
        SqliteValue::Integer(i) => Value::Int(i),
        SqliteValue::Real(f) => Value::Float(f),
        SqliteValue::Text(s) => Value::Text(s),
        SqliteValue::Blob(b) => Value::Blob(b),
    }
}

/// Unified `SQLite` parameter container.
#[derive(Debug, Clone, Default)]
pub struct Params(pub Vec<SqliteValue>);

impl Params {
    #[must_use]
    pub fn convert(params: &[Value]) -> Self {
        Params(params.iter().map(value_to_sqlite).collect())
    }

    #[must_use]
    pub fn as_values(&self) -> &[SqliteValue] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueMap;
    use chrono::NaiveDate;

    #[test]
    fn converts_scalars_and_nested_values() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 30, 0))
            .unwrap();
        let mut map = ValueMap::new();
        map.insert("city".into(), Value::from("Oslo"));
        let params = Params::convert(&[
            Value::Bool(true),
            Value::Timestamp(ts),
            Value::Record(map),
        ]);
        assert_eq!(params.as_values()[0], SqliteValue::Integer(1));
        assert_eq!(params.as_values()[1], SqliteValue::Text("2024-03-01 12:30:00".into()));
        assert_eq!(params.as_values()[2], SqliteValue::Text(r#"{"city":"Oslo"}"#.into()));
    }
}
