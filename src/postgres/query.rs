use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tokio_postgres::types::Type;

use crate::error::DbError;
use crate::results::{Columns, Row};
use crate::types::Value;

/// Extract a [`Value`] from a `tokio_postgres` row at the given index.
///
/// # Errors
/// Returns `DbError::PostgresError` if the column cannot be decoded.
pub fn postgres_extract_value(row: &tokio_postgres::Row, idx: usize) -> Result<Value, DbError> {
    let ty = row.columns()[idx].type_().clone();
    let value = match ty {
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(|v| Value::Int(i64::from(v))),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(|v| Value::Int(i64::from(v))),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::Int),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| Value::Float(f64::from(v))),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(Value::Float),
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(Value::Timestamp),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|v| Value::Timestamp(v.naive_utc())),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map(|d| Value::Timestamp(d.and_time(chrono::NaiveTime::MIN))),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map(Value::from_json),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(Value::Blob),
        // text, varchar, bpchar, name and anything else readable as text
        _ => row.try_get::<_, Option<String>>(idx)?.map(Value::Text),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Convert driver rows, sharing one column index between them.
///
/// # Errors
/// Returns `DbError` if any value cannot be decoded.
pub fn build_rows(rows: &[tokio_postgres::Row]) -> Result<Vec<Row>, DbError> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let columns = Columns::new(first.columns().iter().map(|c| c.name().to_string()).collect());
    rows.iter()
        .map(|row| {
            let values = (0..columns.len())
                .map(|idx| postgres_extract_value(row, idx))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Row::new(columns.clone(), values))
        })
        .collect()
}
