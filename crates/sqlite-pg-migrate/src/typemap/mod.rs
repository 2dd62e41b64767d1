//! Type mapping between SQLite storage classes and PostgreSQL types.
//!
//! SQLite keeps UUIDs, dates and timestamps as TEXT and may hand back an
//! INTEGER where a REAL was declared. PostgreSQL is strictly typed, so
//! values are bound as native types behind explicit casts.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, ValueRef};
use tokio_postgres::types::ToSql;
use uuid::Uuid;

use crate::core::schema::{Field, FieldType};
use crate::core::value::{SqlNullType, SqlValue};

/// Timestamp layouts with an explicit offset, most specific first.
const OFFSET_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];

/// Timestamp layouts without an offset; interpreted as UTC.
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Decode column `idx` of a SQLite row as `field`.
pub fn decode_sqlite(row: &SqliteRow, idx: usize, field: &Field) -> Result<SqlValue, String> {
    let raw = row
        .try_get_raw(idx)
        .map_err(|e| format!("field '{}': {}", field.name, e))?;
    if raw.is_null() {
        return Ok(SqlValue::Null(field.ty.into()));
    }

    // Unchecked reads let SQLite apply its own storage-class conversions.
    match field.ty {
        FieldType::Float => row
            .try_get_unchecked::<f64, _>(idx)
            .map(SqlValue::Float)
            .map_err(|e| format!("field '{}': {}", field.name, e)),
        _ => {
            let text: String = row
                .try_get_unchecked(idx)
                .map_err(|e| format!("field '{}': {}", field.name, e))?;
            parse_text(field, &text)
        }
    }
}

/// Interpret a TEXT value according to the field type.
pub fn parse_text(field: &Field, text: &str) -> Result<SqlValue, String> {
    match field.ty {
        FieldType::Text => Ok(SqlValue::Text(text.to_string())),
        FieldType::Uuid => Uuid::parse_str(text.trim())
            .map(SqlValue::Uuid)
            .map_err(|e| format!("field '{}': invalid uuid '{}': {}", field.name, text, e)),
        FieldType::Float => text
            .trim()
            .parse::<f64>()
            .map(SqlValue::Float)
            .map_err(|e| format!("field '{}': invalid float '{}': {}", field.name, text, e)),
        FieldType::Date => parse_date(text.trim())
            .map(SqlValue::Date)
            .ok_or_else(|| format!("field '{}': invalid date '{}'", field.name, text)),
        FieldType::Timestamp => parse_timestamp(text.trim())
            .map(SqlValue::Timestamp)
            .ok_or_else(|| format!("field '{}': invalid timestamp '{}'", field.name, text)),
    }
}

/// Parse `YYYY-MM-DD`, falling back to the date part of a timestamp.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(text).map(|ts| ts.date_naive()))
}

/// Parse the timestamp layouts found in SQLite exports, normalized to UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in OFFSET_TIMESTAMP_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(text, fmt) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(ts.and_utc());
        }
    }
    None
}

/// PostgreSQL cast applied to a placeholder for this field type.
pub fn pg_cast(ty: FieldType) -> &'static str {
    match ty {
        FieldType::Uuid => "::uuid",
        FieldType::Text => "::text",
        FieldType::Float => "::float8",
        FieldType::Date => "::date",
        FieldType::Timestamp => "::timestamptz",
    }
}

/// Convert a value to a boxed, natively typed PostgreSQL parameter.
pub fn pg_param(value: &SqlValue) -> Box<dyn ToSql + Sync + Send> {
    match value {
        SqlValue::Null(null_type) => match null_type {
            SqlNullType::Uuid => Box::new(None::<Uuid>),
            SqlNullType::Text => Box::new(None::<String>),
            SqlNullType::Float => Box::new(None::<f64>),
            SqlNullType::Date => Box::new(None::<NaiveDate>),
            SqlNullType::Timestamp => Box::new(None::<DateTime<Utc>>),
        },
        SqlValue::Uuid(u) => Box::new(*u),
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::Float(f) => Box::new(*f),
        SqlValue::Date(d) => Box::new(*d),
        SqlValue::Timestamp(ts) => Box::new(*ts),
    }
}

/// Decode column `idx` of a PostgreSQL row as `field`.
pub fn decode_pg(row: &tokio_postgres::Row, idx: usize, field: &Field) -> Result<SqlValue, String> {
    let null = SqlValue::Null(field.ty.into());
    let err = |e: tokio_postgres::Error| format!("field '{}': {}", field.name, e);
    let value = match field.ty {
        FieldType::Uuid => row
            .try_get::<_, Option<Uuid>>(idx)
            .map_err(err)?
            .map(SqlValue::Uuid),
        FieldType::Text => row
            .try_get::<_, Option<String>>(idx)
            .map_err(err)?
            .map(SqlValue::Text),
        FieldType::Float => row
            .try_get::<_, Option<f64>>(idx)
            .map_err(err)?
            .map(SqlValue::Float),
        FieldType::Date => row
            .try_get::<_, Option<NaiveDate>>(idx)
            .map_err(err)?
            .map(SqlValue::Date),
        FieldType::Timestamp => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)
            .map_err(err)?
            .map(SqlValue::Timestamp),
    };
    Ok(value.unwrap_or(null))
}
