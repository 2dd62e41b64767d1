//! Storage-neutral values carried between the source and target stores.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::schema::FieldType;

/// Type hint for NULL values so the destination can bind a typed NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlNullType {
    Uuid,
    Text,
    Float,
    Date,
    Timestamp,
}

impl From<FieldType> for SqlNullType {
    fn from(ty: FieldType) -> Self {
        match ty {
            FieldType::Uuid => SqlNullType::Uuid,
            FieldType::Text => SqlNullType::Text,
            FieldType::Float => SqlNullType::Float,
            FieldType::Date => SqlNullType::Date,
            FieldType::Timestamp => SqlNullType::Timestamp,
        }
    }
}

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL with type hint for correct parameter binding.
    Null(SqlNullType),
    Uuid(Uuid),
    Text(String),
    Float(f64),
    Date(NaiveDate),
    /// Timestamp normalized to UTC.
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Get the SqlNullType for this value.
    #[must_use]
    pub fn null_type(&self) -> SqlNullType {
        match self {
            SqlValue::Null(t) => *t,
            SqlValue::Uuid(_) => SqlNullType::Uuid,
            SqlValue::Text(_) => SqlNullType::Text,
            SqlValue::Float(_) => SqlNullType::Float,
            SqlValue::Date(_) => SqlNullType::Date,
            SqlValue::Timestamp(_) => SqlNullType::Timestamp,
        }
    }

    /// Wrap an optional value, substituting a typed NULL for `None`.
    pub fn from_option<T: Into<SqlValue>>(value: Option<T>, null: SqlNullType) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null(null))
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null(_) => f.write_str("NULL"),
            SqlValue::Uuid(u) => write!(f, "{}", u),
            SqlValue::Text(s) => write!(f, "{:?}", s),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Date(d) => write!(f, "{}", d),
            SqlValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}
