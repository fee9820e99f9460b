use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// A raw storage cell as the native engine sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Cell {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub(crate) fn from_value_ref(value: rusqlite::types::ValueRef<'_>) -> Result<Self, std::str::Utf8Error> {
        use rusqlite::types::ValueRef;
        Ok(match value {
            ValueRef::Null => Cell::Null,
            ValueRef::Integer(i) => Cell::Integer(i),
            ValueRef::Real(f) => Cell::Real(f),
            ValueRef::Text(bytes) => Cell::Text(std::str::from_utf8(bytes)?.to_owned()),
            ValueRef::Blob(bytes) => Cell::Blob(bytes.to_vec()),
        })
    }
}

impl rusqlite::ToSql for Cell {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::{ToSqlOutput, ValueRef};
        Ok(ToSqlOutput::Borrowed(match self {
            Cell::Null => ValueRef::Null,
            Cell::Integer(i) => ValueRef::Integer(*i),
            Cell::Real(f) => ValueRef::Real(*f),
            Cell::Text(s) => ValueRef::Text(s.as_bytes()),
            Cell::Blob(b) => ValueRef::Blob(b),
        }))
    }
}

/// An enumeration member as carried between marshaling and user types.
///
/// `name` is set whenever the member could be identified; text-mode columns always read back by
/// name so members sharing an ordinal stay distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumValue {
    pub ordinal: i64,
    pub name: Option<&'static str>,
}

/// Typed values that can be stored in a mapped column or bound as query parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Guid(Uuid),
    DateTime(NaiveDateTime),
    DateTimeUtc(DateTime<Utc>),
    Date(NaiveDate),
    TimeSpan(TimeDelta),
    Enum(EnumValue),
    Json(JsonValue),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Enum(e) => Some(e.ordinal),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(value) => Some(*value as f64),
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
            Value::Bool(b) => Some(*b),
            Value::Int(0) => Some(false),
            Value::Int(1) => Some(true),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let Value::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

/// Storage affinity of a column, as declared or as reported by the live schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Affinity {
    Integer,
    Real,
    Text,
    Blob,
    Numeric,
}

impl Affinity {
    /// Apply SQLite's affinity rules to a declared column type.
    #[must_use]
    pub fn from_declared_type(declared: &str) -> Self {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            Affinity::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Affinity::Text
        } else if upper.is_empty() || upper.contains("BLOB") {
            Affinity::Blob
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Affinity::Real
        } else {
            Affinity::Numeric
        }
    }

    /// Literal used as the default when a `NOT NULL` column is added to populated tables.
    pub(crate) fn zero_literal(self) -> &'static str {
        match self {
            Affinity::Integer | Affinity::Numeric => "0",
            Affinity::Real => "0.0",
            Affinity::Text => "''",
            Affinity::Blob => "x''",
        }
    }
}

/// Declared type of a mapped column; drives marshaling and the DDL column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Integer,
    Real,
    Text,
    Blob,
    Guid,
    DateTime,
    DateTimeUtc,
    Date,
    TimeSpan,
    Enum {
        members: &'static [(&'static str, i64)],
        as_text: bool,
    },
    Json,
}
