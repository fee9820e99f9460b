//! Conversions between Rust types and [`Value`].
//!
//! Entities use these when building their column values and when reading a mapped row:
//!
//! ```rust
//! use sqlite_mapper::prelude::*;
//!
//! let v = Some(7_i32).into_value();
//! assert_eq!(v, Value::Int(7));
//! let back: Option<i32> = FromValue::from_value(v).unwrap();
//! assert_eq!(back, Some(7));
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::MapperError;
use crate::types::{EnumValue, Value, ValueKind};

pub trait IntoValue {
    fn into_value(self) -> Value;
}

pub trait FromValue: Sized {
    /// Convert a decoded column value into `Self`.
    ///
    /// # Errors
    /// Returns [`MapperError::Conversion`] when the value has the wrong shape or is NULL for a
    /// non-optional target.
    fn from_value(value: Value) -> Result<Self, MapperError>;
}

/// Rust types with a natural column kind, used by [`crate::schema::ColumnSpec::of`].
pub trait ColumnType {
    const KIND: ValueKind;
}

/// Enumerations persisted by ordinal, or by member name when `STORE_AS_TEXT` is set.
///
/// Usually implemented through [`crate::stored_enum!`].
pub trait StoredEnum: Sized + Copy {
    /// Member names with their ordinals, in declaration order. Ordinals may repeat.
    const MEMBERS: &'static [(&'static str, i64)];
    const STORE_AS_TEXT: bool;

    fn ordinal(&self) -> i64;
    fn name(&self) -> &'static str;
    fn from_name(name: &str) -> Option<Self>;
    /// First member declared with `ordinal`.
    fn from_ordinal(ordinal: i64) -> Option<Self>;
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, MapperError> {
        Ok(value)
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        self.map_or(Value::Null, IntoValue::into_value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, MapperError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl<T: ColumnType> ColumnType for Option<T> {
    const KIND: ValueKind = T::KIND;
}

fn unexpected(target: &str, value: &Value) -> MapperError {
    if value.is_null() {
        MapperError::Conversion(format!("unexpected NULL for non-optional {target}"))
    } else {
        MapperError::Conversion(format!("cannot convert {value:?} into {target}"))
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, MapperError> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(i) => Ok(i != 0),
            other => Err(unexpected("bool", &other)),
        }
    }
}

impl ColumnType for bool {
    const KIND: ValueKind = ValueKind::Bool;
}

impl IntoValue for i64 {
    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, MapperError> {
        value.as_int().ok_or_else(|| unexpected("i64", &value))
    }
}

impl ColumnType for i64 {
    const KIND: ValueKind = ValueKind::Integer;
}

macro_rules! narrow_integer {
    ($($ty:ty),+) => {
        $(
            impl IntoValue for $ty {
                fn into_value(self) -> Value {
                    Value::Int(i64::from(self))
                }
            }

            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self, MapperError> {
                    let wide = value.as_int().ok_or_else(|| unexpected(stringify!($ty), &value))?;
                    <$ty>::try_from(wide).map_err(|_| {
                        MapperError::Conversion(format!(
                            "{wide} is out of range for {}",
                            stringify!($ty)
                        ))
                    })
                }
            }

            impl ColumnType for $ty {
                const KIND: ValueKind = ValueKind::Integer;
            }
        )+
    };
}

narrow_integer!(i8, i16, i32, u8, u16, u32);

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Real(self)
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, MapperError> {
        value.as_real().ok_or_else(|| unexpected("f64", &value))
    }
}

impl ColumnType for f64 {
    const KIND: ValueKind = ValueKind::Real;
}

impl IntoValue for f32 {
    fn into_value(self) -> Value {
        Value::Real(f64::from(self))
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self, MapperError> {
        let wide = value.as_real().ok_or_else(|| unexpected("f32", &value))?;
        #[allow(clippy::cast_possible_truncation)]
        let narrow = wide as f32;
        Ok(narrow)
    }
}

impl ColumnType for f32 {
    const KIND: ValueKind = ValueKind::Real;
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::Text(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::Text(self.to_owned())
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, MapperError> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Enum(EnumValue { name: Some(name), .. }) => Ok(name.to_owned()),
            other => Err(unexpected("String", &other)),
        }
    }
}

impl ColumnType for String {
    const KIND: ValueKind = ValueKind::Text;
}

impl IntoValue for Vec<u8> {
    fn into_value(self) -> Value {
        Value::Blob(self)
    }
}

impl IntoValue for &[u8] {
    fn into_value(self) -> Value {
        Value::Blob(self.to_vec())
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, MapperError> {
        match value {
            Value::Blob(b) => Ok(b),
            other => Err(unexpected("Vec<u8>", &other)),
        }
    }
}

impl ColumnType for Vec<u8> {
    const KIND: ValueKind = ValueKind::Blob;
}

impl IntoValue for Uuid {
    fn into_value(self) -> Value {
        Value::Guid(self)
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> Result<Self, MapperError> {
        match value {
            Value::Guid(g) => Ok(g),
            Value::Text(ref s) => Uuid::parse_str(s).map_err(|_| unexpected("Uuid", &value)),
            other => Err(unexpected("Uuid", &other)),
        }
    }
}

impl ColumnType for Uuid {
    const KIND: ValueKind = ValueKind::Guid;
}

impl IntoValue for NaiveDateTime {
    fn into_value(self) -> Value {
        Value::DateTime(self)
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self, MapperError> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            Value::DateTimeUtc(dt) => Ok(dt.naive_utc()),
            other => Err(unexpected("NaiveDateTime", &other)),
        }
    }
}

impl ColumnType for NaiveDateTime {
    const KIND: ValueKind = ValueKind::DateTime;
}

impl IntoValue for DateTime<Utc> {
    fn into_value(self) -> Value {
        Value::DateTimeUtc(self)
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self, MapperError> {
        match value {
            Value::DateTimeUtc(dt) => Ok(dt),
            Value::DateTime(dt) => Ok(DateTime::from_naive_utc_and_offset(dt, Utc)),
            other => Err(unexpected("DateTime<Utc>", &other)),
        }
    }
}

impl ColumnType for DateTime<Utc> {
    const KIND: ValueKind = ValueKind::DateTimeUtc;
}

impl IntoValue for NaiveDate {
    fn into_value(self) -> Value {
        Value::Date(self)
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> Result<Self, MapperError> {
        match value {
            Value::Date(d) => Ok(d),
            Value::DateTime(dt) => Ok(dt.date()),
            other => Err(unexpected("NaiveDate", &other)),
        }
    }
}

impl ColumnType for NaiveDate {
    const KIND: ValueKind = ValueKind::Date;
}

impl IntoValue for TimeDelta {
    fn into_value(self) -> Value {
        Value::TimeSpan(self)
    }
}

impl FromValue for TimeDelta {
    fn from_value(value: Value) -> Result<Self, MapperError> {
        match value {
            Value::TimeSpan(span) => Ok(span),
            other => Err(unexpected("TimeDelta", &other)),
        }
    }
}

impl ColumnType for TimeDelta {
    const KIND: ValueKind = ValueKind::TimeSpan;
}

impl IntoValue for JsonValue {
    fn into_value(self) -> Value {
        Value::Json(self)
    }
}

impl FromValue for JsonValue {
    fn from_value(value: Value) -> Result<Self, MapperError> {
        match value {
            Value::Json(json) => Ok(json),
            Value::Text(ref s) => serde_json::from_str(s).map_err(|_| unexpected("JSON", &value)),
            other => Err(unexpected("JSON", &other)),
        }
    }
}

impl ColumnType for JsonValue {
    const KIND: ValueKind = ValueKind::Json;
}

/// Typed value for an enumeration member.
pub fn enum_to_value<E: StoredEnum>(member: E) -> Value {
    Value::Enum(EnumValue {
        ordinal: member.ordinal(),
        name: Some(member.name()),
    })
}

/// Resolve an enumeration member, preferring the name when one was decoded.
///
/// # Errors
/// Returns [`MapperError::Conversion`] when neither the name nor the ordinal matches a member.
pub fn enum_from_value<E: StoredEnum>(value: Value) -> Result<E, MapperError> {
    let resolved = match &value {
        Value::Enum(EnumValue {
            name: Some(name), ..
        }) => E::from_name(name),
        Value::Enum(EnumValue {
            ordinal,
            name: None,
        })
        | Value::Int(ordinal) => E::from_ordinal(*ordinal),
        Value::Text(name) => E::from_name(name),
        _ => None,
    };
    resolved.ok_or_else(|| unexpected(std::any::type_name::<E>(), &value))
}

/// Column kind for an enumeration, honouring its storage mode.
#[must_use]
pub fn enum_kind<E: StoredEnum>() -> ValueKind {
    ValueKind::Enum {
        members: E::MEMBERS,
        as_text: E::STORE_AS_TEXT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_maps_none_to_null() {
        assert_eq!(None::<String>.into_value(), Value::Null);
        let back: Option<Vec<u8>> = FromValue::from_value(Value::Null).expect("null");
        assert_eq!(back, None);
        let back: Option<Vec<u8>> = FromValue::from_value(Value::Blob(Vec::new())).expect("blob");
        assert_eq!(back, Some(Vec::new()));
    }

    #[test]
    fn null_into_required_type_fails() {
        let err = String::from_value(Value::Null).unwrap_err();
        assert!(err.to_string().contains("unexpected NULL"));
    }

    #[test]
    fn narrow_integers_check_range() {
        assert_eq!(u8::from_value(Value::Int(255)).expect("fits"), 255);
        assert!(u8::from_value(Value::Int(256)).is_err());
        assert_eq!(i32::from_value(Value::Bool(true)).expect("bool"), 1);
    }
}
