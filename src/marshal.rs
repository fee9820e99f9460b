//! Conversion between typed [`Value`]s and native storage [`Cell`]s.
//!
//! Both directions are pure: no native calls, no connection state. The declared
//! [`ValueKind`] of the column plus the connection's [`MarshalOptions`] decide the encoding.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MapperError;
use crate::types::{Affinity, Cell, EnumValue, Value, ValueKind};

/// 100-nanosecond intervals per second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

const DEFAULT_DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateTimeStorage {
    /// Ticks since 0001-01-01T00:00:00 in an integer column.
    Ticks,
    /// Text formatted with the given `chrono` format string.
    Text(String),
}

impl DateTimeStorage {
    #[must_use]
    pub fn default_text() -> Self {
        DateTimeStorage::Text(DEFAULT_DATE_TIME_FORMAT.to_owned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuidStorage {
    /// Canonical 36-character hyphenated text.
    Text,
    /// Raw 16 bytes.
    Blob,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeSpanStorage {
    Ticks,
    /// `[-][d.]hh:mm:ss[.fffffff]`
    Text,
}

/// Per-connection encoding choices for the value kinds with more than one representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarshalOptions {
    pub date_time: DateTimeStorage,
    pub guid: GuidStorage,
    pub time_span: TimeSpanStorage,
}

impl Default for MarshalOptions {
    fn default() -> Self {
        Self {
            date_time: DateTimeStorage::Ticks,
            guid: GuidStorage::Text,
            time_span: TimeSpanStorage::Ticks,
        }
    }
}

impl MarshalOptions {
    /// Declared column type emitted in DDL for `kind`.
    #[must_use]
    pub fn declared_type(&self, kind: &ValueKind, max_length: Option<u32>) -> String {
        let text = || match max_length {
            Some(n) => format!("varchar({n})"),
            None => "varchar".to_owned(),
        };
        match kind {
            ValueKind::Bool | ValueKind::Integer => "integer".to_owned(),
            ValueKind::Real => "float".to_owned(),
            ValueKind::Text | ValueKind::Json => text(),
            ValueKind::Blob => "blob".to_owned(),
            ValueKind::Guid => match self.guid {
                GuidStorage::Text => "varchar(36)".to_owned(),
                GuidStorage::Blob => "blob".to_owned(),
            },
            ValueKind::DateTime | ValueKind::DateTimeUtc => match self.date_time {
                DateTimeStorage::Ticks => "bigint".to_owned(),
                DateTimeStorage::Text(_) => "datetime".to_owned(),
            },
            ValueKind::Date => "date".to_owned(),
            ValueKind::TimeSpan => match self.time_span {
                TimeSpanStorage::Ticks => "bigint".to_owned(),
                TimeSpanStorage::Text => "time".to_owned(),
            },
            ValueKind::Enum { as_text: true, .. } => text(),
            ValueKind::Enum { as_text: false, .. } => "integer".to_owned(),
        }
    }

    /// Storage affinity for `kind` under these options.
    #[must_use]
    pub fn affinity(&self, kind: &ValueKind) -> Affinity {
        match kind {
            ValueKind::Bool | ValueKind::Integer => Affinity::Integer,
            ValueKind::Real => Affinity::Real,
            ValueKind::Text | ValueKind::Json | ValueKind::Date => Affinity::Text,
            ValueKind::Blob => Affinity::Blob,
            ValueKind::Guid => match self.guid {
                GuidStorage::Text => Affinity::Text,
                GuidStorage::Blob => Affinity::Blob,
            },
            ValueKind::DateTime | ValueKind::DateTimeUtc => match self.date_time {
                DateTimeStorage::Ticks => Affinity::Integer,
                DateTimeStorage::Text(_) => Affinity::Text,
            },
            ValueKind::TimeSpan => match self.time_span {
                TimeSpanStorage::Ticks => Affinity::Integer,
                TimeSpanStorage::Text => Affinity::Text,
            },
            ValueKind::Enum { as_text, .. } => {
                if *as_text {
                    Affinity::Text
                } else {
                    Affinity::Integer
                }
            }
        }
    }

    fn date_time_format(&self) -> &str {
        match &self.date_time {
            DateTimeStorage::Text(format) => format,
            DateTimeStorage::Ticks => DEFAULT_DATE_TIME_FORMAT,
        }
    }
}

fn tick_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Ticks since 0001-01-01 for a naive timestamp. Sub-tick precision is truncated.
///
/// `None` when the instant lies outside the range an `i64` tick count can hold.
#[must_use]
pub fn date_time_to_ticks(value: NaiveDateTime) -> Option<i64> {
    time_span_to_ticks(value.signed_duration_since(tick_epoch()))
}

#[must_use]
pub fn ticks_to_date_time(ticks: i64) -> NaiveDateTime {
    tick_epoch() + ticks_to_time_span(ticks)
}

#[must_use]
pub fn time_span_to_ticks(value: TimeDelta) -> Option<i64> {
    value
        .num_seconds()
        .checked_mul(TICKS_PER_SECOND)?
        .checked_add(i64::from(value.subsec_nanos()) / 100)
}

#[must_use]
pub fn ticks_to_time_span(ticks: i64) -> TimeDelta {
    TimeDelta::seconds(ticks.div_euclid(TICKS_PER_SECOND))
        + TimeDelta::nanoseconds(ticks.rem_euclid(TICKS_PER_SECOND) * 100)
}

fn format_time_span(value: TimeDelta) -> String {
    let negative = value < TimeDelta::zero();
    let sign = if negative { "-" } else { "" };
    let magnitude = if negative { -value } else { value };
    let fraction = magnitude.subsec_nanos().unsigned_abs() / 100;
    let total_seconds = magnitude.num_seconds().unsigned_abs();
    let (days, rem) = (total_seconds / 86_400, total_seconds % 86_400);
    let (hours, minutes, seconds) = (rem / 3600, (rem % 3600) / 60, rem % 60);
    let mut out = String::with_capacity(24);
    out.push_str(sign);
    if days > 0 {
        out.push_str(&format!("{days}."));
    }
    out.push_str(&format!("{hours:02}:{minutes:02}:{seconds:02}"));
    if fraction > 0 {
        out.push_str(&format!(".{fraction:07}"));
    }
    out
}

fn parse_time_span(text: &str) -> Option<TimeDelta> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (clock, fraction) = match body.split_once(':') {
        Some(_) => match body.rsplit_once('.') {
            // a '.' after the last ':' is the fraction, before it the day separator
            Some((head, tail)) if !tail.contains(':') => (head, Some(tail)),
            _ => (body, None),
        },
        None => return None,
    };
    let (days, clock) = match clock.split_once('.') {
        Some((d, rest)) => (d.parse::<i64>().ok()?, rest),
        None => (0, clock),
    };
    let mut parts = clock.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: i64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let fraction_ticks = match fraction {
        Some(f) if !f.is_empty() && f.len() <= 7 => {
            let padded = format!("{f:0<7}");
            padded.parse::<i64>().ok()?
        }
        Some(_) => return None,
        None => 0,
    };
    let total = days
        .checked_mul(86_400)?
        .checked_add(hours.checked_mul(3600)?)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)?
        .checked_mul(TICKS_PER_SECOND)?
        .checked_add(fraction_ticks)?;
    Some(ticks_to_time_span(if negative { total.checked_neg()? } else { total }))
}

/// Encode a typed value into the storage cell for a column of `kind`.
///
/// `Null` always encodes to a native NULL; an empty blob stays an empty blob.
///
/// # Errors
///
/// [`MapperError::Conversion`] when a date-time or time span stored as ticks does not fit in an `i64`.
pub fn to_storage_cell(value: &Value, kind: &ValueKind, options: &MarshalOptions) -> Result<Cell, MapperError> {
    let cell = match value {
        Value::Null => Cell::Null,
        Value::Bool(b) => Cell::Integer(i64::from(*b)),
        Value::Int(i) => match kind {
            ValueKind::Real => {
                #[allow(clippy::cast_precision_loss)]
                let real = *i as f64;
                Cell::Real(real)
            }
            _ => Cell::Integer(*i),
        },
        Value::Real(f) => Cell::Real(*f),
        Value::Text(s) => Cell::Text(s.clone()),
        Value::Blob(b) => Cell::Blob(b.clone()),
        Value::Guid(g) => match options.guid {
            GuidStorage::Text => Cell::Text(g.hyphenated().to_string()),
            GuidStorage::Blob => Cell::Blob(g.as_bytes().to_vec()),
        },
        Value::DateTime(dt) => match &options.date_time {
            DateTimeStorage::Ticks => tick_cell(date_time_to_ticks(*dt), value)?,
            DateTimeStorage::Text(format) => Cell::Text(dt.format(format).to_string()),
        },
        Value::DateTimeUtc(dt) => match &options.date_time {
            DateTimeStorage::Ticks => tick_cell(date_time_to_ticks(dt.naive_utc()), value)?,
            DateTimeStorage::Text(format) => Cell::Text(dt.naive_utc().format(format).to_string()),
        },
        Value::Date(d) => Cell::Text(d.format(DATE_FORMAT).to_string()),
        Value::TimeSpan(span) => match options.time_span {
            TimeSpanStorage::Ticks => tick_cell(time_span_to_ticks(*span), value)?,
            TimeSpanStorage::Text => Cell::Text(format_time_span(*span)),
        },
        Value::Enum(e) => match kind {
            ValueKind::Enum {
                as_text: true,
                members,
            } => {
                let name = e.name.or_else(|| {
                    members
                        .iter()
                        .find(|(_, ordinal)| *ordinal == e.ordinal)
                        .map(|(name, _)| *name)
                });
                match name {
                    Some(name) => Cell::Text(name.to_owned()),
                    None => Cell::Text(e.ordinal.to_string()),
                }
            }
            _ => Cell::Integer(e.ordinal),
        },
        Value::Json(json) => Cell::Text(json.to_string()),
    };
    Ok(cell)
}

fn tick_cell(ticks: Option<i64>, value: &Value) -> Result<Cell, MapperError> {
    ticks
        .map(Cell::Integer)
        .ok_or_else(|| MapperError::Conversion(format!("{value:?} is outside the range of 100ns ticks")))
}

/// Kind used to bind a value that is not compared against a mapped column.
pub(crate) fn natural_kind(value: &Value) -> ValueKind {
    match value {
        Value::Null | Value::Text(_) => ValueKind::Text,
        Value::Bool(_) => ValueKind::Bool,
        Value::Int(_) => ValueKind::Integer,
        Value::Real(_) => ValueKind::Real,
        Value::Blob(_) => ValueKind::Blob,
        Value::Guid(_) => ValueKind::Guid,
        Value::DateTime(_) => ValueKind::DateTime,
        Value::DateTimeUtc(_) => ValueKind::DateTimeUtc,
        Value::Date(_) => ValueKind::Date,
        Value::TimeSpan(_) => ValueKind::TimeSpan,
        Value::Enum(_) => ValueKind::Enum {
            members: &[],
            as_text: false,
        },
        Value::Json(_) => ValueKind::Json,
    }
}

/// Untyped decode of a cell, for raw queries with no mapped column.
pub(crate) fn natural_value(cell: Cell) -> Value {
    match cell {
        Cell::Null => Value::Null,
        Cell::Integer(i) => Value::Int(i),
        Cell::Real(f) => Value::Real(f),
        Cell::Text(s) => Value::Text(s),
        Cell::Blob(b) => Value::Blob(b),
    }
}

fn mismatch(kind: &ValueKind, cell: &Cell) -> MapperError {
    MapperError::Conversion(format!("cannot read {kind:?} from storage cell {cell:?}"))
}

/// Decode a storage cell for a column of `kind` into a typed value.
///
/// # Errors
/// Returns [`MapperError::Conversion`] when the cell cannot represent `kind`.
pub fn from_storage_cell(
    cell: &Cell,
    kind: &ValueKind,
    options: &MarshalOptions,
) -> Result<Value, MapperError> {
    if cell.is_null() {
        return Ok(Value::Null);
    }
    match kind {
        ValueKind::Bool => match cell {
            Cell::Integer(i) => Ok(Value::Bool(*i != 0)),
            Cell::Real(f) => Ok(Value::Bool(*f != 0.0)),
            Cell::Text(s) => match s.as_str() {
                "1" | "true" | "TRUE" | "True" => Ok(Value::Bool(true)),
                "0" | "false" | "FALSE" | "False" => Ok(Value::Bool(false)),
                _ => Err(mismatch(kind, cell)),
            },
            _ => Err(mismatch(kind, cell)),
        },
        ValueKind::Integer => match cell {
            Cell::Integer(i) => Ok(Value::Int(*i)),
            #[allow(clippy::cast_possible_truncation)]
            Cell::Real(f) => Ok(Value::Int(*f as i64)),
            Cell::Text(s) => s.trim().parse().map(Value::Int).map_err(|_| mismatch(kind, cell)),
            _ => Err(mismatch(kind, cell)),
        },
        ValueKind::Real => match cell {
            Cell::Real(f) => Ok(Value::Real(*f)),
            #[allow(clippy::cast_precision_loss)]
            Cell::Integer(i) => Ok(Value::Real(*i as f64)),
            Cell::Text(s) => s.trim().parse().map(Value::Real).map_err(|_| mismatch(kind, cell)),
            _ => Err(mismatch(kind, cell)),
        },
        ValueKind::Text => match cell {
            Cell::Text(s) => Ok(Value::Text(s.clone())),
            Cell::Integer(i) => Ok(Value::Text(i.to_string())),
            Cell::Real(f) => Ok(Value::Text(f.to_string())),
            Cell::Blob(b) => String::from_utf8(b.clone())
                .map(Value::Text)
                .map_err(|_| mismatch(kind, cell)),
            Cell::Null => Ok(Value::Null),
        },
        ValueKind::Blob => match cell {
            Cell::Blob(b) => Ok(Value::Blob(b.clone())),
            Cell::Text(s) => Ok(Value::Blob(s.as_bytes().to_vec())),
            _ => Err(mismatch(kind, cell)),
        },
        ValueKind::Guid => match cell {
            Cell::Text(s) => Uuid::parse_str(s).map(Value::Guid).map_err(|_| mismatch(kind, cell)),
            Cell::Blob(b) => Uuid::from_slice(b).map(Value::Guid).map_err(|_| mismatch(kind, cell)),
            _ => Err(mismatch(kind, cell)),
        },
        ValueKind::DateTime | ValueKind::DateTimeUtc => {
            let naive = match cell {
                Cell::Integer(ticks) => ticks_to_date_time(*ticks),
                Cell::Text(s) => NaiveDateTime::parse_from_str(s, options.date_time_format())
                    .map_err(|_| mismatch(kind, cell))?,
                _ => return Err(mismatch(kind, cell)),
            };
            if matches!(kind, ValueKind::DateTimeUtc) {
                Ok(Value::DateTimeUtc(DateTime::from_naive_utc_and_offset(naive, Utc)))
            } else {
                Ok(Value::DateTime(naive))
            }
        }
        ValueKind::Date => match cell {
            Cell::Text(s) => NaiveDate::parse_from_str(s, DATE_FORMAT)
                .map(Value::Date)
                .map_err(|_| mismatch(kind, cell)),
            Cell::Integer(ticks) => Ok(Value::Date(ticks_to_date_time(*ticks).date())),
            _ => Err(mismatch(kind, cell)),
        },
        ValueKind::TimeSpan => match cell {
            Cell::Integer(ticks) => Ok(Value::TimeSpan(ticks_to_time_span(*ticks))),
            Cell::Text(s) => parse_time_span(s)
                .map(Value::TimeSpan)
                .ok_or_else(|| mismatch(kind, cell)),
            _ => Err(mismatch(kind, cell)),
        },
        ValueKind::Enum { members, .. } => match cell {
            Cell::Integer(ordinal) => Ok(Value::Enum(EnumValue {
                ordinal: *ordinal,
                name: members
                    .iter()
                    .find(|(_, o)| o == ordinal)
                    .map(|(name, _)| *name),
            })),
            Cell::Text(s) => {
                if let Some((name, ordinal)) = members.iter().find(|(name, _)| *name == s.as_str()) {
                    return Ok(Value::Enum(EnumValue {
                        ordinal: *ordinal,
                        name: Some(*name),
                    }));
                }
                // an integer-mode column later switched to text still holds ordinals
                let ordinal: i64 = s.trim().parse().map_err(|_| mismatch(kind, cell))?;
                Ok(Value::Enum(EnumValue {
                    ordinal,
                    name: members
                        .iter()
                        .find(|(_, o)| *o == ordinal)
                        .map(|(name, _)| *name),
                }))
            }
            _ => Err(mismatch(kind, cell)),
        },
        ValueKind::Json => match cell {
            Cell::Text(s) => serde_json::from_str(s)
                .map(Value::Json)
                .map_err(|e| MapperError::Conversion(format!("invalid JSON in column: {e}"))),
            _ => Err(mismatch(kind, cell)),
        },
    }
}
