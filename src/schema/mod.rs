//! Declared table shapes, the process-wide mapping registry and additive migration.

pub(crate) mod ddl;
mod mapping;
mod migrate;
mod registry;
mod spec;

pub use mapping::{Column, ComputedColumn, IndexDescription, IndexMembership, TableMapping};
pub use migrate::{CreateTableResult, HiddenKind, LiveColumn, ensure_schema, live_columns};
pub use registry::mapping_for;
pub use spec::{Collation, ColumnSpec, ComputedKind, CreateFlags, TableSpec};

use crate::error::MapperError;
use crate::results::Row;
use crate::types::Value;

/// A type persisted as rows of one table.
///
/// ```rust
/// use sqlite_mapper::prelude::*;
///
/// struct Note {
///     id: i64,
///     body: String,
/// }
///
/// impl Entity for Note {
///     fn describe() -> TableSpec {
///         TableSpec::for_type::<Self>()
///             .column(ColumnSpec::of::<i64>("Id").primary_key().auto_increment())
///             .column(ColumnSpec::of::<String>("Body").not_null())
///     }
///
///     fn to_values(&self) -> Vec<(&'static str, Value)> {
///         vec![("Id", self.id.into_value()), ("Body", self.body.clone().into_value())]
///     }
///
///     fn from_row(row: &Row) -> Result<Self, MapperError> {
///         Ok(Self { id: row.get("Id")?, body: row.get("Body")? })
///     }
///
///     fn set_auto_id(&mut self, id: i64) {
///         self.id = id;
///     }
/// }
/// ```
pub trait Entity: Sized + 'static {
    fn describe() -> TableSpec;

    /// Current member values keyed by property name. Members not listed are written as NULL.
    fn to_values(&self) -> Vec<(&'static str, Value)>;

    /// Rebuild an instance from a row whose columns are named by property.
    ///
    /// # Errors
    /// Returns [`MapperError::Conversion`] when a value cannot be converted.
    fn from_row(row: &Row) -> Result<Self, MapperError>;

    /// Receives the rowid assigned to an autoincrement key after insert.
    fn set_auto_id(&mut self, _id: i64) {}
}
