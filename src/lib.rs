//! Object-relational mapping over embedded SQLite.
//!
//! Types implement [`Entity`] to describe their table. A [`Connection`] creates and migrates
//! tables, runs typed CRUD and composable queries, and manages nested transactions;
//! [`AsyncConnection`] serializes the same operations from any number of tasks onto a worker
//! thread.
//!
//! ```rust
//! use sqlite_mapper::prelude::*;
//!
//! # fn main() -> Result<(), MapperError> {
//! struct Person {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Entity for Person {
//!     fn describe() -> TableSpec {
//!         TableSpec::for_type::<Self>()
//!             .column(ColumnSpec::of::<i64>("Id").primary_key().auto_increment())
//!             .column(ColumnSpec::of::<String>("Name").not_null())
//!     }
//!
//!     fn to_values(&self) -> Vec<(&'static str, Value)> {
//!         vec![("Id", self.id.into_value()), ("Name", self.name.clone().into_value())]
//!     }
//!
//!     fn from_row(row: &Row) -> Result<Self, MapperError> {
//!         Ok(Self { id: row.get("Id")?, name: row.get("Name")? })
//!     }
//!
//!     fn set_auto_id(&mut self, id: i64) {
//!         self.id = id;
//!     }
//! }
//!
//! let mut conn = Connection::open_in_memory()?;
//! conn.create_table::<Person>(CreateFlags::NONE)?;
//! let mut ann = Person { id: 0, name: "Ann".into() };
//! conn.insert(&mut ann)?;
//! assert_eq!(ann.id, 1);
//!
//! let found = conn.table::<Person>().filter(col("Name").starts_with("A")).to_vec()?;
//! assert_eq!(found.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod conversion;
pub mod error;
pub mod fs;
mod macros;
pub mod marshal;
pub mod prelude;
pub mod query;
pub mod results;
pub mod schema;
pub mod types;
pub mod worker;

pub use connection::{
    ChangeAction, Connection, ConnectionHook, ConnectionOptions, ConnectionOptionsBuilder, JournalMode, KeyMaterial, OpenMode, Table,
    TableChanged, ThreadingMode,
};
pub use conversion::{ColumnType, FromValue, IntoValue, StoredEnum};
pub use error::{ConstraintKind, MapperError, TransactionOp};
pub use marshal::{DateTimeStorage, GuidStorage, MarshalOptions, TimeSpanStorage};
pub use query::{Composable, Predicate, Query, col};
pub use results::{ResultSet, Row};
pub use schema::{ColumnSpec, CreateFlags, CreateTableResult, Entity, TableMapping, TableSpec};
pub use types::{Cell, Value, ValueKind};
pub use worker::{AsyncConnection, AsyncTable};
