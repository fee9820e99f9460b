//! Convenient imports for common functionality.
//!
//! This module re-exports the types needed to declare entities, open connections and build
//! queries.

pub use crate::connection::{
    ChangeAction, Connection, ConnectionOptions, JournalMode, KeyMaterial, OpenMode, TableChanged, ThreadingMode,
};
pub use crate::conversion::{ColumnType, FromValue, IntoValue, StoredEnum};
pub use crate::error::MapperError;
pub use crate::marshal::MarshalOptions;
pub use crate::query::{Composable, Predicate, Query, col};
pub use crate::results::{ResultSet, Row};
pub use crate::schema::{
    Collation, ColumnSpec, ComputedKind, CreateFlags, CreateTableResult, Entity, TableSpec,
};
pub use crate::stored_enum;
pub use crate::types::Value;
pub use crate::worker::AsyncConnection;
