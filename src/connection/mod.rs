//! The synchronous connection: configuration, execution, transactions and typed CRUD.

mod config;
mod core;
mod dml;
mod events;
mod table;
mod tx;

pub use self::config::{
    ConnectionHook, ConnectionOptions, ConnectionOptionsBuilder, JournalMode, KeyMaterial, OpenMode, ThreadingMode,
};
pub use self::core::Connection;
pub use self::events::{ChangeAction, ChangeListener, TableChanged};
pub use self::table::Table;
