use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::conversion::FromValue;
use crate::error::{MapperError, translate, translate_sqlite};
use crate::marshal::{MarshalOptions, from_storage_cell, natural_kind, natural_value, to_storage_cell};
use crate::query::translate::Statement;
use crate::results::{ResultSet, RowLayout};
use crate::schema::{CreateFlags, Entity, TableMapping, mapping_for};
use crate::types::{Cell, Value};

use super::config::{ConnectionOptions, KeyMaterial};
use super::events::Listeners;
use super::tx::TransactionState;

/// A synchronous connection owning one native handle.
///
/// All typed operations, transactions and schema maintenance go through this type. It is
/// `Send`, so it can be moved to a worker thread, but it is used by one caller at a time;
/// [`AsyncConnection`](crate::AsyncConnection) provides shared access.
pub struct Connection {
    conn: Option<rusqlite::Connection>,
    path: String,
    marshal: MarshalOptions,
    busy_timeout: Duration,
    pub(super) tx: TransactionState,
    pub(super) listeners: Listeners,
    mapping_flags: HashMap<TypeId, CreateFlags>,
}

impl Connection {
    /// Open a connection.
    ///
    /// Pragma hooks and key material are applied in this order: pre-key hook, key, post-key
    /// hook. The busy timeout and journal mode follow, before any schema access.
    ///
    /// # Errors
    /// Returns [`MapperError`] if the native open or any configuration step fails.
    pub fn open(options: ConnectionOptions) -> Result<Self, MapperError> {
        let flags = options.open_flags();
        debug!(path = %options.path, ?flags, "opening connection");
        let conn = rusqlite::Connection::open_with_flags(&options.path, flags).map_err(translate_sqlite)?;

        if let Some(hook) = &options.pre_key_hook {
            hook(&conn).map_err(translate_sqlite)?;
        }
        if let Some(key) = &options.key {
            apply_key(&conn, "key", key)?;
        }
        if let Some(hook) = &options.post_key_hook {
            hook(&conn).map_err(translate_sqlite)?;
        }
        conn.busy_timeout(options.busy_timeout)
            .map_err(translate_sqlite)?;
        if let Some(mode) = options.journal_mode {
            let applied: String = conn
                .pragma_update_and_check(None, "journal_mode", mode.as_pragma(), |row| row.get(0))
                .map_err(translate_sqlite)?;
            if !applied.eq_ignore_ascii_case(mode.as_pragma()) {
                warn!(requested = mode.as_pragma(), %applied, "journal mode not applied");
            }
        }

        info!(path = %options.path, "connection opened");
        Ok(Self {
            conn: Some(conn),
            path: options.path,
            marshal: options.marshal,
            busy_timeout: options.busy_timeout,
            tx: TransactionState::default(),
            listeners: Listeners::default(),
            mapping_flags: HashMap::new(),
        })
    }

    /// Open a private in-memory database with default options.
    ///
    /// # Errors
    /// Returns [`MapperError`] if the native open fails.
    pub fn open_in_memory() -> Result<Self, MapperError> {
        Self::open(ConnectionOptions::in_memory())
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn marshal_options(&self) -> &MarshalOptions {
        &self.marshal
    }

    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout
    }

    /// # Errors
    /// Returns [`MapperError::Connection`] if the connection is closed.
    pub fn set_busy_timeout(&mut self, timeout: Duration) -> Result<(), MapperError> {
        self.handle()?.busy_timeout(timeout).map_err(translate_sqlite)?;
        self.busy_timeout = timeout;
        Ok(())
    }

    /// Change the key of an encrypted database.
    ///
    /// # Errors
    /// Returns [`MapperError`] if the native rekey fails.
    pub fn rekey(&self, key: &KeyMaterial) -> Result<(), MapperError> {
        apply_key(self.handle()?, "rekey", key)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Close the native handle. Closing an already closed connection is a no-op.
    ///
    /// # Errors
    /// Returns [`MapperError`] if the native close reports a failure; the handle is released
    /// regardless.
    pub fn close(&mut self) -> Result<(), MapperError> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        self.tx.clear();
        debug!(path = %self.path, "closing connection");
        conn.close().map_err(|(_, err)| translate_sqlite(err))
    }

    /// Rowid of the most recent successful insert on this handle.
    ///
    /// # Errors
    /// Returns [`MapperError::Connection`] if the connection is closed.
    pub fn last_insert_rowid(&self) -> Result<i64, MapperError> {
        Ok(self.handle()?.last_insert_rowid())
    }

    /// Borrow the native handle for operations the mapper does not cover.
    ///
    /// # Errors
    /// Returns [`MapperError::Connection`] if the connection is closed.
    pub fn handle(&self) -> Result<&rusqlite::Connection, MapperError> {
        self.conn
            .as_ref()
            .ok_or_else(|| MapperError::Connection("connection is closed".into()))
    }

    pub(super) fn handle_and_tx(
        &mut self,
    ) -> Result<(&rusqlite::Connection, &mut TransactionState), MapperError> {
        match self.conn.as_ref() {
            Some(conn) => Ok((conn, &mut self.tx)),
            None => Err(MapperError::Connection("connection is closed".into())),
        }
    }

    /// Mapping for `T`, honouring the flags it was created with on this connection.
    ///
    /// # Errors
    /// Returns [`MapperError::Schema`] if `T`'s declared shape is invalid.
    pub fn mapping<T: Entity>(&self) -> Result<Arc<TableMapping>, MapperError> {
        let flags = self
            .mapping_flags
            .get(&TypeId::of::<T>())
            .copied()
            .unwrap_or_default();
        mapping_for::<T>(flags)
    }

    pub(super) fn remember_flags<T: Entity>(&mut self, flags: CreateFlags) {
        self.mapping_flags.insert(TypeId::of::<T>(), flags);
    }

    /// Execute one statement, returning the number of changed rows.
    pub(crate) fn run(&self, stmt: &Statement, mapping: Option<&TableMapping>) -> Result<usize, MapperError> {
        let conn = self.handle()?;
        debug!(sql = %stmt.sql, params = stmt.params.len(), "execute");
        let mut prepared = conn.prepare_cached(&stmt.sql).map_err(|e| translate(e, mapping))?;
        prepared
            .execute(rusqlite::params_from_iter(stmt.params.iter()))
            .map_err(|e| translate(e, mapping))
    }

    /// Run a query, handing each row's cells to `on_row` as it is read.
    pub(crate) fn for_each_row(
        &self,
        stmt: &Statement,
        mut on_row: impl FnMut(&[String], Vec<Cell>) -> Result<(), MapperError>,
    ) -> Result<(), MapperError> {
        let conn = self.handle()?;
        debug!(sql = %stmt.sql, params = stmt.params.len(), "query");
        let mut prepared = conn.prepare_cached(&stmt.sql).map_err(translate_sqlite)?;
        let names: Vec<String> = prepared.column_names().iter().map(|n| (*n).to_owned()).collect();
        let mut rows = prepared
            .query(rusqlite::params_from_iter(stmt.params.iter()))
            .map_err(translate_sqlite)?;
        while let Some(row) = rows.next().map_err(translate_sqlite)? {
            let mut cells = Vec::with_capacity(names.len());
            for index in 0..names.len() {
                let cell = Cell::from_value_ref(row.get_ref(index).map_err(translate_sqlite)?)
                    .map_err(|e| MapperError::Conversion(format!("invalid UTF-8 in column {index}: {e}")))?;
                cells.push(cell);
            }
            on_row(&names, cells)?;
        }
        Ok(())
    }

    /// Decode rows whose cells follow `mapping`'s column order into entities.
    pub(crate) fn for_each_entity<T: Entity>(
        &self,
        stmt: &Statement,
        mapping: &TableMapping,
        mut on_entity: impl FnMut(T) -> Result<(), MapperError>,
    ) -> Result<(), MapperError> {
        let layout = RowLayout::new(
            mapping
                .columns()
                .iter()
                .map(|c| c.property_name().to_owned())
                .collect(),
        );
        self.for_each_row(stmt, |_, cells| {
            let values = cells
                .iter()
                .zip(mapping.columns())
                .map(|(cell, column)| from_storage_cell(cell, column.kind(), &self.marshal))
                .collect::<Result<Vec<_>, _>>()?;
            on_entity(T::from_row(&layout.row(values))?)
        })
    }

    /// Bind raw parameters by their own kind.
    pub(crate) fn raw_statement(&self, sql: &str, params: &[Value]) -> Result<Statement, MapperError> {
        Ok(Statement {
            sql: sql.to_owned(),
            params: params
                .iter()
                .map(|v| to_storage_cell(v, &natural_kind(v), &self.marshal))
                .collect::<Result<_, _>>()?,
        })
    }

    /// Execute raw SQL with positional parameters.
    ///
    /// # Errors
    /// Returns the translated native error.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize, MapperError> {
        self.run(&self.raw_statement(sql, params)?, None)
    }

    /// First column of the first row, converted into `T`. No row reads as NULL.
    ///
    /// # Errors
    /// Returns the translated native error, or [`MapperError::Conversion`] when the value does
    /// not fit `T`.
    pub fn execute_scalar<T: FromValue>(&self, sql: &str, params: &[Value]) -> Result<T, MapperError> {
        let mut first = None;
        self.for_each_row(&self.raw_statement(sql, params)?, |_, cells| {
            if first.is_none() {
                first = Some(cells.into_iter().next().unwrap_or(Cell::Null));
            }
            Ok(())
        })?;
        T::from_value(natural_value(first.unwrap_or(Cell::Null)))
    }

    /// Run raw SQL and collect untyped rows.
    ///
    /// # Errors
    /// Returns the translated native error.
    pub fn query_raw(&self, sql: &str, params: &[Value]) -> Result<ResultSet, MapperError> {
        let mut result = ResultSet::default();
        self.for_each_row(&self.raw_statement(sql, params)?, |names, cells| {
            if result.column_names().is_none() {
                result.set_column_names(Arc::new(names.to_vec()));
            }
            result.add_row_values(cells.into_iter().map(natural_value).collect());
            Ok(())
        })?;
        Ok(result)
    }

    /// Run raw SQL and map each row onto `T` by column name.
    ///
    /// Result columns that match a mapped column are decoded with its declared kind and renamed
    /// to the property; other columns are passed through untyped.
    ///
    /// # Errors
    /// Returns the translated native error or a conversion failure from `T::from_row`.
    pub fn query_as<T: Entity>(&self, sql: &str, params: &[Value]) -> Result<Vec<T>, MapperError> {
        let mapping = self.mapping::<T>()?;
        let mut layout: Option<(RowLayout, Vec<Option<usize>>)> = None;
        let mut out = Vec::new();
        self.for_each_row(&self.raw_statement(sql, params)?, |names, cells| {
            let (layout, resolved) = layout.get_or_insert_with(|| {
                let resolved: Vec<Option<usize>> = names
                    .iter()
                    .map(|n| mapping.columns().iter().position(|c| c.name().eq_ignore_ascii_case(n)))
                    .collect();
                let renamed = names
                    .iter()
                    .zip(&resolved)
                    .map(|(name, idx)| match idx {
                        Some(i) => mapping.columns()[*i].property_name().to_owned(),
                        None => name.clone(),
                    })
                    .collect();
                (RowLayout::new(renamed), resolved)
            });
            let values = cells
                .into_iter()
                .zip(resolved.iter())
                .map(|(cell, idx)| match idx {
                    Some(i) => from_storage_cell(&cell, mapping.columns()[*i].kind(), &self.marshal),
                    None => Ok(natural_value(cell)),
                })
                .collect::<Result<Vec<_>, _>>()?;
            out.push(T::from_row(&layout.row(values))?);
            Ok(())
        })?;
        Ok(out)
    }
}

fn apply_key(conn: &rusqlite::Connection, pragma: &str, key: &KeyMaterial) -> Result<(), MapperError> {
    conn.pragma_update(None, pragma, key.pragma_value())
        .map_err(translate_sqlite)
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "error closing connection on drop");
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .field("transaction_depth", &self.tx.depth())
            .finish_non_exhaustive()
    }
}
