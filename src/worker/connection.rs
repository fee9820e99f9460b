use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::connection::{Connection, ConnectionOptions, KeyMaterial, Table, TableChanged};
use crate::conversion::{FromValue, IntoValue};
use crate::error::MapperError;
use crate::query::{Composable, Query};
use crate::results::ResultSet;
use crate::schema::{CreateFlags, CreateTableResult, Entity};
use crate::types::Value;

use super::manager::Worker;

/// Shared asynchronous access to one connection.
///
/// Every operation is queued to a dedicated worker thread that owns the [`Connection`], so
/// calls from any number of tasks run one at a time in arrival order. Clones share the worker;
/// dropping the last clone shuts it down.
#[derive(Clone)]
pub struct AsyncConnection {
    worker: Arc<Worker>,
    cancel: CancellationToken,
}

impl AsyncConnection {
    /// Open a connection on a new worker thread.
    ///
    /// # Errors
    /// Returns [`MapperError`] if the thread cannot start or the connection cannot be opened.
    pub async fn open(options: ConnectionOptions) -> Result<Self, MapperError> {
        let cancel = CancellationToken::new();
        let (worker, ready) = Worker::spawn(move || Connection::open(options), cancel.clone())?;
        ready
            .await
            .map_err(|_| MapperError::Connection("connection worker exited during open".into()))??;
        Ok(Self {
            worker: Arc::new(worker),
            cancel,
        })
    }

    /// Hand an already open connection to a new worker thread.
    ///
    /// # Errors
    /// Returns [`MapperError::Connection`] if the thread cannot start.
    pub fn from_connection(conn: Connection) -> Result<Self, MapperError> {
        let cancel = CancellationToken::new();
        let (worker, _ready) = Worker::spawn(move || Ok(conn), cancel.clone())?;
        Ok(Self {
            worker: Arc::new(worker),
            cancel,
        })
    }

    /// Run synchronous logic against the worker-owned connection.
    ///
    /// # Errors
    /// Returns the callback's error, [`MapperError::Cancelled`] if the facade was cancelled
    /// before the call was dequeued, or [`MapperError::Connection`] once the worker is gone.
    pub async fn with_connection<F, R>(&self, func: F) -> Result<R, MapperError>
    where
        F: FnOnce(&mut Connection) -> Result<R, MapperError> + Send + 'static,
        R: Send + 'static,
    {
        self.worker.call(None, func).await
    }

    /// Like [`AsyncConnection::with_connection`], skipped if `token` is cancelled before the
    /// worker reaches it. A call already running is not interrupted.
    ///
    /// # Errors
    /// Same as [`AsyncConnection::with_connection`].
    pub async fn with_connection_cancellable<F, R>(&self, token: CancellationToken, func: F) -> Result<R, MapperError>
    where
        F: FnOnce(&mut Connection) -> Result<R, MapperError> + Send + 'static,
        R: Send + 'static,
    {
        self.worker.call(Some(token), func).await
    }

    /// Token shared by every clone; cancelling it rejects all queued and future calls.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel queued calls, close the connection and stop the worker. Repeated calls are no-ops.
    ///
    /// # Errors
    /// Returns the error reported by the native close.
    pub async fn close(&self) -> Result<(), MapperError> {
        self.cancel.cancel();
        self.worker.close().await
    }

    /// # Errors
    /// Same as [`Connection::insert`].
    pub async fn insert<T: Entity + Send>(&self, entity: T) -> Result<T, MapperError> {
        self.with_connection(move |conn| {
            let mut entity = entity;
            conn.insert(&mut entity)?;
            Ok(entity)
        })
        .await
    }

    /// # Errors
    /// Same as [`Connection::insert_or_replace`].
    pub async fn insert_or_replace<T: Entity + Send>(&self, entity: T) -> Result<T, MapperError> {
        self.with_connection(move |conn| {
            let mut entity = entity;
            conn.insert_or_replace(&mut entity)?;
            Ok(entity)
        })
        .await
    }

    /// # Errors
    /// Same as [`Connection::insert_all`].
    pub async fn insert_all<T: Entity + Send>(&self, entities: Vec<T>) -> Result<Vec<T>, MapperError> {
        self.with_connection(move |conn| {
            let mut entities = entities;
            conn.insert_all(&mut entities)?;
            Ok(entities)
        })
        .await
    }

    /// # Errors
    /// Same as [`Connection::update`].
    pub async fn update<T: Entity + Send>(&self, entity: T) -> Result<usize, MapperError> {
        self.with_connection(move |conn| conn.update(&entity)).await
    }

    /// # Errors
    /// Same as [`Connection::update_all`].
    pub async fn update_all<T: Entity + Send>(&self, entities: Vec<T>) -> Result<usize, MapperError> {
        self.with_connection(move |conn| conn.update_all(&entities)).await
    }

    /// # Errors
    /// Same as [`Connection::delete`].
    pub async fn delete<T: Entity + Send>(&self, entity: T) -> Result<usize, MapperError> {
        self.with_connection(move |conn| conn.delete(&entity)).await
    }

    /// # Errors
    /// Same as [`Connection::delete_by_key`].
    pub async fn delete_by_key<T: Entity, K: IntoValue + Send + 'static>(&self, key: K) -> Result<usize, MapperError> {
        self.with_connection(move |conn| conn.delete_by_key::<T>(key)).await
    }

    /// # Errors
    /// Same as [`Connection::delete_all`].
    pub async fn delete_all<T: Entity>(&self) -> Result<usize, MapperError> {
        self.with_connection(|conn| conn.delete_all::<T>()).await
    }

    /// # Errors
    /// Same as [`Connection::get`].
    pub async fn get<T: Entity + Send, K: IntoValue + Send + 'static>(&self, key: K) -> Result<T, MapperError> {
        self.with_connection(move |conn| conn.get::<T>(key)).await
    }

    /// # Errors
    /// Same as [`Connection::find`].
    pub async fn find<T: Entity + Send, K: IntoValue + Send + 'static>(&self, key: K) -> Result<Option<T>, MapperError> {
        self.with_connection(move |conn| conn.find::<T>(key)).await
    }

    /// # Errors
    /// Same as [`Connection::create_table`].
    pub async fn create_table<T: Entity>(&self, flags: CreateFlags) -> Result<CreateTableResult, MapperError> {
        self.with_connection(move |conn| conn.create_table::<T>(flags)).await
    }

    /// # Errors
    /// Same as [`Connection::create_index`].
    pub async fn create_index(
        &self,
        table: impl Into<String>,
        name: impl Into<String>,
        columns: Vec<String>,
        unique: bool,
    ) -> Result<(), MapperError> {
        let (table, name) = (table.into(), name.into());
        self.with_connection(move |conn| {
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            conn.create_index(&table, &name, &columns, unique)
        })
        .await
    }

    /// # Errors
    /// Same as [`Connection::drop_table`].
    pub async fn drop_table<T: Entity>(&self) -> Result<(), MapperError> {
        self.with_connection(|conn| conn.drop_table::<T>()).await
    }

    /// # Errors
    /// Same as [`Connection::execute`].
    pub async fn execute(&self, sql: impl Into<String>, params: Vec<Value>) -> Result<usize, MapperError> {
        let sql = sql.into();
        self.with_connection(move |conn| conn.execute(&sql, &params)).await
    }

    /// # Errors
    /// Same as [`Connection::execute_scalar`].
    pub async fn execute_scalar<T: FromValue + Send + 'static>(
        &self,
        sql: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<T, MapperError> {
        let sql = sql.into();
        self.with_connection(move |conn| conn.execute_scalar::<T>(&sql, &params)).await
    }

    /// # Errors
    /// Same as [`Connection::query_raw`].
    pub async fn query_raw(&self, sql: impl Into<String>, params: Vec<Value>) -> Result<ResultSet, MapperError> {
        let sql = sql.into();
        self.with_connection(move |conn| conn.query_raw(&sql, &params)).await
    }

    /// # Errors
    /// Same as [`Connection::query_as`].
    pub async fn query_as<T: Entity + Send>(&self, sql: impl Into<String>, params: Vec<Value>) -> Result<Vec<T>, MapperError> {
        let sql = sql.into();
        self.with_connection(move |conn| conn.query_as::<T>(&sql, &params)).await
    }

    /// Run `body` inside a transaction frame on the worker; see [`Connection::run_in_transaction`].
    ///
    /// # Errors
    /// Returns the body's error or the commit failure.
    pub async fn run_in_transaction<F, R>(&self, body: F) -> Result<R, MapperError>
    where
        F: FnOnce(&mut Connection) -> Result<R, MapperError> + Send + 'static,
        R: Send + 'static,
    {
        self.with_connection(move |conn| conn.run_in_transaction(body)).await
    }

    /// # Errors
    /// Returns [`MapperError::Connection`] once the worker is gone.
    pub async fn transaction_depth(&self) -> Result<usize, MapperError> {
        self.with_connection(|conn| Ok(conn.transaction_depth())).await
    }

    /// # Errors
    /// Same as [`Connection::set_busy_timeout`].
    pub async fn set_busy_timeout(&self, timeout: Duration) -> Result<(), MapperError> {
        self.with_connection(move |conn| conn.set_busy_timeout(timeout)).await
    }

    /// # Errors
    /// Same as [`Connection::rekey`].
    pub async fn rekey(&self, key: KeyMaterial) -> Result<(), MapperError> {
        self.with_connection(move |conn| conn.rekey(&key)).await
    }

    /// Register a change listener; it runs on the worker thread.
    ///
    /// # Errors
    /// Returns [`MapperError::Connection`] once the worker is gone.
    pub async fn on_table_changed(
        &self,
        listener: impl Fn(&TableChanged) + Send + Sync + 'static,
    ) -> Result<(), MapperError> {
        self.with_connection(move |conn| {
            conn.on_table_changed(listener);
            Ok(())
        })
        .await
    }

    #[must_use]
    pub fn table<T: Entity>(&self) -> AsyncTable<T> {
        AsyncTable {
            conn: self.clone(),
            query: Query::new(),
        }
    }
}

impl fmt::Debug for AsyncConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncConnection")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// A [`Query`] bound to an [`AsyncConnection`]; terminal methods run on the worker.
pub struct AsyncTable<T> {
    conn: AsyncConnection,
    query: Query<T>,
}

impl<T> Composable<T> for AsyncTable<T> {
    fn map_query(self, f: impl FnOnce(Query<T>) -> Query<T>) -> Self {
        Self {
            conn: self.conn,
            query: f(self.query),
        }
    }
}

impl<T> Clone for AsyncTable<T> {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            query: self.query.clone(),
        }
    }
}

impl<T: Entity + Send> AsyncTable<T> {
    #[must_use]
    pub fn query(&self) -> &Query<T> {
        &self.query
    }

    async fn run<R: Send + 'static>(
        &self,
        terminal: impl FnOnce(Table<'_, T>) -> Result<R, MapperError> + Send + 'static,
    ) -> Result<R, MapperError> {
        let query = self.query.clone();
        self.conn
            .with_connection(move |conn| terminal(conn.table_with(query)))
            .await
    }

    /// # Errors
    /// Same as [`Table::to_vec`].
    pub async fn to_vec(&self) -> Result<Vec<T>, MapperError> {
        self.run(|table| table.to_vec()).await
    }

    /// # Errors
    /// Same as [`Table::count`].
    pub async fn count(&self) -> Result<u64, MapperError> {
        self.run(|table| table.count()).await
    }

    /// # Errors
    /// Same as [`Table::exists`].
    pub async fn exists(&self) -> Result<bool, MapperError> {
        self.run(|table| table.exists()).await
    }

    /// # Errors
    /// Same as [`Table::first`].
    pub async fn first(&self) -> Result<T, MapperError> {
        self.run(|table| table.first()).await
    }

    /// # Errors
    /// Same as [`Table::first_or_none`].
    pub async fn first_or_none(&self) -> Result<Option<T>, MapperError> {
        self.run(|table| table.first_or_none()).await
    }

    /// # Errors
    /// Same as [`Table::element_at`].
    pub async fn element_at(&self, index: u64) -> Result<T, MapperError> {
        self.run(move |table| table.element_at(index)).await
    }

    /// # Errors
    /// Same as [`Table::element_at_or_none`].
    pub async fn element_at_or_none(&self, index: u64) -> Result<Option<T>, MapperError> {
        self.run(move |table| table.element_at_or_none(index)).await
    }

    /// # Errors
    /// Same as [`Table::sum`].
    pub async fn sum<R: FromValue + Send + 'static>(&self, property: &str) -> Result<R, MapperError> {
        let property = property.to_owned();
        self.run(move |table| table.sum::<R>(&property)).await
    }

    /// # Errors
    /// Same as [`Table::average`].
    pub async fn average(&self, property: &str) -> Result<Option<f64>, MapperError> {
        let property = property.to_owned();
        self.run(move |table| table.average(&property)).await
    }

    /// # Errors
    /// Same as [`Table::min`].
    pub async fn min<R: FromValue + Send + 'static>(&self, property: &str) -> Result<Option<R>, MapperError> {
        let property = property.to_owned();
        self.run(move |table| table.min::<R>(&property)).await
    }

    /// # Errors
    /// Same as [`Table::max`].
    pub async fn max<R: FromValue + Send + 'static>(&self, property: &str) -> Result<Option<R>, MapperError> {
        let property = property.to_owned();
        self.run(move |table| table.max::<R>(&property)).await
    }

    /// # Errors
    /// Same as [`Table::project`].
    pub async fn project(&self, properties: &[&str]) -> Result<ResultSet, MapperError> {
        let properties: Vec<String> = properties.iter().map(|p| (*p).to_owned()).collect();
        self.run(move |table| {
            let properties: Vec<&str> = properties.iter().map(String::as_str).collect();
            table.project(&properties)
        })
        .await
    }

    /// # Errors
    /// Same as [`Table::delete`].
    pub async fn delete(&self) -> Result<usize, MapperError> {
        self.run(|table| table.delete()).await
    }
}
