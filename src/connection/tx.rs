use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{MapperError, TransactionOp, translate_sqlite};

use super::Connection;

const ROLLBACK_BUSY_RETRIES: &[Duration] = &[
    Duration::from_millis(10),
    Duration::from_millis(25),
    Duration::from_millis(50),
];

/// Run a rollback statement, retrying on busy with a short fixed back-off.
fn rollback_with_busy_retries(conn: &rusqlite::Connection, sql: &str) -> rusqlite::Result<()> {
    let mut attempt = 0;
    loop {
        match conn.execute_batch(sql) {
            Err(rusqlite::Error::SqliteFailure(err, _))
                if matches!(
                    err.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) && attempt < ROLLBACK_BUSY_RETRIES.len() =>
            {
                thread::sleep(ROLLBACK_BUSY_RETRIES[attempt]);
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Open transaction frames of one connection.
///
/// The first frame is the native `BEGIN`; every further frame is a savepoint. `depth` is the
/// number of frames, so it cannot drift from the savepoint stack. Frames are pushed or popped
/// only after the native statement succeeded, except on the recovery paths, which reconcile
/// against the native autocommit flag.
#[derive(Debug, Default)]
pub(crate) struct TransactionState {
    frames: Vec<String>,
    next_id: u64,
}

impl TransactionState {
    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    fn position(&self, name: &str) -> Result<usize, MapperError> {
        self.frames.iter().position(|f| f == name).ok_or_else(|| {
            MapperError::InvalidOperation(format!("no open transaction or savepoint named {name}"))
        })
    }

    fn top(&self, op: &str) -> Result<usize, MapperError> {
        if self.frames.is_empty() {
            Err(MapperError::InvalidOperation(format!(
                "{op} called with no active transaction"
            )))
        } else {
            Ok(self.frames.len() - 1)
        }
    }

    /// Open a frame and return its name.
    pub(crate) fn begin(&mut self, conn: &rusqlite::Connection) -> Result<String, MapperError> {
        self.next_id += 1;
        let name = format!("sp{}", self.next_id);
        if self.frames.is_empty() {
            conn.execute_batch("BEGIN")
                .map_err(|e| MapperError::transaction(TransactionOp::Begin, translate_sqlite(e)))?;
        } else {
            conn.execute_batch(&format!("SAVEPOINT {name}"))
                .map_err(|e| MapperError::transaction(TransactionOp::Savepoint, translate_sqlite(e)))?;
        }
        self.frames.push(name.clone());
        debug!(depth = self.depth(), savepoint = %name, "transaction frame opened");
        Ok(name)
    }

    pub(crate) fn commit(&mut self, conn: &rusqlite::Connection) -> Result<(), MapperError> {
        let index = self.top("commit")?;
        self.release_from(conn, index)
    }

    pub(crate) fn rollback(&mut self, conn: &rusqlite::Connection) -> Result<(), MapperError> {
        let index = self.top("rollback")?;
        self.rollback_from(conn, index)
    }

    pub(crate) fn release(&mut self, conn: &rusqlite::Connection, name: &str) -> Result<(), MapperError> {
        let index = self.position(name)?;
        self.release_from(conn, index)
    }

    pub(crate) fn rollback_to(&mut self, conn: &rusqlite::Connection, name: &str) -> Result<(), MapperError> {
        let index = self.position(name)?;
        self.rollback_from(conn, index)
    }

    /// Commit (index 0) or release the frame at `index` together with every frame above it.
    fn release_from(&mut self, conn: &rusqlite::Connection, index: usize) -> Result<(), MapperError> {
        let (op, sql) = if index == 0 {
            (TransactionOp::Commit, "COMMIT".to_owned())
        } else {
            (TransactionOp::Release, format!("RELEASE {}", self.frames[index]))
        };
        match conn.execute_batch(&sql) {
            Ok(()) => {
                self.frames.truncate(index);
                debug!(depth = self.depth(), "transaction frame released");
                Ok(())
            }
            Err(err) => {
                let err = translate_sqlite(err);
                warn!(%op, error = %err, "release failed; rolling back the frame");
                if let Err(rollback_err) = self.rollback_native(conn, index) {
                    warn!(error = %rollback_err, "rollback after failed {op} also failed");
                }
                self.reconcile(conn);
                Err(MapperError::transaction(op, err))
            }
        }
    }

    fn rollback_from(&mut self, conn: &rusqlite::Connection, index: usize) -> Result<(), MapperError> {
        let result = self.rollback_native(conn, index);
        if result.is_err() {
            self.reconcile(conn);
        }
        result
    }

    /// Roll back the frame at `index`; on success the frame and everything above it are gone.
    fn rollback_native(&mut self, conn: &rusqlite::Connection, index: usize) -> Result<(), MapperError> {
        let (op, sql) = if index == 0 {
            (TransactionOp::Rollback, "ROLLBACK".to_owned())
        } else {
            let name = &self.frames[index];
            // ROLLBACK TO keeps the savepoint open; the RELEASE pops it.
            (TransactionOp::RollbackTo, format!("ROLLBACK TO {name}; RELEASE {name}"))
        };
        rollback_with_busy_retries(conn, &sql).map_err(|e| MapperError::transaction(op, translate_sqlite(e)))?;
        self.frames.truncate(index);
        debug!(depth = self.depth(), "transaction frame rolled back");
        Ok(())
    }

    /// Drop every frame when the native layer reports no open transaction.
    fn reconcile(&mut self, conn: &rusqlite::Connection) {
        if conn.is_autocommit() && !self.frames.is_empty() {
            warn!(depth = self.depth(), "native transaction already closed; resetting depth");
            self.frames.clear();
        }
    }

    /// Forget all frames; used when the handle is closed.
    pub(crate) fn clear(&mut self) {
        self.frames.clear();
    }
}

impl Connection {
    /// Open a transaction, or a savepoint when one is already active.
    ///
    /// # Errors
    /// Returns [`MapperError::Transaction`] if the native BEGIN/SAVEPOINT fails.
    pub fn begin_transaction(&mut self) -> Result<(), MapperError> {
        self.save_transaction_point().map(|_| ())
    }

    /// Like [`Connection::begin_transaction`], returning the frame name for
    /// [`Connection::release`] and [`Connection::rollback_to`].
    ///
    /// # Errors
    /// Returns [`MapperError::Transaction`] if the native statement fails.
    pub fn save_transaction_point(&mut self) -> Result<String, MapperError> {
        let (conn, tx) = self.handle_and_tx()?;
        tx.begin(conn)
    }

    /// Commit the innermost frame.
    ///
    /// When the native COMMIT or RELEASE fails, the frame is rolled back before the original
    /// failure is returned, so the connection is reusable afterwards.
    ///
    /// # Errors
    /// Returns [`MapperError::Transaction`] carrying the native failure, or
    /// [`MapperError::InvalidOperation`] when no transaction is open.
    pub fn commit(&mut self) -> Result<(), MapperError> {
        let (conn, tx) = self.handle_and_tx()?;
        tx.commit(conn)
    }

    /// Roll back the innermost frame.
    ///
    /// # Errors
    /// Returns [`MapperError::Transaction`] if the native rollback fails after retries.
    pub fn rollback(&mut self) -> Result<(), MapperError> {
        let (conn, tx) = self.handle_and_tx()?;
        tx.rollback(conn)
    }

    /// Release the named frame and every frame opened after it.
    ///
    /// # Errors
    /// Same as [`Connection::commit`]; also fails when `name` is not open.
    pub fn release(&mut self, name: &str) -> Result<(), MapperError> {
        let (conn, tx) = self.handle_and_tx()?;
        tx.release(conn, name)
    }

    /// Roll back to the named frame, discarding it and every frame opened after it.
    ///
    /// # Errors
    /// Same as [`Connection::rollback`]; also fails when `name` is not open.
    pub fn rollback_to(&mut self, name: &str) -> Result<(), MapperError> {
        let (conn, tx) = self.handle_and_tx()?;
        tx.rollback_to(conn, name)
    }

    #[must_use]
    pub fn transaction_depth(&self) -> usize {
        self.tx.depth()
    }

    #[must_use]
    pub fn is_in_transaction(&self) -> bool {
        self.tx.depth() > 0
    }

    /// Run `body` inside a transaction frame.
    ///
    /// Nested calls use savepoints inside the caller's transaction. The frame is released when
    /// `body` succeeds and rolled back when it fails; the body's error is returned unchanged.
    ///
    /// # Errors
    /// Returns the body's error, or [`MapperError::Transaction`] if the frame cannot be opened
    /// or committed.
    pub fn run_in_transaction<R>(
        &mut self,
        body: impl FnOnce(&mut Connection) -> Result<R, MapperError>,
    ) -> Result<R, MapperError> {
        let frame = self.save_transaction_point()?;
        match body(self) {
            Ok(value) => {
                self.release(&frame)?;
                Ok(value)
            }
            Err(err) => {
                if self.tx.position(&frame).is_ok()
                    && let Err(rollback_err) = self.rollback_to(&frame)
                {
                    warn!(error = %rollback_err, "rollback after failed transaction body failed");
                }
                Err(err)
            }
        }
    }
}
