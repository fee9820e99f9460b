use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::schema::TableMapping;

/// Native transaction statement that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOp {
    Begin,
    Savepoint,
    Commit,
    Release,
    Rollback,
    RollbackTo,
}

impl fmt::Display for TransactionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionOp::Begin => "BEGIN",
            TransactionOp::Savepoint => "SAVEPOINT",
            TransactionOp::Commit => "COMMIT",
            TransactionOp::Release => "RELEASE",
            TransactionOp::Rollback => "ROLLBACK",
            TransactionOp::RollbackTo => "ROLLBACK TO",
        };
        f.write_str(name)
    }
}

/// Which constraint the native layer reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    PrimaryKey,
    NotNull,
    Check,
    ForeignKey,
    Other,
}

#[derive(Debug, Error)]
pub enum MapperError {
    #[error("schema error: {0}")]
    Schema(String),

    #[error("{kind:?} constraint failed on {table}({}): {message}", columns.join(", "))]
    Constraint {
        kind: ConstraintKind,
        table: String,
        /// Declared property names when a mapping was in scope, storage names otherwise.
        columns: Vec<String>,
        message: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database is busy: {0}")]
    Busy(String),

    #[error("{op} failed: {source}")]
    Transaction {
        op: TransactionOp,
        #[source]
        source: Box<MapperError>,
    },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("conversion error: {0}")]
    Conversion(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl MapperError {
    /// True when this error, or the native error wrapped by a transaction failure, is busy/locked.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        match self {
            MapperError::Busy(_) => true,
            MapperError::Transaction { source, .. } => source.is_busy(),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, MapperError::NotFound(_))
    }

    pub(crate) fn transaction(op: TransactionOp, source: MapperError) -> Self {
        MapperError::Transaction {
            op,
            source: Box::new(source),
        }
    }
}

lazy_static! {
    static ref CONSTRAINT_MESSAGE: Regex =
        Regex::new(r"^(UNIQUE|NOT NULL|CHECK|FOREIGN KEY|PRIMARY KEY) constraint failed(?::\s*(.*))?$")
            .expect("constraint regex is valid");
}

/// Translate a native error into the crate taxonomy.
///
/// Busy and locked results become [`MapperError::Busy`]; constraint violations become
/// [`MapperError::Constraint`] with column names resolved through `mapping` when given.
pub(crate) fn translate(err: rusqlite::Error, mapping: Option<&TableMapping>) -> MapperError {
    let (code, message) = match &err {
        rusqlite::Error::SqliteFailure(native, message) => (native.code, message.clone()),
        _ => return MapperError::Sqlite(err),
    };
    match code {
        rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
            MapperError::Busy(message.unwrap_or_else(|| err.to_string()))
        }
        rusqlite::ErrorCode::ConstraintViolation => {
            let text = message.unwrap_or_else(|| err.to_string());
            constraint_error(&text, mapping)
        }
        _ => MapperError::Sqlite(err),
    }
}

pub(crate) fn translate_sqlite(err: rusqlite::Error) -> MapperError {
    translate(err, None)
}

fn constraint_error(message: &str, mapping: Option<&TableMapping>) -> MapperError {
    let Some(caps) = CONSTRAINT_MESSAGE.captures(message.trim()) else {
        return MapperError::Constraint {
            kind: ConstraintKind::Other,
            table: mapping.map(|m| m.table_name().to_owned()).unwrap_or_default(),
            columns: Vec::new(),
            message: message.to_owned(),
        };
    };
    let kind = match &caps[1] {
        "UNIQUE" => ConstraintKind::Unique,
        "PRIMARY KEY" => ConstraintKind::PrimaryKey,
        "NOT NULL" => ConstraintKind::NotNull,
        "CHECK" => ConstraintKind::Check,
        "FOREIGN KEY" => ConstraintKind::ForeignKey,
        _ => ConstraintKind::Other,
    };

    let mut table = mapping.map(|m| m.table_name().to_owned()).unwrap_or_default();
    let mut columns = Vec::new();
    // CHECK and FOREIGN KEY report a constraint name or nothing, never `table.column`.
    if matches!(
        kind,
        ConstraintKind::Unique | ConstraintKind::PrimaryKey | ConstraintKind::NotNull
    ) && let Some(list) = caps.get(2)
    {
        for qualified in list.as_str().split(',') {
            let qualified = qualified.trim();
            let (tbl, col) = qualified.rsplit_once('.').unwrap_or(("", qualified));
            if !tbl.is_empty() {
                table = tbl.to_owned();
            }
            let resolved = mapping
                .and_then(|m| m.find_column_by_storage_name(col))
                .map_or_else(|| col.to_owned(), |c| c.property_name().to_owned());
            columns.push(resolved);
        }
    }

    MapperError::Constraint {
        kind,
        table,
        columns,
        message: message.to_owned(),
    }
}
