use tracing::{debug, info};

use crate::error::{MapperError, translate};
use crate::marshal::MarshalOptions;
use crate::types::Affinity;

use super::ddl;
use super::mapping::TableMapping;
use super::spec::ComputedKind;

/// Outcome of [`ensure_schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateTableResult {
    Created,
    Migrated,
    Unchanged,
}

/// Hidden-column classification reported by `PRAGMA table_xinfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HiddenKind {
    None,
    VirtualComputed,
    StoredComputed,
}

impl HiddenKind {
    fn from_pragma(hidden: i64) -> Self {
        match hidden {
            2 => HiddenKind::VirtualComputed,
            3 => HiddenKind::StoredComputed,
            _ => HiddenKind::None,
        }
    }
}

/// A column as the database currently defines it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    pub name: String,
    pub declared_type: String,
    pub affinity: Affinity,
    pub not_null: bool,
    pub primary_key: bool,
    pub hidden: HiddenKind,
}

/// Live column list for `table`; empty when the table does not exist.
///
/// # Errors
/// Returns a translated native error when the pragma cannot run.
pub fn live_columns(conn: &rusqlite::Connection, table: &str) -> Result<Vec<LiveColumn>, MapperError> {
    let sql = format!("PRAGMA table_xinfo({})", ddl::quote(table));
    let mut stmt = conn.prepare(&sql).map_err(|e| translate(e, None))?;
    let rows = stmt
        .query_map([], |row| {
            let declared_type: String = row.get::<_, Option<String>>(2)?.unwrap_or_default();
            Ok(LiveColumn {
                name: row.get(1)?,
                affinity: Affinity::from_declared_type(&declared_type),
                declared_type,
                not_null: row.get::<_, i64>(3)? != 0,
                primary_key: row.get::<_, i64>(5)? != 0,
                hidden: HiddenKind::from_pragma(row.get(6)?),
            })
        })
        .map_err(|e| translate(e, None))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(|e| translate(e, None))
}

/// Bring the live table for `mapping` in line with its declaration.
///
/// Only additive changes are made: a missing table is created, missing columns are added and
/// declared indices are created when absent. Nothing is dropped or retyped.
///
/// # Errors
/// Returns [`MapperError::Schema`] when a missing column cannot be added in place (a stored
/// computed column), or a translated native error.
pub fn ensure_schema(
    conn: &rusqlite::Connection,
    mapping: &TableMapping,
    options: &MarshalOptions,
) -> Result<CreateTableResult, MapperError> {
    let table = mapping.table_name();
    let live = live_columns(conn, table)?;

    let outcome = if live.is_empty() {
        let sql = ddl::create_table(mapping, options);
        debug!(%sql, "creating table");
        conn.execute_batch(&sql).map_err(|e| translate(e, Some(mapping)))?;
        info!(table, "table created");
        CreateTableResult::Created
    } else {
        let missing: Vec<_> = mapping
            .columns()
            .iter()
            .filter(|c| !live.iter().any(|l| l.name.eq_ignore_ascii_case(c.name())))
            .collect();
        if let Some(stored) = missing
            .iter()
            .find(|c| c.computed().is_some_and(|computed| computed.kind == ComputedKind::Stored))
        {
            return Err(MapperError::Schema(format!(
                "{table}.{}: a STORED computed column cannot be added to an existing table",
                stored.name()
            )));
        }
        for column in &missing {
            let sql = ddl::add_column(table, column, options);
            debug!(%sql, "adding column");
            conn.execute_batch(&sql).map_err(|e| translate(e, Some(mapping)))?;
        }
        if missing.is_empty() {
            CreateTableResult::Unchanged
        } else {
            info!(table, added = missing.len(), "table migrated");
            CreateTableResult::Migrated
        }
    };

    for index in mapping.indices() {
        let sql = ddl::create_index(table, index);
        debug!(%sql, "ensuring index");
        conn.execute_batch(&sql).map_err(|e| translate(e, Some(mapping)))?;
    }
    Ok(outcome)
}
