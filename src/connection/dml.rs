use tracing::{debug, info};

use crate::conversion::IntoValue;
use crate::error::{MapperError, translate};
use crate::marshal::to_storage_cell;
use crate::query::translate::Statement;
use crate::query::{Composable, col};
use crate::schema::ddl::{create_index, drop_table, quote};
use crate::schema::{Column, CreateFlags, CreateTableResult, Entity, IndexDescription, TableMapping, ensure_schema};
use crate::types::{Cell, Value};

use super::Connection;
use super::events::{ChangeAction, TableChanged};

fn value_of(values: &[(&'static str, Value)], property: &str) -> Value {
    values
        .iter()
        .find(|(name, _)| *name == property)
        .map_or(Value::Null, |(_, value)| value.clone())
}

fn primary_key(mapping: &TableMapping, op: &str) -> Result<Column, MapperError> {
    mapping.primary_key().cloned().ok_or_else(|| {
        MapperError::InvalidOperation(format!(
            "cannot {op} {}: it has no primary key",
            mapping.table_name()
        ))
    })
}

impl Connection {
    fn bind(&self, column: &Column, value: &Value) -> Result<Cell, MapperError> {
        to_storage_cell(value, column.kind(), self.marshal_options())
    }

    fn insert_with<T: Entity>(&self, entity: &mut T, replace: bool) -> Result<usize, MapperError> {
        let mapping = self.mapping::<T>()?;
        let values = entity.to_values();
        let columns: Vec<&Column> = mapping.insert_columns(replace).collect();
        let verb = if replace { "INSERT OR REPLACE" } else { "INSERT" };

        let stmt = if columns.is_empty() {
            Statement {
                sql: format!("{verb} INTO {} DEFAULT VALUES", quote(mapping.table_name())),
                params: Vec::new(),
            }
        } else {
            let names: Vec<String> = columns.iter().map(|c| quote(c.name())).collect();
            let placeholders = vec!["?"; columns.len()].join(", ");
            Statement {
                sql: format!(
                    "{verb} INTO {}({}) VALUES ({placeholders})",
                    quote(mapping.table_name()),
                    names.join(", ")
                ),
                params: columns
                    .iter()
                    .map(|c| self.bind(c, &value_of(&values, c.property_name())))
                    .collect::<Result<_, _>>()?,
            }
        };

        let rows = self.run(&stmt, Some(&mapping))?;
        if rows > 0 && mapping.primary_key().is_some_and(Column::is_auto_increment) {
            entity.set_auto_id(self.last_insert_rowid()?);
        }
        self.listeners.notify(mapping.table_name(), ChangeAction::Insert, rows);
        Ok(rows)
    }

    /// Insert one row. An autoincrement key is assigned back through [`Entity::set_auto_id`].
    ///
    /// # Errors
    /// Returns [`MapperError::Constraint`] on a constraint violation, or another translated
    /// native error.
    pub fn insert<T: Entity>(&self, entity: &mut T) -> Result<usize, MapperError> {
        self.insert_with(entity, false)
    }

    /// Insert one row, replacing any row that conflicts on a unique key.
    ///
    /// # Errors
    /// Same as [`Connection::insert`].
    pub fn insert_or_replace<T: Entity>(&self, entity: &mut T) -> Result<usize, MapperError> {
        self.insert_with(entity, true)
    }

    /// Insert every entity inside one transaction; nothing is kept if any insert fails.
    ///
    /// # Errors
    /// Returns the first failing insert's error.
    pub fn insert_all<T: Entity>(&mut self, entities: &mut [T]) -> Result<usize, MapperError> {
        self.run_in_transaction(|conn| {
            let mut rows = 0;
            for entity in entities.iter_mut() {
                rows += conn.insert(entity)?;
            }
            Ok(rows)
        })
    }

    /// Update every writable column of the row matching the entity's primary key.
    ///
    /// # Errors
    /// Returns [`MapperError::InvalidOperation`] when `T` has no primary key.
    pub fn update<T: Entity>(&self, entity: &T) -> Result<usize, MapperError> {
        let mapping = self.mapping::<T>()?;
        let pk = primary_key(&mapping, "update")?;
        let values = entity.to_values();
        let columns: Vec<&Column> = mapping.update_columns().collect();
        if columns.is_empty() {
            return Ok(0);
        }

        let assignments: Vec<String> = columns.iter().map(|c| format!("{} = ?", quote(c.name()))).collect();
        let mut params: Vec<Cell> = columns
            .iter()
            .map(|c| self.bind(c, &value_of(&values, c.property_name())))
            .collect::<Result<_, _>>()?;
        params.push(self.bind(&pk, &value_of(&values, pk.property_name()))?);
        let stmt = Statement {
            sql: format!(
                "UPDATE {} SET {} WHERE {} = ?",
                quote(mapping.table_name()),
                assignments.join(", "),
                quote(pk.name())
            ),
            params,
        };

        let rows = self.run(&stmt, Some(&mapping))?;
        self.listeners.notify(mapping.table_name(), ChangeAction::Update, rows);
        Ok(rows)
    }

    /// Update every entity inside one transaction.
    ///
    /// # Errors
    /// Returns the first failing update's error.
    pub fn update_all<T: Entity>(&mut self, entities: &[T]) -> Result<usize, MapperError> {
        self.run_in_transaction(|conn| {
            let mut rows = 0;
            for entity in entities {
                rows += conn.update(entity)?;
            }
            Ok(rows)
        })
    }

    /// Delete the row matching the entity's primary key.
    ///
    /// # Errors
    /// Returns [`MapperError::InvalidOperation`] when `T` has no primary key.
    pub fn delete<T: Entity>(&self, entity: &T) -> Result<usize, MapperError> {
        let mapping = self.mapping::<T>()?;
        let pk = primary_key(&mapping, "delete")?;
        let key = value_of(&entity.to_values(), pk.property_name());
        self.delete_key(&mapping, &pk, &key)
    }

    /// Delete the row of `T` with the given primary key value.
    ///
    /// # Errors
    /// Returns [`MapperError::InvalidOperation`] when `T` has no primary key.
    pub fn delete_by_key<T: Entity>(&self, key: impl IntoValue) -> Result<usize, MapperError> {
        let mapping = self.mapping::<T>()?;
        let pk = primary_key(&mapping, "delete")?;
        self.delete_key(&mapping, &pk, &key.into_value())
    }

    fn delete_key(&self, mapping: &TableMapping, pk: &Column, key: &Value) -> Result<usize, MapperError> {
        let stmt = Statement {
            sql: format!(
                "DELETE FROM {} WHERE {} = ?",
                quote(mapping.table_name()),
                quote(pk.name())
            ),
            params: vec![self.bind(pk, key)?],
        };
        let rows = self.run(&stmt, Some(mapping))?;
        self.listeners.notify(mapping.table_name(), ChangeAction::Delete, rows);
        Ok(rows)
    }

    /// Delete every row of `T`'s table.
    ///
    /// # Errors
    /// Returns a translated native error.
    pub fn delete_all<T: Entity>(&self) -> Result<usize, MapperError> {
        let mapping = self.mapping::<T>()?;
        let stmt = Statement {
            sql: format!("DELETE FROM {}", quote(mapping.table_name())),
            params: Vec::new(),
        };
        let rows = self.run(&stmt, Some(&mapping))?;
        self.listeners.notify(mapping.table_name(), ChangeAction::Delete, rows);
        Ok(rows)
    }

    /// Row of `T` with the given primary key.
    ///
    /// # Errors
    /// Returns [`MapperError::NotFound`] when no row matches.
    pub fn get<T: Entity>(&self, key: impl IntoValue) -> Result<T, MapperError> {
        let table = self.mapping::<T>()?.table_name().to_owned();
        self.find(key)?
            .ok_or_else(|| MapperError::NotFound(format!("no row in {table} with the given key")))
    }

    /// Like [`Connection::get`], returning `None` when no row matches.
    ///
    /// # Errors
    /// Returns [`MapperError::InvalidOperation`] when `T` has no primary key.
    pub fn find<T: Entity>(&self, key: impl IntoValue) -> Result<Option<T>, MapperError> {
        let mapping = self.mapping::<T>()?;
        let pk = primary_key(&mapping, "look up")?;
        self.table::<T>()
            .filter(col(pk.property_name()).eq(key.into_value()))
            .first_or_none()
    }

    /// Create `T`'s table, or add its missing columns, and ensure its indices.
    ///
    /// The flags are remembered for `T` on this connection and used by later operations.
    ///
    /// # Errors
    /// Returns [`MapperError::Schema`] for an invalid declaration or a column that cannot be
    /// added in place.
    pub fn create_table<T: Entity>(&mut self, flags: CreateFlags) -> Result<CreateTableResult, MapperError> {
        self.remember_flags::<T>(flags);
        let mapping = self.mapping::<T>()?;
        let result = ensure_schema(self.handle()?, &mapping, self.marshal_options())?;
        info!(table = mapping.table_name(), ?result, "create_table");
        Ok(result)
    }

    /// Create an index over storage columns of any table. Existing indices are left alone.
    ///
    /// # Errors
    /// Returns [`MapperError::InvalidOperation`] when `columns` is empty, or a translated native
    /// error.
    pub fn create_index(&self, table: &str, name: &str, columns: &[&str], unique: bool) -> Result<(), MapperError> {
        if columns.is_empty() {
            return Err(MapperError::InvalidOperation(format!(
                "index {name} needs at least one column"
            )));
        }
        let index = IndexDescription {
            name: name.to_owned(),
            columns: columns.iter().map(|c| (*c).to_owned()).collect(),
            unique,
        };
        let sql = create_index(table, &index);
        debug!(%sql, "creating index");
        self.handle()?
            .execute_batch(&sql)
            .map_err(|e| translate(e, None))
    }

    /// # Errors
    /// Returns a translated native error.
    pub fn drop_table<T: Entity>(&self) -> Result<(), MapperError> {
        let mapping = self.mapping::<T>()?;
        let sql = drop_table(mapping.table_name());
        debug!(%sql, "dropping table");
        self.handle()?
            .execute_batch(&sql)
            .map_err(|e| translate(e, Some(&mapping)))
    }

    /// Register a callback raised after each mapped insert, update or delete that changed rows.
    pub fn on_table_changed(&mut self, listener: impl Fn(&TableChanged) + Send + Sync + 'static) {
        self.listeners.push(Box::new(listener));
    }
}
