use std::sync::Arc;

use crate::conversion::FromValue;
use crate::error::MapperError;
use crate::marshal::{from_storage_cell, natural_value};
use crate::query::translate::{self, Statement};
use crate::query::{Aggregate, Composable, Query, QueryParts};
use crate::results::ResultSet;
use crate::schema::{Entity, TableMapping};
use crate::types::{Cell, Value};

use super::Connection;
use super::events::ChangeAction;

/// A [`Query`] bound to a connection.
///
/// Building is free; every terminal method runs the generated SQL against current data.
pub struct Table<'c, T> {
    conn: &'c Connection,
    query: Query<T>,
}

impl Connection {
    #[must_use]
    pub fn table<T: Entity>(&self) -> Table<'_, T> {
        self.table_with(Query::new())
    }

    /// Bind a query built elsewhere.
    #[must_use]
    pub fn table_with<T: Entity>(&self, query: Query<T>) -> Table<'_, T> {
        Table { conn: self, query }
    }
}

impl<T> Composable<T> for Table<'_, T> {
    fn map_query(self, f: impl FnOnce(Query<T>) -> Query<T>) -> Self {
        Self {
            conn: self.conn,
            query: f(self.query),
        }
    }
}

impl<'c, T: Entity> Table<'c, T> {
    #[must_use]
    pub fn query(&self) -> &Query<T> {
        &self.query
    }

    fn mapping(&self) -> Result<Arc<TableMapping>, MapperError> {
        self.conn.mapping::<T>()
    }

    fn entities(&self, parts: &QueryParts, mut on_entity: impl FnMut(T) -> Result<(), MapperError>) -> Result<(), MapperError> {
        let mapping = self.mapping()?;
        let stmt = translate::select(parts, &mapping, self.conn.marshal_options())?;
        self.conn.for_each_entity(&stmt, &mapping, &mut on_entity)
    }

    /// First cell of the first row, NULL when there is none.
    fn scalar(&self, stmt: &Statement) -> Result<Cell, MapperError> {
        let mut first = None;
        self.conn.for_each_row(stmt, |_, cells| {
            if first.is_none() {
                first = cells.into_iter().next();
            }
            Ok(())
        })?;
        Ok(first.unwrap_or(Cell::Null))
    }

    fn aggregate(&self, aggregate: &Aggregate) -> Result<(Arc<TableMapping>, Cell), MapperError> {
        let mapping = self.mapping()?;
        let stmt = translate::aggregate(&self.query.parts, aggregate, &mapping, self.conn.marshal_options())?;
        let cell = self.scalar(&stmt)?;
        Ok((mapping, cell))
    }

    /// # Errors
    /// Returns [`MapperError::InvalidOperation`] for an unknown property, or a read failure.
    pub fn to_vec(&self) -> Result<Vec<T>, MapperError> {
        let mut out = Vec::new();
        self.entities(&self.query.parts, |entity| {
            out.push(entity);
            Ok(())
        })?;
        Ok(out)
    }

    /// Stream matching rows without collecting them.
    ///
    /// # Errors
    /// Stops at and returns the first error, including one returned by `on_entity`.
    pub fn for_each(&self, on_entity: impl FnMut(T) -> Result<(), MapperError>) -> Result<(), MapperError> {
        self.entities(&self.query.parts, on_entity)
    }

    /// # Errors
    /// Returns a translation or read failure.
    pub fn count(&self) -> Result<u64, MapperError> {
        let (_, cell) = self.aggregate(&Aggregate::Count)?;
        u64::try_from(natural_value(cell).as_int().unwrap_or(0))
            .map_err(|e| MapperError::Conversion(format!("negative row count: {e}")))
    }

    /// # Errors
    /// Returns a translation or read failure.
    pub fn exists(&self) -> Result<bool, MapperError> {
        let (_, cell) = self.aggregate(&Aggregate::Exists)?;
        Ok(natural_value(cell).as_bool().unwrap_or(false))
    }

    /// # Errors
    /// Returns [`MapperError::NotFound`] when nothing matches.
    pub fn first(&self) -> Result<T, MapperError> {
        self.element_at(0)
    }

    /// # Errors
    /// Returns a translation or read failure.
    pub fn first_or_none(&self) -> Result<Option<T>, MapperError> {
        self.element_at_or_none(0)
    }

    /// Row at `index` in query order.
    ///
    /// # Errors
    /// Returns [`MapperError::NotFound`] when the query has fewer rows.
    pub fn element_at(&self, index: u64) -> Result<T, MapperError> {
        self.element_at_or_none(index)?.ok_or_else(|| {
            MapperError::NotFound(format!("no row at position {index} of the query"))
        })
    }

    /// # Errors
    /// Returns a translation or read failure.
    pub fn element_at_or_none(&self, index: u64) -> Result<Option<T>, MapperError> {
        let Some(parts) = self.query.parts.element_at(index) else {
            return Ok(None);
        };
        let mut found = None;
        self.entities(&parts, |entity| {
            found.get_or_insert(entity);
            Ok(())
        })?;
        Ok(found)
    }

    /// Sum of a numeric property over matching rows; zero when nothing matches.
    ///
    /// # Errors
    /// Returns [`MapperError::Conversion`] when the sum does not fit `R`.
    pub fn sum<R: FromValue>(&self, property: &str) -> Result<R, MapperError> {
        let (_, cell) = self.aggregate(&Aggregate::Sum(property.to_owned()))?;
        let value = natural_value(cell);
        R::from_value(if value.is_null() { Value::Int(0) } else { value })
    }

    /// # Errors
    /// Returns a translation or read failure.
    pub fn average(&self, property: &str) -> Result<Option<f64>, MapperError> {
        let (_, cell) = self.aggregate(&Aggregate::Average(property.to_owned()))?;
        Ok(natural_value(cell).as_real())
    }

    /// Smallest value of a property, decoded with the column's type; `None` when nothing matches.
    ///
    /// # Errors
    /// Returns [`MapperError::Conversion`] when the value does not fit `R`.
    pub fn min<R: FromValue>(&self, property: &str) -> Result<Option<R>, MapperError> {
        self.extreme(Aggregate::Min(property.to_owned()), property)
    }

    /// # Errors
    /// Returns [`MapperError::Conversion`] when the value does not fit `R`.
    pub fn max<R: FromValue>(&self, property: &str) -> Result<Option<R>, MapperError> {
        self.extreme(Aggregate::Max(property.to_owned()), property)
    }

    fn extreme<R: FromValue>(&self, aggregate: Aggregate, property: &str) -> Result<Option<R>, MapperError> {
        let (mapping, cell) = self.aggregate(&aggregate)?;
        let Some(column) = mapping.find_column_by_property(property) else {
            return Err(MapperError::InvalidOperation(format!("unknown property {property}")));
        };
        Option::<R>::from_value(from_storage_cell(&cell, column.kind(), self.conn.marshal_options())?)
    }

    /// Selected properties of matching rows as untyped rows named by property.
    ///
    /// # Errors
    /// Returns [`MapperError::InvalidOperation`] for an unknown property or an empty list.
    pub fn project(&self, properties: &[&str]) -> Result<ResultSet, MapperError> {
        let mapping = self.mapping()?;
        let options = self.conn.marshal_options();
        let (stmt, columns) = translate::project(&self.query.parts, properties, &mapping, options)?;
        let mut result = ResultSet::default();
        result.set_column_names(Arc::new(
            columns.iter().map(|c| c.property_name().to_owned()).collect(),
        ));
        self.conn.for_each_row(&stmt, |_, cells| {
            let values = cells
                .iter()
                .zip(&columns)
                .map(|(cell, column)| from_storage_cell(cell, column.kind(), options))
                .collect::<Result<Vec<_>, _>>()?;
            result.add_row_values(values);
            Ok(())
        })?;
        Ok(result)
    }

    /// Delete every row the predicate matches.
    ///
    /// # Errors
    /// Returns [`MapperError::InvalidOperation`] when the query has no predicate or is paged.
    pub fn delete(&self) -> Result<usize, MapperError> {
        let mapping = self.mapping()?;
        let stmt = translate::delete(&self.query.parts, &mapping, self.conn.marshal_options())?;
        let rows = self.conn.run(&stmt, Some(&mapping))?;
        self.conn
            .listeners
            .notify(mapping.table_name(), ChangeAction::Delete, rows);
        Ok(rows)
    }
}
