use std::collections::HashMap;
use std::sync::Arc;

use crate::conversion::FromValue;
use crate::error::MapperError;
use crate::types::Value;

/// A decoded result row.
///
/// Column names are shared by every row of a result set. Rows handed to
/// [`Entity::from_row`](crate::schema::Entity::from_row) are named by property.
#[derive(Debug, Clone)]
pub struct Row {
    /// The column names for this row (shared across all rows in a result set)
    pub column_names: Arc<Vec<String>>,
    pub values: Vec<Value>,
    column_index_cache: Arc<HashMap<String, usize>>,
}

impl Row {
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, values: Vec<Value>) -> Self {
        let cache = Arc::new(index_columns(&column_names));
        Self::with_cache(column_names, cache, values)
    }

    pub(crate) fn with_cache(
        column_names: Arc<Vec<String>>,
        column_index_cache: Arc<HashMap<String, usize>>,
        values: Vec<Value>,
    ) -> Self {
        Self {
            column_names,
            values,
            column_index_cache,
        }
    }

    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.column_index_cache.get(column_name) {
            return Some(idx);
        }
        self.column_names
            .iter()
            .position(|col| col.eq_ignore_ascii_case(column_name))
    }

    /// Raw value of a column, if present.
    #[must_use]
    pub fn value(&self, column_name: &str) -> Option<&Value> {
        self.get_column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Convert a column into `T`.
    ///
    /// # Errors
    /// Returns [`MapperError::Conversion`] when the column is missing or has the wrong shape.
    pub fn get<T: FromValue>(&self, column_name: &str) -> Result<T, MapperError> {
        let value = self.value(column_name).ok_or_else(|| {
            MapperError::Conversion(format!("column {column_name} is not present in the row"))
        })?;
        T::from_value(value.clone())
    }

    /// Like [`Row::get`], but a missing column yields `None` instead of an error.
    ///
    /// # Errors
    /// Returns [`MapperError::Conversion`] when the column is present but cannot convert.
    pub fn get_opt<T: FromValue>(&self, column_name: &str) -> Result<Option<T>, MapperError> {
        self.value(column_name)
            .map(|value| T::from_value(value.clone()))
            .transpose()
    }
}

/// Column names plus lookup cache, shared by every row of one result.
#[derive(Debug, Clone)]
pub(crate) struct RowLayout {
    names: Arc<Vec<String>>,
    cache: Arc<HashMap<String, usize>>,
}

impl RowLayout {
    pub(crate) fn new(names: Vec<String>) -> Self {
        let cache = Arc::new(index_columns(&names));
        Self {
            names: Arc::new(names),
            cache,
        }
    }

    pub(crate) fn row(&self, values: Vec<Value>) -> Row {
        Row::with_cache(Arc::clone(&self.names), Arc::clone(&self.cache), values)
    }
}

pub(crate) fn index_columns(column_names: &[String]) -> HashMap<String, usize> {
    column_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name_and_index() {
        let row = Row::new(
            Arc::new(vec!["Id".into(), "Name".into()]),
            vec![Value::Int(3), Value::Text("Ann".into())],
        );
        assert_eq!(row.get::<i64>("Id").expect("id"), 3);
        assert_eq!(row.get::<String>("name").expect("case-insensitive"), "Ann");
        assert_eq!(row.get_by_index(1), Some(&Value::Text("Ann".into())));
        assert!(row.get::<i64>("Missing").is_err());
        assert_eq!(row.get_opt::<i64>("Missing").expect("absent"), None);
    }
}
