use std::collections::HashMap;

use crate::error::MapperError;
use crate::types::ValueKind;

use super::spec::{Collation, ColumnSpec, ComputedKind, CreateFlags, TableSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedColumn {
    pub expression: String,
    pub kind: ComputedKind,
}

/// Membership of a column in a named index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMembership {
    pub name: String,
    pub order: i32,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescription {
    pub name: String,
    /// Storage names in index order.
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone)]
pub struct Column {
    property_name: String,
    name: String,
    kind: ValueKind,
    nullable: bool,
    primary_key: bool,
    auto_increment: bool,
    collation: Option<Collation>,
    indices: Vec<IndexMembership>,
    computed: Option<ComputedColumn>,
    max_length: Option<u32>,
    default: Option<String>,
}

impl Column {
    #[must_use]
    pub fn property_name(&self) -> &str {
        &self.property_name
    }

    /// Storage name used in SQL.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    #[must_use]
    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    #[must_use]
    pub fn is_auto_increment(&self) -> bool {
        self.auto_increment
    }

    #[must_use]
    pub fn collation(&self) -> Option<Collation> {
        self.collation
    }

    #[must_use]
    pub fn indices(&self) -> &[IndexMembership] {
        &self.indices
    }

    #[must_use]
    pub fn computed(&self) -> Option<&ComputedColumn> {
        self.computed.as_ref()
    }

    #[must_use]
    pub fn is_computed(&self) -> bool {
        self.computed.is_some()
    }

    #[must_use]
    pub fn max_length(&self) -> Option<u32> {
        self.max_length
    }

    #[must_use]
    pub fn default_value(&self) -> Option<&str> {
        self.default.as_deref()
    }
}

/// Immutable description of how an entity maps onto a table.
#[derive(Debug, Clone)]
pub struct TableMapping {
    table_name: String,
    columns: Vec<Column>,
    primary_key: Option<usize>,
    without_rowid: bool,
    indices: Vec<IndexDescription>,
}

impl TableMapping {
    /// Validate `spec` and build the mapping.
    ///
    /// # Errors
    /// Returns [`MapperError::Schema`] when the declared shape cannot be mapped.
    pub fn build(spec: TableSpec, flags: CreateFlags) -> Result<Self, MapperError> {
        let table_name = spec.name;
        let mut specs: Vec<ColumnSpec> = spec.columns.into_iter().filter(|c| !c.ignored).collect();
        if specs.is_empty() {
            return Err(MapperError::Schema(format!(
                "{table_name} has no mappable columns"
            )));
        }

        let explicit_pk = specs.iter().filter(|c| c.primary_key).count();
        if explicit_pk > 1 {
            return Err(MapperError::Schema(format!(
                "{table_name} declares {explicit_pk} primary keys; at most one is supported"
            )));
        }
        if explicit_pk == 0
            && flags.contains(CreateFlags::IMPLICIT_PK)
            && let Some(id) = specs
                .iter_mut()
                .find(|c| c.property.eq_ignore_ascii_case("id") && c.computed.is_none())
        {
            id.primary_key = true;
        }
        if flags.contains(CreateFlags::AUTO_INC_PK)
            && let Some(pk) = specs.iter_mut().find(|c| c.primary_key)
            && pk.kind == ValueKind::Integer
        {
            pk.auto_increment = true;
        }
        if flags.contains(CreateFlags::IMPLICIT_INDEX) {
            for spec in &mut specs {
                let implicit = !spec.primary_key
                    && spec.property.len() > 2
                    && spec.property.to_ascii_lowercase().ends_with("id")
                    && spec.indices.is_empty();
                if implicit {
                    spec.indices.push(super::spec::IndexSpec {
                        name: None,
                        order: 0,
                        unique: false,
                    });
                }
            }
        }

        let mut columns = Vec::with_capacity(specs.len());
        for spec in specs {
            columns.push(column_from_spec(&table_name, spec)?);
        }

        let mut seen: HashMap<String, &str> = HashMap::new();
        for column in &columns {
            if let Some(previous) = seen.insert(column.name.to_ascii_lowercase(), &column.property_name) {
                return Err(MapperError::Schema(format!(
                    "{table_name}: properties {previous} and {} share the column name {}",
                    column.property_name, column.name
                )));
            }
        }

        let primary_key = columns.iter().position(|c| c.primary_key);
        if spec.without_rowid {
            match primary_key.map(|i| &columns[i]) {
                None => {
                    return Err(MapperError::Schema(format!(
                        "{table_name} is WITHOUT ROWID but has no primary key"
                    )));
                }
                Some(pk) if pk.auto_increment => {
                    return Err(MapperError::Schema(format!(
                        "{table_name} is WITHOUT ROWID; {} cannot be autoincrement",
                        pk.property_name
                    )));
                }
                Some(_) => {}
            }
        }

        let indices = collect_indices(&table_name, &columns)?;
        Ok(Self {
            table_name,
            columns,
            primary_key,
            without_rowid: spec.without_rowid,
            indices,
        })
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn primary_key(&self) -> Option<&Column> {
        self.primary_key.map(|i| &self.columns[i])
    }

    #[must_use]
    pub fn without_rowid(&self) -> bool {
        self.without_rowid
    }

    #[must_use]
    pub fn indices(&self) -> &[IndexDescription] {
        &self.indices
    }

    #[must_use]
    pub fn find_column_by_property(&self, property: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.property_name == property)
    }

    /// Storage names compare case-insensitively, as SQLite does.
    #[must_use]
    pub fn find_column_by_storage_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Columns written by INSERT. The autoincrement key is left to the engine unless `replace`.
    pub(crate) fn insert_columns(&self, replace: bool) -> impl Iterator<Item = &Column> {
        self.columns
            .iter()
            .filter(move |c| !c.is_computed() && (replace || !c.auto_increment))
    }

    /// Columns assigned by UPDATE: everything writable except the key.
    pub(crate) fn update_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.is_computed() && !c.primary_key)
    }
}

fn column_from_spec(table: &str, spec: ColumnSpec) -> Result<Column, MapperError> {
    let ColumnSpec {
        property,
        storage_name,
        kind,
        primary_key,
        auto_increment,
        indices,
        not_null,
        collation,
        computed,
        ignored: _,
        max_length,
        default,
    } = spec;

    if auto_increment && !primary_key {
        return Err(MapperError::Schema(format!(
            "{table}.{property}: autoincrement requires a primary key"
        )));
    }
    if auto_increment && kind != ValueKind::Integer {
        return Err(MapperError::Schema(format!(
            "{table}.{property}: autoincrement requires an integer column"
        )));
    }
    if primary_key && computed.is_some() {
        return Err(MapperError::Schema(format!(
            "{table}.{property}: a computed column cannot be the primary key"
        )));
    }
    if computed.is_some() && default.is_some() {
        return Err(MapperError::Schema(format!(
            "{table}.{property}: a computed column cannot have a default"
        )));
    }

    let name = storage_name.unwrap_or_else(|| property.clone());
    let indices = indices
        .into_iter()
        .map(|index| IndexMembership {
            name: index.name.unwrap_or_else(|| format!("{table}_{name}")),
            order: index.order,
            unique: index.unique,
        })
        .collect();

    Ok(Column {
        property_name: property,
        name,
        kind,
        nullable: !(primary_key || not_null),
        primary_key,
        auto_increment,
        collation,
        indices,
        computed: computed.map(|(expression, kind)| ComputedColumn { expression, kind }),
        max_length,
        default,
    })
}

fn collect_indices(table: &str, columns: &[Column]) -> Result<Vec<IndexDescription>, MapperError> {
    let mut indices: Vec<(IndexDescription, Vec<i32>)> = Vec::new();
    for column in columns {
        for membership in &column.indices {
            match indices.iter_mut().find(|(d, _)| d.name == membership.name) {
                Some((description, orders)) => {
                    if description.unique != membership.unique {
                        return Err(MapperError::Schema(format!(
                            "{table}: index {} is declared both unique and non-unique",
                            membership.name
                        )));
                    }
                    description.columns.push(column.name.clone());
                    orders.push(membership.order);
                }
                None => indices.push((
                    IndexDescription {
                        name: membership.name.clone(),
                        columns: vec![column.name.clone()],
                        unique: membership.unique,
                    },
                    vec![membership.order],
                )),
            }
        }
    }

    Ok(indices
        .into_iter()
        .map(|(mut description, orders)| {
            let mut ordered: Vec<(i32, String)> = orders.into_iter().zip(description.columns).collect();
            ordered.sort_by_key(|(order, _)| *order);
            description.columns = ordered.into_iter().map(|(_, name)| name).collect();
            description
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::spec::ColumnSpec;

    fn person() -> TableSpec {
        TableSpec::new("Person")
            .column(ColumnSpec::of::<i64>("Id"))
            .column(ColumnSpec::of::<String>("FirstName").indexed_as("name_idx", 2))
            .column(ColumnSpec::of::<String>("LastName").indexed_as("name_idx", 1))
            .column(ColumnSpec::of::<i64>("CompanyId"))
            .column(ColumnSpec::of::<String>("Scratch").ignore())
    }

    #[test]
    fn ignored_members_are_not_mapped() {
        let mapping = TableMapping::build(person(), CreateFlags::NONE).expect("valid");
        assert_eq!(mapping.columns().len(), 4);
        assert!(mapping.find_column_by_property("Scratch").is_none());
        assert!(mapping.primary_key().is_none());
    }

    #[test]
    fn implicit_flags_are_opt_in() {
        let mapping = TableMapping::build(person(), CreateFlags::ALL_IMPLICIT).expect("valid");
        let pk = mapping.primary_key().expect("implicit pk");
        assert_eq!(pk.property_name(), "Id");
        assert!(pk.is_auto_increment());
        assert!(!pk.is_nullable());
        let company = mapping.find_column_by_property("CompanyId").expect("column");
        assert_eq!(company.indices()[0].name, "Person_CompanyId");
    }

    #[test]
    fn multi_column_index_follows_declared_order() {
        let mapping = TableMapping::build(person(), CreateFlags::NONE).expect("valid");
        let index = &mapping.indices()[0];
        assert_eq!(index.name, "name_idx");
        assert_eq!(index.columns, vec!["LastName".to_owned(), "FirstName".to_owned()]);
        assert!(!index.unique);
    }

    #[test]
    fn storage_name_lookup_is_case_insensitive() {
        let spec = TableSpec::new("T").column(ColumnSpec::of::<String>("Email").named("email_address"));
        let mapping = TableMapping::build(spec, CreateFlags::NONE).expect("valid");
        let column = mapping.find_column_by_storage_name("EMAIL_ADDRESS").expect("column");
        assert_eq!(column.property_name(), "Email");
    }

    #[test]
    fn rejects_invalid_shapes() {
        let cases = vec![
            TableSpec::new("Empty").column(ColumnSpec::of::<i64>("A").ignore()),
            TableSpec::new("TwoKeys")
                .column(ColumnSpec::of::<i64>("A").primary_key())
                .column(ColumnSpec::of::<i64>("B").primary_key()),
            TableSpec::new("TextAuto").column(ColumnSpec::of::<String>("A").primary_key().auto_increment()),
            TableSpec::new("AutoNoKey").column(ColumnSpec::of::<i64>("A").auto_increment()),
            TableSpec::new("ComputedKey").column(
                ColumnSpec::of::<i64>("A")
                    .primary_key()
                    .computed("1 + 1", ComputedKind::Virtual),
            ),
            TableSpec::new("NoRowidNoKey")
                .column(ColumnSpec::of::<i64>("A"))
                .without_rowid(),
            TableSpec::new("NoRowidAuto")
                .column(ColumnSpec::of::<i64>("A").primary_key().auto_increment())
                .without_rowid(),
            TableSpec::new("MixedIndex")
                .column(ColumnSpec::of::<i64>("A").indexed_as("ix", 0))
                .column(ColumnSpec::of::<i64>("B").unique_as("ix", 1)),
            TableSpec::new("SameName")
                .column(ColumnSpec::of::<i64>("A"))
                .column(ColumnSpec::of::<i64>("B").named("a")),
        ];
        for spec in cases {
            let name = spec.name().to_owned();
            let err = TableMapping::build(spec, CreateFlags::NONE).unwrap_err();
            assert!(matches!(err, MapperError::Schema(_)), "{name}: {err:?}");
        }
    }
}
