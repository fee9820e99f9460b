use crate::marshal::MarshalOptions;
use crate::types::ValueKind;

use super::mapping::{Column, IndexDescription, TableMapping};
use super::spec::ComputedKind;

/// Quote an identifier for SQL text.
pub(crate) fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn declared_type(column: &Column, options: &MarshalOptions) -> String {
    let max_length = match column.kind() {
        ValueKind::Text | ValueKind::Json | ValueKind::Enum { as_text: true, .. } => {
            column.max_length()
        }
        _ => None,
    };
    options.declared_type(column.kind(), max_length)
}

/// Full column definition as used by CREATE TABLE and ADD COLUMN.
pub(crate) fn column_definition(column: &Column, options: &MarshalOptions) -> String {
    let mut sql = format!("{} {}", quote(column.name()), declared_type(column, options));
    if column.is_primary_key() {
        sql.push_str(" PRIMARY KEY");
        if column.is_auto_increment() {
            sql.push_str(" AUTOINCREMENT");
        }
    }
    if !column.is_nullable() {
        sql.push_str(" NOT NULL");
    }
    if let Some(collation) = column.collation() {
        sql.push_str(" COLLATE ");
        sql.push_str(collation.as_sql());
    }
    if let Some(default) = column.default_value() {
        sql.push_str(&format!(" DEFAULT ({default})"));
    }
    if let Some(computed) = column.computed() {
        let storage = match computed.kind {
            ComputedKind::Virtual => "VIRTUAL",
            ComputedKind::Stored => "STORED",
        };
        sql.push_str(&format!(
            " GENERATED ALWAYS AS ({}) {storage}",
            computed.expression
        ));
    }
    sql
}

pub(crate) fn create_table(mapping: &TableMapping, options: &MarshalOptions) -> String {
    let columns: Vec<String> = mapping
        .columns()
        .iter()
        .map(|c| column_definition(c, options))
        .collect();
    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        quote(mapping.table_name()),
        columns.join(",\n")
    );
    if mapping.without_rowid() {
        sql.push_str(" WITHOUT ROWID");
    }
    sql
}

pub(crate) fn create_index(table: &str, index: &IndexDescription) -> String {
    let columns: Vec<String> = index.columns.iter().map(|c| quote(c)).collect();
    format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {}({})",
        if index.unique { "UNIQUE " } else { "" },
        quote(&index.name),
        quote(table),
        columns.join(", ")
    )
}

/// ADD COLUMN for a column missing from the live table.
///
/// A NOT NULL column without a declared default gets its affinity's zero value so that rows
/// already in the table stay valid.
pub(crate) fn add_column(table: &str, column: &Column, options: &MarshalOptions) -> String {
    let mut definition = column_definition(column, options);
    if !column.is_nullable() && column.default_value().is_none() && !column.is_computed() {
        definition.push_str(" DEFAULT ");
        definition.push_str(options.affinity(column.kind()).zero_literal());
    }
    format!("ALTER TABLE {} ADD COLUMN {definition}", quote(table))
}

pub(crate) fn drop_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Collation, ColumnSpec, CreateFlags, TableSpec};

    fn mapping(spec: TableSpec) -> TableMapping {
        TableMapping::build(spec, CreateFlags::NONE).expect("valid mapping")
    }

    #[test]
    fn create_table_covers_column_clauses() {
        let m = mapping(
            TableSpec::new("Order")
                .column(ColumnSpec::of::<i64>("Id").primary_key().auto_increment())
                .column(ColumnSpec::of::<String>("Code").not_null().collation(Collation::NoCase).max_length(12))
                .column(ColumnSpec::of::<f64>("Price"))
                .column(ColumnSpec::of::<i64>("Qty").default("1"))
                .column(
                    ColumnSpec::of::<f64>("Total")
                        .computed("Price * Qty", ComputedKind::Stored),
                ),
        );
        let sql = create_table(&m, &MarshalOptions::default());
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"Order\" ("));
        assert!(sql.contains("\"Id\" integer PRIMARY KEY AUTOINCREMENT NOT NULL"));
        assert!(sql.contains("\"Code\" varchar(12) NOT NULL COLLATE NOCASE"));
        assert!(sql.contains("\"Price\" float"));
        assert!(sql.contains("\"Qty\" integer DEFAULT (1)"));
        assert!(sql.contains("\"Total\" float GENERATED ALWAYS AS (Price * Qty) STORED"));
        assert!(!sql.contains("WITHOUT ROWID"));
    }

    #[test]
    fn without_rowid_suffix() {
        let m = mapping(
            TableSpec::new("Kv")
                .column(ColumnSpec::of::<String>("Key").primary_key())
                .without_rowid(),
        );
        assert!(create_table(&m, &MarshalOptions::default()).ends_with(") WITHOUT ROWID"));
    }

    #[test]
    fn unique_multi_column_index() {
        let index = IndexDescription {
            name: "ux".into(),
            columns: vec!["A".into(), "B".into()],
            unique: true,
        };
        assert_eq!(
            create_index("T", &index),
            "CREATE UNIQUE INDEX IF NOT EXISTS \"ux\" ON \"T\"(\"A\", \"B\")"
        );
    }

    #[test]
    fn not_null_add_column_gets_zero_default() {
        let m = mapping(
            TableSpec::new("T")
                .column(ColumnSpec::of::<String>("Name").not_null())
                .column(ColumnSpec::of::<String>("Note")),
        );
        let options = MarshalOptions::default();
        assert_eq!(
            add_column("T", &m.columns()[0], &options),
            "ALTER TABLE \"T\" ADD COLUMN \"Name\" varchar NOT NULL DEFAULT ''"
        );
        assert_eq!(
            add_column("T", &m.columns()[1], &options),
            "ALTER TABLE \"T\" ADD COLUMN \"Note\" varchar"
        );
    }

    #[test]
    fn identifiers_are_escaped() {
        assert_eq!(quote("we\"ird"), "\"we\"\"ird\"");
    }
}
