use crate::error::MapperError;
use crate::marshal::{MarshalOptions, to_storage_cell};
use crate::schema::ddl::quote;
use crate::schema::{Column, TableMapping};
use crate::types::{Cell, Value};

use super::QueryParts;
use super::expr::{Aggregate, CompareOp, Predicate, StringMatch};

/// SQL text plus its positional parameters, already in storage form.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Statement {
    pub(crate) sql: String,
    pub(crate) params: Vec<Cell>,
}

struct Translator<'m, 'o> {
    mapping: &'m TableMapping,
    options: &'o MarshalOptions,
    params: Vec<Cell>,
}

/// LIMIT/OFFSET literal; SQLite takes signed 64-bit values.
fn page_literal(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

fn all_columns(mapping: &TableMapping) -> String {
    let columns: Vec<String> = mapping.columns().iter().map(|c| quote(c.name())).collect();
    columns.join(", ")
}

impl<'m, 'o> Translator<'m, 'o> {
    fn new(mapping: &'m TableMapping, options: &'o MarshalOptions) -> Self {
        Self {
            mapping,
            options,
            params: Vec::new(),
        }
    }

    fn finish(self, sql: String) -> Statement {
        Statement {
            sql,
            params: self.params,
        }
    }

    fn column(&self, property: &str) -> Result<&'m Column, MapperError> {
        self.mapping
            .find_column_by_property(property)
            .or_else(|| self.mapping.find_column_by_storage_name(property))
            .ok_or_else(|| {
                MapperError::InvalidOperation(format!(
                    "{} has no mapped property {property}",
                    self.mapping.table_name()
                ))
            })
    }

    fn bind(&mut self, column: &Column, value: &Value) -> Result<(), MapperError> {
        self.params
            .push(to_storage_cell(value, column.kind(), self.options)?);
        Ok(())
    }

    fn predicate(&mut self, predicate: &Predicate, out: &mut String) -> Result<(), MapperError> {
        match predicate {
            Predicate::Compare { column, op, value } => {
                let column = self.column(column)?;
                let name = quote(column.name());
                match (op, value) {
                    (CompareOp::Eq, Value::Null) => out.push_str(&format!("{name} IS NULL")),
                    (CompareOp::Ne, Value::Null) => out.push_str(&format!("{name} IS NOT NULL")),
                    _ => {
                        out.push_str(&format!("{name} {} ?", op.as_sql()));
                        self.bind(column, value)?;
                    }
                }
            }
            Predicate::IsNull(column) => {
                let column = self.column(column)?;
                out.push_str(&format!("{} IS NULL", quote(column.name())));
            }
            Predicate::IsNotNull(column) => {
                let column = self.column(column)?;
                out.push_str(&format!("{} IS NOT NULL", quote(column.name())));
            }
            Predicate::Match {
                column,
                kind,
                value,
                ignore_case,
            } => {
                let column = self.column(column)?;
                let name = quote(column.name());
                if *ignore_case {
                    self.match_ignore_case(&name, *kind, value, out);
                } else {
                    let escaped = escape_like(value);
                    let pattern = match kind {
                        StringMatch::Contains => format!("%{escaped}%"),
                        StringMatch::StartsWith => format!("{escaped}%"),
                        StringMatch::EndsWith => format!("%{escaped}"),
                    };
                    out.push_str(&format!("{name} LIKE ? ESCAPE '\\'"));
                    self.params.push(Cell::Text(pattern));
                }
            }
            Predicate::In { column, values } => {
                let column = self.column(column)?;
                if values.is_empty() {
                    out.push('0');
                } else {
                    let placeholders = vec!["?"; values.len()].join(", ");
                    out.push_str(&format!("{} IN ({placeholders})", quote(column.name())));
                    for value in values {
                        self.bind(column, value)?;
                    }
                }
            }
            Predicate::And(left, right) => self.binary("AND", left, right, out)?,
            Predicate::Or(left, right) => self.binary("OR", left, right, out)?,
            Predicate::Not(inner) => {
                out.push_str("NOT (");
                self.predicate(inner, out)?;
                out.push(')');
            }
            Predicate::Literal(value) => out.push(if *value { '1' } else { '0' }),
        }
        Ok(())
    }

    fn binary(
        &mut self,
        op: &str,
        left: &Predicate,
        right: &Predicate,
        out: &mut String,
    ) -> Result<(), MapperError> {
        out.push('(');
        self.predicate(left, out)?;
        out.push_str(&format!(" {op} "));
        self.predicate(right, out)?;
        out.push(')');
        Ok(())
    }

    fn match_ignore_case(&mut self, name: &str, kind: StringMatch, value: &str, out: &mut String) {
        let length = value.chars().count();
        match kind {
            StringMatch::Contains => {
                out.push_str(&format!("instr(lower({name}), lower(?)) > 0"));
            }
            _ if length == 0 => {
                out.push_str(&format!("{name} IS NOT NULL"));
                return;
            }
            StringMatch::StartsWith => {
                out.push_str(&format!("substr({name}, 1, {length}) = ? COLLATE NOCASE"));
            }
            StringMatch::EndsWith => {
                out.push_str(&format!("substr({name}, -{length}) = ? COLLATE NOCASE"));
            }
        }
        self.params.push(Cell::Text(value.to_owned()));
    }

    /// `FROM`, `WHERE`, `ORDER BY` and paging clauses after `select_list`.
    fn select(&mut self, parts: &QueryParts, select_list: &str, ordered: bool) -> Result<String, MapperError> {
        let from = match &parts.source {
            Some(source) => format!("({})", self.select(source, &all_columns(self.mapping), true)?),
            None => quote(self.mapping.table_name()),
        };
        let mut sql = format!("SELECT {select_list} FROM {from}");
        if let Some(filter) = &parts.filter {
            sql.push_str(" WHERE ");
            self.predicate(filter, &mut sql)?;
        }
        if ordered && !parts.order.is_empty() {
            let mut terms = Vec::with_capacity(parts.order.len());
            for term in &parts.order {
                let name = quote(self.column(&term.column)?.name());
                let expr = if term.numeric {
                    format!("CAST({name} AS REAL)")
                } else {
                    name
                };
                terms.push(if term.descending {
                    format!("{expr} DESC")
                } else {
                    expr
                });
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }
        match (parts.take.map(page_literal), parts.skip.map(page_literal)) {
            (Some(take), Some(skip)) => sql.push_str(&format!(" LIMIT {take} OFFSET {skip}")),
            (Some(take), None) => sql.push_str(&format!(" LIMIT {take}")),
            (None, Some(skip)) => sql.push_str(&format!(" LIMIT -1 OFFSET {skip}")),
            (None, None) => {}
        }
        Ok(sql)
    }
}

pub(crate) fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// SELECT of every mapped column, in mapping order.
pub(crate) fn select(
    parts: &QueryParts,
    mapping: &TableMapping,
    options: &MarshalOptions,
) -> Result<Statement, MapperError> {
    let mut translator = Translator::new(mapping, options);
    let sql = translator.select(parts, &all_columns(mapping), true)?;
    Ok(translator.finish(sql))
}

/// SELECT of the given properties; returns the resolved columns alongside.
pub(crate) fn project<'m>(
    parts: &QueryParts,
    properties: &[&str],
    mapping: &'m TableMapping,
    options: &MarshalOptions,
) -> Result<(Statement, Vec<&'m Column>), MapperError> {
    let mut translator = Translator::new(mapping, options);
    let columns = properties
        .iter()
        .map(|p| translator.column(p))
        .collect::<Result<Vec<_>, _>>()?;
    if columns.is_empty() {
        return Err(MapperError::InvalidOperation(
            "a projection needs at least one column".into(),
        ));
    }
    let list: Vec<String> = columns.iter().map(|c| quote(c.name())).collect();
    let sql = translator.select(parts, &list.join(", "), true)?;
    Ok((translator.finish(sql), columns))
}

pub(crate) fn aggregate(
    parts: &QueryParts,
    aggregate: &Aggregate,
    mapping: &TableMapping,
    options: &MarshalOptions,
) -> Result<Statement, MapperError> {
    let mut translator = Translator::new(mapping, options);
    let target = match aggregate.column() {
        Some(property) => Some(quote(translator.column(property)?.name())),
        None => None,
    };
    let function = |arg: &str| match aggregate {
        Aggregate::Count => "COUNT(*)".to_owned(),
        Aggregate::Sum(_) => format!("SUM({arg})"),
        Aggregate::Average(_) => format!("AVG({arg})"),
        Aggregate::Min(_) => format!("MIN({arg})"),
        Aggregate::Max(_) => format!("MAX({arg})"),
        Aggregate::Exists => String::new(),
    };
    let arg = target.unwrap_or_else(|| "1".to_owned());

    let sql = if *aggregate == Aggregate::Exists {
        let inner = translator.select(parts, "1", parts.is_paged())?;
        format!("SELECT EXISTS({inner})")
    } else if parts.is_paged() {
        let inner = translator.select(parts, &arg, true)?;
        format!("SELECT {} FROM ({inner})", function(&arg))
    } else {
        translator.select(parts, &function(&arg), false)?
    };
    Ok(translator.finish(sql))
}

/// DELETE for the query's predicate.
///
/// # Errors
/// Returns [`MapperError::InvalidOperation`] when the query is paged or has no predicate.
pub(crate) fn delete(
    parts: &QueryParts,
    mapping: &TableMapping,
    options: &MarshalOptions,
) -> Result<Statement, MapperError> {
    if parts.is_paged() || parts.source.is_some() {
        return Err(MapperError::InvalidOperation(
            "a bulk delete cannot be combined with skip or take".into(),
        ));
    }
    let Some(filter) = &parts.filter else {
        return Err(MapperError::InvalidOperation(
            "a bulk delete needs a predicate; filter with Predicate::always() to delete every row"
                .into(),
        ));
    };
    let mut translator = Translator::new(mapping, options);
    let mut sql = format!("DELETE FROM {} WHERE ", quote(mapping.table_name()));
    translator.predicate(filter, &mut sql)?;
    Ok(translator.finish(sql))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Composable, Query, col};
    use crate::schema::{ColumnSpec, CreateFlags, TableSpec};

    struct Person;

    fn mapping() -> TableMapping {
        TableMapping::build(
            TableSpec::new("Person")
                .column(ColumnSpec::of::<i64>("Id").primary_key())
                .column(ColumnSpec::of::<String>("FirstName").named("first_name"))
                .column(ColumnSpec::of::<bool>("Active"))
                .column(ColumnSpec::of::<String>("Code")),
            CreateFlags::NONE,
        )
        .expect("valid mapping")
    }

    fn sql_of(query: Query<Person>) -> Statement {
        select(&query.parts, &mapping(), &MarshalOptions::default()).expect("translates")
    }

    #[test]
    fn comparison_uses_positional_parameters() {
        let stmt = sql_of(Query::new().filter(col("FirstName").eq("Ann").and(col("Active").eq(true))));
        assert_eq!(
            stmt.sql,
            "SELECT \"Id\", \"first_name\", \"Active\", \"Code\" FROM \"Person\" \
             WHERE (\"first_name\" = ? AND \"Active\" = ?)"
        );
        assert_eq!(stmt.params, vec![Cell::Text("Ann".into()), Cell::Integer(1)]);
    }

    #[test]
    fn null_comparison_becomes_is_null() {
        let stmt = sql_of(Query::new().filter(col("Code").ne(None::<String>)));
        assert!(stmt.sql.ends_with("WHERE \"Code\" IS NOT NULL"));
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn negated_prefix_match_translates() {
        let stmt = sql_of(Query::new().filter(!col("Code").starts_with("a_%")));
        assert!(stmt.sql.ends_with("WHERE NOT (\"Code\" LIKE ? ESCAPE '\\')"));
        assert_eq!(stmt.params, vec![Cell::Text("a\\_\\%%".into())]);
    }

    #[test]
    fn case_insensitive_matches_avoid_patterns() {
        let stmt = sql_of(Query::new().filter(col("Code").ends_with_ignore_case("Xy")));
        assert!(stmt.sql.ends_with("WHERE substr(\"Code\", -2) = ? COLLATE NOCASE"));
        let stmt = sql_of(Query::new().filter(col("Code").contains_ignore_case("%")));
        assert!(stmt.sql.ends_with("WHERE instr(lower(\"Code\"), lower(?)) > 0"));
        assert_eq!(stmt.params, vec![Cell::Text("%".into())]);
    }

    #[test]
    fn set_membership() {
        let stmt = sql_of(Query::new().filter(col("Code").is_in(["0", "10", "20"])));
        assert!(stmt.sql.ends_with("WHERE \"Code\" IN (?, ?, ?)"));
        assert_eq!(stmt.params.len(), 3);
        let stmt = sql_of(Query::new().filter(col("Code").is_in(Vec::<String>::new())));
        assert!(stmt.sql.ends_with("WHERE 0"));
    }

    #[test]
    fn ordering_and_paging() {
        let stmt = sql_of(Query::new().order_by_numeric_desc("Code").order_by("Id").skip(5));
        assert!(stmt.sql.ends_with(
            "ORDER BY CAST(\"Code\" AS REAL) DESC, \"Id\" LIMIT -1 OFFSET 5"
        ));
        let stmt = sql_of(Query::new().order_by("FirstName").take(1));
        assert!(stmt.sql.ends_with("ORDER BY \"first_name\" LIMIT 1"));
    }

    #[test]
    fn unknown_property_is_invalid() {
        let err = select(
            &Query::<Person>::new().filter(col("Nope").eq(1)).parts,
            &mapping(),
            &MarshalOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MapperError::InvalidOperation(_)));
    }

    #[test]
    fn paged_count_uses_subquery() {
        let parts = Query::<Person>::new().take(3).parts;
        let stmt = aggregate(&parts, &Aggregate::Count, &mapping(), &MarshalOptions::default())
            .expect("translates");
        assert_eq!(
            stmt.sql,
            "SELECT COUNT(*) FROM (SELECT 1 FROM \"Person\" LIMIT 3)"
        );
        let stmt = aggregate(
            &Query::<Person>::new().parts,
            &Aggregate::Max("Id".into()),
            &mapping(),
            &MarshalOptions::default(),
        )
        .expect("translates");
        assert_eq!(stmt.sql, "SELECT MAX(\"Id\") FROM \"Person\"");
    }

    #[test]
    fn filter_after_paging_wraps_the_page() {
        let stmt = sql_of(
            Query::new()
                .order_by("FirstName")
                .take(2)
                .filter(col("FirstName").ge("5")),
        );
        assert_eq!(
            stmt.sql,
            "SELECT \"Id\", \"first_name\", \"Active\", \"Code\" FROM \
             (SELECT \"Id\", \"first_name\", \"Active\", \"Code\" FROM \"Person\" \
             ORDER BY \"first_name\" LIMIT 2) \
             WHERE \"first_name\" >= ? ORDER BY \"first_name\""
        );
        assert_eq!(stmt.params, vec![Cell::Text("5".into())]);

        let err = delete(
            &Query::<Person>::new().take(2).filter(Predicate::always()).parts,
            &mapping(),
            &MarshalOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MapperError::InvalidOperation(_)));
    }

    #[test]
    fn huge_page_sizes_are_clamped() {
        let stmt = sql_of(Query::new().skip(u64::MAX).take(u64::MAX));
        assert!(stmt.sql.ends_with(&format!("LIMIT {max} OFFSET {max}", max = i64::MAX)));
    }

    #[test]
    fn bulk_delete_guards() {
        let options = MarshalOptions::default();
        let err = delete(&Query::<Person>::new().parts, &mapping(), &options).unwrap_err();
        assert!(matches!(err, MapperError::InvalidOperation(_)));
        let err = delete(
            &Query::<Person>::new().filter(Predicate::always()).take(2).parts,
            &mapping(),
            &options,
        )
        .unwrap_err();
        assert!(matches!(err, MapperError::InvalidOperation(_)));
        let stmt = delete(
            &Query::<Person>::new().filter(Predicate::always()).parts,
            &mapping(),
            &options,
        )
        .expect("explicit predicate");
        assert_eq!(stmt.sql, "DELETE FROM \"Person\" WHERE 1");
    }
}
