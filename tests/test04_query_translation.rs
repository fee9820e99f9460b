use sqlite_mapper::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct Person {
    id: i64,
    first_name: String,
    last_name: Option<String>,
    age: i64,
}

impl Person {
    fn new(first_name: &str, age: i64) -> Self {
        Self {
            id: 0,
            first_name: first_name.to_owned(),
            last_name: None,
            age,
        }
    }
}

impl Entity for Person {
    fn describe() -> TableSpec {
        TableSpec::for_type::<Self>()
            .column(ColumnSpec::of::<i64>("Id").primary_key().auto_increment())
            .column(ColumnSpec::of::<String>("FirstName").named("first_name").not_null())
            .column(ColumnSpec::of::<Option<String>>("LastName"))
            .column(ColumnSpec::of::<i64>("Age").not_null())
    }

    fn to_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("Id", self.id.into_value()),
            ("FirstName", self.first_name.clone().into_value()),
            ("LastName", self.last_name.clone().into_value()),
            ("Age", self.age.into_value()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, MapperError> {
        Ok(Self {
            id: row.get("Id")?,
            first_name: row.get("FirstName")?,
            last_name: row.get("LastName")?,
            age: row.get("Age")?,
        })
    }

    fn set_auto_id(&mut self, id: i64) {
        self.id = id;
    }
}

fn with_people(names: &[&str]) -> Result<Connection, MapperError> {
    let mut conn = Connection::open_in_memory()?;
    conn.create_table::<Person>(CreateFlags::NONE)?;
    let mut people: Vec<Person> = names
        .iter()
        .enumerate()
        .map(|(i, name)| Person::new(name, i64::try_from(i).unwrap_or_default() * 10))
        .collect();
    conn.insert_all(&mut people)?;
    Ok(conn)
}

fn first_names(people: &[Person]) -> Vec<&str> {
    people.iter().map(|p| p.first_name.as_str()).collect()
}

#[test]
fn membership_matches_only_listed_values() -> Result<(), MapperError> {
    let conn = with_people(&["10", "x", "20"])?;
    let found = conn
        .table::<Person>()
        .filter(col("FirstName").is_in(["0", "10", "20"]))
        .order_by("FirstName")
        .to_vec()?;
    assert_eq!(first_names(&found), vec!["10", "20"]);

    let none = conn.table::<Person>().filter(col("FirstName").is_in(Vec::<String>::new()));
    assert_eq!(none.count()?, 0);
    Ok(())
}

#[test]
fn ordering_with_take_and_skip() -> Result<(), MapperError> {
    let names: Vec<String> = (0..10).map(|i| i.to_string()).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let conn = with_people(&refs)?;

    let first = conn.table::<Person>().order_by("FirstName").take(1).to_vec()?;
    assert_eq!(first_names(&first), vec!["0"]);

    let rest = conn.table::<Person>().order_by("FirstName").skip(5).to_vec()?;
    assert_eq!(first_names(&rest), vec!["5", "6", "7", "8", "9"]);

    // A filter after paging only sees the rows of that page.
    let paged = conn
        .table::<Person>()
        .order_by("FirstName")
        .skip(2)
        .filter(col("Age").ge(50))
        .take(2)
        .to_vec()?;
    assert_eq!(first_names(&paged), vec!["5", "6"]);
    let outside_page = conn
        .table::<Person>()
        .order_by("FirstName")
        .take(2)
        .filter(col("FirstName").ge("5"));
    assert!(outside_page.to_vec()?.is_empty());
    assert_eq!(outside_page.count()?, 0);
    let inside_page = conn
        .table::<Person>()
        .order_by("FirstName")
        .take(4)
        .filter(col("Age").ge(20));
    assert_eq!(first_names(&inside_page.to_vec()?), vec!["2", "3"]);
    assert_eq!(inside_page.sum::<i64>("Age")?, 50);

    let everything = conn.table::<Person>().order_by("FirstName").skip(8).take(u64::MAX).to_vec()?;
    assert_eq!(first_names(&everything), vec!["8", "9"]);

    assert_eq!(conn.table::<Person>().order_by_desc("Age").first()?.first_name, "9");
    assert_eq!(conn.table::<Person>().order_by("FirstName").element_at(3)?.first_name, "3");
    assert!(
        conn.table::<Person>()
            .take(2)
            .element_at_or_none(2)?
            .is_none()
    );
    Ok(())
}

#[test]
fn numeric_ordering_of_text() -> Result<(), MapperError> {
    let conn = with_people(&["9", "10", "100", "2"])?;
    let lexical = conn.table::<Person>().order_by("FirstName").to_vec()?;
    assert_eq!(first_names(&lexical), vec!["10", "100", "2", "9"]);
    let numeric = conn.table::<Person>().order_by_numeric_desc("FirstName").to_vec()?;
    assert_eq!(first_names(&numeric), vec!["100", "10", "9", "2"]);
    Ok(())
}

#[test]
fn string_matching_and_null_comparisons() -> Result<(), MapperError> {
    let mut conn = with_people(&["Alice", "alan", "Bob", "50%_off"])?;
    let mut with_last = Person::new("Carl", 99);
    with_last.last_name = Some("Smith".into());
    conn.insert(&mut with_last)?;

    let people = conn.table::<Person>();
    assert_eq!(people.filter(col("FirstName").starts_with_ignore_case("AL")).count()?, 2);
    assert_eq!(conn.table::<Person>().filter(col("FirstName").ends_with("ob")).count()?, 1);
    assert_eq!(conn.table::<Person>().filter(col("FirstName").contains("%_")).count()?, 1);
    assert_eq!(conn.table::<Person>().filter(col("FirstName").contains_ignore_case("LIC")).count()?, 1);

    assert_eq!(conn.table::<Person>().filter(col("LastName").eq(Value::Null)).count()?, 4);
    assert_eq!(conn.table::<Person>().filter(col("LastName").ne(Value::Null)).count()?, 1);
    assert_eq!(
        conn.table::<Person>()
            .filter(!(col("LastName").is_null().or(col("Age").eq(99))))
            .count()?,
        0
    );
    assert_eq!(conn.table::<Person>().filter(!col("LastName").is_null()).count()?, 1);
    assert_eq!(
        conn.table::<Person>().filter(col("Age").lt(20).or(col("Age").gt(90))).count()?,
        3
    );
    Ok(())
}

#[test]
fn aggregates_and_projection() -> Result<(), MapperError> {
    let conn = with_people(&["a", "b", "c", "d"])?;
    let people = conn.table::<Person>();
    assert_eq!(people.sum::<i64>("Age")?, 60);
    assert_eq!(conn.table::<Person>().average("Age")?, Some(15.0));
    assert_eq!(conn.table::<Person>().min::<i64>("Age")?, Some(0));
    assert_eq!(conn.table::<Person>().max::<String>("FirstName")?, Some("d".to_owned()));
    assert_eq!(conn.table::<Person>().take(2).sum::<i64>("Age")?, 10);
    assert!(conn.table::<Person>().filter(col("Age").eq(30)).exists()?);
    assert!(!conn.table::<Person>().filter(col("Age").eq(31)).exists()?);
    assert_eq!(conn.table::<Person>().filter(col("Age").gt(100)).sum::<i64>("Age")?, 0);
    assert_eq!(conn.table::<Person>().filter(col("Age").gt(100)).max::<i64>("Age")?, None);

    let projected = conn
        .table::<Person>()
        .filter(col("Age").ge(20))
        .order_by("Age")
        .project(&["FirstName", "Age"])?;
    assert_eq!(projected.len(), 2);
    let row = &projected.results[0];
    assert_eq!(row.get::<String>("FirstName")?, "c");
    assert_eq!(row.get::<i64>("Age")?, 20);
    Ok(())
}

#[test]
fn queries_are_deferred_and_rerun() -> Result<(), MapperError> {
    let conn = with_people(&["a"])?;
    let adults = Query::<Person>::new().filter(col("Age").ge(0));
    assert_eq!(conn.table_with(adults.clone()).count()?, 1);
    let mut late = Person::new("b", 5);
    conn.insert(&mut late)?;
    assert_eq!(conn.table_with(adults).count()?, 2);
    Ok(())
}

#[test]
fn bulk_delete_and_unknown_properties() -> Result<(), MapperError> {
    let conn = with_people(&["a", "b", "c"])?;
    let removed = conn.table::<Person>().filter(col("Age").ge(10)).delete()?;
    assert_eq!(removed, 2);
    assert_eq!(conn.table::<Person>().count()?, 1);

    let err = conn.table::<Person>().delete().unwrap_err();
    assert!(matches!(err, MapperError::InvalidOperation(_)));
    let err = conn.table::<Person>().filter(Predicate::always()).take(1).delete().unwrap_err();
    assert!(matches!(err, MapperError::InvalidOperation(_)));

    let err = conn.table::<Person>().filter(col("Nope").eq(1)).to_vec().unwrap_err();
    assert!(matches!(err, MapperError::InvalidOperation(_)));

    // Storage names resolve as well as property names.
    assert_eq!(conn.table::<Person>().filter(col("first_name").eq("a")).count()?, 1);

    assert_eq!(conn.table::<Person>().filter(Predicate::always()).delete()?, 1);
    assert_eq!(conn.table::<Person>().count()?, 0);
    Ok(())
}

#[test]
fn raw_queries_map_by_column_name() -> Result<(), MapperError> {
    let conn = with_people(&["a", "b"])?;
    let people: Vec<Person> = conn.query_as(
        r#"SELECT "Id", "first_name", "LastName", "Age" FROM "Person" WHERE "Age" > ?"#,
        &[Value::Int(0)],
    )?;
    assert_eq!(first_names(&people), vec!["b"]);

    let changed = conn.execute(r#"UPDATE "Person" SET "Age" = "Age" + 1"#, &[])?;
    assert_eq!(changed, 2);
    let total: i64 = conn.execute_scalar(r#"SELECT sum("Age") FROM "Person""#, &[])?;
    assert_eq!(total, 12);
    let missing: Option<i64> = conn.execute_scalar(r#"SELECT "Age" FROM "Person" WHERE "Age" > 100"#, &[])?;
    assert_eq!(missing, None);
    Ok(())
}
