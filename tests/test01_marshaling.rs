use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde_json::json;
use sqlite_mapper::marshal::{DateTimeStorage, GuidStorage, TimeSpanStorage, date_time_to_ticks};
use sqlite_mapper::prelude::*;
use uuid::Uuid;

stored_enum! {
    pub enum Level {
        Low = 1,
        Mid = 2,
        High = 3,
    }
}

stored_enum! {
    pub enum Shade: text {
        Red = 1,
        Crimson = 1,
        Green = 2,
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Sample {
    id: i64,
    key: Uuid,
    at: NaiveDateTime,
    span: TimeDelta,
    level: Level,
    shade: Shade,
    data: Vec<u8>,
    note: Option<String>,
    meta: serde_json::Value,
    flag: bool,
    ratio: f64,
}

impl Entity for Sample {
    fn describe() -> TableSpec {
        TableSpec::new("Sample")
            .column(ColumnSpec::of::<i64>("Id").primary_key().auto_increment())
            .column(ColumnSpec::of::<Uuid>("Key").not_null())
            .column(ColumnSpec::of::<NaiveDateTime>("At").not_null())
            .column(ColumnSpec::of::<TimeDelta>("Span").not_null())
            .column(ColumnSpec::of::<Level>("Level").not_null())
            .column(ColumnSpec::of::<Shade>("Shade").not_null())
            .column(ColumnSpec::of::<Vec<u8>>("Data"))
            .column(ColumnSpec::of::<Option<String>>("Note"))
            .column(ColumnSpec::of::<serde_json::Value>("Meta"))
            .column(ColumnSpec::of::<bool>("Flag").not_null())
            .column(ColumnSpec::of::<f64>("Ratio").not_null())
    }

    fn to_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("Id", self.id.into_value()),
            ("Key", self.key.into_value()),
            ("At", self.at.into_value()),
            ("Span", self.span.into_value()),
            ("Level", self.level.into_value()),
            ("Shade", self.shade.into_value()),
            ("Data", self.data.clone().into_value()),
            ("Note", self.note.clone().into_value()),
            ("Meta", self.meta.clone().into_value()),
            ("Flag", self.flag.into_value()),
            ("Ratio", self.ratio.into_value()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, MapperError> {
        Ok(Self {
            id: row.get("Id")?,
            key: row.get("Key")?,
            at: row.get("At")?,
            span: row.get("Span")?,
            level: row.get("Level")?,
            shade: row.get("Shade")?,
            data: row.get("Data")?,
            note: row.get("Note")?,
            meta: row.get("Meta")?,
            flag: row.get("Flag")?,
            ratio: row.get("Ratio")?,
        })
    }

    fn set_auto_id(&mut self, id: i64) {
        self.id = id;
    }
}

fn sample() -> Sample {
    Sample {
        id: 0,
        key: Uuid::parse_str("6f1c1d3e-8a4b-4c2d-9e0f-112233445566").expect("uuid"),
        at: NaiveDate::from_ymd_opt(2024, 2, 29)
            .and_then(|d| d.and_hms_micro_opt(13, 45, 7, 123_456))
            .expect("date"),
        span: TimeDelta::try_seconds(90_061).expect("span") + TimeDelta::try_milliseconds(5).expect("ms"),
        level: Level::High,
        shade: Shade::Crimson,
        data: Vec::new(),
        note: None,
        meta: json!({"tags": ["a", "b"], "n": 2}),
        flag: true,
        ratio: 0.25,
    }
}

#[test]
fn default_options_round_trip_every_kind() -> Result<(), MapperError> {
    let mut conn = Connection::open_in_memory()?;
    conn.create_table::<Sample>(CreateFlags::NONE)?;

    let mut original = sample();
    conn.insert(&mut original)?;
    assert_eq!(original.id, 1);

    let loaded: Sample = conn.get(1_i64)?;
    assert_eq!(loaded, original);
    assert_eq!(loaded.shade, Shade::Crimson, "text enums keep the member name");
    assert_eq!(loaded.data, Vec::<u8>::new(), "empty blob is not NULL");

    let raw = conn.query_raw(
        r#"SELECT typeof("At"), "At", typeof("Key"), "Shade", "Level", typeof("Data"), "Note", "Flag" FROM "Sample""#,
        &[],
    )?;
    let row = &raw.results[0];
    assert_eq!(row.get_by_index(0), Some(&Value::Text("integer".into())));
    assert_eq!(row.get_by_index(1), Some(&Value::Int(date_time_to_ticks(original.at).expect("tick range"))));
    assert_eq!(row.get_by_index(2), Some(&Value::Text("text".into())));
    assert_eq!(row.get_by_index(3), Some(&Value::Text("Crimson".into())));
    assert_eq!(row.get_by_index(4), Some(&Value::Int(3)));
    assert_eq!(row.get_by_index(5), Some(&Value::Text("blob".into())));
    assert_eq!(row.get_by_index(6), Some(&Value::Null));
    assert_eq!(row.get_by_index(7), Some(&Value::Int(1)));
    Ok(())
}

#[test]
fn text_and_blob_options_round_trip() -> Result<(), MapperError> {
    let options = ConnectionOptions::in_memory().with_marshal(MarshalOptions {
        date_time: DateTimeStorage::default_text(),
        guid: GuidStorage::Blob,
        time_span: TimeSpanStorage::Text,
    });
    let mut conn = Connection::open(options)?;
    conn.create_table::<Sample>(CreateFlags::NONE)?;

    let mut original = sample();
    original.note = Some("hello".into());
    original.data = vec![0, 1, 2, 255];
    conn.insert(&mut original)?;

    let loaded: Sample = conn.get(original.id)?;
    assert_eq!(loaded, original);

    let kinds: String = conn.execute_scalar(
        r#"SELECT typeof("At") || ',' || typeof("Key") || ',' || typeof("Span") FROM "Sample""#,
        &[],
    )?;
    assert_eq!(kinds, "text,blob,text");
    Ok(())
}

#[test]
fn shared_ordinal_reads_first_member_in_integer_mode() -> Result<(), MapperError> {
    let conn = Connection::open_in_memory()?;
    let shade = Shade::from_ordinal(1).expect("member");
    assert_eq!(shade, Shade::Red);
    let value: i64 = conn.execute_scalar("SELECT ?", &[Level::Mid.into_value()])?;
    assert_eq!(value, 2);
    Ok(())
}

#[test]
fn timestamps_beyond_the_tick_range_are_rejected() -> Result<(), MapperError> {
    let mut conn = Connection::open_in_memory()?;
    conn.create_table::<Sample>(CreateFlags::NONE)?;

    let mut far = Sample {
        at: NaiveDateTime::MAX,
        ..sample()
    };
    let err = conn.insert(&mut far).unwrap_err();
    assert!(matches!(err, MapperError::Conversion(_)), "{err}");

    let err = conn
        .table::<Sample>()
        .filter(col("At").lt(NaiveDateTime::MIN))
        .count()
        .unwrap_err();
    assert!(matches!(err, MapperError::Conversion(_)), "{err}");
    assert_eq!(conn.table::<Sample>().count()?, 0);
    Ok(())
}
