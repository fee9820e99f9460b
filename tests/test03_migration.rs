use sqlite_mapper::prelude::*;
use sqlite_mapper::schema::{HiddenKind, live_columns};
use sqlite_mapper::types::Affinity;

/// First version of the table.
struct ItemV1 {
    id: i64,
    name: String,
}

impl Entity for ItemV1 {
    fn describe() -> TableSpec {
        TableSpec::new("Item")
            .column(ColumnSpec::of::<i64>("Id").primary_key().auto_increment())
            .column(ColumnSpec::of::<String>("Name").not_null())
    }

    fn to_values(&self) -> Vec<(&'static str, Value)> {
        vec![("Id", self.id.into_value()), ("Name", self.name.clone().into_value())]
    }

    fn from_row(row: &Row) -> Result<Self, MapperError> {
        Ok(Self {
            id: row.get("Id")?,
            name: row.get("Name")?,
        })
    }

    fn set_auto_id(&mut self, id: i64) {
        self.id = id;
    }
}

/// Second version: adds required, optional and virtual computed columns plus an index.
#[derive(Debug)]
struct ItemV2 {
    id: i64,
    name: String,
    quantity: i64,
    label: Option<String>,
    shout: Option<String>,
}

impl Entity for ItemV2 {
    fn describe() -> TableSpec {
        TableSpec::new("Item")
            .column(ColumnSpec::of::<i64>("Id").primary_key().auto_increment())
            .column(ColumnSpec::of::<String>("Name").not_null().indexed())
            .column(ColumnSpec::of::<i64>("Quantity").not_null())
            .column(ColumnSpec::of::<Option<String>>("Label").default("'none'"))
            .column(ColumnSpec::of::<Option<String>>("Shout").computed("upper(\"Name\")", ComputedKind::Virtual))
    }

    fn to_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("Id", self.id.into_value()),
            ("Name", self.name.clone().into_value()),
            ("Quantity", self.quantity.into_value()),
            ("Label", self.label.clone().into_value()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, MapperError> {
        Ok(Self {
            id: row.get("Id")?,
            name: row.get("Name")?,
            quantity: row.get("Quantity")?,
            label: row.get("Label")?,
            shout: row.get("Shout")?,
        })
    }
}

/// Adds a STORED computed column, which cannot be added in place.
struct ItemStored;

impl Entity for ItemStored {
    fn describe() -> TableSpec {
        TableSpec::new("Item")
            .column(ColumnSpec::of::<i64>("Id").primary_key().auto_increment())
            .column(ColumnSpec::of::<String>("Name").not_null())
            .column(ColumnSpec::of::<Option<i64>>("NameLength").computed("length(\"Name\")", ComputedKind::Stored))
    }

    fn to_values(&self) -> Vec<(&'static str, Value)> {
        Vec::new()
    }

    fn from_row(_row: &Row) -> Result<Self, MapperError> {
        Ok(Self)
    }
}

#[test]
fn additive_migration_keeps_existing_rows() -> Result<(), MapperError> {
    let mut conn = Connection::open_in_memory()?;
    assert_eq!(conn.create_table::<ItemV1>(CreateFlags::NONE)?, CreateTableResult::Created);
    assert_eq!(conn.create_table::<ItemV1>(CreateFlags::NONE)?, CreateTableResult::Unchanged);

    let mut old = ItemV1 {
        id: 0,
        name: "bolt".into(),
    };
    conn.insert(&mut old)?;

    assert_eq!(conn.create_table::<ItemV2>(CreateFlags::NONE)?, CreateTableResult::Migrated);
    assert_eq!(conn.create_table::<ItemV2>(CreateFlags::NONE)?, CreateTableResult::Unchanged);

    let migrated: ItemV2 = conn.get(old.id)?;
    assert_eq!(migrated.name, "bolt");
    assert_eq!(migrated.quantity, 0, "NOT NULL column gets its zero default");
    assert_eq!(migrated.label.as_deref(), Some("none"));
    assert_eq!(migrated.shout.as_deref(), Some("BOLT"));

    let live = live_columns(conn.handle()?, "Item")?;
    let quantity = live.iter().find(|c| c.name == "Quantity").expect("added");
    assert!(quantity.not_null);
    assert_eq!(quantity.affinity, Affinity::Integer);
    let shout = live.iter().find(|c| c.name == "Shout").expect("added");
    assert_eq!(shout.hidden, HiddenKind::VirtualComputed);

    let indexed: i64 = conn.execute_scalar(
        "SELECT count(*) FROM sqlite_master WHERE type = 'index' AND name = 'Item_Name'",
        &[],
    )?;
    assert_eq!(indexed, 1);
    Ok(())
}

#[test]
fn computed_columns_are_never_written() -> Result<(), MapperError> {
    let mut conn = Connection::open_in_memory()?;
    conn.create_table::<ItemV2>(CreateFlags::NONE)?;
    let mut item = ItemV2 {
        id: 0,
        name: "nut".into(),
        quantity: 4,
        label: None,
        shout: Some("ignored".into()),
    };
    conn.insert(&mut item)?;
    let loaded = conn.table::<ItemV2>().first()?;
    assert_eq!(loaded.shout.as_deref(), Some("NUT"));
    assert_eq!(loaded.label, None, "explicit NULL overrides the default");
    Ok(())
}

#[test]
fn stored_computed_column_cannot_be_added() -> Result<(), MapperError> {
    let mut conn = Connection::open_in_memory()?;
    conn.create_table::<ItemV1>(CreateFlags::NONE)?;
    let err = conn.create_table::<ItemStored>(CreateFlags::NONE).unwrap_err();
    assert!(matches!(err, MapperError::Schema(_)), "{err}");

    let mut fresh = Connection::open_in_memory()?;
    assert_eq!(fresh.create_table::<ItemStored>(CreateFlags::NONE)?, CreateTableResult::Created);
    Ok(())
}

#[test]
fn drop_table_removes_it() -> Result<(), MapperError> {
    let mut conn = Connection::open_in_memory()?;
    conn.create_table::<ItemV1>(CreateFlags::NONE)?;
    conn.drop_table::<ItemV1>()?;
    assert!(live_columns(conn.handle()?, "Item")?.is_empty());
    assert_eq!(conn.create_table::<ItemV1>(CreateFlags::NONE)?, CreateTableResult::Created);
    Ok(())
}
