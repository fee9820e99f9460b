use std::ops::BitOr;

use crate::conversion::ColumnType;
use crate::types::ValueKind;

/// Opt-in conventions applied when a [`TableSpec`] is turned into a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CreateFlags(u8);

impl CreateFlags {
    pub const NONE: CreateFlags = CreateFlags(0);
    /// A column whose property is named `Id` (any case) becomes the primary key.
    pub const IMPLICIT_PK: CreateFlags = CreateFlags(1);
    /// Columns whose property ends in `Id` get a non-unique index.
    pub const IMPLICIT_INDEX: CreateFlags = CreateFlags(2);
    /// An integer primary key becomes autoincrement.
    pub const AUTO_INC_PK: CreateFlags = CreateFlags(4);
    pub const ALL_IMPLICIT: CreateFlags = CreateFlags(7);

    #[must_use]
    pub fn contains(self, other: CreateFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for CreateFlags {
    type Output = CreateFlags;

    fn bitor(self, rhs: CreateFlags) -> CreateFlags {
        CreateFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collation {
    Binary,
    NoCase,
    RTrim,
}

impl Collation {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            Collation::Binary => "BINARY",
            Collation::NoCase => "NOCASE",
            Collation::RTrim => "RTRIM",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputedKind {
    /// Recomputed on every read.
    Virtual,
    /// Persisted when the row is written.
    Stored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IndexSpec {
    pub(crate) name: Option<String>,
    pub(crate) order: i32,
    pub(crate) unique: bool,
}

/// Declared metadata for one member of an entity.
///
/// ```rust
/// use sqlite_mapper::prelude::*;
///
/// let column = ColumnSpec::of::<String>("Email")
///     .named("email_address")
///     .unique()
///     .collation(Collation::NoCase)
///     .max_length(120);
/// assert_eq!(column.property_name(), "Email");
/// ```
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub(crate) property: String,
    pub(crate) storage_name: Option<String>,
    pub(crate) kind: ValueKind,
    pub(crate) primary_key: bool,
    pub(crate) auto_increment: bool,
    pub(crate) indices: Vec<IndexSpec>,
    pub(crate) not_null: bool,
    pub(crate) collation: Option<Collation>,
    pub(crate) computed: Option<(String, ComputedKind)>,
    pub(crate) ignored: bool,
    pub(crate) max_length: Option<u32>,
    pub(crate) default: Option<String>,
}

impl ColumnSpec {
    #[must_use]
    pub fn new(property: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            property: property.into(),
            storage_name: None,
            kind,
            primary_key: false,
            auto_increment: false,
            indices: Vec::new(),
            not_null: false,
            collation: None,
            computed: None,
            ignored: false,
            max_length: None,
            default: None,
        }
    }

    /// Column whose kind follows the Rust type `T`.
    #[must_use]
    pub fn of<T: ColumnType>(property: impl Into<String>) -> Self {
        Self::new(property, T::KIND)
    }

    #[must_use]
    pub fn property_name(&self) -> &str {
        &self.property
    }

    /// Store the column under a different name than the property.
    #[must_use]
    pub fn named(mut self, storage_name: impl Into<String>) -> Self {
        self.storage_name = Some(storage_name.into());
        self
    }

    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Add the column to the default single-column index `<table>_<column>`.
    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.indices.push(IndexSpec {
            name: None,
            order: 0,
            unique: false,
        });
        self
    }

    /// Add the column to a named index; `order` positions it among the index's columns.
    #[must_use]
    pub fn indexed_as(mut self, name: impl Into<String>, order: i32) -> Self {
        self.indices.push(IndexSpec {
            name: Some(name.into()),
            order,
            unique: false,
        });
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.indices.push(IndexSpec {
            name: None,
            order: 0,
            unique: true,
        });
        self
    }

    #[must_use]
    pub fn unique_as(mut self, name: impl Into<String>, order: i32) -> Self {
        self.indices.push(IndexSpec {
            name: Some(name.into()),
            order,
            unique: true,
        });
        self
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    #[must_use]
    pub fn collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }

    /// Make the column engine-computed from `expression`; it is never written by the mapper.
    #[must_use]
    pub fn computed(mut self, expression: impl Into<String>, kind: ComputedKind) -> Self {
        self.computed = Some((expression.into(), kind));
        self
    }

    #[must_use]
    pub fn ignore(mut self) -> Self {
        self.ignored = true;
        self
    }

    /// Declares the column as `varchar(n)`. Only text columns honour it.
    #[must_use]
    pub fn max_length(mut self, length: u32) -> Self {
        self.max_length = Some(length);
        self
    }

    /// Default value as an SQL expression, e.g. `"0"` or `"'n/a'"`.
    #[must_use]
    pub fn default(mut self, expression: impl Into<String>) -> Self {
        self.default = Some(expression.into());
        self
    }

    /// Store an enumeration column by member name instead of ordinal.
    #[must_use]
    pub fn store_as_text(mut self) -> Self {
        if let ValueKind::Enum { members, .. } = self.kind {
            self.kind = ValueKind::Enum {
                members,
                as_text: true,
            };
        }
        self
    }
}

/// Declared table shape for an entity, built once and turned into a
/// [`TableMapping`](super::TableMapping) by the registry.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub(crate) name: String,
    pub(crate) columns: Vec<ColumnSpec>,
    pub(crate) without_rowid: bool,
}

impl TableSpec {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            without_rowid: false,
        }
    }

    /// Table named after the last path segment of `T`'s type name.
    #[must_use]
    pub fn for_type<T: ?Sized>() -> Self {
        let full = std::any::type_name::<T>();
        let base = full.split('<').next().unwrap_or(full);
        Self::new(base.rsplit("::").next().unwrap_or(base))
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    #[must_use]
    pub fn without_rowid(mut self) -> Self {
        self.without_rowid = true;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Invoice;

    #[test]
    fn table_name_defaults_to_type_name() {
        assert_eq!(TableSpec::for_type::<Invoice>().name(), "Invoice");
        assert_eq!(
            TableSpec::for_type::<Invoice>().named("invoices").name(),
            "invoices"
        );
    }

    #[test]
    fn flags_combine() {
        let flags = CreateFlags::IMPLICIT_PK | CreateFlags::AUTO_INC_PK;
        assert!(flags.contains(CreateFlags::IMPLICIT_PK));
        assert!(!flags.contains(CreateFlags::IMPLICIT_INDEX));
        assert!(CreateFlags::ALL_IMPLICIT.contains(flags));
    }

    #[test]
    fn store_as_text_only_touches_enums() {
        const MEMBERS: &[(&str, i64)] = &[("A", 0)];
        let column = ColumnSpec::new(
            "Mode",
            ValueKind::Enum {
                members: MEMBERS,
                as_text: false,
            },
        )
        .store_as_text();
        assert!(matches!(column.kind, ValueKind::Enum { as_text: true, .. }));
        let plain = ColumnSpec::of::<i64>("Count").store_as_text();
        assert_eq!(plain.kind, ValueKind::Integer);
    }
}
