use std::ops::Not;

use crate::conversion::IntoValue;
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringMatch {
    Contains,
    StartsWith,
    EndsWith,
}

/// Filter expression over the properties of one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    IsNull(String),
    IsNotNull(String),
    Match {
        column: String,
        kind: StringMatch,
        value: String,
        ignore_case: bool,
    },
    In {
        column: String,
        values: Vec<Value>,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    Literal(bool),
}

impl Predicate {
    /// Matches every row. Lets a bulk delete state that it targets the whole table.
    #[must_use]
    pub fn always() -> Self {
        Predicate::Literal(true)
    }

    #[must_use]
    pub fn never() -> Self {
        Predicate::Literal(false)
    }

    #[must_use]
    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }
}

impl Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }
}

/// Reference to an entity property, the starting point for predicates and ordering.
///
/// ```rust
/// use sqlite_mapper::prelude::*;
///
/// let adults = col("Age").ge(18).and(!col("Name").starts_with("test"));
/// assert!(matches!(adults, Predicate::And(..)));
/// ```
#[derive(Debug, Clone)]
pub struct ColumnRef(String);

#[must_use]
pub fn col(property: impl Into<String>) -> ColumnRef {
    ColumnRef(property.into())
}

impl ColumnRef {
    #[must_use]
    pub fn property(&self) -> &str {
        &self.0
    }

    fn compare(self, op: CompareOp, value: impl IntoValue) -> Predicate {
        Predicate::Compare {
            column: self.0,
            op,
            value: value.into_value(),
        }
    }

    #[must_use]
    pub fn eq(self, value: impl IntoValue) -> Predicate {
        self.compare(CompareOp::Eq, value)
    }

    #[must_use]
    pub fn ne(self, value: impl IntoValue) -> Predicate {
        self.compare(CompareOp::Ne, value)
    }

    #[must_use]
    pub fn lt(self, value: impl IntoValue) -> Predicate {
        self.compare(CompareOp::Lt, value)
    }

    #[must_use]
    pub fn le(self, value: impl IntoValue) -> Predicate {
        self.compare(CompareOp::Le, value)
    }

    #[must_use]
    pub fn gt(self, value: impl IntoValue) -> Predicate {
        self.compare(CompareOp::Gt, value)
    }

    #[must_use]
    pub fn ge(self, value: impl IntoValue) -> Predicate {
        self.compare(CompareOp::Ge, value)
    }

    #[must_use]
    pub fn is_null(self) -> Predicate {
        Predicate::IsNull(self.0)
    }

    #[must_use]
    pub fn is_not_null(self) -> Predicate {
        Predicate::IsNotNull(self.0)
    }

    fn matching(self, kind: StringMatch, value: impl Into<String>, ignore_case: bool) -> Predicate {
        Predicate::Match {
            column: self.0,
            kind,
            value: value.into(),
            ignore_case,
        }
    }

    #[must_use]
    pub fn contains(self, value: impl Into<String>) -> Predicate {
        self.matching(StringMatch::Contains, value, false)
    }

    #[must_use]
    pub fn starts_with(self, value: impl Into<String>) -> Predicate {
        self.matching(StringMatch::StartsWith, value, false)
    }

    #[must_use]
    pub fn ends_with(self, value: impl Into<String>) -> Predicate {
        self.matching(StringMatch::EndsWith, value, false)
    }

    #[must_use]
    pub fn contains_ignore_case(self, value: impl Into<String>) -> Predicate {
        self.matching(StringMatch::Contains, value, true)
    }

    #[must_use]
    pub fn starts_with_ignore_case(self, value: impl Into<String>) -> Predicate {
        self.matching(StringMatch::StartsWith, value, true)
    }

    #[must_use]
    pub fn ends_with_ignore_case(self, value: impl Into<String>) -> Predicate {
        self.matching(StringMatch::EndsWith, value, true)
    }

    /// Set membership: the column equals one of `values`.
    #[must_use]
    pub fn is_in<I>(self, values: I) -> Predicate
    where
        I: IntoIterator,
        I::Item: IntoValue,
    {
        Predicate::In {
            column: self.0,
            values: values.into_iter().map(IntoValue::into_value).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub column: String,
    pub descending: bool,
    /// Sort by the numeric value of the column rather than its stored form.
    pub numeric: bool,
}

/// Terminal aggregate computed by a single-row query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Aggregate {
    Count,
    Sum(String),
    Average(String),
    Min(String),
    Max(String),
    Exists,
}

impl Aggregate {
    pub(crate) fn column(&self) -> Option<&str> {
        match self {
            Aggregate::Sum(c) | Aggregate::Average(c) | Aggregate::Min(c) | Aggregate::Max(c) => Some(c),
            Aggregate::Count | Aggregate::Exists => None,
        }
    }
}
