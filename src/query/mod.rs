//! Composable, deferred queries over one mapped table.
//!
//! A [`Query`] is only a description; it is bound to a connection through
//! [`Connection::table`](crate::Connection::table) or
//! [`AsyncConnection::table`](crate::AsyncConnection::table), and every terminal call re-runs
//! the generated SQL against current data.

mod expr;
pub(crate) mod translate;

use std::fmt;
use std::marker::PhantomData;

pub use expr::{ColumnRef, CompareOp, OrderTerm, Predicate, StringMatch, col};
pub(crate) use expr::Aggregate;

/// Entity-independent state of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct QueryParts {
    pub(crate) filter: Option<Predicate>,
    pub(crate) order: Vec<OrderTerm>,
    pub(crate) skip: Option<u64>,
    pub(crate) take: Option<u64>,
    /// Paged query this one reads from, set when a filter follows skip or take.
    pub(crate) source: Option<Box<QueryParts>>,
}

impl QueryParts {
    pub(crate) fn is_paged(&self) -> bool {
        self.skip.is_some() || self.take.is_some()
    }

    /// Start a new query over the rows this one yields, keeping their order.
    fn nest(&mut self) {
        let inner = std::mem::take(self);
        self.order = inner.order.clone();
        self.source = Some(Box::new(inner));
    }

    /// The query narrowed to the single row at `index`, or `None` when paging already excludes it.
    pub(crate) fn element_at(&self, index: u64) -> Option<QueryParts> {
        if self.take.is_some_and(|take| index >= take) {
            return None;
        }
        let mut parts = self.clone();
        parts.skip = Some(self.skip.unwrap_or(0).saturating_add(index));
        parts.take = Some(1);
        Some(parts)
    }
}

pub struct Query<T> {
    pub(crate) parts: QueryParts,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Query<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            parts: QueryParts::default(),
            _entity: PhantomData,
        }
    }

    #[must_use]
    pub fn predicate(&self) -> Option<&Predicate> {
        self.parts.filter.as_ref()
    }

    #[must_use]
    pub fn ordering(&self) -> &[OrderTerm] {
        &self.parts.order
    }

    #[must_use]
    pub fn skip_count(&self) -> Option<u64> {
        self.parts.skip
    }

    #[must_use]
    pub fn take_count(&self) -> Option<u64> {
        self.parts.take
    }
}

impl<T> Default for Query<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            parts: self.parts.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("entity", &std::any::type_name::<T>())
            .field("parts", &self.parts)
            .finish()
    }
}

/// Builder operations shared by [`Query`] and the connection-bound tables.
///
/// Operators apply in the order they are added: a filter after `skip` or `take` only sees the
/// rows of that page.
pub trait Composable<T>: Sized {
    /// Rewrite the underlying query.
    fn map_query(self, f: impl FnOnce(Query<T>) -> Query<T>) -> Self;

    /// Add a filter; multiple filters are combined with AND.
    fn filter(self, predicate: Predicate) -> Self {
        self.map_query(|mut q| {
            if q.parts.is_paged() {
                q.parts.nest();
            }
            q.parts.filter = Some(match q.parts.filter.take() {
                Some(existing) => existing.and(predicate),
                None => predicate,
            });
            q
        })
    }

    fn order_by(self, property: &str) -> Self {
        push_order::<T, Self>(self, property, false, false)
    }

    fn order_by_desc(self, property: &str) -> Self {
        push_order::<T, Self>(self, property, true, false)
    }

    /// Order by the column cast to a number, for numbers stored as text.
    fn order_by_numeric(self, property: &str) -> Self {
        push_order::<T, Self>(self, property, false, true)
    }

    fn order_by_numeric_desc(self, property: &str) -> Self {
        push_order::<T, Self>(self, property, true, true)
    }

    fn skip(self, count: u64) -> Self {
        self.map_query(|mut q| {
            q.parts.skip = Some(q.parts.skip.unwrap_or(0).saturating_add(count));
            q.parts.take = q.parts.take.map(|take| take.saturating_sub(count));
            q
        })
    }

    fn take(self, count: u64) -> Self {
        self.map_query(|mut q| {
            q.parts.take = Some(q.parts.take.map_or(count, |take| take.min(count)));
            q
        })
    }
}

fn push_order<T, C: Composable<T>>(query: C, property: &str, descending: bool, numeric: bool) -> C {
    let term = OrderTerm {
        column: property.to_owned(),
        descending,
        numeric,
    };
    query.map_query(|mut q| {
        q.parts.order.push(term);
        q
    })
}

impl<T> Composable<T> for Query<T> {
    fn map_query(self, f: impl FnOnce(Query<T>) -> Query<T>) -> Self {
        f(self)
    }
}
