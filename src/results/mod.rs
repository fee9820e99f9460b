mod result_set;
mod row;

pub use result_set::ResultSet;
pub use row::Row;
pub(crate) use row::RowLayout;
