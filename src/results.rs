pub mod query_result;
pub mod result_set;
pub mod row;

pub use query_result::{ColumnMeta, QueryResult, STATUS_OK, status_of};
pub use result_set::ResultSet;
pub use row::CustomDbRow;
