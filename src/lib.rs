//! Connection lifecycle, transaction control and error classification for
//! SQL Server.
//!
//! A [`ConnectionManager`] keeps one named connection per worker. Statements
//! run through it open the connection lazily, optionally begin a transaction,
//! and have every driver failure classified into an [`AdapterError`]. A
//! failed statement always leaves its worker's connection released.
//!
//! The tiberius-backed driver lives in [`mssql`] (default feature `mssql`);
//! anything implementing [`driver::Driver`] can be plugged in instead.

pub mod classifier;
pub mod credentials;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod handle;
pub mod manager;
#[cfg(feature = "mssql")]
pub mod mssql;
pub mod prelude;
pub mod query;
pub mod results;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod traits;
pub mod types;

pub use classifier::{ABRIDGED_SQL_CHARS, ErrorClassifier};
pub use credentials::{Authentication, CredentialRecord};
pub use error::AdapterError;
pub use handle::{ConnectionHandle, ConnectionState, HandleInfo};
pub use manager::ConnectionManager;
pub use query::QueryRequest;
pub use results::{ColumnMeta, CustomDbRow, QueryResult, ResultSet};
pub use traits::{ConnectionLifecycle, CredentialProvider, StatementExecutor};
pub use types::{CellType, RowValues};
