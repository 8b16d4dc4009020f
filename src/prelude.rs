//! Convenient imports for common functionality.
//!
//! ```rust
//! use mssql_adapter::prelude::*;
//! ```

pub use crate::credentials::{Authentication, CredentialRecord};
pub use crate::driver::{Driver, DriverCursor, DriverError, Session};
pub use crate::error::AdapterError;
pub use crate::handle::{ConnectionState, HandleInfo};
pub use crate::manager::ConnectionManager;
pub use crate::query::QueryRequest;
pub use crate::results::{CustomDbRow, QueryResult, ResultSet};
pub use crate::traits::{ConnectionLifecycle, CredentialProvider, StatementExecutor};
pub use crate::types::{CellType, RowValues};

#[cfg(feature = "mssql")]
pub use crate::mssql::TiberiusDriver;
