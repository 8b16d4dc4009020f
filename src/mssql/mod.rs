// MSSQL module - the tiberius implementation of the driver seam
//
// This module is split into several sub-modules:
// - config: connection string parsing and tiberius configuration
// - client: TCP dial and TDS login
// - query: parameter binding, cursor collection, value and error mapping
// - session: `Session`/`Driver` implementations
//
// Limitation: tiberius has no statement cancellation primitive, so sessions
// report no `Canceller` and cancel requests are no-ops.

pub mod client;
pub mod config;
pub mod query;
pub mod session;

pub use client::{MssqlClient, connect_client};
pub use config::{MssqlAuth, MssqlOptions, build_tiberius_config};
pub use query::{bind_query_params, collect_cursor};
pub use session::{MssqlSession, TiberiusDriver};
