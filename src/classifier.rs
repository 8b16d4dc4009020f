//! Error classification at the statement-execution boundary.
//!
//! Every statement the manager sends ends in [`ErrorClassifier::settle`]. On
//! the error path the connection is released before the error is handed back
//! in the adapter's own taxonomy:
//!
//! | failure | surfaced as |
//! |---|---|
//! | `DriverError::Database` | `AdapterError::DatabaseError` (message kept) |
//! | an `AdapterError` | unchanged |
//! | `DriverError::Other` | `AdapterError::RuntimeError` (source kept) |

use std::time::Instant;

use tracing::{debug, warn};

use crate::driver::DriverError;
use crate::error::AdapterError;
use crate::handle::ConnectionHandle;

/// Statements longer than this are cut in abridged and error logs.
pub const ABRIDGED_SQL_CHARS: usize = 512;

/// What went wrong inside the boundary, before classification.
#[derive(Debug)]
pub enum ExecutionFailure {
    Driver(DriverError),
    /// Already classified; passes through untouched.
    Adapter(AdapterError),
}

impl From<DriverError> for ExecutionFailure {
    fn from(err: DriverError) -> Self {
        ExecutionFailure::Driver(err)
    }
}

impl From<AdapterError> for ExecutionFailure {
    fn from(err: AdapterError) -> Self {
        ExecutionFailure::Adapter(err)
    }
}

/// First `max_chars` characters of `sql`, never splitting a character.
#[must_use]
pub fn truncate_sql(sql: &str, max_chars: usize) -> &str {
    match sql.char_indices().nth(max_chars) {
        Some((idx, _)) => &sql[..idx],
        None => sql,
    }
}

/// Statement text as it should appear in the debug log.
#[must_use]
pub fn sql_for_log(sql: &str, abridge: bool) -> &str {
    if abridge {
        truncate_sql(sql, ABRIDGED_SQL_CHARS)
    } else {
        sql
    }
}

pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Close the scoped boundary around one statement.
    ///
    /// Success passes straight through. Any failure releases `handle` (errors
    /// from the release itself are logged and swallowed) and comes back as an
    /// `AdapterError`.
    ///
    /// # Errors
    /// Returns the classified error when `outcome` is an error.
    pub async fn settle<T>(
        handle: &mut ConnectionHandle,
        sql: &str,
        started: Instant,
        outcome: Result<T, ExecutionFailure>,
    ) -> Result<T, AdapterError> {
        let failure = match outcome {
            Ok(value) => return Ok(value),
            Err(failure) => failure,
        };

        let elapsed = started.elapsed().as_secs_f64();
        let sql = truncate_sql(sql, ABRIDGED_SQL_CHARS);
        let classified = match failure {
            ExecutionFailure::Driver(DriverError::Database(message)) => {
                debug!(
                    connection = handle.name(),
                    elapsed, "Database error while running SQL: {sql}"
                );
                AdapterError::DatabaseError(message.trim().to_string())
            }
            ExecutionFailure::Adapter(err) => {
                debug!(
                    connection = handle.name(),
                    elapsed,
                    kind = err.kind(),
                    "Error running SQL: {sql}"
                );
                err
            }
            ExecutionFailure::Driver(DriverError::Other(source)) => {
                debug!(
                    connection = handle.name(),
                    elapsed, "Unexpected error running SQL: {sql}"
                );
                AdapterError::runtime(source)
            }
        };

        debug!(connection = handle.name(), "Rolling back transaction.");
        Self::release_quietly(handle).await;
        Err(classified)
    }

    async fn release_quietly(handle: &mut ConnectionHandle) {
        if let Err(err) = handle.release().await {
            warn!(
                connection = handle.name(),
                "Failed to release connection after error: {err}"
            );
        }
    }
}
