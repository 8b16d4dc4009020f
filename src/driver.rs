//! The call-level seam between the connection manager and a native driver.
//!
//! A [`Driver`] dials sessions from a connection string; a [`Session`] runs
//! statements and hands back a fully fetched [`DriverCursor`]. The manager
//! never sees driver-specific error types, only [`DriverError`].

use std::error::Error as StdError;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{CellType, RowValues};

/// Failure reported by a driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The engine or the connection to it rejected the request: constraint
    /// violations, syntax errors, lost connectivity.
    #[error("{0}")]
    Database(String),

    /// Anything else the driver tripped over (conversion, protocol, ...).
    #[error(transparent)]
    Other(Box<dyn StdError + Send + Sync>),
}

impl DriverError {
    pub fn other(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        DriverError::Other(err.into())
    }
}

/// Column description as reported by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    /// `None` when the driver cannot map the native type.
    pub cell_type: Option<CellType>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, cell_type: Option<CellType>) -> Self {
        Self {
            name: name.into(),
            cell_type,
        }
    }
}

/// Output of one executed statement, fetched in a single batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverCursor {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<RowValues>>,
    /// Native status message, for drivers that expose one.
    pub status_message: Option<String>,
}

/// Out-of-band statement cancellation.
///
/// Held separately from the session so a statement can be cancelled while
/// the session itself is busy executing it.
pub trait Canceller: Send + Sync {
    /// Ask the server to abandon the statement currently running.
    ///
    /// # Errors
    /// Returns `DriverError` if the cancel request could not be sent.
    fn cancel(&self) -> Result<(), DriverError>;
}

/// One live driver session.
#[async_trait]
pub trait Session: Send {
    /// Run a statement without parameters.
    async fn execute(&mut self, sql: &str) -> Result<DriverCursor, DriverError>;

    /// Run a statement binding `params` positionally. `params` may be empty.
    async fn execute_with_params(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<DriverCursor, DriverError>;

    async fn begin(&mut self) -> Result<(), DriverError>;

    async fn commit(&mut self) -> Result<(), DriverError>;

    async fn rollback(&mut self) -> Result<(), DriverError>;

    /// Close the native session. Calling it twice must be harmless.
    async fn close(&mut self) -> Result<(), DriverError>;

    /// Cancellation primitive, if the driver offers one.
    fn canceller(&self) -> Option<Arc<dyn Canceller>> {
        None
    }
}

/// Factory for sessions.
///
/// Sessions start in autocommit mode: every statement outside an explicit
/// `begin` commits on its own.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn connect(&self, connection_string: &str) -> Result<Box<dyn Session>, DriverError>;
}
