//! Capability contracts implemented by the credential record and the
//! connection manager.

use async_trait::async_trait;

use crate::error::AdapterError;
use crate::handle::HandleInfo;
use crate::query::QueryRequest;
use crate::results::QueryResult;

/// Describes how to reach a database.
pub trait CredentialProvider {
    /// Adapter type name, e.g. `"mssql"`.
    fn adapter_type(&self) -> &'static str;

    /// Full driver connection string, secrets included. Never log this.
    fn connection_string(&self) -> String;

    /// Connection string with the password masked, safe for logs.
    fn redacted_connection_string(&self) -> String;

    /// Key/value pairs worth showing in diagnostics. Secrets are excluded.
    fn connection_keys(&self) -> Vec<(&'static str, String)>;
}

/// Opening, releasing and cancelling connections.
#[async_trait]
pub trait ConnectionLifecycle {
    /// Dial the worker's connection unless it is already open.
    ///
    /// # Errors
    /// `ConnectionError` if the dial fails, `InternalError` if the worker's
    /// connection is `fail` or `closed`.
    async fn open(&self, worker: &str) -> Result<HandleInfo, AdapterError>;

    /// Close the worker's connection. Idempotent and infallible.
    async fn release(&self, worker: &str);

    /// Best-effort cancellation of the worker's running statement. Returns
    /// whether a cancel request was actually sent.
    fn cancel(&self, worker: &str) -> bool;

    /// Release every connection; returns the worker names released.
    async fn cleanup_all(&self) -> Vec<String>;
}

/// Running statements and controlling transactions.
#[async_trait]
pub trait StatementExecutor {
    /// Run one statement on the worker's connection.
    ///
    /// # Errors
    /// One of `ConnectionError`, `DatabaseError`, `InternalError` or
    /// `RuntimeError`.
    async fn run_query(
        &self,
        worker: &str,
        request: QueryRequest,
    ) -> Result<(HandleInfo, QueryResult), AdapterError>;

    /// # Errors
    /// `InternalError` if a transaction is already open.
    async fn begin(&self, worker: &str) -> Result<HandleInfo, AdapterError>;

    /// # Errors
    /// `InternalError` if no transaction is open.
    async fn commit(&self, worker: &str) -> Result<HandleInfo, AdapterError>;

    /// Roll back if a transaction is open; otherwise do nothing.
    ///
    /// # Errors
    /// The classified error if the rollback statement fails.
    async fn rollback_if_open(&self, worker: &str) -> Result<(), AdapterError>;
}
