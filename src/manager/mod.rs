//! Per-worker connection registry and the statement path.
//!
//! The registry lock only guards lookup and insertion. Each worker's handle
//! sits behind its own async mutex, so statements on different workers never
//! wait for each other.

mod executor;
mod lifecycle;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use crate::classifier::{ErrorClassifier, ExecutionFailure};
use crate::credentials::CredentialRecord;
use crate::driver::{Canceller, Driver, DriverCursor};
use crate::error::AdapterError;
use crate::handle::{ConnectionHandle, ConnectionState, HandleInfo};
use crate::query::QueryRequest;
use crate::results::{ResultSet, status_of};
use crate::traits::{CredentialProvider, StatementExecutor};

/// Registry entry for one worker.
pub(crate) struct WorkerSlot {
    handle: Arc<tokio::sync::Mutex<ConnectionHandle>>,
    // kept outside the handle lock so a running statement can be cancelled
    canceller: Mutex<Option<Arc<dyn Canceller>>>,
    // set under the handle lock once the slot has left the registry
    retired: AtomicBool,
}

impl WorkerSlot {
    fn new(worker: &str) -> Self {
        Self {
            handle: Arc::new(tokio::sync::Mutex::new(ConnectionHandle::new(worker))),
            canceller: Mutex::new(None),
            retired: AtomicBool::new(false),
        }
    }

    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    fn canceller(&self) -> Option<Arc<dyn Canceller>> {
        self.canceller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn sync_canceller(&self, handle: &ConnectionHandle) {
        let canceller = if handle.is_open() {
            handle.session().and_then(|session| session.canceller())
        } else {
            None
        };
        *self.canceller.lock().unwrap_or_else(PoisonError::into_inner) = canceller;
    }
}

/// Owns one connection handle per worker and runs statements on them.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use mssql_adapter::prelude::*;
///
/// # async fn demo(driver: Arc<dyn Driver>) -> Result<(), AdapterError> {
/// let creds = CredentialRecord::builder("ODBC Driver 18 for SQL Server", "sql01", "dw", "dbo")
///     .windows_login(true)
///     .build()?;
/// let manager = ConnectionManager::new(creds, driver);
/// let (handle, result) = manager
///     .run_query("model.orders", QueryRequest::new("SELECT 1 AS one").fetch(true))
///     .await?;
/// assert!(handle.transaction_open);
/// manager.commit("model.orders").await?;
/// # let _ = result;
/// # Ok(())
/// # }
/// ```
pub struct ConnectionManager {
    credentials: CredentialRecord,
    driver: Arc<dyn Driver>,
    slots: Mutex<HashMap<String, Arc<WorkerSlot>>>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("credentials", &self.credentials)
            .field("workers", &self.workers())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    #[must_use]
    pub fn new(credentials: CredentialRecord, driver: Arc<dyn Driver>) -> Self {
        Self {
            credentials,
            driver,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Manager backed by the tiberius SQL Server driver.
    #[cfg(feature = "mssql")]
    #[must_use]
    pub fn mssql(credentials: CredentialRecord) -> Self {
        Self::new(credentials, Arc::new(crate::mssql::TiberiusDriver::new()))
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialRecord {
        &self.credentials
    }

    /// Names of all workers that currently have a registry entry.
    #[must_use]
    pub fn workers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots().keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of a worker's handle, if the worker has one.
    pub async fn handle_info(&self, worker: &str) -> Option<HandleInfo> {
        let slot = self.lookup(worker)?;
        let handle = slot.handle.lock().await;
        Some(handle.info())
    }

    /// Status text for a cursor: the driver's own message, or `"OK"`.
    #[must_use]
    pub fn get_status(cursor: &DriverCursor) -> String {
        status_of(cursor)
    }

    /// Run `sql` and return `(status, rows)`.
    ///
    /// # Errors
    /// Same as [`StatementExecutor::run_query`].
    pub async fn execute(
        &self,
        worker: &str,
        sql: &str,
        auto_begin: bool,
        fetch: bool,
    ) -> Result<(String, ResultSet), AdapterError> {
        let request = QueryRequest::new(sql).auto_begin(auto_begin).fetch(fetch);
        let (_, result) = self.run_query(worker, request).await?;
        Ok(result.into_parts())
    }

    /// Cancel every open connection except `except`; returns the names of
    /// the workers a cancel request was sent to.
    pub fn cancel_open(&self, except: Option<&str>) -> Vec<String> {
        let snapshot: Vec<(String, Arc<WorkerSlot>)> = {
            let slots = self.slots();
            slots
                .iter()
                .filter(|(name, _)| Some(name.as_str()) != except)
                .map(|(name, slot)| (name.clone(), Arc::clone(slot)))
                .collect()
        };

        let mut cancelled: Vec<String> = snapshot
            .into_iter()
            .filter(|(name, slot)| cancel_slot(name, slot))
            .map(|(name, _)| name)
            .collect();
        cancelled.sort();
        cancelled
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Arc<WorkerSlot>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, worker: &str) -> Arc<WorkerSlot> {
        let mut slots = self.slots();
        if let Some(slot) = slots.get(worker) {
            return Arc::clone(slot);
        }
        debug!(connection = worker, "Acquiring new {} connection", self.credentials.adapter_type());
        let slot = Arc::new(WorkerSlot::new(worker));
        slots.insert(worker.to_string(), Arc::clone(&slot));
        slot
    }

    fn lookup(&self, worker: &str) -> Option<Arc<WorkerSlot>> {
        self.slots().get(worker).map(Arc::clone)
    }

    /// Lock the worker's registered slot, creating it if needed.
    async fn checkout(
        &self,
        worker: &str,
    ) -> (Arc<WorkerSlot>, OwnedMutexGuard<ConnectionHandle>) {
        let slot = self.slot(worker);
        self.lock_live(worker, slot).await
    }

    /// Lock `slot`, moving on to the registered slot if `slot` was retired
    /// by `cleanup_all` while we waited.
    async fn lock_live(
        &self,
        worker: &str,
        mut slot: Arc<WorkerSlot>,
    ) -> (Arc<WorkerSlot>, OwnedMutexGuard<ConnectionHandle>) {
        loop {
            let handle = Arc::clone(&slot.handle).lock_owned().await;
            if !slot.is_retired() {
                return (slot, handle);
            }
            drop(handle);
            debug!(connection = worker, "Connection was cleaned up while waiting; acquiring a new one");
            slot = self.slot(worker);
        }
    }

    /// Dial a handle in `Init`; `Open` handles are left alone.
    async fn dial(&self, handle: &mut ConnectionHandle) -> Result<(), AdapterError> {
        match handle.state() {
            ConnectionState::Open => {
                debug!(connection = handle.name(), "Connection is already open, skipping open.");
                return Ok(());
            }
            state if state.is_terminal() => {
                return Err(AdapterError::InternalError(format!(
                    "connection \"{}\" is {state} and cannot be reopened; acquire a fresh connection",
                    handle.name()
                )));
            }
            _ => {}
        }

        debug!(
            connection = handle.name(),
            connection_string = %self.credentials.redacted_connection_string(),
            "Opening connection"
        );
        let connection_string = self.credentials.connection_string();
        match self.driver.connect(&connection_string).await {
            Ok(session) => {
                handle.mark_open(session);
                Ok(())
            }
            Err(err) => {
                debug!(
                    connection = handle.name(),
                    "Got an error when attempting to open a connection: '{err}'"
                );
                handle.mark_failed();
                Err(AdapterError::ConnectionError(err.to_string().trim().to_string()))
            }
        }
    }

    /// Replace a terminal handle with a fresh one, then dial it.
    async fn ensure_open(
        &self,
        slot: &WorkerSlot,
        handle: &mut ConnectionHandle,
    ) -> Result<(), AdapterError> {
        if handle.state().is_terminal() {
            debug!(
                connection = handle.name(),
                state = %handle.state(),
                "Discarding connection and acquiring a fresh one"
            );
            handle.renew();
        }
        let result = self.dial(handle).await;
        slot.sync_canceller(handle);
        result
    }
}

fn cancel_slot(worker: &str, slot: &WorkerSlot) -> bool {
    let Some(canceller) = slot.canceller() else {
        debug!(
            connection = worker,
            "Driver offers no cancellation primitive; cancel is a no-op"
        );
        return false;
    };
    match canceller.cancel() {
        Ok(()) => {
            debug!(connection = worker, "Cancelled query on connection");
            true
        }
        Err(err) => {
            warn!(connection = worker, "Failed to cancel query: {err}");
            false
        }
    }
}

async fn begin_on(handle: &mut ConnectionHandle) -> Result<(), AdapterError> {
    if handle.transaction_open() {
        return Err(AdapterError::InternalError(format!(
            "connection \"{}\" is already in transaction; commit or roll back first",
            handle.name()
        )));
    }
    debug!(connection = handle.name(), "On {}: BEGIN", handle.name());
    let started = Instant::now();
    let outcome = match handle.session_mut() {
        Ok(session) => session.begin().await.map_err(ExecutionFailure::from),
        Err(err) => Err(err.into()),
    };
    ErrorClassifier::settle(handle, "BEGIN TRANSACTION", started, outcome).await?;
    handle.set_transaction_open(true)
}

async fn commit_on(handle: &mut ConnectionHandle) -> Result<(), AdapterError> {
    if !handle.transaction_open() {
        return Err(AdapterError::InternalError(format!(
            "no transaction open on connection \"{}\"; begin one before committing",
            handle.name()
        )));
    }
    debug!(connection = handle.name(), "On {}: COMMIT", handle.name());
    let started = Instant::now();
    let outcome = match handle.session_mut() {
        Ok(session) => session.commit().await.map_err(ExecutionFailure::from),
        Err(err) => Err(err.into()),
    };
    ErrorClassifier::settle(handle, "COMMIT TRANSACTION", started, outcome).await?;
    handle.set_transaction_open(false)
}

async fn rollback_on(handle: &mut ConnectionHandle) -> Result<(), AdapterError> {
    if !handle.transaction_open() {
        return Ok(());
    }
    debug!(connection = handle.name(), "On {}: ROLLBACK", handle.name());
    let started = Instant::now();
    let outcome = match handle.session_mut() {
        Ok(session) => session.rollback().await.map_err(ExecutionFailure::from),
        Err(err) => Err(err.into()),
    };
    ErrorClassifier::settle(handle, "ROLLBACK TRANSACTION", started, outcome).await?;
    handle.set_transaction_open(false)
}

async fn dispatch(
    handle: &mut ConnectionHandle,
    request: &QueryRequest,
) -> Result<DriverCursor, ExecutionFailure> {
    let session = handle.session_mut()?;
    let cursor = match request.bindings.as_deref() {
        None => session.execute(&request.sql).await?,
        Some(params) => session.execute_with_params(&request.sql, params).await?,
    };
    Ok(cursor)
}

async fn release_logged(handle: &mut ConnectionHandle) {
    if let Err(err) = handle.release().await {
        warn!(connection = handle.name(), "Error while releasing connection: {err}");
    }
}
