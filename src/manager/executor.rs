use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use super::{ConnectionManager, WorkerSlot, begin_on, commit_on, dispatch, rollback_on};
use crate::classifier::{ErrorClassifier, sql_for_log};
use crate::error::AdapterError;
use crate::handle::{ConnectionHandle, HandleInfo};
use crate::query::QueryRequest;
use crate::results::QueryResult;
use crate::traits::{CredentialProvider, StatementExecutor};

impl ConnectionManager {
    async fn run_on(
        &self,
        slot: &WorkerSlot,
        handle: &mut ConnectionHandle,
        request: QueryRequest,
    ) -> Result<QueryResult, AdapterError> {
        self.ensure_open(slot, handle).await?;
        if request.auto_begin && !handle.transaction_open() {
            begin_on(handle).await?;
        }

        debug!(
            connection = handle.name(),
            "Using {} connection", self.credentials.adapter_type()
        );
        debug!(
            connection = handle.name(),
            "On {}: {}",
            handle.name(),
            sql_for_log(&request.sql, request.abridge)
        );

        let started = Instant::now();
        let outcome = dispatch(handle, &request).await;
        let cursor = ErrorClassifier::settle(handle, &request.sql, started, outcome).await?;
        let result = QueryResult::from_cursor(cursor, request.fetch);
        debug!(
            connection = handle.name(),
            "SQL status: {} in {:.2} seconds",
            result.status(),
            started.elapsed().as_secs_f64()
        );
        Ok(result)
    }
}

#[async_trait]
impl StatementExecutor for ConnectionManager {
    async fn run_query(
        &self,
        worker: &str,
        request: QueryRequest,
    ) -> Result<(HandleInfo, QueryResult), AdapterError> {
        let (slot, mut handle) = self.checkout(worker).await;
        let outcome = self.run_on(&slot, &mut handle, request).await;
        slot.sync_canceller(&handle);
        let result = outcome?;
        Ok((handle.info(), result))
    }

    async fn begin(&self, worker: &str) -> Result<HandleInfo, AdapterError> {
        let (slot, mut handle) = self.checkout(worker).await;
        self.ensure_open(&slot, &mut handle).await?;
        let outcome = begin_on(&mut handle).await;
        slot.sync_canceller(&handle);
        outcome?;
        Ok(handle.info())
    }

    async fn commit(&self, worker: &str) -> Result<HandleInfo, AdapterError> {
        let Some(slot) = self.lookup(worker) else {
            return Err(AdapterError::InternalError(format!(
                "no transaction open on connection \"{worker}\"; begin one before committing"
            )));
        };
        let mut handle = slot.handle.lock().await;
        let outcome = commit_on(&mut handle).await;
        slot.sync_canceller(&handle);
        outcome?;
        Ok(handle.info())
    }

    async fn rollback_if_open(&self, worker: &str) -> Result<(), AdapterError> {
        let Some(slot) = self.lookup(worker) else {
            return Ok(());
        };
        let mut handle = slot.handle.lock().await;
        let outcome = rollback_on(&mut handle).await;
        slot.sync_canceller(&handle);
        outcome
    }
}
