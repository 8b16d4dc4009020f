//! A scripted, in-memory driver for exercising the connection manager
//! without a SQL Server.
//!
//! Responses are queued up front and handed out in order to whichever session
//! executes next; every call a session receives is recorded.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::driver::{Canceller, ColumnInfo, Driver, DriverCursor, DriverError, Session};
use crate::types::RowValues;

/// A call received by a scripted session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCall {
    Execute { sql: String },
    ExecuteWithParams { sql: String, params: Vec<RowValues> },
    Begin,
    Commit,
    Rollback,
    Close,
}

#[derive(Debug)]
enum Scripted {
    Cursor(DriverCursor),
    Database(String),
    Other(String),
}

#[derive(Debug, Default)]
struct Script {
    connection_strings: Vec<String>,
    connect_failures: VecDeque<String>,
    responses: VecDeque<Scripted>,
    gates: HashMap<String, Arc<Notify>>,
    calls: Vec<(usize, SessionCall)>,
    begin_failures: VecDeque<String>,
    close_failures: VecDeque<String>,
    cancellable: bool,
    cancellations: usize,
}

/// Driver whose sessions replay queued responses.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDriver {
    script: Arc<Mutex<Script>>,
}

impl ScriptedDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions from this driver expose a `Canceller`.
    #[must_use]
    pub fn with_cancellation(self) -> Self {
        self.script().cancellable = true;
        self
    }

    /// The next dial fails with a database error carrying `message`.
    pub fn fail_next_connect(&self, message: impl Into<String>) {
        self.script().connect_failures.push_back(message.into());
    }

    pub fn push_cursor(&self, cursor: DriverCursor) {
        self.script().responses.push_back(Scripted::Cursor(cursor));
    }

    /// Queue a result with untyped columns.
    pub fn push_rows(&self, columns: &[&str], rows: Vec<Vec<RowValues>>) {
        self.push_cursor(DriverCursor {
            columns: columns.iter().map(|name| ColumnInfo::new(*name, None)).collect(),
            rows,
            status_message: None,
        });
    }

    /// The next statement fails as if the engine rejected it.
    pub fn push_database_error(&self, message: impl Into<String>) {
        self.script()
            .responses
            .push_back(Scripted::Database(message.into()));
    }

    /// The next statement fails with an unclassified driver error.
    pub fn push_other_error(&self, message: impl Into<String>) {
        self.script().responses.push_back(Scripted::Other(message.into()));
    }

    pub fn fail_next_begin(&self, message: impl Into<String>) {
        self.script().begin_failures.push_back(message.into());
    }

    pub fn fail_next_close(&self, message: impl Into<String>) {
        self.script().close_failures.push_back(message.into());
    }

    /// Executing exactly `sql` waits until `gate` is notified.
    pub fn gate_sql(&self, sql: impl Into<String>, gate: Arc<Notify>) {
        self.script().gates.insert(sql.into(), gate);
    }

    #[must_use]
    pub fn dial_count(&self) -> usize {
        self.script().connection_strings.len()
    }

    #[must_use]
    pub fn connection_strings(&self) -> Vec<String> {
        self.script().connection_strings.clone()
    }

    /// Every call received, across all sessions, in arrival order.
    #[must_use]
    pub fn calls(&self) -> Vec<SessionCall> {
        self.script().calls.iter().map(|(_, call)| call.clone()).collect()
    }

    /// Calls received by the session from the `session`-th dial (1-based).
    #[must_use]
    pub fn session_calls(&self, session: usize) -> Vec<SessionCall> {
        self.script()
            .calls
            .iter()
            .filter(|(id, _)| *id == session)
            .map(|(_, call)| call.clone())
            .collect()
    }

    #[must_use]
    pub fn cancellations(&self) -> usize {
        self.script().cancellations
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        lock(&self.script)
    }

    fn dial(&self, connection_string: &str) -> Result<Box<dyn Session>, DriverError> {
        let mut script = self.script();
        if let Some(message) = script.connect_failures.pop_front() {
            return Err(DriverError::Database(message));
        }
        script.connection_strings.push(connection_string.to_string());
        Ok(Box::new(ScriptedSession {
            id: script.connection_strings.len(),
            script: Arc::clone(&self.script),
            cancellable: script.cancellable,
            closed: false,
        }))
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    async fn connect(&self, connection_string: &str) -> Result<Box<dyn Session>, DriverError> {
        self.dial(connection_string)
    }
}

fn lock(script: &Mutex<Script>) -> MutexGuard<'_, Script> {
    script.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ScriptedSession {
    id: usize,
    script: Arc<Mutex<Script>>,
    cancellable: bool,
    closed: bool,
}

impl ScriptedSession {
    fn record(&self, call: SessionCall) {
        lock(&self.script).calls.push((self.id, call));
    }

    fn gate_for(&self, sql: &str) -> Option<Arc<Notify>> {
        lock(&self.script).gates.get(sql).cloned()
    }

    fn next_response(&self) -> Result<DriverCursor, DriverError> {
        match lock(&self.script).responses.pop_front() {
            None => Ok(DriverCursor::default()),
            Some(Scripted::Cursor(cursor)) => Ok(cursor),
            Some(Scripted::Database(message)) => Err(DriverError::Database(message)),
            Some(Scripted::Other(message)) => Err(DriverError::other(message)),
        }
    }

    fn ensure_live(&self) -> Result<(), DriverError> {
        if self.closed {
            Err(DriverError::Database("session is closed".to_string()))
        } else {
            Ok(())
        }
    }

    async fn run(&mut self, sql: &str, call: SessionCall) -> Result<DriverCursor, DriverError> {
        self.ensure_live()?;
        self.record(call);
        if let Some(gate) = self.gate_for(sql) {
            gate.notified().await;
        }
        self.next_response()
    }
}

#[async_trait]
impl Session for ScriptedSession {
    async fn execute(&mut self, sql: &str) -> Result<DriverCursor, DriverError> {
        self.run(sql, SessionCall::Execute { sql: sql.to_string() })
            .await
    }

    async fn execute_with_params(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<DriverCursor, DriverError> {
        self.run(
            sql,
            SessionCall::ExecuteWithParams {
                sql: sql.to_string(),
                params: params.to_vec(),
            },
        )
        .await
    }

    async fn begin(&mut self) -> Result<(), DriverError> {
        self.ensure_live()?;
        self.record(SessionCall::Begin);
        match lock(&self.script).begin_failures.pop_front() {
            Some(message) => Err(DriverError::Database(message)),
            None => Ok(()),
        }
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        self.ensure_live()?;
        self.record(SessionCall::Commit);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.ensure_live()?;
        self.record(SessionCall::Rollback);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.record(SessionCall::Close);
        match lock(&self.script).close_failures.pop_front() {
            Some(message) => Err(DriverError::Database(message)),
            None => Ok(()),
        }
    }

    fn canceller(&self) -> Option<Arc<dyn Canceller>> {
        if self.cancellable {
            Some(Arc::new(ScriptedCanceller {
                script: Arc::clone(&self.script),
            }))
        } else {
            None
        }
    }
}

struct ScriptedCanceller {
    script: Arc<Mutex<Script>>,
}

impl Canceller for ScriptedCanceller {
    fn cancel(&self) -> Result<(), DriverError> {
        lock(&self.script).cancellations += 1;
        Ok(())
    }
}
