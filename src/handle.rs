use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::driver::{DriverError, Session};
use crate::error::AdapterError;

/// Lifecycle state of a [`ConnectionHandle`].
///
/// ```text
/// Init --dial ok--> Open --release--> Closed
/// Init --dial err--> Fail
/// ```
///
/// Nothing leaves `Fail` or `Closed`; such handles are replaced, not reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Init,
    Open,
    Fail,
    Closed,
}

impl ConnectionState {
    /// `Fail` and `Closed` handles can never run another statement.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Fail | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Init => "init",
            ConnectionState::Open => "open",
            ConnectionState::Fail => "fail",
            ConnectionState::Closed => "closed",
        })
    }
}

/// One worker's connection: a driver session plus its observable state.
///
/// State changes are reserved to the connection manager; callers can only
/// observe them.
pub struct ConnectionHandle {
    name: String,
    state: ConnectionState,
    transaction_open: bool,
    session: Option<Box<dyn Session>>,
    created_at: DateTime<Utc>,
}

/// Point-in-time copy of a handle's observable fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandleInfo {
    pub name: String,
    pub state: ConnectionState,
    pub transaction_open: bool,
    pub created_at: DateTime<Utc>,
}

// Manual Debug implementation because sessions do not expose `Debug`
impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("transaction_open", &self.transaction_open)
            .field("session", &self.session.as_ref().map(|_| "<Session>"))
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl ConnectionHandle {
    /// A fresh handle in the `Init` state.
    #[must_use]
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ConnectionState::Init,
            transaction_open: false,
            session: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    #[must_use]
    pub fn transaction_open(&self) -> bool {
        self.transaction_open
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn info(&self) -> HandleInfo {
        HandleInfo {
            name: self.name.clone(),
            state: self.state,
            transaction_open: self.transaction_open,
            created_at: self.created_at,
        }
    }

    pub(crate) fn mark_open(&mut self, session: Box<dyn Session>) {
        self.session = Some(session);
        self.state = ConnectionState::Open;
        self.transaction_open = false;
    }

    pub(crate) fn mark_failed(&mut self) {
        self.session = None;
        self.state = ConnectionState::Fail;
        self.transaction_open = false;
    }

    /// Swap a terminal handle for a fresh `Init` one under the same name.
    pub(crate) fn renew(&mut self) {
        *self = ConnectionHandle::new(std::mem::take(&mut self.name));
    }

    pub(crate) fn set_transaction_open(&mut self, open: bool) -> Result<(), AdapterError> {
        if open && !self.is_open() {
            return Err(AdapterError::InternalError(format!(
                "cannot open a transaction on connection \"{}\" in state {}",
                self.name, self.state
            )));
        }
        self.transaction_open = open;
        Ok(())
    }

    pub(crate) fn session_mut(&mut self) -> Result<&mut (dyn Session + 'static), AdapterError> {
        match (self.state, self.session.as_deref_mut()) {
            (ConnectionState::Open, Some(session)) => Ok(session),
            (state, _) => Err(AdapterError::InternalError(format!(
                "connection \"{}\" is {state}; open a fresh connection before running statements",
                self.name
            ))),
        }
    }

    pub(crate) fn session(&self) -> Option<&(dyn Session + 'static)> {
        self.session.as_deref()
    }

    /// Close the session and move to `Closed`.
    ///
    /// An open transaction is rolled back first. Only `Open` handles change
    /// state; releasing any other handle does nothing. The state is `Closed`
    /// afterwards even when the driver reports an error, which is returned so
    /// the caller can log it.
    pub(crate) async fn release(&mut self) -> Result<(), DriverError> {
        if self.state != ConnectionState::Open {
            return Ok(());
        }
        let had_transaction = std::mem::replace(&mut self.transaction_open, false);
        self.state = ConnectionState::Closed;
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        let rollback = if had_transaction {
            session.rollback().await
        } else {
            Ok(())
        };
        let close = session.close().await;
        rollback.and(close)
    }
}
