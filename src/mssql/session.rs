use async_trait::async_trait;

use super::client::{MssqlClient, connect_client};
use super::config::{MssqlOptions, build_tiberius_config};
use super::query::{bind_query_params, collect_cursor};
use crate::driver::{Driver, DriverCursor, DriverError, Session};
use crate::types::RowValues;

/// Dials SQL Server with tiberius.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiberiusDriver;

impl TiberiusDriver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for TiberiusDriver {
    async fn connect(&self, connection_string: &str) -> Result<Box<dyn Session>, DriverError> {
        let opts = MssqlOptions::from_connection_string(connection_string)?;
        let config = build_tiberius_config(&opts)?;
        // SQL Server sessions start in autocommit mode
        let client = connect_client(config, opts.instance_name.is_some()).await?;
        Ok(Box::new(MssqlSession::new(client)))
    }
}

/// A tiberius client behind the [`Session`] trait.
///
/// Transaction control goes through plain SQL batches. A `BEGIN TRANSACTION`
/// sent through `sp_executesql` trips the transaction-count check when the
/// procedure returns.
pub struct MssqlSession {
    client: Option<MssqlClient>,
}

impl MssqlSession {
    #[must_use]
    pub fn new(client: MssqlClient) -> Self {
        Self {
            client: Some(client),
        }
    }

    fn client(&mut self) -> Result<&mut MssqlClient, DriverError> {
        self.client
            .as_mut()
            .ok_or_else(|| DriverError::Database("SQL Server session is closed".to_string()))
    }

    async fn batch(&mut self, sql: &str) -> Result<(), DriverError> {
        self.client()?.simple_query(sql).await?.into_results().await?;
        Ok(())
    }
}

#[async_trait]
impl Session for MssqlSession {
    async fn execute(&mut self, sql: &str) -> Result<DriverCursor, DriverError> {
        let stream = self.client()?.simple_query(sql).await?;
        collect_cursor(stream).await
    }

    async fn execute_with_params(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<DriverCursor, DriverError> {
        let query = bind_query_params(sql, params);
        let stream = query.query(self.client()?).await?;
        collect_cursor(stream).await
    }

    async fn begin(&mut self) -> Result<(), DriverError> {
        self.batch("BEGIN TRANSACTION").await
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        self.batch("COMMIT TRANSACTION").await
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.batch("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if let Some(client) = self.client.take() {
            client.close().await?;
        }
        Ok(())
    }
}
