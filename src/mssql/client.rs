use tiberius::{Client, Config as TiberiusConfig, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use crate::driver::DriverError;

/// Type alias for SQL Server client
pub type MssqlClient = Client<Compat<TcpStream>>;

/// Open a TCP stream and log in.
///
/// Named instances are resolved through the SQL Browser service. A routing
/// answer from the server (Azure SQL gateways) is followed once.
///
/// # Errors
/// Returns `DriverError::Database` when the server cannot be reached or
/// rejects the login.
pub async fn connect_client(
    config: TiberiusConfig,
    named_instance: bool,
) -> Result<MssqlClient, DriverError> {
    let tcp = if named_instance {
        TcpStream::connect_named(&config).await?
    } else {
        open_tcp(&config.get_addr()).await?
    };

    match Client::connect(config.clone(), tcp.compat_write()).await {
        Ok(client) => Ok(client),
        Err(tiberius::error::Error::Routing { host, port }) => {
            debug!("SQL Server redirected the login to {host}:{port}");
            let mut config = config;
            config.host(&host);
            config.port(port);
            let tcp = open_tcp(&config.get_addr()).await?;
            Ok(Client::connect(config, tcp.compat_write()).await?)
        }
        Err(err) => Err(err.into()),
    }
}

async fn open_tcp(addr: &str) -> Result<TcpStream, DriverError> {
    let tcp = TcpStream::connect(addr)
        .await
        .map_err(|e| DriverError::Database(format!("TCP connection error to {addr}: {e}")))?;
    tcp.set_nodelay(true)
        .map_err(|e| DriverError::Database(format!("TCP connection error to {addr}: {e}")))?;
    Ok(tcp)
}
