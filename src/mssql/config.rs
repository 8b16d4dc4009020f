use std::fmt;

use tiberius::{AuthMethod, Config as TiberiusConfig};
use tracing::debug;

use crate::driver::DriverError;

/// How the tiberius session logs in.
#[derive(Clone, PartialEq, Eq)]
pub enum MssqlAuth {
    SqlServer { user: String, password: String },
    Integrated,
}

impl fmt::Debug for MssqlAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MssqlAuth::SqlServer { user, .. } => f
                .debug_struct("SqlServer")
                .field("user", user)
                .field("password", &"****")
                .finish(),
            MssqlAuth::Integrated => f.write_str("Integrated"),
        }
    }
}

/// Connection settings extracted from an ODBC-style connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MssqlOptions {
    /// ODBC driver name; recorded for diagnostics, tiberius speaks TDS itself.
    pub driver: Option<String>,
    pub server: String,
    pub port: Option<u16>,
    pub instance_name: Option<String>,
    pub database: String,
    pub auth: MssqlAuth,
}

impl MssqlOptions {
    /// Parse `KEY=VALUE;...` as produced by the credential record.
    ///
    /// `SERVER` accepts `host`, `host,port`, `host\instance` and an optional
    /// `tcp:` prefix. Keys are case-insensitive; unknown keys are ignored.
    ///
    /// # Errors
    /// Returns `DriverError::Other` for malformed strings or missing
    /// server, database or credentials.
    pub fn from_connection_string(connection_string: &str) -> Result<Self, DriverError> {
        let mut driver = None;
        let mut server = None;
        let mut database = None;
        let mut user = None;
        let mut password = None;
        let mut trusted = false;

        for (key, value) in parse_segments(connection_string)? {
            match key.as_str() {
                "driver" => driver = Some(value),
                "server" | "address" | "addr" | "data source" => server = Some(value),
                "database" | "initial catalog" => database = Some(value),
                "uid" | "user id" => user = Some(value),
                "pwd" | "password" => password = Some(value),
                "trusted_connection" | "integrated security" => {
                    trusted = matches!(
                        value.to_ascii_lowercase().as_str(),
                        "yes" | "true" | "sspi"
                    );
                }
                other => debug!("ignoring connection string key `{other}`"),
            }
        }

        let server = server.ok_or_else(|| malformed("SERVER is missing"))?;
        let (server, port, instance_name) = split_server(&server)?;
        let database = database.ok_or_else(|| malformed("Database is missing"))?;
        let auth = match (trusted, user, password) {
            (true, _, _) => MssqlAuth::Integrated,
            (false, Some(user), Some(password)) => MssqlAuth::SqlServer { user, password },
            _ => return Err(malformed("UID/PWD or trusted_connection=yes is required")),
        };

        Ok(Self {
            driver,
            server,
            port,
            instance_name,
            database,
            auth,
        })
    }
}

fn malformed(detail: impl fmt::Display) -> DriverError {
    DriverError::other(format!("malformed connection string: {detail}"))
}

/// Split a connection string into lowercase keys and unquoted values.
///
/// Values wrapped in `{...}` may contain `;`; a literal `}` inside them is
/// written `}}`.
fn parse_segments(input: &str) -> Result<Vec<(String, String)>, DriverError> {
    let mut segments = Vec::new();
    let mut chars = input.chars().peekable();
    loop {
        while chars.next_if(|c| *c == ';' || c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        loop {
            match chars.next() {
                Some('=') => break,
                Some(';') | None => {
                    return Err(malformed(format!("`{}` has no value", key.trim())));
                }
                Some(c) => key.push(c),
            }
        }

        let mut value = String::new();
        if chars.next_if_eq(&'{').is_some() {
            loop {
                match chars.next() {
                    Some('}') if chars.peek() == Some(&'}') => {
                        chars.next();
                        value.push('}');
                    }
                    Some('}') => break,
                    Some(c) => value.push(c),
                    None => {
                        return Err(malformed(format!("unterminated braces after `{}`", key.trim())));
                    }
                }
            }
            for c in chars.by_ref() {
                if c == ';' {
                    break;
                }
                if !c.is_whitespace() {
                    return Err(malformed(format!("text after closing brace of `{}`", key.trim())));
                }
            }
        } else {
            for c in chars.by_ref() {
                if c == ';' {
                    break;
                }
                value.push(c);
            }
            value = value.trim().to_string();
        }

        segments.push((key.trim().to_ascii_lowercase(), value));
    }
    Ok(segments)
}

fn split_server(server: &str) -> Result<(String, Option<u16>, Option<String>), DriverError> {
    let server = server.strip_prefix("tcp:").unwrap_or(server);
    let (rest, port) = match server.split_once(',') {
        Some((rest, port)) => {
            let port = port
                .trim()
                .parse::<u16>()
                .map_err(|e| malformed(format!("bad port `{port}`: {e}")))?;
            (rest, Some(port))
        }
        None => (server, None),
    };
    let (host, instance) = match rest.split_once('\\') {
        Some((host, instance)) => (host, Some(instance.trim().to_string())),
        None => (rest, None),
    };
    let host = host.trim();
    if host.is_empty() {
        return Err(malformed("SERVER has no host"));
    }
    Ok((host.to_string(), port, instance))
}

/// Build the tiberius configuration for a parsed connection string.
///
/// # Errors
/// Returns `DriverError::Other` when integrated authentication is requested on
/// a platform tiberius cannot do it on.
pub fn build_tiberius_config(opts: &MssqlOptions) -> Result<TiberiusConfig, DriverError> {
    let mut config = TiberiusConfig::new();
    config.host(&opts.server);
    config.database(&opts.database);
    if let Some(port) = opts.port {
        config.port(port);
    }
    if let Some(instance) = &opts.instance_name {
        config.instance_name(instance);
    }
    config.application_name(env!("CARGO_PKG_NAME"));
    match &opts.auth {
        MssqlAuth::SqlServer { user, password } => {
            config.authentication(AuthMethod::sql_server(user, password));
        }
        MssqlAuth::Integrated => config.authentication(integrated_auth()?),
    }
    config.trust_cert();
    Ok(config)
}

#[cfg(windows)]
fn integrated_auth() -> Result<AuthMethod, DriverError> {
    Ok(AuthMethod::Integrated)
}

#[cfg(not(windows))]
fn integrated_auth() -> Result<AuthMethod, DriverError> {
    Err(DriverError::other(
        "integrated (windows) authentication is only available on Windows builds",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sql_auth_string() {
        let opts = MssqlOptions::from_connection_string(
            "DRIVER={ODBC Driver 18 for SQL Server};SERVER=sql01,1444;Database=dw;UID=loader;PWD=hunter2",
        )
        .unwrap();
        assert_eq!(opts.driver.as_deref(), Some("ODBC Driver 18 for SQL Server"));
        assert_eq!(opts.server, "sql01");
        assert_eq!(opts.port, Some(1444));
        assert_eq!(opts.database, "dw");
        assert_eq!(
            opts.auth,
            MssqlAuth::SqlServer {
                user: "loader".into(),
                password: "hunter2".into()
            }
        );
    }

    #[test]
    fn parses_trusted_named_instance() {
        let opts = MssqlOptions::from_connection_string(
            "DRIVER={Driver};SERVER=tcp:sql01\\REPORTING;Database=dw;trusted_connection=yes",
        )
        .unwrap();
        assert_eq!(opts.server, "sql01");
        assert_eq!(opts.instance_name.as_deref(), Some("REPORTING"));
        assert_eq!(opts.port, None);
        assert_eq!(opts.auth, MssqlAuth::Integrated);
    }

    #[test]
    fn braced_values_keep_semicolons() {
        let segments = parse_segments("PWD={a;b}}c};UID=x").unwrap();
        assert_eq!(
            segments,
            vec![
                ("pwd".to_string(), "a;b}c".to_string()),
                ("uid".to_string(), "x".to_string())
            ]
        );
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!(parse_segments("SERVER").is_err());
        assert!(parse_segments("PWD={open").is_err());
        assert!(MssqlOptions::from_connection_string("SERVER=h;Database=d").is_err());
        assert!(MssqlOptions::from_connection_string("SERVER=h,notaport;Database=d;UID=u;PWD=p").is_err());
    }

    #[test]
    fn password_not_in_debug_output() {
        let opts = MssqlOptions::from_connection_string("SERVER=h;Database=d;UID=u;PWD=hunter2").unwrap();
        assert!(!format!("{opts:?}").contains("hunter2"));
    }

    #[test]
    fn sql_auth_builds_config() {
        let opts = MssqlOptions::from_connection_string("SERVER=h,1433;Database=d;UID=u;PWD=p").unwrap();
        let config = build_tiberius_config(&opts).unwrap();
        assert_eq!(config.get_addr(), "h:1433");
    }
}
