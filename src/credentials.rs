//! Credential record: how to reach one SQL Server database.
//!
//! Profiles arrive as loosely keyed JSON objects. [`normalize_profile`] maps
//! the accepted aliases onto canonical keys once, at load time, and
//! [`CredentialRecord::from_profile`] validates the result into an immutable
//! record.

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::AdapterError;
use crate::traits::CredentialProvider;

/// Adapter type name reported to hosts and accepted in a profile's `type` key.
pub const ADAPTER_TYPE: &str = "mssql";

/// Alias → canonical key.
pub const ALIASES: &[(&str, &str)] = &[
    ("user", "UID"),
    ("username", "UID"),
    ("pass", "PWD"),
    ("password", "PWD"),
    ("server", "host"),
    ("trusted_connection", "windows_login"),
];

const REDACTED: &str = "****";

/// How the session authenticates.
#[derive(Clone, PartialEq, Eq)]
pub enum Authentication {
    SqlServer { uid: String, pwd: String },
    /// Integrated (windows) authentication with the OS credentials.
    Integrated,
}

impl fmt::Debug for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authentication::SqlServer { uid, .. } => f
                .debug_struct("SqlServer")
                .field("uid", uid)
                .field("pwd", &REDACTED)
                .finish(),
            Authentication::Integrated => f.write_str("Integrated"),
        }
    }
}

/// Validated, immutable connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    driver: String,
    host: String,
    database: String,
    schema: String,
    auth: Authentication,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProfile {
    driver: String,
    host: String,
    database: String,
    schema: String,
    #[serde(rename = "UID", default)]
    uid: Option<String>,
    #[serde(rename = "PWD", default)]
    pwd: Option<String>,
    #[serde(default)]
    windows_login: Option<bool>,
}

/// Rewrite alias keys to their canonical names.
///
/// A `type` key naming this adapter is dropped; any other adapter type is
/// rejected. `trusted_connection` also accepts the strings `yes`/`no`.
///
/// # Errors
/// Returns `AdapterError::ConfigError` when two keys resolve to the same
/// canonical key, or when `type`/`trusted_connection` hold unusable values.
pub fn normalize_profile(profile: Map<String, Value>) -> Result<Map<String, Value>, AdapterError> {
    let mut normalized = Map::with_capacity(profile.len());
    for (key, value) in profile {
        if key == "type" {
            match value.as_str() {
                Some(ADAPTER_TYPE) => continue,
                _ => {
                    return Err(AdapterError::ConfigError(format!(
                        "profile type {value} is not supported by the {ADAPTER_TYPE} adapter"
                    )));
                }
            }
        }

        let canonical = ALIASES
            .iter()
            .find(|(alias, _)| *alias == key)
            .map_or(key.as_str(), |(_, canonical)| *canonical)
            .to_string();

        let value = if canonical == "windows_login" {
            login_flag(&key, value)?
        } else {
            value
        };

        if normalized.contains_key(&canonical) {
            return Err(AdapterError::ConfigError(format!(
                "`{key}` duplicates `{canonical}`; set only one of them"
            )));
        }
        normalized.insert(canonical, value);
    }
    Ok(normalized)
}

fn login_flag(key: &str, value: Value) -> Result<Value, AdapterError> {
    let Value::String(text) = &value else {
        return Ok(value);
    };
    match text.to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" => Ok(Value::Bool(true)),
        "no" | "false" | "0" => Ok(Value::Bool(false)),
        _ => Err(AdapterError::ConfigError(format!(
            "`{key}` must be a boolean or yes/no, got \"{text}\""
        ))),
    }
}

impl CredentialRecord {
    /// Start building a record in code rather than from a profile.
    #[must_use]
    pub fn builder(
        driver: impl Into<String>,
        host: impl Into<String>,
        database: impl Into<String>,
        schema: impl Into<String>,
    ) -> CredentialRecordBuilder {
        CredentialRecordBuilder {
            driver: driver.into(),
            host: host.into(),
            database: database.into(),
            schema: schema.into(),
            uid: None,
            pwd: None,
            windows_login: false,
        }
    }

    /// Normalize and validate a JSON profile object.
    ///
    /// # Errors
    /// Returns `AdapterError::ConfigError` for unknown keys, missing required
    /// keys, or a missing UID/PWD pair when `windows_login` is not set.
    pub fn from_profile(profile: Value) -> Result<Self, AdapterError> {
        let Value::Object(map) = profile else {
            return Err(AdapterError::ConfigError(
                "credential profile must be a JSON object".to_string(),
            ));
        };
        let normalized = normalize_profile(map)?;
        let raw: RawProfile = serde_json::from_value(Value::Object(normalized))
            .map_err(|e| AdapterError::ConfigError(format!("invalid credential profile: {e}")))?;
        Self::validate(raw)
    }

    /// Parse a JSON profile from text.
    ///
    /// # Errors
    /// Returns `AdapterError::ConfigError` if the text is not JSON or the
    /// profile is invalid.
    pub fn from_json_str(text: &str) -> Result<Self, AdapterError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| AdapterError::ConfigError(format!("credential profile is not JSON: {e}")))?;
        Self::from_profile(value)
    }

    /// Read a JSON profile from disk.
    ///
    /// # Errors
    /// Returns `AdapterError::ConfigError` if the file cannot be read or the
    /// profile is invalid.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, AdapterError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            AdapterError::ConfigError(format!("cannot read profile {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    fn validate(raw: RawProfile) -> Result<Self, AdapterError> {
        for (name, value) in [
            ("driver", &raw.driver),
            ("host", &raw.host),
            ("database", &raw.database),
            ("schema", &raw.schema),
        ] {
            if value.trim().is_empty() {
                return Err(AdapterError::ConfigError(format!("`{name}` must not be empty")));
            }
        }

        let auth = if raw.windows_login.unwrap_or(false) {
            Authentication::Integrated
        } else {
            match (raw.uid, raw.pwd) {
                (Some(uid), Some(pwd)) => Authentication::SqlServer { uid, pwd },
                _ => {
                    return Err(AdapterError::ConfigError(
                        "UID and PWD are required unless windows_login is true".to_string(),
                    ));
                }
            }
        };

        Ok(Self {
            driver: raw.driver,
            host: raw.host,
            database: raw.database,
            schema: raw.schema,
            auth,
        })
    }

    #[must_use]
    pub fn driver(&self) -> &str {
        &self.driver
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    #[must_use]
    pub fn authentication(&self) -> &Authentication {
        &self.auth
    }

    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        match &self.auth {
            Authentication::SqlServer { uid, .. } => Some(uid),
            Authentication::Integrated => None,
        }
    }

    #[must_use]
    pub fn pwd(&self) -> Option<&str> {
        match &self.auth {
            Authentication::SqlServer { pwd, .. } => Some(pwd),
            Authentication::Integrated => None,
        }
    }

    #[must_use]
    pub fn windows_login(&self) -> bool {
        matches!(self.auth, Authentication::Integrated)
    }

    fn render_connection_string(&self, pwd_override: Option<&str>) -> String {
        let mut out = format!(
            "DRIVER={{{}}};SERVER={};Database={}",
            self.driver.replace('}', "}}"),
            escape_value(&self.host),
            escape_value(&self.database)
        );
        match &self.auth {
            Authentication::SqlServer { uid, pwd } => {
                out.push_str(";UID=");
                out.push_str(&escape_value(uid));
                out.push_str(";PWD=");
                out.push_str(&pwd_override.map_or_else(|| escape_value(pwd), str::to_string));
            }
            Authentication::Integrated => out.push_str(";trusted_connection=yes"),
        }
        out
    }
}

impl CredentialProvider for CredentialRecord {
    fn adapter_type(&self) -> &'static str {
        ADAPTER_TYPE
    }

    fn connection_string(&self) -> String {
        self.render_connection_string(None)
    }

    fn redacted_connection_string(&self) -> String {
        self.render_connection_string(Some(REDACTED))
    }

    fn connection_keys(&self) -> Vec<(&'static str, String)> {
        vec![
            ("host", self.host.clone()),
            ("database", self.database.clone()),
            ("schema", self.schema.clone()),
            ("UID", self.uid().unwrap_or_default().to_string()),
            ("windows_login", self.windows_login().to_string()),
        ]
    }
}

/// Brace-quote a value that would otherwise break `KEY=VALUE;` parsing.
fn escape_value(value: &str) -> String {
    if value.contains(';') || value.starts_with('{') {
        format!("{{{}}}", value.replace('}', "}}"))
    } else {
        value.to_string()
    }
}

/// Builder for [`CredentialRecord`].
#[derive(Clone)]
pub struct CredentialRecordBuilder {
    driver: String,
    host: String,
    database: String,
    schema: String,
    uid: Option<String>,
    pwd: Option<String>,
    windows_login: bool,
}

impl fmt::Debug for CredentialRecordBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecordBuilder")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("uid", &self.uid)
            .field("pwd", &self.pwd.as_ref().map(|_| REDACTED))
            .field("windows_login", &self.windows_login)
            .finish()
    }
}

impl CredentialRecordBuilder {
    #[must_use]
    pub fn sql_auth(mut self, uid: impl Into<String>, pwd: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self.pwd = Some(pwd.into());
        self
    }

    #[must_use]
    pub fn windows_login(mut self, windows_login: bool) -> Self {
        self.windows_login = windows_login;
        self
    }

    /// Validate and build the record.
    ///
    /// # Errors
    /// Returns `AdapterError::ConfigError` under the same rules as
    /// [`CredentialRecord::from_profile`].
    pub fn build(self) -> Result<CredentialRecord, AdapterError> {
        CredentialRecord::validate(RawProfile {
            driver: self.driver,
            host: self.host,
            database: self.database,
            schema: self.schema,
            uid: self.uid,
            pwd: self.pwd,
            windows_login: Some(self.windows_login),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn base() -> Value {
        json!({
            "driver": "ODBC Driver 18 for SQL Server",
            "host": "db.internal",
            "database": "analytics",
            "schema": "dbo",
        })
    }

    fn with(extra: Value) -> Value {
        let mut profile = base();
        let (Value::Object(map), Value::Object(extra)) = (&mut profile, extra) else {
            unreachable!()
        };
        map.extend(extra);
        profile
    }

    #[test]
    fn alias_user_maps_to_uid() {
        let creds = CredentialRecord::from_profile(with(json!({"user": "etl", "PWD": "pw"}))).unwrap();
        assert_eq!(creds.uid(), Some("etl"));
    }

    #[test]
    fn alias_username_maps_to_uid() {
        let creds =
            CredentialRecord::from_profile(with(json!({"username": "etl", "PWD": "pw"}))).unwrap();
        assert_eq!(creds.uid(), Some("etl"));
    }

    #[test]
    fn alias_pass_maps_to_pwd() {
        let creds = CredentialRecord::from_profile(with(json!({"UID": "etl", "pass": "s3cret"}))).unwrap();
        assert_eq!(creds.pwd(), Some("s3cret"));
    }

    #[test]
    fn alias_password_maps_to_pwd() {
        let creds =
            CredentialRecord::from_profile(with(json!({"UID": "etl", "password": "s3cret"}))).unwrap();
        assert_eq!(creds.pwd(), Some("s3cret"));
    }

    #[test]
    fn alias_server_maps_to_host() {
        let profile = json!({
            "driver": "ODBC Driver 18 for SQL Server",
            "server": "db2.internal",
            "database": "analytics",
            "schema": "dbo",
            "UID": "etl",
            "PWD": "pw",
        });
        let creds = CredentialRecord::from_profile(profile).unwrap();
        assert_eq!(creds.host(), "db2.internal");
    }

    #[test]
    fn alias_trusted_connection_maps_to_windows_login() {
        let creds =
            CredentialRecord::from_profile(with(json!({"trusted_connection": true}))).unwrap();
        assert!(creds.windows_login());
        let creds =
            CredentialRecord::from_profile(with(json!({"trusted_connection": "yes"}))).unwrap();
        assert!(creds.windows_login());
    }

    #[test]
    fn alias_collision_is_rejected() {
        let err = CredentialRecord::from_profile(with(json!({"user": "a", "UID": "b", "PWD": "pw"})))
            .unwrap_err();
        assert!(matches!(err, AdapterError::ConfigError(msg) if msg.contains("UID")));
    }

    #[test]
    fn missing_windows_login_means_sql_auth() {
        let err = CredentialRecord::from_profile(base()).unwrap_err();
        assert!(matches!(err, AdapterError::ConfigError(msg) if msg.contains("UID and PWD")));

        let err =
            CredentialRecord::from_profile(with(json!({"windows_login": null, "UID": "etl"})))
                .unwrap_err();
        assert!(matches!(err, AdapterError::ConfigError(_)));
    }

    #[test]
    fn windows_login_ignores_uid_and_pwd() {
        let creds = CredentialRecord::from_profile(with(
            json!({"windows_login": true, "UID": "etl", "PWD": "pw"}),
        ))
        .unwrap();
        assert!(creds.windows_login());
        assert_eq!(creds.uid(), None);
        assert_eq!(creds.pwd(), None);
    }

    #[test]
    fn unknown_and_missing_keys_are_rejected() {
        let err = CredentialRecord::from_profile(with(json!({"UID": "u", "PWD": "p", "port": 1433})))
            .unwrap_err();
        assert!(matches!(err, AdapterError::ConfigError(msg) if msg.contains("port")));

        let err = CredentialRecord::from_profile(json!({"host": "h", "database": "d", "schema": "s"}))
            .unwrap_err();
        assert!(matches!(err, AdapterError::ConfigError(msg) if msg.contains("driver")));
    }

    #[test]
    fn profile_type_must_be_mssql() {
        assert!(CredentialRecord::from_profile(with(json!({"type": "mssql", "windows_login": true}))).is_ok());
        let err = CredentialRecord::from_profile(with(json!({"type": "postgres", "windows_login": true})))
            .unwrap_err();
        assert!(matches!(err, AdapterError::ConfigError(_)));
    }

    #[test]
    fn integrated_connection_string() {
        let creds = CredentialRecord::builder("ODBC Driver 17 for SQL Server", "sql01", "dw", "dbo")
            .windows_login(true)
            .build()
            .unwrap();
        let conn = creds.connection_string();
        assert_eq!(
            conn,
            "DRIVER={ODBC Driver 17 for SQL Server};SERVER=sql01;Database=dw;trusted_connection=yes"
        );
        assert!(!conn.contains("UID="));
        assert!(!conn.contains("PWD="));
    }

    #[test]
    fn sql_auth_connection_string() {
        let creds = CredentialRecord::builder("ODBC Driver 17 for SQL Server", "sql01", "dw", "dbo")
            .sql_auth("loader", "hunter2")
            .build()
            .unwrap();
        let conn = creds.connection_string();
        assert!(conn.ends_with(";UID=loader;PWD=hunter2"));
        assert!(!conn.contains("trusted_connection"));
        assert!(creds.redacted_connection_string().ends_with(";PWD=****"));
    }

    #[test]
    fn awkward_values_are_brace_quoted() {
        let creds = CredentialRecord::builder("Driver", "sql01", "dw", "dbo")
            .sql_auth("loader", "a;b}c")
            .build()
            .unwrap();
        assert!(creds.connection_string().ends_with("PWD={a;b}}c}"));
    }

    #[test]
    fn debug_never_shows_password() {
        let creds = CredentialRecord::builder("Driver", "sql01", "dw", "dbo")
            .sql_auth("loader", "hunter2")
            .build()
            .unwrap();
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("loader"));
        let builder = CredentialRecord::builder("Driver", "h", "d", "s").sql_auth("u", "hunter2");
        assert!(!format!("{builder:?}").contains("hunter2"));
    }

    #[test]
    fn connection_keys_skip_password() {
        let creds = CredentialRecord::builder("Driver", "sql01", "dw", "dbo")
            .sql_auth("loader", "hunter2")
            .build()
            .unwrap();
        let keys = creds.connection_keys();
        assert_eq!(keys.len(), 5);
        assert!(keys.iter().all(|(_, v)| v != "hunter2"));
        assert!(keys.contains(&("UID", "loader".to_string())));
    }
}
