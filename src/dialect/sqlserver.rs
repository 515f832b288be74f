//! SQL Server connection settings and pool construction.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, PersistenceError, StoreResult};

/// Configuration for the SQL Server dialect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlServerSettings {
    /// Database host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Database name.
    #[serde(default = "default_database")]
    pub database: String,

    /// Login user.
    #[serde(default = "default_user")]
    pub user: String,

    /// Login password. Required at connect time; no default.
    #[serde(default)]
    pub password: Option<String>,

    /// TDS port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Whether to accept the server certificate without validation.
    /// On by default to match local-container deployments.
    #[serde(default = "default_trust_certificate")]
    pub trust_certificate: bool,

    /// Connect timeout in milliseconds. Retained for environment parity;
    /// the pool applies its own wait semantics and does not consume this.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Minimum pool size. Retained for environment parity; the pool grows
    /// from zero on demand and does not pre-warm connections.
    #[serde(default)]
    pub pool_min: usize,

    /// Maximum pool size.
    #[serde(default = "default_pool_max")]
    pub pool_max: usize,
}

/// Caller overrides for [`SqlServerSettings`]. `None` fields leave the
/// environment-resolved value untouched.
#[derive(Debug, Clone, Default)]
pub struct SqlServerOverrides {
    /// Database host.
    pub host: Option<String>,
    /// Database name.
    pub database: Option<String>,
    /// Login user.
    pub user: Option<String>,
    /// Login password.
    pub password: Option<String>,
    /// TDS port.
    pub port: Option<u16>,
    /// Certificate trust flag.
    pub trust_certificate: Option<bool>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Minimum pool size.
    pub pool_min: Option<usize>,
    /// Maximum pool size.
    pub pool_max: Option<usize>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_database() -> String {
    "master".to_string()
}

fn default_user() -> String {
    "sa".to_string()
}

fn default_port() -> u16 {
    1433
}

fn default_trust_certificate() -> bool {
    true
}

fn default_connect_timeout_ms() -> u64 {
    30_000
}

fn default_pool_max() -> usize {
    100
}

impl Default for SqlServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            database: default_database(),
            user: default_user(),
            password: None,
            port: default_port(),
            trust_certificate: default_trust_certificate(),
            connect_timeout_ms: default_connect_timeout_ms(),
            pool_min: 0,
            pool_max: default_pool_max(),
        }
    }
}

impl SqlServerSettings {
    /// Builds settings from the process environment.
    ///
    /// Reads `SQL_SERVER_HOST`, `SQL_SERVER_DATABASE`, `SQL_SERVER_USER`,
    /// `SQL_SERVER_PASSWORD`, `SQL_SERVER_PORT`, `SQL_SERVER_TRUST_CERT`,
    /// `SQL_SERVER_CONNECT_TIMEOUT`, `TARN_MIN`, `TARN_MAX`.
    pub fn from_env() -> StoreResult<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary environment lookup.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> StoreResult<Self> {
        let mut settings = Self::default();
        if let Some(host) = lookup("SQL_SERVER_HOST") {
            settings.host = host;
        }
        if let Some(database) = lookup("SQL_SERVER_DATABASE") {
            settings.database = database;
        }
        if let Some(user) = lookup("SQL_SERVER_USER") {
            settings.user = user;
        }
        if let Some(password) = lookup("SQL_SERVER_PASSWORD") {
            settings.password = Some(password);
        }
        if let Some(port) = lookup("SQL_SERVER_PORT") {
            settings.port = parse_field("SQL_SERVER_PORT", &port)?;
        }
        if let Some(trust) = lookup("SQL_SERVER_TRUST_CERT") {
            settings.trust_certificate = parse_bool("SQL_SERVER_TRUST_CERT", &trust)?;
        }
        if let Some(timeout) = lookup("SQL_SERVER_CONNECT_TIMEOUT") {
            settings.connect_timeout_ms = parse_field("SQL_SERVER_CONNECT_TIMEOUT", &timeout)?;
        }
        if let Some(min) = lookup("TARN_MIN") {
            settings.pool_min = parse_field("TARN_MIN", &min)?;
        }
        if let Some(max) = lookup("TARN_MAX") {
            settings.pool_max = parse_field("TARN_MAX", &max)?;
        }
        Ok(settings)
    }

    /// Applies caller overrides on top of the resolved settings.
    pub fn apply(&mut self, overrides: &SqlServerOverrides) {
        if let Some(host) = &overrides.host {
            self.host = host.clone();
        }
        if let Some(database) = &overrides.database {
            self.database = database.clone();
        }
        if let Some(user) = &overrides.user {
            self.user = user.clone();
        }
        if let Some(password) = &overrides.password {
            self.password = Some(password.clone());
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(trust) = overrides.trust_certificate {
            self.trust_certificate = trust;
        }
        if let Some(timeout) = overrides.connect_timeout_ms {
            self.connect_timeout_ms = timeout;
        }
        if let Some(min) = overrides.pool_min {
            self.pool_min = min;
        }
        if let Some(max) = overrides.pool_max {
            self.pool_max = max;
        }
    }

    /// Creates the connection pool. The pool connects lazily; the password
    /// is validated here so a misconfiguration fails at startup.
    pub fn create_pool(&self) -> StoreResult<deadpool_tiberius::Pool> {
        let password = self
            .password
            .clone()
            .ok_or(ConfigurationError::MissingField { field: "password" })?;

        let mut manager = deadpool_tiberius::Manager::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .basic_authentication(&self.user, &password)
            .max_size(self.pool_max);
        if self.trust_certificate {
            manager = manager.trust_cert();
        }

        manager
            .create_pool()
            .map_err(|e| PersistenceError::ConnectionFailed {
                dialect: "sqlserver",
                message: e.to_string(),
            })
            .map_err(Into::into)
    }
}

fn parse_field<T: std::str::FromStr>(field: &'static str, value: &str) -> StoreResult<T> {
    value.parse().map_err(|_| {
        ConfigurationError::InvalidValue {
            field,
            value: value.to_string(),
        }
        .into()
    })
}

fn parse_bool(field: &'static str, value: &str) -> StoreResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigurationError::InvalidValue {
            field,
            value: value.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let settings = SqlServerSettings::default();
        assert_eq!(settings.host, "localhost");
        assert_eq!(settings.database, "master");
        assert_eq!(settings.user, "sa");
        assert_eq!(settings.port, 1433);
        assert!(settings.trust_certificate);
        assert_eq!(settings.connect_timeout_ms, 30_000);
        assert_eq!(settings.pool_min, 0);
        assert_eq!(settings.pool_max, 100);
        assert!(settings.password.is_none());
    }

    #[test]
    fn environment_values_override_defaults() {
        let settings = SqlServerSettings::from_env_with(env(&[
            ("SQL_SERVER_HOST", "mssql.internal"),
            ("SQL_SERVER_PASSWORD", "P@ssw0rd"),
            ("SQL_SERVER_TRUST_CERT", "false"),
            ("TARN_MIN", "2"),
            ("TARN_MAX", "20"),
        ]))
        .unwrap();
        assert_eq!(settings.host, "mssql.internal");
        assert_eq!(settings.password.as_deref(), Some("P@ssw0rd"));
        assert!(!settings.trust_certificate);
        assert_eq!(settings.pool_min, 2);
        assert_eq!(settings.pool_max, 20);
        assert_eq!(settings.user, "sa");
    }

    #[test]
    fn caller_overrides_win_over_environment() {
        let mut settings =
            SqlServerSettings::from_env_with(env(&[("SQL_SERVER_DATABASE", "from-env")]))
                .unwrap();
        settings.apply(&SqlServerOverrides {
            database: Some("from-caller".to_string()),
            trust_certificate: Some(false),
            ..Default::default()
        });
        assert_eq!(settings.database, "from-caller");
        assert!(!settings.trust_certificate);
    }

    #[test]
    fn rejects_unparseable_trust_flag() {
        let err = SqlServerSettings::from_env_with(env(&[("SQL_SERVER_TRUST_CERT", "maybe")]))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::StoreError::Configuration(ConfigurationError::InvalidValue {
                field: "SQL_SERVER_TRUST_CERT",
                ..
            })
        ));
    }

    #[test]
    fn missing_password_fails_at_pool_creation() {
        let settings = SqlServerSettings::default();
        let Err(err) = settings.create_pool() else {
            panic!("expected pool creation to fail");
        };
        assert!(matches!(
            err,
            crate::error::StoreError::Configuration(ConfigurationError::MissingField {
                field: "password"
            })
        ));
    }
}
