//! PostgreSQL connection settings and pool construction.

use deadpool_postgres::{Config, Pool, Runtime};
use serde::{Deserialize, Serialize};
use tokio_postgres::NoTls;

use crate::error::{ConfigurationError, PersistenceError, StoreResult};

/// Configuration for the PostgreSQL dialect.
///
/// Values are resolved defaults-first, then environment, then caller
/// overrides (see [`PostgresSettings::apply`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresSettings {
    /// Database host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Database name.
    #[serde(default = "default_database")]
    pub database: String,

    /// Database user. Required at connect time; no default.
    #[serde(default)]
    pub user: Option<String>,

    /// Database password. Required at connect time; no default.
    #[serde(default)]
    pub password: Option<String>,

    /// Database port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum number of pooled connections.
    #[serde(default = "default_max_pool")]
    pub max_pool: usize,
}

/// Caller overrides for [`PostgresSettings`]. `None` fields leave the
/// environment-resolved value untouched.
#[derive(Debug, Clone, Default)]
pub struct PostgresOverrides {
    /// Database host.
    pub host: Option<String>,
    /// Database name.
    pub database: Option<String>,
    /// Database user.
    pub user: Option<String>,
    /// Database password.
    pub password: Option<String>,
    /// Database port.
    pub port: Option<u16>,
    /// Maximum number of pooled connections.
    pub max_pool: Option<usize>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_database() -> String {
    "ecr_viewer_db".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_max_pool() -> usize {
    10
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            database: default_database(),
            user: None,
            password: None,
            port: default_port(),
            max_pool: default_max_pool(),
        }
    }
}

impl PostgresSettings {
    /// Builds settings from the process environment.
    ///
    /// Reads `POSTGRES_HOST`, `POSTGRES_DATABASE`, `POSTGRES_USER`,
    /// `POSTGRES_PASSWORD`, `POSTGRES_PORT`, `POSTGRES_MAX_THREADPOOL`.
    pub fn from_env() -> StoreResult<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary environment lookup.
    ///
    /// Unparseable numeric values are a configuration error rather than a
    /// silent fallback.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> StoreResult<Self> {
        let mut settings = Self::default();
        if let Some(host) = lookup("POSTGRES_HOST") {
            settings.host = host;
        }
        if let Some(database) = lookup("POSTGRES_DATABASE") {
            settings.database = database;
        }
        if let Some(user) = lookup("POSTGRES_USER") {
            settings.user = Some(user);
        }
        if let Some(password) = lookup("POSTGRES_PASSWORD") {
            settings.password = Some(password);
        }
        if let Some(port) = lookup("POSTGRES_PORT") {
            settings.port = parse_field("POSTGRES_PORT", &port)?;
        }
        if let Some(max_pool) = lookup("POSTGRES_MAX_THREADPOOL") {
            settings.max_pool = parse_field("POSTGRES_MAX_THREADPOOL", &max_pool)?;
        }
        Ok(settings)
    }

    /// Applies caller overrides on top of the resolved settings.
    pub fn apply(&mut self, overrides: &PostgresOverrides) {
        if let Some(host) = &overrides.host {
            self.host = host.clone();
        }
        if let Some(database) = &overrides.database {
            self.database = database.clone();
        }
        if let Some(user) = &overrides.user {
            self.user = Some(user.clone());
        }
        if let Some(password) = &overrides.password {
            self.password = Some(password.clone());
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(max_pool) = overrides.max_pool {
            self.max_pool = max_pool;
        }
    }

    /// Creates the connection pool. The pool connects lazily; required
    /// fields are validated here so a misconfiguration fails at startup.
    pub fn create_pool(&self) -> StoreResult<Pool> {
        let user = self
            .user
            .clone()
            .ok_or(ConfigurationError::MissingField { field: "user" })?;
        let password = self
            .password
            .clone()
            .ok_or(ConfigurationError::MissingField { field: "password" })?;

        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.database.clone());
        cfg.user = Some(user);
        cfg.password = Some(password);

        let pool = cfg
            .builder(NoTls)
            .map_err(|e| PersistenceError::ConnectionFailed {
                dialect: "postgres",
                message: format!("failed to create pool builder: {e}"),
            })?
            .max_size(self.max_pool)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| PersistenceError::ConnectionFailed {
                dialect: "postgres",
                message: e.to_string(),
            })?;

        Ok(pool)
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
        let settings = PostgresSettings::default();
        assert_eq!(settings.host, "localhost");
        assert_eq!(settings.database, "ecr_viewer_db");
        assert_eq!(settings.port, 5432);
        assert_eq!(settings.max_pool, 10);
        assert!(settings.user.is_none());
        assert!(settings.password.is_none());
    }

    #[test]
    fn environment_values_override_defaults() {
        let settings = PostgresSettings::from_env_with(env(&[
            ("POSTGRES_HOST", "db.internal"),
            ("POSTGRES_PORT", "5433"),
            ("POSTGRES_USER", "ecr"),
            ("POSTGRES_PASSWORD", "hunter2"),
            ("POSTGRES_MAX_THREADPOOL", "4"),
        ]))
        .unwrap();
        assert_eq!(settings.host, "db.internal");
        assert_eq!(settings.port, 5433);
        assert_eq!(settings.user.as_deref(), Some("ecr"));
        assert_eq!(settings.max_pool, 4);
        // Untouched values keep their defaults.
        assert_eq!(settings.database, "ecr_viewer_db");
    }

    #[test]
    fn caller_overrides_win_over_environment() {
        let mut settings =
            PostgresSettings::from_env_with(env(&[("POSTGRES_HOST", "from-env")])).unwrap();
        settings.apply(&PostgresOverrides {
            host: Some("from-caller".to_string()),
            port: Some(15432),
            ..Default::default()
        });
        assert_eq!(settings.host, "from-caller");
        assert_eq!(settings.port, 15432);
    }

    #[test]
    fn unparseable_port_is_a_configuration_error() {
        let err =
            PostgresSettings::from_env_with(env(&[("POSTGRES_PORT", "not-a-port")])).unwrap_err();
        assert!(matches!(
            err,
            crate::error::StoreError::Configuration(ConfigurationError::InvalidValue {
                field: "POSTGRES_PORT",
                ..
            })
        ));
    }

    #[test]
    fn missing_user_fails_at_pool_creation() {
        let settings = PostgresSettings {
            password: Some("secret".to_string()),
            ..Default::default()
        };
        let err = settings.create_pool().unwrap_err();
        assert!(matches!(
            err,
            crate::error::StoreError::Configuration(ConfigurationError::MissingField {
                field: "user"
            })
        ));
    }
}
