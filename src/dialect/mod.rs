//! Dialect selection, per-dialect connection settings, and pooled
//! connection handles.
//!
//! A [`Dialect`] is resolved once at startup from an identifier string and
//! carried as a closed enum; every dialect-specific decision downstream
//! (SQL generation, literal rendering, DDL) dispatches on it rather than
//! re-comparing environment strings.

pub mod connection;
pub mod postgres;
pub mod sqlserver;

use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigurationError, PersistenceError, StoreResult};

pub use connection::{DbConnection, SqlRow, SqlValue};
pub use postgres::PostgresSettings;
pub use sqlserver::SqlServerSettings;

/// A supported SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// PostgreSQL-family engines.
    Postgres,
    /// SQL-Server-family engines.
    SqlServer,
}

impl Dialect {
    /// Short identifier used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::SqlServer => "sqlserver",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "sqlserver" | "mssql" => Ok(Dialect::SqlServer),
            _ => Err(ConfigurationError::UnsupportedDialect {
                value: s.to_string(),
            }),
        }
    }
}

/// Caller-supplied overrides for one dialect's settings.
///
/// Overrides always win over environment values, which win over defaults.
#[derive(Debug, Clone)]
pub enum DialectOverrides {
    /// Overrides for [`PostgresSettings`].
    Postgres(postgres::PostgresOverrides),
    /// Overrides for [`SqlServerSettings`].
    SqlServer(sqlserver::SqlServerOverrides),
}

/// Fully resolved settings for one dialect.
#[derive(Debug, Clone)]
pub enum DialectSettings {
    /// PostgreSQL connection settings.
    Postgres(PostgresSettings),
    /// SQL Server connection settings.
    SqlServer(SqlServerSettings),
}

impl DialectSettings {
    /// Resolves settings for `dialect` from the process environment, then
    /// applies `overrides` on top.
    pub fn resolve(
        dialect: Dialect,
        overrides: Option<DialectOverrides>,
    ) -> StoreResult<DialectSettings> {
        let mut settings = match dialect {
            Dialect::Postgres => DialectSettings::Postgres(PostgresSettings::from_env()?),
            Dialect::SqlServer => DialectSettings::SqlServer(SqlServerSettings::from_env()?),
        };
        match (&mut settings, overrides) {
            (_, None) => {}
            (DialectSettings::Postgres(s), Some(DialectOverrides::Postgres(o))) => s.apply(&o),
            (DialectSettings::SqlServer(s), Some(DialectOverrides::SqlServer(o))) => s.apply(&o),
            (_, Some(_)) => {
                return Err(ConfigurationError::InvalidValue {
                    field: "overrides",
                    value: format!("overrides do not match dialect {dialect}"),
                }
                .into());
            }
        }
        Ok(settings)
    }

    /// Opens the dialect's connection pool.
    pub fn open_pool(&self) -> StoreResult<DialectPool> {
        match self {
            DialectSettings::Postgres(s) => Ok(DialectPool::Postgres(s.create_pool()?)),
            DialectSettings::SqlServer(s) => Ok(DialectPool::SqlServer(s.create_pool()?)),
        }
    }
}

/// A pooled set of physical connections for one dialect.
///
/// The pool is owned by the [`Database`](crate::db::Database) handle that
/// created it; dropping the handle closes the pool.
pub enum DialectPool {
    /// A deadpool-managed PostgreSQL pool.
    Postgres(deadpool_postgres::Pool),
    /// A deadpool-managed SQL Server pool.
    SqlServer(deadpool_tiberius::Pool),
}

impl fmt::Debug for DialectPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialectPool::Postgres(_) => f.write_str("DialectPool::Postgres"),
            DialectPool::SqlServer(_) => f.write_str("DialectPool::SqlServer"),
        }
    }
}

impl DialectPool {
    /// Checks a connection out of the pool.
    pub async fn checkout(&self) -> StoreResult<DbConnection> {
        match self {
            DialectPool::Postgres(pool) => {
                let client = pool.get().await.map_err(|e| match e {
                    deadpool_postgres::PoolError::Timeout(_) => {
                        PersistenceError::PoolExhausted {
                            dialect: "postgres",
                        }
                    }
                    other => PersistenceError::ConnectionFailed {
                        dialect: "postgres",
                        message: other.to_string(),
                    },
                })?;
                Ok(DbConnection::Postgres(client))
            }
            DialectPool::SqlServer(pool) => {
                let client = pool.get().await.map_err(|e| {
                    PersistenceError::ConnectionFailed {
                        dialect: "sqlserver",
                        message: e.to_string(),
                    }
                })?;
                Ok(DbConnection::SqlServer(connection::MssqlConn::new(client)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_dialect_identifiers() {
        assert_eq!("postgres".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("postgresql".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("sqlserver".parse::<Dialect>().unwrap(), Dialect::SqlServer);
        assert_eq!("mssql".parse::<Dialect>().unwrap(), Dialect::SqlServer);
        assert_eq!("MSSQL".parse::<Dialect>().unwrap(), Dialect::SqlServer);
    }

    #[test]
    fn fails_closed_on_unknown_dialect() {
        let err = "oracle".parse::<Dialect>().unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::UnsupportedDialect { value } if value == "oracle"
        ));
    }

    #[test]
    fn mismatched_overrides_are_rejected() {
        let overrides = DialectOverrides::SqlServer(Default::default());
        let err = DialectSettings::resolve(Dialect::Postgres, Some(overrides)).unwrap_err();
        assert!(matches!(
            err,
            crate::error::StoreError::Configuration(ConfigurationError::InvalidValue { .. })
        ));
    }
}
