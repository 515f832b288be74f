//! Database handles and the process-wide handle cache.
//!
//! A [`Database`] owns its connection pool; dropping the last handle closes
//! the pool. [`db_for`] caches one handle per (dialect, schema) pair behind
//! an async mutex so concurrent first callers cannot race two pools into
//! existence.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tokio::sync::Mutex;
use tracing::info;

use crate::dialect::{DbConnection, Dialect, DialectOverrides, DialectPool, DialectSettings};
use crate::error::{PersistenceError, StoreResult};
use crate::schema::SchemaKind;

/// An open database: a dialect, a schema variant, and a connection pool.
#[derive(Debug)]
pub struct Database {
    dialect: Dialect,
    schema: SchemaKind,
    pool: DialectPool,
}

impl Database {
    /// Opens a database for the given dialect and schema variant.
    ///
    /// Connection parameters come from the environment, with `overrides`
    /// applied on top. The pool itself connects lazily.
    pub fn open(
        dialect: Dialect,
        schema: SchemaKind,
        overrides: Option<DialectOverrides>,
    ) -> StoreResult<Self> {
        let settings = DialectSettings::resolve(dialect, overrides)?;
        let pool = settings.open_pool()?;
        info!(%dialect, %schema, "opened database handle");
        Ok(Self {
            dialect,
            schema,
            pool,
        })
    }

    /// Opens a database entirely from the environment.
    ///
    /// `DIALECT` selects the dialect (default `postgres`); `SCHEMA`, or its
    /// alias `METADATA_DATABASE_SCHEMA`, selects the schema variant
    /// (default `core`).
    pub fn from_env() -> StoreResult<Self> {
        let (dialect, schema) = identifiers_from_env(|key| std::env::var(key).ok())?;
        Self::open(dialect, schema, None)
    }

    /// The dialect this database speaks.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The schema variant this database stores.
    pub fn schema(&self) -> SchemaKind {
        self.schema
    }

    /// Checks a connection out of the pool.
    pub async fn connection(&self) -> StoreResult<DbConnection> {
        self.pool.checkout().await
    }

    /// Round-trips a trivial query to verify the database is reachable.
    pub async fn health_check(&self) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let row = conn.query_opt("SELECT 1 AS ok").await?;
        if row.is_none() {
            return Err(PersistenceError::QueryFailed {
                message: "health check returned no row".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Resolves the dialect and schema identifiers from an environment lookup.
pub(crate) fn identifiers_from_env(
    lookup: impl Fn(&str) -> Option<String>,
) -> StoreResult<(Dialect, SchemaKind)> {
    let dialect = match lookup("DIALECT") {
        Some(value) => value.parse()?,
        None => Dialect::Postgres,
    };
    let schema = match lookup("SCHEMA").or_else(|| lookup("METADATA_DATABASE_SCHEMA")) {
        Some(value) => value.parse()?,
        None => SchemaKind::Core,
    };
    Ok((dialect, schema))
}

type HandleCache = Mutex<HashMap<(Dialect, SchemaKind), Arc<Database>>>;

fn handles() -> &'static HandleCache {
    static HANDLES: OnceLock<HandleCache> = OnceLock::new();
    HANDLES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Returns the cached handle for (dialect, schema), opening it on first use.
///
/// The cache lock is held across pool creation, so two tasks asking for the
/// same pair at once share a single pool.
pub async fn db_for(dialect: Dialect, schema: SchemaKind) -> StoreResult<Arc<Database>> {
    let mut cache = handles().lock().await;
    if let Some(db) = cache.get(&(dialect, schema)) {
        return Ok(Arc::clone(db));
    }
    let db = Arc::new(Database::open(dialect, schema, None)?);
    cache.insert((dialect, schema), Arc::clone(&db));
    Ok(db)
}

/// Drops every cached handle. Pools close once their last clone is dropped.
pub async fn close_all() {
    handles().lock().await.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        }
    }

    #[test]
    fn defaults_to_postgres_core() {
        let (dialect, schema) = identifiers_from_env(lookup(&[])).unwrap();
        assert_eq!(dialect, Dialect::Postgres);
        assert_eq!(schema, SchemaKind::Core);
    }

    #[test]
    fn reads_dialect_and_schema_identifiers() {
        let (dialect, schema) =
            identifiers_from_env(lookup(&[("DIALECT", "mssql"), ("SCHEMA", "extended")]))
                .unwrap();
        assert_eq!(dialect, Dialect::SqlServer);
        assert_eq!(schema, SchemaKind::Extended);
    }

    #[test]
    fn accepts_the_metadata_schema_alias() {
        let (_, schema) =
            identifiers_from_env(lookup(&[("METADATA_DATABASE_SCHEMA", "extended")])).unwrap();
        assert_eq!(schema, SchemaKind::Extended);
    }

    #[test]
    fn schema_env_wins_over_its_alias() {
        let (_, schema) = identifiers_from_env(lookup(&[
            ("SCHEMA", "core"),
            ("METADATA_DATABASE_SCHEMA", "extended"),
        ]))
        .unwrap();
        assert_eq!(schema, SchemaKind::Core);
    }

    #[test]
    fn unknown_identifiers_fail_closed() {
        assert!(identifiers_from_env(lookup(&[("DIALECT", "oracle")])).is_err());
        assert!(identifiers_from_env(lookup(&[("SCHEMA", "legacy")])).is_err());
    }
}
