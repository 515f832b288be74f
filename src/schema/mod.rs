//! Schema variants, their definitions, and the fail-closed schema registry.
//!
//! Two physical layouts share the `ecr_viewer` namespace: the core layout
//! keeps a minimal listing surface, the extended layout adds demographics,
//! encounter detail, addresses, and lab results. Both are provisioned,
//! cleared, and torn down through the [`SchemaDefinition`] trait so the
//! layers above never branch on layout internals.

pub mod core;
pub mod extended;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::dialect::{DbConnection, Dialect};
use crate::error::{ConfigurationError, StoreResult};
use crate::migrate::MigrationStep;

/// Namespace that owns every table managed by this crate, on both dialects.
pub const NAMESPACE: &str = "ecr_viewer";

/// A supported schema variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    /// Minimal listing columns plus reportable conditions.
    Core,
    /// Full demographic, encounter, address, and lab detail.
    Extended,
}

impl SchemaKind {
    /// Short identifier used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            SchemaKind::Core => "core",
            SchemaKind::Extended => "extended",
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SchemaKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "core" => Ok(SchemaKind::Core),
            "extended" => Ok(SchemaKind::Extended),
            _ => Err(ConfigurationError::UnsupportedSchema {
                value: s.to_string(),
            }),
        }
    }
}

/// The lifecycle of one schema variant's physical tables.
#[async_trait]
pub trait SchemaDefinition: Send + Sync {
    /// Which variant this definition provisions.
    fn kind(&self) -> SchemaKind;

    /// Creates the namespace and every table of the variant.
    ///
    /// Idempotent: if the namespace already exists the call logs and
    /// returns without touching anything.
    async fn provision(&self, conn: &mut DbConnection) -> StoreResult<()>;

    /// Drops the variant's tables (children first) and the namespace.
    async fn teardown(&self, conn: &mut DbConnection) -> StoreResult<()>;

    /// Deletes all rows from the variant's tables, children first, keeping
    /// the structure in place.
    async fn clear(&self, conn: &mut DbConnection) -> StoreResult<()>;

    /// The ordered migration steps that build this variant from nothing.
    fn migrations(&self) -> &'static [&'static dyn MigrationStep];
}

/// Resolves the definition for a schema variant.
pub fn schema_definition(kind: SchemaKind) -> &'static dyn SchemaDefinition {
    match kind {
        SchemaKind::Core => &core::CoreSchema,
        SchemaKind::Extended => &extended::ExtendedSchema,
    }
}

/// Whether the `ecr_viewer` namespace exists on the connected database.
pub async fn namespace_exists(conn: &mut DbConnection) -> StoreResult<bool> {
    let sql = format!(
        "SELECT 1 AS present FROM information_schema.schemata \
         WHERE schema_name = '{NAMESPACE}'"
    );
    Ok(conn.query_opt(&sql).await?.is_some())
}

/// Whether `table` exists inside the `ecr_viewer` namespace.
pub async fn table_exists(conn: &mut DbConnection, table: &str) -> StoreResult<bool> {
    let sql = format!(
        "SELECT 1 AS present FROM information_schema.tables \
         WHERE table_schema = '{NAMESPACE}' AND table_name = '{table}'"
    );
    Ok(conn.query_opt(&sql).await?.is_some())
}

/// Creates the `ecr_viewer` namespace if it does not exist.
pub async fn ensure_namespace(conn: &mut DbConnection) -> StoreResult<()> {
    match conn.dialect() {
        Dialect::Postgres => {
            conn.execute(&format!("CREATE SCHEMA IF NOT EXISTS {NAMESPACE}"))
                .await?;
        }
        Dialect::SqlServer => {
            // CREATE SCHEMA has no IF NOT EXISTS form on this dialect.
            if !namespace_exists(conn).await? {
                conn.execute(&format!("CREATE SCHEMA {NAMESPACE}")).await?;
            }
        }
    }
    Ok(())
}

/// Deletes all rows from the named tables in the given order, skipping
/// tables that do not exist.
pub(crate) async fn clear_tables(
    conn: &mut DbConnection,
    tables: &[&str],
) -> StoreResult<()> {
    for table in tables {
        if table_exists(conn, table).await? {
            conn.execute(&format!("DELETE FROM {NAMESPACE}.{table}"))
                .await?;
        }
    }
    Ok(())
}

/// Whether `constraint` exists on `table` inside the `ecr_viewer` namespace.
pub(crate) async fn constraint_exists(
    conn: &mut DbConnection,
    table: &str,
    constraint: &str,
) -> StoreResult<bool> {
    let sql = format!(
        "SELECT 1 AS present FROM information_schema.table_constraints \
         WHERE constraint_schema = '{NAMESPACE}' AND table_name = '{table}' \
         AND constraint_name = '{constraint}'"
    );
    Ok(conn.query_opt(&sql).await?.is_some())
}

/// Renders guarded index DDL that is a no-op when the index already exists.
pub(crate) fn index_ddl(dialect: Dialect, index: &str, table: &str, column: &str) -> String {
    match dialect {
        Dialect::Postgres => {
            format!("CREATE INDEX IF NOT EXISTS {index} ON {NAMESPACE}.{table} ({column})")
        }
        Dialect::SqlServer => format!(
            "IF NOT EXISTS (SELECT 1 FROM sys.indexes \
             WHERE name = '{index}' AND object_id = OBJECT_ID('{NAMESPACE}.{table}')) \
             CREATE INDEX {index} ON {NAMESPACE}.{table} ({column})"
        ),
    }
}

/// Drops the named tables in the given order, then the migration log and
/// the namespace itself.
pub(crate) async fn drop_tables_and_namespace(
    conn: &mut DbConnection,
    tables: &[&str],
) -> StoreResult<()> {
    for table in tables {
        conn.execute(&format!("DROP TABLE IF EXISTS {NAMESPACE}.{table}"))
            .await?;
    }
    // The migration log shares the namespace; SQL Server refuses to drop a
    // schema that still owns a table.
    conn.execute(&format!("DROP TABLE IF EXISTS {NAMESPACE}.migration_log"))
        .await?;
    match conn.dialect() {
        Dialect::Postgres => {
            conn.execute(&format!("DROP SCHEMA IF EXISTS {NAMESPACE} CASCADE"))
                .await?;
        }
        Dialect::SqlServer => {
            if namespace_exists(conn).await? {
                conn.execute(&format!("DROP SCHEMA {NAMESPACE}")).await?;
            }
        }
    }
    Ok(())
}
