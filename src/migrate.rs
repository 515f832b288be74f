//! Idempotent schema migrations.
//!
//! Steps are named, ordered, and recorded in `ecr_viewer.migration_log`.
//! Applying is resumable: each step commits independently, so a failure
//! leaves earlier steps in place and names the step that needs operator
//! attention. There is no cross-process lock; concurrent runs against the
//! same database are not supported.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::db::Database;
use crate::dialect::{DbConnection, Dialect};
use crate::error::{MigrationError, StoreResult};
use crate::schema::{self, NAMESPACE, schema_definition};
use crate::search::escape::escape_single_quotes;

/// One reversible schema change.
#[async_trait]
pub trait MigrationStep: Send + Sync {
    /// Sortable unique name, `<timestamp>_<label>`.
    fn name(&self) -> &'static str;

    /// Applies the step.
    async fn up(&self, conn: &mut DbConnection) -> StoreResult<()>;

    /// Reverts the step.
    async fn down(&self, conn: &mut DbConnection) -> StoreResult<()>;
}

/// Returns the steps from `all` that are not yet recorded in `applied`,
/// preserving order.
pub fn pending_steps<'a>(
    all: &'a [&'static dyn MigrationStep],
    applied: &[String],
) -> Vec<&'a &'static dyn MigrationStep> {
    all.iter()
        .filter(|step| !applied.iter().any(|name| name == step.name()))
        .collect()
}

/// Applies or reverts the migration steps of one database's schema variant.
pub struct MigrationRunner<'a> {
    db: &'a Database,
}

impl<'a> MigrationRunner<'a> {
    /// Creates a runner bound to `db`'s dialect and schema variant.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Applies every pending step in order, returning the names applied.
    ///
    /// A database that was provisioned by hand (no log rows but an
    /// `ecr_data` table) gets its baseline step recorded without running it.
    pub async fn up(&self) -> StoreResult<Vec<&'static str>> {
        let mut conn = self.db.connection().await?;
        ensure_log_table(&mut conn).await?;

        let steps = schema_definition(self.db.schema()).migrations();
        let mut applied = applied_steps(&mut conn).await?;

        if applied.is_empty() && schema::table_exists(&mut conn, "ecr_data").await? {
            let baseline = steps[0].name();
            warn!(
                step = baseline,
                "found existing tables with an empty migration log; recording baseline as applied"
            );
            record_applied(&mut conn, baseline).await?;
            applied.push(baseline.to_string());
        }

        let mut ran = Vec::new();
        for step in pending_steps(steps, &applied) {
            info!(step = step.name(), "applying migration");
            step.up(&mut conn)
                .await
                .map_err(|e| MigrationError::StepFailed {
                    step: step.name(),
                    message: e.to_string(),
                })?;
            record_applied(&mut conn, step.name()).await?;
            ran.push(step.name());
        }
        Ok(ran)
    }

    /// Reverts applied steps in reverse order, returning the names reverted.
    ///
    /// With `target` set, reverting stops when the target step is reached;
    /// the target itself stays applied. An unrecognized target is rejected
    /// before anything is touched.
    pub async fn down(&self, target: Option<&str>) -> StoreResult<Vec<&'static str>> {
        let steps = schema_definition(self.db.schema()).migrations();
        if let Some(t) = target {
            if !steps.iter().any(|s| s.name() == t) {
                return Err(MigrationError::UnknownTarget { step: t.to_string() }.into());
            }
        }

        let mut conn = self.db.connection().await?;
        if !schema::table_exists(&mut conn, "migration_log").await? {
            return Ok(Vec::new());
        }
        let applied = applied_steps(&mut conn).await?;

        let mut reverted = Vec::new();
        for step in steps.iter().rev() {
            if Some(step.name()) == target {
                break;
            }
            if !applied.iter().any(|name| name == step.name()) {
                continue;
            }
            info!(step = step.name(), "reverting migration");
            step.down(&mut conn)
                .await
                .map_err(|e| MigrationError::StepFailed {
                    step: step.name(),
                    message: e.to_string(),
                })?;
            remove_applied(&mut conn, step.name()).await?;
            reverted.push(step.name());
        }
        Ok(reverted)
    }
}

async fn ensure_log_table(conn: &mut DbConnection) -> StoreResult<()> {
    let result = async {
        schema::ensure_namespace(conn).await?;
        let ddl = match conn.dialect() {
            Dialect::Postgres => format!(
                "CREATE TABLE IF NOT EXISTS {NAMESPACE}.migration_log (
                    name VARCHAR(255) PRIMARY KEY,
                    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )"
            ),
            Dialect::SqlServer => format!(
                "IF OBJECT_ID('{NAMESPACE}.migration_log', 'U') IS NULL
                 CREATE TABLE {NAMESPACE}.migration_log (
                    name VARCHAR(255) PRIMARY KEY,
                    applied_at DATETIMEOFFSET NOT NULL DEFAULT SYSDATETIMEOFFSET()
                 )"
            ),
        };
        conn.execute(&ddl).await?;
        Ok::<(), crate::error::StoreError>(())
    }
    .await;
    result.map_err(|e| {
        MigrationError::LogUnavailable {
            message: e.to_string(),
        }
        .into()
    })
}

async fn applied_steps(conn: &mut DbConnection) -> StoreResult<Vec<String>> {
    let rows = conn
        .query(&format!(
            "SELECT name FROM {NAMESPACE}.migration_log ORDER BY name"
        ))
        .await
        .map_err(|e| MigrationError::LogUnavailable {
            message: e.to_string(),
        })?;
    rows.iter().map(|row| row.require_text("name")).collect()
}

async fn record_applied(conn: &mut DbConnection, name: &str) -> StoreResult<()> {
    conn.execute(&format!(
        "INSERT INTO {NAMESPACE}.migration_log (name) VALUES ('{}')",
        escape_single_quotes(name)
    ))
    .await?;
    Ok(())
}

async fn remove_applied(conn: &mut DbConnection, name: &str) -> StoreResult<()> {
    // A step's down may have dropped the namespace, log table included.
    if !schema::table_exists(conn, "migration_log").await? {
        return Ok(());
    }
    conn.execute(&format!(
        "DELETE FROM {NAMESPACE}.migration_log WHERE name = '{}'",
        escape_single_quotes(name)
    ))
    .await?;
    Ok(())
}
