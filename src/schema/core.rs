//! Core schema: the minimal listing surface.
//!
//! Three tables: `ecr_data` with the columns the listing page needs,
//! `ecr_rr_conditions`, and `ecr_rr_rule_summaries`.

use async_trait::async_trait;
use tracing::info;

use crate::dialect::{DbConnection, Dialect};
use crate::error::StoreResult;
use crate::migrate::MigrationStep;

use super::{
    NAMESPACE, SchemaDefinition, SchemaKind, clear_tables, constraint_exists,
    drop_tables_and_namespace, ensure_namespace, index_ddl, namespace_exists,
};

// Children first, for clear and teardown.
const TABLES: [&str; 3] = ["ecr_rr_rule_summaries", "ecr_rr_conditions", "ecr_data"];

/// [`SchemaDefinition`] for the core layout.
pub struct CoreSchema;

#[async_trait]
impl SchemaDefinition for CoreSchema {
    fn kind(&self) -> SchemaKind {
        SchemaKind::Core
    }

    async fn provision(&self, conn: &mut DbConnection) -> StoreResult<()> {
        if namespace_exists(conn).await? {
            info!(schema = "core", "namespace already exists; leaving unchanged");
            return Ok(());
        }
        ensure_namespace(conn).await?;
        create_core_tables(conn).await
    }

    async fn teardown(&self, conn: &mut DbConnection) -> StoreResult<()> {
        drop_tables_and_namespace(conn, &TABLES).await
    }

    async fn clear(&self, conn: &mut DbConnection) -> StoreResult<()> {
        clear_tables(conn, &TABLES).await
    }

    fn migrations(&self) -> &'static [&'static dyn MigrationStep] {
        &CORE_STEPS
    }
}

pub(crate) async fn create_core_tables(conn: &mut DbConnection) -> StoreResult<()> {
    match conn.dialect() {
        Dialect::Postgres => {
            conn.execute(&format!(
                "CREATE TABLE IF NOT EXISTS {NAMESPACE}.ecr_data (
                    eicr_id VARCHAR(200) PRIMARY KEY,
                    set_id VARCHAR(255),
                    eicr_version_number VARCHAR(50),
                    data_source VARCHAR(2),
                    fhir_reference_link VARCHAR(500),
                    patient_name_first VARCHAR(100) NOT NULL,
                    patient_name_last VARCHAR(100) NOT NULL,
                    patient_birth_date DATE NOT NULL,
                    date_created TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    report_date DATE NOT NULL
                )"
            ))
            .await?;
            conn.execute(&format!(
                "CREATE TABLE IF NOT EXISTS {NAMESPACE}.ecr_rr_conditions (
                    uuid VARCHAR(200) PRIMARY KEY,
                    eicr_id VARCHAR(200) NOT NULL
                        REFERENCES {NAMESPACE}.ecr_data (eicr_id),
                    condition TEXT
                )"
            ))
            .await?;
            conn.execute(&format!(
                "CREATE TABLE IF NOT EXISTS {NAMESPACE}.ecr_rr_rule_summaries (
                    uuid VARCHAR(200) PRIMARY KEY,
                    ecr_rr_conditions_id VARCHAR(200)
                        REFERENCES {NAMESPACE}.ecr_rr_conditions (uuid),
                    rule_summary TEXT
                )"
            ))
            .await?;
        }
        Dialect::SqlServer => {
            conn.execute(&format!(
                "IF OBJECT_ID('{NAMESPACE}.ecr_data', 'U') IS NULL
                 CREATE TABLE {NAMESPACE}.ecr_data (
                    eicr_id VARCHAR(200) PRIMARY KEY,
                    set_id VARCHAR(255),
                    eicr_version_number VARCHAR(50),
                    data_source VARCHAR(2),
                    fhir_reference_link VARCHAR(500),
                    patient_name_first VARCHAR(100) NOT NULL,
                    patient_name_last VARCHAR(100) NOT NULL,
                    patient_birth_date DATE NOT NULL,
                    date_created DATETIMEOFFSET NOT NULL DEFAULT SYSDATETIMEOFFSET(),
                    report_date DATE NOT NULL
                 )"
            ))
            .await?;
            conn.execute(&format!(
                "IF OBJECT_ID('{NAMESPACE}.ecr_rr_conditions', 'U') IS NULL
                 CREATE TABLE {NAMESPACE}.ecr_rr_conditions (
                    uuid VARCHAR(200) PRIMARY KEY,
                    eicr_id VARCHAR(200) NOT NULL
                        REFERENCES {NAMESPACE}.ecr_data (eicr_id),
                    condition VARCHAR(MAX)
                 )"
            ))
            .await?;
            conn.execute(&format!(
                "IF OBJECT_ID('{NAMESPACE}.ecr_rr_rule_summaries', 'U') IS NULL
                 CREATE TABLE {NAMESPACE}.ecr_rr_rule_summaries (
                    uuid VARCHAR(200) PRIMARY KEY,
                    ecr_rr_conditions_id VARCHAR(200)
                        REFERENCES {NAMESPACE}.ecr_rr_conditions (uuid),
                    rule_summary VARCHAR(MAX)
                 )"
            ))
            .await?;
        }
    }
    Ok(())
}

static CORE_STEPS: [&dyn MigrationStep; 2] = [&InitializeCore, &CoreReportFields];

/// Baseline: namespace plus the three core tables.
struct InitializeCore;

#[async_trait]
impl MigrationStep for InitializeCore {
    fn name(&self) -> &'static str {
        "19700101000000_initialize_core"
    }

    async fn up(&self, conn: &mut DbConnection) -> StoreResult<()> {
        if namespace_exists(conn).await? {
            info!(step = self.name(), "namespace already exists; marking as applied");
            return Ok(());
        }
        ensure_namespace(conn).await?;
        create_core_tables(conn).await
    }

    async fn down(&self, conn: &mut DbConnection) -> StoreResult<()> {
        drop_tables_and_namespace(conn, &TABLES).await
    }
}

/// Constrains `data_source` to its two producers and indexes the listing
/// sort column.
struct CoreReportFields;

#[async_trait]
impl MigrationStep for CoreReportFields {
    fn name(&self) -> &'static str {
        "19700101000001_core_report_fields"
    }

    async fn up(&self, conn: &mut DbConnection) -> StoreResult<()> {
        // Guarded like the baseline DDL: a run that crashed between this
        // step and its log row must be able to run again.
        if !constraint_exists(conn, "ecr_data", "chk_ecr_data_source").await? {
            conn.execute(&format!(
                "ALTER TABLE {NAMESPACE}.ecr_data ADD CONSTRAINT chk_ecr_data_source \
                 CHECK (data_source IN ('S3', 'DB'))"
            ))
            .await?;
        }
        let index = index_ddl(
            conn.dialect(),
            "idx_ecr_data_date_created",
            "ecr_data",
            "date_created",
        );
        conn.execute(&index).await?;
        Ok(())
    }

    async fn down(&self, conn: &mut DbConnection) -> StoreResult<()> {
        match conn.dialect() {
            Dialect::Postgres => {
                conn.execute(&format!(
                    "DROP INDEX IF EXISTS {NAMESPACE}.idx_ecr_data_date_created"
                ))
                .await?;
            }
            Dialect::SqlServer => {
                conn.execute(&format!(
                    "DROP INDEX idx_ecr_data_date_created ON {NAMESPACE}.ecr_data"
                ))
                .await?;
            }
        }
        conn.execute(&format!(
            "ALTER TABLE {NAMESPACE}.ecr_data DROP CONSTRAINT chk_ecr_data_source"
        ))
        .await?;
        Ok(())
    }
}
