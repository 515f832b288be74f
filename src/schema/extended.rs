//! Extended schema: full demographic, encounter, address, and lab detail.

use async_trait::async_trait;
use tracing::info;

use crate::dialect::{DbConnection, Dialect};
use crate::error::StoreResult;
use crate::migrate::MigrationStep;

use super::{
    NAMESPACE, SchemaDefinition, SchemaKind, clear_tables, drop_tables_and_namespace,
    ensure_namespace, index_ddl, namespace_exists,
};

// Children first, for clear and teardown.
const TABLES: [&str; 5] = [
    "ecr_rr_rule_summaries",
    "ecr_rr_conditions",
    "ecr_labs",
    "patient_address",
    "ecr_data",
];

/// [`SchemaDefinition`] for the extended layout.
pub struct ExtendedSchema;

#[async_trait]
impl SchemaDefinition for ExtendedSchema {
    fn kind(&self) -> SchemaKind {
        SchemaKind::Extended
    }

    async fn provision(&self, conn: &mut DbConnection) -> StoreResult<()> {
        if namespace_exists(conn).await? {
            info!(
                schema = "extended",
                "namespace already exists; leaving unchanged"
            );
            return Ok(());
        }
        ensure_namespace(conn).await?;
        create_extended_tables(conn).await
    }

    async fn teardown(&self, conn: &mut DbConnection) -> StoreResult<()> {
        drop_tables_and_namespace(conn, &TABLES).await
    }

    async fn clear(&self, conn: &mut DbConnection) -> StoreResult<()> {
        clear_tables(conn, &TABLES).await
    }

    fn migrations(&self) -> &'static [&'static dyn MigrationStep] {
        &EXTENDED_STEPS
    }
}

// The demographic and encounter columns are identical across dialects;
// only the timestamp, float, and unbounded-text types differ.
fn ecr_data_ddl(dialect: Dialect) -> String {
    let (timestamp, timestamp_default, float, long_text) = match dialect {
        Dialect::Postgres => ("TIMESTAMPTZ", "NOW()", "DOUBLE PRECISION", "TEXT"),
        Dialect::SqlServer => (
            "DATETIMEOFFSET",
            "SYSDATETIMEOFFSET()",
            "FLOAT",
            "VARCHAR(MAX)",
        ),
    };
    format!(
        "CREATE TABLE {NAMESPACE}.ecr_data (
            eicr_id VARCHAR(200) PRIMARY KEY,
            set_id VARCHAR(255),
            fhir_reference_link VARCHAR(500),
            last_name VARCHAR(255) NOT NULL,
            first_name VARCHAR(255) NOT NULL,
            birth_date DATE NOT NULL,
            gender VARCHAR(50),
            birth_sex VARCHAR(50),
            gender_identity VARCHAR(50),
            race VARCHAR(255),
            ethnicity VARCHAR(255),
            latitude {float},
            longitude {float},
            homelessness_status VARCHAR(255),
            disabilities VARCHAR(255),
            tribal_affiliation VARCHAR(255),
            tribal_enrollment_status VARCHAR(255),
            current_job_title VARCHAR(255),
            current_job_industry VARCHAR(255),
            usual_occupation VARCHAR(255),
            usual_industry VARCHAR(255),
            preferred_language VARCHAR(255),
            pregnancy_status VARCHAR(255),
            rr_id VARCHAR(255),
            processing_status VARCHAR(255),
            eicr_version_number VARCHAR(50),
            authoring_date {timestamp},
            authoring_provider VARCHAR(255),
            provider_id VARCHAR(255),
            facility_id VARCHAR(255),
            facility_name VARCHAR(255),
            encounter_type VARCHAR(255),
            encounter_start_date {timestamp},
            encounter_end_date {timestamp},
            reason_for_visit {long_text},
            active_problems {long_text},
            date_created {timestamp} NOT NULL DEFAULT {timestamp_default}
        )"
    )
}

fn patient_address_ddl(dialect: Dialect) -> String {
    let (timestamp, long_text) = match dialect {
        Dialect::Postgres => ("TIMESTAMPTZ", "TEXT"),
        Dialect::SqlServer => ("DATETIMEOFFSET", "VARCHAR(MAX)"),
    };
    // USE and TYPE are keywords on the SQL Server side, hence the
    // address_ prefixes.
    format!(
        "CREATE TABLE {NAMESPACE}.patient_address (
            uuid VARCHAR(200) PRIMARY KEY,
            address_use VARCHAR(50),
            address_type VARCHAR(50),
            text {long_text},
            line VARCHAR(255),
            city VARCHAR(255),
            district VARCHAR(255),
            state VARCHAR(255),
            postal_code VARCHAR(20),
            country VARCHAR(255),
            period_start {timestamp},
            period_end {timestamp},
            eicr_id VARCHAR(200)
                REFERENCES {NAMESPACE}.ecr_data (eicr_id)
        )"
    )
}

fn ecr_labs_ddl(dialect: Dialect) -> String {
    let (timestamp, float) = match dialect {
        Dialect::Postgres => ("TIMESTAMPTZ", "DOUBLE PRECISION"),
        Dialect::SqlServer => ("DATETIMEOFFSET", "FLOAT"),
    };
    format!(
        "CREATE TABLE {NAMESPACE}.ecr_labs (
            uuid VARCHAR(200) NOT NULL,
            eicr_id VARCHAR(200) NOT NULL
                REFERENCES {NAMESPACE}.ecr_data (eicr_id),
            test_type VARCHAR(255),
            test_type_code VARCHAR(255),
            test_type_system VARCHAR(255),
            test_result_qualitative VARCHAR(255),
            test_result_quantitative {float},
            test_result_units VARCHAR(50),
            test_result_code VARCHAR(255),
            test_result_code_display VARCHAR(255),
            test_result_code_system VARCHAR(255),
            test_result_interpretation VARCHAR(255),
            test_result_interpretation_code VARCHAR(255),
            test_result_interpretation_system VARCHAR(255),
            test_result_reference_range_low_value {float},
            test_result_reference_range_low_units VARCHAR(50),
            test_result_reference_range_high_value {float},
            test_result_reference_range_high_units VARCHAR(50),
            specimen_type VARCHAR(255),
            specimen_collection_date {timestamp},
            performing_lab VARCHAR(255),
            PRIMARY KEY (uuid, eicr_id)
        )"
    )
}

fn conditions_ddl(dialect: Dialect) -> String {
    let long_text = match dialect {
        Dialect::Postgres => "TEXT",
        Dialect::SqlServer => "VARCHAR(MAX)",
    };
    format!(
        "CREATE TABLE {NAMESPACE}.ecr_rr_conditions (
            uuid VARCHAR(200) PRIMARY KEY,
            eicr_id VARCHAR(200) NOT NULL
                REFERENCES {NAMESPACE}.ecr_data (eicr_id),
            condition {long_text}
        )"
    )
}

fn rule_summaries_ddl(dialect: Dialect) -> String {
    let long_text = match dialect {
        Dialect::Postgres => "TEXT",
        Dialect::SqlServer => "VARCHAR(MAX)",
    };
    format!(
        "CREATE TABLE {NAMESPACE}.ecr_rr_rule_summaries (
            uuid VARCHAR(200) PRIMARY KEY,
            ecr_rr_conditions_id VARCHAR(200)
                REFERENCES {NAMESPACE}.ecr_rr_conditions (uuid),
            rule_summary {long_text}
        )"
    )
}

pub(crate) async fn create_extended_tables(conn: &mut DbConnection) -> StoreResult<()> {
    let dialect = conn.dialect();
    // Parents before children so the foreign keys resolve.
    conn.execute(&ecr_data_ddl(dialect)).await?;
    conn.execute(&patient_address_ddl(dialect)).await?;
    conn.execute(&ecr_labs_ddl(dialect)).await?;
    conn.execute(&conditions_ddl(dialect)).await?;
    conn.execute(&rule_summaries_ddl(dialect)).await?;
    Ok(())
}

static EXTENDED_STEPS: [&dyn MigrationStep; 2] = [&InitializeExtended, &ExtendedIndexes];

/// Baseline: namespace plus all five extended tables.
struct InitializeExtended;

#[async_trait]
impl MigrationStep for InitializeExtended {
    fn name(&self) -> &'static str {
        "19700101000000_initialize_extended"
    }

    async fn up(&self, conn: &mut DbConnection) -> StoreResult<()> {
        if namespace_exists(conn).await? {
            info!(step = self.name(), "namespace already exists; marking as applied");
            return Ok(());
        }
        ensure_namespace(conn).await?;
        create_extended_tables(conn).await
    }

    async fn down(&self, conn: &mut DbConnection) -> StoreResult<()> {
        drop_tables_and_namespace(conn, &TABLES).await
    }
}

/// Indexes the listing sort column and the labs foreign key.
struct ExtendedIndexes;

#[async_trait]
impl MigrationStep for ExtendedIndexes {
    fn name(&self) -> &'static str {
        "19700101000001_extended_indexes"
    }

    async fn up(&self, conn: &mut DbConnection) -> StoreResult<()> {
        // Guarded like the baseline DDL: a run that crashed between this
        // step and its log row must be able to run again.
        let dialect = conn.dialect();
        let sort_index = index_ddl(dialect, "idx_ecr_data_date_created", "ecr_data", "date_created");
        conn.execute(&sort_index).await?;
        let labs_index = index_ddl(dialect, "idx_ecr_labs_eicr_id", "ecr_labs", "eicr_id");
        conn.execute(&labs_index).await?;
        Ok(())
    }

    async fn down(&self, conn: &mut DbConnection) -> StoreResult<()> {
        match conn.dialect() {
            Dialect::Postgres => {
                conn.execute(&format!(
                    "DROP INDEX IF EXISTS {NAMESPACE}.idx_ecr_labs_eicr_id"
                ))
                .await?;
                conn.execute(&format!(
                    "DROP INDEX IF EXISTS {NAMESPACE}.idx_ecr_data_date_created"
                ))
                .await?;
            }
            Dialect::SqlServer => {
                conn.execute(&format!(
                    "DROP INDEX idx_ecr_labs_eicr_id ON {NAMESPACE}.ecr_labs"
                ))
                .await?;
                conn.execute(&format!(
                    "DROP INDEX idx_ecr_data_date_created ON {NAMESPACE}.ecr_data"
                ))
                .await?;
            }
        }
        Ok(())
    }
}
