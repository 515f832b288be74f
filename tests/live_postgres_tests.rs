//! PostgreSQL live integration tests.
//!
//! These tests run against a real PostgreSQL instance and are ignored by
//! default. Point `POSTGRES_HOST` / `POSTGRES_DATABASE` / `POSTGRES_USER` /
//! `POSTGRES_PASSWORD` at a disposable database, then run:
//!
//! `cargo test -- --ignored live_`
//!
//! Every test provisions the core layout, clears its tables, and works
//! through the public repository and listing APIs only.

use chrono::{NaiveDate, TimeZone, Utc};

use ecr_persistence::model::DateRangePeriod;
use ecr_persistence::model::core::{CoreEcrPatch, NewCoreEcr};
use ecr_persistence::schema::{namespace_exists, schema_definition, table_exists};
use ecr_persistence::{
    ConditionBundle, CoreRepository, Database, Dialect, MigrationRunner, NAMESPACE, SchemaKind,
    StoreError, get_total_ecr_count, list_ecr_data,
};

async fn fresh_core_database() -> Database {
    let db = Database::open(Dialect::Postgres, SchemaKind::Core, None)
        .expect("settings should resolve");
    MigrationRunner::new(&db).up().await.expect("migrations");
    let schema = schema_definition(SchemaKind::Core);
    let mut conn = db.connection().await.expect("checkout");
    schema.clear(&mut conn).await.expect("clear");
    db
}

fn billy_bob() -> NewCoreEcr {
    NewCoreEcr {
        eicr_id: "12345".to_string(),
        set_id: Some("set-1".to_string()),
        eicr_version_number: Some("1".to_string()),
        data_source: Some("DB".to_string()),
        fhir_reference_link: None,
        patient_name_first: "Billy".to_string(),
        patient_name_last: "Bob".to_string(),
        patient_birth_date: NaiveDate::from_ymd_opt(1990, 1, 2).unwrap(),
        report_date: NaiveDate::from_ymd_opt(2024, 12, 1).unwrap(),
    }
}

fn december_2024() -> DateRangePeriod {
    DateRangePeriod::new(
        Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap(),
    )
    .unwrap()
}

#[tokio::test]
#[ignore]
async fn live_migrations_are_idempotent() {
    let db = fresh_core_database().await;

    // A second run finds nothing pending.
    let applied = MigrationRunner::new(&db).up().await.expect("second run");
    assert!(applied.is_empty());

    db.health_check().await.expect("health check");
}

#[tokio::test]
#[ignore]
async fn live_down_reverts_everything_and_up_reapplies() {
    let db = fresh_core_database().await;
    let runner = MigrationRunner::new(&db);

    let reverted = runner.down(None).await.expect("full revert");
    assert_eq!(
        reverted,
        vec![
            "19700101000001_core_report_fields",
            "19700101000000_initialize_core"
        ]
    );

    let mut conn = db.connection().await.expect("checkout");
    assert!(!namespace_exists(&mut conn).await.expect("namespace check"));
    drop(conn);

    let applied = runner.up().await.expect("rebuild");
    assert_eq!(
        applied,
        vec![
            "19700101000000_initialize_core",
            "19700101000001_core_report_fields"
        ]
    );
}

#[tokio::test]
#[ignore]
async fn live_down_to_target_keeps_the_baseline() {
    let db = fresh_core_database().await;
    let runner = MigrationRunner::new(&db);

    let reverted = runner
        .down(Some("19700101000000_initialize_core"))
        .await
        .expect("targeted revert");
    assert_eq!(reverted, vec!["19700101000001_core_report_fields"]);

    let mut conn = db.connection().await.expect("checkout");
    assert!(table_exists(&mut conn, "ecr_data").await.expect("table check"));
    drop(conn);

    let applied = runner.up().await.expect("reapply");
    assert_eq!(applied, vec!["19700101000001_core_report_fields"]);
}

#[tokio::test]
#[ignore]
async fn live_reapplying_a_step_after_log_loss_is_harmless() {
    let db = fresh_core_database().await;

    // A run that crashes between a step's DDL and its log row leaves the
    // log behind reality; the next run must still succeed.
    let mut conn = db.connection().await.expect("checkout");
    conn.execute(&format!(
        "DELETE FROM {NAMESPACE}.migration_log WHERE name = '19700101000001_core_report_fields'"
    ))
    .await
    .expect("trim log");
    drop(conn);

    let applied = MigrationRunner::new(&db).up().await.expect("rerun");
    assert_eq!(applied, vec!["19700101000001_core_report_fields"]);
}

#[tokio::test]
#[ignore]
async fn live_create_then_find_round_trips() {
    let db = fresh_core_database().await;
    let repo = CoreRepository::new(std::sync::Arc::new(db));

    let created = repo.create_ecr(&billy_bob()).await.expect("create");
    assert_eq!(created.eicr_id, "12345");
    // date_created is assigned by the server on insert.
    assert!(created.date_created > Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap());

    let found = repo
        .find_ecr_by_id("12345")
        .await
        .expect("find")
        .expect("row should exist");
    assert_eq!(found, created);
}

#[tokio::test]
#[ignore]
async fn live_update_applies_only_set_fields() {
    let db = fresh_core_database().await;
    let repo = CoreRepository::new(std::sync::Arc::new(db));
    repo.create_ecr(&billy_bob()).await.expect("create");

    let patch = CoreEcrPatch {
        patient_name_first: Some("William".to_string()),
        ..Default::default()
    };
    let updated = repo
        .update_ecr("12345", &patch)
        .await
        .expect("update")
        .expect("row should exist");
    assert_eq!(updated.patient_name_first, "William");
    assert_eq!(updated.patient_name_last, "Bob");
}

#[tokio::test]
#[ignore]
async fn live_delete_returns_the_removed_row_once() {
    let db = fresh_core_database().await;
    let repo = CoreRepository::new(std::sync::Arc::new(db));
    repo.create_ecr(&billy_bob()).await.expect("create");

    let removed = repo.delete_ecr("12345").await.expect("delete");
    assert!(removed.is_some());
    assert!(repo.find_ecr_by_id("12345").await.expect("find").is_none());
    assert!(repo.delete_ecr("12345").await.expect("redelete").is_none());
}

#[tokio::test]
#[ignore]
async fn live_absent_criteria_is_a_caller_error() {
    let db = fresh_core_database().await;
    let repo = CoreRepository::new(std::sync::Arc::new(db));

    let err = repo.find_ecrs_by_criteria(None).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
}

#[tokio::test]
#[ignore]
async fn live_listing_aggregates_conditions_and_summaries() {
    let db = std::sync::Arc::new(fresh_core_database().await);
    let repo = CoreRepository::new(std::sync::Arc::clone(&db));

    let bundle = ConditionBundle {
        condition: Some("Condition1".to_string()),
        rule_summaries: vec!["Rule1".to_string()],
    };
    repo.save_ecr_bundle(&billy_bob(), &[bundle])
        .await
        .expect("bundle save");

    let page = list_ecr_data(
        &db,
        0,
        25,
        "date_created",
        "DESC",
        &december_2024(),
        Some("bob"),
        None,
    )
    .await
    .expect("listing");
    assert_eq!(page.len(), 1);
    let row = &page[0];
    assert_eq!(row.ecr_id, "12345");
    assert_eq!(row.patient_first_name, "Billy");
    assert_eq!(row.patient_last_name, "Bob");
    assert_eq!(row.patient_date_of_birth, "01/02/1990");
    assert_eq!(row.reportable_conditions, vec!["Condition1"]);
    assert_eq!(row.rule_summaries, vec!["Rule1"]);
    assert_eq!(row.patient_report_date, "12/01/2024 12:00 AM UTC");

    let count = get_total_ecr_count(&db, &december_2024(), Some("bob"), None)
        .await
        .expect("count");
    assert_eq!(count, 1);
}

#[tokio::test]
#[ignore]
async fn live_pagination_past_the_last_row_is_empty() {
    let db = std::sync::Arc::new(fresh_core_database().await);
    let repo = CoreRepository::new(std::sync::Arc::clone(&db));
    repo.create_ecr(&billy_bob()).await.expect("create");

    let page = list_ecr_data(
        &db,
        1,
        1,
        "date_created",
        "DESC",
        &december_2024(),
        None,
        None,
    )
    .await
    .expect("listing");
    assert!(page.is_empty());
}
