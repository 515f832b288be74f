//! CRUD repositories over the two schema variants.
//!
//! Every repository operation follows the same contract: reads that find
//! nothing return `Ok(None)` or an empty list, lookups require a criteria
//! object (an empty one matches everything), inserts return the row as the
//! database persisted it, and deletes fetch the row before removing it.
//!
//! All statements are rendered as literal SQL through
//! [`SqlValue::literal`]; the insert path reads the persisted row back via
//! `RETURNING *` / `OUTPUT INSERTED.*`.

pub mod core;
pub mod extended;

use tracing::error;

use crate::db::Database;
use crate::dialect::{DbConnection, Dialect, SqlRow, SqlValue};
use crate::error::{InvalidArgumentError, PersistenceError, StoreResult};
use crate::model::FieldPairs;
use crate::schema::NAMESPACE;

/// One reportable condition with its rule summaries, saved together with a
/// record in a single transaction.
#[derive(Debug, Clone, Default)]
pub struct ConditionBundle {
    /// Condition display name.
    pub condition: Option<String>,
    /// Reportability rule summaries tied to the condition.
    pub rule_summaries: Vec<String>,
}

pub(crate) fn render_insert(dialect: Dialect, table: &str, pairs: &FieldPairs) -> String {
    let cols: Vec<&str> = pairs.iter().map(|(c, _)| *c).collect();
    let vals: Vec<String> = pairs.iter().map(|(_, v)| v.literal(dialect)).collect();
    let cols = cols.join(", ");
    let vals = vals.join(", ");
    match dialect {
        Dialect::Postgres => format!(
            "INSERT INTO {NAMESPACE}.{table} ({cols}) VALUES ({vals}) RETURNING *"
        ),
        Dialect::SqlServer => format!(
            "INSERT INTO {NAMESPACE}.{table} ({cols}) OUTPUT INSERTED.* VALUES ({vals})"
        ),
    }
}

pub(crate) fn render_update(
    dialect: Dialect,
    table: &str,
    pairs: &FieldPairs,
    where_clause: &str,
) -> String {
    let sets: Vec<String> = pairs
        .iter()
        .map(|(c, v)| format!("{c} = {}", v.literal(dialect)))
        .collect();
    format!(
        "UPDATE {NAMESPACE}.{table} SET {} WHERE {where_clause}",
        sets.join(", ")
    )
}

pub(crate) fn render_select(table: &str, where_clause: &str) -> String {
    format!("SELECT * FROM {NAMESPACE}.{table} WHERE {where_clause}")
}

pub(crate) fn render_delete(table: &str, where_clause: &str) -> String {
    format!("DELETE FROM {NAMESPACE}.{table} WHERE {where_clause}")
}

/// Equality predicate for one column.
pub(crate) fn eq(dialect: Dialect, column: &str, value: &SqlValue) -> String {
    format!("{column} = {}", value.literal(dialect))
}

/// ANDs criteria pairs into a predicate; no pairs matches everything.
pub(crate) fn render_where(dialect: Dialect, pairs: &FieldPairs) -> String {
    if pairs.is_empty() {
        return "1 = 1".to_string();
    }
    let parts: Vec<String> = pairs
        .iter()
        .map(|(c, v)| eq(dialect, c, v))
        .collect();
    parts.join(" AND ")
}

/// Maps an absent criteria object to the caller-bug error.
pub(crate) fn require_criteria<'a, T>(
    entity: &'static str,
    criteria: Option<&'a T>,
) -> StoreResult<&'a T> {
    criteria.ok_or_else(|| InvalidArgumentError::MissingCriteria { entity }.into())
}

pub(crate) async fn select_one<T>(
    db: &Database,
    table: &str,
    where_clause: &str,
    map: impl Fn(&SqlRow) -> StoreResult<T>,
) -> StoreResult<Option<T>> {
    let mut conn = db.connection().await?;
    let row = conn.query_opt(&render_select(table, where_clause)).await?;
    row.as_ref().map(map).transpose()
}

pub(crate) async fn select_all<T>(
    db: &Database,
    table: &str,
    where_clause: &str,
    map: impl Fn(&SqlRow) -> StoreResult<T>,
) -> StoreResult<Vec<T>> {
    let mut conn = db.connection().await?;
    let rows = conn.query(&render_select(table, where_clause)).await?;
    rows.iter().map(map).collect()
}

/// Inserts on an already checked-out connection, so bundle saves can run
/// inside one transaction.
pub(crate) async fn insert_returning_on<T>(
    conn: &mut DbConnection,
    table: &str,
    pairs: &FieldPairs,
    map: impl Fn(&SqlRow) -> StoreResult<T>,
) -> StoreResult<T> {
    let sql = render_insert(conn.dialect(), table, pairs);
    let row = conn.query_opt(&sql).await.map_err(|e| {
        error!(table, error = %e, "insert failed");
        e
    })?;
    match row {
        Some(row) => map(&row),
        None => Err(PersistenceError::QueryFailed {
            message: format!("insert into {table} returned no row"),
        }
        .into()),
    }
}

pub(crate) async fn insert_returning<T>(
    db: &Database,
    table: &str,
    pairs: &FieldPairs,
    map: impl Fn(&SqlRow) -> StoreResult<T>,
) -> StoreResult<T> {
    let mut conn = db.connection().await?;
    insert_returning_on(&mut conn, table, pairs, map).await
}

pub(crate) async fn update_where(
    db: &Database,
    table: &str,
    pairs: &FieldPairs,
    where_clause: &str,
) -> StoreResult<()> {
    if pairs.is_empty() {
        return Ok(());
    }
    let mut conn = db.connection().await?;
    conn.execute(&render_update(db.dialect(), table, pairs, where_clause))
        .await?;
    Ok(())
}

/// Find-first delete: returns the row that was removed, `Ok(None)` when
/// nothing matched.
pub(crate) async fn delete_returning<T>(
    db: &Database,
    table: &str,
    where_clause: &str,
    map: impl Fn(&SqlRow) -> StoreResult<T>,
) -> StoreResult<Option<T>> {
    let existing = select_one(db, table, where_clause, map).await?;
    if existing.is_none() {
        return Ok(None);
    }
    let mut conn = db.connection().await?;
    conn.execute(&render_delete(table, where_clause)).await?;
    Ok(existing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs() -> FieldPairs {
        vec![
            ("eicr_id", SqlValue::Text("12345".to_string())),
            ("condition", SqlValue::Text("Bob's flu".to_string())),
        ]
    }

    #[test]
    fn insert_reads_back_via_returning_on_postgres() {
        let sql = render_insert(Dialect::Postgres, "ecr_rr_conditions", &pairs());
        assert_eq!(
            sql,
            "INSERT INTO ecr_viewer.ecr_rr_conditions (eicr_id, condition) \
             VALUES ('12345', 'Bob''s flu') RETURNING *"
        );
    }

    #[test]
    fn insert_reads_back_via_output_inserted_on_sqlserver() {
        let sql = render_insert(Dialect::SqlServer, "ecr_rr_conditions", &pairs());
        assert_eq!(
            sql,
            "INSERT INTO ecr_viewer.ecr_rr_conditions (eicr_id, condition) \
             OUTPUT INSERTED.* VALUES ('12345', 'Bob''s flu')"
        );
    }

    #[test]
    fn update_renders_only_set_fields() {
        let pairs = vec![("condition", SqlValue::Text("Measles".to_string()))];
        let sql = render_update(
            Dialect::Postgres,
            "ecr_rr_conditions",
            &pairs,
            "uuid = 'u1'",
        );
        assert_eq!(
            sql,
            "UPDATE ecr_viewer.ecr_rr_conditions SET condition = 'Measles' WHERE uuid = 'u1'"
        );
    }

    #[test]
    fn empty_criteria_matches_everything() {
        assert_eq!(render_where(Dialect::Postgres, &Vec::new()), "1 = 1");
    }

    #[test]
    fn criteria_pairs_are_anded() {
        let clause = render_where(Dialect::SqlServer, &pairs());
        assert_eq!(clause, "eicr_id = '12345' AND condition = 'Bob''s flu'");
    }

    #[test]
    fn missing_criteria_is_a_caller_error() {
        let err = require_criteria::<FieldPairs>("ecr_data", None).unwrap_err();
        assert!(matches!(
            err,
            crate::error::StoreError::InvalidArgument(
                InvalidArgumentError::MissingCriteria { entity: "ecr_data" }
            )
        ));
    }
}
