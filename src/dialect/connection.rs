//! Checked-out connections and dialect-neutral row/value normalization.
//!
//! Repositories and the search layer never touch driver row types directly.
//! Every result row is normalized into a [`SqlRow`] of [`SqlValue`]s so the
//! layers above read one shape regardless of the dialect that produced it.

use std::ops::DerefMut;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tokio_postgres::types::Type;

use crate::error::{PersistenceError, StoreResult};
use crate::search::escape::escape_single_quotes;

use super::Dialect;

/// The concrete tiberius client type produced by the SQL Server pool.
pub type MssqlClient =
    tiberius::Client<tokio_util::compat::Compat<tokio::net::TcpStream>>;

/// A pooled SQL Server connection.
///
/// The pool's checked-out object is held behind a `DerefMut` box so this
/// module depends only on the client type, not on the pool's wrapper.
pub struct MssqlConn {
    inner: Box<dyn DerefMut<Target = MssqlClient> + Send>,
}

impl MssqlConn {
    /// Wraps a checked-out pool object.
    pub fn new(client: impl DerefMut<Target = MssqlClient> + Send + 'static) -> Self {
        Self {
            inner: Box::new(client),
        }
    }

    fn client(&mut self) -> &mut MssqlClient {
        self.inner.deref_mut()
    }
}

/// A connection checked out of a [`DialectPool`](super::DialectPool).
///
/// Held for the duration of one logical operation and returned to the pool
/// on drop.
pub enum DbConnection {
    /// A pooled PostgreSQL client.
    Postgres(deadpool_postgres::Client),
    /// A pooled SQL Server client.
    SqlServer(MssqlConn),
}

impl DbConnection {
    /// The dialect this connection speaks.
    pub fn dialect(&self) -> Dialect {
        match self {
            DbConnection::Postgres(_) => Dialect::Postgres,
            DbConnection::SqlServer(_) => Dialect::SqlServer,
        }
    }

    /// Executes a statement, returning the number of affected rows.
    pub async fn execute(&mut self, sql: &str) -> StoreResult<u64> {
        match self {
            DbConnection::Postgres(client) => Ok(client.execute(sql, &[]).await?),
            DbConnection::SqlServer(conn) => {
                let result = conn.client().execute(sql, &[]).await?;
                Ok(result.total())
            }
        }
    }

    /// Runs a query and normalizes every row of the first result set.
    pub async fn query(&mut self, sql: &str) -> StoreResult<Vec<SqlRow>> {
        match self {
            DbConnection::Postgres(client) => {
                let rows = client.query(sql, &[]).await?;
                rows.iter().map(normalize_postgres_row).collect()
            }
            DbConnection::SqlServer(conn) => {
                let rows = conn
                    .client()
                    .simple_query(sql)
                    .await?
                    .into_first_result()
                    .await?;
                rows.iter().map(normalize_mssql_row).collect()
            }
        }
    }

    /// Runs a query expected to produce at most one row.
    pub async fn query_opt(&mut self, sql: &str) -> StoreResult<Option<SqlRow>> {
        match self {
            DbConnection::Postgres(client) => {
                let row = client.query_opt(sql, &[]).await?;
                row.as_ref().map(normalize_postgres_row).transpose()
            }
            DbConnection::SqlServer(conn) => {
                let row = conn.client().simple_query(sql).await?.into_row().await?;
                row.as_ref().map(normalize_mssql_row).transpose()
            }
        }
    }

    /// Executes several semicolon-separated statements in one round trip.
    /// Used by schema provisioning; results are discarded.
    pub async fn batch(&mut self, sql: &str) -> StoreResult<()> {
        match self {
            DbConnection::Postgres(client) => {
                client.batch_execute(sql).await?;
                Ok(())
            }
            DbConnection::SqlServer(conn) => {
                conn.client()
                    .simple_query(sql)
                    .await?
                    .into_results()
                    .await?;
                Ok(())
            }
        }
    }

    /// Starts an explicit transaction.
    pub async fn begin(&mut self) -> StoreResult<()> {
        let sql = match self.dialect() {
            Dialect::Postgres => "BEGIN",
            Dialect::SqlServer => "BEGIN TRANSACTION",
        };
        self.execute(sql).await?;
        Ok(())
    }

    /// Commits the current transaction.
    pub async fn commit(&mut self) -> StoreResult<()> {
        let sql = match self.dialect() {
            Dialect::Postgres => "COMMIT",
            Dialect::SqlServer => "COMMIT TRANSACTION",
        };
        self.execute(sql).await?;
        Ok(())
    }

    /// Rolls back the current transaction.
    pub async fn rollback(&mut self) -> StoreResult<()> {
        let sql = match self.dialect() {
            Dialect::Postgres => "ROLLBACK",
            Dialect::SqlServer => "ROLLBACK TRANSACTION",
        };
        self.execute(sql).await?;
        Ok(())
    }
}

/// A dialect-neutral column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// Character data.
    Text(String),
    /// Any integer width, widened to 64 bits.
    Int(i64),
    /// Any floating-point or fixed-decimal value, normalized to f64.
    Float(f64),
    /// Boolean / BIT.
    Bool(bool),
    /// Calendar date without a time component.
    Date(NaiveDate),
    /// Point in time, normalized to UTC.
    Timestamp(DateTime<Utc>),
    /// A text array produced by set-returning aggregation.
    TextArray(Vec<String>),
}

impl SqlValue {
    /// Renders the value as a SQL literal for the given dialect.
    ///
    /// All dynamic SQL in this crate flows through this method and
    /// [`escape_single_quotes`]; there is no second rendering path.
    pub fn literal(&self, dialect: Dialect) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Text(s) => format!("'{}'", escape_single_quotes(s)),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::Float(f) => f.to_string(),
            SqlValue::Bool(b) => match dialect {
                Dialect::Postgres => if *b { "TRUE" } else { "FALSE" }.to_string(),
                Dialect::SqlServer => if *b { "1" } else { "0" }.to_string(),
            },
            SqlValue::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
            SqlValue::Timestamp(ts) => match dialect {
                Dialect::Postgres => format!("'{}'", ts.format("%Y-%m-%d %H:%M:%S%.6f")),
                Dialect::SqlServer => format!("'{}'", ts.format("%Y-%m-%dT%H:%M:%S%.3f")),
            },
            SqlValue::TextArray(items) => {
                let quoted: Vec<String> = items
                    .iter()
                    .map(|s| format!("'{}'", escape_single_quotes(s)))
                    .collect();
                match dialect {
                    Dialect::Postgres => format!("ARRAY[{}]", quoted.join(", ")),
                    // No array type; rendered as a CSV string.
                    Dialect::SqlServer => {
                        format!("'{}'", escape_single_quotes(&items.join(",")))
                    }
                }
            }
        }
    }
}

/// One normalized result row. Column lookup is case-insensitive.
#[derive(Debug, Clone)]
pub struct SqlRow {
    columns: Vec<(String, SqlValue)>,
}

impl SqlRow {
    /// Builds a row from named values. Exposed for tests of row mappers.
    pub fn from_pairs(pairs: Vec<(String, SqlValue)>) -> Self {
        Self { columns: pairs }
    }

    /// Returns the value for `name`, or [`SqlValue::Null`] when the column
    /// is absent from the projection.
    pub fn get(&self, name: &str) -> &SqlValue {
        self.columns
            .iter()
            .find(|(col, _)| col.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
            .unwrap_or(&SqlValue::Null)
    }

    /// Text value, or `None` for NULL/absent.
    pub fn get_text(&self, name: &str) -> Option<String> {
        match self.get(name) {
            SqlValue::Text(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Text value that the schema guarantees NOT NULL.
    pub fn require_text(&self, name: &str) -> StoreResult<String> {
        self.get_text(name)
            .ok_or_else(|| {
                PersistenceError::QueryFailed {
                    message: format!("expected non-null text column '{name}'"),
                }
                .into()
            })
    }

    /// Floating-point value; integers widen, NULL/absent is `None`.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.get(name) {
            SqlValue::Float(f) => Some(*f),
            SqlValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Integer value, or `None` for NULL/absent.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            SqlValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Boolean value, or `None` for NULL/absent.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name) {
            SqlValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Date value; timestamps yield their UTC calendar date.
    pub fn get_date(&self, name: &str) -> Option<NaiveDate> {
        match self.get(name) {
            SqlValue::Date(d) => Some(*d),
            SqlValue::Timestamp(ts) => Some(ts.date_naive()),
            _ => None,
        }
    }

    /// Timestamp value; bare dates yield midnight UTC.
    pub fn get_timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.get(name) {
            SqlValue::Timestamp(ts) => Some(*ts),
            SqlValue::Date(d) => d
                .and_hms_opt(0, 0, 0)
                .map(|dt| Utc.from_utc_datetime(&dt)),
            _ => None,
        }
    }

    /// Date value that the schema guarantees NOT NULL.
    pub fn require_date(&self, name: &str) -> StoreResult<NaiveDate> {
        self.get_date(name).ok_or_else(|| {
            PersistenceError::QueryFailed {
                message: format!("expected non-null date column '{name}'"),
            }
            .into()
        })
    }

    /// Timestamp value that the schema guarantees NOT NULL.
    pub fn require_timestamp(&self, name: &str) -> StoreResult<DateTime<Utc>> {
        self.get_timestamp(name).ok_or_else(|| {
            PersistenceError::QueryFailed {
                message: format!("expected non-null timestamp column '{name}'"),
            }
            .into()
        })
    }

    /// A list of strings from either a native array column or a
    /// comma-separated aggregate. NULL/absent is an empty list.
    pub fn get_string_list(&self, name: &str) -> Vec<String> {
        match self.get(name) {
            SqlValue::TextArray(items) => items.clone(),
            SqlValue::Text(csv) => csv
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn normalize_postgres_row(row: &tokio_postgres::Row) -> StoreResult<SqlRow> {
    let mut columns = Vec::with_capacity(row.columns().len());
    for (idx, col) in row.columns().iter().enumerate() {
        let ty = col.type_();
        let value = if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR {
            row.try_get::<_, Option<String>>(idx)
                .map_err(PersistenceError::from)?
                .map_or(SqlValue::Null, SqlValue::Text)
        } else if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(idx)
                .map_err(PersistenceError::from)?
                .map_or(SqlValue::Null, |v| SqlValue::Int(v as i64))
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(idx)
                .map_err(PersistenceError::from)?
                .map_or(SqlValue::Null, |v| SqlValue::Int(v as i64))
        } else if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(idx)
                .map_err(PersistenceError::from)?
                .map_or(SqlValue::Null, SqlValue::Int)
        } else if *ty == Type::FLOAT4 {
            row.try_get::<_, Option<f32>>(idx)
                .map_err(PersistenceError::from)?
                .map_or(SqlValue::Null, |v| SqlValue::Float(v as f64))
        } else if *ty == Type::FLOAT8 {
            row.try_get::<_, Option<f64>>(idx)
                .map_err(PersistenceError::from)?
                .map_or(SqlValue::Null, SqlValue::Float)
        } else if *ty == Type::NUMERIC {
            match row
                .try_get::<_, Option<Decimal>>(idx)
                .map_err(PersistenceError::from)?
                .and_then(|d| d.to_f64())
            {
                Some(f) => SqlValue::Float(f),
                None => SqlValue::Null,
            }
        } else if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(idx)
                .map_err(PersistenceError::from)?
                .map_or(SqlValue::Null, SqlValue::Bool)
        } else if *ty == Type::DATE {
            row.try_get::<_, Option<NaiveDate>>(idx)
                .map_err(PersistenceError::from)?
                .map_or(SqlValue::Null, SqlValue::Date)
        } else if *ty == Type::TIMESTAMP {
            row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)
                .map_err(PersistenceError::from)?
                .map_or(SqlValue::Null, |dt| {
                    SqlValue::Timestamp(Utc.from_utc_datetime(&dt))
                })
        } else if *ty == Type::TIMESTAMPTZ {
            row.try_get::<_, Option<DateTime<Utc>>>(idx)
                .map_err(PersistenceError::from)?
                .map_or(SqlValue::Null, SqlValue::Timestamp)
        } else if *ty == Type::TEXT_ARRAY || *ty == Type::VARCHAR_ARRAY {
            row.try_get::<_, Option<Vec<Option<String>>>>(idx)
                .map_err(PersistenceError::from)?
                .map_or(SqlValue::Null, |items| {
                    SqlValue::TextArray(items.into_iter().flatten().collect())
                })
        } else {
            return Err(PersistenceError::QueryFailed {
                message: format!(
                    "unsupported column type {} for column '{}'",
                    ty,
                    col.name()
                ),
            }
            .into());
        };
        columns.push((col.name().to_string(), value));
    }
    Ok(SqlRow { columns })
}

// Wrong-type try_get errs while a NULL of the right type is Ok(None), so a
// cascade over the types the schemas use lands on the stored value.
fn normalize_mssql_row(row: &tiberius::Row) -> StoreResult<SqlRow> {
    let names: Vec<String> = row
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let mut columns = Vec::with_capacity(names.len());
    for (idx, name) in names.into_iter().enumerate() {
        let value = normalize_mssql_value(row, idx);
        columns.push((name, value));
    }
    Ok(SqlRow { columns })
}

fn normalize_mssql_value(row: &tiberius::Row, idx: usize) -> SqlValue {
    if let Ok(Some(v)) = row.try_get::<&str, _>(idx) {
        return SqlValue::Text(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<i32, _>(idx) {
        return SqlValue::Int(v as i64);
    }
    if let Ok(Some(v)) = row.try_get::<i64, _>(idx) {
        return SqlValue::Int(v);
    }
    if let Ok(Some(v)) = row.try_get::<i16, _>(idx) {
        return SqlValue::Int(v as i64);
    }
    if let Ok(Some(v)) = row.try_get::<f64, _>(idx) {
        return SqlValue::Float(v);
    }
    if let Ok(Some(v)) = row.try_get::<f32, _>(idx) {
        return SqlValue::Float(v as f64);
    }
    if let Ok(Some(v)) = row.try_get::<Decimal, _>(idx) {
        if let Some(f) = v.to_f64() {
            return SqlValue::Float(f);
        }
        return SqlValue::Null;
    }
    if let Ok(Some(v)) = row.try_get::<bool, _>(idx) {
        return SqlValue::Bool(v);
    }
    if let Ok(Some(v)) = row.try_get::<NaiveDate, _>(idx) {
        return SqlValue::Date(v);
    }
    if let Ok(Some(v)) = row.try_get::<chrono::NaiveDateTime, _>(idx) {
        return SqlValue::Timestamp(Utc.from_utc_datetime(&v));
    }
    if let Ok(Some(v)) = row.try_get::<DateTime<Utc>, _>(idx) {
        return SqlValue::Timestamp(v);
    }
    SqlValue::Null
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn text_literals_double_embedded_quotes() {
        let value = SqlValue::Text("O'Riley".to_string());
        assert_eq!(value.literal(Dialect::Postgres), "'O''Riley'");
        assert_eq!(value.literal(Dialect::SqlServer), "'O''Riley'");
    }

    #[test]
    fn bool_literals_differ_by_dialect() {
        assert_eq!(SqlValue::Bool(true).literal(Dialect::Postgres), "TRUE");
        assert_eq!(SqlValue::Bool(true).literal(Dialect::SqlServer), "1");
        assert_eq!(SqlValue::Bool(false).literal(Dialect::Postgres), "FALSE");
        assert_eq!(SqlValue::Bool(false).literal(Dialect::SqlServer), "0");
    }

    #[test]
    fn date_and_timestamp_literals() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
        assert_eq!(SqlValue::Date(date).literal(Dialect::Postgres), "'2024-12-01'");
        assert_eq!(SqlValue::Date(date).literal(Dialect::SqlServer), "'2024-12-01'");

        let ts = Utc
            .from_utc_datetime(&date.and_hms_opt(13, 30, 5).unwrap());
        assert_eq!(
            SqlValue::Timestamp(ts).literal(Dialect::Postgres),
            "'2024-12-01 13:30:05.000000'"
        );
        assert_eq!(
            SqlValue::Timestamp(ts).literal(Dialect::SqlServer),
            "'2024-12-01T13:30:05.000'"
        );
    }

    #[test]
    fn null_literal() {
        assert_eq!(SqlValue::Null.literal(Dialect::Postgres), "NULL");
        assert_eq!(SqlValue::Null.literal(Dialect::SqlServer), "NULL");
    }

    #[test]
    fn row_lookup_is_case_insensitive() {
        let row = SqlRow::from_pairs(vec![(
            "eicr_id".to_string(),
            SqlValue::Text("abc".to_string()),
        )]);
        assert_eq!(row.get_text("EICR_ID").as_deref(), Some("abc"));
        assert_eq!(row.get_text("missing"), None);
    }

    #[test]
    fn string_list_handles_arrays_and_csv() {
        let row = SqlRow::from_pairs(vec![
            (
                "conditions".to_string(),
                SqlValue::TextArray(vec!["a".to_string(), "b".to_string()]),
            ),
            ("summaries".to_string(), SqlValue::Text("x, y,z".to_string())),
            ("empty".to_string(), SqlValue::Null),
        ]);
        assert_eq!(row.get_string_list("conditions"), vec!["a", "b"]);
        assert_eq!(row.get_string_list("summaries"), vec!["x", "y", "z"]);
        assert!(row.get_string_list("empty").is_empty());
    }

    #[test]
    fn numeric_widening() {
        let row = SqlRow::from_pairs(vec![
            ("lat".to_string(), SqlValue::Float(41.88)),
            ("count".to_string(), SqlValue::Int(7)),
        ]);
        assert_eq!(row.get_f64("lat"), Some(41.88));
        assert_eq!(row.get_f64("count"), Some(7.0));
        assert_eq!(row.get_i64("count"), Some(7));
        assert_eq!(row.get_i64("lat"), None);
    }
}
