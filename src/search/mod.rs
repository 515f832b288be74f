//! The listing surface: paged, filtered, sorted record search plus the
//! matching count.

pub mod display;
pub mod escape;
pub mod query;

pub use display::{EcrDisplay, format_date, format_date_time};

use crate::db::Database;
use crate::error::StoreResult;
use crate::model::DateRangePeriod;

/// Returns one page of display rows matching the filters.
///
/// `start_index` is zero-based. The date range is required and bounds the
/// ingestion timestamp inclusively; `search_term` substring-matches the two
/// patient name columns; `filter_conditions` restricts to records whose
/// condition set intersects the list (or, with a single empty string, to
/// records with no conditions at all).
#[allow(clippy::too_many_arguments)]
pub async fn list_ecr_data(
    db: &Database,
    start_index: u64,
    items_per_page: u64,
    sort_column: &str,
    sort_direction: &str,
    date_range: &DateRangePeriod,
    search_term: Option<&str>,
    filter_conditions: Option<&[String]>,
) -> StoreResult<Vec<EcrDisplay>> {
    let sql = query::build_list_query(
        db.dialect(),
        db.schema(),
        start_index,
        items_per_page,
        sort_column,
        sort_direction,
        date_range,
        search_term,
        filter_conditions,
    );
    let mut conn = db.connection().await?;
    let rows = conn.query(&sql).await?;
    rows.iter()
        .map(|row| EcrDisplay::from_row(db.schema(), row))
        .collect()
}

/// Returns the total number of records matching the filters, for
/// pagination controls.
pub async fn get_total_ecr_count(
    db: &Database,
    date_range: &DateRangePeriod,
    search_term: Option<&str>,
    filter_conditions: Option<&[String]>,
) -> StoreResult<i64> {
    let sql = query::build_count_query(
        db.dialect(),
        db.schema(),
        date_range,
        search_term,
        filter_conditions,
    );
    let mut conn = db.connection().await?;
    let row = conn.query_opt(&sql).await?;
    Ok(row.and_then(|r| r.get_i64("count")).unwrap_or(0))
}
