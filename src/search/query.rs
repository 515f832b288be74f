//! Listing and count SQL assembly.
//!
//! The builder composes two independent axes: the schema variant picks the
//! column names (patient name and report date live in different columns on
//! the two layouts) and the dialect picks the matching operator, the
//! aggregation strategy, and the literal formats. Every function here is
//! pure; the statements they return are executed by the parent module.
//!
//! The WHERE clause always has the shape
//! `(search) AND (dates) AND (conditions)` with inactive filters rendered
//! as tautologies, so the three groups are present no matter which filters
//! the caller supplied.

use tracing::warn;

use crate::dialect::{Dialect, SqlValue};
use crate::model::DateRangePeriod;
use crate::schema::{NAMESPACE, SchemaKind};

use super::escape::escape_single_quotes;

const NO_FILTER: &str = "NULL IS NULL";

pub(crate) struct ColumnMap {
    pub first_name: &'static str,
    pub last_name: &'static str,
    pub birth_date: &'static str,
    pub report_date: &'static str,
}

pub(crate) fn columns(schema: SchemaKind) -> ColumnMap {
    match schema {
        SchemaKind::Core => ColumnMap {
            first_name: "patient_name_first",
            last_name: "patient_name_last",
            birth_date: "patient_birth_date",
            report_date: "report_date",
        },
        SchemaKind::Extended => ColumnMap {
            first_name: "first_name",
            last_name: "last_name",
            birth_date: "birth_date",
            report_date: "encounter_start_date",
        },
    }
}

fn like_operator(dialect: Dialect) -> &'static str {
    // SQL Server has no ILIKE; its matching stays case-sensitive.
    match dialect {
        Dialect::Postgres => "ILIKE",
        Dialect::SqlServer => "LIKE",
    }
}

/// OR over the two name columns, or a two-clause tautology with no term.
pub fn search_statement(
    dialect: Dialect,
    schema: SchemaKind,
    term: Option<&str>,
) -> String {
    let term = term.filter(|t| !t.is_empty());
    let Some(term) = term else {
        return format!("{NO_FILTER} OR {NO_FILTER}");
    };
    let cols = columns(schema);
    let op = like_operator(dialect);
    let escaped = escape_single_quotes(term);
    format!(
        "ed.{first} {op} '%{escaped}%' OR ed.{last} {op} '%{escaped}%'",
        first = cols.first_name,
        last = cols.last_name,
    )
}

/// Membership filter against the condition table.
///
/// A list containing only empty strings is the "no conditions at all"
/// sentinel and flips the subquery to NOT IN. Condition matching is
/// case-insensitive substring on Postgres and exact on SQL Server; the
/// divergence is inherited product behavior.
pub fn conditions_statement(
    dialect: Dialect,
    filter_conditions: Option<&[String]>,
) -> String {
    let Some(conditions) = filter_conditions.filter(|c| !c.is_empty()) else {
        return NO_FILTER.to_string();
    };

    if conditions.iter().all(|c| c.is_empty()) {
        return format!(
            "ed.eicr_id NOT IN (SELECT DISTINCT erc_sub.eicr_id \
             FROM {NAMESPACE}.ecr_rr_conditions erc_sub \
             WHERE erc_sub.condition IS NOT NULL)"
        );
    }

    let matches: Vec<String> = conditions
        .iter()
        .map(|condition| {
            let escaped = escape_single_quotes(condition);
            match dialect {
                Dialect::Postgres => format!("erc_sub.condition ILIKE '%{escaped}%'"),
                Dialect::SqlServer => format!("erc_sub.condition LIKE '{escaped}'"),
            }
        })
        .collect();
    format!(
        "ed.eicr_id IN (SELECT DISTINCT ed_sub.eicr_id \
         FROM {NAMESPACE}.ecr_data ed_sub \
         LEFT JOIN {NAMESPACE}.ecr_rr_conditions erc_sub \
         ON ed_sub.eicr_id = erc_sub.eicr_id \
         WHERE erc_sub.condition IS NOT NULL AND ({}))",
        matches.join(" OR ")
    )
}

/// Inclusive creation-timestamp bounds.
pub fn date_statement(dialect: Dialect, range: &DateRangePeriod) -> String {
    format!(
        "ed.date_created >= {start} AND ed.date_created <= {end}",
        start = SqlValue::Timestamp(range.start()).literal(dialect),
        end = SqlValue::Timestamp(range.end()).literal(dialect),
    )
}

/// The full predicate: `(search) AND (dates) AND (conditions)`.
pub fn where_statement(
    dialect: Dialect,
    schema: SchemaKind,
    range: &DateRangePeriod,
    term: Option<&str>,
    filter_conditions: Option<&[String]>,
) -> String {
    format!(
        "({}) AND ({}) AND ({})",
        search_statement(dialect, schema, term),
        date_statement(dialect, range),
        conditions_statement(dialect, filter_conditions),
    )
}

/// Sort clause with validated column and direction.
///
/// Unknown columns fall back to `date_created` and unknown directions to
/// `DESC`; both corrections are silent toward the caller but logged.
pub fn sort_statement(schema: SchemaKind, column: &str, direction: &str) -> String {
    let direction = match direction.to_ascii_uppercase().as_str() {
        "ASC" => "ASC",
        "DESC" => "DESC",
        other => {
            warn!(direction = other, "unrecognized sort direction; using DESC");
            "DESC"
        }
    };

    let cols = columns(schema);
    match column {
        "patient" => format!(
            "ORDER BY ed.{last} {direction}, ed.{first} {direction}",
            last = cols.last_name,
            first = cols.first_name,
        ),
        "date_created" => format!("ORDER BY ed.date_created {direction}"),
        "report_date" => format!(
            "ORDER BY ed.{report} {direction}",
            report = cols.report_date
        ),
        other => {
            warn!(column = other, "unrecognized sort column; using date_created");
            format!("ORDER BY ed.date_created {direction}")
        }
    }
}

/// OFFSET/FETCH pagination, identical on both dialects.
pub fn pagination_statement(start_index: u64, items_per_page: u64) -> String {
    format!("OFFSET {start_index} ROWS FETCH NEXT {items_per_page} ROWS ONLY")
}

fn aggregate(dialect: Dialect, expr: &str, alias: &str) -> String {
    match dialect {
        Dialect::Postgres => format!(
            "ARRAY_AGG(DISTINCT {expr}) FILTER (WHERE {expr} IS NOT NULL) AS {alias}"
        ),
        Dialect::SqlServer => format!("STRING_AGG({expr}, ',') AS {alias}"),
    }
}

fn projected_scalars(schema: SchemaKind) -> Vec<String> {
    let cols = columns(schema);
    let mut scalars = vec!["ed.eicr_id".to_string()];
    scalars.push(format!("ed.{}", cols.first_name));
    scalars.push(format!("ed.{}", cols.last_name));
    scalars.push(format!("ed.{}", cols.birth_date));
    scalars.push("ed.date_created".to_string());
    scalars.push(format!("ed.{}", cols.report_date));
    scalars.push("ed.set_id".to_string());
    scalars.push("ed.eicr_version_number".to_string());
    scalars
}

/// Assembles the full listing statement for one (dialect, schema) pair.
#[allow(clippy::too_many_arguments)]
pub fn build_list_query(
    dialect: Dialect,
    schema: SchemaKind,
    start_index: u64,
    items_per_page: u64,
    sort_column: &str,
    sort_direction: &str,
    range: &DateRangePeriod,
    term: Option<&str>,
    filter_conditions: Option<&[String]>,
) -> String {
    let scalars = projected_scalars(schema);
    let select = format!(
        "{}, {}, {}",
        scalars.join(", "),
        aggregate(dialect, "erc.condition", "conditions"),
        aggregate(dialect, "ers.rule_summary", "rule_summaries"),
    );
    format!(
        "SELECT {select} FROM {NAMESPACE}.ecr_data ed \
         LEFT JOIN {NAMESPACE}.ecr_rr_conditions erc ON ed.eicr_id = erc.eicr_id \
         LEFT JOIN {NAMESPACE}.ecr_rr_rule_summaries ers ON erc.uuid = ers.ecr_rr_conditions_id \
         WHERE {where_clause} \
         GROUP BY {group_by} \
         {sort} {page}",
        where_clause = where_statement(dialect, schema, range, term, filter_conditions),
        group_by = scalars.join(", "),
        sort = sort_statement(schema, sort_column, sort_direction),
        page = pagination_statement(start_index, items_per_page),
    )
}

/// Assembles the matching-record count statement; same predicate shape,
/// no aggregation or pagination.
pub fn build_count_query(
    dialect: Dialect,
    schema: SchemaKind,
    range: &DateRangePeriod,
    term: Option<&str>,
    filter_conditions: Option<&[String]>,
) -> String {
    format!(
        "SELECT COUNT(DISTINCT ed.eicr_id) AS count FROM {NAMESPACE}.ecr_data ed \
         LEFT JOIN {NAMESPACE}.ecr_rr_conditions erc ON ed.eicr_id = erc.eicr_id \
         WHERE {}",
        where_statement(dialect, schema, range, term, filter_conditions),
    )
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn december_2024() -> DateRangePeriod {
        DateRangePeriod::new(
            Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn absent_term_renders_the_tautology_pair() {
        assert_eq!(
            search_statement(Dialect::Postgres, SchemaKind::Core, None),
            "NULL IS NULL OR NULL IS NULL"
        );
        assert_eq!(
            search_statement(Dialect::SqlServer, SchemaKind::Extended, Some("")),
            "NULL IS NULL OR NULL IS NULL"
        );
    }

    #[test]
    fn search_uses_schema_columns_and_dialect_operator() {
        assert_eq!(
            search_statement(Dialect::Postgres, SchemaKind::Core, Some("bob")),
            "ed.patient_name_first ILIKE '%bob%' OR ed.patient_name_last ILIKE '%bob%'"
        );
        assert_eq!(
            search_statement(Dialect::SqlServer, SchemaKind::Extended, Some("bob")),
            "ed.first_name LIKE '%bob%' OR ed.last_name LIKE '%bob%'"
        );
    }

    #[test]
    fn search_term_quotes_are_doubled() {
        let stmt = search_statement(Dialect::Postgres, SchemaKind::Core, Some("O'Riley"));
        assert!(stmt.contains("'%O''Riley%'"));
        let stmt = search_statement(Dialect::SqlServer, SchemaKind::Extended, Some("O'Riley"));
        assert!(stmt.contains("'%O''Riley%'"));
    }

    #[test]
    fn absent_conditions_render_the_tautology() {
        assert_eq!(conditions_statement(Dialect::Postgres, None), "NULL IS NULL");
        assert_eq!(
            conditions_statement(Dialect::SqlServer, Some(&[])),
            "NULL IS NULL"
        );
    }

    #[test]
    fn empty_string_sentinel_selects_condition_free_records() {
        let stmt =
            conditions_statement(Dialect::Postgres, Some(&["".to_string()]));
        assert!(stmt.starts_with("ed.eicr_id NOT IN ("));
        assert!(stmt.contains("erc_sub.condition IS NOT NULL"));
    }

    #[test]
    fn condition_matching_diverges_by_dialect() {
        let filter = vec!["Influenza".to_string()];
        let pg = conditions_statement(Dialect::Postgres, Some(&filter));
        assert!(pg.contains("erc_sub.condition ILIKE '%Influenza%'"));
        assert!(pg.starts_with("ed.eicr_id IN ("));

        let mssql = conditions_statement(Dialect::SqlServer, Some(&filter));
        assert!(mssql.contains("erc_sub.condition LIKE 'Influenza'"));
    }

    #[test]
    fn condition_names_are_escaped() {
        let filter = vec!["Bob's flu".to_string()];
        let stmt = conditions_statement(Dialect::Postgres, Some(&filter));
        assert!(stmt.contains("'%Bob''s flu%'"));
    }

    #[test]
    fn date_bounds_are_inclusive_and_dialect_formatted() {
        let range = december_2024();
        assert_eq!(
            date_statement(Dialect::Postgres, &range),
            "ed.date_created >= '2024-12-01 00:00:00.000000' \
             AND ed.date_created <= '2024-12-31 23:59:59.000000'"
        );
        assert_eq!(
            date_statement(Dialect::SqlServer, &range),
            "ed.date_created >= '2024-12-01T00:00:00.000' \
             AND ed.date_created <= '2024-12-31T23:59:59.000'"
        );
    }

    #[test]
    fn where_clause_always_has_three_groups() {
        let clause =
            where_statement(Dialect::Postgres, SchemaKind::Core, &december_2024(), None, None);
        assert_eq!(clause.matches(" AND (").count(), 2);
        assert!(clause.starts_with("(NULL IS NULL OR NULL IS NULL) AND ("));
        assert!(clause.ends_with("AND (NULL IS NULL)"));
    }

    #[test]
    fn patient_sort_orders_by_last_then_first() {
        assert_eq!(
            sort_statement(SchemaKind::Core, "patient", "asc"),
            "ORDER BY ed.patient_name_last ASC, ed.patient_name_first ASC"
        );
        assert_eq!(
            sort_statement(SchemaKind::Extended, "patient", "DESC"),
            "ORDER BY ed.last_name DESC, ed.first_name DESC"
        );
    }

    #[test]
    fn extended_maps_report_date_to_encounter_start() {
        assert_eq!(
            sort_statement(SchemaKind::Extended, "report_date", "ASC"),
            "ORDER BY ed.encounter_start_date ASC"
        );
        assert_eq!(
            sort_statement(SchemaKind::Core, "report_date", "ASC"),
            "ORDER BY ed.report_date ASC"
        );
    }

    #[test]
    fn unknown_sort_inputs_fall_back_silently() {
        assert_eq!(
            sort_statement(SchemaKind::Core, "surprise", "sideways"),
            "ORDER BY ed.date_created DESC"
        );
    }

    #[test]
    fn pagination_renders_offset_fetch() {
        assert_eq!(
            pagination_statement(25, 25),
            "OFFSET 25 ROWS FETCH NEXT 25 ROWS ONLY"
        );
    }

    #[test]
    fn core_postgres_list_query_shape() {
        let sql = build_list_query(
            Dialect::Postgres,
            SchemaKind::Core,
            0,
            25,
            "date_created",
            "DESC",
            &december_2024(),
            None,
            None,
        );
        assert!(sql.contains("ed.patient_name_first"));
        assert!(sql.contains(
            "ARRAY_AGG(DISTINCT erc.condition) FILTER (WHERE erc.condition IS NOT NULL) AS conditions"
        ));
        assert!(sql.contains("LEFT JOIN ecr_viewer.ecr_rr_rule_summaries ers"));
        assert!(sql.contains("GROUP BY ed.eicr_id, ed.patient_name_first"));
        assert!(sql.ends_with("OFFSET 0 ROWS FETCH NEXT 25 ROWS ONLY"));
    }

    #[test]
    fn extended_sqlserver_list_query_shape() {
        let sql = build_list_query(
            Dialect::SqlServer,
            SchemaKind::Extended,
            0,
            10,
            "patient",
            "ASC",
            &december_2024(),
            Some("bob"),
            None,
        );
        assert!(sql.contains("ed.first_name"));
        assert!(sql.contains("STRING_AGG(erc.condition, ',') AS conditions"));
        assert!(sql.contains("STRING_AGG(ers.rule_summary, ',') AS rule_summaries"));
        assert!(sql.contains("ORDER BY ed.last_name ASC, ed.first_name ASC"));
    }

    #[test]
    fn mixed_pairs_compose_both_axes() {
        // Core on SQL Server keeps core columns with SQL Server aggregation.
        let sql = build_list_query(
            Dialect::SqlServer,
            SchemaKind::Core,
            0,
            25,
            "date_created",
            "DESC",
            &december_2024(),
            None,
            None,
        );
        assert!(sql.contains("ed.patient_name_last"));
        assert!(sql.contains("STRING_AGG(erc.condition, ',')"));

        // Extended on Postgres keeps extended columns with array aggregation.
        let sql = build_list_query(
            Dialect::Postgres,
            SchemaKind::Extended,
            0,
            25,
            "date_created",
            "DESC",
            &december_2024(),
            None,
            None,
        );
        assert!(sql.contains("ed.encounter_start_date"));
        assert!(sql.contains("ARRAY_AGG(DISTINCT erc.condition)"));
    }

    #[test]
    fn count_query_mirrors_the_predicates_without_aggregation() {
        let filter = vec!["Influenza".to_string()];
        let sql = build_count_query(
            Dialect::Postgres,
            SchemaKind::Core,
            &december_2024(),
            Some("O'Riley"),
            Some(&filter),
        );
        assert!(sql.starts_with("SELECT COUNT(DISTINCT ed.eicr_id) AS count"));
        assert!(sql.contains("'%O''Riley%'"));
        assert!(sql.contains("ILIKE '%Influenza%'"));
        assert!(!sql.contains("GROUP BY"));
        assert!(!sql.contains("OFFSET"));
    }
}
