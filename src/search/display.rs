//! The schema-neutral listing row and its formatting helpers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::dialect::SqlRow;
use crate::error::StoreResult;
use crate::schema::SchemaKind;

use super::query::columns;

/// One row of the listing page, identical for both schema variants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EcrDisplay {
    /// Record identifier.
    pub ecr_id: String,
    /// Patient given name, empty when unset.
    pub patient_first_name: String,
    /// Patient family name, empty when unset.
    pub patient_last_name: String,
    /// Formatted birth date, empty when unset.
    pub patient_date_of_birth: String,
    /// Condition display names aggregated across the record.
    pub reportable_conditions: Vec<String>,
    /// Rule summaries aggregated across the record.
    pub rule_summaries: Vec<String>,
    /// Formatted ingestion timestamp, empty when unset.
    pub date_created: String,
    /// Formatted report date (encounter start on the extended layout).
    pub patient_report_date: String,
    /// Document set identifier.
    pub eicr_set_id: Option<String>,
    /// eICR version within the set.
    pub eicr_version_number: Option<String>,
}

/// `MM/DD/YYYY`, fixed locale.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%m/%d/%Y").to_string()
}

/// `MM/DD/YYYY h:MM AM UTC`, fixed locale and zone.
pub fn format_date_time(at: DateTime<Utc>) -> String {
    at.format("%m/%d/%Y %-I:%M %p UTC").to_string()
}

impl EcrDisplay {
    pub(crate) fn from_row(schema: SchemaKind, row: &SqlRow) -> StoreResult<Self> {
        let cols = columns(schema);
        Ok(Self {
            ecr_id: row.require_text("eicr_id")?,
            patient_first_name: row.get_text(cols.first_name).unwrap_or_default(),
            patient_last_name: row.get_text(cols.last_name).unwrap_or_default(),
            patient_date_of_birth: row
                .get_date(cols.birth_date)
                .map(format_date)
                .unwrap_or_default(),
            reportable_conditions: row.get_string_list("conditions"),
            rule_summaries: row.get_string_list("rule_summaries"),
            date_created: row
                .get_timestamp("date_created")
                .map(format_date_time)
                .unwrap_or_default(),
            patient_report_date: row
                .get_timestamp(cols.report_date)
                .map(format_date_time)
                .unwrap_or_default(),
            eicr_set_id: row.get_text("set_id"),
            eicr_version_number: row.get_text("eicr_version_number"),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use crate::dialect::SqlValue;

    use super::*;

    #[test]
    fn formats_dates_with_the_fixed_locale() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
        assert_eq!(format_date(date), "12/01/2024");
    }

    #[test]
    fn formats_timestamps_in_utc_twelve_hour_time() {
        let at = Utc.with_ymd_and_hms(2024, 12, 1, 13, 5, 0).unwrap();
        assert_eq!(format_date_time(at), "12/01/2024 1:05 PM UTC");

        let midnight = Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap();
        assert_eq!(format_date_time(midnight), "12/01/2024 12:00 AM UTC");
    }

    #[test]
    fn maps_a_core_row_to_the_display_shape() {
        let row = SqlRow::from_pairs(vec![
            ("eicr_id".to_string(), SqlValue::Text("12345".to_string())),
            (
                "patient_name_first".to_string(),
                SqlValue::Text("Billy".to_string()),
            ),
            (
                "patient_name_last".to_string(),
                SqlValue::Text("Bob".to_string()),
            ),
            (
                "patient_birth_date".to_string(),
                SqlValue::Date(NaiveDate::from_ymd_opt(1990, 1, 2).unwrap()),
            ),
            (
                "date_created".to_string(),
                SqlValue::Timestamp(Utc.with_ymd_and_hms(2024, 12, 2, 10, 30, 0).unwrap()),
            ),
            (
                "report_date".to_string(),
                SqlValue::Date(NaiveDate::from_ymd_opt(2024, 12, 1).unwrap()),
            ),
            ("set_id".to_string(), SqlValue::Null),
            ("eicr_version_number".to_string(), SqlValue::Text("1".to_string())),
            (
                "conditions".to_string(),
                SqlValue::TextArray(vec!["Condition1".to_string()]),
            ),
            (
                "rule_summaries".to_string(),
                SqlValue::TextArray(vec!["Rule1".to_string()]),
            ),
        ]);
        let display = EcrDisplay::from_row(SchemaKind::Core, &row).unwrap();
        assert_eq!(display.ecr_id, "12345");
        assert_eq!(display.patient_first_name, "Billy");
        assert_eq!(display.patient_date_of_birth, "01/02/1990");
        assert_eq!(display.reportable_conditions, vec!["Condition1"]);
        assert_eq!(display.rule_summaries, vec!["Rule1"]);
        assert_eq!(display.patient_report_date, "12/01/2024 12:00 AM UTC");
        assert_eq!(display.eicr_set_id, None);
    }

    #[test]
    fn maps_an_extended_row_with_csv_aggregates() {
        let row = SqlRow::from_pairs(vec![
            ("eicr_id".to_string(), SqlValue::Text("e1".to_string())),
            ("first_name".to_string(), SqlValue::Text("Ana".to_string())),
            ("last_name".to_string(), SqlValue::Text("Lee".to_string())),
            ("birth_date".to_string(), SqlValue::Null),
            (
                "encounter_start_date".to_string(),
                SqlValue::Timestamp(Utc.with_ymd_and_hms(2024, 11, 5, 9, 0, 0).unwrap()),
            ),
            ("date_created".to_string(), SqlValue::Null),
            (
                "conditions".to_string(),
                SqlValue::Text("Measles,Mumps".to_string()),
            ),
            ("rule_summaries".to_string(), SqlValue::Null),
        ]);
        let display = EcrDisplay::from_row(SchemaKind::Extended, &row).unwrap();
        assert_eq!(display.patient_date_of_birth, "");
        assert_eq!(display.date_created, "");
        assert_eq!(display.reportable_conditions, vec!["Measles", "Mumps"]);
        assert!(display.rule_summaries.is_empty());
        assert_eq!(display.patient_report_date, "11/05/2024 9:00 AM UTC");
    }
}
