//! Entities of the core schema variant.

use chrono::{DateTime, NaiveDate, Utc};

use crate::dialect::{SqlRow, SqlValue};
use crate::error::StoreResult;

use super::{FieldPairs, date, text};

/// A persisted core record.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreEcr {
    /// Primary key.
    pub eicr_id: String,
    /// Document set identifier.
    pub set_id: Option<String>,
    /// eICR version within the set.
    pub eicr_version_number: Option<String>,
    /// Where the source document lives, `S3` or `DB`.
    pub data_source: Option<String>,
    /// Link to the stored FHIR bundle.
    pub fhir_reference_link: Option<String>,
    /// Patient given name.
    pub patient_name_first: String,
    /// Patient family name.
    pub patient_name_last: String,
    /// Patient date of birth.
    pub patient_birth_date: NaiveDate,
    /// Server-assigned ingestion time.
    pub date_created: DateTime<Utc>,
    /// Clinical report date.
    pub report_date: NaiveDate,
}

/// Insert shape for [`CoreEcr`]; `date_created` is server-assigned.
#[derive(Debug, Clone)]
pub struct NewCoreEcr {
    /// Primary key.
    pub eicr_id: String,
    /// Document set identifier.
    pub set_id: Option<String>,
    /// eICR version within the set.
    pub eicr_version_number: Option<String>,
    /// Where the source document lives, `S3` or `DB`.
    pub data_source: Option<String>,
    /// Link to the stored FHIR bundle.
    pub fhir_reference_link: Option<String>,
    /// Patient given name.
    pub patient_name_first: String,
    /// Patient family name.
    pub patient_name_last: String,
    /// Patient date of birth.
    pub patient_birth_date: NaiveDate,
    /// Clinical report date.
    pub report_date: NaiveDate,
}

/// Partial update / lookup criteria for [`CoreEcr`].
#[derive(Debug, Clone, Default)]
pub struct CoreEcrPatch {
    /// Primary key.
    pub eicr_id: Option<String>,
    /// Document set identifier.
    pub set_id: Option<String>,
    /// eICR version within the set.
    pub eicr_version_number: Option<String>,
    /// Where the source document lives, `S3` or `DB`.
    pub data_source: Option<String>,
    /// Link to the stored FHIR bundle.
    pub fhir_reference_link: Option<String>,
    /// Patient given name.
    pub patient_name_first: Option<String>,
    /// Patient family name.
    pub patient_name_last: Option<String>,
    /// Patient date of birth.
    pub patient_birth_date: Option<NaiveDate>,
    /// Clinical report date.
    pub report_date: Option<NaiveDate>,
}

impl CoreEcr {
    pub(crate) fn from_row(row: &SqlRow) -> StoreResult<Self> {
        Ok(Self {
            eicr_id: row.require_text("eicr_id")?,
            set_id: row.get_text("set_id"),
            eicr_version_number: row.get_text("eicr_version_number"),
            data_source: row.get_text("data_source"),
            fhir_reference_link: row.get_text("fhir_reference_link"),
            patient_name_first: row.require_text("patient_name_first")?,
            patient_name_last: row.require_text("patient_name_last")?,
            patient_birth_date: row.require_date("patient_birth_date")?,
            date_created: row.require_timestamp("date_created")?,
            report_date: row.require_date("report_date")?,
        })
    }
}

impl NewCoreEcr {
    pub(crate) fn insert_pairs(&self) -> FieldPairs {
        vec![
            ("eicr_id", SqlValue::Text(self.eicr_id.clone())),
            ("set_id", text(&self.set_id)),
            ("eicr_version_number", text(&self.eicr_version_number)),
            ("data_source", text(&self.data_source)),
            ("fhir_reference_link", text(&self.fhir_reference_link)),
            (
                "patient_name_first",
                SqlValue::Text(self.patient_name_first.clone()),
            ),
            (
                "patient_name_last",
                SqlValue::Text(self.patient_name_last.clone()),
            ),
            ("patient_birth_date", SqlValue::Date(self.patient_birth_date)),
            ("report_date", SqlValue::Date(self.report_date)),
        ]
    }
}

impl CoreEcrPatch {
    pub(crate) fn pairs(&self) -> FieldPairs {
        let mut pairs = Vec::new();
        if let Some(v) = &self.eicr_id {
            pairs.push(("eicr_id", SqlValue::Text(v.clone())));
        }
        if let Some(v) = &self.set_id {
            pairs.push(("set_id", SqlValue::Text(v.clone())));
        }
        if let Some(v) = &self.eicr_version_number {
            pairs.push(("eicr_version_number", SqlValue::Text(v.clone())));
        }
        if let Some(v) = &self.data_source {
            pairs.push(("data_source", SqlValue::Text(v.clone())));
        }
        if let Some(v) = &self.fhir_reference_link {
            pairs.push(("fhir_reference_link", SqlValue::Text(v.clone())));
        }
        if let Some(v) = &self.patient_name_first {
            pairs.push(("patient_name_first", SqlValue::Text(v.clone())));
        }
        if let Some(v) = &self.patient_name_last {
            pairs.push(("patient_name_last", SqlValue::Text(v.clone())));
        }
        if self.patient_birth_date.is_some() {
            pairs.push(("patient_birth_date", date(&self.patient_birth_date)));
        }
        if self.report_date.is_some() {
            pairs.push(("report_date", date(&self.report_date)));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_a_full_row() {
        let row = SqlRow::from_pairs(vec![
            ("eicr_id".to_string(), SqlValue::Text("12345".to_string())),
            ("set_id".to_string(), SqlValue::Null),
            ("eicr_version_number".to_string(), SqlValue::Text("1".to_string())),
            ("data_source".to_string(), SqlValue::Text("DB".to_string())),
            ("fhir_reference_link".to_string(), SqlValue::Null),
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
                SqlValue::Timestamp(
                    chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 12, 2, 10, 0, 0).unwrap(),
                ),
            ),
            (
                "report_date".to_string(),
                SqlValue::Date(NaiveDate::from_ymd_opt(2024, 12, 1).unwrap()),
            ),
        ]);
        let ecr = CoreEcr::from_row(&row).unwrap();
        assert_eq!(ecr.eicr_id, "12345");
        assert_eq!(ecr.patient_name_first, "Billy");
        assert_eq!(ecr.set_id, None);
        assert_eq!(
            ecr.report_date,
            NaiveDate::from_ymd_opt(2024, 12, 1).unwrap()
        );
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let row = SqlRow::from_pairs(vec![(
            "eicr_id".to_string(),
            SqlValue::Text("12345".to_string()),
        )]);
        assert!(CoreEcr::from_row(&row).is_err());
    }

    #[test]
    fn insert_pairs_exclude_the_server_default() {
        let new = NewCoreEcr {
            eicr_id: "12345".to_string(),
            set_id: None,
            eicr_version_number: None,
            data_source: None,
            fhir_reference_link: None,
            patient_name_first: "Billy".to_string(),
            patient_name_last: "Bob".to_string(),
            patient_birth_date: NaiveDate::from_ymd_opt(1990, 1, 2).unwrap(),
            report_date: NaiveDate::from_ymd_opt(2024, 12, 1).unwrap(),
        };
        let pairs = new.insert_pairs();
        assert!(pairs.iter().all(|(name, _)| *name != "date_created"));
        assert_eq!(pairs.len(), 9);
    }
}
