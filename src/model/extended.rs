//! Entities of the extended schema variant.
//!
//! The record struct mirrors the `ecr_data` table column for column, so the
//! field lists below are deliberately flat rather than nested.

use chrono::{DateTime, NaiveDate, Utc};

use crate::dialect::{SqlRow, SqlValue};
use crate::error::StoreResult;

use super::{FieldPairs, date, float, text, timestamp};

/// A persisted extended record. Names and birth date are NOT NULL at the
/// table level but stay optional here, matching the wire shape upstream
/// producers send.
#[derive(Debug, Clone, PartialEq, Default)]
#[allow(missing_docs)]
pub struct ExtendedEcr {
    pub eicr_id: String,
    pub set_id: Option<String>,
    pub fhir_reference_link: Option<String>,
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
    pub birth_sex: Option<String>,
    pub gender_identity: Option<String>,
    pub race: Option<String>,
    pub ethnicity: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub homelessness_status: Option<String>,
    pub disabilities: Option<String>,
    pub tribal_affiliation: Option<String>,
    pub tribal_enrollment_status: Option<String>,
    pub current_job_title: Option<String>,
    pub current_job_industry: Option<String>,
    pub usual_occupation: Option<String>,
    pub usual_industry: Option<String>,
    pub preferred_language: Option<String>,
    pub pregnancy_status: Option<String>,
    pub rr_id: Option<String>,
    pub processing_status: Option<String>,
    pub eicr_version_number: Option<String>,
    pub authoring_date: Option<DateTime<Utc>>,
    pub authoring_provider: Option<String>,
    pub provider_id: Option<String>,
    pub facility_id: Option<String>,
    pub facility_name: Option<String>,
    pub encounter_type: Option<String>,
    pub encounter_start_date: Option<DateTime<Utc>>,
    pub encounter_end_date: Option<DateTime<Utc>>,
    pub reason_for_visit: Option<String>,
    pub active_problems: Option<String>,
    /// Server-assigned ingestion time.
    pub date_created: Option<DateTime<Utc>>,
}

/// Insert shape for [`ExtendedEcr`]; `date_created` is server-assigned.
#[derive(Debug, Clone, Default)]
#[allow(missing_docs)]
pub struct NewExtendedEcr {
    pub eicr_id: String,
    pub set_id: Option<String>,
    pub fhir_reference_link: Option<String>,
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
    pub birth_sex: Option<String>,
    pub gender_identity: Option<String>,
    pub race: Option<String>,
    pub ethnicity: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub homelessness_status: Option<String>,
    pub disabilities: Option<String>,
    pub tribal_affiliation: Option<String>,
    pub tribal_enrollment_status: Option<String>,
    pub current_job_title: Option<String>,
    pub current_job_industry: Option<String>,
    pub usual_occupation: Option<String>,
    pub usual_industry: Option<String>,
    pub preferred_language: Option<String>,
    pub pregnancy_status: Option<String>,
    pub rr_id: Option<String>,
    pub processing_status: Option<String>,
    pub eicr_version_number: Option<String>,
    pub authoring_date: Option<DateTime<Utc>>,
    pub authoring_provider: Option<String>,
    pub provider_id: Option<String>,
    pub facility_id: Option<String>,
    pub facility_name: Option<String>,
    pub encounter_type: Option<String>,
    pub encounter_start_date: Option<DateTime<Utc>>,
    pub encounter_end_date: Option<DateTime<Utc>>,
    pub reason_for_visit: Option<String>,
    pub active_problems: Option<String>,
}

/// Partial update / lookup criteria for [`ExtendedEcr`].
#[derive(Debug, Clone, Default)]
#[allow(missing_docs)]
pub struct ExtendedEcrPatch {
    pub eicr_id: Option<String>,
    pub set_id: Option<String>,
    pub fhir_reference_link: Option<String>,
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
    pub race: Option<String>,
    pub ethnicity: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub preferred_language: Option<String>,
    pub pregnancy_status: Option<String>,
    pub rr_id: Option<String>,
    pub processing_status: Option<String>,
    pub eicr_version_number: Option<String>,
    pub authoring_provider: Option<String>,
    pub provider_id: Option<String>,
    pub facility_id: Option<String>,
    pub facility_name: Option<String>,
    pub encounter_type: Option<String>,
    pub encounter_start_date: Option<DateTime<Utc>>,
    pub encounter_end_date: Option<DateTime<Utc>>,
    pub reason_for_visit: Option<String>,
    pub active_problems: Option<String>,
}

impl ExtendedEcr {
    pub(crate) fn from_row(row: &SqlRow) -> StoreResult<Self> {
        Ok(Self {
            eicr_id: row.require_text("eicr_id")?,
            set_id: row.get_text("set_id"),
            fhir_reference_link: row.get_text("fhir_reference_link"),
            last_name: row.get_text("last_name"),
            first_name: row.get_text("first_name"),
            birth_date: row.get_date("birth_date"),
            gender: row.get_text("gender"),
            birth_sex: row.get_text("birth_sex"),
            gender_identity: row.get_text("gender_identity"),
            race: row.get_text("race"),
            ethnicity: row.get_text("ethnicity"),
            latitude: row.get_f64("latitude"),
            longitude: row.get_f64("longitude"),
            homelessness_status: row.get_text("homelessness_status"),
            disabilities: row.get_text("disabilities"),
            tribal_affiliation: row.get_text("tribal_affiliation"),
            tribal_enrollment_status: row.get_text("tribal_enrollment_status"),
            current_job_title: row.get_text("current_job_title"),
            current_job_industry: row.get_text("current_job_industry"),
            usual_occupation: row.get_text("usual_occupation"),
            usual_industry: row.get_text("usual_industry"),
            preferred_language: row.get_text("preferred_language"),
            pregnancy_status: row.get_text("pregnancy_status"),
            rr_id: row.get_text("rr_id"),
            processing_status: row.get_text("processing_status"),
            eicr_version_number: row.get_text("eicr_version_number"),
            authoring_date: row.get_timestamp("authoring_date"),
            authoring_provider: row.get_text("authoring_provider"),
            provider_id: row.get_text("provider_id"),
            facility_id: row.get_text("facility_id"),
            facility_name: row.get_text("facility_name"),
            encounter_type: row.get_text("encounter_type"),
            encounter_start_date: row.get_timestamp("encounter_start_date"),
            encounter_end_date: row.get_timestamp("encounter_end_date"),
            reason_for_visit: row.get_text("reason_for_visit"),
            active_problems: row.get_text("active_problems"),
            date_created: row.get_timestamp("date_created"),
        })
    }
}

impl NewExtendedEcr {
    pub(crate) fn insert_pairs(&self) -> FieldPairs {
        vec![
            ("eicr_id", SqlValue::Text(self.eicr_id.clone())),
            ("set_id", text(&self.set_id)),
            ("fhir_reference_link", text(&self.fhir_reference_link)),
            ("last_name", text(&self.last_name)),
            ("first_name", text(&self.first_name)),
            ("birth_date", date(&self.birth_date)),
            ("gender", text(&self.gender)),
            ("birth_sex", text(&self.birth_sex)),
            ("gender_identity", text(&self.gender_identity)),
            ("race", text(&self.race)),
            ("ethnicity", text(&self.ethnicity)),
            ("latitude", float(&self.latitude)),
            ("longitude", float(&self.longitude)),
            ("homelessness_status", text(&self.homelessness_status)),
            ("disabilities", text(&self.disabilities)),
            ("tribal_affiliation", text(&self.tribal_affiliation)),
            (
                "tribal_enrollment_status",
                text(&self.tribal_enrollment_status),
            ),
            ("current_job_title", text(&self.current_job_title)),
            ("current_job_industry", text(&self.current_job_industry)),
            ("usual_occupation", text(&self.usual_occupation)),
            ("usual_industry", text(&self.usual_industry)),
            ("preferred_language", text(&self.preferred_language)),
            ("pregnancy_status", text(&self.pregnancy_status)),
            ("rr_id", text(&self.rr_id)),
            ("processing_status", text(&self.processing_status)),
            ("eicr_version_number", text(&self.eicr_version_number)),
            ("authoring_date", timestamp(&self.authoring_date)),
            ("authoring_provider", text(&self.authoring_provider)),
            ("provider_id", text(&self.provider_id)),
            ("facility_id", text(&self.facility_id)),
            ("facility_name", text(&self.facility_name)),
            ("encounter_type", text(&self.encounter_type)),
            ("encounter_start_date", timestamp(&self.encounter_start_date)),
            ("encounter_end_date", timestamp(&self.encounter_end_date)),
            ("reason_for_visit", text(&self.reason_for_visit)),
            ("active_problems", text(&self.active_problems)),
        ]
    }
}

impl ExtendedEcrPatch {
    pub(crate) fn pairs(&self) -> FieldPairs {
        let mut pairs = Vec::new();
        let mut push_text = |name: &'static str, value: &Option<String>| {
            if let Some(v) = value {
                pairs.push((name, SqlValue::Text(v.clone())));
            }
        };
        push_text("eicr_id", &self.eicr_id);
        push_text("set_id", &self.set_id);
        push_text("fhir_reference_link", &self.fhir_reference_link);
        push_text("last_name", &self.last_name);
        push_text("first_name", &self.first_name);
        push_text("gender", &self.gender);
        push_text("race", &self.race);
        push_text("ethnicity", &self.ethnicity);
        push_text("preferred_language", &self.preferred_language);
        push_text("pregnancy_status", &self.pregnancy_status);
        push_text("rr_id", &self.rr_id);
        push_text("processing_status", &self.processing_status);
        push_text("eicr_version_number", &self.eicr_version_number);
        push_text("authoring_provider", &self.authoring_provider);
        push_text("provider_id", &self.provider_id);
        push_text("facility_id", &self.facility_id);
        push_text("facility_name", &self.facility_name);
        push_text("encounter_type", &self.encounter_type);
        push_text("reason_for_visit", &self.reason_for_visit);
        push_text("active_problems", &self.active_problems);
        drop(push_text);
        if self.birth_date.is_some() {
            pairs.push(("birth_date", date(&self.birth_date)));
        }
        if self.latitude.is_some() {
            pairs.push(("latitude", float(&self.latitude)));
        }
        if self.longitude.is_some() {
            pairs.push(("longitude", float(&self.longitude)));
        }
        if self.encounter_start_date.is_some() {
            pairs.push(("encounter_start_date", timestamp(&self.encounter_start_date)));
        }
        if self.encounter_end_date.is_some() {
            pairs.push(("encounter_end_date", timestamp(&self.encounter_end_date)));
        }
        pairs
    }
}

/// A patient address attached to an extended record. `use` and `type` are
/// reserved words on SQL Server, hence the `address_` column prefixes.
#[derive(Debug, Clone, PartialEq, Default)]
#[allow(missing_docs)]
pub struct PatientAddress {
    pub uuid: String,
    pub address_use: Option<String>,
    pub address_type: Option<String>,
    pub text: Option<String>,
    pub line: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub eicr_id: Option<String>,
}

/// Insert shape for [`PatientAddress`]. A missing `uuid` is generated.
#[derive(Debug, Clone, Default)]
#[allow(missing_docs)]
pub struct NewPatientAddress {
    pub uuid: Option<String>,
    pub address_use: Option<String>,
    pub address_type: Option<String>,
    pub text: Option<String>,
    pub line: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub eicr_id: Option<String>,
}

/// Partial update / lookup criteria for [`PatientAddress`].
#[derive(Debug, Clone, Default)]
#[allow(missing_docs)]
pub struct PatientAddressPatch {
    pub address_use: Option<String>,
    pub address_type: Option<String>,
    pub text: Option<String>,
    pub line: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub eicr_id: Option<String>,
}

impl PatientAddress {
    pub(crate) fn from_row(row: &SqlRow) -> StoreResult<Self> {
        Ok(Self {
            uuid: row.require_text("uuid")?,
            address_use: row.get_text("address_use"),
            address_type: row.get_text("address_type"),
            text: row.get_text("text"),
            line: row.get_text("line"),
            city: row.get_text("city"),
            district: row.get_text("district"),
            state: row.get_text("state"),
            postal_code: row.get_text("postal_code"),
            country: row.get_text("country"),
            period_start: row.get_timestamp("period_start"),
            period_end: row.get_timestamp("period_end"),
            eicr_id: row.get_text("eicr_id"),
        })
    }
}

impl NewPatientAddress {
    pub(crate) fn insert_pairs(&self, uuid: &str) -> FieldPairs {
        vec![
            ("uuid", SqlValue::Text(uuid.to_string())),
            ("address_use", text(&self.address_use)),
            ("address_type", text(&self.address_type)),
            ("text", text(&self.text)),
            ("line", text(&self.line)),
            ("city", text(&self.city)),
            ("district", text(&self.district)),
            ("state", text(&self.state)),
            ("postal_code", text(&self.postal_code)),
            ("country", text(&self.country)),
            ("period_start", timestamp(&self.period_start)),
            ("period_end", timestamp(&self.period_end)),
            ("eicr_id", text(&self.eicr_id)),
        ]
    }
}

impl PatientAddressPatch {
    pub(crate) fn pairs(&self) -> FieldPairs {
        let mut pairs = Vec::new();
        let mut push_text = |name: &'static str, value: &Option<String>| {
            if let Some(v) = value {
                pairs.push((name, SqlValue::Text(v.clone())));
            }
        };
        push_text("address_use", &self.address_use);
        push_text("address_type", &self.address_type);
        push_text("text", &self.text);
        push_text("line", &self.line);
        push_text("city", &self.city);
        push_text("district", &self.district);
        push_text("state", &self.state);
        push_text("postal_code", &self.postal_code);
        push_text("country", &self.country);
        push_text("eicr_id", &self.eicr_id);
        drop(push_text);
        if self.period_start.is_some() {
            pairs.push(("period_start", timestamp(&self.period_start)));
        }
        if self.period_end.is_some() {
            pairs.push(("period_end", timestamp(&self.period_end)));
        }
        pairs
    }
}

/// A lab result attached to an extended record. Keyed by (uuid, eicr_id).
#[derive(Debug, Clone, PartialEq, Default)]
#[allow(missing_docs)]
pub struct EcrLab {
    pub uuid: String,
    pub eicr_id: String,
    pub test_type: Option<String>,
    pub test_type_code: Option<String>,
    pub test_type_system: Option<String>,
    pub test_result_qualitative: Option<String>,
    pub test_result_quantitative: Option<f64>,
    pub test_result_units: Option<String>,
    pub test_result_code: Option<String>,
    pub test_result_code_display: Option<String>,
    pub test_result_code_system: Option<String>,
    pub test_result_interpretation: Option<String>,
    pub test_result_interpretation_code: Option<String>,
    pub test_result_interpretation_system: Option<String>,
    pub test_result_reference_range_low_value: Option<f64>,
    pub test_result_reference_range_low_units: Option<String>,
    pub test_result_reference_range_high_value: Option<f64>,
    pub test_result_reference_range_high_units: Option<String>,
    pub specimen_type: Option<String>,
    pub specimen_collection_date: Option<DateTime<Utc>>,
    pub performing_lab: Option<String>,
}

/// Insert shape for [`EcrLab`]. A missing `uuid` is generated; `eicr_id`
/// is always caller-supplied.
#[derive(Debug, Clone, Default)]
#[allow(missing_docs)]
pub struct NewEcrLab {
    pub uuid: Option<String>,
    pub eicr_id: String,
    pub test_type: Option<String>,
    pub test_type_code: Option<String>,
    pub test_type_system: Option<String>,
    pub test_result_qualitative: Option<String>,
    pub test_result_quantitative: Option<f64>,
    pub test_result_units: Option<String>,
    pub test_result_code: Option<String>,
    pub test_result_code_display: Option<String>,
    pub test_result_code_system: Option<String>,
    pub test_result_interpretation: Option<String>,
    pub test_result_interpretation_code: Option<String>,
    pub test_result_interpretation_system: Option<String>,
    pub test_result_reference_range_low_value: Option<f64>,
    pub test_result_reference_range_low_units: Option<String>,
    pub test_result_reference_range_high_value: Option<f64>,
    pub test_result_reference_range_high_units: Option<String>,
    pub specimen_type: Option<String>,
    pub specimen_collection_date: Option<DateTime<Utc>>,
    pub performing_lab: Option<String>,
}

/// Partial update / lookup criteria for [`EcrLab`].
#[derive(Debug, Clone, Default)]
#[allow(missing_docs)]
pub struct EcrLabPatch {
    pub eicr_id: Option<String>,
    pub test_type: Option<String>,
    pub test_type_code: Option<String>,
    pub test_result_qualitative: Option<String>,
    pub test_result_quantitative: Option<f64>,
    pub test_result_units: Option<String>,
    pub test_result_interpretation: Option<String>,
    pub specimen_type: Option<String>,
    pub specimen_collection_date: Option<DateTime<Utc>>,
    pub performing_lab: Option<String>,
}

impl EcrLab {
    pub(crate) fn from_row(row: &SqlRow) -> StoreResult<Self> {
        Ok(Self {
            uuid: row.require_text("uuid")?,
            eicr_id: row.require_text("eicr_id")?,
            test_type: row.get_text("test_type"),
            test_type_code: row.get_text("test_type_code"),
            test_type_system: row.get_text("test_type_system"),
            test_result_qualitative: row.get_text("test_result_qualitative"),
            test_result_quantitative: row.get_f64("test_result_quantitative"),
            test_result_units: row.get_text("test_result_units"),
            test_result_code: row.get_text("test_result_code"),
            test_result_code_display: row.get_text("test_result_code_display"),
            test_result_code_system: row.get_text("test_result_code_system"),
            test_result_interpretation: row.get_text("test_result_interpretation"),
            test_result_interpretation_code: row.get_text("test_result_interpretation_code"),
            test_result_interpretation_system: row
                .get_text("test_result_interpretation_system"),
            test_result_reference_range_low_value: row
                .get_f64("test_result_reference_range_low_value"),
            test_result_reference_range_low_units: row
                .get_text("test_result_reference_range_low_units"),
            test_result_reference_range_high_value: row
                .get_f64("test_result_reference_range_high_value"),
            test_result_reference_range_high_units: row
                .get_text("test_result_reference_range_high_units"),
            specimen_type: row.get_text("specimen_type"),
            specimen_collection_date: row.get_timestamp("specimen_collection_date"),
            performing_lab: row.get_text("performing_lab"),
        })
    }
}

impl NewEcrLab {
    pub(crate) fn insert_pairs(&self, uuid: &str) -> FieldPairs {
        vec![
            ("uuid", SqlValue::Text(uuid.to_string())),
            ("eicr_id", SqlValue::Text(self.eicr_id.clone())),
            ("test_type", text(&self.test_type)),
            ("test_type_code", text(&self.test_type_code)),
            ("test_type_system", text(&self.test_type_system)),
            ("test_result_qualitative", text(&self.test_result_qualitative)),
            (
                "test_result_quantitative",
                float(&self.test_result_quantitative),
            ),
            ("test_result_units", text(&self.test_result_units)),
            ("test_result_code", text(&self.test_result_code)),
            ("test_result_code_display", text(&self.test_result_code_display)),
            ("test_result_code_system", text(&self.test_result_code_system)),
            (
                "test_result_interpretation",
                text(&self.test_result_interpretation),
            ),
            (
                "test_result_interpretation_code",
                text(&self.test_result_interpretation_code),
            ),
            (
                "test_result_interpretation_system",
                text(&self.test_result_interpretation_system),
            ),
            (
                "test_result_reference_range_low_value",
                float(&self.test_result_reference_range_low_value),
            ),
            (
                "test_result_reference_range_low_units",
                text(&self.test_result_reference_range_low_units),
            ),
            (
                "test_result_reference_range_high_value",
                float(&self.test_result_reference_range_high_value),
            ),
            (
                "test_result_reference_range_high_units",
                text(&self.test_result_reference_range_high_units),
            ),
            ("specimen_type", text(&self.specimen_type)),
            (
                "specimen_collection_date",
                timestamp(&self.specimen_collection_date),
            ),
            ("performing_lab", text(&self.performing_lab)),
        ]
    }
}

impl EcrLabPatch {
    pub(crate) fn pairs(&self) -> FieldPairs {
        let mut pairs = Vec::new();
        let mut push_text = |name: &'static str, value: &Option<String>| {
            if let Some(v) = value {
                pairs.push((name, SqlValue::Text(v.clone())));
            }
        };
        push_text("eicr_id", &self.eicr_id);
        push_text("test_type", &self.test_type);
        push_text("test_type_code", &self.test_type_code);
        push_text("test_result_qualitative", &self.test_result_qualitative);
        push_text("test_result_units", &self.test_result_units);
        push_text("test_result_interpretation", &self.test_result_interpretation);
        push_text("specimen_type", &self.specimen_type);
        push_text("performing_lab", &self.performing_lab);
        drop(push_text);
        if self.test_result_quantitative.is_some() {
            pairs.push((
                "test_result_quantitative",
                float(&self.test_result_quantitative),
            ));
        }
        if self.specimen_collection_date.is_some() {
            pairs.push((
                "specimen_collection_date",
                timestamp(&self.specimen_collection_date),
            ));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_numeric_columns_to_f64() {
        let row = SqlRow::from_pairs(vec![
            ("uuid".to_string(), SqlValue::Text("u1".to_string())),
            ("eicr_id".to_string(), SqlValue::Text("e1".to_string())),
            (
                "test_result_quantitative".to_string(),
                SqlValue::Float(6.7),
            ),
            (
                "test_result_reference_range_high_value".to_string(),
                SqlValue::Int(10),
            ),
        ]);
        let lab = EcrLab::from_row(&row).unwrap();
        assert_eq!(lab.test_result_quantitative, Some(6.7));
        assert_eq!(lab.test_result_reference_range_high_value, Some(10.0));
        assert_eq!(lab.test_result_reference_range_low_value, None);
    }

    #[test]
    fn extended_insert_pairs_exclude_the_server_default() {
        let new = NewExtendedEcr {
            eicr_id: "e1".to_string(),
            first_name: Some("Billy".to_string()),
            last_name: Some("Bob".to_string()),
            ..Default::default()
        };
        let pairs = new.insert_pairs();
        assert!(pairs.iter().all(|(name, _)| *name != "date_created"));
        assert_eq!(pairs.len(), 36);
    }

    #[test]
    fn patch_pairs_only_carry_set_fields() {
        let patch = ExtendedEcrPatch {
            processing_status: Some("processed".to_string()),
            latitude: Some(41.88),
            ..Default::default()
        };
        let pairs = patch.pairs();
        assert_eq!(pairs.len(), 2);
    }
}
