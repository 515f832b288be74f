//! Entity types for both schema variants.
//!
//! Each entity comes in three shapes: the persisted row, a `New*` insert
//! shape (no server-generated columns), and a `*Patch` of optional fields
//! that serves both partial updates and lookup criteria. A patch field set
//! to `None` is skipped, so patches cannot null out a stored value.

pub mod core;
pub mod extended;

use chrono::{DateTime, NaiveDate, Utc};

use crate::dialect::SqlValue;
use crate::error::{InvalidArgumentError, StoreResult};

/// Named column values, ready for literal rendering.
pub(crate) type FieldPairs = Vec<(&'static str, SqlValue)>;

pub(crate) fn text(value: &Option<String>) -> SqlValue {
    value.clone().map_or(SqlValue::Null, SqlValue::Text)
}

pub(crate) fn date(value: &Option<NaiveDate>) -> SqlValue {
    value.map_or(SqlValue::Null, SqlValue::Date)
}

pub(crate) fn timestamp(value: &Option<DateTime<Utc>>) -> SqlValue {
    value.map_or(SqlValue::Null, SqlValue::Timestamp)
}

pub(crate) fn float(value: &Option<f64>) -> SqlValue {
    value.map_or(SqlValue::Null, SqlValue::Float)
}

/// An inclusive creation-date window for listing and counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRangePeriod {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateRangePeriod {
    /// Builds a range, rejecting one that ends before it starts.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<Self> {
        if start > end {
            return Err(InvalidArgumentError::MalformedDateRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            }
            .into());
        }
        Ok(Self { start, end })
    }

    /// Inclusive lower bound.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Inclusive upper bound.
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }
}

/// A reportable condition attached to a record. Shared by both schema
/// variants; the tables are identical.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Primary key.
    pub uuid: String,
    /// Owning record.
    pub eicr_id: String,
    /// Condition display name.
    pub condition: Option<String>,
}

/// Insert shape for [`Condition`]. A missing `uuid` is generated.
#[derive(Debug, Clone, Default)]
pub struct NewCondition {
    /// Primary key; generated when absent.
    pub uuid: Option<String>,
    /// Owning record.
    pub eicr_id: String,
    /// Condition display name.
    pub condition: Option<String>,
}

/// Partial update / lookup criteria for [`Condition`].
#[derive(Debug, Clone, Default)]
pub struct ConditionPatch {
    /// Owning record.
    pub eicr_id: Option<String>,
    /// Condition display name.
    pub condition: Option<String>,
}

impl Condition {
    pub(crate) fn from_row(row: &crate::dialect::SqlRow) -> StoreResult<Self> {
        Ok(Self {
            uuid: row.require_text("uuid")?,
            eicr_id: row.require_text("eicr_id")?,
            condition: row.get_text("condition"),
        })
    }
}

impl NewCondition {
    pub(crate) fn insert_pairs(&self, uuid: &str) -> FieldPairs {
        vec![
            ("uuid", SqlValue::Text(uuid.to_string())),
            ("eicr_id", SqlValue::Text(self.eicr_id.clone())),
            ("condition", text(&self.condition)),
        ]
    }
}

impl ConditionPatch {
    pub(crate) fn pairs(&self) -> FieldPairs {
        let mut pairs = Vec::new();
        if let Some(eicr_id) = &self.eicr_id {
            pairs.push(("eicr_id", SqlValue::Text(eicr_id.clone())));
        }
        if let Some(condition) = &self.condition {
            pairs.push(("condition", SqlValue::Text(condition.clone())));
        }
        pairs
    }
}

/// A reportability rule summary attached to a condition.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSummary {
    /// Primary key.
    pub uuid: String,
    /// Owning condition.
    pub ecr_rr_conditions_id: Option<String>,
    /// Rule summary text.
    pub rule_summary: Option<String>,
}

/// Insert shape for [`RuleSummary`]. A missing `uuid` is generated.
#[derive(Debug, Clone, Default)]
pub struct NewRuleSummary {
    /// Primary key; generated when absent.
    pub uuid: Option<String>,
    /// Owning condition.
    pub ecr_rr_conditions_id: Option<String>,
    /// Rule summary text.
    pub rule_summary: Option<String>,
}

/// Partial update / lookup criteria for [`RuleSummary`].
#[derive(Debug, Clone, Default)]
pub struct RuleSummaryPatch {
    /// Owning condition.
    pub ecr_rr_conditions_id: Option<String>,
    /// Rule summary text.
    pub rule_summary: Option<String>,
}

impl RuleSummary {
    pub(crate) fn from_row(row: &crate::dialect::SqlRow) -> StoreResult<Self> {
        Ok(Self {
            uuid: row.require_text("uuid")?,
            ecr_rr_conditions_id: row.get_text("ecr_rr_conditions_id"),
            rule_summary: row.get_text("rule_summary"),
        })
    }
}

impl NewRuleSummary {
    pub(crate) fn insert_pairs(&self, uuid: &str) -> FieldPairs {
        vec![
            ("uuid", SqlValue::Text(uuid.to_string())),
            ("ecr_rr_conditions_id", text(&self.ecr_rr_conditions_id)),
            ("rule_summary", text(&self.rule_summary)),
        ]
    }
}

impl RuleSummaryPatch {
    pub(crate) fn pairs(&self) -> FieldPairs {
        let mut pairs = Vec::new();
        if let Some(id) = &self.ecr_rr_conditions_id {
            pairs.push(("ecr_rr_conditions_id", SqlValue::Text(id.clone())));
        }
        if let Some(summary) = &self.rule_summary {
            pairs.push(("rule_summary", SqlValue::Text(summary.clone())));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn date_range_accepts_ordered_bounds() {
        let start = Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        let range = DateRangePeriod::new(start, end).unwrap();
        assert_eq!(range.start(), start);
        assert_eq!(range.end(), end);
    }

    #[test]
    fn date_range_accepts_equal_bounds() {
        let at = Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap();
        assert!(DateRangePeriod::new(at, at).is_ok());
    }

    #[test]
    fn date_range_rejects_inverted_bounds() {
        let start = Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap();
        let err = DateRangePeriod::new(start, end).unwrap_err();
        assert!(matches!(
            err,
            crate::error::StoreError::InvalidArgument(
                InvalidArgumentError::MalformedDateRange { .. }
            )
        ));
    }

    #[test]
    fn patch_pairs_skip_unset_fields() {
        let patch = ConditionPatch {
            condition: Some("Influenza".to_string()),
            ..Default::default()
        };
        let pairs = patch.pairs();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, "condition");
    }
}
