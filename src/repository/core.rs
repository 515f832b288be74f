//! Repository for the core schema variant.

use std::sync::Arc;

use tracing::error;
use uuid::Uuid;

use crate::db::Database;
use crate::dialect::{DbConnection, SqlValue};
use crate::error::{PersistenceError, StoreResult};
use crate::model::core::{CoreEcr, CoreEcrPatch, NewCoreEcr};
use crate::model::{
    Condition, ConditionPatch, NewCondition, NewRuleSummary, RuleSummary, RuleSummaryPatch,
};

use super::{
    ConditionBundle, delete_returning, eq, insert_returning, insert_returning_on,
    render_where, require_criteria, select_all, select_one, update_where,
};

/// CRUD access to `ecr_data`, `ecr_rr_conditions`, and
/// `ecr_rr_rule_summaries` in the core layout.
pub struct CoreRepository {
    db: Arc<Database>,
}

impl CoreRepository {
    /// Binds the repository to an open database handle.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn id_clause(&self, column: &str, id: &str) -> String {
        eq(
            self.db.dialect(),
            column,
            &SqlValue::Text(id.to_string()),
        )
    }

    /// Looks a record up by primary key.
    pub async fn find_ecr_by_id(&self, eicr_id: &str) -> StoreResult<Option<CoreEcr>> {
        select_one(
            &self.db,
            "ecr_data",
            &self.id_clause("eicr_id", eicr_id),
            CoreEcr::from_row,
        )
        .await
    }

    /// Returns every record matching the criteria. An empty criteria object
    /// matches everything; an absent one is a caller error.
    pub async fn find_ecrs_by_criteria(
        &self,
        criteria: Option<&CoreEcrPatch>,
    ) -> StoreResult<Vec<CoreEcr>> {
        let criteria = require_criteria("ecr_data", criteria)?;
        let clause = render_where(self.db.dialect(), &criteria.pairs());
        select_all(&self.db, "ecr_data", &clause, CoreEcr::from_row).await
    }

    /// Inserts a record and returns it as persisted, including the
    /// server-assigned `date_created`.
    pub async fn create_ecr(&self, new: &NewCoreEcr) -> StoreResult<CoreEcr> {
        insert_returning(&self.db, "ecr_data", &new.insert_pairs(), CoreEcr::from_row).await
    }

    /// Applies the set fields of `patch` and returns the updated row.
    pub async fn update_ecr(
        &self,
        eicr_id: &str,
        patch: &CoreEcrPatch,
    ) -> StoreResult<Option<CoreEcr>> {
        let clause = self.id_clause("eicr_id", eicr_id);
        update_where(&self.db, "ecr_data", &patch.pairs(), &clause).await?;
        self.find_ecr_by_id(eicr_id).await
    }

    /// Removes a record, returning it; `Ok(None)` when it never existed.
    pub async fn delete_ecr(&self, eicr_id: &str) -> StoreResult<Option<CoreEcr>> {
        delete_returning(
            &self.db,
            "ecr_data",
            &self.id_clause("eicr_id", eicr_id),
            CoreEcr::from_row,
        )
        .await
    }

    /// Looks a condition up by primary key.
    pub async fn find_condition_by_id(&self, uuid: &str) -> StoreResult<Option<Condition>> {
        select_one(
            &self.db,
            "ecr_rr_conditions",
            &self.id_clause("uuid", uuid),
            Condition::from_row,
        )
        .await
    }

    /// Returns every condition matching the criteria.
    pub async fn find_conditions_by_criteria(
        &self,
        criteria: Option<&ConditionPatch>,
    ) -> StoreResult<Vec<Condition>> {
        let criteria = require_criteria("ecr_rr_conditions", criteria)?;
        let clause = render_where(self.db.dialect(), &criteria.pairs());
        select_all(&self.db, "ecr_rr_conditions", &clause, Condition::from_row).await
    }

    /// Inserts a condition, generating its key when absent.
    pub async fn create_condition(&self, new: &NewCondition) -> StoreResult<Condition> {
        let uuid = new
            .uuid
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        insert_returning(
            &self.db,
            "ecr_rr_conditions",
            &new.insert_pairs(&uuid),
            Condition::from_row,
        )
        .await
    }

    /// Applies the set fields of `patch` and returns the updated row.
    pub async fn update_condition(
        &self,
        uuid: &str,
        patch: &ConditionPatch,
    ) -> StoreResult<Option<Condition>> {
        let clause = self.id_clause("uuid", uuid);
        update_where(&self.db, "ecr_rr_conditions", &patch.pairs(), &clause).await?;
        self.find_condition_by_id(uuid).await
    }

    /// Removes a condition, returning it; `Ok(None)` when it never existed.
    pub async fn delete_condition(&self, uuid: &str) -> StoreResult<Option<Condition>> {
        delete_returning(
            &self.db,
            "ecr_rr_conditions",
            &self.id_clause("uuid", uuid),
            Condition::from_row,
        )
        .await
    }

    /// Looks a rule summary up by primary key.
    pub async fn find_rule_summary_by_id(
        &self,
        uuid: &str,
    ) -> StoreResult<Option<RuleSummary>> {
        select_one(
            &self.db,
            "ecr_rr_rule_summaries",
            &self.id_clause("uuid", uuid),
            RuleSummary::from_row,
        )
        .await
    }

    /// Returns every rule summary matching the criteria.
    pub async fn find_rule_summaries_by_criteria(
        &self,
        criteria: Option<&RuleSummaryPatch>,
    ) -> StoreResult<Vec<RuleSummary>> {
        let criteria = require_criteria("ecr_rr_rule_summaries", criteria)?;
        let clause = render_where(self.db.dialect(), &criteria.pairs());
        select_all(
            &self.db,
            "ecr_rr_rule_summaries",
            &clause,
            RuleSummary::from_row,
        )
        .await
    }

    /// Inserts a rule summary, generating its key when absent.
    pub async fn create_rule_summary(&self, new: &NewRuleSummary) -> StoreResult<RuleSummary> {
        let uuid = new
            .uuid
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        insert_returning(
            &self.db,
            "ecr_rr_rule_summaries",
            &new.insert_pairs(&uuid),
            RuleSummary::from_row,
        )
        .await
    }

    /// Applies the set fields of `patch` and returns the updated row.
    pub async fn update_rule_summary(
        &self,
        uuid: &str,
        patch: &RuleSummaryPatch,
    ) -> StoreResult<Option<RuleSummary>> {
        let clause = self.id_clause("uuid", uuid);
        update_where(&self.db, "ecr_rr_rule_summaries", &patch.pairs(), &clause).await?;
        self.find_rule_summary_by_id(uuid).await
    }

    /// Removes a rule summary, returning it; `Ok(None)` when it never
    /// existed.
    pub async fn delete_rule_summary(&self, uuid: &str) -> StoreResult<Option<RuleSummary>> {
        delete_returning(
            &self.db,
            "ecr_rr_rule_summaries",
            &self.id_clause("uuid", uuid),
            RuleSummary::from_row,
        )
        .await
    }

    /// Saves a record with its conditions and rule summaries in one
    /// transaction. Any failure rolls the whole bundle back.
    pub async fn save_ecr_bundle(
        &self,
        record: &NewCoreEcr,
        conditions: &[ConditionBundle],
    ) -> StoreResult<CoreEcr> {
        let mut conn = self.db.connection().await?;
        conn.begin().await?;
        match save_bundle_on(&mut conn, record, conditions).await {
            Ok(ecr) => {
                conn.commit().await?;
                Ok(ecr)
            }
            Err(e) => {
                if let Err(rb) = conn.rollback().await {
                    error!(error = %rb, "rollback failed after bundle save error");
                }
                Err(PersistenceError::TransactionFailed {
                    message: e.to_string(),
                }
                .into())
            }
        }
    }
}

async fn save_bundle_on(
    conn: &mut DbConnection,
    record: &NewCoreEcr,
    conditions: &[ConditionBundle],
) -> StoreResult<CoreEcr> {
    let ecr = insert_returning_on(conn, "ecr_data", &record.insert_pairs(), CoreEcr::from_row)
        .await?;
    for bundle in conditions {
        let condition_id = Uuid::new_v4().to_string();
        let new_condition = NewCondition {
            uuid: Some(condition_id.clone()),
            eicr_id: ecr.eicr_id.clone(),
            condition: bundle.condition.clone(),
        };
        insert_returning_on(
            conn,
            "ecr_rr_conditions",
            &new_condition.insert_pairs(&condition_id),
            Condition::from_row,
        )
        .await?;
        for summary in &bundle.rule_summaries {
            let summary_id = Uuid::new_v4().to_string();
            let new_summary = NewRuleSummary {
                uuid: Some(summary_id.clone()),
                ecr_rr_conditions_id: Some(condition_id.clone()),
                rule_summary: Some(summary.clone()),
            };
            insert_returning_on(
                conn,
                "ecr_rr_rule_summaries",
                &new_summary.insert_pairs(&summary_id),
                RuleSummary::from_row,
            )
            .await?;
        }
    }
    Ok(ecr)
}
