//! Plan migration service - guarantees every user owns exactly one valid plan
//!
//! Runs once per session start. Repairs an existing plan in place, or
//! creates one and then adopts the user's legacy data into it: meals that
//! predate plans (no `planId`) and the old per-owner `sharedMeals` record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::domain::meal::fields as meal_fields;
use crate::domain::plan::fields as plan_fields;
use crate::domain::result::{Error, Result};
use crate::domain::{Plan, User, LEGACY_SHARED_MEALS_COLLECTION, MEALS_COLLECTION, PLANS_COLLECTION};
use crate::ports::{Document, DocumentStore, Filter, StoredDocument};
use crate::services::normalizer;

/// Owner field of legacy `sharedMeals` records
const LEGACY_OWNER_ID: &str = "ownerId";

/// What `ensure_plan` had to do to reach a valid plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    /// Plan was already canonical
    Existing,
    /// Plan was valid but stored in a non-canonical shape; rewritten
    Normalized,
    /// Plan was missing required fields; rebuilt from what was recoverable
    Rebuilt,
    /// No plan existed; created and legacy data adopted
    Created,
}

/// A single non-fatal step failure
#[derive(Debug, Clone, Serialize)]
pub struct MigrationFailure {
    /// `collection/id` of the record that could not be migrated
    pub target: String,
    pub error: String,
}

/// Outcome of `ensure_plan`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsuredPlan {
    pub plan: Plan,
    pub action: PlanAction,
    pub meals_migrated: usize,
    pub shares_migrated: usize,
    pub failures: Vec<MigrationFailure>,
}

impl EnsuredPlan {
    fn new(plan: Plan, action: PlanAction) -> Self {
        Self {
            plan,
            action,
            meals_migrated: 0,
            shares_migrated: 0,
            failures: Vec::new(),
        }
    }
}

/// Plan migration service
pub struct PlanMigrationService {
    store: Arc<dyn DocumentStore>,
}

impl PlanMigrationService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Bring `user` to the state "owns exactly one structurally valid plan"
    ///
    /// Idempotent: a second call finds the plan created by the first and
    /// leaves it (and the already-adopted meals) alone. Step failures are
    /// collected in the result; only a failed final verification is fatal.
    pub async fn ensure_plan(&self, user: &User) -> Result<EnsuredPlan> {
        tracing::info!(user_id = %user.id, "ensuring plan");

        let mut owned = self.find_owned_plans(user).await?;
        if owned.len() > 1 {
            tracing::warn!(
                user_id = %user.id,
                count = owned.len(),
                "user owns more than one plan, using the oldest"
            );
        }

        let mut report = if owned.is_empty() {
            self.create_plan(user).await?
        } else {
            let raw = owned.swap_remove(0);
            self.repair_plan(user, raw).await?
        };

        report.plan = self.verify(&report.plan.id).await?;
        tracing::info!(
            user_id = %user.id,
            plan_id = %report.plan.id,
            action = ?report.action,
            meals_migrated = report.meals_migrated,
            failures = report.failures.len(),
            "plan ready"
        );
        Ok(report)
    }

    /// Every stored plan owned by `user`, oldest first
    ///
    /// Includes legacy plans that carry `userId` but no `ownerUserId`.
    pub async fn find_owned_plans(&self, user: &User) -> Result<Vec<StoredDocument>> {
        let mut owned = self
            .store
            .query(
                PLANS_COLLECTION,
                &[Filter::eq(plan_fields::OWNER_USER_ID, user.id.as_str())],
            )
            .await?;
        let legacy = self
            .store
            .query(
                PLANS_COLLECTION,
                &[
                    Filter::eq(plan_fields::LEGACY_USER_ID, user.id.as_str()),
                    Filter::missing(plan_fields::OWNER_USER_ID),
                ],
            )
            .await?;
        owned.extend(legacy);
        Ok(owned)
    }

    /// Point every meal of `user` that has no plan at `plan_id`
    ///
    /// Updates run concurrently; one failing does not stop the others.
    /// Returns the number adopted and the failures.
    pub async fn adopt_orphan_meals(
        &self,
        user: &User,
        plan_id: &str,
    ) -> Result<(usize, Vec<MigrationFailure>)> {
        let orphans = self.find_orphan_meals(user).await?;
        if orphans.is_empty() {
            return Ok((0, Vec::new()));
        }
        tracing::info!(user_id = %user.id, plan_id, count = orphans.len(), "adopting orphaned meals");

        let updates = orphans.iter().map(|meal| async move {
            let mut fields = Document::new();
            fields.insert(
                meal_fields::PLAN_ID.into(),
                JsonValue::String(plan_id.to_string()),
            );
            let result = self.store.update(MEALS_COLLECTION, &meal.id, fields).await;
            (meal.id.as_str(), result)
        });

        let mut adopted = 0;
        let mut failures = Vec::new();
        for (meal_id, result) in join_all(updates).await {
            match result {
                Ok(()) => adopted += 1,
                Err(e) => {
                    tracing::warn!(meal_id, error = %e, "failed to migrate meal");
                    failures.push(MigrationFailure {
                        target: format!("{}/{}", MEALS_COLLECTION, meal_id),
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok((adopted, failures))
    }

    /// Meals created by `user` that belong to no plan
    pub async fn find_orphan_meals(&self, user: &User) -> Result<Vec<StoredDocument>> {
        self.store
            .query(
                MEALS_COLLECTION,
                &[
                    Filter::eq(meal_fields::USER_ID, user.id.as_str()),
                    Filter::missing(meal_fields::PLAN_ID),
                ],
            )
            .await
    }

    /// The legacy sharing record of `user`, if one exists
    pub async fn find_legacy_share(&self, user: &User) -> Result<Option<StoredDocument>> {
        let records = self
            .store
            .query(
                LEGACY_SHARED_MEALS_COLLECTION,
                &[Filter::eq(LEGACY_OWNER_ID, user.id.as_str())],
            )
            .await?;
        Ok(records.into_iter().next())
    }

    async fn repair_plan(&self, user: &User, raw: StoredDocument) -> Result<EnsuredPlan> {
        match normalizer::normalize_plan(&raw) {
            Ok(plan) if normalizer::plan_needs_rewrite(&raw, &plan) => {
                tracing::info!(plan_id = %plan.id, "rewriting plan in canonical shape");
                self.store
                    .update(PLANS_COLLECTION, &plan.id, plan.to_fields())
                    .await?;
                Ok(EnsuredPlan::new(plan, PlanAction::Normalized))
            }
            Ok(plan) => Ok(EnsuredPlan::new(plan, PlanAction::Existing)),
            Err(e) => {
                tracing::warn!(plan_id = %raw.id, error = %e, "plan invalid, rebuilding");
                let plan = normalizer::rebuild_plan(&raw, user, Utc::now());
                self.store
                    .update(PLANS_COLLECTION, &plan.id, plan.to_fields())
                    .await?;
                Ok(EnsuredPlan::new(plan, PlanAction::Rebuilt))
            }
        }
    }

    async fn create_plan(&self, user: &User) -> Result<EnsuredPlan> {
        let mut plan = Plan::for_owner(user, now_millis());
        plan.id = self
            .store
            .insert(PLANS_COLLECTION, plan.to_fields())
            .await?;
        tracing::info!(user_id = %user.id, plan_id = %plan.id, "created plan");

        let mut report = EnsuredPlan::new(plan, PlanAction::Created);

        match self.adopt_orphan_meals(user, &report.plan.id).await {
            Ok((adopted, failures)) => {
                report.meals_migrated = adopted;
                report.failures.extend(failures);
            }
            Err(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "failed to look up orphaned meals");
                report.failures.push(MigrationFailure {
                    target: MEALS_COLLECTION.to_string(),
                    error: e.to_string(),
                });
            }
        }

        match self.migrate_legacy_share(user, &mut report.plan).await {
            Ok(count) => report.shares_migrated = count,
            Err(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "failed to migrate legacy sharing");
                report.failures.push(MigrationFailure {
                    target: LEGACY_SHARED_MEALS_COLLECTION.to_string(),
                    error: e.to_string(),
                });
            }
        }

        Ok(report)
    }

    /// Copy the collaborator list of the legacy record onto `plan`
    async fn migrate_legacy_share(&self, user: &User, plan: &mut Plan) -> Result<usize> {
        let Some(record) = self.find_legacy_share(user).await? else {
            tracing::debug!(user_id = %user.id, "no legacy sharing to migrate");
            return Ok(0);
        };

        let mut shared_with = record
            .get(plan_fields::SHARED_WITH)
            .and_then(|v| normalizer::coerce_shared_with(v).ok())
            .unwrap_or_default();
        shared_with.remove(&plan.owner_email);
        if shared_with.is_empty() {
            return Ok(0);
        }

        let mut fields = Document::new();
        fields.insert(plan_fields::SHARED_WITH.into(), shared_with.to_value());
        self.store
            .update(PLANS_COLLECTION, &plan.id, fields)
            .await?;

        let count = shared_with.len();
        plan.shared_with = shared_with;
        tracing::info!(plan_id = %plan.id, count, "migrated legacy sharing");
        Ok(count)
    }

    /// Re-read the plan and require the canonical shape
    async fn verify(&self, plan_id: &str) -> Result<Plan> {
        let raw = self
            .store
            .get_by_id(PLANS_COLLECTION, plan_id)
            .await?
            .ok_or_else(|| {
                tracing::error!(plan_id, "plan missing after migration");
                Error::migration(format!("plan {} missing after migration", plan_id))
            })?;

        let plan = normalizer::normalize_plan(&raw).map_err(|e| {
            tracing::error!(plan_id, error = %e, "plan still invalid after migration");
            Error::migration(format!("plan {} still invalid: {}", plan_id, e))
        })?;
        if normalizer::plan_needs_rewrite(&raw, &plan) {
            tracing::error!(plan_id, "plan not canonical after migration");
            return Err(Error::migration(format!(
                "plan {} is not in canonical shape after migration",
                plan_id
            )));
        }
        Ok(plan)
    }
}

fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryDocumentStore;
    use serde_json::json;

    fn doc(value: JsonValue) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn setup() -> (Arc<MemoryDocumentStore>, PlanMigrationService) {
        let store = Arc::new(MemoryDocumentStore::new());
        let service = PlanMigrationService::new(store.clone());
        (store, service)
    }

    fn user() -> User {
        User::new("u1", "owner@x.com")
    }

    #[tokio::test]
    async fn test_creates_plan_for_new_user() {
        let (store, service) = setup();
        let ensured = service.ensure_plan(&user()).await.unwrap();

        assert_eq!(ensured.action, PlanAction::Created);
        assert_eq!(ensured.plan.owner_user_id, "u1");
        assert_eq!(ensured.plan.name, "owner@x.com's plan");
        assert!(ensured.plan.shared_with.is_empty());

        let stored = store
            .get_by_id(PLANS_COLLECTION, &ensured.plan.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.get("sharedWith"), Some(&json!([])));
    }

    #[tokio::test]
    async fn test_second_call_reuses_plan() {
        let (store, service) = setup();
        let first = service.ensure_plan(&user()).await.unwrap();
        let second = service.ensure_plan(&user()).await.unwrap();

        assert_eq!(second.action, PlanAction::Existing);
        assert_eq!(first.plan.id, second.plan.id);
        assert_eq!(store.query(PLANS_COLLECTION, &[]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_adopts_orphans_and_legacy_sharing() {
        let (store, service) = setup();
        for date in ["2024-01-01", "2024-01-02"] {
            store
                .insert(MEALS_COLLECTION, doc(json!({"userId": "u1", "date": date, "lunch": "Pasta"})))
                .await
                .unwrap();
        }
        // Someone else's orphan stays put
        store
            .insert(MEALS_COLLECTION, doc(json!({"userId": "u2", "date": "2024-01-01"})))
            .await
            .unwrap();
        store
            .insert(
                LEGACY_SHARED_MEALS_COLLECTION,
                doc(json!({"ownerId": "u1", "sharedWith": ["friend@x.com", "owner@x.com"]})),
            )
            .await
            .unwrap();

        let ensured = service.ensure_plan(&user()).await.unwrap();
        assert_eq!(ensured.meals_migrated, 2);
        assert_eq!(ensured.shares_migrated, 1);
        assert!(ensured.failures.is_empty());
        assert_eq!(
            ensured.plan.shared_with.iter().collect::<Vec<_>>(),
            vec!["friend@x.com"]
        );

        let adopted = store
            .query(MEALS_COLLECTION, &[Filter::eq("planId", ensured.plan.id.as_str())])
            .await
            .unwrap();
        assert_eq!(adopted.len(), 2);
        assert!(service.find_orphan_meals(&user()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_meal_does_not_abort_batch() {
        let (store, service) = setup();
        let ok_id = store
            .insert(MEALS_COLLECTION, doc(json!({"userId": "u1", "date": "2024-01-01"})))
            .await
            .unwrap();
        let denied_id = store
            .insert(MEALS_COLLECTION, doc(json!({"userId": "u1", "date": "2024-01-02"})))
            .await
            .unwrap();
        store.deny_writes(MEALS_COLLECTION, &denied_id);

        let ensured = service.ensure_plan(&user()).await.unwrap();
        assert_eq!(ensured.meals_migrated, 1);
        assert_eq!(ensured.failures.len(), 1);
        assert_eq!(ensured.failures[0].target, format!("meals/{}", denied_id));

        let ok = store.get_by_id(MEALS_COLLECTION, &ok_id).await.unwrap().unwrap();
        assert_eq!(ok.get_str("planId"), Some(ensured.plan.id.as_str()));
    }

    #[tokio::test]
    async fn test_normalizes_legacy_plan_in_place() {
        let (store, service) = setup();
        let id = store
            .insert(
                PLANS_COLLECTION,
                doc(json!({
                    "userId": "u1",
                    "ownerEmail": "owner@x.com",
                    "name": "Piano di owner@x.com",
                    "sharedWith": {"a@x.com": true, "b@x.com": false},
                    "createdAt": "2024-01-01T10:00:00.000Z"
                })),
            )
            .await
            .unwrap();

        let ensured = service.ensure_plan(&user()).await.unwrap();
        assert_eq!(ensured.action, PlanAction::Normalized);
        assert_eq!(ensured.plan.id, id);

        let stored = store.get_by_id(PLANS_COLLECTION, &id).await.unwrap().unwrap();
        assert_eq!(stored.get("sharedWith"), Some(&json!(["a@x.com"])));
        assert_eq!(stored.get_str("ownerUserId"), Some("u1"));

        // Now canonical, nothing left to do
        let again = service.ensure_plan(&user()).await.unwrap();
        assert_eq!(again.action, PlanAction::Existing);
    }

    #[tokio::test]
    async fn test_rebuilds_plan_missing_fields() {
        let (store, service) = setup();
        let id = store
            .insert(PLANS_COLLECTION, doc(json!({"ownerUserId": "u1", "name": "Kitchen"})))
            .await
            .unwrap();

        let ensured = service.ensure_plan(&user()).await.unwrap();
        assert_eq!(ensured.action, PlanAction::Rebuilt);
        assert_eq!(ensured.plan.id, id);
        assert_eq!(ensured.plan.name, "Kitchen");
        assert_eq!(ensured.plan.owner_email, "owner@x.com");
        assert!(ensured.plan.shared_with.is_empty());
    }

    #[tokio::test]
    async fn test_unwritable_plan_fails_verification() {
        let (store, service) = setup();
        let id = store
            .insert(PLANS_COLLECTION, doc(json!({"ownerUserId": "u1"})))
            .await
            .unwrap();
        store.deny_writes(PLANS_COLLECTION, &id);

        // The rebuild write is rejected by the store
        let err = service.ensure_plan(&user()).await.unwrap_err();
        assert!(matches!(err, Error::Store(_)));
    }
}
