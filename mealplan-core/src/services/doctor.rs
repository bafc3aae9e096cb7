//! Doctor service - data health checks and repair for one user

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::domain::meal::{fields as meal_fields, format_date};
use crate::domain::plan::{canonical_email, fields as plan_fields};
use crate::domain::result::Result;
use crate::domain::{User, MEALS_COLLECTION, PLANS_COLLECTION};
use crate::ports::{DocumentStore, Filter, StoredDocument};
use crate::services::normalizer;
use crate::services::plan_migration::{MigrationFailure, PlanAction, PlanMigrationService};

const PASS: &str = "pass";
const WARNING: &str = "warning";
const ERROR: &str = "error";

/// Doctor service for health checks
pub struct DoctorService {
    store: Arc<dyn DocumentStore>,
    migration: PlanMigrationService,
}

impl DoctorService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            migration: PlanMigrationService::new(Arc::clone(&store)),
            store,
        }
    }

    /// Run all health checks for `user`
    pub async fn run_checks(&self, user: &User) -> Result<DoctorResult> {
        let mut checks = BTreeMap::new();

        // Owned plans
        let owned = self.migration.find_owned_plans(user).await?;
        checks.insert(
            "owned_plan".to_string(),
            match owned.len() {
                1 => CheckResult::pass("User owns exactly one plan"),
                0 => CheckResult::new(ERROR, "User owns no plan"),
                n => CheckResult::new(ERROR, format!("User owns {} plans", n))
                    .with_details(owned.iter().map(|p| json!({"plan_id": p.id})).collect()),
            },
        );

        // Plan shape
        checks.insert("plan_shape".to_string(), plan_shape_check(owned.first()));

        // Orphaned meals
        let orphans = self.migration.find_orphan_meals(user).await?;
        checks.insert(
            "orphaned_meals".to_string(),
            if orphans.is_empty() {
                CheckResult::pass("No meals without a plan")
            } else {
                CheckResult::new(
                    WARNING,
                    format!("{} meal(s) belong to no plan", orphans.len()),
                )
                .with_details(
                    orphans
                        .iter()
                        .map(|m| json!({"meal_id": m.id, "date": m.get_str(meal_fields::DATE)}))
                        .collect(),
                )
            },
        );

        // Duplicate meals per date
        let duplicates = match owned.first() {
            Some(plan) => self.duplicate_dates(&plan.id).await?,
            None => Vec::new(),
        };
        checks.insert(
            "duplicate_meals".to_string(),
            if duplicates.is_empty() {
                CheckResult::pass("At most one meal per date")
            } else {
                CheckResult::new(
                    WARNING,
                    format!("{} date(s) hold more than one meal", duplicates.len()),
                )
                .with_details(
                    duplicates
                        .iter()
                        .map(|(date, count)| json!({"date": date, "count": count}))
                        .collect(),
                )
            },
        );

        // Legacy sharing record
        let legacy = self.migration.find_legacy_share(user).await?;
        checks.insert(
            "legacy_sharing".to_string(),
            legacy_sharing_check(legacy.as_ref(), owned.first()),
        );

        // Plans shared with this user
        let shared = self
            .store
            .query(
                PLANS_COLLECTION,
                &[Filter::array_contains(
                    plan_fields::SHARED_WITH,
                    canonical_email(&user.email),
                )],
            )
            .await?;
        checks.insert(
            "shared_plans".to_string(),
            CheckResult::pass(format!("{} plan(s) shared with {}", shared.len(), user.email)),
        );

        let summary = DoctorSummary {
            passed: checks.values().filter(|c| c.status == PASS).count() as i64,
            warnings: checks.values().filter(|c| c.status == WARNING).count() as i64,
            errors: checks.values().filter(|c| c.status == ERROR).count() as i64,
        };
        Ok(DoctorResult { checks, summary })
    }

    /// Fix what can be fixed without user input
    ///
    /// Ensures the owned plan (creating or normalizing it) and adopts
    /// orphaned meals into it.
    pub async fn repair(&self, user: &User) -> Result<RepairResult> {
        let ensured = self.migration.ensure_plan(user).await?;
        let mut result = RepairResult {
            plan_id: ensured.plan.id.clone(),
            plan_action: ensured.action,
            meals_adopted: ensured.meals_migrated,
            failures: ensured.failures,
        };

        // A freshly created plan has already adopted the orphans
        if ensured.action != PlanAction::Created {
            let (adopted, failures) = self
                .migration
                .adopt_orphan_meals(user, &ensured.plan.id)
                .await?;
            result.meals_adopted += adopted;
            result.failures.extend(failures);
        }

        tracing::info!(
            user_id = %user.id,
            plan_id = %result.plan_id,
            meals_adopted = result.meals_adopted,
            failures = result.failures.len(),
            "repair finished"
        );
        Ok(result)
    }

    /// Dates in the plan with more than one meal, with their counts
    async fn duplicate_dates(&self, plan_id: &str) -> Result<Vec<(String, usize)>> {
        let meals = self
            .store
            .query(MEALS_COLLECTION, &[Filter::eq(meal_fields::PLAN_ID, plan_id)])
            .await?;
        let mut per_date: HashMap<String, usize> = HashMap::new();
        for meal in normalizer::normalize_meals(&meals) {
            *per_date.entry(format_date(&meal.date)).or_insert(0) += 1;
        }
        let mut duplicates: Vec<_> = per_date.into_iter().filter(|(_, n)| *n > 1).collect();
        duplicates.sort();
        Ok(duplicates)
    }
}

fn plan_shape_check(plan: Option<&StoredDocument>) -> CheckResult {
    let Some(raw) = plan else {
        return CheckResult::new(WARNING, "No plan to check");
    };
    match normalizer::normalize_plan(raw) {
        Ok(plan) if normalizer::plan_needs_rewrite(raw, &plan) => CheckResult::new(
            WARNING,
            "Plan is stored in a legacy shape and will be rewritten",
        ),
        Ok(_) => CheckResult::pass("Plan is in canonical shape"),
        Err(e) => CheckResult::new(ERROR, format!("Plan is invalid: {}", e))
            .with_details(vec![json!({"missing_fields": e.missing_fields})]),
    }
}

fn legacy_sharing_check(record: Option<&StoredDocument>, plan: Option<&StoredDocument>) -> CheckResult {
    let Some(record) = record else {
        return CheckResult::pass("No legacy sharing record");
    };
    let legacy = record
        .get(plan_fields::SHARED_WITH)
        .and_then(|v| normalizer::coerce_shared_with(v).ok())
        .unwrap_or_default();
    let current = plan
        .and_then(|raw| normalizer::normalize_plan(raw).ok())
        .map(|p| p.shared_with)
        .unwrap_or_default();

    let missing: Vec<&str> = legacy
        .iter()
        .filter(|email| !current.contains(email))
        .filter(|email| {
            plan.and_then(|p| p.get_str(plan_fields::OWNER_EMAIL))
                .map_or(true, |owner| canonical_email(owner) != *email)
        })
        .collect();
    if missing.is_empty() {
        CheckResult::pass("Legacy sharing record is reflected in the plan")
    } else {
        CheckResult::new(
            WARNING,
            format!("{} legacy collaborator(s) missing from the plan", missing.len()),
        )
        .with_details(missing.iter().map(|email| json!({"email": email})).collect())
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorResult {
    pub checks: BTreeMap<String, CheckResult>,
    pub summary: DoctorSummary,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<serde_json::Value>>,
}

impl CheckResult {
    fn new(status: &str, message: impl Into<String>) -> Self {
        Self {
            status: status.to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn pass(message: impl Into<String>) -> Self {
        Self::new(PASS, message)
    }

    fn with_details(mut self, details: Vec<serde_json::Value>) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorSummary {
    pub passed: i64,
    pub warnings: i64,
    pub errors: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairResult {
    pub plan_id: String,
    pub plan_action: PlanAction,
    pub meals_adopted: usize,
    pub failures: Vec<MigrationFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryDocumentStore;
    use crate::domain::LEGACY_SHARED_MEALS_COLLECTION;
    use crate::ports::Document;
    use serde_json::Value as JsonValue;

    fn doc(value: JsonValue) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn user() -> User {
        User::new("u1", "owner@x.com")
    }

    #[tokio::test]
    async fn test_fresh_user_has_no_plan() {
        let doctor = DoctorService::new(Arc::new(MemoryDocumentStore::new()));
        let result = doctor.run_checks(&user()).await.unwrap();
        assert_eq!(result.checks["owned_plan"].status, ERROR);
        assert_eq!(result.summary.errors, 1);
    }

    #[tokio::test]
    async fn test_detects_and_repairs_legacy_data() {
        let store = Arc::new(MemoryDocumentStore::new());
        let plan_id = store
            .insert(
                PLANS_COLLECTION,
                doc(json!({
                    "userId": "u1",
                    "ownerEmail": "owner@x.com",
                    "name": "Kitchen",
                    "sharedWith": {"a@x.com": true},
                    "createdAt": "2024-01-01T00:00:00.000Z"
                })),
            )
            .await
            .unwrap();
        store
            .insert(MEALS_COLLECTION, doc(json!({"userId": "u1", "date": "2024-01-01"})))
            .await
            .unwrap();
        store
            .insert(
                LEGACY_SHARED_MEALS_COLLECTION,
                doc(json!({"ownerId": "u1", "sharedWith": ["a@x.com", "b@x.com"]})),
            )
            .await
            .unwrap();

        let doctor = DoctorService::new(store.clone());
        let before = doctor.run_checks(&user()).await.unwrap();
        assert_eq!(before.checks["owned_plan"].status, PASS);
        assert_eq!(before.checks["plan_shape"].status, WARNING);
        assert_eq!(before.checks["orphaned_meals"].status, WARNING);
        assert_eq!(before.checks["legacy_sharing"].status, WARNING);

        let repair = doctor.repair(&user()).await.unwrap();
        assert_eq!(repair.plan_id, plan_id);
        assert_eq!(repair.plan_action, PlanAction::Normalized);
        assert_eq!(repair.meals_adopted, 1);

        let after = doctor.run_checks(&user()).await.unwrap();
        assert_eq!(after.checks["plan_shape"].status, PASS);
        assert_eq!(after.checks["orphaned_meals"].status, PASS);
        // Legacy collaborators are only carried over when a plan is created
        assert_eq!(after.checks["legacy_sharing"].status, WARNING);
    }

    #[tokio::test]
    async fn test_duplicate_meals_reported() {
        let store = Arc::new(MemoryDocumentStore::new());
        let doctor = DoctorService::new(store.clone());
        let plan_id = doctor.repair(&user()).await.unwrap().plan_id;
        for lunch in ["Pasta", "Rice"] {
            store
                .insert(
                    MEALS_COLLECTION,
                    doc(json!({"userId": "u1", "planId": plan_id, "date": "2024-01-01", "lunch": lunch})),
                )
                .await
                .unwrap();
        }

        let result = doctor.run_checks(&user()).await.unwrap();
        let check = &result.checks["duplicate_meals"];
        assert_eq!(check.status, WARNING);
        assert_eq!(
            check.details.as_ref().unwrap()[0],
            json!({"date": "2024-01-01", "count": 2})
        );
    }
}
