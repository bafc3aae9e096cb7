//! Shared meals view - one-shot read of everything shared with a user

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;

use crate::domain::meal::fields as meal_fields;
use crate::domain::result::Result;
use crate::domain::{Meal, Plan, User, MEALS_COLLECTION, PLANS_COLLECTION};
use crate::ports::{DocumentStore, Filter, StoredDocument};
use crate::services::directory::shared_plan_filters;
use crate::services::normalizer;

/// A meal from a plan someone else owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedMeal {
    #[serde(flatten)]
    pub meal: Meal,
    pub owner_email: String,
    pub plan_name: String,
}

/// Shared plans and their meals
#[derive(Debug, Clone, Default, Serialize)]
pub struct SharedContent {
    pub plans: Vec<Plan>,
    /// Newest date first
    pub meals: Vec<SharedMeal>,
}

pub struct SharedMealsService {
    store: Arc<dyn DocumentStore>,
}

impl SharedMealsService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Load every plan shared with `user` and the meals in them
    ///
    /// A plan whose meals cannot be read is logged and left out.
    pub async fn load(&self, user: &User) -> Result<SharedContent> {
        // Same queries as the plan directory, so both list the same plans
        let mut docs = Vec::new();
        for filters in shared_plan_filters(&user.email) {
            for doc in self.store.query(PLANS_COLLECTION, &filters).await? {
                if !docs.iter().any(|d: &StoredDocument| d.id == doc.id) {
                    docs.push(doc);
                }
            }
        }

        let plans: Vec<Plan> = docs
            .iter()
            .filter_map(|doc| normalizer::normalize_plan(doc).ok())
            .filter(|plan| !plan.is_owned_by(user))
            .collect();

        let loads = plans.iter().map(|plan| async move {
            let result = self
                .store
                .query(
                    MEALS_COLLECTION,
                    &[Filter::eq(meal_fields::PLAN_ID, plan.id.as_str())],
                )
                .await;
            (plan, result)
        });

        let mut meals = Vec::new();
        for (plan, result) in join_all(loads).await {
            match result {
                Ok(docs) => meals.extend(normalizer::normalize_meals(&docs).into_iter().map(|meal| {
                    SharedMeal {
                        meal,
                        owner_email: plan.owner_email.clone(),
                        plan_name: plan.name.clone(),
                    }
                })),
                Err(e) => {
                    tracing::warn!(plan_id = %plan.id, error = %e, "failed to load shared meals");
                }
            }
        }
        meals.sort_by(|a, b| b.meal.date.cmp(&a.meal.date));

        tracing::debug!(
            user_id = %user.id,
            plans = plans.len(),
            meals = meals.len(),
            "loaded shared content"
        );
        Ok(SharedContent { plans, meals })
    }
}
