//! Meal repository - live CRUD over the meals of one plan

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::domain::meal::{fields as meal_fields, format_date};
use crate::domain::result::{Error, Result};
use crate::domain::{Meal, MealDraft, MealUpdate, User, ValidationError, Week, MEALS_COLLECTION};
use crate::ports::{DocumentStore, Filter, LiveQuery};
use crate::services::normalizer;

/// Result of copying a meal onto a date
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyOutcome {
    pub meal_id: String,
    /// Ids of the meals that were on the target date and got deleted
    pub replaced: Vec<String>,
}

/// One day of the weekly view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayMeals {
    pub date: NaiveDate,
    pub meal: Option<Meal>,
}

/// Meals of the active plan, kept current by a live query
///
/// Mutations never refetch: the live query picks up every commit. Failed
/// mutations leave the live list untouched.
pub struct MealRepository {
    store: Arc<dyn DocumentStore>,
    user: User,
    plan_id: String,
    live: LiveQuery,
}

impl MealRepository {
    pub async fn open(store: Arc<dyn DocumentStore>, user: User, plan_id: &str) -> Result<Self> {
        let live = store
            .subscribe(MEALS_COLLECTION, vec![Filter::eq(meal_fields::PLAN_ID, plan_id)])
            .await?;
        tracing::debug!(plan_id, "meal repository opened");
        Ok(Self {
            store,
            user,
            plan_id: plan_id.to_string(),
            live,
        })
    }

    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    /// Meals of the plan, by date
    pub fn meals(&self) -> Vec<Meal> {
        let mut meals = normalizer::normalize_meals(&self.live.snapshot());
        meals.sort_by(|a, b| a.date.cmp(&b.date));
        meals
    }

    pub fn meal(&self, meal_id: &str) -> Option<Meal> {
        self.meals().into_iter().find(|m| m.id == meal_id)
    }

    pub fn meal_for_date(&self, date: NaiveDate) -> Option<Meal> {
        self.meals().into_iter().find(|m| m.date == date)
    }

    /// Every day of `week` with its meal, Monday first
    pub fn week_view(&self, week: Week) -> Vec<DayMeals> {
        let meals: Vec<Meal> = self
            .meals()
            .into_iter()
            .filter(|m| week.contains(m.date))
            .collect();
        week.dates()
            .into_iter()
            .map(|date| DayMeals {
                date,
                meal: meals.iter().find(|m| m.date == date).cloned(),
            })
            .collect()
    }

    /// Wait until the meal list changes. Returns false once the store is gone.
    pub async fn changed(&mut self) -> bool {
        self.live.changed().await
    }

    /// Create a meal from user input
    ///
    /// Does not look for an existing meal on the same date.
    pub async fn add(&self, draft: MealDraft) -> Result<String> {
        let date = draft
            .date
            .ok_or_else(|| ValidationError::missing("meal", vec![meal_fields::DATE.to_string()]))?;

        let meal = Meal {
            id: String::new(),
            user_id: self.user.id.clone(),
            plan_id: self.plan_id.clone(),
            date,
            lunch: draft.lunch,
            lunch_category: draft.lunch_category,
            dinner: draft.dinner,
            dinner_category: draft.dinner_category,
            created_at: Some(Utc::now()),
        };
        let id = self
            .store
            .insert(MEALS_COLLECTION, meal.to_fields())
            .await
            .inspect_err(|e| tracing::warn!(plan_id = %self.plan_id, error = %e, "failed to add meal"))?;
        tracing::info!(meal_id = %id, date = %format_date(&date), "meal added");
        Ok(id)
    }

    /// Change the lunch/dinner fields of a listed meal
    pub async fn edit(&self, meal_id: &str, update: MealUpdate) -> Result<()> {
        if self.meal(meal_id).is_none() {
            return Err(Error::not_found(format!("meal {} in plan {}", meal_id, self.plan_id)));
        }
        if update.is_empty() {
            return Ok(());
        }
        self.store
            .update(MEALS_COLLECTION, meal_id, update.to_fields())
            .await
            .inspect_err(|e| tracing::warn!(meal_id, error = %e, "failed to edit meal"))?;
        tracing::info!(meal_id, "meal edited");
        Ok(())
    }

    /// Delete a meal. Confirmation is the caller's concern.
    pub async fn delete(&self, meal_id: &str) -> Result<()> {
        self.store
            .delete(MEALS_COLLECTION, meal_id)
            .await
            .inspect_err(|e| tracing::warn!(meal_id, error = %e, "failed to delete meal"))?;
        tracing::info!(meal_id, "meal deleted");
        Ok(())
    }

    /// Copy the lunch and dinner of `source` onto `target_date`
    ///
    /// Every meal already on the target date is deleted first, so the date
    /// ends up with exactly one meal. Callers that want to confirm the
    /// overwrite check `meal_for_date` beforehand.
    pub async fn copy(&self, source: &Meal, target_date: NaiveDate) -> Result<CopyOutcome> {
        let mut replaced = Vec::new();
        for existing in self.meals().into_iter().filter(|m| m.date == target_date) {
            self.delete(&existing.id).await?;
            replaced.push(existing.id);
        }

        let draft = MealDraft::for_date(target_date)
            .lunch(source.lunch.clone(), source.lunch_category)
            .dinner(source.dinner.clone(), source.dinner_category);
        let meal_id = self.add(draft).await?;

        Ok(CopyOutcome { meal_id, replaced })
    }
}

impl std::fmt::Debug for MealRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MealRepository")
            .field("plan_id", &self.plan_id)
            .field("user_id", &self.user.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryDocumentStore;
    use crate::domain::MealCategory;

    fn date(s: &str) -> NaiveDate {
        crate::domain::meal::parse_date(s).unwrap()
    }

    async fn repository() -> (Arc<MemoryDocumentStore>, MealRepository) {
        let store = Arc::new(MemoryDocumentStore::new());
        let repo = MealRepository::open(store.clone(), User::new("u1", "u1@x.com"), "p1")
            .await
            .unwrap();
        (store, repo)
    }

    #[tokio::test]
    async fn test_add_shows_up_in_live_list() {
        let (_store, repo) = repository().await;
        let id = repo
            .add(MealDraft::for_date(date("2024-03-04")).lunch("Pasta", MealCategory::Vegetarian))
            .await
            .unwrap();

        let meals = repo.meals();
        assert_eq!(meals.len(), 1);
        assert_eq!(meals[0].id, id);
        assert_eq!(meals[0].user_id, "u1");
        assert_eq!(meals[0].plan_id, "p1");
        assert_eq!(meals[0].dinner_category, MealCategory::Other);
        assert!(meals[0].created_at.is_some());
    }

    #[tokio::test]
    async fn test_add_requires_date() {
        let (_store, repo) = repository().await;
        let err = repo.add(MealDraft::default()).await.unwrap_err();
        match err {
            Error::Validation(e) => assert_eq!(e.missing_fields, vec!["date"]),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(repo.meals().is_empty());
    }

    #[tokio::test]
    async fn test_edit_and_delete() {
        let (_store, repo) = repository().await;
        let id = repo
            .add(MealDraft::for_date(date("2024-03-04")).lunch("Pasta", MealCategory::Other))
            .await
            .unwrap();

        repo.edit(
            &id,
            MealUpdate {
                dinner: Some("Minestrone".into()),
                dinner_category: Some(MealCategory::Soup),
                ..MealUpdate::default()
            },
        )
        .await
        .unwrap();
        let meal = repo.meal(&id).unwrap();
        assert_eq!(meal.lunch, "Pasta");
        assert_eq!(meal.dinner, "Minestrone");
        assert_eq!(meal.date, date("2024-03-04"));

        assert!(matches!(
            repo.edit("missing", MealUpdate::default()).await,
            Err(Error::NotFound(_))
        ));

        repo.delete(&id).await.unwrap();
        assert!(repo.meals().is_empty());
    }

    #[tokio::test]
    async fn test_failed_delete_leaves_list_unchanged() {
        let (store, repo) = repository().await;
        let id = repo.add(MealDraft::for_date(date("2024-03-04"))).await.unwrap();
        store.deny_writes(MEALS_COLLECTION, &id);

        assert!(matches!(repo.delete(&id).await, Err(Error::Store(_))));
        assert_eq!(repo.meals().len(), 1);
    }

    #[tokio::test]
    async fn test_copy_overwrites_target() {
        let (_store, repo) = repository().await;
        let source_id = repo
            .add(
                MealDraft::for_date(date("2024-01-01"))
                    .lunch("Pasta", MealCategory::Vegetarian)
                    .dinner("Soup", MealCategory::Soup),
            )
            .await
            .unwrap();
        let old_id = repo
            .add(MealDraft::for_date(date("2024-01-02")).lunch("Rice", MealCategory::Other))
            .await
            .unwrap();

        let source = repo.meal(&source_id).unwrap();
        let outcome = repo.copy(&source, date("2024-01-02")).await.unwrap();
        assert_eq!(outcome.replaced, vec![old_id]);

        let on_target: Vec<_> = repo
            .meals()
            .into_iter()
            .filter(|m| m.date == date("2024-01-02"))
            .collect();
        assert_eq!(on_target.len(), 1);
        assert_eq!(on_target[0].id, outcome.meal_id);
        assert_eq!(on_target[0].lunch, "Pasta");
        assert_eq!(on_target[0].dinner, "Soup");
        assert_eq!(on_target[0].dinner_category, MealCategory::Soup);
    }

    #[tokio::test]
    async fn test_copy_replaces_every_meal_on_target() {
        let (_store, repo) = repository().await;
        let source_id = repo
            .add(MealDraft::for_date(date("2024-01-01")).lunch("Pasta", MealCategory::Vegetarian))
            .await
            .unwrap();
        // `add` does not dedupe, so a date can hold two meals
        let first = repo
            .add(MealDraft::for_date(date("2024-01-02")).lunch("Rice", MealCategory::Other))
            .await
            .unwrap();
        let second = repo
            .add(MealDraft::for_date(date("2024-01-02")).dinner("Steak", MealCategory::Meat))
            .await
            .unwrap();

        let source = repo.meal(&source_id).unwrap();
        let outcome = repo.copy(&source, date("2024-01-02")).await.unwrap();

        let mut replaced = outcome.replaced.clone();
        replaced.sort();
        let mut expected = vec![first, second];
        expected.sort();
        assert_eq!(replaced, expected);

        let on_target: Vec<_> = repo
            .meals()
            .into_iter()
            .filter(|m| m.date == date("2024-01-02"))
            .collect();
        assert_eq!(on_target.len(), 1);
        assert_eq!(on_target[0].id, outcome.meal_id);
        assert_eq!(on_target[0].lunch, "Pasta");
    }

    #[tokio::test]
    async fn test_copy_to_empty_date_replaces_nothing() {
        let (_store, repo) = repository().await;
        let source_id = repo.add(MealDraft::for_date(date("2024-01-01"))).await.unwrap();
        let source = repo.meal(&source_id).unwrap();

        let outcome = repo.copy(&source, date("2024-01-09")).await.unwrap();
        assert!(outcome.replaced.is_empty());
        assert_eq!(repo.meals().len(), 2);
    }

    #[tokio::test]
    async fn test_week_view() {
        let (_store, repo) = repository().await;
        repo.add(MealDraft::for_date(date("2024-03-06")).lunch("Fish", MealCategory::Fish))
            .await
            .unwrap();
        repo.add(MealDraft::for_date(date("2024-03-11"))).await.unwrap();

        let days = repo.week_view(Week::containing(date("2024-03-04")));
        assert_eq!(days.len(), 7);
        assert_eq!(days[0].date, date("2024-03-04"));
        assert!(days[0].meal.is_none());
        assert_eq!(days[2].meal.as_ref().unwrap().lunch, "Fish");
        assert_eq!(days.iter().filter(|d| d.meal.is_some()).count(), 1);
    }
}
