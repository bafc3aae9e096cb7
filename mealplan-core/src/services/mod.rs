//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod directory;
mod doctor;
mod meals;
pub mod normalizer;
pub mod plan_migration;
mod shared_meals;
mod sharing;

pub use directory::{compose, AvailablePlan, DirectoryState, PlanDirectory};
pub use doctor::{CheckResult, DoctorResult, DoctorService, DoctorSummary, RepairResult};
pub use meals::{CopyOutcome, DayMeals, MealRepository};
pub use plan_migration::{EnsuredPlan, MigrationFailure, PlanAction, PlanMigrationService};
pub use shared_meals::{SharedContent, SharedMeal, SharedMealsService};
pub use sharing::SharingManager;
