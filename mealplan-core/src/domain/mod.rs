//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

pub mod meal;
pub mod plan;
pub mod result;
mod user;
mod week;

pub use meal::{Meal, MealCategory, MealDraft, MealUpdate, MEALS_COLLECTION};
pub use plan::{Plan, SharedWith, PLANS_COLLECTION};
pub use result::{AuthError, AuthErrorKind, ValidationError};
pub use user::User;
pub use week::Week;

/// Legacy collection: one record per owner listing collaborator emails
pub const LEGACY_SHARED_MEALS_COLLECTION: &str = "sharedMeals";
