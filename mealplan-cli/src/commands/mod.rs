//! CLI command implementations

pub mod auth;
pub mod doctor;
pub mod meal;
pub mod plan;
pub mod share;
pub mod shared;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use mealplan_core::ports::DocumentStore;
use mealplan_core::{MealPlanContext, Session};

/// Get the data directory from environment or default
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("MEALPLAN_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".mealplan"))
}

/// Get or create the meal planner context
pub fn get_context() -> Result<MealPlanContext> {
    let data_dir = get_data_dir()?;

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

    MealPlanContext::new(&data_dir)
}

/// Start a session for the remembered user
///
/// Runs plan migration for the user and restores the plan chosen with
/// `mp plan use` when it is still available.
pub async fn open_session(ctx: &MealPlanContext) -> Result<Session> {
    let user = ctx
        .restore_user()
        .await?
        .context("Not signed in. Run `mp login <email>` first.")?;

    let store: Arc<dyn DocumentStore> = ctx.store.clone();
    let mut session = Session::start(store, user).await?;

    if let Some(plan_id) = &ctx.config.active_plan_id {
        if session.state().find(plan_id).is_some() {
            session.select_plan(plan_id).await?;
        } else {
            tracing::info!(plan_id = %plan_id, "remembered plan is no longer available");
        }
    }

    Ok(session)
}
