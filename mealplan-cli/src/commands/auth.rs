//! Account commands - signup, login, logout, whoami

use anyhow::Result;
use colored::Colorize;
use dialoguer::Password;
use mealplan_core::services::{EnsuredPlan, PlanAction};
use mealplan_core::Session;
use serde_json::json;

use super::{get_context, open_session};
use crate::output;

pub async fn signup(email: &str, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => Password::new()
            .with_prompt("Password")
            .with_confirmation("Repeat password", "Passwords do not match")
            .interact()?,
    };

    let mut ctx = get_context()?;
    let mut sessions = ctx.sessions();
    let session = sessions.sign_up(email, &password).await?;

    output::success(&format!("Account created for {}", session.user().email));
    report_plan(session.migration());
    remember(&mut ctx.config, session);

    ctx.save_config()
}

pub async fn login(email: &str, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => Password::new().with_prompt("Password").interact()?,
    };

    let mut ctx = get_context()?;
    let mut sessions = ctx.sessions();
    let session = sessions.sign_in(email, &password).await?;

    output::success(&format!("Signed in as {}", session.user().email));
    report_plan(session.migration());
    remember(&mut ctx.config, session);

    ctx.save_config()
}

pub async fn logout() -> Result<()> {
    let mut ctx = get_context()?;
    if ctx.config.session_user.is_none() {
        output::info("Not signed in");
        return Ok(());
    }
    ctx.config.sign_out();
    ctx.save_config()?;
    output::success("Signed out");
    Ok(())
}

pub async fn whoami(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let session = open_session(&ctx).await?;
    let state = session.state();

    if json {
        let value = json!({
            "user": session.user(),
            "ownedPlan": session.owned_plan(),
            "activePlanId": state.active_plan_id,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        session.close();
        return Ok(());
    }

    println!("{} {}", "Email:".bold(), session.user().email);
    println!("{} {}", "User id:".bold(), session.user().id.dimmed());
    println!("{} {}", "Your plan:".bold(), session.owned_plan().name);
    if let Some(active) = state.active_plan() {
        let role = if active.is_owner { "owner" } else { "shared with you" };
        println!(
            "{} {} {}",
            "Active plan:".bold(),
            active.plan.name,
            format!("({})", role).dimmed()
        );
    }

    session.close();
    Ok(())
}

fn remember(config: &mut mealplan_core::config::Config, session: &Session) {
    config.sign_in(session.user().clone());
    if config.active_plan_id.is_none() {
        config.active_plan_id = session.state().active_plan_id;
    }
}

fn report_plan(ensured: &EnsuredPlan) {
    match ensured.action {
        PlanAction::Existing => {}
        PlanAction::Created => output::info(&format!("Created plan '{}'", ensured.plan.name)),
        PlanAction::Normalized => output::info("Updated your plan to the current format"),
        PlanAction::Rebuilt => output::warning("Your plan was damaged and has been rebuilt"),
    }
    if ensured.meals_migrated > 0 {
        output::info(&format!("Moved {} meal(s) into your plan", ensured.meals_migrated));
    }
    if ensured.shares_migrated > 0 {
        output::info(&format!(
            "Carried over {} collaborator(s) from your old sharing settings",
            ensured.shares_migrated
        ));
    }
    for failure in &ensured.failures {
        output::warning(&format!("Could not migrate {}: {}", failure.target, failure.error));
    }
}
