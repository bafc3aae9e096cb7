//! Plan commands - list available plans and pick the active one

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use comfy_table::{Cell, Color};

use super::{get_context, open_session};
use crate::output;

#[derive(Subcommand)]
pub enum PlanCommands {
    /// List the plans you own or that are shared with you
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Make a plan the active one
    Use {
        /// Plan id (see `mp plan list`)
        plan_id: String,
    },
}

pub async fn run(command: PlanCommands) -> Result<()> {
    match command {
        PlanCommands::List { json } => list(json).await,
        PlanCommands::Use { plan_id } => select(&plan_id).await,
    }
}

async fn list(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let session = open_session(&ctx).await?;
    let state = session.state();
    session.close();

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["", "Name", "Owner", "Shared with", "Id"]);
    for available in &state.available_plans {
        let plan = &available.plan;
        let marker = if state.active_plan_id.as_deref() == Some(plan.id.as_str()) {
            Cell::new("*").fg(Color::Green)
        } else {
            Cell::new("")
        };
        let owner = if available.is_owner {
            Cell::new("you").fg(Color::Cyan)
        } else {
            Cell::new(&plan.owner_email)
        };
        table.add_row(vec![
            marker,
            Cell::new(&plan.name),
            owner,
            Cell::new(plan.shared_with.len()),
            Cell::new(&plan.id).fg(Color::DarkGrey),
        ]);
    }

    println!("{}", table);
    if !state.shared_with.is_empty() {
        println!(
            "{} {}",
            "Active plan is shared with:".dimmed(),
            state.shared_with.iter().collect::<Vec<_>>().join(", ")
        );
    }
    Ok(())
}

async fn select(plan_id: &str) -> Result<()> {
    let mut ctx = get_context()?;
    let mut session = open_session(&ctx).await?;
    session.select_plan(plan_id).await?;

    let state = session.state();
    session.close();

    if let Some(active) = state.active_plan() {
        output::success(&format!("Now planning in '{}'", active.plan.name));
    }
    ctx.config.active_plan_id = state.active_plan_id;
    ctx.save_config()
}
