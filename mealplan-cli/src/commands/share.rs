//! Share commands - manage collaborators of the active plan

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use mealplan_core::{Session, SharedWith};

use super::{get_context, open_session};
use crate::output;

#[derive(Subcommand)]
pub enum ShareCommands {
    /// Show who the active plan is shared with
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Give someone access to the active plan
    Add { email: String },
    /// Revoke someone's access to the active plan
    Remove { email: String },
}

pub async fn run(command: ShareCommands) -> Result<()> {
    let ctx = get_context()?;
    let session = open_session(&ctx).await?;

    let result = match command {
        ShareCommands::List { json } => {
            let state = session.state();
            let active = state
                .active_plan()
                .context("No active plan. Run `mp plan list` to pick one.")?;
            print_collaborators(&active.plan.name, &state.shared_with, json)
        }
        ShareCommands::Add { email } => add(&session, &email).await,
        ShareCommands::Remove { email } => remove(&session, &email).await,
    };

    session.close();
    result
}

async fn add(session: &Session, email: &str) -> Result<()> {
    let shared = session.share(email).await?;
    output::success(&format!("Shared with {}", email));
    print_count(&shared);
    Ok(())
}

async fn remove(session: &Session, email: &str) -> Result<()> {
    let shared = session.unshare(email).await?;
    output::success(&format!("{} no longer has access", email));
    print_count(&shared);
    Ok(())
}

fn print_collaborators(plan_name: &str, shared: &SharedWith, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(shared)?);
        return Ok(());
    }

    println!("{}", plan_name.bold());
    if shared.is_empty() {
        println!("{}", "Not shared with anyone".dimmed());
    }
    for email in shared.iter() {
        println!("  {}", email);
    }
    Ok(())
}

fn print_count(shared: &SharedWith) {
    println!(
        "{}",
        format!("The plan is shared with {} people", shared.len()).dimmed()
    );
}
