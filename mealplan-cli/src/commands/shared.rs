//! Shared command - meals from plans other people shared with you

use anyhow::{Context, Result};
use colored::Colorize;
use comfy_table::Cell;

use super::get_context;
use crate::output;

pub async fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let user = ctx
        .restore_user()
        .await?
        .context("Not signed in. Run `mp login <email>` first.")?;

    let content = ctx.shared_meals_service.load(&user).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&content)?);
        return Ok(());
    }

    if content.plans.is_empty() {
        println!("{}", "No plans are shared with you".dimmed());
        return Ok(());
    }

    for plan in &content.plans {
        output::info(&format!("{} (from {})", plan.name, plan.owner_email));
    }
    println!();

    if content.meals.is_empty() {
        println!("{}", "No meals planned in shared plans".dimmed());
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Date", "Plan", "Lunch", "Dinner"]);
    for shared in &content.meals {
        let meal = &shared.meal;
        table.add_row(vec![
            Cell::new(meal.date.format("%a %Y-%m-%d")),
            Cell::new(&shared.plan_name),
            output::dish_cell(&meal.lunch, meal.lunch_category),
            output::dish_cell(&meal.dinner, meal.dinner_category),
        ]);
    }
    println!("{}", table);
    Ok(())
}
