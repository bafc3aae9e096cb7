//! Meal commands - list, add, edit, delete and copy meals of the active plan

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Subcommand};
use colored::Colorize;
use comfy_table::{Cell, Color};
use dialoguer::Confirm;
use mealplan_core::services::MealRepository;
use mealplan_core::{MealCategory, MealDraft, MealUpdate, Session, Week};

use super::{get_context, open_session};
use crate::output;

#[derive(Subcommand)]
pub enum MealCommands {
    /// List every meal of the active plan
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one week, Monday to Sunday
    Week {
        /// Any date inside the week (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Show the week after
        #[arg(long, conflicts_with = "previous")]
        next: bool,
        /// Show the week before
        #[arg(long)]
        previous: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a meal
    Add {
        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
        #[command(flatten)]
        dishes: Dishes,
    },
    /// Change lunch or dinner of a meal
    Edit {
        id: String,
        #[command(flatten)]
        dishes: Dishes,
    },
    /// Delete a meal
    Delete {
        id: String,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
    /// Copy a meal to another date, replacing what is there
    Copy {
        id: String,
        /// Target date (YYYY-MM-DD)
        date: NaiveDate,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

#[derive(Args)]
pub struct Dishes {
    #[arg(long)]
    lunch: Option<String>,
    /// vegetarian, fish, meat, legumes, soup or other
    #[arg(long, value_parser = parse_category)]
    lunch_category: Option<MealCategory>,
    #[arg(long)]
    dinner: Option<String>,
    /// vegetarian, fish, meat, legumes, soup or other
    #[arg(long, value_parser = parse_category)]
    dinner_category: Option<MealCategory>,
}

fn parse_category(s: &str) -> Result<MealCategory, String> {
    s.parse()
}

pub async fn run(command: MealCommands) -> Result<()> {
    let ctx = get_context()?;
    let mut session = open_session(&ctx).await?;

    let result = match command {
        MealCommands::List { json } => list(&mut session, json).await,
        MealCommands::Week {
            date,
            next,
            previous,
            json,
        } => {
            let week = pick_week(date.unwrap_or_else(|| Local::now().date_naive()), next, previous);
            show_week(&mut session, week, json).await
        }
        MealCommands::Add { date, dishes } => add(&mut session, date, dishes).await,
        MealCommands::Edit { id, dishes } => edit(&mut session, &id, dishes).await,
        MealCommands::Delete { id, force } => delete(&mut session, &id, force).await,
        MealCommands::Copy { id, date, force } => copy(&mut session, &id, date, force).await,
    };

    session.close();
    result
}

async fn repository(session: &mut Session) -> Result<&MealRepository> {
    session
        .meals()
        .await?
        .context("No active plan. Run `mp plan list` to pick one.")
}

async fn list(session: &mut Session, json: bool) -> Result<()> {
    let meals = repository(session).await?.meals();

    if json {
        println!("{}", serde_json::to_string_pretty(&meals)?);
        return Ok(());
    }

    if meals.is_empty() {
        println!("{}", "No meals planned yet".dimmed());
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Date", "Lunch", "Dinner", "Id"]);
    for meal in &meals {
        table.add_row(vec![
            Cell::new(meal.date.format("%a %Y-%m-%d")),
            output::dish_cell(&meal.lunch, meal.lunch_category),
            output::dish_cell(&meal.dinner, meal.dinner_category),
            Cell::new(&meal.id).fg(Color::DarkGrey),
        ]);
    }
    println!("{}", table);
    Ok(())
}

fn pick_week(date: NaiveDate, next: bool, previous: bool) -> Week {
    let week = Week::containing(date);
    if next {
        week.next()
    } else if previous {
        week.previous()
    } else {
        week
    }
}

async fn show_week(session: &mut Session, week: Week, json: bool) -> Result<()> {
    let days = repository(session).await?.week_view(week);

    if json {
        println!("{}", serde_json::to_string_pretty(&days)?);
        return Ok(());
    }

    println!(
        "{}",
        format!("Week of {} to {}", week.start(), week.end()).bold()
    );
    let mut table = output::create_table();
    table.set_header(vec!["Day", "Lunch", "Dinner"]);
    for day in &days {
        let label = Cell::new(day.date.format("%a %d"));
        match &day.meal {
            Some(meal) => table.add_row(vec![
                label,
                output::dish_cell(&meal.lunch, meal.lunch_category),
                output::dish_cell(&meal.dinner, meal.dinner_category),
            ]),
            None => table.add_row(vec![
                label,
                Cell::new("-").fg(Color::DarkGrey),
                Cell::new("-").fg(Color::DarkGrey),
            ]),
        };
    }
    println!("{}", table);
    Ok(())
}

async fn add(session: &mut Session, date: Option<NaiveDate>, dishes: Dishes) -> Result<()> {
    let draft = MealDraft {
        date,
        lunch: dishes.lunch.unwrap_or_default(),
        lunch_category: dishes.lunch_category.unwrap_or_default(),
        dinner: dishes.dinner.unwrap_or_default(),
        dinner_category: dishes.dinner_category.unwrap_or_default(),
    };

    let id = repository(session).await?.add(draft).await?;
    output::success(&format!("Meal added ({})", id));
    Ok(())
}

async fn edit(session: &mut Session, id: &str, dishes: Dishes) -> Result<()> {
    let update = MealUpdate {
        lunch: dishes.lunch,
        lunch_category: dishes.lunch_category,
        dinner: dishes.dinner,
        dinner_category: dishes.dinner_category,
    };
    if update.is_empty() {
        output::info("Nothing to change");
        return Ok(());
    }

    repository(session).await?.edit(id, update).await?;
    output::success("Meal updated");
    Ok(())
}

async fn delete(session: &mut Session, id: &str, force: bool) -> Result<()> {
    let meals = repository(session).await?;
    let meal = meals
        .meal(id)
        .with_context(|| format!("Meal '{}' not found in the active plan", id))?;

    if !force {
        println!(
            "\n{}",
            format!("This will delete the meal planned for {}.", meal.date).yellow()
        );
        if !Confirm::new()
            .with_prompt("Are you sure?")
            .default(false)
            .interact()?
        {
            println!("{}\n", "Cancelled".dimmed());
            return Ok(());
        }
    }

    meals.delete(&meal.id).await?;
    output::success("Meal deleted");
    Ok(())
}

async fn copy(session: &mut Session, id: &str, date: NaiveDate, force: bool) -> Result<()> {
    let meals = repository(session).await?;
    let source = meals
        .meal(id)
        .with_context(|| format!("Meal '{}' not found in the active plan", id))?;

    if !force && meals.meal_for_date(date).is_some() {
        println!(
            "\n{}",
            format!("A meal is already planned for {}. It will be replaced.", date).yellow()
        );
        if !Confirm::new()
            .with_prompt("Continue?")
            .default(false)
            .interact()?
        {
            println!("{}\n", "Cancelled".dimmed());
            return Ok(());
        }
    }

    let outcome = meals.copy(&source, date).await?;
    if !outcome.replaced.is_empty() {
        output::success(&format!(
            "Meal copied to {} ({} previous meal(s) replaced)",
            date,
            outcome.replaced.len()
        ));
    } else {
        output::success(&format!("Meal copied to {}", date));
    }
    Ok(())
}
