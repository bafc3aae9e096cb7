//! Doctor command - check plan data and repair what can be repaired

use anyhow::{Context, Result};
use colored::Colorize;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use serde_json::{json, Value};

use super::get_context;
use crate::output;

/// Format a detail JSON value for display
fn format_detail(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let display_val = match v {
                    Value::String(s) if s.chars().count() > 40 => {
                        format!("{}...", s.chars().take(37).collect::<String>())
                    }
                    Value::String(s) => s.clone(),
                    Value::Array(arr) if arr.len() > 3 => format!("[{} items]", arr.len()),
                    Value::Array(arr) => format!(
                        "{:?}",
                        arr.iter().filter_map(|v| v.as_str()).collect::<Vec<_>>()
                    ),
                    _ => v.to_string(),
                };
                format!("{}: {}", k, display_val)
            })
            .collect::<Vec<_>>()
            .join(", "),
        Value::String(s) => s.clone(),
        _ => value.to_string(),
    }
}

pub async fn run(fix: bool, verbose: bool, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let user = ctx
        .restore_user()
        .await?
        .context("Not signed in. Run `mp login <email>` first.")?;

    let repair = if fix {
        Some(ctx.doctor_service.repair(&user).await?)
    } else {
        None
    };
    let result = ctx.doctor_service.run_checks(&user).await?;

    if json {
        let value = json!({ "repair": repair, "checks": result.checks, "summary": result.summary });
        println!("{}", serde_json::to_string_pretty(&value)?);
        if result.summary.errors > 0 {
            std::process::exit(1);
        }
        return Ok(());
    }

    if let Some(repair) = &repair {
        output::success(&format!(
            "Plan {} ({:?}), {} meal(s) adopted",
            repair.plan_id, repair.plan_action, repair.meals_adopted
        ));
        for failure in &repair.failures {
            output::warning(&format!("Could not repair {}: {}", failure.target, failure.error));
        }
        println!();
    }

    println!("{}", "Plan Health Check".bold());
    println!();

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Check", "Status", "Message"]);

    for (check_name, check_result) in &result.checks {
        let status_cell = match check_result.status.as_str() {
            "pass" => Cell::new("PASS").fg(Color::Green),
            "warning" => Cell::new("WARN").fg(Color::Yellow),
            "error" => Cell::new("ERROR").fg(Color::Red),
            _ => Cell::new(&check_result.status),
        };

        table.add_row(vec![
            Cell::new(check_name),
            status_cell,
            Cell::new(&check_result.message),
        ]);

        if verbose {
            for detail in check_result.details.iter().flatten() {
                table.add_row(vec![
                    Cell::new(""),
                    Cell::new(""),
                    Cell::new(format!("  - {}", format_detail(detail))),
                ]);
            }
        }
    }

    println!("{}", table);
    println!();

    println!(
        "Summary: {} passed, {} warnings, {} errors",
        result.summary.passed.to_string().green(),
        result.summary.warnings.to_string().yellow(),
        result.summary.errors.to_string().red(),
    );

    if result.summary.errors > 0 {
        std::process::exit(1);
    }
    if !fix && result.summary.warnings > 0 {
        println!("{}", "Run `mp doctor --fix` to repair".dimmed());
    }

    Ok(())
}
