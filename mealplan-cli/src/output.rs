//! Output formatting utilities

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use mealplan_core::MealCategory;

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// A lunch or dinner cell, colored by category. Empty dishes show a dash.
pub fn dish_cell(text: &str, category: MealCategory) -> Cell {
    if text.trim().is_empty() {
        return Cell::new("-").fg(Color::DarkGrey);
    }
    let color = match category {
        MealCategory::Vegetarian => Color::Green,
        MealCategory::Fish => Color::Blue,
        MealCategory::Meat => Color::Red,
        MealCategory::Legumes => Color::Yellow,
        MealCategory::Soup => Color::Cyan,
        MealCategory::Other => Color::Reset,
    };
    Cell::new(format!("{} ({})", text, category)).fg(color)
}
