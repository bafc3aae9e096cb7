//! Mealplan CLI - a shared weekly meal planner in your terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{auth, doctor, meal, plan, share, shared};

/// Mealplan - plan lunches and dinners for the week, together
#[derive(Parser)]
#[command(name = "mp", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account (and its plan)
    Signup {
        email: String,
        /// Password (prompted when omitted)
        #[arg(long, env = "MEALPLAN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Sign in
    Login {
        email: String,
        /// Password (prompted when omitted)
        #[arg(long, env = "MEALPLAN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Sign out
    Logout,

    /// Show the signed-in user and active plan
    Whoami {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List and select plans
    Plan {
        #[command(subcommand)]
        command: plan::PlanCommands,
    },

    /// Manage meals of the active plan
    Meal {
        #[command(subcommand)]
        command: meal::MealCommands,
    },

    /// Manage who the active plan is shared with
    Share {
        #[command(subcommand)]
        command: share::ShareCommands,
    },

    /// Show meals from plans shared with you
    Shared {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check (and optionally repair) your plan data
    Doctor {
        /// Repair what can be repaired
        #[arg(long)]
        fix: bool,
        /// Show verbose output
        #[arg(long, short)]
        verbose: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Signup { email, password } => auth::signup(&email, password).await,
        Commands::Login { email, password } => auth::login(&email, password).await,
        Commands::Logout => auth::logout().await,
        Commands::Whoami { json } => auth::whoami(json).await,
        Commands::Plan { command } => plan::run(command).await,
        Commands::Meal { command } => meal::run(command).await,
        Commands::Share { command } => share::run(command).await,
        Commands::Shared { json } => shared::run(json).await,
        Commands::Doctor { fix, verbose, json } => doctor::run(fix, verbose, json).await,
    }
}

/// Log to stderr. Filter: MEALPLAN_LOG, else the configured logLevel, else warn.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("MEALPLAN_LOG").unwrap_or_else(|_| {
        let level = commands::get_data_dir()
            .ok()
            .and_then(|dir| mealplan_core::config::Config::load(&dir).ok())
            .and_then(|config| config.log_level)
            .unwrap_or_else(|| "warn".to_string());
        EnvFilter::new(level)
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
