mod commands;
mod config;
mod server;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    FoodArgs, FoodUpdateArgs, TargetArgs, WorkoutArgs, WorkoutUpdateArgs, cmd_day,
    cmd_food_add, cmd_food_delete, cmd_food_list, cmd_food_update, cmd_history, cmd_pin,
    cmd_recalc, cmd_target_daily, cmd_target_set, cmd_target_show, cmd_unpin, cmd_workout_add,
    cmd_workout_delete, cmd_workout_list, cmd_workout_update,
};
use crate::config::Config;
use fuel_core::service::FuelService;

/// Log filter variable, checked before `RUST_LOG`.
const LOG_ENV: &str = "FUEL_LOG";

#[derive(Parser)]
#[command(
    name = "fuel",
    version,
    about = "Daily calorie budget tracker: food, workouts and what's left"
)]
struct Cli {
    /// User the command acts on
    #[arg(long, global = true, env = "FUEL_USER", default_value = "local")]
    user: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log and manage food entries
    Food {
        #[command(subcommand)]
        command: FoodCommands,
    },
    /// Log and manage workouts
    Workout {
        #[command(subcommand)]
        command: WorkoutCommands,
    },
    /// Show a day: totals, target and entries (defaults to today)
    Day {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recompute a day's totals from its entries
    Recalc {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Pin the remaining calories for a day
    Pin {
        /// Value to pin (default: the current remaining)
        #[arg(allow_negative_numbers = true)]
        value: Option<f64>,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a pin and recompute remaining
    Unpin {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show totals for the last N days
    History {
        /// Number of days to show
        #[arg(short, long, default_value = "7")]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage calorie/macro targets
    Target {
        #[command(subcommand)]
        command: TargetCommands,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum FoodCommands {
    /// Log a food entry
    Add {
        /// Food name
        name: String,
        /// Calories
        #[arg(short, long)]
        calories: Option<f64>,
        /// Meal type: breakfast, lunch, dinner, snack
        #[arg(short, long, default_value = "snack")]
        meal: String,
        /// Protein in grams
        #[arg(long)]
        protein: Option<f64>,
        /// Carbs in grams
        #[arg(long)]
        carbs: Option<f64>,
        /// Fat in grams
        #[arg(long)]
        fat: Option<f64>,
        /// Entry source: manual, ai, plan, import
        #[arg(long, default_value = "manual")]
        source: String,
        /// Date to log for (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List food entries for a day
    List {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update a food entry. Amounts accept `none` to clear them.
    Update {
        /// Entry ID
        id: i64,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New meal type
        #[arg(long)]
        meal: Option<String>,
        /// New calories
        #[arg(long)]
        calories: Option<String>,
        /// New protein in grams
        #[arg(long)]
        protein: Option<String>,
        /// New carbs in grams
        #[arg(long)]
        carbs: Option<String>,
        /// New fat in grams
        #[arg(long)]
        fat: Option<String>,
        /// Move the entry to another date
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a food entry
    Delete {
        /// Entry ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WorkoutCommands {
    /// Log a workout
    Add {
        /// Workout name
        name: String,
        /// Calories burned
        #[arg(short, long)]
        calories: Option<f64>,
        /// Duration in minutes
        #[arg(short, long)]
        duration: Option<f64>,
        /// Entry source: manual, ai, plan, import
        #[arg(long, default_value = "manual")]
        source: String,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List workouts for a day
    List {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update a workout. Amounts accept `none` to clear them.
    Update {
        /// Workout ID
        id: i64,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New calories burned
        #[arg(long)]
        calories: Option<String>,
        /// New duration in minutes
        #[arg(long)]
        duration: Option<String>,
        /// Move the workout to another date
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a workout
    Delete {
        /// Workout ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct TargetFields {
    /// Daily calorie target
    calories: f64,
    /// Protein in grams
    #[arg(long)]
    protein: Option<f64>,
    /// Carbs in grams
    #[arg(long)]
    carbs: Option<f64>,
    /// Fat in grams
    #[arg(long)]
    fat: Option<f64>,
    /// Short name, e.g. "Cut" or "Rest day"
    #[arg(long)]
    label: Option<String>,
    /// Why this target was chosen
    #[arg(long)]
    rationale: Option<String>,
    /// Mark as a suggested rather than manual target
    #[arg(long)]
    suggested: bool,
}

impl From<TargetFields> for TargetArgs {
    fn from(f: TargetFields) -> Self {
        TargetArgs {
            calories: f.calories,
            protein: f.protein,
            carbs: f.carbs,
            fat: f.fat,
            label: f.label,
            rationale: f.rationale,
            suggested: f.suggested,
        }
    }
}

#[derive(Subcommand)]
enum TargetCommands {
    /// Set the standing target used by days without one of their own
    Set {
        #[command(flatten)]
        fields: TargetFields,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the target for a single date
    Daily {
        #[command(flatten)]
        fields: TargetFields,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the effective target for a date and the standing target history
    Show {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(default_filter: &str) {
    let log_env = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_filter.to_string());
    let env_filter =
        EnvFilter::try_new(&log_env).unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(env_filter)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let default_filter = if matches!(cli.command, Commands::Serve { .. }) {
        "info"
    } else {
        "warn"
    };
    init_tracing(default_filter);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db_path = config
        .db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    let service = FuelService::new(db_path)?;
    tracing::debug!(db = %config.db_path.display(), "database opened");
    let user = cli.user.as_str();

    match cli.command {
        Commands::Food { command } => match command {
            FoodCommands::Add {
                name,
                calories,
                meal,
                protein,
                carbs,
                fat,
                source,
                date,
                json,
            } => {
                let args = FoodArgs {
                    name,
                    meal,
                    calories,
                    protein,
                    carbs,
                    fat,
                    source,
                    date,
                };
                cmd_food_add(&service, user, args, json).await
            }
            FoodCommands::List { date, json } => cmd_food_list(&service, user, date, json),
            FoodCommands::Update {
                id,
                name,
                meal,
                calories,
                protein,
                carbs,
                fat,
                date,
                json,
            } => {
                let args = FoodUpdateArgs {
                    name,
                    meal,
                    calories,
                    protein,
                    carbs,
                    fat,
                    date,
                };
                cmd_food_update(&service, user, id, args, json).await
            }
            FoodCommands::Delete { id, json } => cmd_food_delete(&service, user, id, json).await,
        },
        Commands::Workout { command } => match command {
            WorkoutCommands::Add {
                name,
                calories,
                duration,
                source,
                date,
                json,
            } => {
                let args = WorkoutArgs {
                    name,
                    duration,
                    calories,
                    source,
                    date,
                };
                cmd_workout_add(&service, user, args, json).await
            }
            WorkoutCommands::List { date, json } => cmd_workout_list(&service, user, date, json),
            WorkoutCommands::Update {
                id,
                name,
                calories,
                duration,
                date,
                json,
            } => {
                let args = WorkoutUpdateArgs {
                    name,
                    duration,
                    calories,
                    date,
                };
                cmd_workout_update(&service, user, id, args, json).await
            }
            WorkoutCommands::Delete { id, json } => {
                cmd_workout_delete(&service, user, id, json).await
            }
        },
        Commands::Day { date, json } => cmd_day(&service, user, date, json).await,
        Commands::Recalc { date, json } => cmd_recalc(&service, user, date, json).await,
        Commands::Pin { value, date, json } => cmd_pin(&service, user, value, date, json).await,
        Commands::Unpin { date, json } => cmd_unpin(&service, user, date, json).await,
        Commands::History { days, json } => cmd_history(&service, user, days, json).await,
        Commands::Target { command } => match command {
            TargetCommands::Set { fields, json } => {
                cmd_target_set(&service, user, fields.into(), json)
            }
            TargetCommands::Daily { fields, date, json } => {
                cmd_target_daily(&service, user, date, fields.into(), json).await
            }
            TargetCommands::Show { date, json } => cmd_target_show(&service, user, date, json).await,
        },
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                let (key, _new) = config.load_or_create_api_key()?;
                Some(key)
            };
            server::start_server(service, port, &bind, api_key).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_user_flag_is_global() {
        let cli = Cli::try_parse_from(["fuel", "day", "2024-01-05", "--user", "alice"]).unwrap();
        assert_eq!(cli.user, "alice");
        assert!(matches!(cli.command, Commands::Day { .. }));
    }

    #[test]
    fn test_pin_accepts_negative_value() {
        let cli = Cli::try_parse_from(["fuel", "pin", "-150", "--date", "2024-01-05"]).unwrap();
        match cli.command {
            Commands::Pin { value, date, .. } => {
                assert_eq!(value, Some(-150.0));
                assert_eq!(date.as_deref(), Some("2024-01-05"));
            }
            _ => panic!("expected pin"),
        }
    }

    #[test]
    fn test_target_daily_parses_fields() {
        let cli = Cli::try_parse_from([
            "fuel", "target", "daily", "1800", "--protein", "140", "--date", "today",
        ])
        .unwrap();
        match cli.command {
            Commands::Target {
                command: TargetCommands::Daily { fields, date, .. },
            } => {
                assert!((fields.calories - 1800.0).abs() < f64::EPSILON);
                assert_eq!(fields.protein, Some(140.0));
                assert_eq!(date.as_deref(), Some("today"));
            }
            _ => panic!("expected target daily"),
        }
    }
}
