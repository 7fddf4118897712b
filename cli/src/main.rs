mod ai;
mod commands;
mod config;
mod server;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::ai::AiClient;
use crate::commands::{
    FoodArgs, PrefsUpdate, ProfileArgs, WeightArgs, cmd_exercise_add, cmd_exercise_parse,
    cmd_exercise_remove, cmd_food_add, cmd_food_remove, cmd_history, cmd_insight_import,
    cmd_insight_show, cmd_note, cmd_plan, cmd_prefs_set, cmd_prefs_show, cmd_profile_set,
    cmd_profile_show, cmd_reset, cmd_safety_check, cmd_safety_list, cmd_stats, cmd_summary,
    cmd_weight_history, cmd_weight_log,
};
use crate::config::Config;
use slimify_core::models::{
    ActivityLevel, HeightUnit, Intensity, MealType, Sex, Theme, ViolationType, WeightUnit,
};
use slimify_core::service::{RECENT_WEIGHT_LIMIT, TrackerService};

#[derive(Parser)]
#[command(
    name = "slimify",
    version,
    about = "A local-first calorie and exercise tracker",
    long_about = "Track food, exercise and weight against a zigzag calorie plan.\n\
                  Everything is stored locally; AI parsing of exercise descriptions is optional."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or show your profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Show this week's calorie plan
    Plan {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log or remove food for today
    Food {
        #[command(subcommand)]
        command: FoodCommands,
    },
    /// Log or remove exercise for today
    Exercise {
        #[command(subcommand)]
        command: ExerciseCommands,
    },
    /// Show a day's log (defaults to today)
    Summary {
        /// Date to show (YYYY-MM-DD or today/yesterday, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Attach a note to a day's log (empty text clears it)
    Note {
        text: String,
        /// Date (YYYY-MM-DD or today/yesterday, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show daily totals for the last N days
    History {
        /// Number of days to show
        #[arg(short, long, default_value = "7")]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show weekly averages and adherence
    Stats {
        /// Any date in the week to show (default: this week)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Track body weight
    Weight {
        #[command(subcommand)]
        command: WeightCommands,
    },
    /// Check today against the safety thresholds
    Safety {
        #[command(subcommand)]
        command: SafetyCommands,
    },
    /// Show or change preferences
    Prefs {
        #[command(subcommand)]
        command: PrefsCommands,
    },
    /// Monthly summaries
    Insight {
        #[command(subcommand)]
        command: InsightCommands,
    },
    /// Delete all stored data
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the HTTP API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Save your profile and generate this week's plan
    Set {
        /// Age in years
        #[arg(long)]
        age: u32,
        /// Current weight, in your preferred unit
        #[arg(long)]
        weight: f64,
        /// Height, in your preferred unit
        #[arg(long)]
        height: f64,
        /// sedentary, light, moderate or active
        #[arg(long, default_value = "moderate")]
        activity: ActivityLevel,
        /// male or female
        #[arg(long)]
        sex: Sex,
        /// Goal weight, in your preferred unit
        #[arg(long)]
        target_weight: f64,
        /// Pounds per week to lose (0.5 to 2.0)
        #[arg(long, default_value = "1.0")]
        goal: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show your profile and calorie math
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum FoodCommands {
    /// Log a food
    Add {
        /// Food name
        name: String,
        /// Calories
        calories: i64,
        /// Meal type: breakfast, lunch, dinner, snack
        #[arg(short, long)]
        meal: Option<MealType>,
        /// Protein in grams
        #[arg(long)]
        protein: Option<f64>,
        /// Carbs in grams
        #[arg(long)]
        carbs: Option<f64>,
        /// Fat in grams
        #[arg(long)]
        fat: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a food entry from today by ID or ID prefix
    Remove {
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ExerciseCommands {
    /// Log exercise
    Add {
        /// Activity, e.g. running, cycling, yoga
        activity: String,
        /// Duration in minutes
        minutes: u32,
        /// light, moderate or intense
        #[arg(short, long, default_value = "moderate")]
        intensity: Intensity,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Describe exercise in plain words and let the AI provider log it
    Parse {
        /// e.g. "45 minutes of hard cycling"
        input: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove an exercise entry from today by ID or ID prefix
    Remove {
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WeightCommands {
    /// Record a weigh-in
    Log {
        /// Weight value
        value: f64,
        /// lbs or kg (default: your preferred unit)
        #[arg(short, long)]
        unit: Option<WeightUnit>,
        /// Date (YYYY-MM-DD or today/yesterday, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Body fat percentage
        #[arg(long)]
        body_fat: Option<f64>,
        /// Optional notes
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recent weigh-ins
    History {
        /// Number of entries to show
        #[arg(short, long, default_value_t = RECENT_WEIGHT_LIMIT)]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SafetyCommands {
    /// Evaluate today's intake and exercise
    Check {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recorded violations, newest first
    List {
        /// lowCalories, excessiveExercise or rapidWeightLoss
        #[arg(long = "type")]
        kind: Option<ViolationType>,
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PrefsCommands {
    /// Show current preferences
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change preferences; unset flags keep their value
    Set {
        /// light, dark or system
        #[arg(long)]
        theme: Option<Theme>,
        /// Enable or disable reminders
        #[arg(long)]
        notifications: Option<bool>,
        /// lbs or kg
        #[arg(long)]
        weight_unit: Option<WeightUnit>,
        /// inches or cm
        #[arg(long)]
        height_unit: Option<HeightUnit>,
        /// Breakfast reminder (HH:MM, empty to clear)
        #[arg(long)]
        breakfast: Option<String>,
        /// Lunch reminder (HH:MM, empty to clear)
        #[arg(long)]
        lunch: Option<String>,
        /// Dinner reminder (HH:MM, empty to clear)
        #[arg(long)]
        dinner: Option<String>,
        /// Weigh-in reminder (HH:MM, empty to clear)
        #[arg(long)]
        weigh: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum InsightCommands {
    /// Show the summary for a month
    Show {
        /// Month (YYYY-MM)
        month: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Store a month summary from a JSON file
    Import {
        /// Path to the JSON file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// `RUST_LOG` wins; otherwise `default` for this crate and the core library.
fn init_tracing(default: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("slimify={default},slimify_core={default}"))
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Before tracing, so RUST_LOG may come from .env.
    let dotenv = config::load_dotenv();
    let level = if matches!(cli.command, Commands::Serve { .. }) {
        "info"
    } else {
        "warn"
    };
    init_tracing(level);
    match dotenv {
        Ok(Some(path)) => tracing::debug!(path = %path.display(), "loaded .env"),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "failed to read .env"),
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let service = Arc::new(TrackerService::open(config.db_path.clone()));
    service
        .initialize()
        .await
        .with_context(|| format!("Failed to open {}", config.db_path.display()))?;

    match cli.command {
        Commands::Profile { command } => match command {
            ProfileCommands::Set {
                age,
                weight,
                height,
                activity,
                sex,
                target_weight,
                goal,
                json,
            } => {
                let args = ProfileArgs {
                    age,
                    weight,
                    height,
                    activity,
                    sex,
                    target_weight,
                    goal,
                };
                cmd_profile_set(&service, args, json).await
            }
            ProfileCommands::Show { json } => cmd_profile_show(&service, json),
        },
        Commands::Plan { json } => cmd_plan(&service, json).await,
        Commands::Food { command } => match command {
            FoodCommands::Add {
                name,
                calories,
                meal,
                protein,
                carbs,
                fat,
                json,
            } => {
                let args = FoodArgs {
                    name,
                    calories,
                    meal,
                    protein,
                    carbs,
                    fat,
                };
                cmd_food_add(&service, args, json).await
            }
            FoodCommands::Remove { id, json } => cmd_food_remove(&service, &id, json).await,
        },
        Commands::Exercise { command } => match command {
            ExerciseCommands::Add {
                activity,
                minutes,
                intensity,
                json,
            } => cmd_exercise_add(&service, activity, minutes, intensity, json).await,
            ExerciseCommands::Parse { input, json } => {
                let client = AiClient::new(config.ai.clone())?;
                cmd_exercise_parse(&service, &client, &input, json).await
            }
            ExerciseCommands::Remove { id, json } => {
                cmd_exercise_remove(&service, &id, json).await
            }
        },
        Commands::Summary { date, json } => cmd_summary(&service, date, json).await,
        Commands::Note { text, date, json } => cmd_note(&service, text, date, json).await,
        Commands::History { days, json } => cmd_history(&service, days, json).await,
        Commands::Stats { date, json } => cmd_stats(&service, date, json).await,
        Commands::Weight { command } => match command {
            WeightCommands::Log {
                value,
                unit,
                date,
                body_fat,
                notes,
                json,
            } => {
                let args = WeightArgs {
                    value,
                    unit,
                    date,
                    body_fat,
                    notes,
                };
                cmd_weight_log(&service, args, json).await
            }
            WeightCommands::History { limit, json } => {
                cmd_weight_history(&service, limit, json).await
            }
        },
        Commands::Safety { command } => match command {
            SafetyCommands::Check { json } => cmd_safety_check(&service, json).await,
            SafetyCommands::List { kind, limit, json } => {
                cmd_safety_list(&service, kind, limit, json).await
            }
        },
        Commands::Prefs { command } => match command {
            PrefsCommands::Show { json } => cmd_prefs_show(&service, json),
            PrefsCommands::Set {
                theme,
                notifications,
                weight_unit,
                height_unit,
                breakfast,
                lunch,
                dinner,
                weigh,
                json,
            } => {
                let update = PrefsUpdate {
                    theme,
                    notifications,
                    weight_unit,
                    height_unit,
                    breakfast,
                    lunch,
                    dinner,
                    weigh,
                };
                cmd_prefs_set(&service, update, json).await
            }
        },
        Commands::Insight { command } => match command {
            InsightCommands::Show { month, json } => cmd_insight_show(&service, &month, json).await,
            InsightCommands::Import { file, json } => {
                cmd_insight_import(&service, &file, json).await
            }
        },
        Commands::Reset { yes, json } => cmd_reset(&service, yes, json).await,
        Commands::Serve { port, bind } => {
            let client = AiClient::new(config.ai.clone())?;
            server::start_server(service, Arc::new(client), &config.ai, port, &bind).await
        }
    }
}
