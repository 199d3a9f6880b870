mod commands;
mod config;
mod googlefit;
mod objects;
mod server;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{
    TrackWrite, cmd_meal_delete, cmd_meal_image, cmd_meal_list, cmd_meal_log, cmd_profile_photo,
    cmd_profile_set, cmd_profile_show, cmd_range, cmd_steps_reading, cmd_summary, cmd_sync,
    cmd_track_delete, cmd_track_list, cmd_track_show, cmd_track_write, cmd_water_goal_from_profile,
    cmd_water_goal_set, cmd_water_goal_show, cmd_water_history, cmd_water_log, cmd_water_today,
    cmd_water_undo, cmd_workout_delete, cmd_workout_list, cmd_workout_log, cmd_workout_show,
};
use crate::config::Config;
use crate::googlefit::GoogleFitClient;
use crate::objects::LocalObjectStore;
use fitpulse_core::FitpulseService;
use fitpulse_core::models::{ActivityInput, MealInput, ProfileInput, UserId, WorkoutUpdate};
use fitpulse_core::provider::ActivityProvider;

const DEFAULT_PUBLIC_URL: &str = "http://127.0.0.1:8080";

#[derive(Parser)]
#[command(
    name = "fitpulse",
    version,
    about = "Daily hydration, nutrition, steps and workout tracker"
)]
struct Cli {
    /// User to act as
    #[arg(short, long, global = true, env = "FITPULSE_USER", default_value = "me")]
    user: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the daily completion summary (defaults to today)
    Summary {
        /// Date to show (YYYY-MM-DD, today, yesterday)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show completion summaries for a date range (default: last 7 days)
    Range {
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,
        /// Last day (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record a cumulative device step counter reading
    Steps {
        /// Counter total reported by the device
        total: i64,
        /// When the reading was taken (RFC 3339, default: now)
        #[arg(long)]
        at: Option<String>,
        /// UTC offset for the reading's day (e.g. +05:30)
        #[arg(long)]
        tz: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Pull activity from Google Fit and replace the covered days
    Sync {
        /// Window start (RFC 3339, default: start of the day 6 days ago)
        #[arg(long)]
        since: Option<String>,
        /// Window end (RFC 3339, default: now)
        #[arg(long)]
        until: Option<String>,
        /// Aggregation bucket size in seconds
        #[arg(long)]
        bucket_seconds: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log water and manage the hydration goal
    Water {
        #[command(subcommand)]
        command: WaterCommands,
    },
    /// Manage the body profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Log and list meals
    Meal {
        #[command(subcommand)]
        command: MealCommands,
    },
    /// Manage daily activity tracks
    Track {
        #[command(subcommand)]
        command: TrackCommands,
    },
    /// Record workout time
    Workout {
        #[command(subcommand)]
        command: WorkoutCommands,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Base URL used in signed image links (default: http://BIND:PORT)
        #[arg(long, env = "FITPULSE_PUBLIC_URL")]
        public_url: Option<String>,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum WaterCommands {
    /// Log one or more amounts in ml
    Log {
        /// Amounts in ml (e.g. 250 500)
        #[arg(required = true)]
        amounts: Vec<i64>,
        #[arg(long)]
        json: bool,
    },
    /// Remove today's most recent log
    Undo {
        #[arg(long)]
        json: bool,
    },
    /// Show today's progress and logs
    Today {
        #[arg(long)]
        json: bool,
    },
    /// Show daily hydration records (default: last 14 days)
    History {
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show or change the daily goal
    Goal {
        #[command(subcommand)]
        command: WaterGoalCommands,
    },
}

#[derive(Subcommand)]
enum WaterGoalCommands {
    /// Show the active goal and the profile suggestion
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Set the daily goal in ml
    Set {
        daily_ml: i64,
        #[arg(long)]
        json: bool,
    },
    /// Set the goal from the body profile's weight and BMI
    FromProfile {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show the body profile
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Create or update the body profile
    Set {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        age: Option<i64>,
        /// male, female, other, prefer_not_to_say
        #[arg(long)]
        gender: Option<String>,
        /// Height in cm
        #[arg(long)]
        height: Option<f64>,
        /// Weight in kg
        #[arg(long)]
        weight: Option<f64>,
        /// Fail if a profile already exists
        #[arg(long)]
        create: bool,
        #[arg(long)]
        json: bool,
    },
    /// Upload a profile photo
    Photo {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum MealCommands {
    /// Log a meal entry
    Log {
        /// Food name
        food: String,
        /// Calories (kcal)
        calories: f64,
        /// Meal type: breakfast, lunch, dinner, snack
        #[arg(short, long, default_value = "snack")]
        meal: String,
        #[arg(long, default_value = "0")]
        protein: f64,
        #[arg(long, default_value = "0")]
        carbs: f64,
        #[arg(long, default_value = "0")]
        fat: f64,
        #[arg(long, default_value = "0")]
        fiber: f64,
        #[arg(long)]
        quantity: Option<f64>,
        #[arg(long)]
        unit: Option<String>,
        /// Date to log for (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List a day's meals with totals
    List {
        date: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Delete a meal entry by ID
    Delete {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Attach a photo to a meal entry
    Image {
        id: i64,
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct TrackFields {
    #[arg(long)]
    steps: Option<i64>,
    /// Distance in meters
    #[arg(long)]
    distance: Option<f64>,
    /// Calories burned (kcal)
    #[arg(long)]
    calories: Option<f64>,
    /// Active time in minutes
    #[arg(long)]
    minutes: Option<i64>,
    #[arg(long)]
    source: Option<String>,
}

impl From<TrackFields> for ActivityInput {
    fn from(f: TrackFields) -> Self {
        Self {
            steps: f.steps,
            distance_m: f.distance,
            calories_kcal: f.calories,
            active_seconds: f.minutes.map(|m| m * 60),
            source: f.source,
        }
    }
}

#[derive(Subcommand)]
enum TrackCommands {
    /// Show one day's track
    Show {
        date: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List tracks (default: last 7 days)
    List {
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        json: bool,
    },
    /// Replace a day's track (or only the given fields with --patch)
    Set {
        #[arg(long)]
        date: Option<String>,
        #[command(flatten)]
        fields: TrackFields,
        /// Keep fields that are not given
        #[arg(long)]
        patch: bool,
        #[arg(long)]
        json: bool,
    },
    /// Add amounts onto a day's track
    Add {
        #[arg(long)]
        date: Option<String>,
        #[command(flatten)]
        fields: TrackFields,
        #[arg(long)]
        json: bool,
    },
    /// Delete a day's track
    Delete {
        date: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WorkoutCommands {
    /// Record workout time for a day
    Log {
        /// Total minutes for the day
        #[arg(long)]
        minutes: Option<i64>,
        /// Mark the workout done regardless of time
        #[arg(long)]
        done: bool,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show one day's workout
    Show {
        date: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List workouts (default: last 7 days)
    List {
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Delete a day's workout
    Delete {
        date: String,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(if matches!(cli.command, Commands::Serve { .. }) {
        "info"
    } else {
        "warn"
    });

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// `FITPULSE_LOG` wins over `RUST_LOG`; logs go to stderr so `--json` output stays clean.
fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_env("FITPULSE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn open_service(config: &Config, public_url: &str) -> Result<(FitpulseService, Arc<LocalObjectStore>)> {
    let db_path = config.db_path.to_string_lossy();
    let objects = Arc::new(LocalObjectStore::new(
        config.objects_dir.clone(),
        public_url,
        config.load_or_create_signing_secret()?,
    ));
    let service =
        FitpulseService::new(&db_path, config.settings.clone())?.with_object_store(objects.clone());
    Ok((service, objects))
}

fn google_fit(config: &Config) -> Result<Option<Arc<dyn ActivityProvider>>> {
    config
        .google_fit_token
        .clone()
        .map(|token| Ok(Arc::new(GoogleFitClient::new(token)?) as Arc<dyn ActivityProvider>))
        .transpose()
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let user = UserId::parse(&cli.user)?;

    let public_url = match &cli.command {
        Commands::Serve {
            port,
            bind,
            public_url,
            ..
        } => public_url
            .clone()
            .unwrap_or_else(|| format!("http://{bind}:{port}")),
        _ => DEFAULT_PUBLIC_URL.to_string(),
    };
    let (service, objects) = open_service(&config, &public_url)?;
    let service = Arc::new(service);
    let svc = service.as_ref();
    let user = &user;

    match cli.command {
        Commands::Summary { date, json } => cmd_summary(svc, user, date, json).await,
        Commands::Range { start, end, json } => cmd_range(svc, user, start, end, json).await,
        Commands::Steps { total, at, tz, json } => {
            cmd_steps_reading(svc, user, total, at, tz, json).await
        }
        Commands::Sync {
            since,
            until,
            bucket_seconds,
            json,
        } => {
            let provider = google_fit(&config)?
                .context("Google Fit is not configured. Set FITPULSE_GOOGLE_FIT_TOKEN")?;
            cmd_sync(svc, provider.as_ref(), user, since, until, bucket_seconds, json).await
        }
        Commands::Water { command } => match command {
            WaterCommands::Log { amounts, json } => cmd_water_log(svc, user, amounts, json).await,
            WaterCommands::Undo { json } => cmd_water_undo(svc, user, json).await,
            WaterCommands::Today { json } => cmd_water_today(svc, user, json).await,
            WaterCommands::History { start, end, json } => {
                cmd_water_history(svc, user, start, end, json).await
            }
            WaterCommands::Goal { command } => match command {
                WaterGoalCommands::Show { json } => cmd_water_goal_show(svc, user, json).await,
                WaterGoalCommands::Set { daily_ml, json } => {
                    cmd_water_goal_set(svc, user, daily_ml, json).await
                }
                WaterGoalCommands::FromProfile { json } => {
                    cmd_water_goal_from_profile(svc, user, json).await
                }
            },
        },
        Commands::Profile { command } => match command {
            ProfileCommands::Show { json } => cmd_profile_show(svc, user, json).await,
            ProfileCommands::Set {
                name,
                age,
                gender,
                height,
                weight,
                create,
                json,
            } => {
                let input = ProfileInput {
                    name,
                    age,
                    gender,
                    height_cm: height,
                    weight_kg: weight,
                };
                cmd_profile_set(svc, user, input, create, json).await
            }
            ProfileCommands::Photo { path, json } => cmd_profile_photo(svc, user, &path, json).await,
        },
        Commands::Meal { command } => match command {
            MealCommands::Log {
                food,
                calories,
                meal,
                protein,
                carbs,
                fat,
                fiber,
                quantity,
                unit,
                date,
                json,
            } => {
                let input = MealInput {
                    meal_type: meal,
                    food_name: food,
                    quantity,
                    unit,
                    calories,
                    protein_g: protein,
                    carbs_g: carbs,
                    fat_g: fat,
                    fiber_g: fiber,
                    eaten_at: None,
                    day: None,
                };
                cmd_meal_log(svc, user, input, date, json).await
            }
            MealCommands::List { date, json } => cmd_meal_list(svc, user, date, json).await,
            MealCommands::Delete { id, json } => cmd_meal_delete(svc, user, id, json).await,
            MealCommands::Image { id, path, json } => {
                cmd_meal_image(svc, user, id, &path, json).await
            }
        },
        Commands::Track { command } => match command {
            TrackCommands::Show { date, json } => cmd_track_show(svc, user, date, json).await,
            TrackCommands::List {
                start,
                end,
                limit,
                json,
            } => cmd_track_list(svc, user, start, end, limit, json).await,
            TrackCommands::Set {
                date,
                fields,
                patch,
                json,
            } => {
                let mode = if patch { TrackWrite::Patch } else { TrackWrite::Replace };
                cmd_track_write(svc, user, date, fields.into(), mode, json).await
            }
            TrackCommands::Add { date, fields, json } => {
                cmd_track_write(svc, user, date, fields.into(), TrackWrite::Add, json).await
            }
            TrackCommands::Delete { date, json } => cmd_track_delete(svc, user, &date, json).await,
        },
        Commands::Workout { command } => match command {
            WorkoutCommands::Log {
                minutes,
                done,
                notes,
                date,
                json,
            } => {
                let update = WorkoutUpdate {
                    total_seconds: minutes.map(|m| m * 60),
                    is_completed: done.then_some(true),
                    notes,
                };
                cmd_workout_log(svc, user, date, update, json).await
            }
            WorkoutCommands::Show { date, json } => cmd_workout_show(svc, user, date, json).await,
            WorkoutCommands::List { start, end, json } => {
                cmd_workout_list(svc, user, start, end, json).await
            }
            WorkoutCommands::Delete { date, json } => {
                cmd_workout_delete(svc, user, &date, json).await
            }
        },
        Commands::Serve {
            port,
            bind,
            no_auth,
            ..
        } => {
            let api_key = if no_auth {
                None
            } else {
                Some(config.load_or_create_api_key()?.0)
            };
            let state = server::AppState {
                service: service.clone(),
                api_key,
                objects: Some(objects),
                google_fit: google_fit(&config)?,
            };
            server::start_server(state, port, &bind).await
        }
    }
}
