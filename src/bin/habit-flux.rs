//! Habit Flux CLI - Command-line interface for the habit engine
//!
//! Commands:
//! - streak: Compute streaks from an event log
//! - analytics: Aggregate window analytics
//! - level: Show level progress for an XP total
//! - badges: Evaluate badge rules for a user's stats
//! - replay: Replay an event log through a tracker and report profiles
//! - validate: Validate habit event input
//! - doctor: Diagnose configuration and snapshot health

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use habit_flux::analytics::AnalyticsAggregator;
use habit_flux::badges::BadgeEngine;
use habit_flux::encoder::{ReportEncoder, ReportKind};
use habit_flux::pipeline::{evaluate_badge_request, habit_streaks, parse_date, BadgeRequest, CheckIn};
use habit_flux::progression::ProgressionEngine;
use habit_flux::schema::{EventLogAdapter, SCHEMA_VERSION};
use habit_flux::types::{DateWindow, Habit, HabitEvent};
use habit_flux::{EngineConfig, EngineError, HabitTracker, MemoryStore, ENGINE_VERSION, PRODUCER_NAME};

/// Habit Flux - streaks, XP, badges and analytics for habit logs
#[derive(Parser)]
#[command(name = "habit-flux")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Compute streaks, progression, badges and analytics from habit logs", long_about = None)]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute current and longest streaks per habit
    Streak {
        /// Events file path (use - for stdin)
        #[arg(short, long)]
        events: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Habits file (JSON array) supplying streak policies
        #[arg(long)]
        habits: Option<PathBuf>,

        /// Reference date (YYYY-MM-DD), defaults to today (UTC)
        #[arg(long)]
        as_of: Option<String>,
    },

    /// Aggregate analytics over a date window
    Analytics {
        /// Habits file (JSON array)
        #[arg(long)]
        habits: PathBuf,

        /// Events file path (use - for stdin)
        #[arg(short, long)]
        events: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Last day of the window (YYYY-MM-DD), defaults to today (UTC)
        #[arg(long)]
        end: Option<String>,

        /// First day of the window; defaults to the configured window length
        #[arg(long)]
        start: Option<String>,
    },

    /// Show level progress for a cumulative XP total
    Level {
        /// Cumulative XP
        #[arg(long)]
        xp: u64,
    },

    /// Evaluate badge rules for a badge request (JSON)
    Badges {
        /// Request file path (use - for stdin)
        #[arg(short, long)]
        request: PathBuf,
    },

    /// Replay an event log through a tracker and print user profiles
    Replay {
        /// Habits file (JSON array)
        #[arg(long)]
        habits: PathBuf,

        /// Events file path (use - for stdin)
        #[arg(short, long)]
        events: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Save the tracker snapshot to file after replay
        #[arg(long)]
        save_snapshot: Option<PathBuf>,
    },

    /// Validate habit event input
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Habits file enabling habit-specific checks
        #[arg(long)]
        habits: Option<PathBuf>,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and snapshot health
    Doctor {
        /// Check a tracker snapshot file
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<(), HabitCliError> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Streak {
            events,
            input_format,
            habits,
            as_of,
        } => cmd_streak(&events, input_format, habits.as_deref(), as_of.as_deref()),
        Commands::Analytics {
            habits,
            events,
            input_format,
            end,
            start,
        } => cmd_analytics(
            &load_config(config_path)?,
            &habits,
            &events,
            input_format,
            start.as_deref(),
            end.as_deref(),
        ),
        Commands::Level { xp } => cmd_level(&load_config(config_path)?, xp),
        Commands::Badges { request } => cmd_badges(&load_config(config_path)?, &request),
        Commands::Replay {
            habits,
            events,
            input_format,
            save_snapshot,
        } => cmd_replay(
            load_config(config_path)?,
            &habits,
            &events,
            input_format,
            save_snapshot.as_deref(),
        ),
        Commands::Validate {
            input,
            input_format,
            habits,
            json,
        } => cmd_validate(&input, input_format, habits.as_deref(), json),
        Commands::Doctor { snapshot, json } => cmd_doctor(config_path, snapshot.as_deref(), json),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, HabitCliError> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            Ok(EngineConfig::from_file(path)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn read_input(path: &Path) -> Result<String, HabitCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn load_events(path: &Path, format: InputFormat) -> Result<Vec<HabitEvent>, HabitCliError> {
    let input = read_input(path)?;
    let events = match format {
        InputFormat::Ndjson => EventLogAdapter::parse_ndjson(&input)?,
        InputFormat::Json => EventLogAdapter::parse_array(&input)?,
    };
    Ok(events)
}

fn load_habits(path: Option<&Path>) -> Result<Vec<Habit>, HabitCliError> {
    match path {
        Some(path) => Ok(EventLogAdapter::parse_habits(&read_input(path)?)?),
        None => Ok(Vec::new()),
    }
}

fn date_or_today(input: Option<&str>) -> Result<NaiveDate, HabitCliError> {
    match input {
        Some(s) => Ok(parse_date(s)?),
        None => Ok(Utc::now().date_naive()),
    }
}

fn cmd_streak(
    events: &Path,
    input_format: InputFormat,
    habits: Option<&Path>,
    as_of: Option<&str>,
) -> Result<(), HabitCliError> {
    let as_of = date_or_today(as_of)?;
    let habits = load_habits(habits)?;
    let events = load_events(events, input_format)?;
    if events.is_empty() {
        return Err(HabitCliError::NoEvents);
    }
    let log = EventLogAdapter::to_event_log(events, &habits)?;
    let reports = habit_streaks(&log, &habits, as_of);

    println!("{}", ReportEncoder::new().encode_to_json(ReportKind::Streak, &reports)?);
    Ok(())
}

fn cmd_analytics(
    config: &EngineConfig,
    habits: &Path,
    events: &Path,
    input_format: InputFormat,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(), HabitCliError> {
    let end = date_or_today(end)?;
    let window = match start {
        Some(start) => DateWindow::new(parse_date(start)?, end),
        None => DateWindow::ending_on(end, config.analytics.default_window_days),
    };

    let habits = load_habits(Some(habits))?;
    let log = EventLogAdapter::to_event_log(load_events(events, input_format)?, &habits)?;
    let events: Vec<HabitEvent> = log.iter().cloned().collect();

    let report = AnalyticsAggregator::aggregate(&habits, &events, window);
    println!("{}", ReportEncoder::new().encode_to_json(ReportKind::Analytics, &report)?);
    Ok(())
}

fn cmd_level(config: &EngineConfig, xp: u64) -> Result<(), HabitCliError> {
    let progress = ProgressionEngine::new(&config.progression).level_progress(xp);
    println!("{}", ReportEncoder::new().encode_to_json(ReportKind::Level, &progress)?);
    Ok(())
}

fn cmd_badges(config: &EngineConfig, request: &Path) -> Result<(), HabitCliError> {
    let request: BadgeRequest = serde_json::from_str(&read_input(request)?)?;
    let engine = BadgeEngine::new(ProgressionEngine::new(&config.progression));
    let evaluation = evaluate_badge_request(&engine, request, Utc::now());
    println!("{}", ReportEncoder::new().encode_to_json(ReportKind::Badges, &evaluation)?);
    Ok(())
}

fn cmd_replay(
    config: EngineConfig,
    habits: &Path,
    events: &Path,
    input_format: InputFormat,
    save_snapshot: Option<&Path>,
) -> Result<(), HabitCliError> {
    let habits = load_habits(Some(habits))?;
    let mut events = load_events(events, input_format)?;
    if events.is_empty() {
        return Err(HabitCliError::NoEvents);
    }
    // Stable sort keeps arrival order within a day, so later writes still win
    events.sort_by_key(|e| e.date);

    let tracker = HabitTracker::with_config(MemoryStore::new(), config);
    let mut owners: BTreeMap<String, String> = BTreeMap::new();
    for habit in &habits {
        tracker.register_user(&habit.owner)?;
        tracker.register_habit(Habit {
            is_active: true,
            ..habit.clone()
        })?;
        owners.insert(habit.id.clone(), habit.owner.clone());
    }

    let mut applied = 0usize;
    let mut last_date = events[0].date;
    for event in events {
        let Some(owner) = owners.get(&event.habit_id) else {
            warn!(habit_id = %event.habit_id, "skipping event for unknown habit");
            continue;
        };
        let now = Utc.from_utc_datetime(&event.date.and_time(NaiveTime::MIN));
        last_date = last_date.max(event.date);
        let habit_id = event.habit_id.clone();
        tracker.check_in(owner, &habit_id, CheckIn::from(event), now)?;
        applied += 1;
    }

    for habit in habits.iter().filter(|h| !h.is_active) {
        tracker.deactivate_habit(&habit.owner, &habit.id)?;
    }

    let users: BTreeSet<&String> = owners.values().collect();
    let profiles = users
        .into_iter()
        .map(|user| tracker.profile(user, last_date))
        .collect::<Result<Vec<_>, _>>()?;

    info!(applied, users = profiles.len(), "replay finished");
    println!("{}", tracker.encoder().encode_to_json(ReportKind::Profile, &profiles)?);

    if let Some(path) = save_snapshot {
        fs::write(path, tracker.save_snapshot()?)?;
    }
    Ok(())
}

fn cmd_validate(
    input: &Path,
    input_format: InputFormat,
    habits: Option<&Path>,
    json: bool,
) -> Result<(), HabitCliError> {
    let habits = load_habits(habits)?;
    let events = load_events(input, input_format)?;

    // Validate each event
    let results = EventLogAdapter::validate_events(&events, &habits);

    let report = ValidationReport {
        total_events: events.len(),
        valid_events: events.len() - results.len(),
        invalid_events: results.len(),
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                habit_id: r.habit_id.clone(),
                date: r.date.clone(),
                error: r.result.as_ref().map(|e| e.to_string()).unwrap_or_default(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total events:   {}", report.total_events);
        println!("Valid events:   {}", report.valid_events);
        println!("Invalid events: {}", report.invalid_events);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - {} on {} (index {}): {}",
                    err.habit_id, err.date, err.index, err.error
                );
            }
        }
    }

    if report.invalid_events > 0 {
        Err(HabitCliError::ValidationFailed(report.invalid_events))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config: Option<&Path>, snapshot: Option<&Path>, json: bool) -> Result<(), HabitCliError> {
    let mut checks: Vec<DoctorCheck> = vec![
        DoctorCheck::ok("engine_version", format!("Habit Flux version {ENGINE_VERSION}")),
        DoctorCheck::ok("schema_version", format!("Input schema: {SCHEMA_VERSION}")),
    ];

    match config {
        Some(path) => checks.push(match EngineConfig::from_file(path) {
            Ok(config) => DoctorCheck::ok(
                "config",
                format!(
                    "Config valid (level step {} XP, {} XP per completion)",
                    config.progression.level_step_xp, config.rewards.xp_per_completion
                ),
            ),
            Err(e) => DoctorCheck::error("config", format!("Invalid config: {e}")),
        }),
        None => checks.push(DoctorCheck::ok("config", "Using built-in defaults".to_string())),
    }

    // Check snapshot file if provided
    if let Some(path) = snapshot {
        let check = if !path.exists() {
            DoctorCheck {
                name: "snapshot".to_string(),
                status: CheckStatus::Warning,
                message: "Snapshot file does not exist".to_string(),
            }
        } else {
            match fs::read_to_string(path).map_err(EngineError::from).and_then(|s| MemoryStore::from_json(&s)) {
                Ok(store) => match store.snapshot() {
                    Ok(state) => DoctorCheck::ok(
                        "snapshot",
                        format!(
                            "Snapshot valid ({} users, {} habits, {} events)",
                            state.progress.len(),
                            state.habits.len(),
                            state.events.len()
                        ),
                    ),
                    Err(e) => DoctorCheck::error("snapshot", e.to_string()),
                },
                Err(e) => DoctorCheck::error("snapshot", format!("Invalid snapshot: {e}")),
            }
        };
        checks.push(check);
    }

    // Check whether stdin is piped (for `-` inputs)
    let stdin_message = if atty::is(atty::Stream::Stdin) {
        "stdin is a TTY (interactive mode)"
    } else {
        "stdin is a pipe (ready for `-` input)"
    };
    checks.push(DoctorCheck::ok("stdin", stdin_message.to_string()));

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Habit Flux Doctor Report");
        println!("========================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(HabitCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

#[derive(serde::Serialize)]
struct ValidationReport {
    total_events: usize,
    valid_events: usize,
    invalid_events: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    habit_id: String,
    date: String,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

impl DoctorCheck {
    fn ok(name: &str, message: String) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message,
        }
    }

    fn error(name: &str, message: String) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message,
        }
    }
}

#[derive(serde::Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[derive(Debug)]
enum HabitCliError {
    Io(io::Error),
    Engine(EngineError),
    Json(serde_json::Error),
    NoEvents,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for HabitCliError {
    fn from(e: io::Error) -> Self {
        HabitCliError::Io(e)
    }
}

impl From<EngineError> for HabitCliError {
    fn from(e: EngineError) -> Self {
        HabitCliError::Engine(e)
    }
}

impl From<serde_json::Error> for HabitCliError {
    fn from(e: serde_json::Error) -> Self {
        HabitCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(code: &str, message: String, hint: &str) -> Self {
        Self {
            code: code.to_string(),
            message,
            hint: Some(hint.to_string()),
        }
    }
}

impl From<HabitCliError> for CliError {
    fn from(e: HabitCliError) -> Self {
        match e {
            HabitCliError::Io(e) => CliError::new("IO_ERROR", e.to_string(), "Check file paths and permissions"),
            HabitCliError::Json(e) => CliError::new("JSON_ERROR", e.to_string(), "Check JSON syntax"),
            HabitCliError::Engine(e) => engine_error(e),
            HabitCliError::NoEvents => CliError::new(
                "NO_EVENTS",
                "No events found in input".to_string(),
                "Ensure input file is not empty",
            ),
            HabitCliError::ValidationFailed(count) => CliError::new(
                "VALIDATION_FAILED",
                format!("{count} events failed validation"),
                "Fix validation errors and retry",
            ),
            HabitCliError::DoctorFailed => CliError::new(
                "DOCTOR_FAILED",
                "One or more health checks failed".to_string(),
                "Review the doctor report for details",
            ),
        }
    }
}

fn engine_error(e: EngineError) -> CliError {
    let message = e.to_string();
    match e {
        EngineError::Io(_) => CliError::new("IO_ERROR", message, "Check file paths and permissions"),
        EngineError::JsonError(_) | EngineError::ParseError(_) => CliError::new(
            "PARSE_ERROR",
            message,
            &format!("Ensure input matches the {SCHEMA_VERSION} schema"),
        ),
        EngineError::ConfigError(_) => CliError::new("CONFIG_ERROR", message, "Check the TOML passed to --config"),
        EngineError::DateParseError(_) => CliError::new("DATE_ERROR", message, "Dates use the YYYY-MM-DD format"),
        EngineError::InvalidEvent(_) => {
            CliError::new("VALIDATION_ERROR", message, "Run 'habit-flux validate' for details")
        }
        EngineError::HabitNotFound(_)
        | EngineError::UserNotFound(_)
        | EngineError::NotOwner { .. }
        | EngineError::InactiveHabit(_)
        | EngineError::DuplicateHabit(_) => {
            CliError::new("TRACKER_ERROR", message, "Check habit ids and owners in the habits file")
        }
        EngineError::LockPoisoned(_) | EngineError::EncodingError(_) => {
            CliError::new("ENGINE_ERROR", message, "Re-run with --verbose for details")
        }
    }
}
