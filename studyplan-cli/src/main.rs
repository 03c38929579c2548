use anyhow::{Context, Result, bail};
use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use studyplan_core::time::{local_date, parse_local_deadline_to_utc};
use studyplan_core::{
    Assignment, ItemKind, LoadOutcome, PlannedDay, RegenerationController, ScheduleItem, TraceLog,
    estimate, generate_week, inputs_from_assignments, priority,
};
use tracing::info;

mod calendar;
mod config;
mod logging;
mod setup;
mod state;

use crate::state::{FileStore, cache_path};

#[derive(Parser, Debug)]
#[command(
    name = "studyplan",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("STUDYPLAN_BUILD_SHA"), ")"),
    about = "Deadline-aware study planner"
)]
struct Cli {
    /// Debug logging for studyplan targets (or set STUDYPLAN_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write ~/.studyplan/config.toml, prompting for the main settings
    Setup {
        /// Skip the prompts and write built-in defaults
        #[arg(long)]
        defaults: bool,
    },

    /// Estimate effort and priority for a single assignment
    Estimate {
        #[arg(long)]
        title: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Local due time, "YYYY-MM-DD HH:MM" in the configured timezone
        #[arg(long)]
        due: Option<String>,

        /// Treat as open-ended study material with no hard deadline
        #[arg(long)]
        undated: bool,
    },

    /// Build (or reuse) the tiered plan for a set of assignments
    Plan {
        /// JSON array of assignments
        #[arg(long)]
        assignments: PathBuf,

        /// Regenerate even when the cached plan is current
        #[arg(long)]
        force: bool,

        /// Also write the plan as an ICS calendar
        #[arg(long)]
        ics: Option<PathBuf>,

        /// Print the plan as JSON instead of text
        #[arg(long)]
        json: bool,

        /// Print what the regeneration controller decided and why
        #[arg(long)]
        explain: bool,
    },

    /// Lay out a week of study sessions around the home routine
    Week {
        /// JSON array of assignments
        #[arg(long)]
        assignments: PathBuf,

        /// First day, YYYY-MM-DD (default: today)
        #[arg(long)]
        start: Option<String>,

        /// Also write study and custom items as an ICS calendar
        #[arg(long)]
        ics: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose)?;

    match cli.command {
        Command::Setup { defaults } => {
            setup::run_setup(defaults)?;
        }

        Command::Estimate {
            title,
            description,
            due,
            undated,
        } => {
            run_estimate(&title, &description, due.as_deref(), undated)?;
        }

        Command::Plan {
            assignments,
            force,
            ics,
            json,
            explain,
        } => {
            run_plan(&assignments, force, ics.as_deref(), json, explain)?;
        }

        Command::Week {
            assignments,
            start,
            ics,
        } => {
            run_week(&assignments, start.as_deref(), ics.as_deref())?;
        }

        Command::Config => {
            let path = config::config_path()?;
            let cfg = config::load_config()?;
            cfg.to_preferences()
                .with_context(|| format!("invalid config at {}", path.display()))?;
            println!("# {}", path.display());
            print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
        }
    }

    Ok(())
}

fn load_assignments(path: &Path) -> Result<Vec<Assignment>> {
    if !path.exists() {
        bail!("assignments file not found: {}", path.display());
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))
}

fn write_ics(path: &Path, events: &[calendar::CalendarEvent]) -> Result<()> {
    fs::write(path, calendar::events_to_ics(events)).with_context(|| format!("write {}", path.display()))?;
    println!("\nWrote {} events to {}", events.len(), path.display());
    Ok(())
}

fn run_estimate(title: &str, description: &str, due: Option<&str>, undated: bool) -> Result<()> {
    let cfg = config::load_config()?;
    let prefs = cfg.to_preferences()?;
    let now = Utc::now();

    let mut a = match due {
        Some(due) if !undated => {
            let due_utc = parse_local_deadline_to_utc(due, &cfg.schedule.timezone)?;
            Assignment::new("cli", title, due_utc)
        }
        _ => Assignment::new("cli", title, now + Duration::days(7)).undated(),
    };
    a = a.with_description(description);

    let est = estimate(&a, &prefs, now);
    println!("Title:      {}", a.title);
    if a.has_real_due_date {
        println!("Due:        {}", a.due_date.with_timezone(&prefs.schedule.timezone).format("%a %Y-%m-%d %H:%M"));
    } else {
        println!("Due:        (none)");
    }
    println!("Estimate:   {} min", est.minutes);
    println!("Importance: {}/5", est.importance);
    println!("Priority:   {} (1 = highest)", priority(&a, est.minutes, now));
    Ok(())
}

fn run_plan(path: &Path, force: bool, ics: Option<&Path>, json: bool, explain: bool) -> Result<()> {
    let cfg = config::load_config()?;
    let prefs = cfg.to_preferences()?;
    let assignments = load_assignments(path)?;
    let now = Utc::now();
    let inputs = inputs_from_assignments(&assignments, &prefs, now);

    let store = FileStore::open(cache_path()?)?;
    let trace = TraceLog::new();
    let mut controller =
        RegenerationController::new(store, &cfg.account, prefs.schedule.clone()).with_trace(trace.clone());

    match controller.load(&inputs, &prefs.schedule, now)? {
        LoadOutcome::Hit => info!(target: "studyplan::cli", "using cached plan"),
        LoadOutcome::Miss(reason) => info!(target: "studyplan::cli", %reason, "cache miss"),
    }
    if force {
        controller.force_regenerate(now)?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(controller.plan())?);
    } else {
        print_plan(controller.plan(), &assignments, prefs.schedule.timezone);
    }

    if explain {
        println!("\n## Decisions");
        for e in trace.events() {
            let id = e.assignment_id.as_deref().unwrap_or("-");
            let detail = e.detail.as_deref().unwrap_or("");
            println!("- {:?} {} {}", e.kind, id, detail);
        }
    }

    if let Some(ics) = ics {
        write_ics(ics, &calendar::plan_to_events(controller.plan(), &assignments))?;
    }
    Ok(())
}

fn print_plan(plan: &[PlannedDay], assignments: &[Assignment], tz: Tz) {
    if plan.is_empty() {
        println!("Nothing to plan.");
        return;
    }

    for day in plan.iter().filter(|d| !d.blocks.is_empty() || !d.all_on_track) {
        let flag = if day.all_on_track { "" } else { "  (behind)" };
        println!("{}  {:.1}h{}", day.date.format("%a %Y-%m-%d"), day.total_hours(), flag);
        for b in &day.blocks {
            let title = assignments
                .iter()
                .find(|a| a.id == b.assignment_id)
                .map(|a| a.title.as_str())
                .unwrap_or(b.assignment_id.as_str());
            let reason = b
                .overflow_reason
                .as_deref()
                .map(|r| format!("  [{r}]"))
                .unwrap_or_default();
            println!(
                "  {}-{}  {}{}",
                b.start.with_timezone(&tz).format("%H:%M"),
                b.end.with_timezone(&tz).format("%H:%M"),
                title,
                reason
            );
        }
    }
}

fn run_week(path: &Path, start: Option<&str>, ics: Option<&Path>) -> Result<()> {
    let prefs = config::load_config()?.to_preferences()?;
    let assignments = load_assignments(path)?;
    let now = Utc::now();
    let tz = prefs.schedule.timezone;

    let start_date = match start {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid --start {s:?}"))?,
        None => local_date(tz, now),
    };

    let items = generate_week(&prefs, &assignments, start_date, now);
    print_week(&items, tz);

    if let Some(ics) = ics {
        write_ics(ics, &calendar::sessions_to_events(&items))?;
    }
    Ok(())
}

fn print_week(items: &[ScheduleItem], tz: Tz) {
    let mut current: Option<NaiveDate> = None;
    for item in items {
        let day = local_date(tz, item.start);
        if current != Some(day) {
            println!("\n{}", day.format("%a %Y-%m-%d"));
            current = Some(day);
        }
        let kind = match item.kind {
            ItemKind::Meal => "meal",
            ItemKind::Break => "break",
            ItemKind::Study => "study",
            ItemKind::Custom => "fixed",
        };
        println!(
            "  {}-{}  {:<5}  {}",
            item.start.with_timezone(&tz).format("%H:%M"),
            item.end.with_timezone(&tz).format("%H:%M"),
            kind,
            item.title
        );
    }
}
