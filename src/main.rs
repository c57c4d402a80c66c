//! Calibrator - talent calibration intelligence
//!
//! A CLI tool that analyzes a nine-box performance/potential roster,
//! flags statistical anomalies, estimates meeting time and optionally
//! asks a language model for a narrative over anonymized findings.
//!
//! Exit codes:
//!   0 - Success (no insights above threshold, or no --fail-on set)
//!   1 - Runtime error (unreadable roster, bad config, etc.)
//!   2 - Insights found at or above --fail-on priority

mod analysis;
mod cli;
mod config;
mod engine;
mod error;
mod insights;
mod models;
mod narrative;
mod overview;
mod privacy;
mod report;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE_NAME};
use engine::CalibrationEngine;
use indicatif::{ProgressBar, ProgressStyle};
use models::{grid_axes, Employee, Priority, Report, ReportMetadata};
use narrative::NarrativeOrchestrator;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("Calibrator v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: roster={:?} format={:?}", args.roster, args.format);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Calibration failed: {}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default config file.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to tune thresholds, time budget and narrative settings.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: failed to set tracing subscriber: {}", e);
    }
}

/// Run the calibration workflow. Returns exit code (0 or 2).
async fn run(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate().context("Invalid configuration")?;

    if args.check_availability {
        return handle_check_availability(&config);
    }

    let roster_path = args
        .roster
        .clone()
        .context("A roster file is required (--roster FILE)")?;

    println!("📥 Loading roster: {}", roster_path.display());
    let roster = load_roster(&roster_path)?;
    println!("   {} employees", roster.len());

    let mut engine = CalibrationEngine::new(config.clone());
    if args.narrative {
        let narrator = NarrativeOrchestrator::from_config(&config.narrative);
        let availability = narrator.is_available();
        if !availability.available {
            println!(
                "⚠️  Narrative unavailable: {}",
                availability.reason.as_deref().unwrap_or("unknown reason")
            );
        }
        engine = engine.with_narrator(narrator);
    }

    println!("\n🔬 Running calibration analysis...");
    let output = if args.narrative {
        let spinner = narrative_spinner(args.quiet, &config.narrative.model);
        let output = engine
            .run_with_narrative(&roster, args.select.as_deref())
            .await;
        spinner.finish_and_clear();
        output
    } else {
        engine.analyze_async(&roster).await
    };

    if let Some(reason) = &output.narrative_reason {
        if args.narrative {
            warn!("Continuing without narrative: {}", reason);
        }
    }

    println!("\n📝 Generating report...");
    let duration = start_time.elapsed().as_secs_f64();

    let report = Report {
        metadata: ReportMetadata {
            roster_file: roster_path.display().to_string(),
            analysis_date: Utc::now(),
            model_used: args.narrative.then(|| config.narrative.model.clone()),
            duration_seconds: duration,
        },
        output,
    };

    let content = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report, &config.report),
    };
    let output_path = PathBuf::from(&config.general.output);
    report::write_report(&content, &output_path)?;

    print_summary(&report, duration);
    println!(
        "\n✅ Calibration complete! Report saved to: {}",
        output_path.display()
    );

    // Check --fail-on threshold
    if let Some(level) = args.fail_on {
        let threshold: Priority = level.into();
        // High < Medium < Low, so "at or above" is `<=`.
        let has_insights_above = report
            .output
            .insights
            .iter()
            .any(|i| i.priority <= threshold);

        if has_insights_above {
            eprintln!(
                "\n⛔ Insights found at or above {} priority. Failing (exit code 2).",
                threshold
            );
            return Ok(2);
        }
    }

    Ok(0)
}

/// Handle --check-availability: print whether narrative generation is usable.
fn handle_check_availability(config: &Config) -> Result<i32> {
    let availability = NarrativeOrchestrator::from_config(&config.narrative).is_available();
    println!(
        "{}",
        serde_json::to_string_pretty(&availability)
            .context("Failed to serialize availability")?
    );
    Ok(0)
}

fn narrative_spinner(quiet: bool, model: &str) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message(format!("Requesting narrative from {}...", model));
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn print_summary(report: &Report, duration: f64) {
    let out = &report.output;
    let count = |p: Priority| out.insights.iter().filter(|i| i.priority == p).count();

    println!("\n📊 Calibration Summary:");
    println!("   Employees: {}", out.overview.total_employees);
    println!(
        "   Stars: {:.1}% | Center box: {:.1}%",
        out.overview.stars.percentage, out.overview.center_box.percentage
    );
    println!(
        "   Analyses flagged: {} of {}",
        out.analyses.flagged().count(),
        out.analyses.results.len()
    );
    println!(
        "   Insights: {} - {} High: {} | {} Medium: {} | {} Low: {}",
        out.insights.len(),
        Priority::High.emoji(),
        count(Priority::High),
        Priority::Medium.emoji(),
        count(Priority::Medium),
        Priority::Low.emoji(),
        count(Priority::Low)
    );
    println!(
        "   Suggested meeting length: {:.0} minutes",
        out.time_allocation.total_minutes
    );
    match (&out.narrative, &out.narrative_reason) {
        (Some(n), _) => println!("   Narrative: {} issues", n.issues.len()),
        (None, Some(reason)) if report.metadata.model_used.is_some() => {
            println!("   Narrative: not available ({})", reason)
        }
        _ => {}
    }
    println!("   Duration: {:.1}s", duration);
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}

/// Read a roster: a JSON array of employee records.
///
/// `grid_position` is authoritative; records whose stated ratings
/// disagree with it are reported but kept.
fn load_roster(path: &Path) -> Result<Vec<Employee>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read roster file: {}", path.display()))?;
    let roster: Vec<Employee> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse roster file: {}", path.display()))?;

    let mismatched = mismatched_ratings(&roster);
    if !mismatched.is_empty() {
        warn!(
            "{} roster entries have ratings that disagree with their grid position",
            mismatched.len()
        );
    }
    Ok(roster)
}

/// Roster indexes whose performance/potential do not match `grid_position`.
fn mismatched_ratings(roster: &[Employee]) -> Vec<usize> {
    roster
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.axes_match_position())
        .map(|(idx, e)| {
            if let Some((performance, potential)) = grid_axes(e.grid_position) {
                debug!(
                    "Roster entry {}: grid position {} implies {}/{}, record says {}/{}",
                    idx, e.grid_position, performance, potential, e.performance, e.potential
                );
            }
            idx
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_roster_fixture() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/roster.json");
        let roster = load_roster(&path).unwrap();
        assert!(roster.len() >= 20);
        assert!(roster.iter().all(|e| (1..=9).contains(&e.grid_position)));
    }

    #[test]
    fn test_fixture_ratings_match_grid_positions() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/roster.json");
        let mut roster = load_roster(&path).unwrap();
        assert!(mismatched_ratings(&roster).is_empty());

        roster[3].grid_position = if roster[3].grid_position == 9 { 1 } else { 9 };
        assert_eq!(mismatched_ratings(&roster), vec![3]);
    }

    #[test]
    fn test_load_roster_reports_bad_json() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{not json").unwrap();

        let err = load_roster(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse roster file"));
    }
}
