//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::Priority;
use clap::Parser;
use std::path::PathBuf;

/// Calibrator - prep for talent calibration sessions
///
/// Turns a nine-box roster into statistically grounded insights,
/// a suggested meeting-time budget and an optional AI-written narrative.
///
/// Examples:
///   calibrator --roster roster.json
///   calibrator --roster roster.json --format json --output prep.json
///   calibrator --roster roster.json --narrative
///   calibrator --roster roster.json --narrative --select dist-1a2b3c4d5e6f
///   calibrator --check-availability
///   calibrator --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Roster file to analyze (JSON array of employee records)
    #[arg(
        short,
        long,
        value_name = "FILE",
        required_unless_present_any = ["init_config", "check_availability"]
    )]
    pub roster: Option<PathBuf>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .calibrator.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate an AI narrative for the selected insights
    #[arg(long)]
    pub narrative: bool,

    /// Insight ids to include in the narrative (comma-separated)
    ///
    /// Defaults to every high and medium priority insight.
    #[arg(long, value_name = "IDS", value_delimiter = ',', requires = "narrative")]
    pub select: Option<Vec<String>>,

    /// Model used for narrative generation
    #[arg(short, long, env = "CALIBRATOR_MODEL")]
    pub model: Option<String>,

    /// API key for narrative generation
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Narrative request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Minimum group size for significance flagging
    #[arg(long, value_name = "COUNT")]
    pub min_group_size: Option<usize>,

    /// |z| threshold for flagging a group
    #[arg(long, value_name = "Z")]
    pub z_threshold: Option<f64>,

    /// Run analyses one after another instead of in parallel
    #[arg(long)]
    pub sequential: bool,

    /// Fail if insights at or above this priority are found
    ///
    /// Exit code 2 when the threshold is met. Values: high, medium, low
    #[arg(long, value_name = "LEVEL")]
    pub fail_on: Option<PriorityLevel>,

    /// Report whether narrative generation is available and exit
    #[arg(long)]
    pub check_availability: bool,

    /// Generate a default .calibrator.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Priority level for --fail-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PriorityLevel {
    Low,
    Medium,
    High,
}

impl From<PriorityLevel> for Priority {
    fn from(level: PriorityLevel) -> Self {
        match level {
            PriorityLevel::Low => Priority::Low,
            PriorityLevel::Medium => Priority::Medium,
            PriorityLevel::High => Priority::High,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config || self.check_availability {
            return Ok(());
        }

        if let Some(ref roster) = self.roster {
            if !roster.exists() {
                return Err(format!("Roster file does not exist: {}", roster.display()));
            }
            if !roster.is_file() {
                return Err(format!("Roster path is not a file: {}", roster.display()));
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(z) = self.z_threshold {
            if !z.is_finite() || z <= 0.0 {
                return Err("Z threshold must be a positive number".to_string());
            }
        }

        if self.min_group_size == Some(0) {
            return Err("Minimum group size must be at least 1".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            roster: None,
            output: Some(PathBuf::from("report.md")),
            format: OutputFormat::Markdown,
            config: None,
            verbose: false,
            quiet: false,
            narrative: false,
            select: None,
            model: None,
            api_key: None,
            timeout: None,
            min_group_size: None,
            z_threshold: None,
            sequential: false,
            fail_on: None,
            check_availability: false,
            init_config: false,
        }
    }

    #[test]
    fn test_merge_with_args_overrides_config() {
        let mut args = make_args();
        args.model = Some("claude-haiku-4-5".to_string());
        args.timeout = Some(15);
        args.sequential = true;

        let mut config = crate::config::Config::default();
        config.merge_with_args(&args);

        assert_eq!(config.narrative.model, "claude-haiku-4-5");
        assert_eq!(config.narrative.timeout_seconds, 15);
        assert!(!config.analysis.concurrent);
        assert_eq!(config.general.output, "report.md");
        // Unset flags leave the file's values alone.
        assert_eq!(config.analysis.min_group_size, 5);
        assert!(config.narrative.api_key.is_none());
    }

    #[test]
    fn test_validation_missing_roster_file() {
        let mut args = make_args();
        args.roster = Some(PathBuf::from("/definitely/not/here.json"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_thresholds() {
        let mut args = make_args();
        args.z_threshold = Some(-1.0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.min_group_size = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.timeout = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_parse_select_list() {
        let args = Args::try_parse_from([
            "calibrator",
            "--roster",
            "roster.json",
            "--narrative",
            "--select",
            "dist-aaaaaaaaaaaa,time-bbbbbbbbbbbb",
        ])
        .unwrap();
        assert_eq!(args.select.unwrap().len(), 2);
    }

    #[test]
    fn test_priority_level_conversion() {
        assert_eq!(Priority::from(PriorityLevel::High), Priority::High);
        assert_eq!(Priority::from(PriorityLevel::Low), Priority::Low);
    }
}
