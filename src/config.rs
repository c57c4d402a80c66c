//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.calibrator.toml` files. Every tunable threshold used by the
//! analyses, insight rules and time budget lives here.

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = ".calibrator.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Statistical analysis settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Insight rule thresholds.
    #[serde(default)]
    pub insights: InsightConfig,

    /// Meeting time budget settings.
    #[serde(default)]
    pub time: TimeConfig,

    /// External narrative generation settings.
    #[serde(default)]
    pub narrative: NarrativeConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "calibration_report.md".to_string()
}

/// Anomaly analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// |z| above which a group is flagged significant.
    #[serde(default = "default_z_threshold")]
    pub z_threshold: f64,

    /// |z| above which the analysis escalates to critical.
    #[serde(default = "default_critical_z")]
    pub critical_z: f64,

    /// p-value below which the analysis is at least `warn`.
    #[serde(default = "default_warn_p")]
    pub warn_p_value: f64,

    /// p-value below which the analysis is `critical`.
    #[serde(default = "default_critical_p")]
    pub critical_p_value: f64,

    /// Groups smaller than this are never flagged.
    #[serde(default = "default_min_group_size")]
    pub min_group_size: usize,

    /// Run analyses on the blocking thread pool in parallel.
    #[serde(default = "default_true")]
    pub concurrent: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            z_threshold: default_z_threshold(),
            critical_z: default_critical_z(),
            warn_p_value: default_warn_p(),
            critical_p_value: default_critical_p(),
            min_group_size: default_min_group_size(),
            concurrent: true,
        }
    }
}

fn default_z_threshold() -> f64 {
    2.0
}

fn default_critical_z() -> f64 {
    3.0
}

fn default_warn_p() -> f64 {
    0.05
}

fn default_critical_p() -> f64 {
    0.01
}

fn default_min_group_size() -> usize {
    5
}

/// Distribution-rule and anomaly insight thresholds (percentages are 0-100).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightConfig {
    #[serde(default = "default_center_box_max")]
    pub center_box_max_pct: f64,

    #[serde(default = "default_stars_min")]
    pub stars_min_pct: f64,

    #[serde(default = "default_stars_max")]
    pub stars_max_pct: f64,

    #[serde(default = "default_high_performers_max")]
    pub high_performers_max_pct: f64,

    #[serde(default = "default_low_performers_min")]
    pub low_performers_min_pct: f64,

    /// The low-performer rule only applies to rosters at least this large.
    #[serde(default = "default_low_performers_headcount")]
    pub low_performers_min_headcount: usize,

    /// |z| above which an anomaly insight is high priority.
    #[serde(default = "default_critical_z")]
    pub high_priority_z: f64,

    #[serde(default = "default_max_source_data")]
    pub max_source_data_fields: usize,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            center_box_max_pct: default_center_box_max(),
            stars_min_pct: default_stars_min(),
            stars_max_pct: default_stars_max(),
            high_performers_max_pct: default_high_performers_max(),
            low_performers_min_pct: default_low_performers_min(),
            low_performers_min_headcount: default_low_performers_headcount(),
            high_priority_z: default_critical_z(),
            max_source_data_fields: default_max_source_data(),
        }
    }
}

fn default_center_box_max() -> f64 {
    50.0
}

fn default_stars_min() -> f64 {
    5.0
}

fn default_stars_max() -> f64 {
    25.0
}

fn default_high_performers_max() -> f64 {
    40.0
}

fn default_low_performers_min() -> f64 {
    5.0
}

fn default_low_performers_headcount() -> usize {
    20
}

fn default_max_source_data() -> usize {
    12
}

/// Meeting time budget settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeConfig {
    #[serde(default = "default_base_minutes")]
    pub base_minutes_per_employee: f64,

    #[serde(default = "default_sweep_per_employee")]
    pub sweep_minutes_per_employee: f64,

    #[serde(default = "default_min_sweep")]
    pub min_sweep_minutes: f64,

    #[serde(default = "default_min_total")]
    pub min_total_minutes: f64,

    #[serde(default = "default_max_total")]
    pub max_total_minutes: f64,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            base_minutes_per_employee: default_base_minutes(),
            sweep_minutes_per_employee: default_sweep_per_employee(),
            min_sweep_minutes: default_min_sweep(),
            min_total_minutes: default_min_total(),
            max_total_minutes: default_max_total(),
        }
    }
}

fn default_base_minutes() -> f64 {
    2.0
}

fn default_sweep_per_employee() -> f64 {
    0.2
}

fn default_min_sweep() -> f64 {
    10.0
}

fn default_min_total() -> f64 {
    30.0
}

fn default_max_total() -> f64 {
    480.0
}

/// External narrative generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeConfig {
    /// Model selector passed to the API.
    #[serde(default = "default_model")]
    pub model: String,

    /// Messages API endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// API credential. Prefer the environment variable over the file.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Maximum tokens in the response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature for generation.
    #[serde(default)]
    pub temperature: f32,

    /// Maximum number of insights per request.
    #[serde(default = "default_max_selected")]
    pub max_selected: usize,

    /// Free-text fields are truncated to this many characters.
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,

    /// Maximum pseudonymized entities sent with a request.
    #[serde(default = "default_max_entities")]
    pub max_entities: usize,

    /// Maximum synthesized issues kept from a response.
    #[serde(default = "default_max_issues")]
    pub max_issues: usize,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_url: default_api_url(),
            api_key: None,
            timeout_seconds: default_timeout(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            max_selected: default_max_selected(),
            max_text_length: default_max_text_length(),
            max_entities: default_max_entities(),
            max_issues: default_max_issues(),
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_max_selected() -> usize {
    25
}

fn default_max_text_length() -> usize {
    500
}

fn default_max_entities() -> usize {
    250
}

fn default_max_issues() -> usize {
    10
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Include per-group deviation tables.
    #[serde(default = "default_true")]
    pub include_deviations: bool,

    /// Include raw source data under each insight.
    #[serde(default)]
    pub include_source_data: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            include_deviations: true,
            include_source_data: false,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Check that thresholds and bounds are finite and consistently ordered.
    pub fn validate(&self) -> Result<()> {
        let a = &self.analysis;
        ensure!(
            a.z_threshold.is_finite() && a.z_threshold >= 0.0,
            "analysis.z_threshold must be a non-negative number"
        );
        ensure!(
            a.critical_z.is_finite() && a.critical_z >= 0.0,
            "analysis.critical_z must be a non-negative number"
        );
        ensure!(
            a.critical_p_value > 0.0 && a.critical_p_value <= a.warn_p_value && a.warn_p_value <= 1.0,
            "analysis p-values must satisfy 0 < critical_p_value <= warn_p_value <= 1"
        );

        let i = &self.insights;
        for (name, pct) in [
            ("center_box_max_pct", i.center_box_max_pct),
            ("stars_min_pct", i.stars_min_pct),
            ("stars_max_pct", i.stars_max_pct),
            ("high_performers_max_pct", i.high_performers_max_pct),
            ("low_performers_min_pct", i.low_performers_min_pct),
        ] {
            ensure!(
                (0.0..=100.0).contains(&pct),
                "insights.{} must be between 0 and 100",
                name
            );
        }
        ensure!(
            i.stars_min_pct <= i.stars_max_pct,
            "insights.stars_min_pct must not exceed stars_max_pct"
        );
        ensure!(
            i.high_priority_z.is_finite() && i.high_priority_z >= 0.0,
            "insights.high_priority_z must be a non-negative number"
        );

        let t = &self.time;
        for (name, minutes) in [
            ("base_minutes_per_employee", t.base_minutes_per_employee),
            ("sweep_minutes_per_employee", t.sweep_minutes_per_employee),
            ("min_sweep_minutes", t.min_sweep_minutes),
            ("min_total_minutes", t.min_total_minutes),
            ("max_total_minutes", t.max_total_minutes),
        ] {
            ensure!(
                minutes.is_finite() && minutes >= 0.0,
                "time.{} must be a non-negative number",
                name
            );
        }
        ensure!(
            t.min_total_minutes <= t.max_total_minutes,
            "time.min_total_minutes ({}) exceeds max_total_minutes ({})",
            t.min_total_minutes,
            t.max_total_minutes
        );

        Ok(())
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were explicitly provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.narrative.model = model.clone();
        }
        if let Some(ref api_key) = args.api_key {
            self.narrative.api_key = Some(api_key.clone());
        }
        if let Some(timeout) = args.timeout {
            self.narrative.timeout_seconds = timeout;
        }
        if let Some(min_group) = args.min_group_size {
            self.analysis.min_group_size = min_group;
        }
        if let Some(z) = args.z_threshold {
            self.analysis.z_threshold = z;
        }
        if args.sequential {
            self.analysis.concurrent = false;
        }

        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
