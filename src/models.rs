//! Data models for the calibration engine.
//!
//! This module contains the core data structures shared by every
//! subsystem: the employee roster, analysis results, insights,
//! distribution overview, time budget and narrative summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Grid position of the high-performance, high-potential box.
pub const STARS_POSITION: u8 = 9;

/// Grid position of the medium-performance, medium-potential box.
pub const CENTER_BOX_POSITION: u8 = 5;

/// Top-right corner of the grid: stars plus their two neighbours.
pub const HIGH_PERFORMER_POSITIONS: [u8; 3] = [6, 8, 9];

/// Bottom-left corner of the grid.
pub const LOW_PERFORMER_POSITIONS: [u8; 3] = [1, 2, 4];

/// Three-level rating used on both grid axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Low,
    Medium,
    High,
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rating::Low => write!(f, "Low"),
            Rating::Medium => write!(f, "Medium"),
            Rating::High => write!(f, "High"),
        }
    }
}

impl Rating {
    fn index(self) -> u8 {
        match self {
            Rating::Low => 1,
            Rating::Medium => 2,
            Rating::High => 3,
        }
    }

    fn from_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(Rating::Low),
            2 => Some(Rating::Medium),
            3 => Some(Rating::High),
            _ => None,
        }
    }
}

/// Grid position for a performance/potential pair.
///
/// Rows are potential (low at the bottom), columns are performance,
/// so position 1 is low/low, 5 the center box and 9 the stars box.
pub fn grid_position(performance: Rating, potential: Rating) -> u8 {
    (potential.index() - 1) * 3 + performance.index()
}

/// Inverse of [`grid_position`]: `(performance, potential)`.
pub fn grid_axes(position: u8) -> Option<(Rating, Rating)> {
    if !(1..=9).contains(&position) {
        return None;
    }
    let zero = position - 1;
    Some((Rating::from_index(zero % 3 + 1)?, Rating::from_index(zero / 3 + 1)?))
}

/// Human label for a grid position.
pub fn grid_label(position: u8) -> &'static str {
    match position {
        1 => "Low Performer",
        2 => "Inconsistent Contributor",
        3 => "Solid Expert",
        4 => "Dilemma",
        5 => "Core Contributor",
        6 => "High Performer",
        7 => "Enigma",
        8 => "Growth Employee",
        9 => "Star",
        _ => "Unknown",
    }
}

/// One employee in the roster. Supplied by the caller, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    /// Real identifier (never crosses the anonymization boundary).
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Job title.
    #[serde(default)]
    pub title: String,
    pub level: String,
    #[serde(alias = "function")]
    pub job_function: String,
    pub location: String,
    /// Tenure in years, if known.
    #[serde(default)]
    pub tenure_years: Option<f64>,
    pub performance: Rating,
    #[serde(default)]
    pub performance_score: Option<f64>,
    pub potential: Rating,
    #[serde(default)]
    pub potential_score: Option<f64>,
    /// Position on the nine-box grid (1-9).
    pub grid_position: u8,
    /// Real identifier of this employee's manager.
    #[serde(default)]
    pub manager_id: Option<String>,
    #[serde(default)]
    pub flags: Vec<String>,
    /// Free-form notes. Internal only.
    #[serde(default)]
    pub notes: Option<String>,
}

impl Employee {
    /// Whether this employee counts as a high outcome for anomaly analyses.
    pub fn is_high_outcome(&self) -> bool {
        HIGH_PERFORMER_POSITIONS.contains(&self.grid_position)
    }

    /// Tenure bucket label.
    pub fn tenure_bucket(&self) -> &'static str {
        tenure_bucket(self.tenure_years)
    }

    /// Whether the stated performance and potential agree with `grid_position`.
    pub fn axes_match_position(&self) -> bool {
        grid_position(self.performance, self.potential) == self.grid_position
    }
}

/// Bucket a tenure value into a coarse categorical label.
pub fn tenure_bucket(years: Option<f64>) -> &'static str {
    match years {
        None => "Unknown",
        Some(y) if y < 1.0 => "<1 year",
        Some(y) if y < 3.0 => "1-3 years",
        Some(y) if y < 5.0 => "3-5 years",
        Some(y) if y < 10.0 => "5-10 years",
        Some(_) => "10+ years",
    }
}

/// Outcome of one analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Ok,
    Warn,
    Critical,
    Error,
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisStatus::Ok => write!(f, "ok"),
            AnalysisStatus::Warn => write!(f, "warn"),
            AnalysisStatus::Critical => write!(f, "critical"),
            AnalysisStatus::Error => write!(f, "error"),
        }
    }
}

impl AnalysisStatus {
    /// Returns true for `warn` and `critical`.
    pub fn is_flagged(&self) -> bool {
        matches!(self, AnalysisStatus::Warn | AnalysisStatus::Critical)
    }
}

/// A single group's departure from the pooled high-outcome rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deviation {
    /// Group label (e.g. a location name).
    pub group: String,
    pub observed_pct: f64,
    pub expected_pct: f64,
    pub z_score: f64,
    pub is_significant: bool,
    pub sample_size: usize,
    pub high_count: usize,
}

/// Result of one statistical analysis over the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Registry name, e.g. `location`.
    pub name: String,
    pub status: AnalysisStatus,
    pub p_value: Option<f64>,
    pub chi_square: Option<f64>,
    pub degrees_of_freedom: Option<usize>,
    /// Cramér's V.
    pub effect_size: Option<f64>,
    pub sample_size: usize,
    /// Ordered by absolute z-score, largest first.
    pub deviations: Vec<Deviation>,
    pub interpretation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResult {
    /// An `ok` result carrying only an explanatory note.
    pub fn note(name: &str, sample_size: usize, interpretation: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: AnalysisStatus::Ok,
            p_value: None,
            chi_square: None,
            degrees_of_freedom: None,
            effect_size: None,
            sample_size,
            deviations: Vec::new(),
            interpretation: interpretation.into(),
            error: None,
        }
    }

    /// An `error` result for an analysis that failed.
    pub fn failed(name: &str, sample_size: usize, error: String) -> Self {
        Self {
            status: AnalysisStatus::Error,
            interpretation: format!("Analysis could not be completed: {}", error),
            error: Some(error),
            ..Self::note(name, sample_size, String::new())
        }
    }

    /// Significant deviations only.
    pub fn significant_deviations(&self) -> impl Iterator<Item = &Deviation> {
        self.deviations.iter().filter(|d| d.is_significant)
    }
}

/// Results of every registered analysis, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub results: Vec<AnalysisResult>,
}

impl AnalysisReport {
    /// Look up a result by analysis name.
    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&AnalysisResult> {
        self.results.iter().find(|r| r.name == name)
    }

    pub fn flagged(&self) -> impl Iterator<Item = &AnalysisResult> {
        self.results.iter().filter(|r| r.status.is_flagged())
    }
}

/// What an insight is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Anomaly,
    FocusArea,
    Recommendation,
    TimeAllocation,
}

impl fmt::Display for InsightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsightKind::Anomaly => write!(f, "anomaly"),
            InsightKind::FocusArea => write!(f, "focus_area"),
            InsightKind::Recommendation => write!(f, "recommendation"),
            InsightKind::TimeAllocation => write!(f, "time_allocation"),
        }
    }
}

/// Insight priority. Ordered so that `High` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "High"),
            Priority::Medium => write!(f, "Medium"),
            Priority::Low => write!(f, "Low"),
        }
    }
}

impl Priority {
    /// Returns an emoji representation of the priority.
    pub fn emoji(&self) -> &'static str {
        match self {
            Priority::High => "🔴",
            Priority::Medium => "🟡",
            Priority::Low => "🟢",
        }
    }

    /// Lenient parse used for model output.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" | "critical" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

/// A single explainable finding for the facilitator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    pub kind: InsightKind,
    pub category: String,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub affected_count: usize,
    /// Numeric/categorical facts backing the insight. Bounded in size.
    pub source_data: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_title: Option<String>,
}

/// Round to one decimal place (percentages, minutes).
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Round to two decimal places (z-scores).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Count and share of one categorical value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub label: String,
    pub count: usize,
    pub percentage: f64,
}

/// Count and share of a named grid-position group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupShare {
    pub count: usize,
    pub percentage: f64,
}

/// Distribution summary of the roster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataOverview {
    pub total_employees: usize,
    pub by_level: Vec<CategoryCount>,
    pub by_function: Vec<CategoryCount>,
    pub by_location: Vec<CategoryCount>,
    pub by_tenure: Vec<CategoryCount>,
    /// All nine positions, in position order.
    pub by_grid_position: Vec<CategoryCount>,
    pub stars: GroupShare,
    pub center_box: GroupShare,
    pub high_performers: GroupShare,
    pub low_performers: GroupShare,
}

/// Minutes budgeted for one normalized level bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelTime {
    pub level: String,
    pub count: usize,
    pub minutes: f64,
    pub percentage: f64,
}

/// Suggested meeting-time budget.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeAllocation {
    pub total_minutes: f64,
    pub sweep_minutes: f64,
    pub sweep_percentage: f64,
    pub breakdown: Vec<LevelTime>,
    pub suggested_sequence: Vec<String>,
}

/// One issue synthesized by the narrative model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedIssue {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub category: String,
    pub affected_count: usize,
    #[serde(default)]
    pub related_insight_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_title: Option<String>,
}

/// Narrative written by the external text-generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeSummary {
    pub summary: Option<String>,
    pub issues: Vec<SynthesizedIssue>,
}

/// Availability of the narrative step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Everything one engine invocation produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOutput {
    pub overview: DataOverview,
    pub time_allocation: TimeAllocation,
    pub analyses: AnalysisReport,
    pub insights: Vec<Insight>,
    pub narrative: Option<NarrativeSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative_reason: Option<String>,
}

/// Metadata about a report run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub roster_file: String,
    pub analysis_date: DateTime<Utc>,
    /// Set when a narrative was requested.
    pub model_used: Option<String>,
    pub duration_seconds: f64,
}

/// A complete calibration report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    #[serde(flatten)]
    pub output: EngineOutput,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_position_corners() {
        assert_eq!(grid_position(Rating::Low, Rating::Low), 1);
        assert_eq!(grid_position(Rating::Medium, Rating::Medium), CENTER_BOX_POSITION);
        assert_eq!(grid_position(Rating::High, Rating::High), STARS_POSITION);
        assert_eq!(grid_position(Rating::High, Rating::Low), 3);
        assert_eq!(grid_position(Rating::Low, Rating::High), 7);
    }

    #[test]
    fn test_grid_axes_inverts_position() {
        for position in 1..=9 {
            let (perf, pot) = grid_axes(position).unwrap();
            assert_eq!(grid_position(perf, pot), position);
        }
        assert!(grid_axes(0).is_none());
        assert!(grid_axes(10).is_none());
    }

    #[test]
    fn test_axes_match_position() {
        let mut employee = test_support::employee("E1", "Austin", 9);
        assert!(employee.axes_match_position());

        employee.grid_position = 5;
        assert!(!employee.axes_match_position());
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round1(35.96), 36.0);
        assert_eq!(round1(80.0), 80.0);
        assert_eq!(round2(3.14159), 3.14);
        assert_eq!(round2(-2.456), -2.46);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High < Priority::Medium);
        assert!(Priority::Medium < Priority::Low);
        assert_eq!(Priority::parse_lenient("CRITICAL"), Priority::High);
        assert_eq!(Priority::parse_lenient("whatever"), Priority::Medium);
    }

    #[test]
    fn test_tenure_bucket() {
        assert_eq!(tenure_bucket(None), "Unknown");
        assert_eq!(tenure_bucket(Some(0.5)), "<1 year");
        assert_eq!(tenure_bucket(Some(3.0)), "3-5 years");
        assert_eq!(tenure_bucket(Some(12.0)), "10+ years");
    }

    #[test]
    fn test_employee_deserializes_function_alias() {
        let json = r#"{
            "id": "E1", "level": "IC2", "function": "Sales", "location": "Paris",
            "performance": "high", "potential": "medium", "grid_position": 6
        }"#;
        let employee: Employee = serde_json::from_str(json).unwrap();
        assert_eq!(employee.job_function, "Sales");
        assert!(employee.is_high_outcome());
        assert!(employee.flags.is_empty());
    }

    #[test]
    fn test_failed_result_is_error_status() {
        let result = AnalysisResult::failed("location", 12, "boom".to_string());
        assert_eq!(result.status, AnalysisStatus::Error);
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert!(!result.status.is_flagged());
    }
}
