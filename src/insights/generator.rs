//! Insight generation.
//!
//! Turns the overview, time budget and analysis results into a
//! prioritized list of insights. Generation is deterministic: the same
//! inputs give the same insights, in the same order, with the same ids.

use crate::config::InsightConfig;
use crate::insights::clustering::{assign_clusters, RootCause};
use crate::insights::ids::insight_id;
use crate::models::{
    AnalysisReport, AnalysisResult, AnalysisStatus, DataOverview, Deviation, Insight, InsightKind,
    Priority, TimeAllocation,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const CATEGORY_DISTRIBUTION: &str = "distribution";
pub const CATEGORY_TIME: &str = "time";
pub const CATEGORY_DATA: &str = "data";

type Pending = (Insight, Option<RootCause>);

/// Generate every insight for one engine invocation.
pub fn generate_insights(
    overview: &DataOverview,
    time: &TimeAllocation,
    analyses: &AnalysisReport,
    config: &InsightConfig,
) -> Vec<Insight> {
    if overview.total_employees == 0 {
        info!("Empty roster; emitting no-data notice only");
        return vec![no_data_insight()];
    }

    let mut pending: Vec<Pending> = Vec::new();
    pending.extend(distribution_insights(overview, config));
    pending.extend(anomaly_insights(analyses, config));
    pending.push((time_insight(overview, time, config), None));

    assign_clusters(&mut pending);

    let mut insights: Vec<Insight> = pending.into_iter().map(|(insight, _)| insight).collect();
    // Stable: generation order is preserved within a priority tier.
    insights.sort_by_key(|i| i.priority);

    info!("Generated {} insights", insights.len());
    insights
}

struct Draft<'a> {
    prefix: &'a str,
    parts: Vec<&'a str>,
    kind: InsightKind,
    category: &'a str,
    priority: Priority,
    title: String,
    description: String,
    affected_count: usize,
    source_data: Vec<(&'a str, Value)>,
}

impl Draft<'_> {
    fn build(self, config: &InsightConfig) -> Insight {
        let source_data: BTreeMap<String, Value> = self
            .source_data
            .into_iter()
            .take(config.max_source_data_fields)
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        Insight {
            id: insight_id(self.prefix, &self.parts),
            kind: self.kind,
            category: self.category.to_string(),
            priority: self.priority,
            title: self.title,
            description: self.description,
            affected_count: self.affected_count,
            source_data,
            cluster_id: None,
            cluster_title: None,
        }
    }
}

fn compression() -> RootCause {
    RootCause::new("rating_compression", "Ratings clustered toward the middle")
}

fn inflation() -> RootCause {
    RootCause::new("rating_inflation", "Ratings skewed toward the top")
}

/// Fixed-threshold rules over the grid distribution. Each fires at most once.
fn distribution_insights(overview: &DataOverview, config: &InsightConfig) -> Vec<Pending> {
    let mut out = Vec::new();
    let total = overview.total_employees;

    let center = overview.center_box;
    if center.percentage > config.center_box_max_pct {
        let draft = Draft {
            prefix: "dist",
            parts: vec![CATEGORY_DISTRIBUTION, "center_box_high"],
            kind: InsightKind::FocusArea,
            category: CATEGORY_DISTRIBUTION,
            priority: Priority::Medium,
            title: format!("{:.1}% of employees are in the center box", center.percentage),
            description: format!(
                "The center box holds {} of {} employees ({:.1}%), above the {:.0}% threshold. \
                 Check whether these ratings are deliberate or a default to the middle.",
                center.count, total, center.percentage, config.center_box_max_pct
            ),
            affected_count: center.count,
            source_data: vec![
                ("percentage", json!(center.percentage)),
                ("threshold_pct", json!(config.center_box_max_pct)),
                ("count", json!(center.count)),
                ("total", json!(total)),
            ],
        };
        out.push((draft.build(config), Some(compression())));
    }

    let stars = overview.stars;
    if stars.percentage < config.stars_min_pct {
        let draft = Draft {
            prefix: "dist",
            parts: vec![CATEGORY_DISTRIBUTION, "stars_low"],
            kind: InsightKind::Recommendation,
            category: CATEGORY_DISTRIBUTION,
            priority: Priority::High,
            title: "Succession risk: very few stars".to_string(),
            description: format!(
                "Only {} of {} employees ({:.1}%) are rated high performance and high potential, \
                 below the {:.0}% threshold. Review the succession pipeline for key roles.",
                stars.count, total, stars.percentage, config.stars_min_pct
            ),
            affected_count: stars.count,
            source_data: vec![
                ("percentage", json!(stars.percentage)),
                ("threshold_pct", json!(config.stars_min_pct)),
                ("count", json!(stars.count)),
                ("total", json!(total)),
            ],
        };
        out.push((draft.build(config), Some(compression())));
    } else if stars.percentage > config.stars_max_pct {
        let draft = Draft {
            prefix: "dist",
            parts: vec![CATEGORY_DISTRIBUTION, "stars_high"],
            kind: InsightKind::FocusArea,
            category: CATEGORY_DISTRIBUTION,
            priority: Priority::High,
            title: "Possible rating inflation in the stars box".to_string(),
            description: format!(
                "{} of {} employees ({:.1}%) are rated as stars, above the {:.0}% threshold. \
                 Confirm each star placement against concrete evidence.",
                stars.count, total, stars.percentage, config.stars_max_pct
            ),
            affected_count: stars.count,
            source_data: vec![
                ("percentage", json!(stars.percentage)),
                ("threshold_pct", json!(config.stars_max_pct)),
                ("count", json!(stars.count)),
                ("total", json!(total)),
            ],
        };
        out.push((draft.build(config), Some(inflation())));
    }

    let high = overview.high_performers;
    if high.percentage > config.high_performers_max_pct {
        let draft = Draft {
            prefix: "dist",
            parts: vec![CATEGORY_DISTRIBUTION, "high_performers_high"],
            kind: InsightKind::FocusArea,
            category: CATEGORY_DISTRIBUTION,
            priority: Priority::Medium,
            title: format!("{:.1}% of employees are in the top-right boxes", high.percentage),
            description: format!(
                "{} of {} employees ({:.1}%) sit in the three top-right boxes, above the {:.0}% \
                 threshold. Compare their outcomes with the rest of the population.",
                high.count, total, high.percentage, config.high_performers_max_pct
            ),
            affected_count: high.count,
            source_data: vec![
                ("percentage", json!(high.percentage)),
                ("threshold_pct", json!(config.high_performers_max_pct)),
                ("count", json!(high.count)),
                ("total", json!(total)),
            ],
        };
        out.push((draft.build(config), Some(inflation())));
    }

    let low = overview.low_performers;
    if total >= config.low_performers_min_headcount && low.percentage < config.low_performers_min_pct {
        let draft = Draft {
            prefix: "dist",
            parts: vec![CATEGORY_DISTRIBUTION, "low_performers_low"],
            kind: InsightKind::Recommendation,
            category: CATEGORY_DISTRIBUTION,
            priority: Priority::Low,
            title: "Few employees rated in the bottom-left boxes".to_string(),
            description: format!(
                "Only {} of {} employees ({:.1}%) are in the bottom-left boxes, below the {:.0}% \
                 threshold. Make sure performance concerns are being surfaced.",
                low.count, total, low.percentage, config.low_performers_min_pct
            ),
            affected_count: low.count,
            source_data: vec![
                ("percentage", json!(low.percentage)),
                ("threshold_pct", json!(config.low_performers_min_pct)),
                ("count", json!(low.count)),
                ("total", json!(total)),
            ],
        };
        out.push((draft.build(config), Some(inflation())));
    }

    debug!("Distribution rules fired: {}", out.len());
    out
}

/// Plural noun for an analysis dimension, used in titles.
fn dimension_noun(name: &str) -> String {
    match name {
        "location" => "locations".to_string(),
        "function" => "functions".to_string(),
        "level" => "levels".to_string(),
        "tenure" => "tenure groups".to_string(),
        other => format!("{} groups", other),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// One insight per significant deviation of every flagged analysis.
fn anomaly_insights(analyses: &AnalysisReport, config: &InsightConfig) -> Vec<Pending> {
    let mut out = Vec::new();

    for result in analyses.flagged() {
        let cause = RootCause::new(
            format!("dimension:{}", result.name),
            format!("Rating differences by {}", result.name),
        );

        let significant: Vec<&Deviation> = result.significant_deviations().collect();
        if significant.is_empty() {
            out.push((category_insight(result, config), Some(cause)));
            continue;
        }

        for deviation in significant {
            out.push((deviation_insight(result, deviation, config), Some(cause.clone())));
        }
    }

    debug!("Anomaly insights: {}", out.len());
    out
}

fn deviation_insight(result: &AnalysisResult, d: &Deviation, config: &InsightConfig) -> Insight {
    let above = d.z_score > 0.0;
    let direction = if above { "above" } else { "below" };
    let comparative = if above { "higher" } else { "lower" };
    let priority = if d.z_score.abs() > config.high_priority_z {
        Priority::High
    } else {
        Priority::Medium
    };

    Draft {
        prefix: "anomaly",
        parts: vec![result.name.as_str(), d.group.as_str(), direction],
        kind: InsightKind::Anomaly,
        category: result.name.as_str(),
        priority,
        title: format!(
            "{} rates {} than other {}",
            d.group,
            comparative,
            dimension_noun(&result.name)
        ),
        description: format!(
            "{}% of {} employees in {} {} are in the top-right boxes versus {}% across the roster \
             (z = {:.2}). Review these ratings for consistent standards.",
            d.observed_pct, d.sample_size, result.name, d.group, d.expected_pct, d.z_score
        ),
        affected_count: d.sample_size,
        source_data: vec![
            ("dimension", json!(result.name)),
            ("group", json!(d.group)),
            ("direction", json!(direction)),
            ("observed_pct", json!(d.observed_pct)),
            ("expected_pct", json!(d.expected_pct)),
            ("z_score", json!(d.z_score)),
            ("p_value", json!(result.p_value)),
            ("effect_size", json!(result.effect_size)),
            ("sample_size", json!(d.sample_size)),
            ("high_count", json!(d.high_count)),
        ],
    }
    .build(config)
}

fn category_insight(result: &AnalysisResult, config: &InsightConfig) -> Insight {
    let priority = if result.status == AnalysisStatus::Critical {
        Priority::High
    } else {
        Priority::Medium
    };

    Draft {
        prefix: "anomaly",
        parts: vec![result.name.as_str(), "overall"],
        kind: InsightKind::Anomaly,
        category: result.name.as_str(),
        priority,
        title: format!("{} ratings differ overall", capitalize(&result.name)),
        description: result.interpretation.clone(),
        affected_count: result.sample_size,
        source_data: vec![
            ("dimension", json!(result.name)),
            ("status", json!(result.status)),
            ("p_value", json!(result.p_value)),
            ("chi_square", json!(result.chi_square)),
            ("effect_size", json!(result.effect_size)),
            ("sample_size", json!(result.sample_size)),
        ],
    }
    .build(config)
}

fn format_minutes(minutes: f64) -> String {
    let rounded = minutes.round() as u64;
    match (rounded / 60, rounded % 60) {
        (0, m) => format!("{} min", m),
        (h, 0) => format!("{} h", h),
        (h, m) => format!("{} h {} min", h, m),
    }
}

fn time_insight(overview: &DataOverview, time: &TimeAllocation, config: &InsightConfig) -> Insight {
    let breakdown: Vec<String> = time
        .breakdown
        .iter()
        .map(|l| format!("{} {:.1} min ({:.1}%)", l.level, l.minutes, l.percentage))
        .collect();

    let mut source_data = vec![
        ("total_minutes", json!(time.total_minutes)),
        ("sweep_minutes", json!(time.sweep_minutes)),
        ("employee_count", json!(overview.total_employees)),
        ("sequence", json!(time.suggested_sequence)),
    ];
    for level in &time.breakdown {
        let key: &'static str = match level.level.as_str() {
            "Executive" => "minutes_executive",
            "VP" => "minutes_vp",
            "Director" => "minutes_director",
            "Manager" => "minutes_manager",
            _ => "minutes_ic",
        };
        source_data.push((key, json!(level.minutes)));
    }

    Draft {
        prefix: "time",
        parts: vec![CATEGORY_TIME, "time_allocation"],
        kind: InsightKind::TimeAllocation,
        category: CATEGORY_TIME,
        priority: Priority::Low,
        title: format!("Plan for about {}", format_minutes(time.total_minutes)),
        description: format!(
            "Suggested order: {}. Breakdown: {}; final sweep {:.1} min.",
            time.suggested_sequence.join(" → "),
            breakdown.join(", "),
            time.sweep_minutes
        ),
        affected_count: overview.total_employees,
        source_data,
    }
    .build(config)
}

fn no_data_insight() -> Insight {
    Insight {
        id: insight_id("notice", &[CATEGORY_DATA, "no_data"]),
        kind: InsightKind::Recommendation,
        category: CATEGORY_DATA.to_string(),
        priority: Priority::Low,
        title: "No employees to calibrate".to_string(),
        description: "The roster is empty. Load employee ratings to generate insights.".to_string(),
        affected_count: 0,
        source_data: BTreeMap::new(),
        cluster_id: None,
        cluster_title: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisRegistry;
    use crate::config::{AnalysisConfig, TimeConfig};
    use crate::models::test_support::{employee, skewed_location_roster};
    use crate::models::GroupShare;
    use crate::overview::{calculate_overview, calculate_time_allocation};

    fn run(roster: &[crate::models::Employee]) -> Vec<Insight> {
        let overview = calculate_overview(roster);
        let time = calculate_time_allocation(roster, &TimeConfig::default());
        let analyses = AnalysisRegistry::standard(&AnalysisConfig::default()).run_all(roster);
        generate_insights(&overview, &time, &analyses, &InsightConfig::default())
    }

    fn overview_with_center(pct: f64) -> DataOverview {
        DataOverview {
            total_employees: 100,
            center_box: GroupShare {
                count: pct as usize,
                percentage: pct,
            },
            stars: GroupShare {
                count: 10,
                percentage: 10.0,
            },
            high_performers: GroupShare {
                count: 20,
                percentage: 20.0,
            },
            low_performers: GroupShare {
                count: 10,
                percentage: 10.0,
            },
            ..DataOverview::default()
        }
    }

    fn center_insights(overview: &DataOverview) -> Vec<Insight> {
        generate_insights(
            overview,
            &TimeAllocation::default(),
            &AnalysisReport::default(),
            &InsightConfig::default(),
        )
        .into_iter()
        .filter(|i| i.kind == InsightKind::FocusArea)
        .collect()
    }

    #[test]
    fn test_center_box_rule_fires_above_threshold() {
        let insights = center_insights(&overview_with_center(55.0));
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].priority, Priority::Medium);
        assert!(insights[0].description.contains("50%"));
        assert_eq!(insights[0].source_data["threshold_pct"], json!(50.0));

        assert!(center_insights(&overview_with_center(45.0)).is_empty());
    }

    #[test]
    fn test_stars_rules() {
        let mut overview = overview_with_center(30.0);
        overview.stars = GroupShare {
            count: 3,
            percentage: 3.0,
        };
        let insights = generate_insights(
            &overview,
            &TimeAllocation::default(),
            &AnalysisReport::default(),
            &InsightConfig::default(),
        );
        let succession = insights.iter().find(|i| i.title.contains("Succession")).unwrap();
        assert_eq!(succession.priority, Priority::High);
        assert_eq!(insights[0].id, succession.id);

        overview.stars = GroupShare {
            count: 30,
            percentage: 30.0,
        };
        let insights = generate_insights(
            &overview,
            &TimeAllocation::default(),
            &AnalysisReport::default(),
            &InsightConfig::default(),
        );
        assert!(insights.iter().any(|i| i.title.contains("inflation")));
        assert!(!insights.iter().any(|i| i.title.contains("Succession")));
    }

    #[test]
    fn test_skewed_location_emits_one_high_anomaly() {
        let insights = run(&skewed_location_roster());

        let location: Vec<_> = insights
            .iter()
            .filter(|i| i.kind == InsightKind::Anomaly && i.category == "location")
            .collect();
        assert_eq!(location.len(), 1);
        assert_eq!(location[0].priority, Priority::High);
        assert_eq!(location[0].affected_count, 20);
        assert!(location[0].title.contains("Austin"));
        assert!(location[0].title.contains("higher"));
    }

    #[test]
    fn test_location_scenario_eighty_vs_thirty_five_percent() {
        // 16/20 high in Austin; six small offices of 5 with 2 highs between them.
        let mut roster = Vec::new();
        for i in 0..20 {
            let position = if i < 16 { 9 } else { 5 };
            roster.push(employee(&format!("EMP-A{:03}", i), "Austin", position));
        }
        for (office, loc) in ["Boston", "Cairo", "Denver", "Essen", "Faro", "Genoa"].iter().enumerate() {
            for i in 0..5 {
                let position = if office < 2 && i == 0 { 9 } else { 5 };
                roster.push(employee(&format!("EMP-{}{:03}", &loc[..1], i), loc, position));
            }
        }
        assert_eq!(roster.len(), 50);

        let analyses = AnalysisRegistry::standard(&AnalysisConfig::default()).run_all(&roster);
        let location = analyses.get("location").unwrap();
        assert!(location.status.is_flagged());
        let austin = location.deviations.iter().find(|d| d.group == "Austin").unwrap();
        assert_eq!(austin.observed_pct, 80.0);
        assert!((austin.expected_pct - 35.0).abs() <= 1.0);

        let insights = run(&roster);
        let anomalies: Vec<_> = insights
            .iter()
            .filter(|i| i.kind == InsightKind::Anomaly && i.category == "location")
            .collect();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].priority, Priority::High);
        assert_eq!(anomalies[0].affected_count, 20);
    }

    #[test]
    fn test_groups_differing_only_in_case_get_distinct_ids() {
        let mut roster = Vec::new();
        for (loc, highs, size) in [("NYC", 18, 20), ("nyc", 18, 20), ("Berlin", 2, 40)] {
            for i in 0..size {
                let position = if i < highs { 9 } else { 5 };
                roster.push(employee(&format!("EMP-{}{:03}", loc, i), loc, position));
            }
        }

        let insights = run(&roster);
        let location: Vec<_> = insights
            .iter()
            .filter(|i| i.kind == InsightKind::Anomaly && i.category == "location")
            .collect();
        assert!(location.iter().any(|i| i.title.starts_with("NYC")));
        assert!(location.iter().any(|i| i.title.starts_with("nyc")));

        let mut ids: Vec<&str> = insights.iter().map(|i| i.id.as_str()).collect();
        let count = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), count);
    }

    #[test]
    fn test_ids_are_stable_across_runs() {
        let roster = skewed_location_roster();
        let first: Vec<String> = run(&roster).into_iter().map(|i| i.id).collect();
        let second: Vec<String> = run(&roster).into_iter().map(|i| i.id).collect();
        assert_eq!(first, second);

        let mut unique = first.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), first.len());
    }

    #[test]
    fn test_sorted_by_priority_with_time_last() {
        let insights = run(&skewed_location_roster());
        let priorities: Vec<Priority> = insights.iter().map(|i| i.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        assert_eq!(priorities, sorted);

        let time: Vec<_> = insights
            .iter()
            .filter(|i| i.kind == InsightKind::TimeAllocation)
            .collect();
        assert_eq!(time.len(), 1);
        assert_eq!(time[0].priority, Priority::Low);
    }

    #[test]
    fn test_empty_roster_only_notice() {
        let insights = run(&[]);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].category, CATEGORY_DATA);
        assert_eq!(insights[0].affected_count, 0);
    }

    #[test]
    fn test_flagged_without_significant_groups_emits_category_insight() {
        let mut result = AnalysisResult::note("level", 40, "Ratings differ across level groups");
        result.status = AnalysisStatus::Warn;
        result.p_value = Some(0.03);
        let analyses = AnalysisReport {
            results: vec![result],
        };

        let insights = anomaly_insights(&analyses, &InsightConfig::default());
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].0.priority, Priority::Medium);
        assert_eq!(insights[0].0.affected_count, 40);
        assert_eq!(insights[0].0.title, "Level ratings differ overall");
    }

    #[test]
    fn test_ok_and_error_results_emit_nothing() {
        let ok = AnalysisResult::note("location", 10, "fine");
        let failed = AnalysisResult::failed("function", 10, "boom".to_string());
        let analyses = AnalysisReport {
            results: vec![ok, failed],
        };
        assert!(anomaly_insights(&analyses, &InsightConfig::default()).is_empty());
    }

    #[test]
    fn test_inflation_cluster() {
        let mut overview = overview_with_center(20.0);
        overview.stars = GroupShare {
            count: 30,
            percentage: 30.0,
        };
        overview.high_performers = GroupShare {
            count: 55,
            percentage: 55.0,
        };
        let insights = generate_insights(
            &overview,
            &TimeAllocation::default(),
            &AnalysisReport::default(),
            &InsightConfig::default(),
        );

        let clustered: Vec<_> = insights.iter().filter(|i| i.cluster_id.is_some()).collect();
        assert_eq!(clustered.len(), 2);
        assert_eq!(clustered[0].cluster_id, clustered[1].cluster_id);
    }

    #[test]
    fn test_source_data_is_bounded() {
        let config = InsightConfig {
            max_source_data_fields: 3,
            ..InsightConfig::default()
        };
        let insights = {
            let roster = skewed_location_roster();
            let overview = calculate_overview(&roster);
            let time = calculate_time_allocation(&roster, &TimeConfig::default());
            let analyses = AnalysisRegistry::standard(&AnalysisConfig::default()).run_all(&roster);
            generate_insights(&overview, &time, &analyses, &config)
        };
        assert!(insights.iter().all(|i| i.source_data.len() <= 3));
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(45.0), "45 min");
        assert_eq!(format_minutes(120.0), "2 h");
        assert_eq!(format_minutes(95.4), "1 h 35 min");
    }
}
