//! Markdown report generation.
//!
//! This module renders a calibration report for the meeting
//! facilitator: distribution overview, time budget, analysis results,
//! prioritized insights and the optional narrative.

use crate::config::ReportConfig;
use crate::models::{
    AnalysisResult, AnalysisStatus, CategoryCount, DataOverview, Insight, NarrativeSummary,
    Priority, Report, ReportMetadata, TimeAllocation,
};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report, config: &ReportConfig) -> String {
    let mut output = String::new();
    let out = &report.output;

    // Title
    output.push_str("# Calibration Report\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_table_of_contents(report));
    output.push_str(&generate_narrative_section(
        out.narrative.as_ref(),
        out.narrative_reason.as_deref(),
        report.metadata.model_used.is_some(),
    ));
    output.push_str(&generate_overview_section(&out.overview));
    output.push_str(&generate_time_section(&out.time_allocation));
    output.push_str(&generate_analysis_section(&out.analyses.results, config));
    output.push_str(&generate_insights_section(&out.insights, config));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Roster:** `{}`\n", metadata.roster_file));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if let Some(model) = &metadata.model_used {
        section.push_str(&format!("- **Narrative Model:** `{}`\n", model));
    }
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn generate_table_of_contents(report: &Report) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");
    if report.output.narrative.is_some() || report.metadata.model_used.is_some() {
        toc.push_str("- [Narrative](#narrative)\n");
    }
    toc.push_str("- [Overview](#overview)\n");
    toc.push_str("- [Time Budget](#time-budget)\n");
    toc.push_str("- [Analyses](#analyses)\n");
    toc.push_str("- [Insights](#insights)\n");
    toc.push('\n');

    toc
}

/// Narrative section. Omitted when no narrative was requested.
fn generate_narrative_section(
    narrative: Option<&NarrativeSummary>,
    reason: Option<&str>,
    requested: bool,
) -> String {
    let mut section = String::new();

    let narrative = match narrative {
        Some(n) => n,
        None => {
            if requested {
                section.push_str("## Narrative\n\n");
                section.push_str(&format!(
                    "> ⚠️ Narrative not available: {}. The insights below are complete.\n\n",
                    reason.unwrap_or("unknown reason")
                ));
            }
            return section;
        }
    };

    section.push_str("## Narrative\n\n");
    if let Some(summary) = &narrative.summary {
        section.push_str(summary);
        section.push_str("\n\n");
    }

    for (i, issue) in narrative.issues.iter().enumerate() {
        section.push_str(&format!(
            "### {}. {} {}\n\n",
            i + 1,
            issue.priority.emoji(),
            issue.title
        ));
        let mut meta = format!("*{} | {}", issue.priority, issue.category);
        if issue.affected_count > 0 {
            meta.push_str(&format!(" | {} affected", issue.affected_count));
        }
        if let Some(cluster) = &issue.cluster_title {
            meta.push_str(&format!(" | {}", cluster));
        }
        meta.push_str("*\n\n");
        section.push_str(&meta);

        if !issue.description.is_empty() {
            section.push_str(&format!("{}\n\n", issue.description));
        }
        if !issue.related_insight_ids.is_empty() {
            let ids: Vec<String> = issue
                .related_insight_ids
                .iter()
                .map(|id| format!("`{}`", id))
                .collect();
            section.push_str(&format!("Related insights: {}\n\n", ids.join(", ")));
        }
    }

    section
}

fn generate_overview_section(overview: &DataOverview) -> String {
    let mut section = String::new();

    section.push_str("## Overview\n\n");
    section.push_str(&format!(
        "**{} employees** in the roster.\n\n",
        overview.total_employees
    ));

    if overview.total_employees == 0 {
        return section;
    }

    section.push_str("| Group | Count | Share |\n");
    section.push_str("|:---|:---:|:---:|\n");
    for (label, share) in [
        ("Stars (9)", overview.stars),
        ("Center box (5)", overview.center_box),
        ("High performers (6, 8, 9)", overview.high_performers),
        ("Low performers (1, 2, 4)", overview.low_performers),
    ] {
        section.push_str(&format!(
            "| {} | {} | {:.1}% |\n",
            label, share.count, share.percentage
        ));
    }
    section.push('\n');

    section.push_str(&category_table("Grid Position", &overview.by_grid_position));
    section.push_str(&category_table("Level", &overview.by_level));
    section.push_str(&category_table("Function", &overview.by_function));
    section.push_str(&category_table("Location", &overview.by_location));
    section.push_str(&category_table("Tenure", &overview.by_tenure));

    section
}

fn category_table(heading: &str, rows: &[CategoryCount]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let mut table = String::new();
    table.push_str(&format!("### By {}\n\n", heading));
    table.push_str(&format!("| {} | Count | Share |\n", heading));
    table.push_str("|:---|:---:|:---:|\n");
    for row in rows {
        table.push_str(&format!(
            "| {} | {} | {:.1}% |\n",
            escape_cell(&row.label),
            row.count,
            row.percentage
        ));
    }
    table.push('\n');
    table
}

fn generate_time_section(time: &TimeAllocation) -> String {
    let mut section = String::new();

    section.push_str("## Time Budget\n\n");
    section.push_str(&format!(
        "Plan for **{:.0} minutes**, including {:.0} minutes ({:.1}%) for a final sweep.\n\n",
        time.total_minutes, time.sweep_minutes, time.sweep_percentage
    ));

    if !time.breakdown.is_empty() {
        section.push_str("| Level | Employees | Minutes | Share |\n");
        section.push_str("|:---|:---:|:---:|:---:|\n");
        for row in &time.breakdown {
            section.push_str(&format!(
                "| {} | {} | {:.0} | {:.1}% |\n",
                row.level, row.count, row.minutes, row.percentage
            ));
        }
        section.push('\n');
    }

    if !time.suggested_sequence.is_empty() {
        section.push_str(&format!(
            "Suggested order: {}\n\n",
            time.suggested_sequence.join(" → ")
        ));
    }

    section
}

fn status_badge(status: AnalysisStatus) -> &'static str {
    match status {
        AnalysisStatus::Ok => "✅ OK",
        AnalysisStatus::Warn => "🟡 WARN",
        AnalysisStatus::Critical => "🔴 CRITICAL",
        AnalysisStatus::Error => "❌ ERROR",
    }
}

fn generate_analysis_section(results: &[AnalysisResult], config: &ReportConfig) -> String {
    let mut section = String::new();

    section.push_str("## Analyses\n\n");
    if results.is_empty() {
        section.push_str("No analyses were run.\n\n");
        return section;
    }

    section.push_str("| Analysis | Status | p-value | Effect size | Employees |\n");
    section.push_str("|:---|:---:|:---:|:---:|:---:|\n");
    for result in results {
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            result.name,
            status_badge(result.status),
            result
                .p_value
                .map(|p| format!("{:.4}", p))
                .unwrap_or_else(|| "-".to_string()),
            result
                .effect_size
                .map(|v| format!("{:.2}", v))
                .unwrap_or_else(|| "-".to_string()),
            result.sample_size
        ));
    }
    section.push('\n');

    for result in results {
        section.push_str(&format!("### {}\n\n", capitalize(&result.name)));
        if let Some(error) = &result.error {
            section.push_str(&format!("**Error:** {}\n\n", error));
            continue;
        }
        section.push_str(&format!("{}\n\n", result.interpretation));

        if config.include_deviations && !result.deviations.is_empty() {
            section.push_str("| Group | Employees | Observed | Expected | z | Significant |\n");
            section.push_str("|:---|:---:|:---:|:---:|:---:|:---:|\n");
            for d in &result.deviations {
                section.push_str(&format!(
                    "| {} | {} | {:.1}% | {:.1}% | {:+.2} | {} |\n",
                    escape_cell(&d.group),
                    d.sample_size,
                    d.observed_pct,
                    d.expected_pct,
                    d.z_score,
                    if d.is_significant { "⚠️ yes" } else { "no" }
                ));
            }
            section.push('\n');
        }
    }

    section
}

fn generate_insights_section(insights: &[Insight], config: &ReportConfig) -> String {
    let mut section = String::new();

    section.push_str("## Insights\n\n");
    if insights.is_empty() {
        section.push_str("No insights were generated.\n\n");
        return section;
    }

    for priority in [Priority::High, Priority::Medium, Priority::Low] {
        let group: Vec<&Insight> = insights.iter().filter(|i| i.priority == priority).collect();
        if group.is_empty() {
            continue;
        }

        section.push_str(&format!(
            "### {} {} Priority ({})\n\n",
            priority.emoji(),
            priority,
            group.len()
        ));
        for insight in group {
            section.push_str(&generate_insight_block(insight, config));
        }
    }

    section
}

fn generate_insight_block(insight: &Insight, config: &ReportConfig) -> String {
    let mut block = String::new();

    block.push_str(&format!("#### {}\n\n", insight.title));
    let mut meta = format!("*{} | {} | `{}`", insight.kind, insight.category, insight.id);
    if insight.affected_count > 0 {
        meta.push_str(&format!(" | {} affected", insight.affected_count));
    }
    meta.push_str("*\n\n");
    block.push_str(&meta);

    if let Some(cluster) = &insight.cluster_title {
        block.push_str(&format!("> 🔗 **Related:** {}\n\n", cluster));
    }

    block.push_str(&format!("{}\n\n", insight.description));

    if config.include_source_data && !insight.source_data.is_empty() {
        block.push_str("<details>\n<summary>Source data</summary>\n\n```json\n");
        block.push_str(
            &serde_json::to_string_pretty(&insight.source_data).unwrap_or_default(),
        );
        block.push_str("\n```\n</details>\n\n");
    }

    block
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str("*Report generated by calibrator*\n");

    footer
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn escape_cell(s: &str) -> String {
    s.replace('|', "\\|")
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).context("Failed to serialize report")
}

/// Write report content to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create report file: {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write report file: {}", path.display()))?;

    Ok(())
}
