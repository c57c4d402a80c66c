//! Built-in dimension analyses.
//!
//! Each analysis groups the roster by one categorical dimension and
//! compares every group's high-outcome rate with the pooled rate.

use crate::analysis::stats::{chi_square_test, rate, z_score};
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::models::{round1, round2, AnalysisResult, AnalysisStatus, Deviation, Employee};
use std::collections::BTreeMap;
use tracing::debug;

pub const LOCATION: &str = "location";
pub const FUNCTION: &str = "function";
pub const LEVEL: &str = "level";
pub const TENURE: &str = "tenure";

pub fn location(roster: &[Employee], config: &AnalysisConfig) -> Result<AnalysisResult, AnalysisError> {
    analyze_dimension(LOCATION, roster, config, |e| e.location.trim().to_string())
}

pub fn function(roster: &[Employee], config: &AnalysisConfig) -> Result<AnalysisResult, AnalysisError> {
    analyze_dimension(FUNCTION, roster, config, |e| e.job_function.trim().to_string())
}

pub fn level(roster: &[Employee], config: &AnalysisConfig) -> Result<AnalysisResult, AnalysisError> {
    analyze_dimension(LEVEL, roster, config, |e| e.level.trim().to_string())
}

pub fn tenure(roster: &[Employee], config: &AnalysisConfig) -> Result<AnalysisResult, AnalysisError> {
    analyze_dimension(TENURE, roster, config, |e| e.tenure_bucket().to_string())
}

/// Compare per-group high-outcome rates against the pooled rate.
///
/// Groups below `min_group_size` count toward the pooled rate but are
/// never flagged and are left out of the chi-square table.
pub fn analyze_dimension<F>(
    name: &str,
    roster: &[Employee],
    config: &AnalysisConfig,
    key: F,
) -> Result<AnalysisResult, AnalysisError>
where
    F: Fn(&Employee) -> String,
{
    if let Some(bad) = roster.iter().find(|e| !(1..=9).contains(&e.grid_position)) {
        return Err(AnalysisError::InvalidInput(format!(
            "grid position {} is outside 1-9",
            bad.grid_position
        )));
    }

    let total = roster.len();
    if total < 2 {
        return Ok(AnalysisResult::note(
            name,
            total,
            "Insufficient data: fewer than 2 employees in the roster.",
        ));
    }

    let mut groups: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for employee in roster {
        let label = key(employee);
        let label = if label.is_empty() { "Unspecified".to_string() } else { label };
        let entry = groups.entry(label).or_default();
        if employee.is_high_outcome() {
            entry.0 += 1;
        }
        entry.1 += 1;
    }

    let high_total: usize = groups.values().map(|(h, _)| h).sum();
    let pooled = rate(high_total, total);

    let mut deviations: Vec<Deviation> = groups
        .iter()
        .map(|(label, &(high, n))| {
            let observed = rate(high, n);
            let z = z_score(observed, pooled, n);
            Deviation {
                group: label.clone(),
                observed_pct: round1(observed * 100.0),
                expected_pct: round1(pooled * 100.0),
                z_score: round2(z),
                is_significant: n >= config.min_group_size && z.abs() > config.z_threshold,
                sample_size: n,
                high_count: high,
            }
        })
        .collect();

    deviations.sort_by(|a, b| {
        b.z_score
            .abs()
            .partial_cmp(&a.z_score.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.group.cmp(&b.group))
    });

    let eligible: Vec<(usize, usize)> = groups
        .values()
        .copied()
        .filter(|(_, n)| *n >= config.min_group_size)
        .collect();

    let Some(test) = chi_square_test(&eligible)? else {
        let mut result = AnalysisResult::note(
            name,
            total,
            format!(
                "Insufficient data: fewer than two {} groups with at least {} employees.",
                name, config.min_group_size
            ),
        );
        result.deviations = deviations;
        return Ok(result);
    };

    if !test.p_value.is_finite() || !test.statistic.is_finite() {
        return Err(AnalysisError::Computation(format!(
            "non-finite chi-square result for {}",
            name
        )));
    }

    let max_significant_z = deviations
        .iter()
        .filter(|d| d.is_significant)
        .map(|d| d.z_score.abs())
        .fold(0.0_f64, f64::max);

    let status = if test.p_value < config.critical_p_value || max_significant_z > config.critical_z {
        AnalysisStatus::Critical
    } else if test.p_value < config.warn_p_value {
        AnalysisStatus::Warn
    } else {
        AnalysisStatus::Ok
    };

    debug!(
        "{} analysis: chi2={:.3} df={} p={:.5} status={}",
        name, test.statistic, test.degrees_of_freedom, test.p_value, status
    );

    let interpretation = interpret(name, status, &deviations, test.p_value);

    Ok(AnalysisResult {
        name: name.to_string(),
        status,
        p_value: Some(test.p_value),
        chi_square: Some(test.statistic),
        degrees_of_freedom: Some(test.degrees_of_freedom),
        effect_size: Some(test.cramers_v),
        sample_size: total,
        deviations,
        interpretation,
        error: None,
    })
}

fn interpret(name: &str, status: AnalysisStatus, deviations: &[Deviation], p_value: f64) -> String {
    let significant: Vec<&Deviation> = deviations.iter().filter(|d| d.is_significant).collect();

    match status {
        AnalysisStatus::Ok => format!(
            "High ratings are distributed consistently across {} groups (p = {:.3}).",
            name, p_value
        ),
        _ if significant.is_empty() => format!(
            "Ratings differ across {} groups overall (p = {:.4}), but no single group stands out.",
            name, p_value
        ),
        _ => {
            let groups: Vec<String> = significant
                .iter()
                .map(|d| {
                    format!(
                        "{} ({:.1}% vs {:.1}% expected)",
                        d.group, d.observed_pct, d.expected_pct
                    )
                })
                .collect();
            format!(
                "Ratings differ significantly by {} (p = {:.4}): {}.",
                name,
                p_value,
                groups.join(", ")
            )
        }
    }
}
