//! Numeric helpers for the anomaly analyses.
//!
//! Rates are proportions in `[0, 1]`. The chi-square test works on a
//! 2×k table of (high, not high) counts per group.

use crate::error::AnalysisError;
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Result of a 2×k chi-square test of independence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChiSquare {
    pub statistic: f64,
    pub degrees_of_freedom: usize,
    pub p_value: f64,
    /// Cramér's V. For a 2×k table this is `sqrt(chi2 / n)`.
    pub cramers_v: f64,
}

/// Pooled proportion `successes / total`, zero for an empty sample.
pub fn rate(successes: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        successes as f64 / total as f64
    }
}

/// One-sample z-score of an observed group rate against the pooled rate.
///
/// Returns 0 when the pooled rate is degenerate (0 or 1) or the group is empty.
pub fn z_score(observed: f64, expected: f64, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let variance = expected * (1.0 - expected) / n as f64;
    if variance <= f64::EPSILON {
        return 0.0;
    }
    (observed - expected) / variance.sqrt()
}

/// Chi-square test over `(high_count, group_size)` pairs.
///
/// Returns `None` when fewer than two non-empty groups are supplied.
pub fn chi_square_test(groups: &[(usize, usize)]) -> Result<Option<ChiSquare>, AnalysisError> {
    let groups: Vec<(usize, usize)> = groups.iter().copied().filter(|(_, n)| *n > 0).collect();
    if groups.len() < 2 {
        return Ok(None);
    }

    let total: usize = groups.iter().map(|(_, n)| n).sum();
    let highs: usize = groups.iter().map(|(h, _)| h).sum();
    let pooled = rate(highs, total);
    let degrees_of_freedom = groups.len() - 1;

    if pooled <= 0.0 || pooled >= 1.0 {
        return Ok(Some(ChiSquare {
            statistic: 0.0,
            degrees_of_freedom,
            p_value: 1.0,
            cramers_v: 0.0,
        }));
    }

    let statistic: f64 = groups
        .iter()
        .map(|&(high, n)| {
            let expected_high = pooled * n as f64;
            let expected_low = (1.0 - pooled) * n as f64;
            let low = (n - high) as f64;
            (high as f64 - expected_high).powi(2) / expected_high
                + (low - expected_low).powi(2) / expected_low
        })
        .sum();

    Ok(Some(ChiSquare {
        statistic,
        degrees_of_freedom,
        p_value: chi_square_p_value(statistic, degrees_of_freedom)?,
        cramers_v: (statistic / total as f64).sqrt(),
    }))
}

/// Upper-tail probability of a chi-square statistic.
pub fn chi_square_p_value(statistic: f64, degrees_of_freedom: usize) -> Result<f64, AnalysisError> {
    if statistic <= 0.0 || degrees_of_freedom == 0 {
        return Ok(1.0);
    }
    let dist = ChiSquared::new(degrees_of_freedom as f64)
        .map_err(|e| AnalysisError::Computation(format!("chi-square distribution: {}", e)))?;
    Ok(dist.sf(statistic).clamp(0.0, 1.0))
}
