//! Meeting time budget.
//!
//! Each employee gets a base number of minutes scaled by how much
//! discussion their grid position usually needs. Minutes are summed per
//! normalized level bucket, a final-sweep buffer is added and the total
//! is clamped to the configured range.

use crate::config::TimeConfig;
use crate::models::{round1, Employee, LevelTime, TimeAllocation};
use tracing::debug;

/// Discussion weight per grid position (index = position - 1).
///
/// Corners and the off-diagonal "dilemma"/"enigma" boxes take the longest;
/// the center box is usually the quickest to confirm.
pub const POSITION_WEIGHTS: [f64; 9] = [1.5, 1.0, 1.0, 1.25, 0.75, 1.25, 1.25, 1.25, 1.5];

/// Canonical level buckets, most senior first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LevelBucket {
    Executive,
    Vp,
    Director,
    Manager,
    Ic,
}

impl LevelBucket {
    pub const ALL: [LevelBucket; 5] = [
        LevelBucket::Executive,
        LevelBucket::Vp,
        LevelBucket::Director,
        LevelBucket::Manager,
        LevelBucket::Ic,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            LevelBucket::Executive => "Executive",
            LevelBucket::Vp => "VP",
            LevelBucket::Director => "Director",
            LevelBucket::Manager => "Manager",
            LevelBucket::Ic => "IC",
        }
    }
}

/// Map a free-form level string onto a canonical bucket.
pub fn normalize_level(level: &str) -> LevelBucket {
    let level = level.trim().to_lowercase();
    let has_word = |word: &str| {
        level
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|token| token == word)
    };

    if level.contains("chief")
        || (has_word("executive") && !level.contains("account"))
        || (level.contains("president") && !level.contains("vice"))
        || ["ceo", "cfo", "cto", "coo", "svp", "evp", "exec"].iter().any(|w| has_word(w))
    {
        LevelBucket::Executive
    } else if level.contains("vice president") || has_word("vp") {
        LevelBucket::Vp
    } else if level.contains("director") || has_word("dir") || starts_with_code(&level, 'd') {
        LevelBucket::Director
    } else if level.contains("manager")
        || level.contains("lead")
        || has_word("mgr")
        || starts_with_code(&level, 'm')
    {
        LevelBucket::Manager
    } else {
        LevelBucket::Ic
    }
}

/// Matches short level codes such as `M2` or `D1`.
fn starts_with_code(level: &str, prefix: char) -> bool {
    let mut chars = level.chars();
    chars.next() == Some(prefix) && {
        let rest: String = chars.collect();
        !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
    }
}

fn position_weight(position: u8) -> f64 {
    match position {
        1..=9 => POSITION_WEIGHTS[(position - 1) as usize],
        _ => 1.0,
    }
}

/// Estimate the meeting duration and its split across level buckets.
pub fn calculate_time_allocation(roster: &[Employee], config: &TimeConfig) -> TimeAllocation {
    let mut buckets: Vec<(LevelBucket, usize, f64)> =
        LevelBucket::ALL.iter().map(|b| (*b, 0, 0.0)).collect();

    for employee in roster {
        let bucket = normalize_level(&employee.level);
        if let Some(entry) = buckets.iter_mut().find(|(b, _, _)| *b == bucket) {
            entry.1 += 1;
            entry.2 += config.base_minutes_per_employee * position_weight(employee.grid_position);
        }
    }

    let sweep = (roster.len() as f64 * config.sweep_minutes_per_employee).max(config.min_sweep_minutes);
    let raw_total: f64 = buckets.iter().map(|(_, _, m)| m).sum::<f64>() + sweep;
    // Not `clamp`: inverted or NaN bounds from a hand-edited config must not panic.
    let total = raw_total
        .max(config.min_total_minutes)
        .min(config.max_total_minutes);
    let scale = if raw_total > 0.0 { total / raw_total } else { 1.0 };

    debug!(
        "Time budget: raw {:.1} min, clamped {:.1} min (scale {:.3})",
        raw_total, total, scale
    );

    let share = |minutes: f64| if total > 0.0 { round1(minutes / total * 100.0) } else { 0.0 };

    let breakdown: Vec<LevelTime> = buckets
        .into_iter()
        .filter(|(_, count, _)| *count > 0)
        .map(|(bucket, count, minutes)| {
            let minutes = minutes * scale;
            LevelTime {
                level: bucket.label().to_string(),
                count,
                minutes: round1(minutes),
                percentage: share(minutes),
            }
        })
        .collect();

    let sweep_minutes = sweep * scale;

    TimeAllocation {
        total_minutes: round1(total),
        sweep_minutes: round1(sweep_minutes),
        sweep_percentage: share(sweep_minutes),
        suggested_sequence: breakdown.iter().map(|l| l.level.clone()).collect(),
        breakdown,
    }
}
