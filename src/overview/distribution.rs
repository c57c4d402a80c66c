//! Roster distribution overview.

use crate::models::{
    grid_label, round1, CategoryCount, DataOverview, Employee, GroupShare, CENTER_BOX_POSITION,
    HIGH_PERFORMER_POSITIONS, LOW_PERFORMER_POSITIONS, STARS_POSITION,
};
use std::collections::HashMap;

/// Count the roster by level, function, location, tenure and grid position.
///
/// An empty roster yields an all-zero overview.
pub fn calculate_overview(roster: &[Employee]) -> DataOverview {
    let total = roster.len();

    let by_position: Vec<CategoryCount> = (1..=9u8)
        .map(|position| {
            let count = roster.iter().filter(|e| e.grid_position == position).count();
            CategoryCount {
                label: format!("{} - {}", position, grid_label(position)),
                count,
                percentage: percentage(count, total),
            }
        })
        .collect();

    DataOverview {
        total_employees: total,
        by_level: count_by(roster, |e| e.level.as_str()),
        by_function: count_by(roster, |e| e.job_function.as_str()),
        by_location: count_by(roster, |e| e.location.as_str()),
        by_tenure: count_by(roster, |e| e.tenure_bucket()),
        by_grid_position: by_position,
        stars: share(roster, &[STARS_POSITION]),
        center_box: share(roster, &[CENTER_BOX_POSITION]),
        high_performers: share(roster, &HIGH_PERFORMER_POSITIONS),
        low_performers: share(roster, &LOW_PERFORMER_POSITIONS),
    }
}

/// Percentage rounded to one decimal; zero when `total` is zero.
pub fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round1(count as f64 / total as f64 * 100.0)
}

fn share(roster: &[Employee], positions: &[u8]) -> GroupShare {
    let count = roster
        .iter()
        .filter(|e| positions.contains(&e.grid_position))
        .count();
    GroupShare {
        count,
        percentage: percentage(count, roster.len()),
    }
}

/// Counts per label, largest first, ties broken alphabetically.
fn count_by<'a, F>(roster: &'a [Employee], key: F) -> Vec<CategoryCount>
where
    F: Fn(&'a Employee) -> &'a str,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for employee in roster {
        let label = key(employee).trim();
        let label = if label.is_empty() { "Unspecified" } else { label };
        *counts.entry(label).or_default() += 1;
    }

    let mut result: Vec<CategoryCount> = counts
        .into_iter()
        .map(|(label, count)| CategoryCount {
            label: label.to_string(),
            count,
            percentage: percentage(count, roster.len()),
        })
        .collect();

    result.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::{employee, skewed_location_roster};

    fn sum(partition: &[CategoryCount]) -> f64 {
        partition.iter().map(|c| c.percentage).sum()
    }

    #[test]
    fn test_empty_roster_is_all_zero() {
        let overview = calculate_overview(&[]);
        assert_eq!(overview.total_employees, 0);
        assert!(overview.by_level.is_empty());
        assert!(overview.by_grid_position.iter().all(|c| c.count == 0 && c.percentage == 0.0));
        assert_eq!(overview.stars, GroupShare::default());
        assert_eq!(overview.center_box.percentage, 0.0);
    }

    #[test]
    fn test_partitions_sum_to_100() {
        let mut roster = skewed_location_roster();
        // Odd headcount and uneven groups to exercise rounding.
        roster.push(employee("EMP-X1", "Espoo", 1));
        roster.push(employee("EMP-X2", "Espoo", 7));
        roster[3].level = "M2".to_string();
        roster[4].job_function = "Finance".to_string();

        let overview = calculate_overview(&roster);
        for partition in [
            &overview.by_level,
            &overview.by_function,
            &overview.by_location,
            &overview.by_tenure,
            &overview.by_grid_position,
        ] {
            let total = sum(partition);
            assert!((total - 100.0).abs() <= 0.5, "partition summed to {}", total);
        }
    }

    #[test]
    fn test_named_groups() {
        let roster = skewed_location_roster();
        let overview = calculate_overview(&roster);

        assert_eq!(overview.total_employees, 50);
        assert_eq!(overview.stars.count, 22);
        assert_eq!(overview.stars.percentage, 44.0);
        assert_eq!(overview.center_box.count, 28);
        assert_eq!(overview.center_box.percentage, 56.0);
        assert_eq!(overview.high_performers.count, 22);
        assert_eq!(overview.low_performers.count, 0);
    }

    #[test]
    fn test_counts_sorted_by_size() {
        let overview = calculate_overview(&skewed_location_roster());
        assert_eq!(overview.by_location[0].label, "Austin");
        assert_eq!(overview.by_location[0].count, 20);
        assert_eq!(overview.by_location[1].label, "Berlin");
        assert_eq!(overview.by_location[0].percentage, 40.0);
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage(1, 3), 33.3);
        assert_eq!(percentage(2, 3), 66.7);
        assert_eq!(percentage(5, 0), 0.0);
    }
}
