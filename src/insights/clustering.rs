//! Advisory root-cause clustering.
//!
//! Insights that share a root cause get the same `cluster_id` and
//! `cluster_title`. A cluster needs at least two members.

use crate::insights::ids::insight_id;
use crate::models::Insight;
use std::collections::HashMap;

/// The underlying cause an insight was generated from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RootCause {
    pub key: String,
    pub title: String,
}

impl RootCause {
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
        }
    }
}

/// Set cluster metadata on insights whose root cause appears more than once.
pub fn assign_clusters(items: &mut [(Insight, Option<RootCause>)]) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for (_, cause) in items.iter() {
        if let Some(cause) = cause {
            *counts.entry(cause.key.as_str()).or_default() += 1;
        }
    }

    let clustered: Vec<String> = counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(key, _)| key.to_string())
        .collect();

    for (insight, cause) in items.iter_mut() {
        match cause {
            Some(cause) if clustered.contains(&cause.key) => {
                insight.cluster_id = Some(insight_id("cluster", &[&cause.key]));
                insight.cluster_title = Some(cause.title.clone());
            }
            _ => {
                insight.cluster_id = None;
                insight.cluster_title = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InsightKind, Priority};
    use std::collections::BTreeMap;

    fn insight(id: &str) -> Insight {
        Insight {
            id: id.to_string(),
            kind: InsightKind::Anomaly,
            category: "location".to_string(),
            priority: Priority::Medium,
            title: String::new(),
            description: String::new(),
            affected_count: 0,
            source_data: BTreeMap::new(),
            cluster_id: None,
            cluster_title: None,
        }
    }

    #[test]
    fn test_shared_cause_clusters() {
        let cause = RootCause::new("dimension:location", "Rating differences by location");
        let mut items = vec![
            (insight("a"), Some(cause.clone())),
            (insight("b"), Some(cause)),
            (insight("c"), Some(RootCause::new("solo", "Solo"))),
            (insight("d"), None),
        ];

        assign_clusters(&mut items);

        assert!(items[0].0.cluster_id.is_some());
        assert_eq!(items[0].0.cluster_id, items[1].0.cluster_id);
        assert_eq!(
            items[1].0.cluster_title.as_deref(),
            Some("Rating differences by location")
        );
        assert!(items[2].0.cluster_id.is_none());
        assert!(items[3].0.cluster_id.is_none());
    }
}
