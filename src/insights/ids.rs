//! Deterministic insight ids.
//!
//! An id is `<prefix>-<12 hex chars>`, where the hex is the start of a
//! SHA-256 over the JSON array `[prefix, part, ...]`. Identical inputs
//! always produce identical ids, so callers can dedupe and keep
//! selection state stable across runs.

use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Hex characters kept from the digest.
pub const ID_HASH_LEN: usize = 12;

/// Compute a deterministic id from a prefix and its discriminating values.
pub fn insight_id(prefix: &str, parts: &[&str]) -> String {
    let canonical: Vec<Value> = std::iter::once(prefix)
        .chain(parts.iter().copied())
        .map(|s| Value::String(s.trim().to_string()))
        .collect();
    let canonical = Value::Array(canonical).to_string();

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hex::encode(hasher.finalize());

    format!("{}-{}", prefix, &digest[..ID_HASH_LEN])
}

fn re_insight_id() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z_]{0,31}-[0-9a-f]{12}$").unwrap())
}

/// Whether `id` has the shape produced by [`insight_id`].
pub fn is_well_formed(id: &str) -> bool {
    re_insight_id().is_match(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insight_id_deterministic() {
        let a = insight_id("anomaly", &["location", "Austin", "above"]);
        let b = insight_id("anomaly", &["location", "Austin", "above"]);
        assert_eq!(a, b);
        assert!(a.starts_with("anomaly-"));
        assert_eq!(a.len(), "anomaly-".len() + ID_HASH_LEN);
    }

    #[test]
    fn test_insight_id_trims_whitespace() {
        assert_eq!(
            insight_id("anomaly", &["location", " Austin "]),
            insight_id("anomaly", &["location", "Austin"])
        );
    }

    #[test]
    fn test_insight_id_is_case_sensitive() {
        // Group labels are compared case-sensitively, so ids must be too.
        assert_ne!(
            insight_id("anomaly", &["location", "NYC", "above"]),
            insight_id("anomaly", &["location", "nyc", "above"])
        );
    }

    #[test]
    fn test_insight_id_differs() {
        assert_ne!(
            insight_id("anomaly", &["location", "Austin"]),
            insight_id("anomaly", &["location", "Berlin"])
        );
        // Boundaries between parts matter.
        assert_ne!(insight_id("dist", &["ab", "c"]), insight_id("dist", &["a", "bc"]));
    }

    #[test]
    fn test_is_well_formed() {
        assert!(is_well_formed(&insight_id("time", &["time_allocation"])));
        assert!(!is_well_formed("time-XYZ"));
        assert!(!is_well_formed("Time-0123456789ab"));
        assert!(!is_well_formed("time-0123456789abc"));
        assert!(!is_well_formed("'; DROP TABLE"));
    }
}
