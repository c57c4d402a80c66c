//! Ordered registry of anomaly analyses.
//!
//! The registry is built once at composition time and handed to the
//! engine by reference. Every analysis runs in isolation: an error or
//! panic in one becomes a `status=error` result for that entry only.

use crate::analysis::detectors;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::models::{AnalysisReport, AnalysisResult, Employee};
use futures::future::join_all;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A pure analysis over the roster.
pub type AnalysisFn =
    Arc<dyn Fn(&[Employee]) -> Result<AnalysisResult, AnalysisError> + Send + Sync>;

/// Ordered mapping of analysis name to analysis function.
#[derive(Clone, Default)]
pub struct AnalysisRegistry {
    entries: Vec<(String, AnalysisFn)>,
}

impl std::fmt::Debug for AnalysisRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisRegistry")
            .field("analyses", &self.names())
            .finish()
    }
}

impl AnalysisRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in location, function, level and tenure analyses.
    pub fn standard(config: &AnalysisConfig) -> Self {
        let mut registry = Self::new();

        let cfg = config.clone();
        registry.register(detectors::LOCATION, move |roster| detectors::location(roster, &cfg));
        let cfg = config.clone();
        registry.register(detectors::FUNCTION, move |roster| detectors::function(roster, &cfg));
        let cfg = config.clone();
        registry.register(detectors::LEVEL, move |roster| detectors::level(roster, &cfg));
        let cfg = config.clone();
        registry.register(detectors::TENURE, move |roster| detectors::tenure(roster, &cfg));

        registry
    }

    /// Register an analysis. Re-registering a name replaces it in place.
    pub fn register<F>(&mut self, name: &str, analysis: F) -> &mut Self
    where
        F: Fn(&[Employee]) -> Result<AnalysisResult, AnalysisError> + Send + Sync + 'static,
    {
        let analysis: AnalysisFn = Arc::new(analysis);
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = analysis,
            None => self.entries.push((name.to_string(), analysis)),
        }
        self
    }

    /// Registered analysis names, in order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Run every analysis one after another.
    pub fn run_all(&self, roster: &[Employee]) -> AnalysisReport {
        info!("Running {} analyses over {} employees", self.entries.len(), roster.len());

        let results = self
            .entries
            .iter()
            .map(|(name, analysis)| run_isolated(name, analysis, roster))
            .collect();

        AnalysisReport { results }
    }

    /// Run every analysis on the blocking thread pool in parallel.
    ///
    /// Results come back in registration order regardless of which
    /// analysis finishes first.
    pub async fn run_all_concurrent(&self, roster: Arc<[Employee]>) -> AnalysisReport {
        info!(
            "Running {} analyses concurrently over {} employees",
            self.entries.len(),
            roster.len()
        );

        let handles = self.entries.iter().map(|(name, analysis)| {
            let name = name.clone();
            let analysis = Arc::clone(analysis);
            let roster = Arc::clone(&roster);
            tokio::task::spawn_blocking(move || run_isolated(&name, &analysis, &roster))
        });

        let joined = join_all(handles).await;

        let results = joined
            .into_iter()
            .zip(self.entries.iter())
            .map(|(outcome, (name, _))| match outcome {
                Ok(result) => result,
                Err(e) => {
                    warn!("Analysis {} did not complete: {}", name, e);
                    AnalysisResult::failed(name, roster.len(), e.to_string())
                }
            })
            .collect();

        AnalysisReport { results }
    }
}

/// Run a single analysis, converting errors and panics into an error result.
fn run_isolated(name: &str, analysis: &AnalysisFn, roster: &[Employee]) -> AnalysisResult {
    debug!("Running analysis: {}", name);

    let outcome = catch_unwind(AssertUnwindSafe(|| analysis(roster)))
        .unwrap_or_else(|payload| Err(AnalysisError::Panicked(panic_message(payload.as_ref()))));

    match outcome {
        Ok(mut result) => {
            result.name = name.to_string();
            debug!("Analysis {} finished with status {}", name, result.status);
            result
        }
        Err(e) => {
            warn!("Analysis {} failed: {}", name, e);
            AnalysisResult::failed(name, roster.len(), e.to_string())
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::skewed_location_roster;
    use crate::models::AnalysisStatus;

    fn registry_with_failures() -> AnalysisRegistry {
        let mut registry = AnalysisRegistry::standard(&AnalysisConfig::default());
        registry.register("broken", |_| {
            Err(AnalysisError::Computation("division went sideways".to_string()))
        });
        registry.register("panicky", |_| panic!("boom"));
        registry
    }

    #[test]
    fn test_standard_registry_order() {
        let registry = AnalysisRegistry::standard(&AnalysisConfig::default());
        assert_eq!(registry.names(), vec!["location", "function", "level", "tenure"]);
    }

    #[test]
    fn test_register_replaces_in_place() {
        let mut registry = AnalysisRegistry::standard(&AnalysisConfig::default());
        registry.register("function", |roster| {
            Ok(AnalysisResult::note("ignored", roster.len(), "stub"))
        });
        assert_eq!(registry.names().len(), 4);
        assert_eq!(registry.names()[1], "function");

        let report = registry.run_all(&skewed_location_roster());
        let function = report.get("function").unwrap();
        assert_eq!(function.interpretation, "stub");
    }

    #[test]
    fn test_failures_are_isolated() {
        let registry = registry_with_failures();
        let report = registry.run_all(&skewed_location_roster());

        assert_eq!(report.results.len(), 6);
        assert_eq!(report.get("broken").unwrap().status, AnalysisStatus::Error);

        let panicky = report.get("panicky").unwrap();
        assert_eq!(panicky.status, AnalysisStatus::Error);
        assert!(panicky.error.as_deref().unwrap().contains("boom"));

        assert_eq!(report.get("location").unwrap().status, AnalysisStatus::Critical);
    }

    #[tokio::test]
    async fn test_concurrent_matches_sequential() {
        let registry = registry_with_failures();
        let roster = skewed_location_roster();

        let sequential = registry.run_all(&roster);
        let concurrent = registry.run_all_concurrent(Arc::from(roster)).await;

        assert_eq!(sequential, concurrent);
    }

    #[test]
    fn test_empty_registry() {
        let registry = AnalysisRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.run_all(&skewed_location_roster()).results.is_empty());
    }
}
