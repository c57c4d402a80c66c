//! The calibration engine.
//!
//! Composes the local pipeline (analyses, overview, time budget,
//! insights) with the optional narrative step. The local pipeline never
//! depends on the narrative: any narrative failure leaves
//! `narrative = None` and records why in `narrative_reason`.

use crate::analysis::AnalysisRegistry;
use crate::config::Config;
use crate::insights::generate_insights;
use crate::models::{AnalysisReport, Availability, EngineOutput, Employee, Insight, Priority};
use crate::narrative::NarrativeOrchestrator;
use crate::overview::{calculate_overview, calculate_time_allocation};
use crate::privacy::InternalPayload;
use std::sync::Arc;
use tracing::{info, warn};

pub struct CalibrationEngine {
    registry: AnalysisRegistry,
    config: Config,
    narrator: Option<NarrativeOrchestrator>,
}

impl CalibrationEngine {
    /// Engine with the standard analyses and no narrative step.
    pub fn new(config: Config) -> Self {
        Self {
            registry: AnalysisRegistry::standard(&config.analysis),
            config,
            narrator: None,
        }
    }

    /// Enable the narrative step.
    pub fn with_narrator(mut self, narrator: NarrativeOrchestrator) -> Self {
        self.narrator = Some(narrator);
        self
    }

    pub fn narrative_availability(&self) -> Availability {
        match &self.narrator {
            Some(narrator) => narrator.is_available(),
            None => Availability {
                available: false,
                reason: Some("Narrative generation is not enabled".to_string()),
            },
        }
    }

    /// Run the local pipeline, analyses one after another.
    pub fn analyze(&self, roster: &[Employee]) -> EngineOutput {
        let analyses = self.registry.run_all(roster);
        self.assemble(roster, analyses)
    }

    /// Run the local pipeline, analyses in parallel when configured.
    pub async fn analyze_async(&self, roster: &[Employee]) -> EngineOutput {
        if !self.config.analysis.concurrent {
            return self.analyze(roster);
        }
        let analyses = self.registry.run_all_concurrent(Arc::from(roster)).await;
        self.assemble(roster, analyses)
    }

    fn assemble(&self, roster: &[Employee], analyses: AnalysisReport) -> EngineOutput {
        let overview = calculate_overview(roster);
        let time_allocation = calculate_time_allocation(roster, &self.config.time);
        let insights = generate_insights(&overview, &time_allocation, &analyses, &self.config.insights);

        info!(
            "Local analysis complete: {} analyses, {} flagged, {} insights",
            analyses.results.len(),
            analyses.flagged().count(),
            insights.len()
        );

        EngineOutput {
            overview,
            time_allocation,
            analyses,
            insights,
            narrative: None,
            narrative_reason: None,
        }
    }

    /// High and medium priority insight ids, capped at the selection limit.
    pub fn default_selection(&self, insights: &[Insight]) -> Vec<String> {
        insights
            .iter()
            .filter(|i| matches!(i.priority, Priority::High | Priority::Medium))
            .take(self.config.narrative.max_selected)
            .map(|i| i.id.clone())
            .collect()
    }

    /// Run the local pipeline, then try to add a narrative.
    ///
    /// `selected` defaults to [`default_selection`](Self::default_selection).
    pub async fn run_with_narrative(
        &self,
        roster: &[Employee],
        selected: Option<&[String]>,
    ) -> EngineOutput {
        let mut output = self.analyze_async(roster).await;

        let narrator = match &self.narrator {
            Some(narrator) => narrator,
            None => {
                output.narrative_reason = self.narrative_availability().reason;
                return output;
            }
        };

        let availability = narrator.is_available();
        if !availability.available {
            info!(
                "Narrative unavailable: {}",
                availability.reason.as_deref().unwrap_or("unknown reason")
            );
            output.narrative_reason = availability.reason;
            return output;
        }

        let selection = match selected {
            Some(ids) => ids.to_vec(),
            None => self.default_selection(&output.insights),
        };
        if selected.is_none() && selection.is_empty() {
            output.narrative_reason =
                Some("No high or medium priority insights to summarize".to_string());
            return output;
        }

        let result = narrator
            .generate(&selection, InternalPayload::new(roster, &output))
            .await;

        match result {
            Ok(narrative) => {
                info!("Narrative generated with {} issues", narrative.issues.len());
                output.narrative = Some(narrative);
            }
            Err(e) => {
                if e.is_validation() {
                    warn!("Narrative request rejected: {}", e);
                } else {
                    warn!("Narrative generation failed, continuing without it: {}", e);
                }
                output.narrative_reason = Some(e.to_string());
            }
        }

        output
    }
}
