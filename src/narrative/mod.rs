//! Optional narrative synthesis over selected insights.

pub mod client;
pub mod orchestrator;
pub mod parser;

pub use orchestrator::NarrativeOrchestrator;
