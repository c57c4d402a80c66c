//! Insight generation from analysis results.

pub mod clustering;
pub mod generator;
pub mod ids;

pub use generator::generate_insights;
pub use ids::is_well_formed;
