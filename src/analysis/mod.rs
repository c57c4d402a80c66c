//! Statistical anomaly analyses over the roster.

pub mod detectors;
pub mod registry;
pub mod stats;

pub use registry::AnalysisRegistry;
