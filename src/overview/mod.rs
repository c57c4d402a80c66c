//! Distribution overview and meeting time budget.
//!
//! Both calculations are independent of the anomaly analyses and
//! never fail: an empty roster produces zeroed output.

pub mod distribution;
pub mod time;

pub use distribution::calculate_overview;
pub use time::calculate_time_allocation;
