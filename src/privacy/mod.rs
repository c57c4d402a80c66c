//! Anonymization and sanitizing for anything sent outside the process.

pub mod packaging;
pub mod sanitizer;

pub use packaging::{anonymize_for_external, InternalPayload, PackagingOptions};
