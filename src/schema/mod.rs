//! Schema module - Configuration and artifact types for stimulus search.

mod config;
mod stats;

pub use config::*;
pub use stats::*;
