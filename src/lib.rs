//! Stimsearch - Closed-loop gradient-free stimulus search.
//!
//! This crate drives gradient-free optimization of latent codes against a
//! black-box subject, synthesizing stimuli that maximize a measured
//! response. A genetic optimizer proposes codes, an opaque generator turns
//! them into stimuli (optionally interleaved with natural reference
//! stimuli), the subject responds per layer, and a scorer reduces responses
//! to one scalar per stimulus that closes the loop.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Configuration and artifact types for search runs
//! - `compute`: The optimization core (optimizer, scorer, message, driver)
//!
//! # Example
//!
//! ```rust,no_run
//! use stimsearch::{
//!     compute::{
//!         Aggregate, Experiment, Generator, IdentityRenderer, MaskTemplate,
//!         ProjectionSubject, Reduction, Scorer, ScoringUnits,
//!         optimizer::GeneticOptimizer,
//!     },
//!     schema::GeneticConfig,
//! };
//!
//! // A subject standing in for a recorded network.
//! let subject = ProjectionSubject::new(16, &[("conv", 64)], 0);
//!
//! // Score the mean activation of every unit in "conv".
//! let scorer = Scorer::max_activity(
//!     [("conv".to_string(), ScoringUnits::uniform((0..64).collect()))].into(),
//!     Reduction::Mean,
//!     Aggregate::Mean,
//! );
//!
//! let optimizer = GeneticOptimizer::new(GeneticConfig::for_dim(16)).unwrap();
//!
//! let mut experiment = Experiment::new(
//!     Generator::new(IdentityRenderer),
//!     subject,
//!     scorer,
//!     optimizer,
//!     MaskTemplate::all_synthetic(),
//!     100,
//!     Some(0),
//! );
//! experiment.run(None).unwrap();
//!
//! let stats = experiment.message().stats_gen().unwrap();
//! println!("best score {} at generation {}", stats.best_score, stats.best_generation);
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::optimizer::{GeneticOptimizer, Optimizer, StepOverrides};
pub use compute::{Experiment, Generator, Mask, Message, Population, Scorer, Subject};
pub use schema::{CodeDistribution, ConfigError, ExperimentConfig, GeneticConfig, RunRecord};
