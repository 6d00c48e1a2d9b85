//! Gradient-free optimizers over latent code populations.

mod genetic;

pub use genetic::*;

use crate::schema::ConfigError;

use super::{Mask, Population, ShapeError};

/// Optimizer failures.
#[derive(Debug, thiserror::Error)]
pub enum OptimizerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error("Codes are not available before init")]
    NotInitialized,
}

/// Per-step overrides for parameters that may change between generations.
///
/// Anything left `None` falls back to the value fixed at construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepOverrides {
    /// Size of the next population.
    pub population_size: Option<usize>,
    /// Softmax temperature for this step.
    pub temperature: Option<f32>,
    /// Elites to carry forward this step.
    pub elite_count: Option<usize>,
}

/// A gradient-free optimizer owning its current code population.
///
/// The optimizer is the only mutator of its own population; callers observe
/// it through [`Optimizer::codes`] and receive owned copies from `init` and
/// `step`.
pub trait Optimizer {
    /// Install or sample the initial population.
    ///
    /// Supplied codes must match `(population_size, code_dim)`; otherwise
    /// they are sampled from the configured distribution. Deterministic for
    /// a fixed seed.
    fn init(&mut self, initial: Option<Population>) -> Result<Population, OptimizerError>;

    /// Produce the next population from the latest batch scores.
    ///
    /// `scores` covers the whole interleaved batch; entries at mask-`false`
    /// positions belong to natural stimuli and are ignored here. An empty
    /// mask is treated as all-synthetic. Inputs are never mutated.
    fn step(&mut self, scores: &[f32], mask: &Mask) -> Result<Population, OptimizerError>;

    /// The current population; fails before the first `init`.
    fn codes(&self) -> Result<&Population, OptimizerError>;
}
