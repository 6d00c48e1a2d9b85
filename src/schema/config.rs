//! Configuration types for stimulus search runs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Probability distribution used for initial code sampling and mutation noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeDistribution {
    /// Standard normal distribution.
    #[default]
    Normal,
    /// Gumbel (extreme value) distribution.
    Gumbel,
    /// Laplace (double exponential) distribution.
    Laplace,
    /// Logistic distribution.
    Logistic,
}

impl CodeDistribution {
    /// Canonical lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Gumbel => "gumbel",
            Self::Laplace => "laplace",
            Self::Logistic => "logistic",
        }
    }
}

impl fmt::Display for CodeDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CodeDistribution {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "gumbel" => Ok(Self::Gumbel),
            "laplace" => Ok(Self::Laplace),
            "logistic" => Ok(Self::Logistic),
            other => Err(ConfigError::UnknownDistribution(other.to_string())),
        }
    }
}

/// Genetic optimizer hyperparameters.
///
/// All fields are fixed at construction of the optimizer; per-step overrides
/// exist for population size, temperature and elite count only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneticConfig {
    /// Dimensionality of a single latent code.
    pub code_dim: usize,
    /// Number of individuals per generation.
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Probability of mutating each coordinate of a bred child.
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f32,
    /// Scale of the mutation noise.
    #[serde(default = "default_mutation_size")]
    pub mutation_size: f32,
    /// Softmax temperature converting scores into selection probabilities.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Parents contributing genes to a single child.
    #[serde(default = "default_num_parents")]
    pub num_parents: usize,
    /// Top-scoring individuals carried unchanged into the next generation.
    #[serde(default = "default_elite_count")]
    pub elite_count: usize,
    /// Distribution for initial codes and mutation noise.
    #[serde(default)]
    pub distribution: CodeDistribution,
    /// Location parameter of the sampling distribution.
    #[serde(default)]
    pub loc: f32,
    /// Scale parameter of the sampling distribution.
    #[serde(default = "default_scale")]
    pub scale: f32,
    /// Seed for the optimizer-owned random generator.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl GeneticConfig {
    /// Config with defaults for everything but the code dimension.
    pub fn for_dim(code_dim: usize) -> Self {
        Self {
            code_dim,
            population_size: default_population_size(),
            mutation_rate: default_mutation_rate(),
            mutation_size: default_mutation_size(),
            temperature: default_temperature(),
            num_parents: default_num_parents(),
            elite_count: default_elite_count(),
            distribution: CodeDistribution::default(),
            loc: 0.0,
            scale: default_scale(),
            random_seed: None,
        }
    }

    /// Validate hyperparameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.code_dim == 0 {
            return Err(ConfigError::InvalidCodeDim);
        }
        if self.population_size == 0 {
            return Err(ConfigError::InvalidPopulationSize);
        }
        if self.elite_count > self.population_size {
            return Err(ConfigError::EliteExceedsPopulation {
                elite: self.elite_count,
                population: self.population_size,
            });
        }
        if self.num_parents < 1 {
            return Err(ConfigError::TooFewParents(self.num_parents));
        }
        if self.num_parents > self.population_size {
            return Err(ConfigError::TooManyParents {
                parents: self.num_parents,
                population: self.population_size,
            });
        }
        if !(self.temperature > 0.0) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(ConfigError::InvalidMutationRate(self.mutation_rate));
        }
        if !(self.scale > 0.0) {
            return Err(ConfigError::InvalidScale(self.scale));
        }
        Ok(())
    }
}

fn default_population_size() -> usize {
    50
}
fn default_mutation_rate() -> f32 {
    0.3
}
fn default_mutation_size() -> f32 {
    0.1
}
fn default_temperature() -> f32 {
    1.0
}
fn default_num_parents() -> usize {
    2
}
fn default_elite_count() -> usize {
    2
}
fn default_scale() -> f32 {
    1.0
}

/// A named subject layer with its flattened unit count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Layer name, as reported by the subject.
    pub name: String,
    /// Number of units in the flattened activation space.
    pub units: usize,
}

/// Top-level configuration for a closed-loop search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Number of generations to run.
    pub iterations: usize,
    /// Genetic optimizer hyperparameters.
    pub optimizer: GeneticConfig,
    /// Boolean template interleaving synthetic (`T`) and natural (`F`) stimuli.
    #[serde(default = "default_mask_template")]
    pub mask_template: String,
    /// Shuffle each generated mask.
    #[serde(default)]
    pub shuffle_mask: bool,
    /// Seed for mask shuffling.
    #[serde(default)]
    pub mask_seed: Option<u64>,
    /// Layers of the reference subject used by the demo binary.
    #[serde(default = "default_subject_layers")]
    pub subject_layers: Vec<LayerSpec>,
    /// Seed for the reference subject's projections.
    #[serde(default)]
    pub subject_seed: Option<u64>,
}

impl ExperimentConfig {
    /// Validate the run configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::InvalidIterations);
        }
        self.optimizer.validate()?;
        validate_mask_template(&self.mask_template)?;
        if self.subject_layers.is_empty() {
            return Err(ConfigError::NoSubjectLayers);
        }
        for layer in &self.subject_layers {
            if layer.units == 0 {
                return Err(ConfigError::EmptyLayer(layer.name.clone()));
            }
        }
        Ok(())
    }
}

fn default_mask_template() -> String {
    "T".to_string()
}

fn default_subject_layers() -> Vec<LayerSpec> {
    vec![
        LayerSpec {
            name: "conv".to_string(),
            units: 128,
        },
        LayerSpec {
            name: "fc".to_string(),
            units: 32,
        },
    ]
}

/// Check that a mask template only contains `T`/`F` and at least one `T`.
pub fn validate_mask_template(template: &str) -> Result<(), ConfigError> {
    for ch in template.chars() {
        if ch != 'T' && ch != 'F' {
            return Err(ConfigError::InvalidMaskTemplate(ch));
        }
    }
    if !template.contains('T') {
        return Err(ConfigError::MaskWithoutSynthetic);
    }
    Ok(())
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Code dimension must be non-zero")]
    InvalidCodeDim,
    #[error("Population size must be non-zero")]
    InvalidPopulationSize,
    #[error("Elite count {elite} exceeds population size {population}")]
    EliteExceedsPopulation { elite: usize, population: usize },
    #[error("At least one parent is required, got {0}")]
    TooFewParents(usize),
    #[error("Parent count {parents} exceeds population size {population}")]
    TooManyParents { parents: usize, population: usize },
    #[error("Temperature must be positive, got {0}")]
    InvalidTemperature(f32),
    #[error("Mutation rate must lie in [0, 1], got {0}")]
    InvalidMutationRate(f32),
    #[error("Distribution scale must be positive, got {0}")]
    InvalidScale(f32),
    #[error("Unknown code distribution: {0}")]
    UnknownDistribution(String),
    #[error("Iteration count must be non-zero")]
    InvalidIterations,
    #[error("Mask template contains invalid character '{0}' (expected 'T' or 'F')")]
    InvalidMaskTemplate(char),
    #[error("Mask template must mark at least one synthetic position")]
    MaskWithoutSynthetic,
    #[error("At least one subject layer is required")]
    NoSubjectLayers,
    #[error("Subject layer '{0}' has no units")]
    EmptyLayer(String),
    #[error("Unit index {index} out of bounds for layer of {size} units")]
    UnitOutOfBounds { index: usize, size: usize },
    #[error("Invalid unit range {start}..{end} for layer of {size} units")]
    InvalidUnitRange {
        start: usize,
        end: usize,
        size: usize,
    },
    #[error("Requested {count} random units from a layer of {size}")]
    TooManyRandomUnits { count: usize, size: usize },
    #[error("{indices} unit indices paired with {weights} weights")]
    WeightCountMismatch { indices: usize, weights: usize },
}
