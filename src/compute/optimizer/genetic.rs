//! Population-based genetic search over latent codes.

use crate::compute::{CodeSampler, Mask, Population, ShapeError};
use crate::schema::{ConfigError, GeneticConfig};

use super::{Optimizer, OptimizerError, StepOverrides};

/// Genetic optimizer: elitism, fitness-weighted breeding, gene-wise
/// crossover and punctual mutation.
///
/// Scores are converted to selection probabilities with a temperature-scaled
/// softmax; low temperatures approach greedy selection, high temperatures
/// approach uniform sampling.
pub struct GeneticOptimizer {
    config: GeneticConfig,
    sampler: CodeSampler,
    codes: Option<Population>,
}

impl GeneticOptimizer {
    /// Validate the hyperparameters and build the optimizer.
    pub fn new(config: GeneticConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let sampler = CodeSampler::new(
            config.distribution,
            config.loc,
            config.scale,
            config.random_seed,
        );
        Ok(Self {
            config,
            sampler,
            codes: None,
        })
    }

    /// Number of codes currently optimized, or the configured population
    /// size before the first `init`.
    pub fn population_size(&self) -> usize {
        self.codes
            .as_ref()
            .map_or(self.config.population_size, Population::rows)
    }

    /// The hyperparameters fixed at construction.
    pub fn config(&self) -> &GeneticConfig {
        &self.config
    }

    /// One optimization step with per-call overrides.
    pub fn step_with(
        &mut self,
        scores: &[f32],
        mask: &Mask,
        overrides: StepOverrides,
    ) -> Result<Population, OptimizerError> {
        let current = self.codes.take().ok_or(OptimizerError::NotInitialized)?;
        let result = self.step_inner(&current, scores, mask, overrides);
        match result {
            Ok(next) => {
                self.codes = Some(next.clone());
                Ok(next)
            }
            Err(err) => {
                // A failed step leaves the population untouched.
                self.codes = Some(current);
                Err(err)
            }
        }
    }

    fn step_inner(
        &mut self,
        current: &Population,
        scores: &[f32],
        mask: &Mask,
        overrides: StepOverrides,
    ) -> Result<Population, OptimizerError> {
        let scores = synthetic_scores(scores, mask, current.rows())?;

        let temperature = overrides.temperature.unwrap_or(self.config.temperature);
        if !(temperature > 0.0) {
            return Err(ConfigError::InvalidTemperature(temperature).into());
        }
        let pop_size = overrides.population_size.unwrap_or(current.rows());
        if pop_size == 0 {
            return Err(ConfigError::InvalidPopulationSize.into());
        }
        // Elite and breed counts are recomputed against the requested size;
        // elites always come from (and cannot outnumber) the previous
        // population.
        let elite_count = overrides
            .elite_count
            .unwrap_or(self.config.elite_count)
            .min(pop_size)
            .min(scores.len());

        // Stable ascending argsort keeps tied individuals in their original
        // relative order.
        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

        let dim = current.dim();
        let mut data = Vec::with_capacity(pop_size * dim);
        for &index in &order[scores.len() - elite_count..] {
            data.extend_from_slice(current.row(index));
        }

        let fitness = softmax_fitness(&scores, temperature);
        let num_children = pop_size - elite_count;
        let mut children = self.breed(current, &fitness, num_children);
        self.mutate(&mut children);
        data.append(&mut children);

        Ok(Population::new(data, pop_size, dim)?)
    }

    /// Breed `num_children` children by fitness-weighted parent selection
    /// and gene-wise uniform crossover.
    fn breed(&mut self, current: &Population, fitness: &[f32], num_children: usize) -> Vec<f32> {
        let dim = current.dim();
        // A family cannot hold more distinct parents than the population.
        let family_size = self.config.num_parents.min(current.rows());

        let mut children = Vec::with_capacity(num_children * dim);
        for _ in 0..num_children {
            let family = self.sample_family(fitness, family_size);
            for gene in 0..dim {
                let parent = family[self.sampler.pick(family_size)];
                children.push(current.row(parent)[gene]);
            }
        }
        children
    }

    /// Sample `k` distinct parent indices weighted by fitness.
    ///
    /// A parent may recur across families but not within one.
    fn sample_family(&mut self, fitness: &[f32], k: usize) -> Vec<usize> {
        let mut weights = fitness.to_vec();
        let mut family = Vec::with_capacity(k);
        for _ in 0..k {
            let total: f32 = weights.iter().sum();
            let target = self.sampler.uniform() * total;
            let mut cumulative = 0.0;
            let mut chosen = None;
            for (index, &weight) in weights.iter().enumerate() {
                if weight <= 0.0 {
                    continue;
                }
                cumulative += weight;
                chosen = Some(index);
                if cumulative >= target {
                    break;
                }
            }
            // Every candidate weight can underflow to zero; fall back to
            // the first index not yet drawn.
            let chosen = chosen.unwrap_or_else(|| {
                (0..weights.len())
                    .find(|i| !family.contains(i))
                    .unwrap_or(0)
            });
            family.push(chosen);
            weights[chosen] = 0.0;
        }
        family
    }

    /// Punctual mutation: each coordinate is perturbed with probability
    /// `mutation_rate` by noise at scale `mutation_size`.
    fn mutate(&mut self, children: &mut [f32]) {
        let rate = self.config.mutation_rate;
        let size = self.config.mutation_size;
        for value in children.iter_mut() {
            if self.sampler.coin(rate) {
                *value += self.sampler.noise(size);
            }
        }
    }
}

impl Optimizer for GeneticOptimizer {
    fn init(&mut self, initial: Option<Population>) -> Result<Population, OptimizerError> {
        let codes = match initial {
            Some(codes) => {
                if codes.rows() != self.config.population_size
                    || codes.dim() != self.config.code_dim
                {
                    return Err(ShapeError::CodeShape {
                        rows: self.config.population_size,
                        dim: self.config.code_dim,
                        got_rows: codes.rows(),
                        got_dim: codes.dim(),
                    }
                    .into());
                }
                codes
            }
            None => self
                .sampler
                .sample_population(self.config.population_size, self.config.code_dim),
        };
        self.codes = Some(codes.clone());
        Ok(codes)
    }

    fn step(&mut self, scores: &[f32], mask: &Mask) -> Result<Population, OptimizerError> {
        self.step_with(scores, mask, StepOverrides::default())
    }

    fn codes(&self) -> Result<&Population, OptimizerError> {
        self.codes.as_ref().ok_or(OptimizerError::NotInitialized)
    }
}

/// Extract the synthetic subset of a batch score array.
fn synthetic_scores(
    scores: &[f32],
    mask: &Mask,
    population: usize,
) -> Result<Vec<f32>, OptimizerError> {
    let synthetic: Vec<f32> = if mask.is_empty() {
        scores.to_vec()
    } else {
        if mask.len() != scores.len() {
            return Err(ShapeError::MaskLength {
                mask: mask.len(),
                batch: scores.len(),
            }
            .into());
        }
        mask.iter()
            .zip(scores)
            .filter(|(m, _)| *m)
            .map(|(_, &s)| s)
            .collect()
    };
    if synthetic.len() != population {
        return Err(ShapeError::ScoreCount {
            expected: population,
            actual: synthetic.len(),
        }
        .into());
    }
    Ok(synthetic)
}

/// Convert scores to selection probabilities via temperature-scaled softmax.
///
/// The maximum is subtracted before exponentiating for numerical stability.
pub(crate) fn softmax_fitness(scores: &[f32], temperature: f32) -> Vec<f32> {
    let max = scores
        .iter()
        .copied()
        .max_by(f32::total_cmp)
        .unwrap_or(0.0);
    let exp: Vec<f32> = scores
        .iter()
        .map(|&s| ((s - max) / temperature).exp())
        .collect();
    let total: f32 = exp.iter().sum();
    exp.into_iter().map(|e| e / total).collect()
}
