//! The closed-loop driver: generate, evaluate, score, update, record.

use rand::prelude::*;

use super::optimizer::{Optimizer, OptimizerError};
use super::{
    GenerationRecord, Generator, GeneratorError, Mask, MaskTemplate, Message, Population,
    Renderer, ScoreError, Scorer, ShapeError, StimulusBatch, Subject, SubjectError,
};

/// Any failure inside a generation; always fatal to the run.
#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),
    #[error(transparent)]
    Generator(#[from] GeneratorError),
    #[error(transparent)]
    Subject(#[from] SubjectError),
    #[error(transparent)]
    Score(#[from] ScoreError),
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Running record of the best natural stimulus seen so far.
///
/// Tracked by the driver, independent of the optimizer.
#[derive(Debug, Clone)]
pub struct BestNatural {
    pub score: f32,
    pub generation: usize,
    /// Position within the interleaved batch.
    pub batch_index: usize,
    pub label: Option<u32>,
    /// The flattened stimulus itself.
    pub stimulus: Vec<f32>,
}

/// One full closed-loop search run.
///
/// The experiment exclusively owns and appends to the [`Message`]; the
/// optimizer owns its population; nothing else holds mutable state across
/// generations.
pub struct Experiment<R: Renderer, S: Subject, O: Optimizer> {
    generator: Generator<R>,
    subject: S,
    scorer: Scorer,
    optimizer: O,
    mask_template: MaskTemplate,
    iterations: usize,
    rng: StdRng,
    message: Message,
    best_natural: Option<BestNatural>,
}

impl<R: Renderer, S: Subject, O: Optimizer> Experiment<R, S, O> {
    pub fn new(
        generator: Generator<R>,
        subject: S,
        scorer: Scorer,
        optimizer: O,
        mask_template: MaskTemplate,
        iterations: usize,
        mask_seed: Option<u64>,
    ) -> Self {
        Self {
            generator,
            subject,
            scorer,
            optimizer,
            mask_template,
            iterations,
            rng: StdRng::seed_from_u64(mask_seed.unwrap_or_else(rand::random)),
            message: Message::new(),
            best_natural: None,
        }
    }

    /// Run the configured number of generations.
    ///
    /// Each generation is a strict sequential pipeline; the next population
    /// depends on the previous generation's scores, so nothing overlaps.
    pub fn run(&mut self, initial: Option<Population>) -> Result<(), ExperimentError> {
        let mut codes = self.optimizer.init(initial)?;
        log::info!(
            "starting run: {} generations, population {}, {} scoring units",
            self.iterations,
            codes.rows(),
            self.scorer.optimizing_units(),
        );

        for generation in 0..self.iterations {
            let mask = self.mask_template.generate(codes.rows(), &mut self.rng);
            let (stimuli, mask, labels) = self.generator.generate(&codes, &mask)?;

            let response = self.subject.observe(&stimuli)?;
            if response.rows() != stimuli.len() {
                return Err(ShapeError::ResponseRows {
                    layer: response
                        .layer_names()
                        .next()
                        .unwrap_or("<none>")
                        .to_string(),
                    rows: response.rows(),
                    batch: stimuli.len(),
                }
                .into());
            }

            let scores = self.scorer.score(&response)?;
            let (scores_gen, scores_nat) = mask.split_scores(&scores)?;

            self.update_best_natural(generation, &mask, &stimuli, &scores_nat, &labels);

            let next = self.optimizer.step(&scores, &mask)?;

            self.message.append_generation(GenerationRecord {
                codes,
                response,
                scores_gen,
                scores_nat,
                mask,
                labels,
            })?;
            codes = next;

            if let Ok(stats) = self.message.stats_gen() {
                log::debug!(
                    "generation {generation}: best {:.3}, mean {:.3}",
                    stats.best_per_generation[generation],
                    stats.mean_per_generation[generation],
                );
            }
        }

        if let Ok(stats) = self.message.stats_gen() {
            log::info!(
                "finished: best score {:.3} at generation {}",
                stats.best_score,
                stats.best_generation,
            );
        }
        Ok(())
    }

    fn update_best_natural(
        &mut self,
        generation: usize,
        mask: &Mask,
        stimuli: &StimulusBatch,
        scores_nat: &[f32],
        labels: &[u32],
    ) {
        // Batch positions of the natural stimuli, in order.
        let natural_positions: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter(|(_, m)| !m)
            .map(|(i, _)| i)
            .collect();

        for (nat_index, &score) in scores_nat.iter().enumerate() {
            let beats = self
                .best_natural
                .as_ref()
                .is_none_or(|best| score.total_cmp(&best.score).is_gt());
            if beats {
                let batch_index = natural_positions[nat_index];
                self.best_natural = Some(BestNatural {
                    score,
                    generation,
                    batch_index,
                    label: labels.get(nat_index).copied(),
                    stimulus: stimuli.item(batch_index).to_vec(),
                });
            }
        }
    }

    /// The accumulated run history.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Consume the experiment, keeping only its history.
    pub fn into_message(self) -> Message {
        self.message
    }

    /// Best natural stimulus observed, if any were presented.
    pub fn best_natural(&self) -> Option<&BestNatural> {
        self.best_natural.as_ref()
    }

    /// The scorer in use.
    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }
}
