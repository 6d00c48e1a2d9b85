//! Shared run history and derived statistics.
//!
//! The [`Message`] is the single record threaded through the loop: the
//! driver appends one [`GenerationRecord`] per generation and every other
//! component only reads it. Statistics are recomputed from the history on
//! access, so they can never drift from its content.

use crate::schema::RunRecord;

use super::{Mask, Population, ResponseBatch, ShapeError};

/// Everything recorded for one generation.
#[derive(Debug, Clone)]
pub struct GenerationRecord {
    /// The codes evaluated this generation.
    pub codes: Population,
    /// Subject responses to the full interleaved batch.
    pub response: ResponseBatch,
    /// Scores of the synthetic stimuli, in population order.
    pub scores_gen: Vec<f32>,
    /// Scores of the natural stimuli, in batch order.
    pub scores_nat: Vec<f32>,
    /// The interleaving mask for this generation's batch.
    pub mask: Mask,
    /// Class labels of the natural stimuli.
    pub labels: Vec<u32>,
}

/// History accessor invoked before anything was appended.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("No {0} in history")]
    Empty(&'static str),
}

/// Append-only history of a run, indexed by generation.
#[derive(Debug, Clone, Default)]
pub struct Message {
    history: Vec<GenerationRecord>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded generations.
    pub fn generations(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Append one generation, validating internal consistency.
    pub fn append_generation(&mut self, record: GenerationRecord) -> Result<(), ShapeError> {
        if record.mask.count_synthetic() != record.scores_gen.len() {
            return Err(ShapeError::MaskSyntheticCount {
                marked: record.mask.count_synthetic(),
                codes: record.scores_gen.len(),
            });
        }
        if record.scores_gen.len() != record.codes.rows() {
            return Err(ShapeError::ScoreCount {
                expected: record.codes.rows(),
                actual: record.scores_gen.len(),
            });
        }
        if record.mask.count_natural() != record.scores_nat.len() {
            return Err(ShapeError::MaskLength {
                mask: record.mask.count_natural(),
                batch: record.scores_nat.len(),
            });
        }
        if !record.labels.is_empty() && record.labels.len() != record.scores_nat.len() {
            return Err(ShapeError::LabelCount {
                labels: record.labels.len(),
                naturals: record.scores_nat.len(),
            });
        }
        self.history.push(record);
        Ok(())
    }

    /// Record of a specific generation.
    pub fn record(&self, generation: usize) -> Option<&GenerationRecord> {
        self.history.get(generation)
    }

    fn latest(&self, what: &'static str) -> Result<&GenerationRecord, HistoryError> {
        self.history.last().ok_or(HistoryError::Empty(what))
    }

    /// Latest codes.
    pub fn codes(&self) -> Result<&Population, HistoryError> {
        self.latest("codes").map(|r| &r.codes)
    }

    /// Latest subject response.
    pub fn response(&self) -> Result<&ResponseBatch, HistoryError> {
        self.latest("responses").map(|r| &r.response)
    }

    /// Latest synthetic scores.
    pub fn scores_gen(&self) -> Result<&[f32], HistoryError> {
        self.latest("synthetic scores").map(|r| r.scores_gen.as_slice())
    }

    /// Latest natural scores.
    pub fn scores_nat(&self) -> Result<&[f32], HistoryError> {
        self.latest("natural scores").map(|r| r.scores_nat.as_slice())
    }

    /// Latest mask.
    pub fn mask(&self) -> Result<&Mask, HistoryError> {
        self.latest("masks").map(|r| &r.mask)
    }

    /// Latest natural-stimulus labels.
    pub fn labels(&self) -> Result<&[u32], HistoryError> {
        self.latest("labels").map(|r| r.labels.as_slice())
    }

    /// The code with the highest synthetic score across all generations.
    pub fn best_code(&self) -> Result<&[f32], HistoryError> {
        let stats = self.stats_gen()?;
        let record = &self.history[stats.best_generation];
        Ok(record.codes.row(stats.best_index))
    }

    /// Statistics over the synthetic score history.
    pub fn stats_gen(&self) -> Result<ScoreStats, HistoryError> {
        self.score_stats(|r| &r.scores_gen, "synthetic scores")
    }

    /// Statistics over the natural score history.
    pub fn stats_nat(&self) -> Result<ScoreStats, HistoryError> {
        self.score_stats(|r| &r.scores_nat, "natural scores")
    }

    /// Persistable summary of the synthetic statistics.
    pub fn run_record(&self) -> Result<RunRecord, HistoryError> {
        let stats = self.stats_gen()?;
        Ok(RunRecord {
            best_score: stats.best_score,
            best_generation: stats.best_generation,
            mean_per_generation: stats.mean_per_generation,
            sem_per_generation: stats.sem_per_generation,
        })
    }

    fn score_stats(
        &self,
        select: impl Fn(&GenerationRecord) -> &Vec<f32>,
        what: &'static str,
    ) -> Result<ScoreStats, HistoryError> {
        if self.history.is_empty() {
            return Err(HistoryError::Empty(what));
        }

        // Global argmax, tracked as a (generation, index) pair directly so
        // that generations of different sizes unravel correctly.
        let mut best: Option<(f32, usize, usize)> = None;
        for (generation, record) in self.history.iter().enumerate() {
            for (index, &score) in select(record).iter().enumerate() {
                let better = match best {
                    None => true,
                    Some((b, _, _)) => score.total_cmp(&b).is_gt(),
                };
                if better {
                    best = Some((score, generation, index));
                }
            }
        }
        let (best_score, best_generation, best_index) =
            best.ok_or(HistoryError::Empty(what))?;

        let mean_per_generation: Vec<f32> =
            self.history.iter().map(|r| mean(select(r))).collect();
        let sem_per_generation: Vec<f32> =
            self.history.iter().map(|r| sem(select(r))).collect();
        let best_per_generation: Vec<f32> = self
            .history
            .iter()
            .map(|r| {
                select(r)
                    .iter()
                    .copied()
                    .max_by(f32::total_cmp)
                    .unwrap_or(f32::NAN)
            })
            .collect();
        let current = select(self.history.last().ok_or(HistoryError::Empty(what))?).clone();

        Ok(ScoreStats {
            best_score,
            best_generation,
            best_index,
            current,
            mean_per_generation,
            sem_per_generation,
            best_per_generation,
        })
    }
}

/// On-demand statistics over one score history.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreStats {
    /// Highest score across all generations.
    pub best_score: f32,
    /// Generation the best score occurred in.
    pub best_generation: usize,
    /// Index of the best score within its generation.
    pub best_index: usize,
    /// Scores of the latest generation.
    pub current: Vec<f32>,
    /// Mean score per generation.
    pub mean_per_generation: Vec<f32>,
    /// Standard error of the mean per generation.
    pub sem_per_generation: Vec<f32>,
    /// Best score per generation.
    pub best_per_generation: Vec<f32>,
}

fn mean(xs: &[f32]) -> f32 {
    if xs.is_empty() {
        return f32::NAN;
    }
    xs.iter().sum::<f32>() / xs.len() as f32
}

/// Standard error of the mean: population standard deviation over sqrt(n).
fn sem(xs: &[f32]) -> f32 {
    if xs.is_empty() {
        return f32::NAN;
    }
    let m = mean(xs);
    let variance = xs.iter().map(|x| (x - m) * (x - m)).sum::<f32>() / xs.len() as f32;
    variance.sqrt() / (xs.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::LayerResponse;

    fn record(codes: &[Vec<f32>], scores: &[f32]) -> GenerationRecord {
        record_with_nat(codes, scores, &[])
    }

    fn record_with_nat(
        codes: &[Vec<f32>],
        scores: &[f32],
        scores_nat: &[f32],
    ) -> GenerationRecord {
        let population = Population::from_rows(codes).unwrap();
        let batch = scores.len() + scores_nat.len();
        let mut mask = vec![true; scores.len()];
        mask.extend(vec![false; scores_nat.len()]);

        let mut response = ResponseBatch::new();
        response
            .insert("out", LayerResponse::new(vec![0.0; batch], batch, 1).unwrap())
            .unwrap();

        GenerationRecord {
            codes: population,
            response,
            scores_gen: scores.to_vec(),
            scores_nat: scores_nat.to_vec(),
            mask: Mask::new(mask),
            labels: vec![],
        }
    }

    fn gen_codes(generation: usize, rows: usize) -> Vec<Vec<f32>> {
        (0..rows)
            .map(|i| vec![generation as f32, i as f32])
            .collect()
    }

    #[test]
    fn test_accessors_fail_on_empty_history() {
        let message = Message::new();
        assert!(matches!(message.codes(), Err(HistoryError::Empty("codes"))));
        assert!(message.scores_gen().is_err());
        assert!(message.mask().is_err());
        assert!(message.stats_gen().is_err());
        assert!(message.best_code().is_err());
    }

    #[test]
    fn test_best_code_unravels_generation_and_index() {
        let mut message = Message::new();
        // Known maximum at generation 1, index 2.
        message
            .append_generation(record(&gen_codes(0, 4), &[0.1, 0.4, 0.3, 0.2]))
            .unwrap();
        message
            .append_generation(record(&gen_codes(1, 4), &[0.5, 0.6, 0.9, 0.7]))
            .unwrap();
        message
            .append_generation(record(&gen_codes(2, 4), &[0.8, 0.2, 0.1, 0.3]))
            .unwrap();

        let stats = message.stats_gen().unwrap();
        assert_eq!(stats.best_generation, 1);
        assert_eq!(stats.best_index, 2);
        assert_eq!(stats.best_score, 0.9);
        assert_eq!(message.best_code().unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn test_best_code_with_changing_population_size() {
        let mut message = Message::new();
        message
            .append_generation(record(&gen_codes(0, 3), &[0.1, 0.2, 0.3]))
            .unwrap();
        message
            .append_generation(record(&gen_codes(1, 5), &[0.1, 0.2, 0.3, 0.4, 2.0]))
            .unwrap();

        let stats = message.stats_gen().unwrap();
        assert_eq!((stats.best_generation, stats.best_index), (1, 4));
        assert_eq!(message.best_code().unwrap(), &[1.0, 4.0]);
    }

    #[test]
    fn test_stats_series() {
        let mut message = Message::new();
        message
            .append_generation(record(&gen_codes(0, 2), &[1.0, 3.0]))
            .unwrap();
        message
            .append_generation(record(&gen_codes(1, 2), &[5.0, 5.0]))
            .unwrap();

        let stats = message.stats_gen().unwrap();
        assert_eq!(stats.mean_per_generation, vec![2.0, 5.0]);
        assert_eq!(stats.best_per_generation, vec![3.0, 5.0]);
        assert_eq!(stats.current, vec![5.0, 5.0]);
        // First generation: std = 1, n = 2.
        assert!((stats.sem_per_generation[0] - 1.0 / 2.0f32.sqrt()).abs() < 1e-6);
        assert_eq!(stats.sem_per_generation[1], 0.0);
    }

    #[test]
    fn test_natural_stats_are_separate() {
        let mut message = Message::new();
        message
            .append_generation(record_with_nat(&gen_codes(0, 2), &[1.0, 2.0], &[10.0]))
            .unwrap();

        assert_eq!(message.stats_gen().unwrap().best_score, 2.0);
        assert_eq!(message.stats_nat().unwrap().best_score, 10.0);
    }

    #[test]
    fn test_append_validates_mask_consistency() {
        let mut message = Message::new();
        let mut bad = record(&gen_codes(0, 3), &[0.1, 0.2, 0.3]);
        bad.mask = Mask::new(vec![true, true]);
        assert!(matches!(
            message.append_generation(bad),
            Err(ShapeError::MaskSyntheticCount { marked: 2, codes: 3 })
        ));
    }

    #[test]
    fn test_run_record_matches_stats() {
        let mut message = Message::new();
        message
            .append_generation(record(&gen_codes(0, 2), &[1.0, 3.0]))
            .unwrap();
        message
            .append_generation(record(&gen_codes(1, 2), &[4.0, 2.0]))
            .unwrap();

        let stats = message.stats_gen().unwrap();
        let record = message.run_record().unwrap();
        assert_eq!(record.best_score, stats.best_score);
        assert_eq!(record.best_generation, 1);
        assert_eq!(record.mean_per_generation, stats.mean_per_generation);
        assert_eq!(record.sem_per_generation, stats.sem_per_generation);
    }
}
