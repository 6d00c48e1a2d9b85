//! Synthetic/natural interleaving masks and their templates.

use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{ConfigError, validate_mask_template};

use super::ShapeError;

/// Boolean mask over an interleaved stimulus batch.
///
/// `true` marks a synthetic stimulus, `false` a natural one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mask(Vec<bool>);

impl Mask {
    pub fn new(entries: Vec<bool>) -> Self {
        Self(entries)
    }

    /// Mask marking `n` synthetic stimuli and nothing else.
    pub fn all_synthetic(n: usize) -> Self {
        Self(vec![true; n])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of synthetic positions.
    pub fn count_synthetic(&self) -> usize {
        self.0.iter().filter(|&&m| m).count()
    }

    /// Number of natural positions.
    pub fn count_natural(&self) -> usize {
        self.0.len() - self.count_synthetic()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.0.iter().copied()
    }

    /// Split a batch score array into (synthetic, natural) sub-arrays.
    pub fn split_scores(&self, scores: &[f32]) -> Result<(Vec<f32>, Vec<f32>), ShapeError> {
        if scores.len() != self.0.len() {
            return Err(ShapeError::MaskLength {
                mask: self.0.len(),
                batch: scores.len(),
            });
        }
        let mut synthetic = Vec::with_capacity(self.count_synthetic());
        let mut natural = Vec::with_capacity(self.count_natural());
        for (&m, &s) in self.0.iter().zip(scores) {
            if m {
                synthetic.push(s);
            } else {
                natural.push(s);
            }
        }
        Ok((synthetic, natural))
    }
}

/// Repeating boolean template from which per-generation masks are built.
#[derive(Debug, Clone)]
pub struct MaskTemplate {
    base: Vec<bool>,
    shuffle: bool,
}

impl MaskTemplate {
    /// Parse a `T`/`F` string, e.g. `"TTF"` for two synthetic per natural.
    ///
    /// The template must contain at least one `T`; a run with no synthetic
    /// stimuli has nothing to optimize.
    pub fn parse(template: &str, shuffle: bool) -> Result<Self, ConfigError> {
        validate_mask_template(template)?;
        Ok(Self {
            base: template.chars().map(|c| c == 'T').collect(),
            shuffle,
        })
    }

    /// Template producing purely synthetic batches.
    pub fn all_synthetic() -> Self {
        Self {
            base: vec![true],
            shuffle: false,
        }
    }

    /// Build a mask containing exactly `num_codes` synthetic positions by
    /// cycling the template, optionally shuffling the result.
    pub fn generate(&self, num_codes: usize, rng: &mut StdRng) -> Mask {
        let mut entries = Vec::new();
        let mut synthetic = 0;
        for &m in self.base.iter().cycle() {
            if synthetic == num_codes {
                break;
            }
            entries.push(m);
            if m {
                synthetic += 1;
            }
        }
        if self.shuffle {
            entries.shuffle(rng);
        }
        Mask::new(entries)
    }
}
