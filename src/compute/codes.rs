//! Latent code populations and seeded random code sampling.

use rand::prelude::*;
use rand_distr::{Gumbel, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::schema::CodeDistribution;

use super::ShapeError;

/// An ordered population of latent codes, stored row-major.
///
/// The code dimension is fixed for the lifetime of a run; the row count may
/// differ between generations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Population {
    data: Vec<f32>,
    rows: usize,
    dim: usize,
}

impl Population {
    /// Build from a flat row-major buffer.
    pub fn new(data: Vec<f32>, rows: usize, dim: usize) -> Result<Self, ShapeError> {
        if data.len() != rows * dim {
            return Err(ShapeError::BufferSize {
                len: data.len(),
                rows,
                dim,
            });
        }
        Ok(Self { data, rows, dim })
    }

    /// Build from individual code rows, which must all share one length.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, ShapeError> {
        let dim = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * dim);
        for row in rows {
            if row.len() != dim {
                return Err(ShapeError::RowLength {
                    got: row.len(),
                    expected: dim,
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            data,
            rows: rows.len(),
            dim,
        })
    }

    /// Number of individuals.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Code dimensionality.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// One individual's code.
    pub fn row(&self, index: usize) -> &[f32] {
        let start = index * self.dim;
        &self.data[start..start + self.dim]
    }

    /// Iterate over individuals in order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dim)
    }

    /// The flat row-major buffer.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Seeded random generator for code sampling, mutation noise and selection.
///
/// Owned per optimizer instance so that two searches with different seeds
/// never share random state.
pub struct CodeSampler {
    rng: StdRng,
    distribution: CodeDistribution,
    loc: f32,
    scale: f32,
    gumbel: Gumbel<f32>,
}

impl CodeSampler {
    /// Create from an optional seed; a missing seed draws one from the OS.
    pub fn new(distribution: CodeDistribution, loc: f32, scale: f32, seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(rand::random);
        Self {
            rng: StdRng::seed_from_u64(seed),
            distribution,
            loc,
            scale,
            // Parameters 0/1 are always valid for Gumbel.
            gumbel: Gumbel::new(0.0, 1.0).expect("unit Gumbel"),
        }
    }

    /// Sample a full population of `rows` codes of dimension `dim`.
    pub fn sample_population(&mut self, rows: usize, dim: usize) -> Population {
        let data = (0..rows * dim)
            .map(|_| self.loc + self.scale * self.standard())
            .collect();
        Population { data, rows, dim }
    }

    /// Zero-located noise draw at the given scale.
    pub fn noise(&mut self, scale: f32) -> f32 {
        scale * self.standard()
    }

    /// Bernoulli draw with probability `p`.
    pub fn coin(&mut self, p: f32) -> bool {
        self.rng.r#gen::<f32>() < p
    }

    /// Uniform draw in `[0, 1)`.
    pub fn uniform(&mut self) -> f32 {
        self.rng.r#gen()
    }

    /// Uniform index in `0..n`.
    pub fn pick(&mut self, n: usize) -> usize {
        self.rng.gen_range(0..n)
    }

    /// Shuffle a slice in place.
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        slice.shuffle(&mut self.rng);
    }

    /// One draw from the configured distribution with unit scale.
    fn standard(&mut self) -> f32 {
        match self.distribution {
            CodeDistribution::Normal => self.rng.sample(StandardNormal),
            CodeDistribution::Gumbel => self.rng.sample(self.gumbel),
            // rand_distr ships neither of these; invert the CDF over an
            // open-interval uniform draw.
            CodeDistribution::Laplace => {
                let u: f32 = self.rng.gen_range(f32::EPSILON..1.0);
                if u < 0.5 {
                    (2.0 * u).ln()
                } else {
                    -(2.0 * (1.0 - u)).ln()
                }
            }
            CodeDistribution::Logistic => {
                let u: f32 = self.rng.gen_range(f32::EPSILON..1.0 - f32::EPSILON);
                (u / (1.0 - u)).ln()
            }
        }
    }
}
