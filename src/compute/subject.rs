//! Subject boundary: stimuli in, per-layer responses out.

use std::collections::BTreeMap;

use rand::prelude::*;
use rayon::prelude::*;

use super::{ShapeError, StimulusBatch};

/// Batched activations of a single layer, one row per stimulus.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerResponse {
    data: Vec<f32>,
    rows: usize,
    units: usize,
}

impl LayerResponse {
    pub fn new(data: Vec<f32>, rows: usize, units: usize) -> Result<Self, ShapeError> {
        if data.len() != rows * units {
            return Err(ShapeError::BufferSize {
                len: data.len(),
                rows,
                dim: units,
            });
        }
        Ok(Self { data, rows, units })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn units(&self) -> usize {
        self.units
    }

    /// Activations for one stimulus.
    pub fn row(&self, index: usize) -> &[f32] {
        let start = index * self.units;
        &self.data[start..start + self.units]
    }
}

/// A subject's response: layer name to batched activations.
///
/// All layers share one row count, equal to the presented batch size and in
/// presentation order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseBatch {
    layers: BTreeMap<String, LayerResponse>,
}

impl ResponseBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a layer, enforcing a consistent row count.
    pub fn insert(&mut self, name: impl Into<String>, layer: LayerResponse) -> Result<(), ShapeError> {
        let name = name.into();
        if let Some(rows) = self.layers.values().next().map(LayerResponse::rows)
            && layer.rows() != rows
        {
            return Err(ShapeError::ResponseRows {
                layer: name,
                rows: layer.rows(),
                batch: rows,
            });
        }
        self.layers.insert(name, layer);
        Ok(())
    }

    /// Shared row count; zero when no layer has been inserted.
    pub fn rows(&self) -> usize {
        self.layers.values().next().map_or(0, LayerResponse::rows)
    }

    pub fn layer(&self, name: &str) -> Option<&LayerResponse> {
        self.layers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.layers.contains_key(name)
    }

    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LayerResponse)> {
        self.layers.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Subject evaluation errors.
#[derive(Debug, thiserror::Error)]
pub enum SubjectError {
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error("Subject evaluation failed: {0}")]
    Evaluation(String),
}

/// Opaque evaluator producing per-layer responses to a stimulus batch.
pub trait Subject {
    /// Evaluate a batch; the first dimension of every returned layer equals
    /// the batch size, in presentation order.
    fn observe(&mut self, stimuli: &StimulusBatch) -> Result<ResponseBatch, SubjectError>;
}

/// Deterministic reference subject: seeded random projections with
/// rectification.
///
/// Stands in for a recorded network in tests and the demo binary. The
/// batched forward pass is parallelized internally, which callers never
/// observe beyond timing.
pub struct ProjectionSubject {
    layers: Vec<(String, ProjectionLayer)>,
    input_len: usize,
}

struct ProjectionLayer {
    /// Row-major `units x input_len` weights.
    weights: Vec<f32>,
    units: usize,
}

impl ProjectionSubject {
    /// Build from `(name, units)` layer specs with seeded weights.
    pub fn new(input_len: usize, layers: &[(&str, usize)], seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let layers = layers
            .iter()
            .map(|&(name, units)| {
                let scale = (1.0 / input_len as f32).sqrt();
                let weights = (0..units * input_len)
                    .map(|_| rng.sample::<f32, _>(rand_distr::StandardNormal) * scale)
                    .collect();
                (name.to_string(), ProjectionLayer { weights, units })
            })
            .collect();
        Self { layers, input_len }
    }

    /// Names of the layers this subject reports.
    pub fn layer_names(&self) -> Vec<String> {
        self.layers.iter().map(|(name, _)| name.clone()).collect()
    }

    fn forward_layer(&self, layer: &ProjectionLayer, stimuli: &StimulusBatch) -> Vec<f32> {
        (0..stimuli.len())
            .into_par_iter()
            .flat_map_iter(|i| {
                let input = stimuli.item(i);
                (0..layer.units).map(move |u| {
                    let row = &layer.weights[u * self.input_len..(u + 1) * self.input_len];
                    let sum: f32 = row.iter().zip(input).map(|(w, x)| w * x).sum();
                    sum.max(0.0)
                })
            })
            .collect()
    }
}

impl Subject for ProjectionSubject {
    fn observe(&mut self, stimuli: &StimulusBatch) -> Result<ResponseBatch, SubjectError> {
        if stimuli.item_len() != self.input_len {
            return Err(ShapeError::RowLength {
                got: stimuli.item_len(),
                expected: self.input_len,
            }
            .into());
        }
        let mut response = ResponseBatch::new();
        for (name, layer) in &self.layers {
            let data = self.forward_layer(layer, stimuli);
            response.insert(name.clone(), LayerResponse::new(data, stimuli.len(), layer.units)?)?;
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(rows: &[&[f32]]) -> StimulusBatch {
        let dim = rows[0].len();
        let data = rows.iter().flat_map(|r| r.iter().copied()).collect();
        StimulusBatch::new(data, vec![dim], rows.len()).unwrap()
    }

    #[test]
    fn test_response_row_consistency() {
        let mut response = ResponseBatch::new();
        response
            .insert("a", LayerResponse::new(vec![0.0; 6], 3, 2).unwrap())
            .unwrap();
        let err = response.insert("b", LayerResponse::new(vec![0.0; 4], 2, 2).unwrap());
        assert!(matches!(err, Err(ShapeError::ResponseRows { .. })));
    }

    #[test]
    fn test_projection_subject_shapes_and_order() {
        let mut subject = ProjectionSubject::new(4, &[("conv", 8), ("fc", 3)], 5);
        let stimuli = batch(&[&[1.0, 0.0, 0.0, 0.0], &[0.0, 1.0, 0.0, 0.0]]);
        let response = subject.observe(&stimuli).unwrap();

        assert_eq!(response.rows(), 2);
        assert_eq!(response.layer("conv").unwrap().units(), 8);
        assert_eq!(response.layer("fc").unwrap().units(), 3);

        // Same stimulus in a different slot produces the same row.
        let swapped = batch(&[&[0.0, 1.0, 0.0, 0.0], &[1.0, 0.0, 0.0, 0.0]]);
        let swapped_response = subject.observe(&swapped).unwrap();
        assert_eq!(
            response.layer("fc").unwrap().row(0),
            swapped_response.layer("fc").unwrap().row(1)
        );
    }

    #[test]
    fn test_projection_subject_is_deterministic() {
        let stimuli = batch(&[&[0.5, -0.5, 1.0]]);
        let mut a = ProjectionSubject::new(3, &[("out", 6)], 9);
        let mut b = ProjectionSubject::new(3, &[("out", 6)], 9);
        assert_eq!(a.observe(&stimuli).unwrap(), b.observe(&stimuli).unwrap());
    }

    #[test]
    fn test_input_length_mismatch() {
        let mut subject = ProjectionSubject::new(4, &[("out", 2)], 0);
        let stimuli = batch(&[&[1.0, 2.0]]);
        assert!(matches!(
            subject.observe(&stimuli),
            Err(SubjectError::Shape(ShapeError::RowLength { got: 2, expected: 4 }))
        ));
    }
}
