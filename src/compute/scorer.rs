//! Score reduction: subject responses to one scalar per stimulus.
//!
//! A scorer is a two-stage composition: a [`Criterion`] maps a response to
//! one score vector per targeted layer, then an [`Aggregate`] reduces across
//! layers. Concrete behavior comes from composing small pieces rather than
//! subclassing.

use std::collections::BTreeMap;

use super::{ResponseBatch, ScoringUnits, ShapeError};

/// Per-layer score vectors, one entry per stimulus in the batch.
pub type LayerScores = BTreeMap<String, Vec<f32>>;

/// Scoring failures.
#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    #[error("Layers missing from subject response: {0:?}")]
    MissingLayers(Vec<String>),
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Units(#[from] crate::schema::ConfigError),
}

/// Within-layer reduction over the selected units of one stimulus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reduction {
    /// Mean activation across units.
    #[default]
    Mean,
    /// Summed activation across units.
    Sum,
}

/// First stage: response to per-layer score vectors.
pub trait Criterion {
    /// Score every targeted layer; the response may carry extra layers,
    /// which are ignored.
    fn evaluate(&self, response: &ResponseBatch) -> Result<LayerScores, ScoreError>;

    /// The layer-to-units mapping this criterion scores.
    fn targets(&self) -> &BTreeMap<String, ScoringUnits>;
}

/// Check that every required layer is present, naming the missing ones.
fn check_layers<'a>(
    required: impl Iterator<Item = &'a String>,
    response: &ResponseBatch,
) -> Result<(), ScoreError> {
    let missing: Vec<String> = required
        .filter(|name| !response.contains(name))
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ScoreError::MissingLayers(missing))
    }
}

/// Activation-maximization criterion over selected units.
///
/// Unweighted unit sets are reduced with [`Reduction`]; weighted sets use
/// the weighted sum directly, so uniform `1/len` weights reproduce the mean.
pub struct ActivationCriterion {
    targets: BTreeMap<String, ScoringUnits>,
    reduction: Reduction,
}

impl ActivationCriterion {
    pub fn new(targets: BTreeMap<String, ScoringUnits>, reduction: Reduction) -> Self {
        Self { targets, reduction }
    }

    /// Criterion over a single layer.
    pub fn single(layer: impl Into<String>, units: ScoringUnits, reduction: Reduction) -> Self {
        let mut targets = BTreeMap::new();
        targets.insert(layer.into(), units);
        Self::new(targets, reduction)
    }
}

impl Criterion for ActivationCriterion {
    fn evaluate(&self, response: &ResponseBatch) -> Result<LayerScores, ScoreError> {
        check_layers(self.targets.keys(), response)?;

        let mut scores = LayerScores::new();
        for (name, units) in &self.targets {
            // Presence was checked above.
            let layer = response.layer(name).ok_or_else(|| {
                ScoreError::MissingLayers(vec![name.clone()])
            })?;
            units.validate(layer.units())?;

            let layer_scores = (0..layer.rows())
                .map(|row| {
                    let activations = layer.row(row);
                    match units.weights() {
                        Some(weights) => units
                            .indices()
                            .iter()
                            .zip(weights)
                            .map(|(&u, &w)| w * activations[u])
                            .sum(),
                        None => {
                            let sum: f32 =
                                units.indices().iter().map(|&u| activations[u]).sum();
                            match self.reduction {
                                Reduction::Mean => sum / units.len() as f32,
                                Reduction::Sum => sum,
                            }
                        }
                    }
                })
                .collect();
            scores.insert(name.clone(), layer_scores);
        }
        Ok(scores)
    }

    fn targets(&self) -> &BTreeMap<String, ScoringUnits> {
        &self.targets
    }
}

/// Negative mean squared error against a fixed per-layer template.
///
/// Higher is better: a perfect match scores zero, everything else negative.
pub struct MseCriterion {
    templates: BTreeMap<String, Vec<f32>>,
    targets: BTreeMap<String, ScoringUnits>,
}

impl MseCriterion {
    /// Build from one template vector per layer.
    pub fn new(templates: BTreeMap<String, Vec<f32>>) -> Self {
        let targets = templates
            .iter()
            .map(|(name, template)| {
                (
                    name.clone(),
                    ScoringUnits::uniform((0..template.len()).collect()),
                )
            })
            .collect();
        Self { templates, targets }
    }
}

impl Criterion for MseCriterion {
    fn evaluate(&self, response: &ResponseBatch) -> Result<LayerScores, ScoreError> {
        check_layers(self.templates.keys(), response)?;

        let mut scores = LayerScores::new();
        for (name, template) in &self.templates {
            let layer = response.layer(name).ok_or_else(|| {
                ScoreError::MissingLayers(vec![name.clone()])
            })?;
            if layer.units() != template.len() {
                return Err(ScoreError::Shape(ShapeError::RowLength {
                    got: layer.units(),
                    expected: template.len(),
                }));
            }

            let layer_scores = (0..layer.rows())
                .map(|row| {
                    let activations = layer.row(row);
                    let mse: f32 = activations
                        .iter()
                        .zip(template)
                        .map(|(a, t)| (a - t) * (a - t))
                        .sum::<f32>()
                        / template.len() as f32;
                    -mse
                })
                .collect();
            scores.insert(name.clone(), layer_scores);
        }
        Ok(scores)
    }

    fn targets(&self) -> &BTreeMap<String, ScoringUnits> {
        &self.targets
    }
}

/// Second stage: cross-layer reduction of per-layer score vectors.
#[derive(Debug, Clone, Default)]
pub enum Aggregate {
    /// Unweighted mean across the layers the criterion produced.
    #[default]
    Mean,
    /// Sum across layers.
    Sum,
    /// Weighted sum with one weight per layer; negative weights penalize.
    Weighted(BTreeMap<String, f32>),
}

impl Aggregate {
    fn combine(&self, layer_scores: &LayerScores) -> Result<Vec<f32>, ScoreError> {
        let rows = layer_scores.values().next().map_or(0, Vec::len);
        let mut combined = vec![0.0f32; rows];

        match self {
            Self::Mean | Self::Sum => {
                for scores in layer_scores.values() {
                    for (acc, &s) in combined.iter_mut().zip(scores) {
                        *acc += s;
                    }
                }
                if matches!(self, Self::Mean) && !layer_scores.is_empty() {
                    let n = layer_scores.len() as f32;
                    for acc in &mut combined {
                        *acc /= n;
                    }
                }
            }
            Self::Weighted(signature) => {
                let missing: Vec<String> = signature
                    .keys()
                    .filter(|name| !layer_scores.contains_key(*name))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    return Err(ScoreError::MissingLayers(missing));
                }
                for (name, &weight) in signature {
                    for (acc, &s) in combined.iter_mut().zip(&layer_scores[name]) {
                        *acc += weight * s;
                    }
                }
            }
        }
        Ok(combined)
    }
}

/// Composed scorer: criterion then aggregate.
pub struct Scorer {
    criterion: Box<dyn Criterion>,
    aggregate: Aggregate,
}

impl Scorer {
    pub fn new(criterion: Box<dyn Criterion>, aggregate: Aggregate) -> Self {
        Self {
            criterion,
            aggregate,
        }
    }

    /// Activation-maximization scorer.
    pub fn max_activity(
        targets: BTreeMap<String, ScoringUnits>,
        reduction: Reduction,
        aggregate: Aggregate,
    ) -> Self {
        Self::new(Box::new(ActivationCriterion::new(targets, reduction)), aggregate)
    }

    /// Template-matching scorer with mean aggregation.
    pub fn mse(templates: BTreeMap<String, Vec<f32>>) -> Self {
        Self::new(Box::new(MseCriterion::new(templates)), Aggregate::Mean)
    }

    /// One scalar per stimulus in the batch.
    pub fn score(&self, response: &ResponseBatch) -> Result<Vec<f32>, ScoreError> {
        let layer_scores = self.criterion.evaluate(response)?;
        self.aggregate.combine(&layer_scores)
    }

    /// Total number of units contributing to the score.
    pub fn optimizing_units(&self) -> usize {
        self.criterion.targets().values().map(ScoringUnits::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::LayerResponse;

    fn constant_response(layers: &[(&str, f32, usize, usize)]) -> ResponseBatch {
        let mut response = ResponseBatch::new();
        for &(name, value, rows, units) in layers {
            response
                .insert(name, LayerResponse::new(vec![value; rows * units], rows, units).unwrap())
                .unwrap();
        }
        response
    }

    fn all_units(layers: &[(&str, usize)]) -> BTreeMap<String, ScoringUnits> {
        layers
            .iter()
            .map(|&(name, units)| {
                (
                    name.to_string(),
                    ScoringUnits::uniform((0..units).collect()),
                )
            })
            .collect()
    }

    #[test]
    fn test_mean_aggregation_of_constant_layers() {
        let response = constant_response(&[("a", 2.0, 5, 3), ("b", 4.0, 5, 3)]);
        let scorer = Scorer::max_activity(
            all_units(&[("a", 3), ("b", 3)]),
            Reduction::Mean,
            Aggregate::Mean,
        );

        let scores = scorer.score(&response).unwrap();
        assert_eq!(scores, vec![3.0; 5]);
    }

    #[test]
    fn test_sum_aggregation() {
        let response = constant_response(&[("a", 2.0, 2, 4), ("b", 4.0, 2, 4)]);
        let scorer = Scorer::max_activity(
            all_units(&[("a", 4), ("b", 4)]),
            Reduction::Mean,
            Aggregate::Sum,
        );
        assert_eq!(scorer.score(&response).unwrap(), vec![6.0, 6.0]);
    }

    #[test]
    fn test_weighted_layer_aggregation() {
        let response = constant_response(&[("a", 2.0, 3, 2), ("b", 4.0, 3, 2)]);
        let mut signature = BTreeMap::new();
        signature.insert("a".to_string(), 1.0);
        signature.insert("b".to_string(), -0.5);
        let scorer = Scorer::max_activity(
            all_units(&[("a", 2), ("b", 2)]),
            Reduction::Mean,
            Aggregate::Weighted(signature),
        );
        assert_eq!(scorer.score(&response).unwrap(), vec![0.0; 3]);
    }

    #[test]
    fn test_missing_layers_are_named() {
        let response = constant_response(&[("a", 1.0, 2, 2)]);
        let scorer = Scorer::max_activity(
            all_units(&[("a", 2), ("b", 2), ("c", 2)]),
            Reduction::Mean,
            Aggregate::Mean,
        );
        match scorer.score(&response) {
            Err(ScoreError::MissingLayers(names)) => {
                assert_eq!(names, vec!["b".to_string(), "c".to_string()]);
            }
            other => panic!("expected missing layers, got {other:?}"),
        }
    }

    #[test]
    fn test_extra_layers_are_ignored() {
        let response = constant_response(&[("a", 2.0, 2, 2), ("extra", 99.0, 2, 2)]);
        let scorer =
            Scorer::max_activity(all_units(&[("a", 2)]), Reduction::Mean, Aggregate::Mean);
        assert_eq!(scorer.score(&response).unwrap(), vec![2.0, 2.0]);
    }

    #[test]
    fn test_unit_subset_and_weights() {
        let mut response = ResponseBatch::new();
        response
            .insert(
                "a",
                LayerResponse::new(vec![1.0, 2.0, 3.0, 4.0, 10.0, 20.0, 30.0, 40.0], 2, 4)
                    .unwrap(),
            )
            .unwrap();

        // Unweighted subset, mean reduction.
        let scorer = Scorer::max_activity(
            [(
                "a".to_string(),
                ScoringUnits::uniform(vec![1, 3]),
            )]
            .into(),
            Reduction::Mean,
            Aggregate::Mean,
        );
        assert_eq!(scorer.score(&response).unwrap(), vec![3.0, 30.0]);

        // Weighted subset is a plain dot product.
        let scorer = Scorer::max_activity(
            [(
                "a".to_string(),
                ScoringUnits::weighted(vec![0, 2], vec![2.0, 1.0]).unwrap(),
            )]
            .into(),
            Reduction::Mean,
            Aggregate::Mean,
        );
        assert_eq!(scorer.score(&response).unwrap(), vec![5.0, 50.0]);
    }

    #[test]
    fn test_mse_criterion() {
        let mut response = ResponseBatch::new();
        response
            .insert(
                "out",
                LayerResponse::new(vec![1.0, 1.0, 3.0, 5.0], 2, 2).unwrap(),
            )
            .unwrap();
        let scorer = Scorer::mse([("out".to_string(), vec![1.0, 1.0])].into());

        let scores = scorer.score(&response).unwrap();
        assert_eq!(scores[0], 0.0);
        assert_eq!(scores[1], -10.0);
        assert_eq!(scorer.optimizing_units(), 2);
    }

    #[test]
    fn test_cluster_conditioned_scoring() {
        use crate::compute::Cluster;

        let mut response = ResponseBatch::new();
        response
            .insert(
                "layer",
                LayerResponse::new(vec![1.0, 2.0, 4.0, 8.0], 1, 4).unwrap(),
            )
            .unwrap();

        // The cluster's uniform 1/len mapping averages its member units.
        let cluster = Cluster::new(vec![1, 3]);
        let scorer = Scorer::max_activity(
            [("layer".to_string(), cluster.scoring_units())].into(),
            Reduction::Mean,
            Aggregate::Mean,
        );
        assert_eq!(scorer.score(&response).unwrap(), vec![5.0]);
        assert_eq!(scorer.optimizing_units(), 2);
    }

    #[test]
    fn test_optimizing_units_counts_targets() {
        let scorer = Scorer::max_activity(
            all_units(&[("a", 7), ("b", 5)]),
            Reduction::Mean,
            Aggregate::Mean,
        );
        assert_eq!(scorer.optimizing_units(), 12);
    }
}
