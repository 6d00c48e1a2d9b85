//! Selection of scoring units within a layer's flattened activation space.

use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::ConfigError;

/// How to pick units from a layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum UnitSelection {
    /// Every unit in the layer.
    All,
    /// An explicit list of unit indices.
    Indices { indices: Vec<usize> },
    /// A contiguous half-open range of units.
    Range { start: usize, end: usize },
    /// A seeded random sample without replacement.
    Random { count: usize },
}

impl UnitSelection {
    /// Resolve against a layer of `layer_size` flattened units.
    ///
    /// Every variant is bounds-checked; `Random` draws without replacement
    /// from the caller's generator.
    pub fn resolve(
        &self,
        layer_size: usize,
        rng: &mut StdRng,
    ) -> Result<ScoringUnits, ConfigError> {
        let indices = match self {
            Self::All => (0..layer_size).collect(),
            Self::Indices { indices } => {
                for &index in indices {
                    if index >= layer_size {
                        return Err(ConfigError::UnitOutOfBounds {
                            index,
                            size: layer_size,
                        });
                    }
                }
                indices.clone()
            }
            Self::Range { start, end } => {
                if start >= end || *end > layer_size {
                    return Err(ConfigError::InvalidUnitRange {
                        start: *start,
                        end: *end,
                        size: layer_size,
                    });
                }
                (*start..*end).collect()
            }
            Self::Random { count } => {
                if *count > layer_size {
                    return Err(ConfigError::TooManyRandomUnits {
                        count: *count,
                        size: layer_size,
                    });
                }
                rand::seq::index::sample(rng, layer_size, *count).into_vec()
            }
        };
        Ok(ScoringUnits::uniform(indices))
    }
}

/// A resolved set of unit indices, optionally weighted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringUnits {
    indices: Vec<usize>,
    weights: Option<Vec<f32>>,
}

impl ScoringUnits {
    /// Unweighted unit set.
    pub fn uniform(indices: Vec<usize>) -> Self {
        Self {
            indices,
            weights: None,
        }
    }

    /// Unit set with one weight per index.
    pub fn weighted(indices: Vec<usize>, weights: Vec<f32>) -> Result<Self, ConfigError> {
        if indices.len() != weights.len() {
            return Err(ConfigError::WeightCountMismatch {
                indices: indices.len(),
                weights: weights.len(),
            });
        }
        Ok(Self {
            indices,
            weights: Some(weights),
        })
    }

    /// Check all indices fall inside a layer of `layer_size` units.
    pub fn validate(&self, layer_size: usize) -> Result<(), ConfigError> {
        for &index in &self.indices {
            if index >= layer_size {
                return Err(ConfigError::UnitOutOfBounds {
                    index,
                    size: layer_size,
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn weights(&self) -> Option<&[f32]> {
        self.weights.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    #[test]
    fn test_resolve_all() {
        let units = UnitSelection::All.resolve(4, &mut rng()).unwrap();
        assert_eq!(units.indices(), &[0, 1, 2, 3]);
        assert!(units.weights().is_none());
    }

    #[test]
    fn test_resolve_indices_bounds() {
        let selection = UnitSelection::Indices {
            indices: vec![0, 5],
        };
        assert!(matches!(
            selection.resolve(4, &mut rng()),
            Err(ConfigError::UnitOutOfBounds { index: 5, size: 4 })
        ));
    }

    #[test]
    fn test_resolve_range() {
        let units = UnitSelection::Range { start: 2, end: 5 }
            .resolve(8, &mut rng())
            .unwrap();
        assert_eq!(units.indices(), &[2, 3, 4]);

        assert!(
            UnitSelection::Range { start: 2, end: 9 }
                .resolve(8, &mut rng())
                .is_err()
        );
        assert!(
            UnitSelection::Range { start: 3, end: 3 }
                .resolve(8, &mut rng())
                .is_err()
        );
    }

    #[test]
    fn test_resolve_random_sample() {
        let units = UnitSelection::Random { count: 3 }
            .resolve(10, &mut rng())
            .unwrap();
        assert_eq!(units.len(), 3);
        units.validate(10).unwrap();

        // Sampling is without replacement.
        let mut sorted = units.indices().to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 3);

        assert!(
            UnitSelection::Random { count: 11 }
                .resolve(10, &mut rng())
                .is_err()
        );
    }

    #[test]
    fn test_weighted_length_check() {
        assert!(ScoringUnits::weighted(vec![0, 1], vec![0.5, 0.5]).is_ok());
        assert!(matches!(
            ScoringUnits::weighted(vec![0, 1], vec![0.5]),
            Err(ConfigError::WeightCountMismatch {
                indices: 2,
                weights: 1
            })
        ));
    }
}
