//! Unit clusters and their mapping onto scoring weights.
//!
//! Cluster-conditioned experiments score a group of subject units together,
//! each unit contributing `1/len` by default so that cluster size does not
//! change the score magnitude.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::schema::ConfigError;

use super::ScoringUnits;

/// A group of unit indices within one layer, with optional per-unit weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    labels: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    weights: Option<Vec<f32>>,
}

impl Cluster {
    pub fn new(labels: Vec<usize>) -> Self {
        Self {
            labels,
            weights: None,
        }
    }

    /// Cluster with an explicit weight per unit.
    pub fn weighted(labels: Vec<usize>, weights: Vec<f32>) -> Result<Self, ConfigError> {
        if labels.len() != weights.len() {
            return Err(ConfigError::WeightCountMismatch {
                indices: labels.len(),
                weights: weights.len(),
            });
        }
        Ok(Self {
            labels,
            weights: Some(weights),
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Map the cluster onto scoring units.
    ///
    /// Without explicit weights each unit contributes uniformly at `1/len`.
    pub fn scoring_units(&self) -> ScoringUnits {
        let weights = match &self.weights {
            Some(w) => w.clone(),
            None => vec![1.0 / self.labels.len() as f32; self.labels.len()],
        };
        // Lengths were checked at construction.
        ScoringUnits::weighted(self.labels.clone(), weights).expect("matching lengths")
    }
}

/// An ordered collection of clusters partitioning a unit space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterSet {
    clusters: Vec<Cluster>,
}

impl ClusterSet {
    pub fn new(clusters: Vec<Cluster>) -> Self {
        Self { clusters }
    }

    /// Build from a flat labeling array: `labeling[unit] = cluster index`.
    pub fn from_labeling(labeling: &[usize]) -> Self {
        let count = labeling.iter().max().map_or(0, |&m| m + 1);
        let mut clusters = vec![Vec::new(); count];
        for (unit, &cluster) in labeling.iter().enumerate() {
            clusters[cluster].push(unit);
        }
        Self {
            clusters: clusters.into_iter().map(Cluster::new).collect(),
        }
    }

    /// Invert back to a flat labeling array.
    pub fn labeling(&self) -> Vec<usize> {
        let total = self.total_units();
        let mut labeling = vec![0; total];
        for (i, cluster) in self.clusters.iter().enumerate() {
            for &unit in cluster.labels() {
                labeling[unit] = i;
            }
        }
        labeling
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Cluster> {
        self.clusters.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter()
    }

    pub fn add(&mut self, cluster: Cluster) {
        self.clusters.push(cluster);
    }

    /// Total number of units across all clusters.
    pub fn total_units(&self) -> usize {
        self.clusters.iter().map(Cluster::len).sum()
    }

    /// Map cluster cardinality to the number of clusters of that size.
    pub fn cardinality_counts(&self) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        for cluster in &self.clusters {
            *counts.entry(cluster.len()).or_insert(0) += 1;
        }
        counts
    }

    /// Save as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, json)
    }

    /// Load from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let json = fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labeling_round_trip() {
        let labeling = vec![0, 1, 0, 2, 1, 0];
        let set = ClusterSet::from_labeling(&labeling);

        assert_eq!(set.len(), 3);
        assert_eq!(set.get(0).unwrap().labels(), &[0, 2, 5]);
        assert_eq!(set.get(1).unwrap().labels(), &[1, 4]);
        assert_eq!(set.get(2).unwrap().labels(), &[3]);
        assert_eq!(set.labeling(), labeling);
        assert_eq!(set.total_units(), 6);
    }

    #[test]
    fn test_uniform_scoring_weights() {
        let cluster = Cluster::new(vec![3, 7, 9, 11]);
        let units = cluster.scoring_units();
        assert_eq!(units.indices(), &[3, 7, 9, 11]);
        for &w in units.weights().unwrap() {
            assert_eq!(w, 0.25);
        }
    }

    #[test]
    fn test_explicit_weights() {
        let cluster = Cluster::weighted(vec![0, 1], vec![0.9, 0.1]).unwrap();
        assert_eq!(cluster.scoring_units().weights().unwrap(), &[0.9, 0.1]);

        assert!(Cluster::weighted(vec![0, 1], vec![0.9]).is_err());
    }

    #[test]
    fn test_cardinality_counts() {
        let set = ClusterSet::from_labeling(&[0, 0, 1, 1, 2]);
        let counts = set.cardinality_counts();
        assert_eq!(counts.get(&2), Some(&2));
        assert_eq!(counts.get(&1), Some(&1));
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusters.json");

        let mut set = ClusterSet::from_labeling(&[0, 1, 0]);
        set.add(Cluster::weighted(vec![5, 6], vec![0.5, 1.5]).unwrap());
        set.save(&path).unwrap();

        assert_eq!(ClusterSet::load(&path).unwrap(), set);
    }
}
