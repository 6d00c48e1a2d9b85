//! Serializable statistics artifact for a completed search run.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Persisted summary of a run's score history.
///
/// Lossless with respect to the message statistics: the best score, the
/// generation it occurred in and the full per-generation mean/SEM series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Highest synthetic score observed across all generations.
    pub best_score: f32,
    /// Generation index of the best score.
    pub best_generation: usize,
    /// Mean synthetic score per generation.
    pub mean_per_generation: Vec<f32>,
    /// Standard error of the mean per generation.
    pub sem_per_generation: Vec<f32>,
}

impl RunRecord {
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
