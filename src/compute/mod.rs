//! Compute module - The closed-loop optimization core.
//!
//! Data flows forward through a generation (codes to stimuli to responses to
//! scores) and scores flow back into the optimizer; the [`Message`] history
//! accumulates both.

mod cluster;
mod codes;
mod experiment;
mod generator;
mod mask;
mod message;
mod scorer;
mod subject;
mod units;

pub mod optimizer;

pub use cluster::*;
pub use codes::*;
pub use experiment::*;
pub use generator::*;
pub use mask::*;
pub use message::*;
pub use scorer::*;
pub use subject::*;
pub use units::*;

/// Mismatched array shapes or lengths at a call boundary.
///
/// Always fatal to the current call; the core performs no correction.
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    #[error("Expected codes of shape ({rows}, {dim}), got ({got_rows}, {got_dim})")]
    CodeShape {
        rows: usize,
        dim: usize,
        got_rows: usize,
        got_dim: usize,
    },
    #[error("Expected {expected} scores, got {actual}")]
    ScoreCount { expected: usize, actual: usize },
    #[error("Renderer produced {actual} stimuli for {expected} codes")]
    StimulusCount { expected: usize, actual: usize },
    #[error("Mask marks {marked} synthetic entries, but {codes} codes were supplied")]
    MaskSyntheticCount { marked: usize, codes: usize },
    #[error("Mask has {mask} entries, but the batch has {batch}")]
    MaskLength { mask: usize, batch: usize },
    #[error("Natural stimuli have shape {natural:?}, synthetic have shape {synthetic:?}")]
    StimulusShape {
        natural: Vec<usize>,
        synthetic: Vec<usize>,
    },
    #[error("Layer '{layer}' has {rows} rows for a batch of {batch}")]
    ResponseRows {
        layer: String,
        rows: usize,
        batch: usize,
    },
    #[error("Row has {got} values, expected {expected}")]
    RowLength { got: usize, expected: usize },
    #[error("Flat buffer of {len} values does not factor into {rows} rows of {dim}")]
    BufferSize { len: usize, rows: usize, dim: usize },
    #[error("{labels} labels for {naturals} natural stimuli")]
    LabelCount { labels: usize, naturals: usize },
}
