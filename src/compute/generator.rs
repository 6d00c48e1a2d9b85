//! Generator boundary: codes to stimuli, with natural-image interleaving.

use super::{Mask, Population, ShapeError};

/// A batch of materialized stimuli sharing one item shape.
#[derive(Debug, Clone, PartialEq)]
pub struct StimulusBatch {
    data: Vec<f32>,
    item_shape: Vec<usize>,
    len: usize,
}

impl StimulusBatch {
    pub fn new(data: Vec<f32>, item_shape: Vec<usize>, len: usize) -> Result<Self, ShapeError> {
        let item_len: usize = item_shape.iter().product();
        if data.len() != len * item_len {
            return Err(ShapeError::BufferSize {
                len: data.len(),
                rows: len,
                dim: item_len,
            });
        }
        Ok(Self {
            data,
            item_shape,
            len,
        })
    }

    /// Number of stimuli in the batch.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Shape of a single stimulus.
    pub fn item_shape(&self) -> &[usize] {
        &self.item_shape
    }

    /// Flattened length of a single stimulus.
    pub fn item_len(&self) -> usize {
        self.item_shape.iter().product()
    }

    /// One stimulus, flattened.
    pub fn item(&self, index: usize) -> &[f32] {
        let item_len = self.item_len();
        &self.data[index * item_len..(index + 1) * item_len]
    }
}

/// Generator-boundary failures.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error("Natural stimuli requested but no source is configured")]
    NoNaturalSource,
    #[error("Natural stimulus source is empty")]
    EmptySource,
}

/// Opaque capability turning codes into synthetic stimuli.
pub trait Renderer {
    fn render(&mut self, codes: &Population) -> Result<StimulusBatch, GeneratorError>;
}

/// Trivial renderer: the stimulus is the code itself.
///
/// Useful for tests and for searches whose subject consumes the latent space
/// directly.
#[derive(Debug, Default)]
pub struct IdentityRenderer;

impl Renderer for IdentityRenderer {
    fn render(&mut self, codes: &Population) -> Result<StimulusBatch, GeneratorError> {
        Ok(StimulusBatch::new(
            codes.as_slice().to_vec(),
            vec![codes.dim()],
            codes.rows(),
        )?)
    }
}

/// A pulled batch of natural stimuli with their class labels.
#[derive(Debug, Clone)]
pub struct NaturalBatch {
    pub stimuli: StimulusBatch,
    pub labels: Vec<u32>,
}

/// Pull-based source of natural reference stimuli.
pub trait NaturalSource {
    /// Produce exactly `count` stimuli, wrapping around on exhaustion.
    fn next_batch(&mut self, count: usize) -> Result<NaturalBatch, GeneratorError>;
}

/// Natural source cycling over an owned batch with explicit wraparound.
pub struct CyclicSource {
    stimuli: StimulusBatch,
    labels: Vec<u32>,
    cursor: usize,
}

impl CyclicSource {
    pub fn new(stimuli: StimulusBatch, labels: Vec<u32>) -> Result<Self, GeneratorError> {
        if stimuli.is_empty() {
            return Err(GeneratorError::EmptySource);
        }
        if labels.len() != stimuli.len() {
            return Err(ShapeError::LabelCount {
                labels: labels.len(),
                naturals: stimuli.len(),
            }
            .into());
        }
        Ok(Self {
            stimuli,
            labels,
            cursor: 0,
        })
    }
}

impl NaturalSource for CyclicSource {
    fn next_batch(&mut self, count: usize) -> Result<NaturalBatch, GeneratorError> {
        let item_len = self.stimuli.item_len();
        let mut data = Vec::with_capacity(count * item_len);
        let mut labels = Vec::with_capacity(count);
        for _ in 0..count {
            data.extend_from_slice(self.stimuli.item(self.cursor));
            labels.push(self.labels[self.cursor]);
            self.cursor = (self.cursor + 1) % self.stimuli.len();
        }
        Ok(NaturalBatch {
            stimuli: StimulusBatch::new(data, self.stimuli.item_shape().to_vec(), count)?,
            labels,
        })
    }
}

/// Interleaves synthetic and natural stimuli according to a mask.
pub struct Generator<R: Renderer> {
    renderer: R,
    natural: Option<Box<dyn NaturalSource>>,
}

impl<R: Renderer> Generator<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            natural: None,
        }
    }

    /// Attach a natural-stimulus source.
    pub fn with_natural_source(mut self, source: Box<dyn NaturalSource>) -> Self {
        self.natural = Some(source);
        self
    }

    /// Render codes and interleave natural stimuli at mask-`false` positions.
    ///
    /// Returns the interleaved batch, the reconciled mask (an empty input
    /// mask becomes all-synthetic) and one label per natural stimulus, in
    /// batch order.
    pub fn generate(
        &mut self,
        codes: &Population,
        mask: &Mask,
    ) -> Result<(StimulusBatch, Mask, Vec<u32>), GeneratorError> {
        let mask = if mask.is_empty() {
            log::debug!(
                "empty mask reconciled to {} synthetic entries",
                codes.rows()
            );
            Mask::all_synthetic(codes.rows())
        } else {
            mask.clone()
        };

        if mask.count_synthetic() != codes.rows() {
            return Err(ShapeError::MaskSyntheticCount {
                marked: mask.count_synthetic(),
                codes: codes.rows(),
            }
            .into());
        }

        let num_natural = mask.count_natural();
        if num_natural > 0 && self.natural.is_none() {
            return Err(GeneratorError::NoNaturalSource);
        }

        let synthetic = self.renderer.render(codes)?;
        if synthetic.len() != codes.rows() {
            return Err(ShapeError::StimulusCount {
                expected: codes.rows(),
                actual: synthetic.len(),
            }
            .into());
        }

        let natural = match (&mut self.natural, num_natural) {
            (Some(source), n) if n > 0 => {
                let batch = source.next_batch(n)?;
                if batch.stimuli.item_shape() != synthetic.item_shape() {
                    return Err(ShapeError::StimulusShape {
                        natural: batch.stimuli.item_shape().to_vec(),
                        synthetic: synthetic.item_shape().to_vec(),
                    }
                    .into());
                }
                Some(batch)
            }
            _ => None,
        };

        let item_len = synthetic.item_len();
        let mut data = Vec::with_capacity(mask.len() * item_len);
        let (mut next_syn, mut next_nat) = (0, 0);
        for m in mask.iter() {
            if m {
                data.extend_from_slice(synthetic.item(next_syn));
                next_syn += 1;
            } else {
                // `natural` is present whenever the mask holds a `false`.
                let batch = natural.as_ref().ok_or(GeneratorError::NoNaturalSource)?;
                data.extend_from_slice(batch.stimuli.item(next_nat));
                next_nat += 1;
            }
        }

        let labels = natural.map(|b| b.labels).unwrap_or_default();
        let stimuli = StimulusBatch::new(data, synthetic.item_shape().to_vec(), mask.len())?;
        Ok((stimuli, mask, labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(rows: &[&[f32]]) -> Population {
        Population::from_rows(&rows.iter().map(|r| r.to_vec()).collect::<Vec<_>>()).unwrap()
    }

    fn source(items: &[&[f32]]) -> CyclicSource {
        let dim = items[0].len();
        let data = items.iter().flat_map(|r| r.iter().copied()).collect();
        let stimuli = StimulusBatch::new(data, vec![dim], items.len()).unwrap();
        CyclicSource::new(stimuli, (0..items.len() as u32).collect()).unwrap()
    }

    #[test]
    fn test_all_synthetic_generation() {
        let mut generator = Generator::new(IdentityRenderer);
        let pop = codes(&[&[1.0, 2.0], &[3.0, 4.0]]);

        let (stimuli, mask, labels) = generator
            .generate(&pop, &Mask::all_synthetic(2))
            .unwrap();
        assert_eq!(stimuli.len(), 2);
        assert_eq!(stimuli.item(1), &[3.0, 4.0]);
        assert_eq!(mask.count_synthetic(), 2);
        assert!(labels.is_empty());
    }

    #[test]
    fn test_empty_mask_reconciles_to_all_synthetic() {
        let mut generator = Generator::new(IdentityRenderer);
        let pop = codes(&[&[1.0], &[2.0], &[3.0]]);

        let (_, mask, _) = generator.generate(&pop, &Mask::new(vec![])).unwrap();
        assert_eq!(mask, Mask::all_synthetic(3));
    }

    #[test]
    fn test_interleaving_order_and_labels() {
        let mut generator = Generator::new(IdentityRenderer)
            .with_natural_source(Box::new(source(&[&[10.0], &[20.0]])));
        let pop = codes(&[&[1.0], &[2.0]]);
        let mask = Mask::new(vec![false, true, false, true, false]);

        let (stimuli, mask, labels) = generator.generate(&pop, &mask).unwrap();
        assert_eq!(stimuli.item(0), &[10.0]);
        assert_eq!(stimuli.item(1), &[1.0]);
        assert_eq!(stimuli.item(2), &[20.0]);
        assert_eq!(stimuli.item(3), &[2.0]);
        // Source wrapped around for the third natural.
        assert_eq!(stimuli.item(4), &[10.0]);
        assert_eq!(labels, vec![0, 1, 0]);
        assert_eq!(mask.count_natural(), 3);
    }

    #[test]
    fn test_mask_code_count_mismatch() {
        let mut generator = Generator::new(IdentityRenderer);
        let pop = codes(&[&[1.0], &[2.0]]);
        let mask = Mask::new(vec![true, false, true, true]);

        assert!(matches!(
            generator.generate(&pop, &mask),
            Err(GeneratorError::Shape(ShapeError::MaskSyntheticCount {
                marked: 3,
                codes: 2
            }))
        ));
    }

    #[test]
    fn test_naturals_without_source() {
        let mut generator = Generator::new(IdentityRenderer);
        let pop = codes(&[&[1.0]]);
        let mask = Mask::new(vec![true, false]);

        assert!(matches!(
            generator.generate(&pop, &mask),
            Err(GeneratorError::NoNaturalSource)
        ));
    }

    #[test]
    fn test_natural_shape_mismatch() {
        let mut generator = Generator::new(IdentityRenderer)
            .with_natural_source(Box::new(source(&[&[10.0, 11.0]])));
        let pop = codes(&[&[1.0]]);
        let mask = Mask::new(vec![true, false]);

        assert!(matches!(
            generator.generate(&pop, &mask),
            Err(GeneratorError::Shape(ShapeError::StimulusShape { .. }))
        ));
    }

    #[test]
    fn test_cyclic_source_label_count_check() {
        let stimuli = StimulusBatch::new(vec![1.0, 2.0], vec![1], 2).unwrap();
        assert!(CyclicSource::new(stimuli, vec![0]).is_err());
    }
}
