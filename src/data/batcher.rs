// ============================================================
// Layer 4 — Spectra Batcher
// ============================================================
// Implements Burn's Batcher trait to convert a Vec<SpectrumSample>
// into tensors.
//
// How batching works here:
//   Input:  Vec of N samples, each spectrum of length L and
//           each label vector of length K
//   Output: SpectraBatch with
//             spectra: [N, 1, L]   (one input channel for Conv1d)
//             labels:  [N, K]
//
//   Every spectrum has the same length (same pixel grid), so we
//   flatten row-major and build the tensor directly from its shape.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::domain::spectrum::SpectrumSample;

/// A batch of stars ready for the model forward pass.
#[derive(Debug, Clone)]
pub struct SpectraBatch<B: Backend> {
    /// Spectra — shape: [batch_size, 1, n_pixels]
    pub spectra: Tensor<B, 3>,

    /// Normalised labels — shape: [batch_size, n_targets]
    /// Missing labels hold MAGIC_NUMBER
    pub labels: Tensor<B, 2>,
}

/// Holds the target device so tensors are created on the correct GPU/CPU.
#[derive(Clone, Debug)]
pub struct SpectraBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> SpectraBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Build only the input tensor, for prediction where labels are unused
    pub fn spectra_tensor(&self, spectra: &[Vec<f32>]) -> Tensor<B, 3> {
        let n_stars  = spectra.len();
        let n_pixels = spectra.first().map_or(0, Vec::len);
        let flat: Vec<f32> = spectra.iter().flat_map(|s| s.iter().copied()).collect();
        Tensor::from_data(TensorData::new(flat, [n_stars, 1, n_pixels]), &self.device)
    }
}

impl<B: Backend> Batcher<SpectrumSample, SpectraBatch<B>> for SpectraBatcher<B> {
    fn batch(&self, items: Vec<SpectrumSample>) -> SpectraBatch<B> {
        let batch_size = items.len();
        let n_pixels   = items.first().map_or(0, |s| s.spectrum.len());
        let n_targets  = items.first().map_or(0, |s| s.labels.len());

        let spectra_flat: Vec<f32> = items
            .iter()
            .flat_map(|s| s.spectrum.iter().copied())
            .collect();
        let labels_flat: Vec<f32> = items
            .iter()
            .flat_map(|s| s.labels.iter().copied())
            .collect();

        let spectra = Tensor::<B, 3>::from_data(
            TensorData::new(spectra_flat, [batch_size, 1, n_pixels]),
            &self.device,
        );
        let labels = Tensor::<B, 2>::from_data(
            TensorData::new(labels_flat, [batch_size, n_targets]),
            &self.device,
        );

        SpectraBatch { spectra, labels }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_batch_shapes() {
        let device  = Default::default();
        let batcher = SpectraBatcher::<NdArray>::new(device);
        let items = vec![
            SpectrumSample { spectrum: vec![1.0, 2.0, 3.0], labels: vec![0.1, 0.2] },
            SpectrumSample { spectrum: vec![4.0, 5.0, 6.0], labels: vec![0.3, 0.4] },
        ];
        let batch = batcher.batch(items);
        assert_eq!(batch.spectra.dims(), [2, 1, 3]);
        assert_eq!(batch.labels.dims(), [2, 2]);

        let values = batch.spectra.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_spectra_tensor_only() {
        let batcher = SpectraBatcher::<NdArray>::new(Default::default());
        let t = batcher.spectra_tensor(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]);
        assert_eq!(t.dims(), [3, 1, 2]);
    }
}
