// ============================================================
// Layer 5 — Predictor
// ============================================================
use anyhow::{anyhow, Result};
use burn::{
    module::AutodiffModule,
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use ndarray::{Array2, Axis};

use crate::data::batcher::SpectraBatcher;
use crate::data::normalizer::LabelNormalizer;
use crate::domain::targets::TargetNames;
use crate::domain::traits::Persistable;
use crate::infra::checkpoint::RunArtifacts;
use crate::ml::model::SpectraCnn;

/// Labels in physical units plus a 1-sigma uncertainty per entry
#[derive(Debug, Clone)]
pub struct Prediction {
    pub values: Array2<f32>,
    pub errors: Array2<f32>,
}

/// Flatten a [rows, cols] tensor into an ndarray matrix
pub(crate) fn to_matrix<B: Backend>(t: Tensor<B, 2>) -> Result<Array2<f32>> {
    let [rows, cols] = t.dims();
    let values = t
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("Cannot read tensor data: {e:?}"))?;
    Ok(Array2::from_shape_vec((rows, cols), values)?)
}

pub struct Predictor<B: AutodiffBackend> {
    /// Autodiff copy, only used for Monte Carlo dropout
    model:      SpectraCnn<B>,
    inner:      SpectraCnn<B::InnerBackend>,
    normalizer: LabelNormalizer,
    targets:    TargetNames,
    batcher:    SpectraBatcher<B>,
}

impl<B: AutodiffBackend> Predictor<B> {
    pub fn from_run(artifacts: &RunArtifacts, device: &B::Device) -> Result<Self> {
        let model: SpectraCnn<B> = artifacts.load_model(device)?;
        let normalizer = LabelNormalizer::load(artifacts.dir())?;
        let targets    = TargetNames::load(artifacts.dir())?;
        tracing::info!("Model loaded from '{}'", artifacts.dir().display());
        Ok(Self::new(model, normalizer, targets, device.clone()))
    }

    pub fn new(
        model:      SpectraCnn<B>,
        normalizer: LabelNormalizer,
        targets:    TargetNames,
        device:     B::Device,
    ) -> Self {
        let inner = model.valid();
        Self { model, inner, normalizer, targets, batcher: SpectraBatcher::new(device) }
    }

    pub fn targets(&self) -> &TargetNames {
        &self.targets
    }

    pub fn normalizer(&self) -> &LabelNormalizer {
        &self.normalizer
    }

    pub fn model(&self) -> &SpectraCnn<B> {
        &self.model
    }

    /// Predict labels for every row of `spectra`.
    ///
    /// With `mc_samples > 1` each batch is passed through the network
    /// that many times with dropout active; the mean is the prediction
    /// and the standard deviation the uncertainty. Otherwise a single
    /// inference pass is made and the uncertainty is zero.
    pub fn predict(&self, spectra: &Array2<f32>, batch_size: usize, mc_samples: usize) -> Result<Prediction> {
        let n_targets  = self.normalizer.n_targets();
        let mut values = Array2::<f32>::zeros((0, n_targets));
        let mut errors = Array2::<f32>::zeros((0, n_targets));

        for chunk in spectra.axis_chunks_iter(Axis(0), batch_size.max(1)) {
            let rows: Vec<Vec<f32>> = chunk.outer_iter().map(|r| r.to_vec()).collect();
            let x = self.batcher.spectra_tensor(&rows);

            let (mean, spread) = if mc_samples > 1 {
                self.monte_carlo(x, mc_samples)?
            } else {
                let out = to_matrix(self.inner.forward(x.inner()))?;
                let zeros = Array2::zeros(out.raw_dim());
                (out, zeros)
            };
            values.append(Axis(0), mean.view())?;
            errors.append(Axis(0), spread.view())?;
        }

        Ok(Prediction {
            values: self.normalizer.denormalize(&values),
            errors: self.normalizer.denormalize_spread(&errors),
        })
    }

    /// Welford mean / population std over repeated dropout passes
    fn monte_carlo(&self, x: Tensor<B, 3>, samples: usize) -> Result<(Array2<f32>, Array2<f32>)> {
        let mut mean: Option<Array2<f32>> = None;
        let mut m2:   Option<Array2<f32>> = None;

        for k in 1..=samples {
            let draw  = to_matrix(self.model.forward_mc(x.clone()))?;
            let mu    = mean.get_or_insert_with(|| Array2::zeros(draw.raw_dim()));
            let sq    = m2.get_or_insert_with(|| Array2::zeros(draw.raw_dim()));
            let delta = &draw - &*mu;
            *mu += &(&delta / k as f32);
            let delta2 = &draw - &*mu;
            *sq += &(&delta * &delta2);
        }

        let mean = mean.ok_or_else(|| anyhow!("no Monte Carlo samples drawn"))?;
        let std  = m2
            .ok_or_else(|| anyhow!("no Monte Carlo samples drawn"))?
            .mapv(|v| (v / samples as f32).sqrt());
        Ok((mean, std))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::SpectraCnnConfig;
    use burn::backend::{Autodiff, NdArray};
    use ndarray::array;

    type TestBackend = Autodiff<NdArray>;

    fn predictor(dropout: f64) -> Predictor<TestBackend> {
        let device = Default::default();
        let model  = SpectraCnnConfig::new(16, 2)
            .with_hidden_1(8)
            .with_hidden_2(8)
            .with_dropout(dropout)
            .init::<TestBackend>(&device);
        let normalizer = LabelNormalizer::fit(&array![[4000.0, 1.0], [5000.0, 3.0]]);
        let targets    = TargetNames::parse("teff,logg").unwrap();
        Predictor::new(model, normalizer, targets, device)
    }

    #[test]
    fn test_deterministic_prediction_has_zero_error() {
        let p       = predictor(0.2);
        let spectra = Array2::<f32>::from_shape_fn((5, 16), |(i, j)| (i + j) as f32 * 0.1);
        let pred    = p.predict(&spectra, 2, 1).unwrap();
        assert_eq!(pred.values.dim(), (5, 2));
        assert!(pred.errors.iter().all(|&e| e == 0.0));
    }

    #[test]
    fn test_monte_carlo_without_dropout_matches_single_pass() {
        let p       = predictor(0.0);
        let spectra = Array2::<f32>::from_shape_fn((3, 16), |(i, j)| ((i * j) % 5) as f32);
        let single  = p.predict(&spectra, 8, 1).unwrap();
        let mc      = p.predict(&spectra, 8, 4).unwrap();
        for (a, b) in single.values.iter().zip(mc.values.iter()) {
            assert!((a - b).abs() < 1e-2 * (1.0 + a.abs()));
        }
        assert!(mc.errors.iter().all(|&e| e < 1e-2));
    }

    #[test]
    fn test_monte_carlo_dropout_spreads_predictions() {
        let p       = predictor(0.5);
        let spectra = Array2::<f32>::from_shape_fn((4, 16), |(i, j)| ((i + 2 * j) % 7) as f32 * 0.3);
        let pred    = p.predict(&spectra, 4, 8).unwrap();
        assert_eq!(pred.errors.dim(), (4, 2));
        assert!(pred.errors.iter().all(|e| e.is_finite() && *e >= 0.0));
        assert!(pred.errors.iter().any(|&e| e > 0.0));
    }

    #[test]
    fn test_prediction_does_not_depend_on_batch_neighbours() {
        let p       = predictor(0.0);
        let spectra = Array2::<f32>::from_shape_fn((4, 16), |(i, j)| ((i * 3 + j) % 5) as f32 - 2.0);
        let alone   = spectra.slice(ndarray::s![..1, ..]).to_owned();

        for mc_samples in [1, 4] {
            let batched = p.predict(&spectra, 4, mc_samples).unwrap();
            let single  = p.predict(&alone, 4, mc_samples).unwrap();
            for t in 0..2 {
                let (a, b) = (batched.values[[0, t]], single.values[[0, t]]);
                assert!((a - b).abs() < 1e-3 * (1.0 + a.abs()), "mc={mc_samples}: {a} vs {b}");
            }
        }
    }
}
