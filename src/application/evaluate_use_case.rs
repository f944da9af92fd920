// ============================================================
// Layer 2 — Evaluate Use Case
// ============================================================
// Runs a trained network on a labelled test set:
//   1. Open the run folder and rebuild the predictor
//   2. Load test spectra + labels (same target count)
//   3. Predict (optionally with Monte Carlo dropout)
//   4. Save predictions.npy / prediction_errors.npy
//   5. Residual statistics and one plot per target

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::tensor::backend::AutodiffBackend;
use ndarray_npy::write_npy;

use crate::data::loader::NpyLoader;
use crate::domain::traits::SpectraSource;
use crate::infra::checkpoint::RunArtifacts;
use crate::ml::predictor::Predictor;
use crate::plotting::residual::{plot_residuals, ResidualStats};

pub const PREDICTIONS_FILE: &str = "predictions.npy";
pub const ERRORS_FILE:      &str = "prediction_errors.npy";

#[derive(Debug, Clone)]
pub struct EvaluateConfig {
    pub run_dir:      PathBuf,
    pub spectra_path: PathBuf,
    pub labels_path:  PathBuf,
    pub batch_size:   usize,
    /// Dropout passes per star; 0 or 1 disables Monte Carlo
    pub mc_samples:   usize,
}

pub struct EvaluateUseCase {
    config: EvaluateConfig,
}

impl EvaluateUseCase {
    pub fn new(config: EvaluateConfig) -> Self {
        Self { config }
    }

    /// Returns the residual statistics per target
    pub fn execute<B: AutodiffBackend>(&self, device: B::Device) -> Result<Vec<(String, ResidualStats)>> {
        let cfg       = &self.config;
        let artifacts = RunArtifacts::open(&cfg.run_dir)?;
        let predictor = Predictor::<B>::from_run(&artifacts, &device)?;
        let n_pixels  = artifacts.load_model_config()?.n_pixels;
        match artifacts.load_train_config() {
            Ok(trained) => tracing::info!(
                "Network trained for {} epochs on '{}'",
                trained.epochs,
                trained.spectra_path.display()
            ),
            Err(e) => tracing::warn!("No training configuration in run folder: {:#}", e),
        }

        let test_set = NpyLoader::new(&cfg.spectra_path, &cfg.labels_path)
            .expect_targets(predictor.targets().len())
            .expect_pixels(n_pixels)
            .load()
            .context("Cannot load test data")?;
        tracing::info!("Evaluating on {} stars", test_set.len());

        let prediction = predictor.predict(test_set.spectra(), cfg.batch_size, cfg.mc_samples)?;

        let values_path = artifacts.dir().join(PREDICTIONS_FILE);
        write_npy(&values_path, &prediction.values)
            .with_context(|| format!("Cannot write '{}'", values_path.display()))?;
        let errors_path = artifacts.dir().join(ERRORS_FILE);
        write_npy(&errors_path, &prediction.errors)
            .with_context(|| format!("Cannot write '{}'", errors_path.display()))?;

        plot_residuals(
            artifacts.dir(),
            predictor.targets(),
            &prediction.values,
            test_set.labels(),
            &prediction.errors,
        )
    }
}

/// Plain-text table of residual statistics
pub fn format_stats(stats: &[(String, ResidualStats)]) -> String {
    let mut out = format!("{:<8} {:>6} {:>10} {:>10} {:>8}\n", "target", "n", "bias", "scatter", "s/σ");
    for (name, s) in stats {
        out.push_str(&format!(
            "{:<8} {:>6} {:>10.4} {:>10.4} {:>8.3}\n",
            name, s.count, s.bias, s.scatter, s.relative
        ));
    }
    out
}
