// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Resolve target names      (Layer 3 - domain)
//   Step 2: Load spectra + labels     (Layer 4 - data)
//   Step 3: Fit label normalizer      (Layer 4 - data)
//   Step 4: Split train/validation    (Layer 4 - data)
//   Step 5: Create run folder         (Layer 6 - infra)
//   Step 6: Save configs + stats      (Layer 6 - infra)
//   Step 7: Run training loop         (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::data::{
    generator::ShuffledBatches,
    loader::NpyLoader,
    normalizer::LabelNormalizer,
    splitter::split_spectra,
};
use crate::domain::targets::TargetNames;
use crate::domain::traits::{Persistable, SpectraSource};
use crate::infra::{
    checkpoint::RunArtifacts,
    run_dir::{create_run_dir, today, RUN_PREFIX},
};
use crate::ml::model::SpectraCnnConfig;
use crate::ml::scheduler::PlateauConfig;
use crate::ml::trainer::run_training;

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run.
// Saved as train_config.json in the run folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub spectra_path:      PathBuf,
    pub labels_path:       PathBuf,
    /// "all" or a comma-separated list, one name per label column
    pub targets:           String,
    pub output_root:       PathBuf,
    pub batch_size:        usize,
    pub epochs:            usize,
    pub lr:                f64,
    pub beta_1:            f64,
    pub beta_2:            f64,
    pub optimizer_epsilon: f64,
    pub l2:                f64,
    pub val_fraction:      f64,
    /// 0 means one worker per CPU
    pub workers:           usize,
    pub max_queue_size:    usize,
    pub filters_1:         usize,
    pub filters_2:         usize,
    pub filter_length:     usize,
    pub pool_length:       usize,
    pub hidden_1:          usize,
    pub hidden_2:          usize,
    pub dropout:           f64,
    pub plateau:           PlateauConfig,
    pub seed:              Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            spectra_path:      PathBuf::from("spectra.npy"),
            labels_path:       PathBuf::from("labels.npy"),
            targets:           "all".to_string(),
            output_root:       PathBuf::from("."),
            batch_size:        64,
            epochs:            500,
            lr:                0.005,
            beta_1:            0.9,
            beta_2:            0.999,
            optimizer_epsilon: 1e-7,
            l2:                1e-4,
            val_fraction:      0.1,
            workers:           0,
            max_queue_size:    crate::data::generator::DEFAULT_MAX_QUEUE_SIZE,
            filters_1:         2,
            filters_2:         4,
            filter_length:     8,
            pool_length:       4,
            hidden_1:          196,
            hidden_2:          96,
            dropout:           0.2,
            plateau:           PlateauConfig::default(),
            seed:              None,
        }
    }
}

impl TrainConfig {
    /// Architecture for spectra of `n_pixels` and `n_targets` labels
    pub fn model_config(&self, n_pixels: usize, n_targets: usize) -> SpectraCnnConfig {
        SpectraCnnConfig::new(n_pixels, n_targets)
            .with_filters_1(self.filters_1)
            .with_filters_2(self.filters_2)
            .with_filter_length(self.filter_length)
            .with_pool_length(self.pool_length)
            .with_hidden_1(self.hidden_1)
            .with_hidden_2(self.hidden_2)
            .with_dropout(self.dropout)
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Train a network and return its run folder
    pub fn execute<B: AutodiffBackend>(&self, device: B::Device) -> Result<PathBuf> {
        let cfg = &self.config;

        // ── Step 1: Target names ──────────────────────────────────────────────
        let targets = TargetNames::parse(&cfg.targets)?;
        tracing::info!("Training on {} targets", targets.len());

        // ── Step 2: Load spectra and labels ───────────────────────────────────
        let set = NpyLoader::new(&cfg.spectra_path, &cfg.labels_path)
            .expect_targets(targets.len())
            .load()
            .context("Cannot load training data")?;
        tracing::info!("Loaded {} spectra of {} pixels", set.len(), set.n_pixels());
        let model_cfg = cfg.model_config(set.n_pixels(), set.n_targets());
        model_cfg.validate()?;

        // ── Step 3: Normalise labels (magic entries stay magic) ───────────────
        let normalizer = LabelNormalizer::fit(set.labels());
        let normalized = normalizer.normalize(set.labels());
        let set        = set.with_labels(normalized)?;

        // ── Step 4: Train / validation split ──────────────────────────────────
        let (train_set, val_set) = split_spectra(&set, cfg.val_fraction, cfg.seed);
        tracing::info!(
            "Split: {} train, {} validation",
            train_set.len(),
            val_set.as_ref().map_or(0, |v| v.len())
        );
        // Fail on an unusable batch size before anything is written
        ShuffledBatches::new(train_set.len(), cfg.batch_size, true, cfg.seed)?;

        // ── Step 5: Run folder ────────────────────────────────────────────────
        let run_dir   = create_run_dir(&cfg.output_root, RUN_PREFIX, today())?;
        let artifacts = RunArtifacts::new(&run_dir)?;

        // ── Step 6: Everything inference needs besides the weights ───────────
        artifacts.save_model_config(&model_cfg)?;
        artifacts.save_train_config(cfg)?;
        normalizer.save(artifacts.dir())?;
        targets.save(artifacts.dir())?;

        // ── Step 7: Training loop (Layer 5) ───────────────────────────────────
        run_training::<B>(
            cfg,
            &model_cfg,
            Arc::new(train_set),
            val_set.map(Arc::new),
            &artifacts,
            device,
        )?;

        Ok(run_dir)
    }
}
