// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Generator-based fitting with Adam, plateau LR reduction and a
// CSV log.
//
// Per epoch:
//   - steps_per_epoch = n_train / batch_size batches pulled from
//     the PrefetchPool (worker threads keep up to max_queue_size
//     batches ready)
//   - forward → masked MSE → backward → Adam step at the current lr
//   - optional validation pass on model.valid() (inner backend,
//     batch norm on running statistics, no dropout)
//   - log.csv row, then the plateau scheduler picks the next lr
//
// Key Burn insight:
//   - Training uses an AutodiffBackend for gradients
//   - model.valid() returns the model on B::InnerBackend
//   - the validation batcher must also use B::InnerBackend
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use std::sync::Arc;

use anyhow::{bail, Result};
use burn::{
    data::dataloader::{batcher::Batcher, DataLoaderBuilder},
    module::AutodiffModule,
    optim::{decay::WeightDecayConfig, AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::SpectraBatcher,
    dataset::SpectraDataset,
    generator::{PrefetchPool, SharedGenerator, ShuffledBatches},
};
use crate::domain::spectrum::SpectraSet;
use crate::infra::checkpoint::RunArtifacts;
use crate::infra::metrics::{EpochMetrics, MetricsLogger};
use crate::data::batcher::SpectraBatch;
use crate::ml::loss::masked_squared_error;
use crate::ml::model::{SpectraCnn, SpectraCnnConfig};
use crate::ml::scheduler::ReduceLrOnPlateau;

pub fn run_training<B: AutodiffBackend>(
    cfg:       &TrainConfig,
    model_cfg: &SpectraCnnConfig,
    train_set: Arc<SpectraSet>,
    val_set:   Option<Arc<SpectraSet>>,
    artifacts: &RunArtifacts,
    device:    B::Device,
) -> Result<SpectraCnn<B>> {

    // ── Build model ───────────────────────────────────────────────────────────
    let mut model: SpectraCnn<B> = model_cfg.init(&device);
    tracing::info!(
        "Model ready: {} parameters, {} pixels → {} targets",
        model.num_params(),
        model_cfg.n_pixels,
        model_cfg.n_targets
    );
    artifacts.write_model_summary(&model);

    // ── Adam optimiser (L2 penalty as weight decay) ───────────────────────────
    let optim_cfg = AdamConfig::new()
        .with_beta_1(cfg.beta_1 as f32)
        .with_beta_2(cfg.beta_2 as f32)
        .with_epsilon(cfg.optimizer_epsilon as f32)
        .with_weight_decay(Some(WeightDecayConfig::new(cfg.l2 as f32)));
    let mut optim = optim_cfg.init();

    // ── Training batches (worker threads) ─────────────────────────────────────
    let generator = ShuffledBatches::new(train_set.len(), cfg.batch_size, true, cfg.seed)?;
    let steps_per_epoch = generator.batches_per_pass();
    let workers = if cfg.workers == 0 { num_cpus::get() } else { cfg.workers };
    let pool = PrefetchPool::spawn(
        Arc::clone(&train_set),
        SharedGenerator::new(generator),
        workers,
        cfg.max_queue_size,
    );
    let train_batcher = SpectraBatcher::<B>::new(device.clone());
    tracing::info!(
        "Training on {} stars: {} steps/epoch, {} workers",
        train_set.len(),
        steps_per_epoch,
        workers
    );

    // ── Validation data loader (InnerBackend — no autodiff overhead) ──────────
    let val_loader = val_set.map(|set| {
        let val_batcher = SpectraBatcher::<B::InnerBackend>::new(device.clone());
        DataLoaderBuilder::new(val_batcher)
            .batch_size(cfg.batch_size)
            .num_workers(1)
            .build(SpectraDataset::new(set))
    });

    let logger        = MetricsLogger::new(artifacts.dir())?;
    let mut scheduler = ReduceLrOnPlateau::new(cfg.lr, cfg.plateau.clone());

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.epochs {
        let lr = scheduler.lr();

        let mut loss_sum = 0.0f64;
        for _ in 0..steps_per_epoch {
            let batch = train_batcher.batch(pool.next_batch()?);
            let (loss, _) = model.forward_loss(batch.spectra, batch.labels);

            loss_sum += loss.clone().into_scalar().elem::<f64>();

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(lr, model, grads);
        }
        let avg_loss = loss_sum / steps_per_epoch as f64;
        if !avg_loss.is_finite() {
            bail!("training loss became {avg_loss} at epoch {epoch}");
        }

        // ── Validation phase ──────────────────────────────────────────────────
        let val_loss = val_loader
            .as_ref()
            .map(|loader| validation_loss(&model.valid(), loader.iter()));

        match val_loss {
            Some(v) => println!(
                "Epoch {:>3}/{} | loss={:.5} | val_loss={:.5} | lr={:.2e}",
                epoch, cfg.epochs, avg_loss, v, lr
            ),
            None => println!(
                "Epoch {:>3}/{} | loss={:.5} | lr={:.2e}",
                epoch, cfg.epochs, avg_loss, lr
            ),
        }
        logger.log(&EpochMetrics::new(epoch, avg_loss, val_loss, lr))?;

        scheduler.step(avg_loss);
    }

    drop(pool);
    artifacts.save_model(&model)?;
    tracing::info!("Training complete!");
    Ok(model)
}

/// Masked MSE over a whole set: squared errors and label counts are summed
/// over all batches before dividing. NaN when no label is measured.
pub fn validation_loss<B: Backend>(
    model:   &SpectraCnn<B>,
    batches: impl Iterator<Item = SpectraBatch<B>>,
) -> f64 {
    let mut sum   = 0.0f64;
    let mut count = 0.0f64;
    for batch in batches {
        let output = model.forward(batch.spectra);
        let (s, c) = masked_squared_error(output, batch.labels);
        sum   += s.into_scalar().elem::<f64>();
        count += c.into_scalar().elem::<f64>();
    }
    if count > 0.0 { sum / count } else { f64::NAN }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use ndarray::Array2;

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_short_training_run_writes_artifacts() {
        let dir       = tempfile::tempdir().unwrap();
        let artifacts = RunArtifacts::new(dir.path()).unwrap();

        // Label = mean flux of the spectrum, learnable from the input
        let spectra = Array2::<f32>::from_shape_fn((24, 32), |(i, j)| ((i + j) % 7) as f32 / 7.0);
        let labels  = Array2::<f32>::from_shape_fn((24, 1), |(i, _)| (i % 7) as f32 / 7.0 - 0.5);
        let set     = Arc::new(SpectraSet::new(spectra, labels).unwrap());
        let val     = Arc::new(set.select(&[0, 1, 2, 3]));

        let cfg = TrainConfig {
            batch_size: 8,
            epochs: 2,
            workers: 2,
            seed: Some(5),
            ..TrainConfig::default()
        };
        let model_cfg = SpectraCnnConfig::new(32, 1).with_hidden_1(8).with_hidden_2(4);

        let model = run_training::<TestBackend>(
            &cfg, &model_cfg, set, Some(val), &artifacts, Default::default(),
        )
        .unwrap();

        assert_eq!(model.output.weight.val().dims(), [4, 1]);
        let log = std::fs::read_to_string(dir.path().join("log.csv")).unwrap();
        assert_eq!(log.lines().count(), 3);
        assert!(log.starts_with("epoch,loss,val_loss,lr"));
    }

    #[test]
    fn test_dataset_smaller_than_batch_fails() {
        let dir       = tempfile::tempdir().unwrap();
        let artifacts = RunArtifacts::new(dir.path()).unwrap();
        let set = Arc::new(SpectraSet::new(Array2::zeros((3, 16)), Array2::zeros((3, 1))).unwrap());
        let cfg = TrainConfig { batch_size: 8, epochs: 1, ..TrainConfig::default() };
        let model_cfg = SpectraCnnConfig::new(16, 1);

        let result = run_training::<TestBackend>(&cfg, &model_cfg, set, None, &artifacts, Default::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_loss_weights_by_measured_labels() {
        use crate::domain::spectrum::MAGIC_NUMBER;
        use crate::ml::loss::masked_mse;

        let device = Default::default();
        let model  = SpectraCnnConfig::new(16, 2)
            .with_hidden_1(8)
            .with_hidden_2(4)
            .init::<NdArray>(&device);

        let spectra = Tensor::<NdArray, 3>::random([4, 1, 16], burn::tensor::Distribution::Default, &device);
        let labels  = Tensor::<NdArray, 2>::from_data(
            [[0.5, MAGIC_NUMBER], [1.0, -1.0], [0.0, 2.0], [MAGIC_NUMBER, 0.3]],
            &device,
        );
        let batches = vec![
            SpectraBatch { spectra: spectra.clone().slice([0..1]), labels: labels.clone().slice([0..1]) },
            SpectraBatch { spectra: spectra.clone().slice([1..4]), labels: labels.clone().slice([1..4]) },
        ];

        let pooled   = validation_loss(&model, batches.into_iter());
        let expected = masked_mse(model.forward(spectra), labels).into_scalar().elem::<f64>();
        assert!((pooled - expected).abs() < 1e-5 * (1.0 + expected.abs()));
    }
}
