// ============================================================
// Layer 2 — Jacobian Use Case
// ============================================================
// Which pixels does the network look at for each label?
//   1. Open the run folder and rebuild the predictor
//   2. Load spectra (optionally only the first N stars)
//   3. Jacobian of every output w.r.t. every pixel (Layer 5)
//   4. Rescale to physical label units, save jacobian.npy
//   5. Average over stars and plot per target (Layer 7)

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use burn::tensor::backend::AutodiffBackend;
use ndarray::{s, Array3, Axis};
use ndarray_npy::write_npy;

use crate::data::loader::{check_pixels, read_matrix};
use crate::infra::checkpoint::RunArtifacts;
use crate::infra::windows::{MaskSource, WindowFetcher};
use crate::ml::jacobian::{compute_jacobian, mean_over_stars};
use crate::ml::predictor::Predictor;
use crate::plotting::jacobian::plot_jacobians;

pub const JACOBIAN_FILE: &str = "jacobian.npy";

#[derive(Debug, Clone)]
pub struct JacobianConfig {
    pub run_dir:      PathBuf,
    pub spectra_path: PathBuf,
    /// Use only the first `max_stars` spectra
    pub max_stars:    Option<usize>,
    pub batch_size:   usize,
    /// Multiply by the label std so the Jacobian is in label units per flux unit
    pub physical:     bool,
    pub mask_source:  MaskSource,
}

pub struct JacobianUseCase {
    config: JacobianConfig,
}

impl JacobianUseCase {
    pub fn new(config: JacobianConfig) -> Self {
        Self { config }
    }

    /// Returns the paths of the written plots
    pub fn execute<B: AutodiffBackend>(&self, device: B::Device) -> Result<Vec<PathBuf>> {
        let cfg       = &self.config;
        let artifacts = RunArtifacts::open(&cfg.run_dir)?;
        let predictor = Predictor::<B>::from_run(&artifacts, &device)?;
        let n_pixels  = artifacts.load_model_config()?.n_pixels;

        let mut spectra = read_matrix(&cfg.spectra_path)?;
        check_pixels(&spectra, n_pixels)?;
        if let Some(n) = cfg.max_stars {
            let n = n.min(spectra.nrows());
            spectra = spectra.slice(s![..n, ..]).to_owned();
        }
        if spectra.nrows() == 0 {
            bail!("no spectra in '{}'", cfg.spectra_path.display());
        }
        let n_stars = spectra.nrows();
        tracing::info!("Start calculating jacobian for {} stars", n_stars);

        let mut jacobian = compute_jacobian(predictor.model(), &spectra, cfg.batch_size, &device)?;
        if cfg.physical {
            to_label_units(&mut jacobian, &predictor.normalizer().std.to_vec())?;
        }

        let path = artifacts.dir().join(JACOBIAN_FILE);
        write_npy(&path, &jacobian)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;

        let mean    = mean_over_stars(&jacobian);
        let fetcher = WindowFetcher::new(cfg.mask_source.clone());
        plot_jacobians(artifacts.dir(), predictor.targets(), &mean, n_stars, &fetcher)
    }
}

/// Scale each target slice by its label standard deviation
pub fn to_label_units(jacobian: &mut Array3<f32>, std: &[f32]) -> Result<()> {
    if std.len() != jacobian.len_of(Axis(0)) {
        bail!(
            "{} label deviations for a Jacobian of {} targets",
            std.len(),
            jacobian.len_of(Axis(0))
        );
    }
    for (mut slice, &s) in jacobian.outer_iter_mut().zip(std) {
        slice *= s;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_label_units_scales_each_target() {
        let mut j = Array3::<f32>::ones((2, 3, 4));
        to_label_units(&mut j, &[2.0, 0.5]).unwrap();
        assert_eq!(j[[0, 2, 3]], 2.0);
        assert_eq!(j[[1, 0, 0]], 0.5);
    }

    #[test]
    fn test_to_label_units_rejects_wrong_length() {
        let mut j = Array3::<f32>::ones((2, 1, 1));
        assert!(to_label_units(&mut j, &[1.0]).is_err());
    }

    #[test]
    fn test_spectra_of_wrong_width_are_rejected() {
        use crate::data::loader::DataError;
        use crate::infra::checkpoint::write_test_run;
        use burn::backend::{Autodiff, NdArray};
        use ndarray::Array2;

        let dir = tempfile::tempdir().unwrap();
        let run = dir.path().join("run");
        write_test_run(&run, 16);

        for width in [40, 17] {
            let spectra_path = dir.path().join(format!("spectra_{width}.npy"));
            write_npy(&spectra_path, &Array2::<f32>::ones((3, width))).unwrap();
            let cfg = JacobianConfig {
                run_dir:     run.clone(),
                spectra_path,
                max_stars:   None,
                batch_size:  2,
                physical:    true,
                mask_source: MaskSource::Disabled,
            };
            let err = JacobianUseCase::new(cfg)
                .execute::<Autodiff<NdArray>>(Default::default())
                .unwrap_err();
            assert!(matches!(
                err.root_cause().downcast_ref::<DataError>(),
                Some(DataError::PixelCount { expected: 16, found }) if *found == width
            ));
            assert!(!run.join(JACOBIAN_FILE).exists());
        }
    }

    #[test]
    fn test_matching_width_writes_jacobian_and_plot() {
        use crate::infra::checkpoint::write_test_run;
        use burn::backend::{Autodiff, NdArray};
        use ndarray::Array2;

        let dir = tempfile::tempdir().unwrap();
        let run = dir.path().join("run");
        write_test_run(&run, 16);
        let spectra_path = dir.path().join("spectra.npy");
        write_npy(&spectra_path, &Array2::<f32>::from_shape_fn((3, 16), |(i, j)| (i + j) as f32 * 0.1)).unwrap();

        let cfg = JacobianConfig {
            run_dir:     run.clone(),
            spectra_path,
            max_stars:   Some(2),
            batch_size:  2,
            physical:    true,
            mask_source: MaskSource::Disabled,
        };
        let plots = JacobianUseCase::new(cfg).execute::<Autodiff<NdArray>>(Default::default()).unwrap();
        assert_eq!(plots.len(), 1);
        let jacobian: Array3<f32> = ndarray_npy::read_npy(run.join(JACOBIAN_FILE)).unwrap();
        assert_eq!(jacobian.dim(), (1, 2, 16));
    }
}
