// ============================================================
// Layer 4 — Label Normaliser
// ============================================================
// Labels span wildly different ranges (Teff ~ 4000-5500 K,
// abundances ~ -1..+0.5 dex). The network regresses standardised
// labels instead:
//
//   z = (y - mean) / std
//
// mean and std are computed per column over measured entries
// only. Missing labels (MAGIC_NUMBER) stay MAGIC_NUMBER after
// normalisation so the masked loss can still recognise them.
//
// Persisted as meanstd.npy: a [2, n_targets] array, row 0 the
// means and row 1 the standard deviations.

use std::path::Path;

use anyhow::{bail, Context, Result};
use ndarray::{Array1, Array2, Axis};
use ndarray_npy::write_npy;

use crate::data::loader::read_matrix;
use crate::domain::spectrum::{is_measured, MAGIC_NUMBER};
use crate::domain::traits::Persistable;

pub const MEANSTD_FILE: &str = "meanstd.npy";

#[derive(Debug, Clone, PartialEq)]
pub struct LabelNormalizer {
    pub mean: Array1<f32>,
    pub std:  Array1<f32>,
}

impl LabelNormalizer {
    /// Compute per-column statistics, ignoring MAGIC_NUMBER entries.
    /// A column with zero spread (or no measurements) gets std = 1.
    pub fn fit(labels: &Array2<f32>) -> Self {
        let n_targets = labels.ncols();
        let mut mean = Array1::<f32>::zeros(n_targets);
        let mut std  = Array1::<f32>::ones(n_targets);

        for (j, column) in labels.axis_iter(Axis(1)).enumerate() {
            let measured: Vec<f64> = column
                .iter()
                .copied()
                .filter(|&v| is_measured(v))
                .map(f64::from)
                .collect();
            if measured.is_empty() {
                continue;
            }
            let n   = measured.len() as f64;
            let mu  = measured.iter().sum::<f64>() / n;
            let var = measured.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / n;
            mean[j] = mu as f32;
            let sd  = var.sqrt() as f32;
            std[j]  = if sd > 0.0 { sd } else { 1.0 };
        }

        Self { mean, std }
    }

    pub fn n_targets(&self) -> usize {
        self.mean.len()
    }

    /// Standardise labels; missing entries pass through unchanged
    pub fn normalize(&self, labels: &Array2<f32>) -> Array2<f32> {
        let mut out = labels.clone();
        for mut row in out.axis_iter_mut(Axis(0)) {
            for (j, v) in row.iter_mut().enumerate() {
                if is_measured(*v) {
                    *v = (*v - self.mean[j]) / self.std[j];
                }
            }
        }
        out
    }

    /// Map network outputs back to physical units
    pub fn denormalize(&self, values: &Array2<f32>) -> Array2<f32> {
        let mut out = values.clone();
        for mut row in out.axis_iter_mut(Axis(0)) {
            for (j, v) in row.iter_mut().enumerate() {
                *v = *v * self.std[j] + self.mean[j];
            }
        }
        out
    }

    /// Scale standard deviations (e.g. MC-dropout spread) back to physical units
    pub fn denormalize_spread(&self, spread: &Array2<f32>) -> Array2<f32> {
        let mut out = spread.clone();
        for mut row in out.axis_iter_mut(Axis(0)) {
            for (j, v) in row.iter_mut().enumerate() {
                *v *= self.std[j];
            }
        }
        out
    }
}

impl Persistable for LabelNormalizer {
    fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(MEANSTD_FILE);
        let mut stacked = Array2::<f32>::zeros((2, self.n_targets()));
        stacked.row_mut(0).assign(&self.mean);
        stacked.row_mut(1).assign(&self.std);
        write_npy(&path, &stacked)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Saved label statistics to '{}'", path.display());
        Ok(())
    }

    fn load(dir: &Path) -> Result<Self> {
        let path    = dir.join(MEANSTD_FILE);
        let stacked = read_matrix(&path)?;
        if stacked.nrows() != 2 {
            bail!("'{}' should have 2 rows (mean, std), found {}", path.display(), stacked.nrows());
        }
        Ok(Self {
            mean: stacked.row(0).to_owned(),
            std:  stacked.row(1).to_owned(),
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_ignores_magic_entries() {
        let labels = array![[1.0, 5.0], [3.0, MAGIC_NUMBER], [MAGIC_NUMBER, 5.0]];
        let n      = LabelNormalizer::fit(&labels);
        assert!((n.mean[0] - 2.0).abs() < 1e-6);
        assert!((n.std[0] - 1.0).abs() < 1e-6);
        // Constant column → std falls back to 1
        assert_eq!(n.mean[1], 5.0);
        assert_eq!(n.std[1], 1.0);
    }

    #[test]
    fn test_normalize_keeps_magic() {
        let labels = array![[1.0], [3.0], [MAGIC_NUMBER]];
        let n      = LabelNormalizer::fit(&labels);
        let z      = n.normalize(&labels);
        assert!((z[[0, 0]] + 1.0).abs() < 1e-6);
        assert!((z[[1, 0]] - 1.0).abs() < 1e-6);
        assert_eq!(z[[2, 0]], MAGIC_NUMBER);
    }

    #[test]
    fn test_denormalize_inverts_normalize() {
        let labels = array![[4500.0, 2.0], [5000.0, 3.0], [4800.0, 2.4]];
        let n      = LabelNormalizer::fit(&labels);
        let back   = n.denormalize(&n.normalize(&labels));
        for (a, b) in labels.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-2);
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let n   = LabelNormalizer::fit(&array![[1.0, 10.0], [3.0, 30.0]]);
        n.save(dir.path()).unwrap();
        let loaded = LabelNormalizer::load(dir.path()).unwrap();
        assert_eq!(loaded, n);
    }
}
