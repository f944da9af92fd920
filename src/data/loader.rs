// ============================================================
// Layer 4 — Spectra Loader
// ============================================================
// Loads spectra and ASPCAP labels from NumPy .npy files using
// the ndarray-npy crate.
//
// Expected files:
//   spectra.npy — shape [n_stars, n_pixels]
//   labels.npy  — shape [n_stars, n_targets] (or [n_stars]
//                 when there is a single target)
//
// APOGEE products are usually float64; the network trains in
// float32, so float64 arrays are narrowed on load.
//
// Reference: ndarray-npy crate documentation
//            Rust Book §9 (Error Handling)

use std::path::{Path, PathBuf};

use anyhow::Result;
use ndarray::{Array1, Array2, Axis};
use ndarray_npy::{read_npy, ReadNpyError};
use thiserror::Error;

use crate::domain::spectrum::SpectraSet;
use crate::domain::traits::SpectraSource;

/// Everything that can go wrong while reading the input arrays
#[derive(Debug, Error)]
pub enum DataError {
    #[error("file '{0}' does not exist")]
    Missing(PathBuf),

    #[error("cannot read '{path}' as a 1D or 2D float array: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: ReadNpyError,
    },

    #[error("labels have {found} columns but {expected} target names were given")]
    TargetCount { expected: usize, found: usize },

    #[error("'{0}' contains no stars")]
    Empty(PathBuf),

    #[error("spectra have {found} pixels but the network expects {expected}")]
    PixelCount { expected: usize, found: usize },
}

/// Spectra must match the pixel count the network was built for
pub fn check_pixels(spectra: &Array2<f32>, expected: usize) -> Result<(), DataError> {
    if spectra.ncols() != expected {
        return Err(DataError::PixelCount { expected, found: spectra.ncols() });
    }
    Ok(())
}

/// Read a 2D float array, accepting f32 or f64 on disk
pub fn read_matrix(path: &Path) -> Result<Array2<f32>, DataError> {
    if !path.exists() {
        return Err(DataError::Missing(path.to_path_buf()));
    }

    let first_err = match read_npy::<_, Array2<f32>>(path) {
        Ok(a) => return Ok(a),
        Err(e) => e,
    };
    if let Ok(a) = read_npy::<_, Array2<f64>>(path) {
        return Ok(a.mapv(|v| v as f32));
    }
    // A single target is often saved as a flat vector
    if let Ok(a) = read_npy::<_, Array1<f32>>(path) {
        return Ok(a.insert_axis(Axis(1)));
    }
    if let Ok(a) = read_npy::<_, Array1<f64>>(path) {
        return Ok(a.mapv(|v| v as f32).insert_axis(Axis(1)));
    }

    Err(DataError::Unreadable { path: path.to_path_buf(), source: first_err })
}

/// Loads a labelled spectra set from two .npy files.
/// Implements the SpectraSource trait from Layer 3.
pub struct NpyLoader {
    spectra_path: PathBuf,
    labels_path:  PathBuf,
    /// Number of target names the labels must match, if known
    expected_targets: Option<usize>,
    /// Spectrum length a trained network requires, if known
    expected_pixels: Option<usize>,
}

impl NpyLoader {
    pub fn new(spectra_path: impl Into<PathBuf>, labels_path: impl Into<PathBuf>) -> Self {
        Self {
            spectra_path:     spectra_path.into(),
            labels_path:      labels_path.into(),
            expected_targets: None,
            expected_pixels:  None,
        }
    }

    /// Require every spectrum to have exactly `n` pixels
    pub fn expect_pixels(mut self, n: usize) -> Self {
        self.expected_pixels = Some(n);
        self
    }

    /// Require the label array to have exactly `n` columns
    pub fn expect_targets(mut self, n: usize) -> Self {
        self.expected_targets = Some(n);
        self
    }
}

impl SpectraSource for NpyLoader {
    fn load(&self) -> Result<SpectraSet> {
        let spectra = read_matrix(&self.spectra_path)?;
        let labels  = read_matrix(&self.labels_path)?;

        if spectra.nrows() == 0 {
            return Err(DataError::Empty(self.spectra_path.clone()).into());
        }
        if let Some(expected) = self.expected_targets {
            if labels.ncols() != expected {
                return Err(DataError::TargetCount { expected, found: labels.ncols() }.into());
            }
        }
        if let Some(expected) = self.expected_pixels {
            check_pixels(&spectra, expected)?;
        }

        let set = SpectraSet::new(spectra, labels)?;
        tracing::info!(
            "Loaded {} spectra ({} pixels, {} labels) from '{}'",
            set.len(),
            set.n_pixels(),
            set.n_targets(),
            self.spectra_path.display()
        );
        Ok(set)
    }
}
