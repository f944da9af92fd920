// ============================================================
// Layer 3 — Spectrum Domain Types
// ============================================================
// A training set is a pair of aligned 2D arrays:
//
//   spectra: [n_stars, n_pixels]   (one APOGEE spectrum per row)
//   labels:  [n_stars, n_targets]  (ASPCAP parameters per row)
//
// Row i of `spectra` and row i of `labels` describe the same star.
// Missing labels are stored as MAGIC_NUMBER and are skipped by the
// loss function and by the residual statistics.
//
// Reference: Rust Book §5 (Structs and Methods)
//            ndarray documentation (Array2, row views)

use anyhow::{bail, Result};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Sentinel for a label that ASPCAP did not measure.
pub const MAGIC_NUMBER: f32 = -9999.0;

/// Returns true if `value` is a real measurement (not the sentinel)
pub fn is_measured(value: f32) -> bool {
    value != MAGIC_NUMBER
}

/// One star: its spectrum and its labels.
/// This is the unit that burn's Dataset hands to the Batcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectrumSample {
    pub spectrum: Vec<f32>,
    pub labels:   Vec<f32>,
}

/// Spectra and labels for a set of stars, row-aligned.
#[derive(Debug, Clone)]
pub struct SpectraSet {
    spectra: Array2<f32>,
    labels:  Array2<f32>,
}

impl SpectraSet {
    /// Pair spectra with labels.
    /// Fails if the two arrays disagree on the number of stars.
    pub fn new(spectra: Array2<f32>, labels: Array2<f32>) -> Result<Self> {
        if spectra.nrows() != labels.nrows() {
            bail!(
                "spectra has {} rows but labels has {} rows",
                spectra.nrows(),
                labels.nrows()
            );
        }
        Ok(Self { spectra, labels })
    }

    /// Number of stars
    pub fn len(&self) -> usize {
        self.spectra.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of pixels per spectrum
    pub fn n_pixels(&self) -> usize {
        self.spectra.ncols()
    }

    /// Number of labels per star
    pub fn n_targets(&self) -> usize {
        self.labels.ncols()
    }

    pub fn spectra(&self) -> &Array2<f32> {
        &self.spectra
    }

    pub fn labels(&self) -> &Array2<f32> {
        &self.labels
    }

    /// Copy row `index` out as an owned sample
    pub fn sample(&self, index: usize) -> Option<SpectrumSample> {
        if index >= self.len() {
            return None;
        }
        Some(SpectrumSample {
            spectrum: self.spectra.row(index).to_vec(),
            labels:   self.labels.row(index).to_vec(),
        })
    }

    /// Build a new set from the given row indices (in that order)
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            spectra: self.spectra.select(Axis(0), indices),
            labels:  self.labels.select(Axis(0), indices),
        }
    }

    /// Replace the labels, keeping the spectra.
    /// Used after normalisation.
    pub fn with_labels(self, labels: Array2<f32>) -> Result<Self> {
        Self::new(self.spectra, labels)
    }
}
