// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Randomly shuffles star indices and splits the set in two:
//   - Training set:   fed through the shuffled batch generator
//   - Validation set: evaluated once per epoch with the model
//                     in inference mode
//
// APOGEE catalogues are usually sorted (by field, by Teff...),
// so the split is done on a shuffled index order.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom.
//
// Reference: rand crate documentation

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::domain::spectrum::SpectraSet;

/// Randomly shuffle `samples` and split into (train, validation).
///
/// # Arguments
/// * `samples`        - All available samples (consumed by this function)
/// * `train_fraction` - Proportion for training, e.g. 0.9 = 90%
/// * `seed`           - Fixed seed for a reproducible split
pub fn split_train_val<T>(mut samples: Vec<T>, train_fraction: f64, seed: Option<u64>) -> (Vec<T>, Vec<T>) {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None       => StdRng::from_entropy(),
    };
    samples.shuffle(&mut rng);

    let total    = samples.len();
    let split_at = ((total as f64) * train_fraction).round() as usize;
    let split_at = split_at.min(total);

    let val = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation",
        samples.len(),
        val.len(),
    );

    (samples, val)
}

/// Split a SpectraSet by holding out `val_fraction` of the stars.
/// Returns None for the validation part when nothing is held out.
pub fn split_spectra(set: &SpectraSet, val_fraction: f64, seed: Option<u64>) -> (SpectraSet, Option<SpectraSet>) {
    let indices: Vec<usize> = (0..set.len()).collect();
    let (train_idx, val_idx) = split_train_val(indices, 1.0 - val_fraction.clamp(0.0, 1.0), seed);
    let val = if val_idx.is_empty() { None } else { Some(set.select(&val_idx)) };
    (set.select(&train_idx), val)
}
