use std::sync::Arc;

use burn::data::dataset::Dataset;

use crate::domain::spectrum::{SpectraSet, SpectrumSample};

/// burn Dataset view over a SpectraSet.
/// Shares the underlying arrays so it is cheap to clone.
#[derive(Clone)]
pub struct SpectraDataset {
    set: Arc<SpectraSet>,
}

impl SpectraDataset {
    pub fn new(set: Arc<SpectraSet>) -> Self {
        Self { set }
    }
}

impl Dataset<SpectrumSample> for SpectraDataset {
    fn get(&self, index: usize) -> Option<SpectrumSample> {
        self.set.sample(index)
    }

    fn len(&self) -> usize {
        self.set.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_dataset_exposes_rows() {
        let set = SpectraSet::new(array![[1.0, 2.0], [3.0, 4.0]], array![[0.5], [0.7]]).unwrap();
        let ds  = SpectraDataset::new(Arc::new(set));
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(1).unwrap().labels, vec![0.7]);
        assert!(ds.get(2).is_none());
    }
}
