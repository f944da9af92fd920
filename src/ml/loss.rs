use burn::prelude::*;

use crate::domain::spectrum::MAGIC_NUMBER;

/// Mean squared error over measured labels only.
///
/// Entries where `target == MAGIC_NUMBER` contribute neither to the sum
/// nor to the count, so a star missing one abundance still trains the
/// other outputs.
pub fn masked_mse<B: Backend>(prediction: Tensor<B, 2>, target: Tensor<B, 2>) -> Tensor<B, 1> {
    let (sum, count) = masked_squared_error(prediction, target);
    sum / count.clamp_min(1.0)
}

/// Sum of squared errors over measured labels, and how many there were.
/// Summing both across batches gives the exact loss of the whole set.
pub fn masked_squared_error<B: Backend>(
    prediction: Tensor<B, 2>,
    target:     Tensor<B, 2>,
) -> (Tensor<B, 1>, Tensor<B, 1>) {
    let mask = target.clone().equal_elem(MAGIC_NUMBER).bool_not().float();
    let diff = (prediction - target) * mask.clone();
    (diff.powf_scalar(2.0).sum(), mask.sum())
}
