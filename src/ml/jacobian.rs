// ============================================================
// Layer 5 — Jacobian
// ============================================================
// J[j, i, p] = ∂ output_j(star i) / ∂ flux(star i, pixel p)
//
// Computed with burn's autodiff through forward_frozen, so batch
// norm uses its running statistics and each star's outputs depend
// only on its own spectrum. That makes it valid to batch stars:
// the gradient of Σ_i output_j(i) with respect to the whole input
// batch is exactly the stack of per-star gradients.
//
// One backward pass per (target, batch); the forward pass is
// redone for each target because a backward pass consumes the
// autodiff graph.

use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use burn::{prelude::*, tensor::backend::AutodiffBackend};
use ndarray::{s, Array2, Array3, Axis};

use crate::data::batcher::SpectraBatcher;
use crate::ml::model::SpectraCnn;

/// Returns an array of shape [n_targets, n_stars, n_pixels]
pub fn compute_jacobian<B: AutodiffBackend>(
    model:      &SpectraCnn<B>,
    spectra:    &Array2<f32>,
    batch_size: usize,
    device:     &B::Device,
) -> Result<Array3<f32>> {
    let (n_stars, n_pixels) = spectra.dim();
    let n_targets = model.output.weight.val().dims()[1];
    let batcher   = SpectraBatcher::<B>::new(device.clone());
    let started   = Instant::now();

    let mut jacobian = Array3::<f32>::zeros((n_targets, n_stars, n_pixels));

    for j in 0..n_targets {
        tracing::info!(
            "Completed {} of {} output, {:.3} seconds elapsed",
            j,
            n_targets,
            started.elapsed().as_secs_f64()
        );

        let mut offset = 0;
        for chunk in spectra.axis_chunks_iter(Axis(0), batch_size.max(1)) {
            let rows: Vec<Vec<f32>> = chunk.outer_iter().map(|r| r.to_vec()).collect();
            let n = rows.len();

            let x      = batcher.spectra_tensor(&rows).require_grad();
            let output = model.forward_frozen(x.clone());
            let grads  = output.slice([0..n, j..j + 1]).sum().backward();
            let grad   = x
                .grad(&grads)
                .context("input spectra received no gradient")?;

            let values = grad
                .into_data()
                .convert::<f32>()
                .to_vec::<f32>()
                .map_err(|e| anyhow!("Cannot read gradient data: {e:?}"))?;
            let block = Array2::from_shape_vec((n, n_pixels), values)?;
            jacobian
                .slice_mut(s![j, offset..offset + n, ..])
                .assign(&block);
            offset += n;
        }
    }

    tracing::info!(
        "Jacobian of {} outputs over {} stars in {:.3} seconds",
        n_targets,
        n_stars,
        started.elapsed().as_secs_f64()
    );
    Ok(jacobian)
}

/// Average the Jacobian over stars: [n_targets, n_pixels]
pub fn mean_over_stars(jacobian: &Array3<f32>) -> Array2<f32> {
    jacobian
        .mean_axis(Axis(1))
        .unwrap_or_else(|| Array2::zeros((jacobian.dim().0, jacobian.dim().2)))
}
