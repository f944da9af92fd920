// ============================================================
// Layer 7 — Residual Plots
// ============================================================
// For every target, compare network predictions with the ASPCAP
// labels of a test set:
//
//   residual = prediction - label
//
// Statistics (measured labels only):
//   bias     — median residual
//   scatter  — standard deviation of the residuals
//   relative — scatter / std of the labels themselves
//
// Plot: residual vs ASPCAP label with prediction error bars,
// dashed zero line, x range = label range, y range = ± half
// the label range, statistics printed in the upper right.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ndarray::Array2;
use plotters::prelude::*;

use crate::domain::spectrum::is_measured;
use crate::domain::targets::{display_name, TargetNames};
use crate::plotting::{padded_range, FONT};

/// One point of a residual plot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualPoint {
    pub label:    f32,
    pub residual: f32,
    pub error:    f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualStats {
    pub count:    usize,
    pub bias:     f32,
    pub scatter:  f32,
    pub relative: f32,
}

/// Residual points for target column `j`, skipping missing labels
pub fn residual_points(
    predictions: &Array2<f32>,
    labels:      &Array2<f32>,
    errors:      &Array2<f32>,
    j:           usize,
) -> Vec<ResidualPoint> {
    labels
        .column(j)
        .iter()
        .zip(predictions.column(j).iter())
        .zip(errors.column(j).iter())
        .filter(|((&y, _), _)| is_measured(y))
        .map(|((&y, &p), &e)| ResidualPoint { label: y, residual: p - y, error: e })
        .collect()
}

pub fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return f32::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Population standard deviation
pub fn std_dev(values: &[f32]) -> f32 {
    if values.is_empty() {
        return f32::NAN;
    }
    let n    = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var  = values.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
    var.sqrt() as f32
}

pub fn residual_stats(points: &[ResidualPoint]) -> ResidualStats {
    let residuals: Vec<f32> = points.iter().map(|p| p.residual).collect();
    let labels:    Vec<f32> = points.iter().map(|p| p.label).collect();
    let scatter   = std_dev(&residuals);
    let label_std = std_dev(&labels);
    ResidualStats {
        count:    points.len(),
        bias:     median(&residuals),
        scatter,
        relative: if label_std > 0.0 { scatter / label_std } else { f32::NAN },
    }
}

/// Render one residual plot to `path`
pub fn plot_residual(path: &Path, target: &str, points: &[ResidualPoint], stats: &ResidualStats) -> Result<()> {
    let (x_min, x_max) = padded_range(points.iter().map(|p| p.label), 0.0);
    let half_range     = ((x_max - x_min) / 2.0).max(f32::EPSILON);
    let name           = display_name(target);

    let root = BitMapBackend::new(path, (1500, 1100)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(40)
        .x_label_area_size(100)
        .y_label_area_size(140)
        .build_cartesian_2d(x_min..x_max, -half_range..half_range)?;

    chart
        .configure_mesh()
        .x_desc(format!("ASPCAP {name}"))
        .y_desc(format!("Δ {name} (stellar-cnn - ASPCAP)"))
        .axis_desc_style((FONT, 36))
        .label_style((FONT, 26))
        .light_line_style(BLACK.mix(0.05))
        .bold_line_style(BLACK.mix(0.15))
        .draw()?;

    chart.draw_series(DashedLineSeries::new(
        vec![(x_min, 0.0), (x_max, 0.0)],
        12,
        8,
        BLACK.stroke_width(2).into(),
    ))?;

    chart.draw_series(points.iter().map(|p| {
        ErrorBar::new_vertical(
            p.label,
            p.residual - p.error,
            p.residual,
            p.residual + p.error,
            GREEN.stroke_width(1),
            6,
        )
    }))?;
    chart.draw_series(
        points.iter().map(|p| Circle::new((p.label, p.residual), 3, BLUE.filled())),
    )?;

    let (w, h) = root.dim_in_pixel();
    root.draw(&Text::new(
        format!(
            "median = {:.3}   s/σ = {:.3}   s = {:.3}",
            stats.bias, stats.relative, stats.scatter
        ),
        ((w as f64 * 0.55) as i32, (h as f64 * 0.08) as i32),
        (FONT, 34).into_font().color(&BLACK),
    ))?;

    root.present()
        .with_context(|| format!("Cannot write '{}'", path.display()))?;
    Ok(())
}

/// Render residual plots for every target into `<dir>/residual/`.
/// Returns the statistics per target, in target order.
pub fn plot_residuals(
    dir:         &Path,
    targets:     &TargetNames,
    predictions: &Array2<f32>,
    labels:      &Array2<f32>,
    errors:      &Array2<f32>,
) -> Result<Vec<(String, ResidualStats)>> {
    let out_dir = dir.join("residual");
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Cannot create '{}'", out_dir.display()))?;

    tracing::info!("Start plotting residues");
    let mut all_stats = Vec::with_capacity(targets.len());
    for (j, target) in targets.iter().enumerate() {
        let points = residual_points(predictions, labels, errors, j);
        let stats  = residual_stats(&points);
        if points.is_empty() {
            tracing::warn!("No measured labels for {}, skipping plot", target);
        } else {
            let path: PathBuf = out_dir.join(format!("{target}_test.png"));
            plot_residual(&path, target, &points, &stats)?;
        }
        all_stats.push((target.to_string(), stats));
    }
    tracing::info!("Finished plotting residues");
    Ok(all_stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::spectrum::MAGIC_NUMBER;
    use ndarray::array;

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert!(median(&[]).is_nan());
    }

    #[test]
    fn test_std_dev_is_population() {
        assert!((std_dev(&[1.0, 3.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_points_skip_missing_labels() {
        let pred   = array![[1.5, 0.0], [2.0, 0.0], [9.0, 0.0]];
        let labels = array![[1.0, 0.0], [2.5, 0.0], [MAGIC_NUMBER, 0.0]];
        let errs   = array![[0.1, 0.0], [0.2, 0.0], [0.3, 0.0]];
        let points = residual_points(&pred, &labels, &errs, 0);
        assert_eq!(points, vec![
            ResidualPoint { label: 1.0, residual: 0.5, error: 0.1 },
            ResidualPoint { label: 2.5, residual: -0.5, error: 0.2 },
        ]);
    }

    #[test]
    fn test_stats() {
        let points = vec![
            ResidualPoint { label: 1.0, residual: 0.5, error: 0.0 },
            ResidualPoint { label: 3.0, residual: -0.5, error: 0.0 },
            ResidualPoint { label: 5.0, residual: 0.0, error: 0.0 },
        ];
        let s = residual_stats(&points);
        assert_eq!(s.count, 3);
        assert_eq!(s.bias, 0.0);
        let scatter = (1.0f32 / 6.0).sqrt();
        assert!((s.scatter - scatter).abs() < 1e-5);
        let label_std = (8.0f32 / 3.0).sqrt();
        assert!((s.relative - scatter / label_std).abs() < 1e-5);
    }

    #[test]
    fn test_plot_residuals_writes_one_png_per_measured_target() {
        let dir     = tempfile::tempdir().unwrap();
        let targets = TargetNames::parse("teff,Fe").unwrap();
        let preds   = array![[5000.0, 0.1], [4500.0, -0.2], [4800.0, 0.0]];
        let labels  = array![[5050.0, MAGIC_NUMBER], [4400.0, MAGIC_NUMBER], [4810.0, MAGIC_NUMBER]];
        let errors  = array![[30.0, 0.05], [25.0, 0.05], [20.0, 0.05]];

        let stats = plot_residuals(dir.path(), &targets, &preds, &labels, &errors).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].1.count, 3);

        let teff = dir.path().join("residual").join("teff_test.png");
        assert!(std::fs::metadata(&teff).unwrap().len() > 0);
        // No measured Fe, so no Fe plot
        assert!(!dir.path().join("residual").join("Fe_test.png").exists());
    }
}
