// ============================================================
// Layer 7 — Jacobian Plots
// ============================================================
// One figure per target showing the star-averaged Jacobian
// ∂ output / ∂ flux against wavelength.
//
// Layout:
//   APOGEE spectra (8575 or 7514 pixels) → three stacked panels,
//     one per detector chip, x axis in Å
//   anything else → one panel, x axis in pixel index
//
// Every panel shares the y range [min J, max |J|] and has a
// dashed zero line. When an ASPCAP window mask is available it
// is scaled by max |J| and drawn on top.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ndarray::Array2;
use plotters::prelude::*;

use crate::domain::targets::TargetNames;
use crate::infra::windows::WindowFetcher;
use crate::plotting::chips::{chips_split, is_apogee_layout, wavelength_solution};
use crate::plotting::{padded_range, FONT};

/// One panel worth of data
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    pub x:       Vec<f64>,
    pub y:       Vec<f32>,
    pub windows: Option<Vec<f32>>,
}

/// Lower and upper y limits: (min J, max |J|)
pub fn jacobian_limits(values: &[f32]) -> (f32, f32) {
    let upper = values.iter().fold(0.0f32, |m, v| m.max(v.abs()));
    let lower = values.iter().fold(f32::INFINITY, |m, &v| m.min(v));
    let lower = if lower.is_finite() { lower } else { 0.0 };
    if upper > lower { (lower, upper) } else { (lower - 1.0, upper + 1.0) }
}

/// Cut the averaged Jacobian (and optional mask) into panels.
/// A mask that does not fit the layout is dropped with a warning.
pub fn build_panels(values: &[f32], mask: Option<&[f32]>) -> Result<Vec<Panel>> {
    // Plain max |J|: the widened plot limits would overstate flat Jacobians
    let scale  = values.iter().fold(0.0f32, |m, v| m.max(v.abs()));
    let scaled = mask.map(|m| m.iter().map(|v| v * scale).collect::<Vec<f32>>());

    if !is_apogee_layout(values.len()) {
        let windows = scaled.filter(|m| {
            let fits = m.len() == values.len();
            if !fits {
                tracing::warn!("Window mask has {} pixels, spectra have {}; not overlaid", m.len(), values.len());
            }
            fits
        });
        return Ok(vec![Panel {
            x: (0..values.len()).map(|i| i as f64).collect(),
            y: values.to_vec(),
            windows,
        }]);
    }

    let lambda = wavelength_solution();
    let chips  = chips_split(values)?;
    let window_chips = match scaled.as_deref().map(chips_split) {
        Some(Ok(c)) => Some(c),
        Some(Err(e)) => {
            tracing::warn!("Window mask not overlaid: {}", e);
            None
        }
        None => None,
    };

    let panels = (0..3)
        .map(|k| Panel {
            x:       lambda.as_array()[k].to_vec(),
            y:       chips.as_array()[k].to_vec(),
            windows: window_chips.as_ref().map(|w| w.as_array()[k].to_vec()),
        })
        .collect();
    Ok(panels)
}

/// Render one target's Jacobian figure to `path`
pub fn plot_jacobian(path: &Path, target: &str, n_stars: usize, panels: &[Panel]) -> Result<()> {
    let all_y: Vec<f32> = panels.iter().flat_map(|p| p.y.iter().copied()).collect();
    let (y_min, y_max)  = jacobian_limits(&all_y);
    let apogee          = panels.len() == 3;

    let root = BitMapBackend::new(path, (3000, 2000)).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(
        &format!("{target}, Average of {n_stars} Stars"),
        (FONT, 60),
    )?;

    let areas = root.split_evenly((panels.len(), 1));
    for (k, (area, panel)) in areas.iter().zip(panels).enumerate() {
        let (x_min, x_max) = padded_range(panel.x.iter().map(|&v| v as f32), 0.0);

        let mut chart = ChartBuilder::on(area)
            .margin(20)
            .x_label_area_size(if k + 1 == panels.len() { 90 } else { 50 })
            .y_label_area_size(150)
            .build_cartesian_2d(x_min as f64..x_max as f64, y_min..y_max)?;

        let mut mesh = chart.configure_mesh();
        mesh.y_desc(format!("∂{target}"))
            .axis_desc_style((FONT, 40))
            .label_style((FONT, 28))
            .disable_mesh();
        if k + 1 == panels.len() {
            mesh.x_desc(if apogee { "Wavelength (Angstrom)" } else { "Pixel" });
        }
        mesh.draw()?;

        chart.draw_series(DashedLineSeries::new(
            vec![(x_min as f64, 0.0f32), (x_max as f64, 0.0)],
            14,
            10,
            BLACK.stroke_width(2).into(),
        ))?;

        chart
            .draw_series(LineSeries::new(
                panel.x.iter().copied().zip(panel.y.iter().copied()),
                BLUE.stroke_width(1),
            ))?
            .label("stellar-cnn")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], BLUE.stroke_width(3)));

        if let Some(windows) = &panel.windows {
            chart
                .draw_series(LineSeries::new(
                    panel.x.iter().copied().zip(windows.iter().copied()),
                    RED.stroke_width(1),
                ))?
                .label("ASPCAP windows")
                .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], RED.stroke_width(3)));
        }

        if k == 0 {
            chart
                .configure_series_labels()
                .label_font((FONT, 36))
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()?;
        }
    }

    root.present()
        .with_context(|| format!("Cannot write '{}'", path.display()))?;
    Ok(())
}

/// Render every target's averaged Jacobian into `<dir>/jacobian/`
pub fn plot_jacobians(
    dir:          &Path,
    targets:      &TargetNames,
    mean_jacobian: &Array2<f32>,
    n_stars:      usize,
    fetcher:      &WindowFetcher,
) -> Result<Vec<PathBuf>> {
    let out_dir = dir.join("jacobian");
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Cannot create '{}'", out_dir.display()))?;

    let mut written = Vec::with_capacity(targets.len());
    for (j, target) in targets.iter().enumerate() {
        let values: Vec<f32> = mean_jacobian.row(j).to_vec();
        let mask   = fetcher.fetch_or_warn(target);
        let panels = build_panels(&values, mask.as_deref())?;

        let path = out_dir.join(format!("{target}_jacobian.png"));
        plot_jacobian(&path, target, n_stars, &panels)?;
        tracing::debug!("Wrote '{}'", path.display());
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plotting::chips::{APSTAR_PIXELS, GAP_REMOVED_PIXELS};

    #[test]
    fn test_limits() {
        assert_eq!(jacobian_limits(&[-0.5, 0.2, 0.1]), (-0.5, 0.5));
        assert_eq!(jacobian_limits(&[0.1, 0.3]), (0.1, 0.3));
        // Degenerate input still gives a usable range
        let (lo, hi) = jacobian_limits(&[0.0, 0.0]);
        assert!(lo < hi);
    }

    #[test]
    fn test_generic_layout_is_one_panel() {
        let panels = build_panels(&[0.1, -0.2, 0.4], Some(&[0.0, 1.0, 0.0])).unwrap();
        assert_eq!(panels.len(), 1);
        assert_eq!(panels[0].x, vec![0.0, 1.0, 2.0]);
        // Mask scaled by max |J| = 0.4
        assert_eq!(panels[0].windows, Some(vec![0.0, 0.4, 0.0]));
    }

    #[test]
    fn test_mismatched_mask_is_dropped() {
        let panels = build_panels(&[0.1, 0.2], Some(&[1.0, 1.0, 1.0])).unwrap();
        assert!(panels[0].windows.is_none());
    }

    #[test]
    fn test_apogee_layout_gives_three_panels_with_full_mask() {
        let values = vec![0.5f32; GAP_REMOVED_PIXELS];
        let mask   = vec![1.0f32; APSTAR_PIXELS];
        let panels = build_panels(&values, Some(&mask)).unwrap();
        assert_eq!(panels.len(), 3);
        assert_eq!(panels[0].x.len(), panels[0].y.len());
        assert_eq!(panels[2].windows.as_ref().unwrap().len(), panels[2].y.len());
        assert_eq!(panels[1].windows.as_ref().unwrap()[0], 0.5);
    }

    #[test]
    fn test_flat_jacobian_scales_mask_by_its_own_value() {
        let panels = build_panels(&[0.25, 0.25, 0.25], Some(&[1.0, 0.0, 1.0])).unwrap();
        assert_eq!(panels[0].windows, Some(vec![0.25, 0.0, 0.25]));
        let panels = build_panels(&[0.0, 0.0], Some(&[1.0, 1.0])).unwrap();
        assert_eq!(panels[0].windows, Some(vec![0.0, 0.0]));
    }

    fn assert_png(path: &Path) {
        let size = std::fs::metadata(path).unwrap().len();
        assert!(size > 0, "'{}' is empty", path.display());
    }

    #[test]
    fn test_plot_jacobians_without_windows_writes_png() {
        let dir     = tempfile::tempdir().unwrap();
        let targets = TargetNames::parse("teff,Fe").unwrap();
        let mean    = Array2::<f32>::from_shape_fn((2, 16), |(t, i)| (i as f32 - 8.0) * 0.01 * (t + 1) as f32);
        let fetcher = WindowFetcher::new(crate::infra::windows::MaskSource::Disabled);

        let written = plot_jacobians(dir.path(), &targets, &mean, 5, &fetcher).unwrap();
        assert_eq!(written.len(), 2);
        for target in ["teff", "Fe"] {
            assert_png(&dir.path().join("jacobian").join(format!("{target}_jacobian.png")));
        }
    }

    #[test]
    fn test_plot_jacobians_with_local_windows_writes_png() {
        let dir       = tempfile::tempdir().unwrap();
        let masks_dir = dir.path().join("masks");
        std::fs::create_dir_all(&masks_dir).unwrap();
        let mask_text: String = (0..16).map(|i| format!("{}\t0\n", i % 2)).collect();
        std::fs::write(masks_dir.join("Fe.mask"), mask_text).unwrap();

        let targets = TargetNames::parse("Fe").unwrap();
        let mean    = Array2::<f32>::from_shape_fn((1, 16), |(_, i)| (i as f32).sin() * 0.1);
        let fetcher = WindowFetcher::new(crate::infra::windows::MaskSource::Local(masks_dir));

        let written = plot_jacobians(dir.path(), &targets, &mean, 3, &fetcher).unwrap();
        assert_eq!(written, vec![dir.path().join("jacobian").join("Fe_jacobian.png")]);
        assert_png(&written[0]);
    }
}
