// ============================================================
// Layer 7 — Plotting (plotters)
// ============================================================
// Diagnostic figures written as PNG files into a run folder.
//
//   chips.rs    — APOGEE detector layout and wavelength grid
//
//   residual.rs — prediction minus label against label, one
//                 figure per target, with bias and scatter
//
//   jacobian.rs — star-averaged ∂ output / ∂ flux against
//                 wavelength, with ASPCAP windows overlaid

/// Detector chips and wavelength solution
pub mod chips;

/// Residual plots and statistics
pub mod residual;

/// Jacobian plots
pub mod jacobian;

/// Font family used for every label
pub const FONT: &str = "sans-serif";

/// (min, max) of `values`, widened by `pad_fraction` of the span.
/// Empty input gives (0, 1); a constant input is widened by ±1.
pub fn padded_range<I>(values: I, pad_fraction: f32) -> (f32, f32)
where
    I: IntoIterator<Item = f32>,
{
    let (min, max) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));

    if !min.is_finite() {
        return (0.0, 1.0);
    }
    if min == max {
        return (min - 1.0, max + 1.0);
    }
    let pad = (max - min) * pad_fraction;
    (min - pad, max + pad)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_range() {
        assert_eq!(padded_range([1.0, 3.0, 2.0], 0.0), (1.0, 3.0));
        assert_eq!(padded_range([0.0, 10.0], 0.1), (-1.0, 11.0));
    }

    #[test]
    fn test_padded_range_degenerate() {
        assert_eq!(padded_range(std::iter::empty(), 0.1), (0.0, 1.0));
        assert_eq!(padded_range([2.0, 2.0], 0.1), (1.0, 3.0));
        assert_eq!(padded_range([f32::NAN, 4.0, 5.0], 0.0), (4.0, 5.0));
    }
}
