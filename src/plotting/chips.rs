// ============================================================
// Layer 7 — APOGEE Detector Chips
// ============================================================
// An apStar spectrum has 8575 pixels on a log-linear wavelength
// grid:
//
//   λ(i) = 10^(4.179 + 6e-6 · i)  Å,   i = 0..8575
//
// Only three stretches carry flux, one per detector chip. DR14
// pixel ranges (end exclusive):
//
//   blue  [ 246, 3274)   3028 pixels
//   green [3585, 6080)   2495 pixels
//   red   [6344, 8335)   1991 pixels
//
// Training spectra usually have the gaps removed: 7514 pixels,
// blue then green then red back to back.

use std::ops::Range;

use anyhow::{bail, Result};

/// Pixel boundaries on the full apStar grid
pub const DR14_PIX: [usize; 7] = [246, 3274, 3585, 6080, 6344, 8335, 8575];

pub const APSTAR_PIXELS: usize = 8575;
pub const GAP_REMOVED_PIXELS: usize =
    (DR14_PIX[1] - DR14_PIX[0]) + (DR14_PIX[3] - DR14_PIX[2]) + (DR14_PIX[5] - DR14_PIX[4]);

const LOG_LAMBDA_START: f64 = 4.179;
const LOG_LAMBDA_STEP:  f64 = 6e-6;

/// The same quantity split over the three chips
#[derive(Debug, Clone, PartialEq)]
pub struct Chips<T> {
    pub blue:  Vec<T>,
    pub green: Vec<T>,
    pub red:   Vec<T>,
}

impl<T> Chips<T> {
    pub fn as_array(&self) -> [&[T]; 3] {
        [&self.blue, &self.green, &self.red]
    }
}

fn chip_ranges() -> [Range<usize>; 3] {
    [DR14_PIX[0]..DR14_PIX[1], DR14_PIX[2]..DR14_PIX[3], DR14_PIX[4]..DR14_PIX[5]]
}

/// Vacuum wavelength (Å) of every chip pixel
pub fn wavelength_solution() -> Chips<f64> {
    let lambda = |i: usize| 10f64.powf(LOG_LAMBDA_START + LOG_LAMBDA_STEP * i as f64);
    let [b, g, r] = chip_ranges();
    Chips {
        blue:  b.map(lambda).collect(),
        green: g.map(lambda).collect(),
        red:   r.map(lambda).collect(),
    }
}

/// Split a full (8575) or gap-removed (7514) vector into chips
pub fn chips_split<T: Copy>(values: &[T]) -> Result<Chips<T>> {
    let [b, g, r] = chip_ranges();
    match values.len() {
        APSTAR_PIXELS => Ok(Chips {
            blue:  values[b].to_vec(),
            green: values[g].to_vec(),
            red:   values[r].to_vec(),
        }),
        GAP_REMOVED_PIXELS => {
            let blue_end  = b.len();
            let green_end = blue_end + g.len();
            Ok(Chips {
                blue:  values[..blue_end].to_vec(),
                green: values[blue_end..green_end].to_vec(),
                red:   values[green_end..].to_vec(),
            })
        }
        n => bail!(
            "cannot split {n} pixels into chips (expected {APSTAR_PIXELS} or {GAP_REMOVED_PIXELS})"
        ),
    }
}

/// True when a spectrum length matches one of the APOGEE layouts
pub fn is_apogee_layout(n_pixels: usize) -> bool {
    n_pixels == APSTAR_PIXELS || n_pixels == GAP_REMOVED_PIXELS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gap_removed_length() {
        assert_eq!(GAP_REMOVED_PIXELS, 7514);
    }

    #[test]
    fn test_wavelengths_span_h_band() {
        let w = wavelength_solution();
        assert_eq!(w.blue.len(), 3028);
        assert_eq!(w.green.len(), 2495);
        assert_eq!(w.red.len(), 1991);
        assert!(w.blue[0] > 15100.0 && w.blue[0] < 15200.0);
        assert!(*w.red.last().unwrap() < 17000.0);
        assert!(w.green[0] > *w.blue.last().unwrap());
    }

    #[test]
    fn test_split_full_and_gap_removed_agree() {
        let full: Vec<usize> = (0..APSTAR_PIXELS).collect();
        let chips = chips_split(&full).unwrap();
        assert_eq!(chips.blue[0], 246);
        assert_eq!(chips.green[0], 3585);
        assert_eq!(*chips.red.last().unwrap(), 8334);

        let compact: Vec<usize> = chips
            .as_array()
            .iter()
            .flat_map(|c| c.iter().copied())
            .collect();
        assert_eq!(chips_split(&compact).unwrap(), chips);
    }

    #[test]
    fn test_other_lengths_are_rejected() {
        assert!(chips_split(&[0.0f32; 100]).is_err());
        assert!(!is_apogee_layout(100));
    }
}
