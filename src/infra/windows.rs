// ============================================================
// Layer 6 — ASPCAP Window Masks
// ============================================================
// ASPCAP measures each element only inside a set of wavelength
// windows. The windows are published per element as a .mask
// file: one weight per apStar pixel (8575 lines, tab-separated,
// first column used). Overlaying them on a Jacobian shows
// whether the network looks where ASPCAP looks.
//
// Masks come either from the SDSS SVN (DR14 only) or from a
// local directory holding <name>.mask files. Missing masks are
// normal (Teff, log g have none), so callers use fetch_or_warn
// and simply skip the overlay.

use std::{fs, path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};

use crate::domain::targets::window_file_name;

const DR14_MASK_URL: &str = "https://svn.sdss.org/public/repo/apogee/idlwrap/trunk/lib/l31c";

/// URL of the published window mask for `target`
pub fn window_url(dr: u32, target: &str) -> Result<String> {
    if dr != 14 {
        bail!("ASPCAP windows are only available for DR14, not DR{dr}");
    }
    Ok(format!("{DR14_MASK_URL}/{}.mask", window_file_name(target)))
}

/// Parse mask text: the first numeric field of every non-empty line
pub fn parse_mask(text: &str) -> Result<Vec<f32>> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .enumerate()
        .map(|(i, line)| {
            let field = line.split_whitespace().next().unwrap_or(line);
            field
                .parse::<f32>()
                .with_context(|| format!("line {}: '{}' is not a number", i + 1, field))
        })
        .collect()
}

/// Where masks are read from
#[derive(Debug, Clone)]
pub enum MaskSource {
    /// Download from the SDSS SVN for the given data release
    Remote { dr: u32 },
    /// Read <name>.mask from a local directory
    Local(PathBuf),
    /// Never overlay windows
    Disabled,
}

pub struct WindowFetcher {
    source: MaskSource,
}

impl WindowFetcher {
    pub fn new(source: MaskSource) -> Self {
        Self { source }
    }

    pub fn fetch(&self, target: &str) -> Result<Vec<f32>> {
        let text = match &self.source {
            MaskSource::Remote { dr } => {
                let url = window_url(*dr, target)?;
                tracing::debug!("Fetching {}", url);
                let client = reqwest::blocking::Client::builder()
                    .timeout(Duration::from_secs(30))
                    .build()?;
                client
                    .get(&url)
                    .send()
                    .and_then(|r| r.error_for_status())
                    .and_then(|r| r.text())
                    .with_context(|| format!("Cannot download '{url}'"))?
            }
            MaskSource::Local(dir) => {
                let path = dir.join(format!("{}.mask", window_file_name(target)));
                fs::read_to_string(&path)
                    .with_context(|| format!("Cannot read '{}'", path.display()))?
            }
            MaskSource::Disabled => bail!("window overlays are disabled"),
        };
        parse_mask(&text)
    }

    /// Fetch the mask, logging a warning instead of failing
    pub fn fetch_or_warn(&self, target: &str) -> Option<Vec<f32>> {
        if matches!(self.source, MaskSource::Disabled) {
            return None;
        }
        match self.fetch(target) {
            Ok(mask) => Some(mask),
            Err(e) => {
                tracing::warn!("No ASPCAP windows data for {}: {:#}", window_file_name(target), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dr14_url() {
        assert_eq!(
            window_url(14, "C1").unwrap(),
            "https://svn.sdss.org/public/repo/apogee/idlwrap/trunk/lib/l31c/CI.mask"
        );
    }

    #[test]
    fn test_other_release_is_rejected() {
        assert!(window_url(16, "Fe").is_err());
    }

    #[test]
    fn test_parse_mask_takes_first_column() {
        let mask = parse_mask("0\t1\n0.5\t2\n\n1\n").unwrap();
        assert_eq!(mask, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_parse_mask_rejects_garbage() {
        assert!(parse_mask("0\nabc\n").is_err());
    }

    #[test]
    fn test_local_masks_and_fallback() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Fe.mask"), "0\n1\n1\n0\n").unwrap();
        let fetcher = WindowFetcher::new(MaskSource::Local(dir.path().to_path_buf()));

        assert_eq!(fetcher.fetch_or_warn("Fe"), Some(vec![0.0, 1.0, 1.0, 0.0]));
        // No mask for Teff → warning, no overlay
        assert_eq!(fetcher.fetch_or_warn("teff"), None);
    }

    #[test]
    fn test_disabled_source() {
        let fetcher = WindowFetcher::new(MaskSource::Disabled);
        assert!(fetcher.fetch_or_warn("Fe").is_none());
        assert!(fetcher.fetch("Fe").is_err());
    }
}
