// ============================================================
// Layer 3 — Target Names
// ============================================================
// The network regresses an ordered list of ASPCAP parameters.
// Each column of the label array corresponds to one name here.
//
// Short names follow the APOGEE convention:
//   teff  — effective temperature
//   logg  — surface gravity
//   M     — overall metallicity [M/H]
//   alpha — alpha-element enhancement [α/M]
//   C1    — neutral carbon (C I)
//   Ti2   — ionised titanium (Ti II)
//   other — element symbols, reported as [X/H]

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Every target ASPCAP DR14 reports, in label-column order.
/// `--targets all` expands to this list.
pub const ALL_TARGETS: [&str; 28] = [
    "teff", "logg", "M", "alpha", "C", "C1", "N", "O", "Na", "Mg", "Al", "Si", "P", "S",
    "K", "Ca", "Ti", "Ti2", "V", "Cr", "Mn", "Fe", "Ni", "Cu", "Ge", "Rb", "Y", "Nd",
];

/// Ordered list of target names, one per label column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetNames(Vec<String>);

impl TargetNames {
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            bail!("at least one target name is required");
        }
        Ok(Self(names))
    }

    /// Parse `all` or a comma-separated list such as `teff,logg,Fe`
    pub fn parse(spec: &str) -> Result<Self> {
        if spec.trim().eq_ignore_ascii_case("all") {
            return Self::new(ALL_TARGETS.iter().map(|s| s.to_string()).collect());
        }
        let names: Vec<String> = spec
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        Self::new(names)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Human-readable axis label for a target
pub fn display_name(target: &str) -> String {
    match target {
        "teff"  => "Teff".to_string(),
        "logg"  => "log(g)".to_string(),
        "M"     => "[M/H]".to_string(),
        "alpha" => "[Alpha/M]".to_string(),
        "C1"    => "[CI/H]".to_string(),
        "Ti2"   => "[TiII/H]".to_string(),
        t if t.len() < 3 => format!("[{t}/H]"),
        t => t.to_string(),
    }
}

/// Name under which the ASPCAP window mask for a target is published
pub fn window_file_name(target: &str) -> String {
    match target {
        "C1"  => "CI".to_string(),
        "Ti2" => "TiII".to_string(),
        t => t.to_string(),
    }
}
