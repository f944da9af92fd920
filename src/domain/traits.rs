// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer talks to data sources and persisted
// artifacts through these traits, so the .npy loader or the
// on-disk layout can change without touching the use cases.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use std::path::Path;

use crate::domain::spectrum::SpectraSet;

// ─── SpectraSource ────────────────────────────────────────────────────────────
/// Any component that can produce a labelled set of spectra.
///
/// Implementations:
///   - NpyLoader → spectra and labels from two .npy files
pub trait SpectraSource {
    /// Load all stars from this source
    fn load(&self) -> Result<SpectraSet>;
}

// ─── Persistable ──────────────────────────────────────────────────────────────
/// Any component whose state lives in a run folder.
///
/// Implementations:
///   - LabelNormalizer → meanstd.npy
///   - TargetNames     → targetname.npy (+ targetname.json)
pub trait Persistable: Sized {
    /// Save this component's state into `dir`
    fn save(&self, dir: &Path) -> Result<()>;

    /// Restore the component from `dir`
    fn load(dir: &Path) -> Result<Self>;
}
