// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns that don't belong in any specific
// business layer:
//
//   checkpoint.rs — The run folder: model weights (Burn
//                   CompactRecorder), model / training config
//                   JSON, target names, model summary
//
//   metrics.rs    — Per-epoch CSV training log
//
//   run_dir.rs    — Naming and creating per-run folders
//
//   windows.rs    — ASPCAP window masks, downloaded or read
//                   from disk, for Jacobian overlays
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)

/// Run folder contents: weights, configs, target names
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// Per-run folder naming
pub mod run_dir;

/// ASPCAP window mask retrieval
pub mod windows;
