// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from .npy files on disk to tensor batches.
//
//   spectra.npy + labels.npy
//       │
//       ▼
//   NpyLoader         → reads arrays, checks shapes
//       │
//       ▼
//   LabelNormalizer   → standardises labels (keeps MAGIC_NUMBER)
//       │
//       ▼
//   splitter          → holds out a validation set
//       │
//       ├──────────────────────────────┐
//       ▼                              ▼
//   ShuffledBatches + PrefetchPool  SpectraDataset + DataLoader
//   (training, worker threads)      (validation)
//       │                              │
//       └──────────────┬───────────────┘
//                      ▼
//                SpectraBatcher  → stacks samples into tensors
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads spectra / labels from .npy files
pub mod loader;

/// Label standardisation and meanstd.npy persistence
pub mod normalizer;

/// Infinite shuffled batch generator and its worker pool
pub mod generator;

/// Implements Burn's Dataset trait for spectra
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Shuffles and splits data into train/validation sets
pub mod splitter;
