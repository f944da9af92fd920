// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Burn-specific model code lives here.
//
//   model.rs     — The 1D CNN:
//                  • two Conv1d + ReLU + BatchNorm stages
//                  • max pooling and flatten
//                  • dropout and two dense ReLU layers
//                  • linear output, one unit per target
//
//   loss.rs      — Mean squared error that skips missing labels
//
//   scheduler.rs — Learning-rate reduction on plateau
//
//   trainer.rs   — The training loop: prefetched shuffled
//                  batches, Adam, validation, CSV log,
//                  final weights
//
//   predictor.rs — Loads a run and predicts physical labels,
//                  with Monte Carlo dropout uncertainties
//
//   jacobian.rs  — Output-vs-input gradients via autodiff
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// 1D CNN architecture
pub mod model;

/// Masked MSE loss
pub mod loss;

/// ReduceLROnPlateau-style scheduler
pub mod scheduler;

/// Full training loop with validation and logging
pub mod trainer;

/// Inference with optional MC-dropout uncertainty
pub mod predictor;

/// Gradients of outputs with respect to input spectra
pub mod jacobian;
