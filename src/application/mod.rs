// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// a specific goal (training, evaluating, explaining).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No argument parsing here (that's Layer 1)
//   - File formats belong to Layers 4, 6 and 7
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The training workflow
pub mod train_use_case;

// Predictions on a labelled test set + residual plots
pub mod evaluate_use_case;

// Jacobians of the outputs + their plots
pub mod jacobian_use_case;
