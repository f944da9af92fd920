// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types describing what the system works on:
// spectra, labels, and the names of the labels.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO plotting code
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Spectra / labels pairs and the missing-label sentinel
pub mod spectrum;

// Target (label column) names and their display forms
pub mod targets;

// Core abstractions (traits) that other layers implement
pub mod traits;
