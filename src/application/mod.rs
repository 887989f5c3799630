// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer wires the other layers together for one goal:
// training (fresh, resumed or fine-tuned) or held-out
// evaluation.
//
// Rules for this layer:
//   - No ML math or Burn types here (that's Layer 5)
//   - No argument parsing (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

/// Serialisable run configuration (train_config.json)
pub mod config;

/// Train / validation / held-out source assembly
pub mod datasets;

/// The training and fine-tuning workflow
pub mod train_use_case;

/// The held-out evaluation workflow
pub mod evaluate_use_case;
