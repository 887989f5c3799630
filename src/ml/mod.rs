// ============================================================
// Layer 5 — ML / Training Layer (Burn)
// ============================================================
// All Burn-specific code lives here; the orchestrator and
// evaluator only see the framework-free `Learner` trait.
//
//   model.rs     — LeNet5 / AlexNet / Vgg16 behind ImageClassifier
//   learner.rs   — objective + Adam step composed into a Learner
//   backend.rs   — runtime backend / architecture → concrete types
//   trainer.rs   — the training orchestrator (step loop, validation
//                  and checkpoint schedule, guaranteed shutdown)
//   evaluator.rs — one-shot held-out precision
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)

/// Convolutional classifier architectures
pub mod model;

/// Loss, accuracy and optimizer step behind the Learner trait
pub mod learner;

/// Backend and architecture dispatch
pub mod backend;

/// Training orchestrator
pub mod trainer;

/// Held-out evaluation
pub mod evaluator;
