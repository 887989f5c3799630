// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits describing what a
// training run IS: samples, batches, parameter snapshots,
// metric records and the capabilities the orchestrator needs
// from a model.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or threads
//   - Only plain Rust structs, enums, traits and errors
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Images, labels, batches and opaque parameter snapshots
pub mod sample;

// Append-only metric records (train / validation)
pub mod metrics;

// Core abstractions (traits) that other layers implement
pub mod traits;

// Error taxonomy shared by the pipeline, store and orchestrator
pub mod error;
