// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Durable side effects used by the orchestrator and the use
// cases:
//
//   checkpoint.rs — atomic step snapshots (meta.json + params.bin),
//                   latest/load with checksum verification,
//                   retention, and the run config as JSON
//
//   metrics.rs    — MetricsSink implementations: an append-only
//                   CSV next to the checkpoints, and an in-memory
//                   sink for tests
//
// Reference: Rust Book §9 (Error Handling)
//            Rust Book §12 (I/O and File Handling)

/// Checkpoint snapshots and run configuration
pub mod checkpoint;

/// Metrics CSV and in-memory sinks
pub mod metrics;
