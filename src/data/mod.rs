// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from image files on disk all
// the way to tensor batches on the training device.
//
// The pipeline flows in this order:
//
//   class folders / CIFAR-10 .bin records
//       │
//       ▼
//   ClassFolderLoader → lists (file, label) pairs, one sub-dir per class
//       │
//       ▼
//   split_train_val   → seeded train/validation split of the file list
//       │
//       ▼
//   SampleSource      → random-access samples (ImageFolderSource,
//       │               Cifar10Source, InMemorySource)
//       │               decoding goes through ImagePreprocessor
//       ▼
//   BatchPipeline     → background workers fill a bounded queue
//       │               with fixed-size batches
//       ▼
//   ImageBatcher      → turns a Batch into [N, C, H, W] tensors
//
// Each module is responsible for exactly one step.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)
//            Rust Book §16 (Fearless Concurrency)

/// Lists class sub-directories and their image files
pub mod loader;

/// Decodes, resizes and normalises images to CHW f32
pub mod preprocessor;

/// SampleSource implementations over memory and image folders
pub mod dataset;

/// SampleSource over CIFAR-10 binary record files
pub mod cifar;

/// Bounded multi-worker batch pipeline
pub mod pipeline;

/// Turns domain batches into Burn tensors
pub mod batcher;

/// Shuffles and splits data into train/validation sets
pub mod splitter;
