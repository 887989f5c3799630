// ============================================================
// Layer 4 — CIFAR-10 Binary Source
// ============================================================
// CIFAR-10 "binary version" files are fixed-size records:
//
//   ┌───────┬────────────────────────────────────────────┐
//   │ label │ 1024 red │ 1024 green │ 1024 blue          │
//   │ 1 B   │ 32×32 row-major planes, one byte per pixel │
//   └───────┴────────────────────────────────────────────┘
//      3073 bytes per record, 10 000 records per file
//
// Training split: data_batch_1.bin … data_batch_5.bin
// Test split:     test_batch.bin
//
// The planes are already channel-major, so decoding a record is
// a single scale pass. Whole files are read into memory once
// (≈30 MB each) and shared by every worker.

use anyhow::{bail, Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::sample::{ImageShape, Sample};
use crate::domain::traits::SampleSource;

pub const CIFAR10_CLASSES: usize = 10;
pub const CIFAR10_SIDE:    usize = 32;
const IMAGE_BYTES:  usize = 3 * CIFAR10_SIDE * CIFAR10_SIDE;
const RECORD_BYTES: usize = 1 + IMAGE_BYTES;

/// Which CIFAR-10 split to read from a dataset directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CifarSplit {
    Train,
    Test,
}

impl CifarSplit {
    pub fn files(self, dir: &Path) -> Vec<PathBuf> {
        match self {
            CifarSplit::Train => (1..=5).map(|i| dir.join(format!("data_batch_{i}.bin"))).collect(),
            CifarSplit::Test  => vec![dir.join("test_batch.bin")],
        }
    }
}

pub struct Cifar10Source {
    records: Vec<u8>,
}

impl Cifar10Source {
    /// Read one split from the standard directory layout.
    pub fn open_split(dir: &Path, split: CifarSplit) -> Result<Self> {
        Self::open(&split.files(dir))
    }

    /// Read and concatenate the given record files.
    pub fn open(paths: &[PathBuf]) -> Result<Self> {
        let mut records = Vec::new();
        for path in paths {
            let bytes = fs::read(path)
                .with_context(|| format!("Cannot read CIFAR-10 file '{}'", path.display()))?;
            if bytes.len() % RECORD_BYTES != 0 {
                bail!(
                    "'{}' is {} bytes, not a whole number of {}-byte records",
                    path.display(),
                    bytes.len(),
                    RECORD_BYTES
                );
            }
            tracing::debug!("Read {} records from '{}'", bytes.len() / RECORD_BYTES, path.display());
            records.extend_from_slice(&bytes);
        }
        Self::from_bytes(records)
    }

    pub fn from_bytes(records: Vec<u8>) -> Result<Self> {
        if records.len() % RECORD_BYTES != 0 {
            bail!("CIFAR-10 data is not a whole number of {RECORD_BYTES}-byte records");
        }
        if let Some(i) = records
            .chunks_exact(RECORD_BYTES)
            .position(|r| r[0] as usize >= CIFAR10_CLASSES)
        {
            bail!("CIFAR-10 record {} has label {} (expected 0..10)", i, records[i * RECORD_BYTES]);
        }
        Ok(Self { records })
    }
}

impl SampleSource for Cifar10Source {
    fn len(&self) -> usize {
        self.records.len() / RECORD_BYTES
    }

    fn shape(&self) -> ImageShape {
        ImageShape::rgb(CIFAR10_SIDE, CIFAR10_SIDE)
    }

    fn get(&self, index: usize) -> Result<Sample> {
        let start = index * RECORD_BYTES;
        let Some(record) = self.records.get(start..start + RECORD_BYTES) else {
            bail!("CIFAR-10 record {} out of range (len {})", index, self.len());
        };
        let pixels = record[1..].iter().map(|&b| b as f32 / 255.0).collect();
        Ok(Sample::new(pixels, record[0] as usize))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn record(label: u8, fill: u8) -> Vec<u8> {
        let mut r = vec![fill; RECORD_BYTES];
        r[0] = label;
        r
    }

    #[test]
    fn test_decodes_label_and_pixels() {
        let bytes  = [record(3, 255), record(9, 0)].concat();
        let source = Cifar10Source::from_bytes(bytes).unwrap();
        assert_eq!(source.len(), 2);

        let first = source.get(0).unwrap();
        assert_eq!(first.label, 3);
        assert_eq!(first.pixels.len(), source.shape().volume());
        assert!(first.pixels.iter().all(|&v| v == 1.0));
        assert_eq!(source.get(1).unwrap().label, 9);
        assert!(source.get(2).is_err());
    }

    #[test]
    fn test_rejects_truncated_data() {
        let mut bytes = record(1, 0);
        bytes.pop();
        assert!(Cifar10Source::from_bytes(bytes).is_err());
    }

    #[test]
    fn test_rejects_bad_label() {
        assert!(Cifar10Source::from_bytes(record(10, 0)).is_err());
    }

    #[test]
    fn test_open_split_reads_test_batch() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("test_batch.bin"), [record(0, 1), record(1, 2)].concat()).unwrap();
        let source = Cifar10Source::open_split(dir.path(), CifarSplit::Test).unwrap();
        assert_eq!(source.len(), 2);
        assert!(Cifar10Source::open_split(dir.path(), CifarSplit::Train).is_err());
    }
}
