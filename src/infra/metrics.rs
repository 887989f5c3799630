// ============================================================
// Layer 6 — Metrics Sinks
// ============================================================
// CsvMetricsSink: append-only CSV of MetricsSample records,
// both splits in one file.
//
// Output file: <checkpoint dir>/metrics.csv
//
// Example CSV output:
//   step,split,loss,accuracy
//   50,train,2.281904,14.062500
//   200,train,1.902113,31.250000
//   200,validation,1.950026,28.125000
//
// How to read the metrics:
//   - Loss should decrease over steps (model is learning)
//   - If validation loss rises while train loss falls → overfitting
//
// Reference: Rust Book §9 (Error Handling)
//            Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::metrics::MetricsSample;
use crate::domain::traits::MetricsSink;

const CSV_HEADER: &str = "step,split,loss,accuracy";

// ─── CsvMetricsSink ───────────────────────────────────────────────────────────
pub struct CsvMetricsSink {
    csv_path: PathBuf,
}

impl CsvMetricsSink {
    /// Create `<dir>/metrics.csv`, writing the header only if the file
    /// is new, so resumed runs append to the same log.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create metrics directory '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{CSV_HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

impl MetricsSink for CsvMetricsSink {
    fn record(&mut self, m: &MetricsSample) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(f, "{},{},{:.6},{:.6}", m.step, m.split, m.loss, m.accuracy)?;
        Ok(())
    }
}
