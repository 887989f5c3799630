// ============================================================
// Layer 6 — Checkpoint Store
// ============================================================
// Durable (step, parameters) snapshots, one directory each:
//
//   checkpoints/
//     step-00000000000000000500/
//       meta.json     ← {step, param_bytes, sha256, created_unix}
//       params.bin    ← opaque ParameterSet bytes
//     step-00000000000000001000/
//     .tmp-step-1500-4242-0/   ← unpublished (crashed) write, ignored
//     train_config.json        ← how to rebuild the model
//
// Publishing protocol:
//   1. write params.bin + meta.json into a .tmp-step-… directory
//   2. fsync both files
//   3. re-saving a step: rename the old directory to .old-step-…
//   4. rename the temp directory to step-<20 digits>
//   5. remove the .old-step-… copy
//   6. (optional) prune to the newest `keep_last` snapshots,
//      never the one just published
//
// A crash between 3 and 4 leaves only the .old-step-… copy;
// `clean_stale_temp` moves it back into place.
//
// A rename is atomic on one filesystem, so `latest()` sees a
// snapshot either complete or not at all. Zero-padded names make
// lexicographic order equal numeric order.
//
// The step is read from meta.json. A published directory
// without meta.json (older stores) falls back to the number in
// its name; such snapshots cannot be integrity-checked.
//
// Reference: Rust Book §9 (Error Handling), §12 (I/O)

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use crate::domain::error::CheckpointError;
use crate::domain::sample::{ParameterSet, StepOrLatest};

const SNAPSHOT_PREFIX:  &str = "step-";
const LEGACY_PREFIX:    &str = "model.ckpt-";
const TEMP_PREFIX:      &str = ".tmp-step-";
const ASIDE_PREFIX:     &str = ".old-step-";
const META_FILE:        &str = "meta.json";
const PARAMS_FILE:      &str = "params.bin";
const CONFIG_FILE:      &str = "train_config.json";

/// Contents of meta.json
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub step:         u64,
    pub param_bytes:  u64,
    pub sha256:       String,
    pub created_unix: u64,
}

/// A published snapshot found in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointInfo {
    pub step:   u64,
    pub path:   PathBuf,
    /// No meta.json; step came from the directory name
    pub legacy: bool,
}

pub struct CheckpointStore {
    dir:       PathBuf,
    keep_last: Option<usize>,
    temp_seq:  AtomicU64,
}

impl CheckpointStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CheckpointError::io(&dir, e))?;
        Ok(Self { dir, keep_last: None, temp_seq: AtomicU64::new(0) })
    }

    /// Open a store that must already exist (restore, evaluation).
    pub fn open_existing(dir: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(CheckpointError::NotFound { dir, target: StepOrLatest::Latest });
        }
        Ok(Self { dir, keep_last: None, temp_seq: AtomicU64::new(0) })
    }

    /// Keep only the newest `n` snapshots after each save (n ≥ 1).
    pub fn with_keep_last(mut self, n: usize) -> Self {
        self.keep_last = Some(n.max(1));
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // ─── Save ─────────────────────────────────────────────────────────────────

    /// Atomically publish a snapshot for `step`. Re-saving an existing
    /// step replaces it.
    pub fn save(&self, step: u64, params: &ParameterSet) -> Result<CheckpointInfo, CheckpointError> {
        let seq  = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        let temp = self.dir.join(format!("{TEMP_PREFIX}{step}-{}-{seq}", std::process::id()));

        if let Err(e) = self.write_temp(&temp, step, params) {
            let _ = fs::remove_dir_all(&temp);
            return Err(e);
        }

        let target = self.snapshot_path(step);
        let aside = if target.exists() {
            let aside = self.dir.join(format!("{ASIDE_PREFIX}{step}-{}-{seq}", std::process::id()));
            if let Err(e) = fs::rename(&target, &aside) {
                let _ = fs::remove_dir_all(&temp);
                return Err(CheckpointError::io(&target, e));
            }
            Some(aside)
        } else {
            None
        };
        if let Err(e) = fs::rename(&temp, &target) {
            let _ = fs::remove_dir_all(&temp);
            if let Some(aside) = &aside {
                let _ = fs::rename(aside, &target);
            }
            return Err(CheckpointError::io(&target, e));
        }
        sync_dir(&self.dir);
        if let Some(aside) = aside {
            if let Err(e) = fs::remove_dir_all(&aside) {
                tracing::warn!("Cannot remove replaced snapshot '{}': {}", aside.display(), e);
            }
        }

        tracing::debug!("Saved checkpoint at step {} ({} bytes)", step, params.len());

        if let Some(keep) = self.keep_last {
            self.prune(keep, step);
        }
        Ok(CheckpointInfo { step, path: target, legacy: false })
    }

    fn write_temp(&self, temp: &Path, step: u64, params: &ParameterSet) -> Result<(), CheckpointError> {
        fs::create_dir_all(temp).map_err(|e| CheckpointError::io(temp, e))?;

        let params_path = temp.join(PARAMS_FILE);
        write_synced(&params_path, params.as_bytes())?;

        let meta = CheckpointMeta {
            step,
            param_bytes:  params.len() as u64,
            sha256:       sha256_hex(params.as_bytes()),
            created_unix: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        };
        let meta_path = temp.join(META_FILE);
        let json = serde_json::to_vec_pretty(&meta)
            .map_err(|source| CheckpointError::Json { path: meta_path.clone(), source })?;
        write_synced(&meta_path, &json)
    }

    fn prune(&self, keep: usize, just_saved: u64) {
        let snapshots = match self.list() {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Cannot list checkpoints for pruning: {}", e);
                return;
            }
        };
        let excess = snapshots.len().saturating_sub(keep);
        let doomed = snapshots.iter().filter(|c| c.step != just_saved).take(excess);
        for old in doomed {
            match fs::remove_dir_all(&old.path) {
                Ok(())  => tracing::debug!("Pruned checkpoint at step {}", old.step),
                Err(e) => tracing::warn!("Cannot prune '{}': {}", old.path.display(), e),
            }
        }
    }

    // ─── Lookup ───────────────────────────────────────────────────────────────

    /// Every published snapshot, ascending by step.
    pub fn list(&self) -> Result<Vec<CheckpointInfo>, CheckpointError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| CheckpointError::io(&self.dir, e))?;

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CheckpointError::io(&self.dir, e))?;
            let path  = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            let Some(name_step) = parse_snapshot_name(name) else { continue };

            if !path.join(PARAMS_FILE).is_file() {
                tracing::warn!("Ignoring '{}': no {}", path.display(), PARAMS_FILE);
                continue;
            }
            let meta_path = path.join(META_FILE);
            if meta_path.is_file() {
                match read_meta(&meta_path) {
                    Ok(meta) => found.push(CheckpointInfo { step: meta.step, path, legacy: false }),
                    Err(e)   => tracing::warn!("Ignoring unreadable snapshot: {}", e),
                }
            } else {
                found.push(CheckpointInfo { step: name_step, path, legacy: true });
            }
        }

        found.sort_by_key(|c| c.step);
        Ok(found)
    }

    /// Snapshot with the greatest step.
    pub fn latest(&self) -> Result<CheckpointInfo, CheckpointError> {
        self.find(StepOrLatest::Latest)
    }

    fn find(&self, target: StepOrLatest) -> Result<CheckpointInfo, CheckpointError> {
        let snapshots = self.list()?;
        let found = match target {
            StepOrLatest::Latest     => snapshots.into_iter().last(),
            StepOrLatest::Step(step) => snapshots.into_iter().find(|c| c.step == step),
        };
        found.ok_or_else(|| CheckpointError::NotFound { dir: self.dir.clone(), target })
    }

    /// Read a snapshot back, verifying size and checksum.
    pub fn load(&self, target: StepOrLatest) -> Result<(u64, ParameterSet), CheckpointError> {
        let info = self.find(target)?;

        let params_path = info.path.join(PARAMS_FILE);
        let bytes = fs::read(&params_path).map_err(|e| CheckpointError::io(&params_path, e))?;

        if info.legacy {
            tracing::warn!(
                "Checkpoint '{}' has no {}; step {} taken from its name",
                info.path.display(),
                META_FILE,
                info.step
            );
        } else {
            let meta = read_meta(&info.path.join(META_FILE))?;
            let corrupt = |msg: String| CheckpointError::Corrupt { path: info.path.clone(), msg };
            if meta.param_bytes != bytes.len() as u64 {
                return Err(corrupt(format!(
                    "{} is {} bytes, metadata says {}",
                    PARAMS_FILE,
                    bytes.len(),
                    meta.param_bytes
                )));
            }
            if meta.sha256 != sha256_hex(&bytes) {
                return Err(corrupt(format!("{PARAMS_FILE} checksum mismatch")));
            }
        }

        tracing::info!("Loaded checkpoint at step {} from '{}'", info.step, info.path.display());
        Ok((info.step, ParameterSet::from_bytes(bytes)))
    }

    /// Remove unpublished temporary directories left by crashed runs.
    /// A replaced snapshot whose successor never got published is moved
    /// back into place instead.
    pub fn clean_stale_temp(&self) -> Result<usize, CheckpointError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| CheckpointError::io(&self.dir, e))?;
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };

            if name.starts_with(TEMP_PREFIX) {
                fs::remove_dir_all(&path).map_err(|e| CheckpointError::io(&path, e))?;
                removed += 1;
            } else if let Some(step) = parse_aside_name(name) {
                let target = self.snapshot_path(step);
                if target.exists() {
                    fs::remove_dir_all(&path).map_err(|e| CheckpointError::io(&path, e))?;
                    removed += 1;
                } else {
                    fs::rename(&path, &target).map_err(|e| CheckpointError::io(&target, e))?;
                    tracing::warn!("Restored snapshot at step {} from an interrupted re-save", step);
                }
            }
        }
        if removed > 0 {
            tracing::info!("Removed {} stale temporary checkpoint(s)", removed);
        }
        Ok(removed)
    }

    /// Delete every snapshot, published or not. Returns how many
    /// published snapshots were removed.
    pub fn clear(&self) -> Result<usize, CheckpointError> {
        let removed = self.list()?.len();
        let entries = fs::read_dir(&self.dir).map_err(|e| CheckpointError::io(&self.dir, e))?;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            let owned = parse_snapshot_name(name).is_some()
                || name.starts_with(TEMP_PREFIX)
                || name.starts_with(ASIDE_PREFIX);
            if owned && path.is_dir() {
                fs::remove_dir_all(&path).map_err(|e| CheckpointError::io(&path, e))?;
            }
        }
        tracing::info!("Cleared {} snapshot(s) from '{}'", removed, self.dir.display());
        Ok(removed)
    }

    // ─── Run configuration ────────────────────────────────────────────────────

    /// Save the run configuration next to the snapshots.
    pub fn save_config<T: Serialize>(&self, config: &T) -> Result<(), CheckpointError> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_vec_pretty(config)
            .map_err(|source| CheckpointError::Json { path: path.clone(), source })?;
        fs::write(&path, json).map_err(|e| CheckpointError::io(&path, e))?;
        tracing::debug!("Saved run config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config<T: DeserializeOwned>(&self) -> Result<T, CheckpointError> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read(&path).map_err(|e| CheckpointError::io(&path, e))?;
        serde_json::from_slice(&json).map_err(|source| CheckpointError::Json { path, source })
    }

    fn snapshot_path(&self, step: u64) -> PathBuf {
        self.dir.join(format!("{SNAPSHOT_PREFIX}{step:020}"))
    }
}

fn parse_snapshot_name(name: &str) -> Option<u64> {
    name.strip_prefix(SNAPSHOT_PREFIX)
        .or_else(|| name.strip_prefix(LEGACY_PREFIX))
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse().ok())
}

/// `.old-step-<step>-<pid>-<seq>` → step
fn parse_aside_name(name: &str) -> Option<u64> {
    name.strip_prefix(ASIDE_PREFIX)?.split('-').next()?.parse().ok()
}

fn read_meta(path: &Path) -> Result<CheckpointMeta, CheckpointError> {
    let bytes = fs::read(path).map_err(|e| CheckpointError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|source| CheckpointError::Json { path: path.to_path_buf(), source })
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), CheckpointError> {
    let mut file = File::create(path).map_err(|e| CheckpointError::io(path, e))?;
    file.write_all(bytes).map_err(|e| CheckpointError::io(path, e))?;
    file.sync_all().map_err(|e| CheckpointError::io(path, e))
}

/// Flush the directory entry of a rename. Not supported everywhere.
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
