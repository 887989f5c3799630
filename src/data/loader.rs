// ============================================================
// Layer 4 — Class Folder Loader
// ============================================================
// Lists a dataset laid out as one sub-directory per class:
//
//   data/
//     ├── boxing/        → label 0
//     │     ├── 0001.jpg
//     │     └── 0002.jpg
//     ├── handclapping/  → label 1
//     └── walking/       → label 2
//
// Labels are assigned from the sorted directory names so the
// same folder always yields the same label mapping. Only the
// file list is built here; decoding happens later, on demand,
// inside the pipeline workers.
//
// Reference: Rust Book §8 (Collections)
//            Rust Book §9 (Error Handling)

use anyhow::{bail, Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Extensions the image decoder is asked to handle
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tif", "tiff", "webp"];

/// One image file and the class it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledFile {
    pub path:  PathBuf,
    pub label: usize,
}

/// Everything found under a class-folder root.
#[derive(Debug, Clone)]
pub struct ClassFolder {
    /// Class names, index == label
    pub classes: Vec<String>,
    pub files:   Vec<LabeledFile>,
}

impl ClassFolder {
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }
}

pub struct ClassFolderLoader {
    root: PathBuf,
}

impl ClassFolderLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Scan the root. Fails if it is missing or has no class directories;
    /// unreadable or non-image files are skipped with a warning.
    pub fn scan(&self) -> Result<ClassFolder> {
        if !self.root.is_dir() {
            bail!("Dataset directory '{}' does not exist", self.root.display());
        }

        let mut classes: Vec<String> = fs::read_dir(&self.root)
            .with_context(|| format!("Cannot read directory '{}'", self.root.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| !name.starts_with('.'))
            .collect();
        classes.sort();

        if classes.is_empty() {
            bail!("No class sub-directories found in '{}'", self.root.display());
        }

        let mut files = Vec::new();
        for (label, class) in classes.iter().enumerate() {
            let class_dir = self.root.join(class);
            let mut found = list_images(&class_dir)?;
            found.sort();
            tracing::debug!("Class {} '{}': {} images", label, class, found.len());
            files.extend(found.into_iter().map(|path| LabeledFile { path, label }));
        }

        tracing::info!(
            "Found {} images in {} classes under '{}'",
            files.len(),
            classes.len(),
            self.root.display()
        );
        Ok(ClassFolder { classes, files })
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
    {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry in '{}': {}", dir.display(), e);
                continue;
            }
        };
        if path.is_file() && is_image(&path) {
            images.push(path);
        }
    }
    Ok(images)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_labels_follow_sorted_class_names() {
        let dir = tempfile::tempdir().unwrap();
        for class in ["walking", "boxing"] {
            fs::create_dir(dir.path().join(class)).unwrap();
        }
        touch(&dir.path().join("boxing/a.jpg"));
        touch(&dir.path().join("walking/b.PNG"));
        touch(&dir.path().join("walking/notes.txt"));

        let folder = ClassFolderLoader::new(dir.path()).scan().unwrap();
        assert_eq!(folder.classes, vec!["boxing", "walking"]);
        assert_eq!(folder.files.len(), 2);
        assert_eq!(folder.files[0].label, 0);
        assert_eq!(folder.files[1].label, 1);
    }

    #[test]
    fn test_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ClassFolderLoader::new(dir.path().join("nope")).scan().is_err());
    }

    #[test]
    fn test_root_without_classes_fails() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("loose.jpg"));
        assert!(ClassFolderLoader::new(dir.path()).scan().is_err());
    }
}
