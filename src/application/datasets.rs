// ============================================================
// Layer 2 — Dataset Assembly
// ============================================================
// Builds the train / validation / held-out sources a run needs
// from its RunConfig:
//
//   cifar10       train      = data_batch_1..5.bin
//                 validation = test_batch.bin
//                 held-out   = test_batch.bin
//
//   image-folder  scan classes → seeded split by train_ratio
//                 train      = first part of the shuffled files
//                 validation = the rest
//                 held-out   = the same validation part, which the
//                              saved seed and ratio reproduce

use anyhow::{bail, Context, Result};
use std::{path::Path, sync::Arc};

use crate::application::config::{DatasetKind, RunConfig};
use crate::data::{
    cifar::{Cifar10Source, CifarSplit, CIFAR10_CLASSES},
    dataset::ImageFolderSource,
    loader::ClassFolderLoader,
    splitter::split_train_val,
};
use crate::domain::traits::SampleSource;

pub struct TrainingData {
    pub train:       Arc<dyn SampleSource>,
    pub validation:  Arc<dyn SampleSource>,
    pub num_classes: usize,
}

pub fn training_data(cfg: &RunConfig) -> Result<TrainingData> {
    let dir = Path::new(&cfg.data_dir);
    let data = match cfg.dataset {
        DatasetKind::Cifar10 => TrainingData {
            train:       Arc::new(Cifar10Source::open_split(dir, CifarSplit::Train)?),
            validation:  Arc::new(Cifar10Source::open_split(dir, CifarSplit::Test)?),
            num_classes: CIFAR10_CLASSES,
        },
        DatasetKind::ImageFolder => {
            let (train, validation, num_classes) = folder_split(cfg)?;
            TrainingData { train, validation, num_classes }
        }
    };

    if let Some(expected) = cfg.num_classes {
        if expected != data.num_classes {
            bail!(
                "Configured for {} classes but '{}' has {}",
                expected,
                cfg.data_dir,
                data.num_classes
            );
        }
    }

    tracing::info!(
        "Data: {} train / {} validation samples, {} classes",
        data.train.len(),
        data.validation.len(),
        data.num_classes
    );
    Ok(data)
}

/// The held-out source used by `evaluate`.
pub fn evaluation_data(cfg: &RunConfig) -> Result<(Arc<dyn SampleSource>, usize)> {
    match cfg.dataset {
        DatasetKind::Cifar10 => {
            let test = Cifar10Source::open_split(Path::new(&cfg.data_dir), CifarSplit::Test)?;
            Ok((Arc::new(test), CIFAR10_CLASSES))
        }
        DatasetKind::ImageFolder => {
            let (_, validation, num_classes) = folder_split(cfg)?;
            Ok((validation, num_classes))
        }
    }
}

fn folder_split(cfg: &RunConfig) -> Result<(Arc<dyn SampleSource>, Arc<dyn SampleSource>, usize)> {
    let folder = ClassFolderLoader::new(&cfg.data_dir)
        .scan()
        .with_context(|| format!("Cannot scan dataset '{}'", cfg.data_dir))?;
    let num_classes = folder.num_classes();
    if num_classes < 2 {
        bail!("'{}' needs at least 2 class directories, found {}", cfg.data_dir, num_classes);
    }

    let (train, validation) = split_train_val(folder.files, cfg.train_ratio, cfg.seed);
    if train.is_empty() || validation.is_empty() {
        bail!(
            "Split of '{}' left an empty side ({} train, {} validation)",
            cfg.data_dir,
            train.len(),
            validation.len()
        );
    }

    let shape = cfg.image_shape();
    Ok((
        Arc::new(ImageFolderSource::new(train, shape, num_classes)?),
        Arc::new(ImageFolderSource::new(validation, shape, num_classes)?),
        num_classes,
    ))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::fs;

    fn image_folder(per_class: usize) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (c, class) in ["cats", "dogs"].iter().enumerate() {
            let class_dir = dir.path().join(class);
            fs::create_dir_all(&class_dir).unwrap();
            for i in 0..per_class {
                RgbImage::from_pixel(6, 6, Rgb([c as u8 * 200, i as u8, 0]))
                    .save(class_dir.join(format!("{i}.png")))
                    .unwrap();
            }
        }
        dir
    }

    fn config(dir: &Path) -> RunConfig {
        RunConfig {
            data_dir:   dir.display().to_string(),
            image_size: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_folder_split_sizes_and_classes() {
        let dir  = image_folder(5);
        let data = training_data(&config(dir.path())).unwrap();
        assert_eq!(data.num_classes, 2);
        assert_eq!(data.train.len() + data.validation.len(), 10);
        assert_eq!(data.train.len(), 8);
        assert_eq!(data.train.shape().volume(), 3 * 4 * 4);
    }

    #[test]
    fn test_evaluation_reuses_validation_split() {
        let dir = image_folder(5);
        let cfg = config(dir.path());
        let data = training_data(&cfg).unwrap();
        let (held_out, classes) = evaluation_data(&cfg).unwrap();
        assert_eq!(classes, 2);
        assert_eq!(held_out.len(), data.validation.len());
        for i in 0..held_out.len() {
            assert_eq!(held_out.get(i).unwrap(), data.validation.get(i).unwrap());
        }
    }

    #[test]
    fn test_class_count_mismatch_rejected() {
        let dir = image_folder(3);
        let cfg = RunConfig { num_classes: Some(5), ..config(dir.path()) };
        assert!(training_data(&cfg).is_err());
    }

    #[test]
    fn test_missing_cifar_files_fail() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = RunConfig { dataset: DatasetKind::Cifar10, ..config(dir.path()) };
        assert!(training_data(&cfg).is_err());
    }
}
