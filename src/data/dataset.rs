// ============================================================
// Layer 4 — Sample Sources
// ============================================================
// Two SampleSource implementations:
//
//   InMemorySource    — samples already decoded, held in a Vec
//                       (tests, small validation splits)
//   ImageFolderSource — (file, label) list; each `get` reads and
//                       decodes one image on the calling worker
//
// Both are random access and cheap to share as Arc<dyn SampleSource>.

use anyhow::{anyhow, bail, Result};

use crate::data::loader::LabeledFile;
use crate::data::preprocessor::ImagePreprocessor;
use crate::domain::sample::{ImageShape, Sample};
use crate::domain::traits::SampleSource;

// ─── InMemorySource ───────────────────────────────────────────────────────────
pub struct InMemorySource {
    shape:   ImageShape,
    samples: Vec<Sample>,
}

impl InMemorySource {
    pub fn new(shape: ImageShape, samples: Vec<Sample>) -> Self {
        Self { shape, samples }
    }

    /// Decode every sample of another source up front.
    pub fn collect_from(source: &dyn SampleSource) -> Result<Self> {
        let samples = (0..source.len())
            .map(|i| source.get(i))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(source.shape(), samples))
    }
}

impl SampleSource for InMemorySource {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn shape(&self) -> ImageShape {
        self.shape
    }

    fn get(&self, index: usize) -> Result<Sample> {
        self.samples
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow!("Sample index {} out of range (len {})", index, self.samples.len()))
    }
}

// ─── ImageFolderSource ────────────────────────────────────────────────────────
pub struct ImageFolderSource {
    files:        Vec<LabeledFile>,
    preprocessor: ImagePreprocessor,
    num_classes:  usize,
}

impl ImageFolderSource {
    /// `num_classes` bounds the labels; a file labelled outside it is rejected.
    pub fn new(files: Vec<LabeledFile>, shape: ImageShape, num_classes: usize) -> Result<Self> {
        if let Some(bad) = files.iter().find(|f| f.label >= num_classes) {
            bail!(
                "'{}' has label {} but only {} classes exist",
                bad.path.display(),
                bad.label,
                num_classes
            );
        }
        Ok(Self {
            files,
            preprocessor: ImagePreprocessor::new(shape)?,
            num_classes,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

impl SampleSource for ImageFolderSource {
    fn len(&self) -> usize {
        self.files.len()
    }

    fn shape(&self) -> ImageShape {
        self.preprocessor.shape()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        let file = self
            .files
            .get(index)
            .ok_or_else(|| anyhow!("Sample index {} out of range (len {})", index, self.files.len()))?;
        let pixels = self.preprocessor.load(&file.path)?;
        Ok(Sample::new(pixels, file.label))
    }
}
