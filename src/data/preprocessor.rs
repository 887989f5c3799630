// ============================================================
// Layer 4 — Image Preprocessor
// ============================================================
// Turns an encoded image into the flat f32 layout every model
// expects:
//
//   1. decode (jpg/png/... via the `image` crate)
//   2. resize to the run's fixed width × height
//   3. convert to grayscale (1 channel) or RGB (3 channels)
//   4. scale 0..=255 → 0.0..=1.0
//   5. lay out channel-major (CHW)
//
// Images of any size can live in the dataset folder; only the
// configured shape reaches the model.
//
// Reference: image crate documentation (DynamicImage, imageops)

use anyhow::{bail, Context, Result};
use image::{imageops::FilterType, DynamicImage};
use std::path::Path;

use crate::domain::sample::ImageShape;

#[derive(Debug, Clone, Copy)]
pub struct ImagePreprocessor {
    shape: ImageShape,
}

impl ImagePreprocessor {
    /// Fails for channel counts other than 1 or 3.
    pub fn new(shape: ImageShape) -> Result<Self> {
        if shape.channels != 1 && shape.channels != 3 {
            bail!("Unsupported channel count {} (expected 1 or 3)", shape.channels);
        }
        if shape.height == 0 || shape.width == 0 {
            bail!("Image height and width must be > 0");
        }
        Ok(Self { shape })
    }

    pub fn shape(&self) -> ImageShape {
        self.shape
    }

    /// Read and decode one image file.
    pub fn load(&self, path: &Path) -> Result<Vec<f32>> {
        let image = image::open(path)
            .with_context(|| format!("Cannot decode image '{}'", path.display()))?;
        Ok(self.process(&image))
    }

    /// Resize and convert an already decoded image.
    pub fn process(&self, image: &DynamicImage) -> Vec<f32> {
        let (w, h) = (self.shape.width as u32, self.shape.height as u32);
        let resized = if image.width() == w && image.height() == h {
            image.clone()
        } else {
            image.resize_exact(w, h, FilterType::Triangle)
        };

        let plane = self.shape.height * self.shape.width;
        let mut pixels = vec![0.0f32; self.shape.volume()];

        if self.shape.channels == 1 {
            let gray = resized.to_luma8();
            for (i, p) in gray.pixels().enumerate() {
                pixels[i] = p[0] as f32 / 255.0;
            }
        } else {
            // HWC (interleaved) → CHW (planar)
            let rgb = resized.to_rgb8();
            for (i, p) in rgb.pixels().enumerate() {
                for c in 0..3 {
                    pixels[c * plane + i] = p[c] as f32 / 255.0;
                }
            }
        }
        pixels
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_rejects_unsupported_channels() {
        assert!(ImagePreprocessor::new(ImageShape::new(2, 8, 8)).is_err());
        assert!(ImagePreprocessor::new(ImageShape::new(3, 0, 8)).is_err());
    }

    #[test]
    fn test_rgb_is_channel_major_and_scaled() {
        let pre = ImagePreprocessor::new(ImageShape::rgb(2, 2)).unwrap();
        let img = RgbImage::from_pixel(2, 2, Rgb([255, 0, 51]));
        let px  = pre.process(&DynamicImage::ImageRgb8(img));
        assert_eq!(px.len(), 12);
        assert!(px[0..4].iter().all(|&v| v == 1.0));
        assert!(px[4..8].iter().all(|&v| v == 0.0));
        assert!(px[8..12].iter().all(|&v| (v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn test_resizes_to_configured_shape() {
        let pre = ImagePreprocessor::new(ImageShape::new(1, 4, 6)).unwrap();
        let img = RgbImage::from_pixel(17, 9, Rgb([10, 10, 10]));
        assert_eq!(pre.process(&DynamicImage::ImageRgb8(img)).len(), 24);
    }

    #[test]
    fn test_load_round_trips_png() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.png");
        RgbImage::from_pixel(3, 3, Rgb([255, 0, 0])).save(&path).unwrap();

        let pre = ImagePreprocessor::new(ImageShape::rgb(3, 3)).unwrap();
        let px  = pre.load(&path).unwrap();
        assert_eq!(px[0], 1.0);
        assert_eq!(px[9], 0.0);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        let pre = ImagePreprocessor::new(ImageShape::rgb(3, 3)).unwrap();
        assert!(pre.load(&path).is_err());
    }
}
