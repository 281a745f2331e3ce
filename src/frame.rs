//! Captured frames and binary masks.
//!
//! - `Frame`: one decoded capture plus the file it was written to.
//! - `BinaryMask`: 0/255 single-channel image (thresholded frame or difference mask).
//! - `intensity`: single-channel conversion shared by the differencer and segmenter.
//!
//! A `Frame` is owned by the pipeline invocation that captured it. The most recent
//! one is moved into session state and moved back out on the next cycle.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use image::{DynamicImage, GrayImage, Luma};
use std::path::{Path, PathBuf};

use crate::error::FailureKind;

/// Mask value for foreground / changed pixels.
pub const MASK_ON: u8 = 255;

/// One captured image.
#[derive(Clone, Debug)]
pub struct Frame {
    image: DynamicImage,
    path: PathBuf,
    captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: DynamicImage, path: impl Into<PathBuf>, captured_at: DateTime<Utc>) -> Self {
        Self {
            image,
            path: path.into(),
            captured_at,
        }
    }

    /// Decode an image file written by a capture device.
    ///
    /// Failures are tagged `FrameDecode`: the shutter fired but the result is unusable.
    pub fn open(path: &Path, captured_at: DateTime<Utc>) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| anyhow!("failed to read image {}: {}", path.display(), e))
            .context(FailureKind::FrameDecode)?;
        let image = image::load_from_memory(&bytes)
            .map_err(|e| anyhow!("failed to decode image {}: {}", path.display(), e))
            .context(FailureKind::FrameDecode)?;
        if image.width() == 0 || image.height() == 0 {
            return Err(anyhow!("image {} has no pixels", path.display()))
                .context(FailureKind::FrameDecode);
        }
        Ok(Self::new(image, path, captured_at))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// File the frame was captured to. This is what gets uploaded.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without extension, used to name derived artifacts.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.captured_at.format("%Y%m%d-%H%M%S").to_string())
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Single-channel intensity of the whole frame.
    pub fn intensity(&self) -> GrayImage {
        intensity(&self.image)
    }
}

/// Convert to 8-bit intensity with BT.601 weights (0.299 R + 0.587 G + 0.114 B).
///
/// This is the weighting camera pipelines use for gray conversion; `image`'s own
/// `to_luma8` uses BT.709 and would shift every threshold.
pub fn intensity(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        other => {
            let rgb = other.to_rgb8();
            let (w, h) = rgb.dimensions();
            let mut out = GrayImage::new(w, h);
            for (x, y, px) in rgb.enumerate_pixels() {
                let [r, g, b] = px.0;
                let v = (299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000;
                out.put_pixel(x, y, Luma([v.min(255) as u8]));
            }
            out
        }
    }
}

/// Binary single-channel image. Pixels are either 0 or `MASK_ON`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryMask {
    image: GrayImage,
}

impl BinaryMask {
    /// All-zero mask.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::new(width, height),
        }
    }

    /// Build a mask by marking pixels where `on` returns true.
    pub fn from_fn(width: u32, height: u32, mut on: impl FnMut(u32, u32) -> bool) -> Self {
        let image = GrayImage::from_fn(width, height, |x, y| {
            if on(x, y) {
                Luma([MASK_ON])
            } else {
                Luma([0])
            }
        });
        Self { image }
    }

    /// Wrap an existing gray image; any nonzero pixel counts as set.
    pub fn from_gray(gray: &GrayImage) -> Self {
        let (w, h) = gray.dimensions();
        Self::from_fn(w, h, |x, y| gray.get_pixel(x, y).0[0] != 0)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_set(&self, x: u32, y: u32) -> bool {
        self.image.get_pixel(x, y).0[0] != 0
    }

    pub fn set(&mut self, x: u32, y: u32) {
        self.image.put_pixel(x, y, Luma([MASK_ON]));
    }

    pub fn count_set(&self) -> usize {
        self.image.as_raw().iter().filter(|&&p| p != 0).count()
    }

    pub fn pixel_count(&self) -> usize {
        self.image.as_raw().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixel_count() == 0
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.image
    }
}
