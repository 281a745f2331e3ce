use anyhow::{anyhow, Context, Result};
use image::GrayImage;

use crate::error::FailureKind;
use crate::frame::{BinaryMask, Frame};

/// Intensity change (0..=255) above which a pixel counts as changed.
pub const DEFAULT_CHANGE_THRESHOLD: u8 = 60;

/// Result of comparing two frames.
#[derive(Clone, Debug)]
pub struct Comparison {
    /// `1 - changed / total`, in `[0, 1]`.
    pub similarity: f64,
    /// Changed pixels.
    pub mask: BinaryMask,
}

/// Compares consecutive captures of the same scene.
#[derive(Clone, Copy, Debug)]
pub struct FrameDiffer {
    change_threshold: u8,
}

impl Default for FrameDiffer {
    fn default() -> Self {
        Self::new(DEFAULT_CHANGE_THRESHOLD)
    }
}

impl FrameDiffer {
    pub fn new(change_threshold: u8) -> Self {
        Self { change_threshold }
    }

    /// Compare two frames of identical dimensions.
    ///
    /// A size mismatch is tagged `DimensionMismatch`; callers fall back to
    /// full-frame counting.
    pub fn compare(&self, previous: &Frame, current: &Frame) -> Result<Comparison> {
        if previous.dimensions() != current.dimensions() {
            return Err(anyhow!(
                "cannot compare {}x{} frame against {}x{} frame",
                previous.width(),
                previous.height(),
                current.width(),
                current.height()
            ))
            .context(FailureKind::DimensionMismatch);
        }
        Ok(self.compare_intensity(&previous.intensity(), &current.intensity()))
    }

    fn compare_intensity(&self, previous: &GrayImage, current: &GrayImage) -> Comparison {
        let (w, h) = current.dimensions();
        let mask = BinaryMask::from_fn(w, h, |x, y| {
            let a = previous.get_pixel(x, y).0[0];
            let b = current.get_pixel(x, y).0[0];
            a.abs_diff(b) > self.change_threshold
        });
        let total = mask.pixel_count();
        let similarity = if total == 0 {
            1.0
        } else {
            1.0 - mask.count_set() as f64 / total as f64
        };
        Comparison { similarity, mask }
    }
}
