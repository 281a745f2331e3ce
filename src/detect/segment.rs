use serde::{Deserialize, Serialize};

use super::regions::{external_regions, RegionCandidate};
use crate::frame::{BinaryMask, Frame};

/// Intensity at or below which a pixel counts as pest (dark on a light trap card).
pub const DEFAULT_INTENSITY_CUTOFF: u8 = 60;

/// Rectangle of interest, as absolute pixel offsets trimmed from each edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl CropRegion {
    /// Calibrated trap-card window for the field camera mount.
    pub const FIELD_MOUNT: CropRegion = CropRegion {
        top: 150,
        bottom: 400,
        left: 100,
        right: 100,
    };

    /// `(x, y, width, height)` of the crop inside a `width x height` image.
    /// Width or height is zero when the offsets swallow the image.
    pub fn window(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let x0 = self.left.min(width);
        let x1 = width.saturating_sub(self.right).max(x0);
        let y0 = self.top.min(height);
        let y1 = height.saturating_sub(self.bottom).max(y0);
        (x0, y0, x1 - x0, y1 - y0)
    }
}

/// Exclusive area band for a region to count as one pest.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AreaBounds {
    pub min: f64,
    pub max: f64,
}

impl AreaBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, area: f64) -> bool {
        self.min < area && area < self.max
    }
}

/// Output of one segmentation pass.
#[derive(Clone, Debug)]
pub struct Segmentation {
    /// Regions whose area falls inside the bounds.
    pub count: u32,
    /// Every external region found, in or out of bounds.
    pub regions: Vec<RegionCandidate>,
    /// The binary image the regions were extracted from.
    pub binary: BinaryMask,
}

/// Counting entry points. The pipeline only sees this trait.
pub trait Segmenter {
    /// Crop, threshold and count a whole frame.
    fn segment_full(&self, frame: &Frame) -> Segmentation;

    /// Count regions in an already-binary difference mask.
    fn segment_diff(&self, mask: &BinaryMask) -> Segmentation;
}

/// Threshold + contour-area pest counter.
#[derive(Clone, Copy, Debug)]
pub struct PestSegmenter {
    pub crop: CropRegion,
    pub intensity_cutoff: u8,
    pub area: AreaBounds,
}

impl PestSegmenter {
    pub fn new(crop: CropRegion, intensity_cutoff: u8, area: AreaBounds) -> Self {
        Self {
            crop,
            intensity_cutoff,
            area,
        }
    }

    /// Inverse threshold of the cropped frame: dark pixels become foreground.
    pub fn binarize(&self, frame: &Frame) -> BinaryMask {
        let gray = frame.intensity();
        let (x0, y0, w, h) = self.crop.window(gray.width(), gray.height());
        BinaryMask::from_fn(w, h, |x, y| {
            gray.get_pixel(x0 + x, y0 + y).0[0] <= self.intensity_cutoff
        })
    }

    fn count(&self, binary: BinaryMask) -> Segmentation {
        let regions = external_regions(&binary);
        let count = regions.iter().filter(|r| self.area.contains(r.area)).count() as u32;
        Segmentation {
            count,
            regions,
            binary,
        }
    }
}

impl Segmenter for PestSegmenter {
    fn segment_full(&self, frame: &Frame) -> Segmentation {
        let binary = self.binarize(frame);
        if binary.is_empty() {
            log::warn!(
                "crop {:?} leaves no pixels of {}x{} frame {}",
                self.crop,
                frame.width(),
                frame.height(),
                frame.path().display()
            );
        }
        self.count(binary)
    }

    fn segment_diff(&self, mask: &BinaryMask) -> Segmentation {
        self.count(mask.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use image::{DynamicImage, GrayImage, Luma};

    const LIGHT: u8 = 200;
    const DARK: u8 = 20;

    fn card(w: u32, h: u32, blobs: &[(u32, u32, u32, u32)]) -> Frame {
        let img = GrayImage::from_fn(w, h, |x, y| {
            let dark = blobs
                .iter()
                .any(|&(bx, by, bw, bh)| x >= bx && x < bx + bw && y >= by && y < by + bh);
            Luma([if dark { DARK } else { LIGHT }])
        });
        Frame::new(DynamicImage::ImageLuma8(img), "card.jpg", Utc::now())
    }

    fn segmenter(min: f64, max: f64) -> PestSegmenter {
        PestSegmenter::new(CropRegion::default(), DEFAULT_INTENSITY_CUTOFF, AreaBounds::new(min, max))
    }

    #[test]
    fn featureless_images_count_zero() {
        let seg = segmenter(0.0, 1e9);
        assert_eq!(seg.segment_full(&card(64, 48, &[])).count, 0);
        assert_eq!(seg.segment_diff(&BinaryMask::empty(64, 48)).count, 0);
    }

    #[test]
    fn area_bounds_are_exclusive() {
        // 11x11 blob measures 100, 11x12 measures 110
        let frame = card(80, 40, &[(5, 5, 11, 11), (30, 5, 11, 12)]);
        assert_eq!(segmenter(100.0, 1000.0).segment_full(&frame).count, 1);
        assert_eq!(segmenter(99.0, 1000.0).segment_full(&frame).count, 2);
        assert_eq!(segmenter(50.0, 110.0).segment_full(&frame).count, 1);
        assert_eq!(segmenter(50.0, 111.0).segment_full(&frame).count, 2);

        let bounds = AreaBounds::new(100.0, 200.0);
        assert!(!bounds.contains(100.0));
        assert!(bounds.contains(101.0));
        assert!(!bounds.contains(200.0));
    }

    #[test]
    fn full_frame_counts_dark_blobs_inside_crop() {
        let frame = card(100, 60, &[(2, 2, 10, 10), (40, 20, 10, 10), (70, 30, 10, 10)]);
        let crop = CropRegion {
            top: 15,
            bottom: 0,
            left: 30,
            right: 0,
        };
        let seg = PestSegmenter::new(crop, DEFAULT_INTENSITY_CUTOFF, AreaBounds::new(50.0, 500.0));
        let result = seg.segment_full(&frame);
        assert_eq!(result.count, 2);
        assert_eq!((result.binary.width(), result.binary.height()), (70, 45));
    }

    #[test]
    fn cutoff_is_inclusive() {
        let img = GrayImage::from_fn(20, 20, |x, y| {
            Luma([if (5..10).contains(&x) && (5..10).contains(&y) { 60 } else { 61 }])
        });
        let frame = Frame::new(DynamicImage::ImageLuma8(img), "edge.jpg", Utc::now());
        let result = segmenter(1.0, 100.0).segment_full(&frame);
        assert_eq!(result.binary.count_set(), 25);
        assert_eq!(result.count, 1);
    }

    #[test]
    fn diff_mask_is_counted_without_cropping() {
        let mask = BinaryMask::from_fn(40, 40, |x, y| x >= 30 && y >= 30);
        let seg = PestSegmenter::new(
            CropRegion {
                top: 20,
                bottom: 20,
                left: 20,
                right: 20,
            },
            DEFAULT_INTENSITY_CUTOFF,
            AreaBounds::new(10.0, 1000.0),
        );
        let result = seg.segment_diff(&mask);
        assert_eq!(result.count, 1);
        assert_eq!(result.regions[0].area, 81.0);
    }

    #[test]
    fn oversized_crop_yields_zero() {
        let frame = card(50, 50, &[(10, 10, 10, 10)]);
        let seg = PestSegmenter::new(CropRegion::FIELD_MOUNT, DEFAULT_INTENSITY_CUTOFF, AreaBounds::new(0.0, 1e9));
        let result = seg.segment_full(&frame);
        assert_eq!(result.count, 0);
        assert!(result.binary.is_empty());
    }

    #[test]
    fn crop_window_clamps() {
        assert_eq!(CropRegion::FIELD_MOUNT.window(4056, 3040), (100, 150, 3856, 2490));
        assert_eq!(CropRegion::FIELD_MOUNT.window(150, 100), (100, 100, 0, 0));
    }
}
