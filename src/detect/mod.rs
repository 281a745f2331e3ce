mod differ;
mod regions;
mod segment;

pub use differ::{Comparison, FrameDiffer, DEFAULT_CHANGE_THRESHOLD};
pub use regions::{external_regions, polygon_area, RegionCandidate};
pub use segment::{
    AreaBounds, CropRegion, PestSegmenter, Segmentation, Segmenter, DEFAULT_INTENSITY_CUTOFF,
};
