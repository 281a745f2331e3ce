//! Debug artifacts: the binarized image each count was made from.
//!
//! Field calibration is done by looking at these, so the segmenter hands its
//! mask over explicitly instead of writing files itself.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

use crate::frame::BinaryMask;

pub trait DebugArtifactSink {
    /// Store `mask` under a name derived from `label` and the frame `stem`.
    fn persist(&mut self, label: &str, stem: &str, mask: &BinaryMask) -> Result<PathBuf>;
}

/// Writes `<dir>/<label>_<stem>.jpg`.
pub struct DirectoryArtifactSink {
    dir: PathBuf,
}

impl DirectoryArtifactSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| anyhow!("failed to create debug directory {}: {}", dir.display(), e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DebugArtifactSink for DirectoryArtifactSink {
    fn persist(&mut self, label: &str, stem: &str, mask: &BinaryMask) -> Result<PathBuf> {
        if mask.is_empty() {
            return Err(anyhow!("refusing to write empty {} mask for {}", label, stem));
        }
        let path = self.dir.join(format!("{}_{}.jpg", label, stem));
        mask.as_image()
            .save(&path)
            .map_err(|e| anyhow!("failed to write {}: {}", path.display(), e))?;
        log::debug!("debug artifact written to {}", path.display());
        Ok(path)
    }
}

/// Drops every artifact.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardArtifacts;

impl DebugArtifactSink for DiscardArtifacts {
    fn persist(&mut self, label: &str, stem: &str, _mask: &BinaryMask) -> Result<PathBuf> {
        Ok(PathBuf::from(format!("{}_{}", label, stem)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_labelled_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectoryArtifactSink::new(dir.path().join("debug")).unwrap();
        let mask = BinaryMask::from_fn(16, 8, |x, _| x < 8);

        let path = sink.persist("processed", "20240512-101500", &mask).unwrap();
        assert_eq!(path, dir.path().join("debug").join("processed_20240512-101500.jpg"));
        let written = image::open(&path).unwrap();
        assert_eq!((written.width(), written.height()), (16, 8));
    }

    #[test]
    fn empty_mask_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectoryArtifactSink::new(dir.path()).unwrap();
        assert!(sink.persist("diff", "x", &BinaryMask::empty(0, 0)).is_err());
    }
}
