//! Replay camera backed by image files already on disk.
//!
//! Used on the bench to re-run the counting loop over a day of field captures,
//! and by tests as a deterministic capture device.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use super::CaptureDevice;
use crate::error::FailureKind;
use crate::frame::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub struct DirectoryCamera {
    pending: VecDeque<PathBuf>,
    replayed: u64,
}

impl DirectoryCamera {
    /// Replay every image in `dir`, in file name order.
    pub fn open(dir: &Path) -> Result<Self> {
        let mut paths = Vec::new();
        let entries = std::fs::read_dir(dir)
            .map_err(|e| anyhow!("failed to list {}: {}", dir.display(), e))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && has_image_extension(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        log::info!("DirectoryCamera: {} images queued from {}", paths.len(), dir.display());
        Ok(Self::from_paths(paths))
    }

    /// Replay exactly these files, in this order.
    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            pending: paths.into(),
            replayed: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    pub fn replayed(&self) -> u64 {
        self.replayed
    }
}

impl CaptureDevice for DirectoryCamera {
    fn capture(&mut self) -> Result<Frame> {
        let path = self
            .pending
            .pop_front()
            .ok_or_else(|| anyhow!("no images left to replay"))
            .context(FailureKind::Capture)?;
        if !path.is_file() {
            return Err(anyhow!("image file {} does not exist", path.display()))
                .context(FailureKind::Capture);
        }
        self.replayed += 1;
        Frame::open(&path, Utc::now())
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
