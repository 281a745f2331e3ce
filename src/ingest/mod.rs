//! Capture devices.
//!
//! This module provides the sources a capture cycle can take a frame from:
//! - `CommandCamera`: runs the still-capture command on the field unit
//! - `DirectoryCamera`: replays image files already on disk (bench runs, tests)
//!
//! Every source returns a decoded `Frame` that remembers the file it came from,
//! since that file is what gets uploaded. Failures carry a `FailureKind`:
//! `Capture` when no file was produced, `FrameDecode` when the file is unreadable.

pub mod command;
pub mod directory;
pub mod indicator;

pub use command::{CommandCamera, CommandCameraConfig};
pub use directory::DirectoryCamera;
pub use indicator::{Indicator, NoIndicator, SysfsGpioIndicator};

use anyhow::Result;

use crate::frame::Frame;

/// Anything that can take one picture on demand.
pub trait CaptureDevice {
    fn capture(&mut self) -> Result<Frame>;
}

impl<T: CaptureDevice + ?Sized> CaptureDevice for Box<T> {
    fn capture(&mut self) -> Result<Frame> {
        (**self).capture()
    }
}
