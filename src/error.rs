//! Per-cycle failure classification.
//!
//! Collaborators return `anyhow::Result`. At the point of failure they attach a
//! `FailureKind` as context, and the pipeline and monitor recover it with
//! [`failure_kind`] to pick the recovery path. None of these kinds stop the loop.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// A sensor channel could not be read. Proximity check skipped this cycle.
    SensorRead,
    /// The shutter command failed, timed out, or produced no file.
    Capture,
    /// The captured file exists but is not a readable image.
    FrameDecode,
    /// Differencing was asked to compare frames of different sizes.
    DimensionMismatch,
    /// Image upload to the blob store failed.
    Upload,
    /// Metadata record could not be written.
    Metadata,
    /// The external trigger flag could not be polled or cleared.
    TriggerSignal,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::SensorRead => "sensor_read",
            FailureKind::Capture => "capture",
            FailureKind::FrameDecode => "frame_decode",
            FailureKind::DimensionMismatch => "dimension_mismatch",
            FailureKind::Upload => "upload",
            FailureKind::Metadata => "metadata",
            FailureKind::TriggerSignal => "trigger_signal",
        }
    }

    /// True when the failure means no frame was obtained this cycle.
    pub fn aborts_capture(self) -> bool {
        matches!(self, FailureKind::Capture | FailureKind::FrameDecode)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure", self.as_str())
    }
}

impl std::error::Error for FailureKind {}

/// Recover the failure kind attached anywhere in an error's context chain.
pub fn failure_kind(err: &anyhow::Error) -> Option<FailureKind> {
    err.downcast_ref::<FailureKind>().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn kind_survives_outer_context() {
        let err = Err::<(), _>(anyhow!("libcamera-still exited with 255"))
            .context(FailureKind::Capture)
            .context("capture cycle")
            .unwrap_err();
        assert_eq!(failure_kind(&err), Some(FailureKind::Capture));
    }

    #[test]
    fn untagged_error_has_no_kind() {
        let err = anyhow!("plain");
        assert_eq!(failure_kind(&err), None);
    }

    #[test]
    fn capture_and_decode_abort() {
        assert!(FailureKind::Capture.aborts_capture());
        assert!(FailureKind::FrameDecode.aborts_capture());
        assert!(!FailureKind::Upload.aborts_capture());
    }
}
