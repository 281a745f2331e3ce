//! Capture-and-count pipeline.
//!
//! One invocation per fired trigger:
//! 1. capture a frame; on failure keep the previous frame and stop
//! 2. with a previous frame, compare; a near-identical scene (similarity above
//!    the gate) is counted on the difference mask, so only newly arrived pests
//!    are reported; otherwise the whole frame is counted
//! 3. describe the count, hand it to the upload sink, keep the new frame
//!
//! The pipeline MUST NOT:
//! - roll session state back once a frame was captured
//! - retry a failed capture or upload within the invocation
//! - let an upload or debug artifact failure affect the count

use chrono::{DateTime, Local, Utc};
use std::path::PathBuf;

use crate::artifacts::{DebugArtifactSink, DiscardArtifacts};
use crate::detect::{FrameDiffer, Segmentation, Segmenter};
use crate::error::{failure_kind, FailureKind};
use crate::frame::Frame;
use crate::ingest::CaptureDevice;
use crate::transport::{UploadReceipt, UploadRequest, UploadSink, PEST_CATEGORY};

/// Similarity above which a new frame is treated as the same scene.
pub const DEFAULT_SIMILARITY_GATE: f64 = 0.97;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountMode {
    /// Counted on the thresholded new frame.
    FullFrame,
    /// Counted on the difference against the previous frame.
    Differential,
}

impl CountMode {
    /// Prefix for debug artifacts of this mode.
    pub fn label(self) -> &'static str {
        match self {
            CountMode::FullFrame => "processed",
            CountMode::Differential => "diff",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetectionResult {
    pub count: u32,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub mode: CountMode,
    pub image_path: PathBuf,
    /// Similarity to the previous frame, when one was compared.
    pub similarity: Option<f64>,
}

/// Human-readable summary stored next to the image.
pub fn describe(mode: CountMode, count: u32, at: DateTime<Local>) -> String {
    let time = at.format("%H:%M:%S");
    match mode {
        CountMode::FullFrame => format!(
            "Time: {}\nPest category: {}\nNumber: {}",
            time, PEST_CATEGORY, count
        ),
        CountMode::Differential => format!(
            "Time: {}\nPest category: {}\nNew weevils found: {}",
            time, PEST_CATEGORY, count
        ),
    }
}

/// What one invocation produced.
#[derive(Debug)]
pub struct CycleOutcome {
    /// Frame to keep for the next invocation.
    pub session: Option<Frame>,
    pub detection: Option<DetectionResult>,
    pub upload: Option<UploadReceipt>,
    /// First failure hit, if any. Only capture failures leave `detection` empty.
    pub failure: Option<FailureKind>,
}

pub struct CapturePipeline {
    camera: Box<dyn CaptureDevice>,
    differ: FrameDiffer,
    segmenter: Box<dyn Segmenter>,
    uploader: Box<dyn UploadSink>,
    artifacts: Box<dyn DebugArtifactSink>,
    similarity_gate: f64,
}

impl CapturePipeline {
    pub fn new(
        camera: Box<dyn CaptureDevice>,
        segmenter: Box<dyn Segmenter>,
        uploader: Box<dyn UploadSink>,
    ) -> Self {
        Self {
            camera,
            differ: FrameDiffer::default(),
            segmenter,
            uploader,
            artifacts: Box::new(DiscardArtifacts),
            similarity_gate: DEFAULT_SIMILARITY_GATE,
        }
    }

    pub fn with_differ(mut self, differ: FrameDiffer) -> Self {
        self.differ = differ;
        self
    }

    pub fn with_artifacts(mut self, artifacts: Box<dyn DebugArtifactSink>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_similarity_gate(mut self, gate: f64) -> Self {
        self.similarity_gate = gate;
        self
    }

    pub fn similarity_gate(&self) -> f64 {
        self.similarity_gate
    }

    /// Run one capture-and-count invocation, consuming the previous frame.
    pub fn process(&mut self, previous: Option<Frame>) -> CycleOutcome {
        let frame = match self.camera.capture() {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("{:#}; keeping previous frame", e);
                return CycleOutcome {
                    session: previous,
                    detection: None,
                    upload: None,
                    failure: Some(failure_kind(&e).unwrap_or(FailureKind::Capture)),
                };
            }
        };

        let (mode, segmentation, similarity) = self.count(previous.as_ref(), &frame);
        drop(previous);

        if let Err(e) = self
            .artifacts
            .persist(mode.label(), &frame.stem(), &segmentation.binary)
        {
            log::warn!("debug artifact: {:#}", e);
        }

        let timestamp = frame.captured_at();
        let count = segmentation.count;
        let description = describe(mode, count, timestamp.with_timezone(&Local));
        log::info!(
            "{}: {} ({} regions, {} in range)",
            frame.path().display(),
            description.replace('\n', "; "),
            segmentation.regions.len(),
            count
        );

        let request = UploadRequest {
            image_path: frame.path().to_path_buf(),
            description: description.clone(),
            count,
            timestamp,
        };
        let (upload, failure) = match self.uploader.upload(&request) {
            Ok(receipt) => (Some(receipt), None),
            Err(e) => {
                log::error!("{:#}", e);
                (None, Some(failure_kind(&e).unwrap_or(FailureKind::Upload)))
            }
        };

        CycleOutcome {
            detection: Some(DetectionResult {
                count,
                description,
                timestamp,
                mode,
                image_path: request.image_path,
                similarity,
            }),
            session: Some(frame),
            upload,
            failure,
        }
    }

    fn count(&self, previous: Option<&Frame>, frame: &Frame) -> (CountMode, Segmentation, Option<f64>) {
        let Some(previous) = previous else {
            return (CountMode::FullFrame, self.segmenter.segment_full(frame), None);
        };
        match self.differ.compare(previous, frame) {
            Ok(cmp) => {
                log::info!("similarity to previous frame: {:.4}", cmp.similarity);
                if cmp.similarity > self.similarity_gate {
                    (
                        CountMode::Differential,
                        self.segmenter.segment_diff(&cmp.mask),
                        Some(cmp.similarity),
                    )
                } else {
                    (
                        CountMode::FullFrame,
                        self.segmenter.segment_full(frame),
                        Some(cmp.similarity),
                    )
                }
            }
            Err(e) => {
                log::warn!("{:#}; counting full frame", e);
                (CountMode::FullFrame, self.segmenter.segment_full(frame), None)
            }
        }
    }
}

/// The frame retained between invocations. Empty at start.
#[derive(Debug, Default)]
pub struct SessionState {
    last: Option<Frame>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.last.as_ref()
    }

    /// Run `pipeline` against the retained frame and keep whatever it hands back.
    pub fn advance(&mut self, pipeline: &mut CapturePipeline) -> CycleOutcome {
        let mut outcome = pipeline.process(self.last.take());
        self.last = outcome.session.take();
        outcome
    }
}
