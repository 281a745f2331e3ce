//! trapwatch
//!
//! Field pest-trap monitor: two analog distance sensors and a still camera
//! watch a sticky trap card, and every capture is counted on-device before the
//! image and its count are synced.
//!
//! # Flow
//!
//! 1. **Trigger**: each sampling period the sensors are read; a remote trigger
//!    or anything closer than the proximity threshold fires a capture.
//! 2. **Count**: the new frame is compared with the previous one. A near
//!    identical scene is counted on the difference (new arrivals only),
//!    otherwise the whole cropped frame is thresholded and counted.
//! 3. **Sync**: image and metadata record go to the upload sink.
//!
//! Nothing that fails inside a cycle stops the loop; the next cycle simply runs.
//!
//! # Module Structure
//!
//! - `distance`: voltage to bounded distance
//! - `sensor`: ADC voltage sources
//! - `trigger`: trigger signals and the per-cycle trigger decision
//! - `ingest`: capture devices and the capture light
//! - `frame`: frames, masks, intensity conversion
//! - `detect`: frame differencing, region extraction, pest counting
//! - `pipeline`: capture-and-count invocation and session state
//! - `monitor`: the sampling loop
//! - `transport` / `storage`: upload sinks and the metadata store
//! - `artifacts`: debug images for calibration
//! - `config` / `assemble`: configuration and wiring

pub mod artifacts;
pub mod assemble;
pub mod config;
pub mod detect;
pub mod distance;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod monitor;
pub mod pipeline;
pub mod sensor;
pub mod storage;
pub mod transport;
pub mod trigger;

pub use artifacts::{DebugArtifactSink, DirectoryArtifactSink, DiscardArtifacts};
pub use config::{Calibration, TrapConfig};
pub use detect::{
    AreaBounds, Comparison, CropRegion, FrameDiffer, PestSegmenter, RegionCandidate, Segmentation,
    Segmenter,
};
pub use error::{failure_kind, FailureKind};
pub use frame::{BinaryMask, Frame};
pub use ingest::{CaptureDevice, CommandCamera, CommandCameraConfig, DirectoryCamera};
pub use monitor::{Clock, CycleReport, ManualClock, Monitor, MonitorStats, SystemClock};
pub use pipeline::{
    CapturePipeline, CountMode, CycleOutcome, DetectionResult, SessionState,
    DEFAULT_SIMILARITY_GATE,
};
pub use sensor::{IioVoltageSource, SensorReading, StaticVoltageSource, VoltageSource};
pub use storage::{InMemoryMetadataStore, MetadataStore, SqliteMetadataStore};
pub use transport::{
    ImageRecord, LocalArchiveUploader, LogOnlyUploader, UploadReceipt, UploadRequest, UploadSink,
};
pub use trigger::{
    FileTriggerSignal, NoTriggerSignal, TriggerDecision, TriggerEvaluator, TriggerSignal,
};
