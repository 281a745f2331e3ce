use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};
use image::{DynamicImage, GrayImage, Luma};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use trapwatch::detect::DEFAULT_INTENSITY_CUTOFF;
use trapwatch::{
    AreaBounds, BinaryMask, CaptureDevice, CapturePipeline, CountMode, CropRegion, FailureKind,
    Frame, ManualClock, Monitor, PestSegmenter, Segmentation, Segmenter, SessionState,
    TriggerDecision, TriggerEvaluator, TriggerSignal, UploadReceipt, UploadRequest, UploadSink,
    VoltageSource,
};

// v = 12 / d - 0.05
fn volts_for(distance_cm: f64) -> f64 {
    12.0 / distance_cm - 0.05
}

#[derive(Clone, Default)]
struct SharedVoltages(Rc<RefCell<HashMap<u8, f64>>>);

impl SharedVoltages {
    fn at(d0: f64, d1: f64) -> Self {
        let v = Self::default();
        v.set(0, d0);
        v.set(1, d1);
        v
    }

    fn set(&self, channel: u8, distance_cm: f64) {
        self.0.borrow_mut().insert(channel, volts_for(distance_cm));
    }
}

impl VoltageSource for SharedVoltages {
    fn read_voltage(&mut self, channel: u8) -> Result<f64> {
        self.0
            .borrow()
            .get(&channel)
            .copied()
            .ok_or_else(|| anyhow!("channel {} not wired", channel))
    }
}

#[derive(Clone, Default)]
struct FlagSignal {
    set: Rc<RefCell<bool>>,
    clears: Rc<RefCell<u32>>,
}

impl TriggerSignal for FlagSignal {
    fn is_set(&mut self) -> Result<bool> {
        Ok(*self.set.borrow())
    }

    fn clear(&mut self) -> Result<()> {
        *self.clears.borrow_mut() += 1;
        *self.set.borrow_mut() = false;
        Ok(())
    }
}

/// Hands out queued frames; `None` entries fail like a dead camera.
#[derive(Clone, Default)]
struct ScriptedCamera {
    frames: Rc<RefCell<VecDeque<Option<Frame>>>>,
    calls: Rc<RefCell<u32>>,
}

impl ScriptedCamera {
    fn push(&self, frame: Option<Frame>) {
        self.frames.borrow_mut().push_back(frame);
    }

    fn calls(&self) -> u32 {
        *self.calls.borrow()
    }
}

impl CaptureDevice for ScriptedCamera {
    fn capture(&mut self) -> Result<Frame> {
        *self.calls.borrow_mut() += 1;
        match self.frames.borrow_mut().pop_front().flatten() {
            Some(frame) => Ok(frame),
            None => Err(anyhow!("libcamera-still exited with status 1").context(FailureKind::Capture)),
        }
    }
}

#[derive(Clone, Default)]
struct RecordingUploader {
    requests: Rc<RefCell<Vec<UploadRequest>>>,
    fail: bool,
}

impl UploadSink for RecordingUploader {
    fn upload(&mut self, request: &UploadRequest) -> Result<UploadReceipt> {
        self.requests.borrow_mut().push(request.clone());
        if self.fail {
            return Err(anyhow!("network unreachable").context(FailureKind::Upload));
        }
        Ok(UploadReceipt {
            location: format!("mem://{}", request.file_name()),
            record: trapwatch::ImageRecord::new(request, "mem://"),
        })
    }
}

/// Records which counting path ran, then delegates.
#[derive(Clone)]
struct SpySegmenter {
    inner: PestSegmenter,
    calls: Rc<RefCell<Vec<&'static str>>>,
}

impl SpySegmenter {
    fn new() -> Self {
        Self {
            inner: PestSegmenter::new(
                CropRegion::default(),
                DEFAULT_INTENSITY_CUTOFF,
                AreaBounds::new(50.0, 500.0),
            ),
            calls: Rc::default(),
        }
    }
}

impl Segmenter for SpySegmenter {
    fn segment_full(&self, frame: &Frame) -> Segmentation {
        self.calls.borrow_mut().push("full");
        self.inner.segment_full(frame)
    }

    fn segment_diff(&self, mask: &BinaryMask) -> Segmentation {
        self.calls.borrow_mut().push("diff");
        self.inner.segment_diff(mask)
    }
}

/// 100x100 light card; the first `changed` pixels (row-major) are dark.
fn card(name: &str, changed: u32) -> Frame {
    let img = GrayImage::from_fn(100, 100, |x, y| {
        Luma([if y * 100 + x < changed { 0 } else { 200 }])
    });
    Frame::new(
        DynamicImage::ImageLuma8(img),
        PathBuf::from(format!("/captures/{}.jpg", name)),
        Utc.with_ymd_and_hms(2024, 5, 12, 10, 15, 0).unwrap(),
    )
}

struct Rig {
    camera: ScriptedCamera,
    uploader: RecordingUploader,
    segmenter: SpySegmenter,
}

impl Rig {
    fn new() -> Self {
        Self {
            camera: ScriptedCamera::default(),
            uploader: RecordingUploader::default(),
            segmenter: SpySegmenter::new(),
        }
    }

    fn pipeline(&self) -> CapturePipeline {
        CapturePipeline::new(
            Box::new(self.camera.clone()),
            Box::new(self.segmenter.clone()),
            Box::new(self.uploader.clone()),
        )
    }

    fn monitor(&self, sensors: SharedVoltages, signal: FlagSignal) -> Monitor<ManualClock> {
        let evaluator = TriggerEvaluator::new(Box::new(sensors), Box::new(signal), vec![0, 1], 9.5);
        Monitor::new(
            evaluator,
            self.pipeline(),
            ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 12, 6, 0, 0).unwrap()),
            Duration::from_secs(5),
        )
    }

    fn paths(&self) -> Vec<&'static str> {
        self.segmenter.calls.borrow().clone()
    }
}

#[test]
fn high_similarity_counts_difference_mask() {
    let rig = Rig::new();
    rig.camera.push(Some(card("a", 0)));
    // 200 of 10000 pixels changed: similarity 0.98
    rig.camera.push(Some(card("b", 200)));
    let mut pipeline = rig.pipeline();
    let mut session = SessionState::new();

    session.advance(&mut pipeline);
    let detection = session.advance(&mut pipeline).detection.unwrap();

    assert_eq!(rig.paths(), vec!["full", "diff"]);
    assert_eq!(detection.mode, CountMode::Differential);
    assert!((detection.similarity.unwrap() - 0.98).abs() < 1e-9);
    // two full dark rows: 100x2 strip has area 99
    assert_eq!(detection.count, 1);
}

#[test]
fn similarity_at_gate_counts_full_frame() {
    let rig = Rig::new();
    rig.camera.push(Some(card("a", 0)));
    // 300 of 10000 changed: similarity exactly 0.97, not above the gate
    rig.camera.push(Some(card("b", 300)));
    let mut pipeline = rig.pipeline();
    let mut session = SessionState::new();

    session.advance(&mut pipeline);
    let detection = session.advance(&mut pipeline).detection.unwrap();

    assert_eq!(rig.paths(), vec!["full", "full"]);
    assert_eq!(detection.mode, CountMode::FullFrame);
    assert!(detection.description.ends_with("\nPest category: Weevil\nNumber: 1"));
}

#[test]
fn capture_failure_leaves_session_unchanged() {
    let rig = Rig::new();
    rig.camera.push(Some(card("a", 0)));
    rig.camera.push(None);
    rig.camera.push(Some(card("c", 200)));
    let mut pipeline = rig.pipeline();
    let mut session = SessionState::new();

    session.advance(&mut pipeline);
    let failed = session.advance(&mut pipeline);
    assert!(failed.detection.is_none());
    assert_eq!(failed.failure, Some(FailureKind::Capture));
    assert_eq!(session.last_frame().unwrap().stem(), "a");

    // the next capture is still compared against frame a
    let detection = session.advance(&mut pipeline).detection.unwrap();
    assert_eq!(detection.mode, CountMode::Differential);
    assert_eq!(rig.uploader.requests.borrow().len(), 2);
}

#[test]
fn upload_failure_does_not_change_count_or_session() {
    let mut rig = Rig::new();
    rig.uploader.fail = true;
    rig.camera.push(Some(card("a", 200)));
    let mut pipeline = rig.pipeline();
    let mut session = SessionState::new();

    let outcome = session.advance(&mut pipeline);
    assert_eq!(outcome.failure, Some(FailureKind::Upload));
    assert!(outcome.upload.is_none());
    let detection = outcome.detection.unwrap();
    assert_eq!(detection.count, 1);
    assert_eq!(session.last_frame().unwrap().stem(), "a");

    let requests = rig.uploader.requests.borrow();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].file_name(), "a.jpg");
    assert_eq!(requests[0].count, 1);
    assert_eq!(requests[0].description, detection.description);
}

#[test]
fn near_sensor_triggers_exactly_one_capture() {
    let rig = Rig::new();
    rig.camera.push(Some(card("a", 0)));
    let signal = FlagSignal::default();
    let mut monitor = rig.monitor(SharedVoltages::at(5.0, 20.0), signal.clone());

    let report = monitor.run_cycle();
    assert!(matches!(report.decision, TriggerDecision::Proximity { channel: 0, .. }));
    assert_eq!(rig.camera.calls(), 1);
    assert_eq!(report.detection.unwrap().count, 0);
    assert_eq!(*signal.clears.borrow(), 0);
}

#[test]
fn external_trigger_fires_and_is_cleared_once() {
    let rig = Rig::new();
    rig.camera.push(Some(card("a", 0)));
    let signal = FlagSignal::default();
    *signal.set.borrow_mut() = true;
    let mut monitor = rig.monitor(SharedVoltages::at(20.0, 20.0), signal.clone());

    let reports = monitor.run_for(3);
    assert_eq!(reports[0].decision, TriggerDecision::External);
    assert_eq!(reports[1].decision, TriggerDecision::Idle);
    assert_eq!(reports[2].decision, TriggerDecision::Idle);
    assert_eq!(rig.camera.calls(), 1);
    assert_eq!(*signal.clears.borrow(), 1);
    assert_eq!(monitor.stats().triggers, 1);
    assert_eq!(monitor.clock().slept(), Duration::from_secs(15));
}

#[test]
fn external_trigger_is_cleared_even_when_capture_fails() {
    let rig = Rig::new();
    rig.camera.push(None);
    let signal = FlagSignal::default();
    *signal.set.borrow_mut() = true;
    let mut monitor = rig.monitor(SharedVoltages::at(20.0, 20.0), signal.clone());

    let report = monitor.run_cycle();
    assert_eq!(report.decision, TriggerDecision::External);
    assert_eq!(report.failure, Some(FailureKind::Capture));
    assert_eq!(*signal.clears.borrow(), 1);
    assert!(monitor.session().last_frame().is_none());
}

#[test]
fn sensor_dropout_skips_proximity_for_that_cycle() {
    let rig = Rig::new();
    rig.camera.push(Some(card("a", 0)));
    let sensors = SharedVoltages::default();
    sensors.set(0, 5.0);
    let mut monitor = rig.monitor(sensors.clone(), FlagSignal::default());

    // channel 1 missing: no capture even though channel 0 is close
    assert_eq!(monitor.run_cycle().decision, TriggerDecision::Idle);
    assert_eq!(rig.camera.calls(), 0);

    sensors.set(1, 25.0);
    assert!(monitor.run_cycle().decision.fires());
    assert_eq!(rig.camera.calls(), 1);
    assert_eq!(monitor.stats().cycles, 2);
}

#[test]
fn consecutive_triggers_report_only_new_arrivals() {
    let rig = Rig::new();
    rig.camera.push(Some(card("a", 200)));
    rig.camera.push(Some(card("b", 400)));
    let sensors = SharedVoltages::at(5.0, 30.0);
    let mut monitor = rig.monitor(sensors, FlagSignal::default());

    let reports = monitor.run_for(2);
    let first = reports[0].detection.as_ref().unwrap();
    let second = reports[1].detection.as_ref().unwrap();
    assert_eq!(first.mode, CountMode::FullFrame);
    assert_eq!(first.count, 1);
    assert_eq!(second.mode, CountMode::Differential);
    assert_eq!(second.count, 1);
    assert!(second.description.ends_with("\nNew weevils found: 1"));
    assert_eq!(monitor.stats().pests_counted, 2);
}
