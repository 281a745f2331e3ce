//! Sampling loop.
//!
//! The monitor owns the trigger evaluator, the pipeline and the session frame,
//! and drives one evaluation per period. It is single-threaded: capture and
//! upload block the loop, and nothing per-cycle can stop it. Time comes from a
//! `Clock` so tests can run many cycles without sleeping.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::FailureKind;
use crate::pipeline::{CapturePipeline, DetectionResult, SessionState};
use crate::trigger::{TriggerDecision, TriggerEvaluator};

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&mut self, duration: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only moves when slept on.
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: DateTime<Utc>,
    slept: Duration,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: start,
            slept: Duration::ZERO,
        }
    }

    /// Total time slept so far.
    pub fn slept(&self) -> Duration {
        self.slept
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.slept += duration;
        self.now += ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::zero());
    }
}

#[derive(Clone, Debug)]
pub struct CycleReport {
    pub at: DateTime<Utc>,
    pub decision: TriggerDecision,
    pub detection: Option<DetectionResult>,
    pub failure: Option<FailureKind>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub cycles: u64,
    pub triggers: u64,
    pub detections: u64,
    pub pests_counted: u64,
    pub failures: u64,
}

pub struct Monitor<C: Clock = SystemClock> {
    evaluator: TriggerEvaluator,
    pipeline: CapturePipeline,
    session: SessionState,
    clock: C,
    period: Duration,
    stats: MonitorStats,
}

impl<C: Clock> Monitor<C> {
    pub fn new(evaluator: TriggerEvaluator, pipeline: CapturePipeline, clock: C, period: Duration) -> Self {
        Self {
            evaluator,
            pipeline,
            session: SessionState::new(),
            clock,
            period,
            stats: MonitorStats::default(),
        }
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Evaluate the trigger once and, if it fires, run the pipeline.
    pub fn run_cycle(&mut self) -> CycleReport {
        let at = self.clock.now();
        let session = &mut self.session;
        let pipeline = &mut self.pipeline;
        let mut outcome = None;
        let decision = self.evaluator.cycle(|_| {
            outcome = Some(session.advance(pipeline));
        });

        self.stats.cycles += 1;
        let (detection, failure) = match outcome {
            Some(outcome) => {
                self.stats.triggers += 1;
                (outcome.detection, outcome.failure)
            }
            None => (None, None),
        };
        if let Some(detection) = &detection {
            self.stats.detections += 1;
            self.stats.pests_counted += u64::from(detection.count);
        }
        if let Some(kind) = failure {
            self.stats.failures += 1;
            log::debug!("cycle {} ended with {}", self.stats.cycles, kind);
        }

        CycleReport {
            at,
            decision,
            detection,
            failure,
        }
    }

    /// Run exactly `cycles` cycles, sleeping one period after each.
    pub fn run_for(&mut self, cycles: usize) -> Vec<CycleReport> {
        let mut reports = Vec::with_capacity(cycles);
        for _ in 0..cycles {
            reports.push(self.run_cycle());
            self.clock.sleep(self.period);
        }
        reports
    }

    /// Run until `stop` is raised. The flag is checked before every cycle.
    pub fn run(&mut self, stop: &AtomicBool) -> MonitorStats {
        log::info!("monitor started, sampling every {:?}", self.period);
        while !stop.load(Ordering::SeqCst) {
            self.run_cycle();
            if stop.load(Ordering::SeqCst) {
                break;
            }
            self.clock.sleep(self.period);
        }
        log::info!(
            "monitor stopped after {} cycles ({} triggers, {} pests counted)",
            self.stats.cycles,
            self.stats.triggers,
            self.stats.pests_counted
        );
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{AreaBounds, CropRegion, PestSegmenter};
    use crate::ingest::DirectoryCamera;
    use crate::sensor::StaticVoltageSource;
    use crate::transport::LogOnlyUploader;
    use crate::trigger::NoTriggerSignal;
    use chrono::TimeZone;

    fn idle_monitor() -> Monitor<ManualClock> {
        let sensors = StaticVoltageSource::new().with_channel(0, 0.1);
        let evaluator = TriggerEvaluator::new(Box::new(sensors), Box::new(NoTriggerSignal), vec![0], 9.5);
        let pipeline = CapturePipeline::new(
            Box::new(DirectoryCamera::from_paths(Vec::new())),
            Box::new(PestSegmenter::new(CropRegion::default(), 60, AreaBounds::new(1.0, 10.0))),
            Box::new(LogOnlyUploader),
        );
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 12, 6, 0, 0).unwrap());
        Monitor::new(evaluator, pipeline, clock, Duration::from_secs(5))
    }

    #[test]
    fn idle_cycles_advance_the_clock_only() {
        let mut monitor = idle_monitor();
        let reports = monitor.run_for(3);
        assert!(reports.iter().all(|r| r.decision == TriggerDecision::Idle));
        assert_eq!(reports[2].at, Utc.with_ymd_and_hms(2024, 5, 12, 6, 0, 10).unwrap());
        assert_eq!(monitor.clock().slept(), Duration::from_secs(15));
        assert_eq!(monitor.stats().cycles, 3);
        assert_eq!(monitor.stats().triggers, 0);
    }

    #[test]
    fn raised_stop_flag_prevents_any_cycle() {
        let mut monitor = idle_monitor();
        let stop = AtomicBool::new(true);
        assert_eq!(monitor.run(&stop).cycles, 0);
    }
}
