//! Capture triggering.
//!
//! Each sampling cycle the `TriggerEvaluator` decides whether a capture runs:
//! 1. an external trigger signal (remote request) always fires, and is cleared
//!    exactly once after the capture returns, whether or not it succeeded
//! 2. otherwise a sensor reporting something closer than the proximity threshold fires
//! 3. otherwise nothing happens this cycle
//!
//! A failed sensor read skips the proximity check for the cycle; a failed signal
//! poll counts as "not set". Neither is retried before the next cycle.

#[cfg(feature = "azure")]
mod blob;
mod file;

#[cfg(feature = "azure")]
pub use blob::{BlobTriggerSignal, DEFAULT_TRIGGER_BLOB};
pub use file::FileTriggerSignal;

use anyhow::{Context, Result};

use crate::error::FailureKind;
use crate::sensor::{SensorReading, VoltageSource};

/// Proximity threshold used by the production mount, in centimeters.
pub const DEFAULT_PROXIMITY_CM: f64 = 9.5;

/// Remote "take a picture now" flag.
pub trait TriggerSignal {
    fn is_set(&mut self) -> Result<bool>;
    fn clear(&mut self) -> Result<()>;
}

/// Signal that is never raised, for units without remote triggering.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTriggerSignal;

impl TriggerSignal for NoTriggerSignal {
    fn is_set(&mut self) -> Result<bool> {
        Ok(false)
    }

    fn clear(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TriggerDecision {
    /// The external trigger signal was set.
    External,
    /// A sensor saw something inside the threshold.
    Proximity { channel: u8, distance_cm: f64 },
    Idle,
}

impl TriggerDecision {
    pub fn fires(&self) -> bool {
        !matches!(self, TriggerDecision::Idle)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvaluatorState {
    Idle,
    Capturing,
}

pub struct TriggerEvaluator {
    sensors: Box<dyn VoltageSource>,
    signal: Box<dyn TriggerSignal>,
    channels: Vec<u8>,
    proximity_cm: f64,
    state: EvaluatorState,
}

impl TriggerEvaluator {
    pub fn new(
        sensors: Box<dyn VoltageSource>,
        signal: Box<dyn TriggerSignal>,
        channels: Vec<u8>,
        proximity_cm: f64,
    ) -> Self {
        Self {
            sensors,
            signal,
            channels,
            proximity_cm,
            state: EvaluatorState::Idle,
        }
    }

    pub fn state(&self) -> EvaluatorState {
        self.state
    }

    pub fn proximity_cm(&self) -> f64 {
        self.proximity_cm
    }

    /// Read every channel. `None` if any channel failed this cycle.
    fn sample(&mut self) -> Option<Vec<SensorReading>> {
        let mut readings = Vec::with_capacity(self.channels.len());
        let mut complete = true;
        for &channel in &self.channels {
            match self.sensors.read(channel) {
                Ok(reading) => {
                    log::info!(
                        "sensor {}: voltage {:.2} V, distance {:.2} cm",
                        channel,
                        reading.voltage,
                        reading.distance_cm()
                    );
                    readings.push(reading);
                }
                Err(e) => {
                    log::warn!("{:#}; proximity check skipped this cycle", e);
                    complete = false;
                }
            }
        }
        complete.then_some(readings)
    }

    fn signal_set(&mut self) -> bool {
        match self.signal.is_set().context(FailureKind::TriggerSignal) {
            Ok(set) => set,
            Err(e) => {
                log::error!("{:#}", e);
                false
            }
        }
    }

    /// Decide what this cycle does, without running anything.
    pub fn evaluate(&mut self) -> TriggerDecision {
        let readings = self.sample();

        if self.signal_set() {
            log::info!("trigger signal detected, capturing image");
            return TriggerDecision::External;
        }

        let Some(readings) = readings else {
            return TriggerDecision::Idle;
        };
        for reading in readings {
            let distance_cm = reading.distance_cm();
            if distance_cm < self.proximity_cm {
                log::info!(
                    "pest detected on sensor {} at {:.2} cm, triggering camera",
                    reading.channel,
                    distance_cm
                );
                return TriggerDecision::Proximity {
                    channel: reading.channel,
                    distance_cm,
                };
            }
        }
        TriggerDecision::Idle
    }

    /// Run one sampling cycle. `capture` is invoked at most once, while the
    /// evaluator is in the `Capturing` state.
    pub fn cycle(&mut self, capture: impl FnOnce(&TriggerDecision)) -> TriggerDecision {
        let decision = self.evaluate();
        if !decision.fires() {
            return decision;
        }

        self.state = EvaluatorState::Capturing;
        capture(&decision);
        self.state = EvaluatorState::Idle;

        if decision == TriggerDecision::External {
            match self.signal.clear() {
                Ok(()) => log::info!("trigger signal cleared"),
                Err(e) => log::error!("{:#}", e.context(FailureKind::TriggerSignal)),
            }
        }
        decision
    }
}
