//! Analog distance sensor sources.
//!
//! The field unit reads two IR distance sensors through an ADS1115 ADC. On Linux
//! the `ti-ads1015` IIO driver exposes each input as
//! `in_voltageN_raw` (counts) and `in_voltageN_scale` (mV per count).

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::distance;
use crate::error::FailureKind;

/// Default sysfs directory of the ADC.
pub const DEFAULT_IIO_DEVICE: &str = "/sys/bus/iio/devices/iio:device0";

/// One voltage sample from one channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorReading {
    pub channel: u8,
    pub voltage: f64,
}

impl SensorReading {
    pub fn distance_cm(&self) -> f64 {
        distance::estimate(self.voltage)
    }
}

/// Source of sensor voltages, polled once per cycle per channel.
pub trait VoltageSource {
    fn read_voltage(&mut self, channel: u8) -> Result<f64>;

    /// Read one channel into a `SensorReading`. Failures are tagged `SensorRead`.
    fn read(&mut self, channel: u8) -> Result<SensorReading> {
        let voltage = self
            .read_voltage(channel)
            .with_context(|| format!("read sensor channel {}", channel))
            .context(FailureKind::SensorRead)?;
        Ok(SensorReading { channel, voltage })
    }
}

/// Linux IIO ADC reader.
pub struct IioVoltageSource {
    device_dir: PathBuf,
    scales: HashMap<u8, f64>,
}

impl IioVoltageSource {
    pub fn new(device_dir: impl Into<PathBuf>) -> Result<Self> {
        let device_dir = device_dir.into();
        if !device_dir.is_dir() {
            return Err(anyhow!(
                "iio device directory {} does not exist",
                device_dir.display()
            ));
        }
        Ok(Self {
            device_dir,
            scales: HashMap::new(),
        })
    }

    fn scale_mv(&mut self, channel: u8) -> Result<f64> {
        if let Some(scale) = self.scales.get(&channel) {
            return Ok(*scale);
        }
        let path = self.device_dir.join(format!("in_voltage{}_scale", channel));
        let scale = read_number(&path)?;
        self.scales.insert(channel, scale);
        Ok(scale)
    }
}

impl VoltageSource for IioVoltageSource {
    fn read_voltage(&mut self, channel: u8) -> Result<f64> {
        let raw_path = self.device_dir.join(format!("in_voltage{}_raw", channel));
        let raw = read_number(&raw_path)?;
        let scale = self.scale_mv(channel)?;
        Ok(raw * scale / 1000.0)
    }
}

fn read_number(path: &Path) -> Result<f64> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read {}: {}", path.display(), e))?;
    text.trim()
        .parse::<f64>()
        .map_err(|_| anyhow!("{} does not hold a number: {:?}", path.display(), text.trim()))
}

/// Fixed voltages per channel. Missing channels fail like a disconnected sensor.
#[derive(Clone, Debug, Default)]
pub struct StaticVoltageSource {
    voltages: HashMap<u8, f64>,
}

impl StaticVoltageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: u8, voltage: f64) -> Self {
        self.voltages.insert(channel, voltage);
        self
    }

    pub fn set(&mut self, channel: u8, voltage: f64) {
        self.voltages.insert(channel, voltage);
    }
}

impl VoltageSource for StaticVoltageSource {
    fn read_voltage(&mut self, channel: u8) -> Result<f64> {
        self.voltages
            .get(&channel)
            .copied()
            .ok_or_else(|| anyhow!("channel {} not connected", channel))
    }
}
