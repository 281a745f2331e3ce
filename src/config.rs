use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::detect::{AreaBounds, CropRegion, DEFAULT_CHANGE_THRESHOLD, DEFAULT_INTENSITY_CUTOFF};
use crate::ingest::command::DEFAULT_CAPTURE_COMMAND;
use crate::pipeline::DEFAULT_SIMILARITY_GATE;
use crate::sensor::DEFAULT_IIO_DEVICE;
use crate::trigger::DEFAULT_PROXIMITY_CM;

const DEFAULT_PERIOD_SECS: f64 = 5.0;
const DEFAULT_CHANNELS: [u8; 2] = [0, 1];
const DEFAULT_SAVE_DIR: &str = "captures";
const DEFAULT_CAPTURE_TIMEOUT_SECS: u64 = 20;
const DEFAULT_WARMUP_MS: u64 = 2000;
const DEFAULT_MIN_AREA: f64 = 27785.0;
const DEFAULT_MAX_AREA: f64 = 266000.0;
const DEFAULT_DB_PATH: &str = "trapwatch.db";
const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize, Default)]
struct TrapConfigFile {
    sampling: Option<SamplingConfigFile>,
    sensors: Option<SensorsConfigFile>,
    capture: Option<CaptureConfigFile>,
    indicator: Option<IndicatorConfigFile>,
    calibration: Option<CalibrationConfigFile>,
    trigger: Option<TriggerConfigFile>,
    upload: Option<UploadConfigFile>,
    debug: Option<DebugConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplingConfigFile {
    period_secs: Option<f64>,
    proximity_cm: Option<f64>,
    channels: Option<Vec<u8>>,
}

#[derive(Debug, Deserialize, Default)]
struct SensorsConfigFile {
    iio_device: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    command: Option<String>,
    save_dir: Option<PathBuf>,
    timeout_secs: Option<u64>,
    warmup_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct IndicatorConfigFile {
    gpio: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct CalibrationConfigFile {
    crop: Option<CropRegion>,
    intensity_cutoff: Option<u8>,
    diff_threshold: Option<u8>,
    similarity_gate: Option<f64>,
    min_area: Option<f64>,
    max_area: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct TriggerConfigFile {
    path: Option<PathBuf>,
    url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct UploadConfigFile {
    blob_container_url: Option<String>,
    table_url: Option<String>,
    db_path: Option<String>,
    archive_dir: Option<PathBuf>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DebugConfigFile {
    dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct TrapConfig {
    pub sampling: SamplingSettings,
    pub sensors: SensorSettings,
    pub capture: CaptureSettings,
    /// GPIO line of the capture light, if one is fitted.
    pub indicator_gpio: Option<u32>,
    pub calibration: Calibration,
    pub trigger: TriggerSettings,
    pub upload: UploadSettings,
    /// Where binarized images are written for calibration; off when unset.
    pub debug_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SamplingSettings {
    pub period: Duration,
    pub proximity_cm: f64,
    pub channels: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct SensorSettings {
    pub iio_device: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub command: String,
    pub save_dir: PathBuf,
    pub timeout: Duration,
    pub warmup: Duration,
}

/// Per-deployment counting calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub crop: CropRegion,
    pub intensity_cutoff: u8,
    pub diff_threshold: u8,
    pub similarity_gate: f64,
    pub area: AreaBounds,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            crop: CropRegion::FIELD_MOUNT,
            intensity_cutoff: DEFAULT_INTENSITY_CUTOFF,
            diff_threshold: DEFAULT_CHANGE_THRESHOLD,
            similarity_gate: DEFAULT_SIMILARITY_GATE,
            area: AreaBounds::new(DEFAULT_MIN_AREA, DEFAULT_MAX_AREA),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TriggerSettings {
    /// Local file whose presence requests a capture.
    pub path: Option<PathBuf>,
    /// SAS container URL holding the `trigger.txt` blob.
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub blob_container_url: Option<String>,
    pub table_url: Option<String>,
    pub db_path: String,
    pub archive_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl UploadSettings {
    /// Both cloud endpoints configured.
    pub fn cloud_enabled(&self) -> bool {
        self.blob_container_url.is_some() && self.table_url.is_some()
    }
}

impl TrapConfig {
    /// Load from `$TRAP_CONFIG` (if set), then apply `TRAP_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("TRAP_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty());
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (or defaults), then apply `TRAP_*` overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: TrapConfigFile) -> Self {
        let sampling = file.sampling.unwrap_or_default();
        let sensors = file.sensors.unwrap_or_default();
        let capture = file.capture.unwrap_or_default();
        let calibration = file.calibration.unwrap_or_default();
        let trigger = file.trigger.unwrap_or_default();
        let upload = file.upload.unwrap_or_default();
        let defaults = Calibration::default();

        Self {
            sampling: SamplingSettings {
                period: secs_f64(sampling.period_secs.unwrap_or(DEFAULT_PERIOD_SECS)),
                proximity_cm: sampling.proximity_cm.unwrap_or(DEFAULT_PROXIMITY_CM),
                channels: sampling
                    .channels
                    .unwrap_or_else(|| DEFAULT_CHANNELS.to_vec()),
            },
            sensors: SensorSettings {
                iio_device: sensors
                    .iio_device
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_IIO_DEVICE)),
            },
            capture: CaptureSettings {
                command: capture
                    .command
                    .unwrap_or_else(|| DEFAULT_CAPTURE_COMMAND.to_string()),
                save_dir: capture
                    .save_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SAVE_DIR)),
                timeout: Duration::from_secs(
                    capture.timeout_secs.unwrap_or(DEFAULT_CAPTURE_TIMEOUT_SECS),
                ),
                warmup: Duration::from_millis(capture.warmup_ms.unwrap_or(DEFAULT_WARMUP_MS)),
            },
            indicator_gpio: file.indicator.and_then(|indicator| indicator.gpio),
            calibration: Calibration {
                crop: calibration.crop.unwrap_or(defaults.crop),
                intensity_cutoff: calibration
                    .intensity_cutoff
                    .unwrap_or(defaults.intensity_cutoff),
                diff_threshold: calibration.diff_threshold.unwrap_or(defaults.diff_threshold),
                similarity_gate: calibration
                    .similarity_gate
                    .unwrap_or(defaults.similarity_gate),
                area: AreaBounds::new(
                    calibration.min_area.unwrap_or(defaults.area.min),
                    calibration.max_area.unwrap_or(defaults.area.max),
                ),
            },
            trigger: TriggerSettings {
                path: trigger.path,
                url: trigger.url,
            },
            upload: UploadSettings {
                blob_container_url: upload.blob_container_url,
                table_url: upload.table_url,
                db_path: upload
                    .db_path
                    .unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
                archive_dir: upload.archive_dir,
                timeout: Duration::from_secs(
                    upload.timeout_secs.unwrap_or(DEFAULT_UPLOAD_TIMEOUT_SECS),
                ),
            },
            debug_dir: file.debug.and_then(|debug| debug.dir),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(dir) = env_string("TRAP_SAVE_DIR") {
            self.capture.save_dir = PathBuf::from(dir);
        }
        if let Some(cm) = env_parse::<f64>("TRAP_PROXIMITY_CM", "a distance in centimeters")? {
            self.sampling.proximity_cm = cm;
        }
        if let Some(secs) = env_parse::<f64>("TRAP_SAMPLE_SECS", "a number of seconds")? {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(anyhow!("TRAP_SAMPLE_SECS must be greater than zero"));
            }
            self.sampling.period = secs_f64(secs);
        }
        if let Some(area) = env_parse::<f64>("TRAP_MIN_AREA", "a number")? {
            self.calibration.area.min = area;
        }
        if let Some(area) = env_parse::<f64>("TRAP_MAX_AREA", "a number")? {
            self.calibration.area.max = area;
        }
        if let Some(path) = env_string("TRAP_TRIGGER_PATH") {
            self.trigger.path = Some(PathBuf::from(path));
        }
        if let Some(url) = env_string("TRAP_TRIGGER_URL") {
            self.trigger.url = Some(url);
        }
        if let Some(url) = env_string("TRAP_BLOB_CONTAINER_URL") {
            self.upload.blob_container_url = Some(url);
        }
        if let Some(url) = env_string("TRAP_TABLE_URL") {
            self.upload.table_url = Some(url);
        }
        if let Some(path) = env_string("TRAP_DB_PATH") {
            self.upload.db_path = path;
        }
        if let Some(pin) = env_parse::<u32>("TRAP_LED_GPIO", "a gpio line number")? {
            self.indicator_gpio = Some(pin);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.sampling.period.is_zero() {
            return Err(anyhow!("sampling period must be greater than zero"));
        }
        if !self.sampling.proximity_cm.is_finite() || self.sampling.proximity_cm <= 0.0 {
            return Err(anyhow!(
                "proximity threshold must be a positive distance, got {}",
                self.sampling.proximity_cm
            ));
        }
        if self.sampling.channels.is_empty() {
            return Err(anyhow!("at least one sensor channel must be configured"));
        }
        let area = self.calibration.area;
        if !(area.min.is_finite() && area.max.is_finite()) || area.min >= area.max {
            return Err(anyhow!(
                "min_area ({}) must be below max_area ({})",
                area.min,
                area.max
            ));
        }
        let gate = self.calibration.similarity_gate;
        if !(gate > 0.0 && gate <= 1.0) {
            return Err(anyhow!("similarity_gate must be in (0, 1], got {}", gate));
        }
        if self.capture.timeout.is_zero() {
            return Err(anyhow!("capture timeout must be greater than zero"));
        }
        if self.upload.blob_container_url.is_some() != self.upload.table_url.is_some() {
            return Err(anyhow!(
                "blob_container_url and table_url must be configured together"
            ));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<TrapConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str, what: &str) -> Result<Option<T>> {
    match env_string(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be {}", key, what)),
        None => Ok(None),
    }
}

fn secs_f64(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}
