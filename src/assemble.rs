//! Wiring of configured collaborators.
//!
//! Everything here runs once at startup; errors are fatal to the daemon.

use anyhow::{anyhow, Result};

use crate::artifacts::{DebugArtifactSink, DirectoryArtifactSink, DiscardArtifacts};
use crate::config::{Calibration, TrapConfig};
use crate::detect::{FrameDiffer, PestSegmenter};
use crate::ingest::{
    CaptureDevice, CommandCamera, CommandCameraConfig, Indicator, NoIndicator, SysfsGpioIndicator,
};
use crate::monitor::{Monitor, SystemClock};
use crate::pipeline::CapturePipeline;
use crate::sensor::IioVoltageSource;
use crate::storage::SqliteMetadataStore;
use crate::transport::{LocalArchiveUploader, LogOnlyUploader, UploadSink};
use crate::trigger::{FileTriggerSignal, NoTriggerSignal, TriggerEvaluator, TriggerSignal};

pub fn segmenter(calibration: &Calibration) -> PestSegmenter {
    PestSegmenter::new(
        calibration.crop,
        calibration.intensity_cutoff,
        calibration.area,
    )
}

pub fn differ(calibration: &Calibration) -> FrameDiffer {
    FrameDiffer::new(calibration.diff_threshold)
}

/// Remote trigger: blob URL wins over a local file; neither means none.
pub fn trigger_signal(cfg: &TrapConfig) -> Result<Box<dyn TriggerSignal>> {
    if let Some(url) = &cfg.trigger.url {
        return blob_trigger(url, cfg);
    }
    if let Some(path) = &cfg.trigger.path {
        log::info!("trigger signal: file {}", path.display());
        return Ok(Box::new(FileTriggerSignal::new(path.clone())));
    }
    log::info!("trigger signal: none (proximity only)");
    Ok(Box::new(NoTriggerSignal))
}

#[cfg(feature = "azure")]
fn blob_trigger(url: &str, cfg: &TrapConfig) -> Result<Box<dyn TriggerSignal>> {
    use crate::trigger::{BlobTriggerSignal, DEFAULT_TRIGGER_BLOB};
    log::info!("trigger signal: blob {}", DEFAULT_TRIGGER_BLOB);
    Ok(Box::new(BlobTriggerSignal::new(
        url,
        DEFAULT_TRIGGER_BLOB,
        cfg.upload.timeout,
    )?))
}

#[cfg(not(feature = "azure"))]
fn blob_trigger(_url: &str, _cfg: &TrapConfig) -> Result<Box<dyn TriggerSignal>> {
    Err(anyhow!("trigger.url requires the `azure` feature"))
}

/// Cloud upload when both endpoints are set, else a local archive, else log only.
pub fn upload_sink(cfg: &TrapConfig) -> Result<Box<dyn UploadSink>> {
    if cfg.upload.cloud_enabled() {
        return cloud_uploader(cfg);
    }
    if let Some(dir) = &cfg.upload.archive_dir {
        log::info!(
            "upload: local archive {} (records in {})",
            dir.display(),
            cfg.upload.db_path
        );
        let store = SqliteMetadataStore::open(&cfg.upload.db_path)?;
        return Ok(Box::new(LocalArchiveUploader::new(dir.clone(), Box::new(store))?));
    }
    log::warn!("upload: no destination configured, counts are only logged");
    Ok(Box::new(LogOnlyUploader))
}

#[cfg(feature = "azure")]
fn cloud_uploader(cfg: &TrapConfig) -> Result<Box<dyn UploadSink>> {
    use crate::transport::{AzureConfig, AzureUploader};
    let (Some(blob_container_url), Some(table_url)) =
        (cfg.upload.blob_container_url.clone(), cfg.upload.table_url.clone())
    else {
        return Err(anyhow!("cloud upload needs both blob_container_url and table_url"));
    };
    log::info!("upload: azure storage");
    Ok(Box::new(AzureUploader::new(AzureConfig {
        blob_container_url,
        table_url,
        timeout: cfg.upload.timeout,
    })?))
}

#[cfg(not(feature = "azure"))]
fn cloud_uploader(_cfg: &TrapConfig) -> Result<Box<dyn UploadSink>> {
    Err(anyhow!("cloud upload requires the `azure` feature"))
}

pub fn artifact_sink(cfg: &TrapConfig) -> Result<Box<dyn DebugArtifactSink>> {
    match &cfg.debug_dir {
        Some(dir) => Ok(Box::new(DirectoryArtifactSink::new(dir.clone())?)),
        None => Ok(Box::new(DiscardArtifacts)),
    }
}

pub fn indicator(cfg: &TrapConfig) -> Result<Box<dyn Indicator>> {
    match cfg.indicator_gpio {
        Some(pin) => Ok(Box::new(SysfsGpioIndicator::open(pin)?)),
        None => Ok(Box::new(NoIndicator)),
    }
}

/// Pipeline around any capture device, with calibration and sinks from `cfg`.
pub fn pipeline(cfg: &TrapConfig, camera: Box<dyn CaptureDevice>) -> Result<CapturePipeline> {
    Ok(CapturePipeline::new(
        camera,
        Box::new(segmenter(&cfg.calibration)),
        upload_sink(cfg)?,
    )
    .with_differ(differ(&cfg.calibration))
    .with_artifacts(artifact_sink(cfg)?)
    .with_similarity_gate(cfg.calibration.similarity_gate))
}

/// The field unit: IIO sensors, command camera, real clock.
pub fn field_monitor(cfg: &TrapConfig) -> Result<Monitor<SystemClock>> {
    let sensors = IioVoltageSource::new(cfg.sensors.iio_device.clone())?;
    let evaluator = TriggerEvaluator::new(
        Box::new(sensors),
        trigger_signal(cfg)?,
        cfg.sampling.channels.clone(),
        cfg.sampling.proximity_cm,
    );
    let camera = CommandCamera::new(
        CommandCameraConfig {
            command: cfg.capture.command.clone(),
            save_dir: cfg.capture.save_dir.clone(),
            timeout: cfg.capture.timeout,
            warmup: cfg.capture.warmup,
        },
        indicator(cfg)?,
    )?;
    let pipeline = pipeline(cfg, Box::new(camera))?;
    Ok(Monitor::new(evaluator, pipeline, SystemClock, cfg.sampling.period))
}
