//! trapd - field trap monitor daemon
//!
//! This daemon:
//! 1. Loads configuration (`TRAP_CONFIG` file plus `TRAP_*` overrides)
//! 2. Opens the ADC, camera, capture light, trigger signal and upload sink
//! 3. Samples the distance sensors every period and captures on trigger
//! 4. Counts pests in each capture and uploads image + record
//!
//! Runs until Ctrl-C. Only startup failures exit with an error.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use trapwatch::{assemble, TrapConfig};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = TrapConfig::load()?;
    log::info!(
        "trapd {} starting: channels {:?}, proximity {} cm, period {:?}",
        env!("CARGO_PKG_VERSION"),
        cfg.sampling.channels,
        cfg.sampling.proximity_cm,
        cfg.sampling.period
    );
    log::info!(
        "calibration: crop {:?}, cutoff {}, area ({}, {}), gate {}",
        cfg.calibration.crop,
        cfg.calibration.intensity_cutoff,
        cfg.calibration.area.min,
        cfg.calibration.area.max,
        cfg.calibration.similarity_gate
    );

    let mut monitor = assemble::field_monitor(&cfg)?;

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let stats = monitor.run(&stop);
    log::info!(
        "trapd stopped: {} detections, {} failures",
        stats.detections,
        stats.failures
    );
    Ok(())
}
