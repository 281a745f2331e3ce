//! count_pests - offline pest counter for bench calibration
//!
//! Runs the same counting path as the daemon over image files, printing one
//! line per image: `<path>\t<mode>\t<count>\t<similarity>`.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use trapwatch::ingest::{CaptureDevice, DirectoryCamera};
use trapwatch::{
    assemble, AreaBounds, CapturePipeline, CropRegion, CycleOutcome, DirectoryArtifactSink,
    LogOnlyUploader, TrapConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Images to count.
    #[arg(required = true)]
    images: Vec<PathBuf>,
    /// Config file for calibration (same format as trapd).
    #[arg(long, env = "TRAP_CONFIG")]
    config: Option<PathBuf>,
    /// Compare every image against this earlier capture.
    #[arg(long, conflicts_with = "sequence")]
    previous: Option<PathBuf>,
    /// Treat the images as consecutive captures, each compared to the one before.
    #[arg(long)]
    sequence: bool,
    /// Crop offsets as top,bottom,left,right.
    #[arg(long, value_parser = parse_crop)]
    crop: Option<CropRegion>,
    /// Intensity at or below which a pixel is foreground.
    #[arg(long)]
    cutoff: Option<u8>,
    /// Smallest region area counted (exclusive).
    #[arg(long)]
    min_area: Option<f64>,
    /// Largest region area counted (exclusive).
    #[arg(long)]
    max_area: Option<f64>,
    /// Similarity above which the difference mask is counted.
    #[arg(long)]
    gate: Option<f64>,
    /// Write binarized images here.
    #[arg(long)]
    debug_dir: Option<PathBuf>,
}

fn parse_crop(value: &str) -> Result<CropRegion, String> {
    let parts: Vec<u32> = value
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("crop offsets must be integers: {}", e))?;
    match parts.as_slice() {
        [top, bottom, left, right] => Ok(CropRegion {
            top: *top,
            bottom: *bottom,
            left: *left,
            right: *right,
        }),
        _ => Err("crop takes exactly four offsets: top,bottom,left,right".to_string()),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let cfg = TrapConfig::load_from(args.config.as_deref())?;
    let mut calibration = cfg.calibration;
    if let Some(crop) = args.crop {
        calibration.crop = crop;
    }
    if let Some(cutoff) = args.cutoff {
        calibration.intensity_cutoff = cutoff;
    }
    calibration.area = AreaBounds::new(
        args.min_area.unwrap_or(calibration.area.min),
        args.max_area.unwrap_or(calibration.area.max),
    );
    if calibration.area.min >= calibration.area.max {
        return Err(anyhow!(
            "min area {} must be below max area {}",
            calibration.area.min,
            calibration.area.max
        ));
    }
    if let Some(gate) = args.gate {
        calibration.similarity_gate = gate;
    }

    let previous = match &args.previous {
        Some(path) => Some(DirectoryCamera::from_paths(vec![path.clone()]).capture()?),
        None => None,
    };

    let mut pipeline = CapturePipeline::new(
        Box::new(DirectoryCamera::from_paths(args.images.clone())),
        Box::new(assemble::segmenter(&calibration)),
        Box::new(LogOnlyUploader),
    )
    .with_differ(assemble::differ(&calibration))
    .with_similarity_gate(calibration.similarity_gate);
    if let Some(dir) = &args.debug_dir {
        pipeline = pipeline.with_artifacts(Box::new(DirectoryArtifactSink::new(dir.clone())?));
    }

    let mut chained = None;
    let mut failures = 0;
    for path in &args.images {
        let baseline = if args.sequence {
            chained.take()
        } else {
            previous.clone()
        };
        let outcome = pipeline.process(baseline);
        if !report(path, &outcome) {
            failures += 1;
        }
        if args.sequence {
            chained = outcome.session;
        }
    }

    if failures > 0 {
        return Err(anyhow!("{} of {} images could not be counted", failures, args.images.len()));
    }
    Ok(())
}

fn report(path: &Path, outcome: &CycleOutcome) -> bool {
    match &outcome.detection {
        Some(detection) => {
            let similarity = detection
                .similarity
                .map(|s| format!("{:.4}", s))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{}\t{}\t{}\t{}",
                path.display(),
                detection.mode.label(),
                detection.count,
                similarity
            );
            true
        }
        None => {
            eprintln!("{}: not counted", path.display());
            false
        }
    }
}
