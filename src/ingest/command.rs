//! Still camera driven by an external capture command.
//!
//! The field unit takes stills with `libcamera-still`. Each capture:
//! - switches the indicator light on and waits for the scene to settle
//! - runs the command with `{output}` replaced by a timestamped path
//! - switches the light off again, whatever the command did
//! - decodes the written file into a `Frame`
//!
//! The command is killed if it runs past the configured timeout.

use anyhow::{anyhow, Context, Result};
use chrono::{Local, Utc};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use super::indicator::Indicator;
use super::CaptureDevice;
use crate::error::FailureKind;
use crate::frame::Frame;

pub const DEFAULT_CAPTURE_COMMAND: &str = "libcamera-still -n -o {output} --autofocus-mode auto";
const OUTPUT_PLACEHOLDER: &str = "{output}";
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug)]
pub struct CommandCameraConfig {
    /// Command template; whitespace separated, `{output}` marks the file argument.
    pub command: String,
    /// Directory the stills are written to.
    pub save_dir: PathBuf,
    /// Upper bound on one command run.
    pub timeout: Duration,
    /// Time the light is on before the shutter fires.
    pub warmup: Duration,
}

impl Default for CommandCameraConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_CAPTURE_COMMAND.to_string(),
            save_dir: PathBuf::from("captures"),
            timeout: Duration::from_secs(20),
            warmup: Duration::from_secs(2),
        }
    }
}

pub struct CommandCamera {
    config: CommandCameraConfig,
    program: String,
    args: Vec<String>,
    indicator: Box<dyn Indicator>,
    captures: u64,
}

impl CommandCamera {
    pub fn new(config: CommandCameraConfig, indicator: Box<dyn Indicator>) -> Result<Self> {
        let mut parts = config.command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| anyhow!("capture command is empty"))?;
        let args: Vec<String> = parts.collect();
        if !args.iter().any(|a| a.contains(OUTPUT_PLACEHOLDER)) {
            return Err(anyhow!(
                "capture command must contain {} to receive the output path",
                OUTPUT_PLACEHOLDER
            ));
        }
        std::fs::create_dir_all(&config.save_dir).map_err(|e| {
            anyhow!(
                "failed to create capture directory {}: {}",
                config.save_dir.display(),
                e
            )
        })?;
        Ok(Self {
            config,
            program,
            args,
            indicator,
            captures: 0,
        })
    }

    pub fn captures(&self) -> u64 {
        self.captures
    }

    fn next_output_path(&self) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d-%H%M%S");
        let mut path = self.config.save_dir.join(format!("{}.jpg", stamp));
        // two captures inside the same second must not overwrite each other
        let mut n = 1;
        while path.exists() {
            path = self.config.save_dir.join(format!("{}-{}.jpg", stamp, n));
            n += 1;
        }
        path
    }

    fn run_command(&self, output: &Path) -> Result<()> {
        let output_arg = output.to_string_lossy();
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace(OUTPUT_PLACEHOLDER, &output_arg))
            .collect();
        log::info!("executing capture command: {} {}", self.program, args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| anyhow!("failed to start {}: {}", self.program, e))?;

        let deadline = Instant::now() + self.config.timeout;
        loop {
            if let Some(status) = child.try_wait().context("wait for capture command")? {
                if status.success() {
                    return Ok(());
                }
                return Err(anyhow!("{} exited with {}", self.program, status));
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(anyhow!(
                    "{} timed out after {:?}",
                    self.program,
                    self.config.timeout
                ));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn switch_light(&mut self, on: bool) {
        if let Err(e) = self.indicator.set(on) {
            log::warn!("indicator: {}", e);
        }
    }
}

impl CaptureDevice for CommandCamera {
    fn capture(&mut self) -> Result<Frame> {
        let output = self.next_output_path();

        self.switch_light(true);
        std::thread::sleep(self.config.warmup);
        let ran = self.run_command(&output);
        self.switch_light(false);
        ran.context(FailureKind::Capture)?;

        if !output.is_file() {
            return Err(anyhow!(
                "image file {} does not exist or is not a file",
                output.display()
            ))
            .context(FailureKind::Capture);
        }
        log::info!("captured {}", output.display());
        self.captures += 1;
        Frame::open(&output, Utc::now())
    }
}
