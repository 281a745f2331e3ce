use anyhow::{anyhow, Result};
use std::path::PathBuf;

/// Light that is switched on around each capture.
pub trait Indicator {
    fn set(&mut self, on: bool) -> Result<()>;
}

/// No light attached.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoIndicator;

impl Indicator for NoIndicator {
    fn set(&mut self, _on: bool) -> Result<()> {
        Ok(())
    }
}

/// LED strip driven through the legacy sysfs GPIO interface.
pub struct SysfsGpioIndicator {
    pin: u32,
    value_path: PathBuf,
}

impl SysfsGpioIndicator {
    /// Export `pin` (if needed) and configure it as an output.
    pub fn open(pin: u32) -> Result<Self> {
        Self::open_at(PathBuf::from("/sys/class/gpio"), pin)
    }

    pub fn open_at(root: PathBuf, pin: u32) -> Result<Self> {
        let pin_dir = root.join(format!("gpio{}", pin));
        if !pin_dir.exists() {
            std::fs::write(root.join("export"), pin.to_string())
                .map_err(|e| anyhow!("failed to export gpio {}: {}", pin, e))?;
        }
        std::fs::write(pin_dir.join("direction"), "out")
            .map_err(|e| anyhow!("failed to set gpio {} direction: {}", pin, e))?;
        Ok(Self {
            pin,
            value_path: pin_dir.join("value"),
        })
    }
}

impl Indicator for SysfsGpioIndicator {
    fn set(&mut self, on: bool) -> Result<()> {
        std::fs::write(&self.value_path, if on { "1" } else { "0" })
            .map_err(|e| anyhow!("failed to drive gpio {}: {}", self.pin, e))?;
        log::info!("LED {}", if on { "on" } else { "off" });
        Ok(())
    }
}
