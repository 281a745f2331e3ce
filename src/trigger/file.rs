use anyhow::{anyhow, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::TriggerSignal;

/// Trigger raised by the presence of a file, e.g. touched over ssh or by a
/// sync agent. Clearing removes the file.
pub struct FileTriggerSignal {
    path: PathBuf,
}

impl FileTriggerSignal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TriggerSignal for FileTriggerSignal {
    fn is_set(&mut self) -> Result<bool> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(anyhow!("failed to stat {}: {}", self.path.display(), e)),
        }
    }

    fn clear(&mut self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            // someone else already consumed it
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow!("failed to remove {}: {}", self.path.display(), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_presence_is_the_signal() {
        let dir = tempfile::tempdir().unwrap();
        let mut signal = FileTriggerSignal::new(dir.path().join("trigger.txt"));
        assert!(!signal.is_set().unwrap());

        std::fs::write(signal.path(), "").unwrap();
        assert!(signal.is_set().unwrap());

        signal.clear().unwrap();
        assert!(!signal.is_set().unwrap());
        assert!(!signal.path().exists());

        // clearing twice is harmless
        signal.clear().unwrap();
    }

    #[test]
    fn directory_at_path_is_not_a_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let mut signal = FileTriggerSignal::new(dir.path());
        assert!(!signal.is_set().unwrap());
    }
}
