use anyhow::{Context, Result};
use std::time::Duration;
use url::Url;

use super::TriggerSignal;
use crate::transport::azure::{agent, blob_url, describe};

/// Blob the dashboard drops to request a capture.
pub const DEFAULT_TRIGGER_BLOB: &str = "trigger.txt";

/// Remote trigger held as a blob in a SAS-signed container.
///
/// Set = the blob exists (`HEAD` succeeds). Clear = `DELETE` it.
pub struct BlobTriggerSignal {
    agent: ureq::Agent,
    url: Url,
}

impl BlobTriggerSignal {
    pub fn new(container_url: &str, blob_name: &str, timeout: Duration) -> Result<Self> {
        let container = Url::parse(container_url).context("parse trigger container url")?;
        Ok(Self {
            agent: agent(timeout),
            url: blob_url(&container, blob_name)?,
        })
    }
}

impl TriggerSignal for BlobTriggerSignal {
    fn is_set(&mut self) -> Result<bool> {
        match self.agent.head(self.url.as_str()).call() {
            Ok(_) => Ok(true),
            Err(ureq::Error::Status(404, _)) => Ok(false),
            Err(e) => Err(describe(e).context("poll trigger blob")),
        }
    }

    fn clear(&mut self) -> Result<()> {
        match self.agent.delete(self.url.as_str()).call() {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(404, _)) => Ok(()),
            Err(e) => Err(describe(e).context("delete trigger blob")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparseable_container_url() {
        assert!(BlobTriggerSignal::new("not a url", DEFAULT_TRIGGER_BLOB, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn unreachable_store_is_an_error_not_a_trigger() {
        // port 9 on loopback: connection refused
        let mut signal = BlobTriggerSignal::new(
            "http://127.0.0.1:9/assets?sig=x",
            DEFAULT_TRIGGER_BLOB,
            Duration::from_millis(500),
        )
        .unwrap();
        assert!(signal.is_set().is_err());
    }
}
