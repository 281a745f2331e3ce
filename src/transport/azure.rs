//! Azure Storage upload over the REST API.
//!
//! Both endpoints are SAS-signed URLs supplied by configuration, so no account
//! key ever lives on the device:
//! - blob container URL, e.g. `https://acct.blob.core.windows.net/devicetest01?sv=...`
//! - table URL, e.g. `https://acct.table.core.windows.net/ImageMetadata?sv=...`
//!
//! Images go up with Put Blob (overwriting), records with Insert Or Replace
//! Entity. The SAS query is kept on request URLs and stripped from the image URL
//! stored in the record.

use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use url::Url;

use super::{ImageRecord, UploadReceipt, UploadRequest, UploadSink};
use crate::error::FailureKind;

const BLOB_API_VERSION: &str = "2019-12-12";
const TABLE_API_VERSION: &str = "2019-02-02";

#[derive(Clone, Debug)]
pub struct AzureConfig {
    pub blob_container_url: String,
    pub table_url: String,
    /// Applies to each HTTP call (connect + transfer).
    pub timeout: Duration,
}

pub struct AzureUploader {
    agent: ureq::Agent,
    container: Url,
    table: Url,
}

impl AzureUploader {
    pub fn new(config: AzureConfig) -> Result<Self> {
        let container = Url::parse(&config.blob_container_url)
            .context("parse blob container url")?;
        let table = Url::parse(&config.table_url).context("parse table url")?;
        Ok(Self {
            agent: agent(config.timeout),
            container,
            table,
        })
    }

    fn put_blob(&self, name: &str, bytes: &[u8]) -> Result<Url> {
        let url = blob_url(&self.container, name)?;
        self.agent
            .put(url.as_str())
            .set("x-ms-blob-type", "BlockBlob")
            .set("x-ms-version", BLOB_API_VERSION)
            .set("Content-Type", "image/jpeg")
            .send_bytes(bytes)
            .map_err(describe)
            .with_context(|| format!("put blob {}", name))?;
        Ok(url)
    }

    fn upsert_entity(&self, record: &ImageRecord) -> Result<()> {
        let url = entity_url(&self.table, &record.partition_key, &record.row_key);
        let body = serde_json::to_string(record)?;
        self.agent
            .put(url.as_str())
            .set("x-ms-version", TABLE_API_VERSION)
            .set("Content-Type", "application/json")
            .set("Accept", "application/json;odata=nometadata")
            .send_string(&body)
            .map_err(describe)
            .with_context(|| format!("upsert entity {}", record.row_key))?;
        Ok(())
    }
}

impl UploadSink for AzureUploader {
    fn upload(&mut self, request: &UploadRequest) -> Result<UploadReceipt> {
        let name = request.file_name();
        let bytes = std::fs::read(&request.image_path)
            .map_err(|e| anyhow!("failed to read {}: {}", request.image_path.display(), e))
            .context(FailureKind::Upload)?;

        let url = self.put_blob(&name, &bytes).context(FailureKind::Upload)?;
        let location = public_url(&url);
        log::info!("uploaded {} to {}", name, location);

        let record = ImageRecord::new(request, location.clone());
        self.upsert_entity(&record).context(FailureKind::Metadata)?;
        log::info!("metadata record upserted for {}", name);

        Ok(UploadReceipt { location, record })
    }
}

pub(crate) fn agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(timeout).build()
}

/// `<container>/<name>?<sas>`
pub(crate) fn blob_url(container: &Url, name: &str) -> Result<Url> {
    let mut url = container.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow!("container url {} cannot carry a path", container))?
        .pop_if_empty()
        .push(name);
    Ok(url)
}

/// `<table>(PartitionKey='..',RowKey='..')?<sas>`
fn entity_url(table: &Url, partition_key: &str, row_key: &str) -> Url {
    let mut url = table.clone();
    let path = format!(
        "{}(PartitionKey='{}',RowKey='{}')",
        table.path().trim_end_matches('/'),
        odata_quote(partition_key),
        odata_quote(row_key)
    );
    url.set_path(&path);
    url
}

fn odata_quote(value: &str) -> String {
    value.replace('\'', "''")
}

/// URL without the SAS signature.
fn public_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

/// Flatten a ureq error, keeping the service's error body when there is one.
pub(crate) fn describe(err: ureq::Error) -> anyhow::Error {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            anyhow!("http status {}: {}", code, body.trim())
        }
        ureq::Error::Transport(t) => anyhow!("transport error: {}", t),
    }
}
