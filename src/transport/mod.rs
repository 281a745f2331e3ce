//! Upload of captured images and their metadata records.
//!
//! Every successful count hands an `UploadRequest` to an `UploadSink`:
//! - `AzureUploader` (feature `azure`) puts the image in a blob container and
//!   upserts the record into a table, both through SAS-signed URLs.
//! - `LocalArchiveUploader` copies the image into an archive directory and
//!   upserts the record into a local `MetadataStore`.
//!
//! Upload runs synchronously inside the capture cycle. A failed upload is logged
//! by the caller and never retried within the cycle.

#[cfg(feature = "azure")]
pub mod azure;
mod local;

#[cfg(feature = "azure")]
pub use azure::{AzureConfig, AzureUploader};
pub use local::LocalArchiveUploader;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Partition all image rows share.
pub const PARTITION_KEY: &str = "ImageDescription";
/// The one pest class this trap is calibrated for.
pub const PEST_CATEGORY: &str = "Weevil";

/// Metadata row for one uploaded image. Unique by `file_name` (the row key).
///
/// Field names on the wire follow the table schema the dashboard reads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    #[serde(rename = "PartitionKey")]
    pub partition_key: String,
    #[serde(rename = "RowKey")]
    pub row_key: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "ImageUrl")]
    pub image_url: String,
    #[serde(rename = "FileName")]
    pub file_name: String,
    /// ISO-8601 UTC, `Z` suffixed.
    #[serde(rename = "TS")]
    pub timestamp: String,
    #[serde(rename = "Weevil_number")]
    pub count: u32,
}

impl ImageRecord {
    pub fn new(request: &UploadRequest, image_url: impl Into<String>) -> Self {
        let file_name = request.file_name();
        Self {
            partition_key: PARTITION_KEY.to_string(),
            row_key: file_name.clone(),
            category: PEST_CATEGORY.to_string(),
            description: request.description.clone(),
            image_url: image_url.into(),
            file_name,
            timestamp: iso_timestamp(request.timestamp),
            count: request.count,
        }
    }
}

pub fn iso_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// What the pipeline hands over after counting.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadRequest {
    pub image_path: PathBuf,
    pub description: String,
    pub count: u32,
    pub timestamp: DateTime<Utc>,
}

impl UploadRequest {
    /// Name the image is stored under, and the record key.
    pub fn file_name(&self) -> String {
        file_name_of(&self.image_path)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[derive(Clone, Debug, PartialEq)]
pub struct UploadReceipt {
    /// Where the image ended up (URL or archive path).
    pub location: String,
    pub record: ImageRecord,
}

pub trait UploadSink {
    fn upload(&mut self, request: &UploadRequest) -> Result<UploadReceipt>;
}

impl<T: UploadSink + ?Sized> UploadSink for Box<T> {
    fn upload(&mut self, request: &UploadRequest) -> Result<UploadReceipt> {
        (**self).upload(request)
    }
}

/// Sink for units without connectivity: counts are only logged.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogOnlyUploader;

impl UploadSink for LogOnlyUploader {
    fn upload(&mut self, request: &UploadRequest) -> Result<UploadReceipt> {
        let location = request.image_path.to_string_lossy().into_owned();
        log::info!("upload disabled; keeping {} locally", location);
        Ok(UploadReceipt {
            record: ImageRecord::new(request, location.clone()),
            location,
        })
    }
}
