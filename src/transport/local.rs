use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::{ImageRecord, UploadReceipt, UploadRequest, UploadSink};
use crate::error::FailureKind;
use crate::storage::MetadataStore;

/// Archives images into a directory and records them in a local store.
///
/// Used on units without connectivity; a sync job can ship the archive later.
pub struct LocalArchiveUploader {
    archive_dir: PathBuf,
    store: Box<dyn MetadataStore>,
}

impl LocalArchiveUploader {
    pub fn new(archive_dir: impl Into<PathBuf>, store: Box<dyn MetadataStore>) -> Result<Self> {
        let archive_dir = archive_dir.into();
        std::fs::create_dir_all(&archive_dir).map_err(|e| {
            anyhow!(
                "failed to create archive directory {}: {}",
                archive_dir.display(),
                e
            )
        })?;
        Ok(Self { archive_dir, store })
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    pub fn store(&self) -> &dyn MetadataStore {
        self.store.as_ref()
    }
}

impl UploadSink for LocalArchiveUploader {
    fn upload(&mut self, request: &UploadRequest) -> Result<UploadReceipt> {
        let dest = self.archive_dir.join(request.file_name());
        // the capture directory may already be the archive
        if dest != request.image_path {
            std::fs::copy(&request.image_path, &dest)
                .map_err(|e| {
                    anyhow!(
                        "failed to archive {} to {}: {}",
                        request.image_path.display(),
                        dest.display(),
                        e
                    )
                })
                .context(FailureKind::Upload)?;
        }
        let location = dest.to_string_lossy().into_owned();
        log::info!("archived {}", location);

        let record = ImageRecord::new(request, location.clone());
        self.store
            .upsert(&record)
            .context(FailureKind::Metadata)?;
        log::info!("metadata record stored for {}", record.file_name);

        Ok(UploadReceipt { location, record })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::failure_kind;
    use crate::storage::InMemoryMetadataStore;
    use chrono::Utc;

    #[test]
    fn copies_image_and_records_it() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("20240512-101500.jpg");
        std::fs::write(&image, b"jpeg bytes").unwrap();

        let mut sink =
            LocalArchiveUploader::new(dir.path().join("archive"), Box::new(InMemoryMetadataStore::new()))
                .unwrap();
        let receipt = sink
            .upload(&UploadRequest {
                image_path: image,
                description: "Time: 10:15:00\nPest category: Weevil\nNumber: 2".to_string(),
                count: 2,
                timestamp: Utc::now(),
            })
            .unwrap();

        let archived = dir.path().join("archive").join("20240512-101500.jpg");
        assert_eq!(std::fs::read(&archived).unwrap(), b"jpeg bytes");
        assert_eq!(receipt.location, archived.to_string_lossy());
        let stored = sink.store().get("20240512-101500.jpg").unwrap().unwrap();
        assert_eq!(stored, receipt.record);
        assert_eq!(stored.count, 2);
    }

    #[test]
    fn missing_image_is_upload_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink =
            LocalArchiveUploader::new(dir.path(), Box::new(InMemoryMetadataStore::new())).unwrap();
        let err = sink
            .upload(&UploadRequest {
                image_path: dir.path().join("elsewhere").join("gone.jpg"),
                description: String::new(),
                count: 0,
                timestamp: Utc::now(),
            })
            .unwrap_err();
        assert_eq!(failure_kind(&err), Some(FailureKind::Upload));
        assert!(sink.store().list().unwrap().is_empty());
    }
}
