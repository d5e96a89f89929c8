use std::{error::Error, fmt, sync::Arc};

use blobstage_digest::Sha256Hash;
use blobstage_staging::{Blob, ProgressObserver};
use blobstage_store::{ObjectMetadata, ObjectStore};

use crate::{
    blocking::run_blocking_task, check_duplicate, reporter::ReporterObserver, ItemError,
    Reporter, UploadConfig, UploadError, UploadItem,
};

/// What happened to a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    /// The blob was written to the store.
    Uploaded,
    /// An identical object already existed, nothing was written.
    SkippedDuplicate,
}

/// A successfully processed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// The key of the object in the store.
    pub key: String,
    /// The content hash of the blob.
    pub hash: Sha256Hash,
    /// The display label of the blob.
    pub reference: String,
    /// Whether the blob is an archive of a directory tree.
    pub is_directory: bool,
    /// The size of the stored object.
    pub compressed_size: u64,
    /// The size of the content before compression.
    pub uncompressed_size: u64,
    /// Whether the blob was uploaded or skipped.
    pub status: UploadStatus,
}

impl UploadOutcome {
    fn new(key: String, blob: &Blob, status: UploadStatus) -> Self {
        Self {
            key,
            hash: *blob.hash(),
            reference: blob.reference().to_string(),
            is_directory: blob.is_directory(),
            compressed_size: blob.compressed_size(),
            uncompressed_size: blob.uncompressed_size(),
            status,
        }
    }
}

/// The result of one item of a batch.
#[derive(Debug)]
pub struct ItemReport {
    /// The label of the item.
    pub reference: String,
    /// The outcome or the reason the item failed.
    pub result: Result<UploadOutcome, ItemError>,
}

impl ItemReport {
    /// Returns true if the item failed.
    pub fn is_err(&self) -> bool {
        self.result.is_err()
    }
}

impl fmt::Display for ItemReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            Ok(outcome) => {
                let action = match outcome.status {
                    UploadStatus::Uploaded => "uploaded",
                    UploadStatus::SkippedDuplicate => "skipped duplicate",
                };
                write!(
                    f,
                    "{action} {} as {} ({} bytes, {} compressed)",
                    self.reference,
                    outcome.key,
                    outcome.uncompressed_size,
                    outcome.compressed_size
                )
            }
            Err(err) => {
                write!(f, "error {}: {err}", self.reference)?;
                let mut source = err.source();
                while let Some(cause) = source {
                    write!(f, ": {cause}")?;
                    source = cause.source();
                }
                Ok(())
            }
        }
    }
}

/// Stages items and uploads them to a store unless they already exist.
pub struct Uploader<'a, S: ?Sized> {
    store: &'a S,
    config: &'a UploadConfig,
    reporter: Option<Arc<dyn Reporter>>,
}

impl<'a, S: ObjectStore + ?Sized> Uploader<'a, S> {
    /// Creates an uploader that writes to `store`.
    pub fn new(store: &'a S, config: &'a UploadConfig) -> Self {
        Self {
            store,
            config,
            reporter: None,
        }
    }

    /// Reports the progress of every item to `reporter`.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Stages and uploads a single item.
    ///
    /// The item is staged on the blocking thread pool. The resulting blob is
    /// passed to [`Uploader::upload_blob`].
    pub async fn upload(&self, item: UploadItem) -> Result<UploadOutcome, ItemError> {
        let index = self
            .reporter
            .as_ref()
            .map(|reporter| reporter.on_item_start(&item.reference));
        let observer = match (&self.reporter, index) {
            (Some(reporter), Some(index)) => Some(Box::new(ReporterObserver::new(
                reporter.clone(),
                index,
            )) as Box<dyn ProgressObserver>),
            _ => None,
        };

        let options = self.config.staging.clone();
        let staged = run_blocking_task(move || item.stage(&options, observer)).await;
        let result = match staged {
            Ok(blob) => self.upload_blob(blob).await,
            Err(err) => Err(err),
        };

        if let (Some(reporter), Some(index)) = (&self.reporter, index) {
            reporter.on_item_complete(index);
        }
        result
    }

    /// Uploads a staged blob unless an identical object already exists.
    ///
    /// The staging file of the blob is removed before this function returns,
    /// regardless of the outcome. If writing to the store fails the partially
    /// written object is deleted on a best effort basis.
    pub async fn upload_blob(&self, blob: Blob) -> Result<UploadOutcome, ItemError> {
        let key = self.config.key_for(blob.hash());

        let result = if check_duplicate(self.store, &key, &blob).await.is_duplicate() {
            tracing::info!("skipping {}, {key} already exists", blob.reference());
            Ok(UploadOutcome::new(key, &blob, UploadStatus::SkippedDuplicate))
        } else {
            match self.put(&key, &blob).await {
                Ok(()) => {
                    tracing::info!("uploaded {} to {key}", blob.reference());
                    Ok(UploadOutcome::new(key, &blob, UploadStatus::Uploaded))
                }
                Err(err) => Err(err.into()),
            }
        };

        let staging = blob.path().to_path_buf();
        if let Err(err) = blob.discard() {
            tracing::warn!(
                "failed to remove staging file {}: {err}",
                staging.display()
            );
        }

        result
    }

    async fn put(&self, key: &str, blob: &Blob) -> Result<(), UploadError> {
        let metadata = ObjectMetadata {
            uncompressed_size: blob.uncompressed_size(),
            reference: blob.reference().to_string(),
            is_directory: blob.is_directory(),
        };

        match self.store.put(key, blob.path(), &metadata).await {
            Ok(()) => Ok(()),
            Err(source) => {
                // Do not leave a truncated object behind under a content
                // address. A failure here must not hide the original error.
                if let Err(err) = self.store.delete(key).await {
                    tracing::debug!("failed to remove partially uploaded {key}: {err}");
                }
                Err(UploadError {
                    key: key.to_string(),
                    source,
                })
            }
        }
    }

    /// Processes items one after the other and reports the outcome of each.
    /// A failing item does not stop the batch.
    pub async fn upload_batch(
        &self,
        items: impl IntoIterator<Item = UploadItem>,
    ) -> Vec<ItemReport> {
        let mut reports = Vec::new();
        for item in items {
            let reference = item.reference.clone();
            let result = self.upload(item).await;
            if let Err(err) = &result {
                tracing::error!("failed to upload {reference}: {err}");
            }
            reports.push(ItemReport { reference, result });
        }
        reports
    }
}
