use blobstage_archive::ArchiveError;
use blobstage_staging::StagingError;
use blobstage_store::StoreError;

use crate::blocking::Cancelled;

/// Writing a staged blob to the store failed.
#[derive(Debug, thiserror::Error)]
#[error("failed to upload blob to '{key}'")]
pub struct UploadError {
    /// The key the blob was written to.
    pub key: String,
    /// The error returned by the store.
    #[source]
    pub source: StoreError,
}

/// The reason a single upload item failed.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    /// The blob could not be staged locally.
    #[error(transparent)]
    Staging(#[from] StagingError),

    /// The archive of the item could not be built.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// The staged blob could not be written to the store.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// The staging task was cancelled.
    #[error("the operation was cancelled")]
    Cancelled,
}

impl From<Cancelled> for ItemError {
    fn from(_: Cancelled) -> Self {
        ItemError::Cancelled
    }
}
