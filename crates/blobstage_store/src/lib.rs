#![deny(missing_docs)]

//! The object store that blobs are persisted to.
//!
//! [`ObjectStore`] is the narrow capability the upload orchestrator needs:
//! look up an object, upload a local file, download an object and delete one.
//! Keys are opaque strings.
//!
//! Two implementations are provided:
//!
//! * [`OpendalStore`] wraps an [`opendal::Operator`] and can be created for
//!   an S3 bucket ([`S3Config`]) or a local directory.
//! * [`MemoryStore`] keeps every object in memory and counts mutations, which
//!   makes it useful in tests.

#[cfg(feature = "clap")]
pub mod clap;
mod config;
mod memory;
mod metadata;
mod operator;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

pub use config::S3Config;
pub use memory::{MemoryStore, StoredObject};
pub use metadata::ObjectMetadata;
pub use operator::OpendalStore;

/// The content type attached to every uploaded blob.
pub const BLOB_CONTENT_TYPE: &str = "application/gzip";

/// What is known about an object that exists in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStat {
    /// The size of the stored object in bytes.
    pub size: u64,

    /// The blob metadata attached to the object, if the backend keeps it.
    pub metadata: Option<ObjectMetadata>,
}

/// An error returned by an [`ObjectStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The object does not exist.
    #[error("object '{0}' does not exist")]
    NotFound(String),

    /// A local file could not be read or written.
    #[error("failed to access {}", .path.display())]
    Io {
        /// The local path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Streaming an object from the store failed midway.
    #[error("failed to transfer object '{key}'")]
    Transfer {
        /// The key of the object.
        key: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The backend returned an error.
    #[error(transparent)]
    Backend(#[from] opendal::Error),

    /// The store could not be configured.
    #[error("invalid store configuration: {0}")]
    Configuration(String),

    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Operations on a key value object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Looks up the object stored under `key`. Returns `None` if there is no
    /// such object.
    async fn exists_and_stat(&self, key: &str) -> Result<Option<ObjectStat>, StoreError>;

    /// Uploads the file at `source` under `key`, replacing any existing object.
    async fn put(
        &self,
        key: &str,
        source: &Path,
        metadata: &ObjectMetadata,
    ) -> Result<(), StoreError>;

    /// Downloads the object stored under `key` into the file at
    /// `destination` and returns the number of bytes written.
    async fn read(&self, key: &str, destination: &Path) -> Result<u64, StoreError>;

    /// Removes the object stored under `key`. Removing an absent object is
    /// not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
