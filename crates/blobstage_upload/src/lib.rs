#![deny(missing_docs)]

//! Content addressed uploads.
//!
//! Every [`UploadItem`] (a file, a directory tree, a zip archive or a set of
//! named payloads) is staged into a single compressed [`Blob`] whose key in
//! the object store is derived from the SHA-256 hash of its uncompressed
//! bytes. Before anything is written to the store, [`check_duplicate`] looks
//! for an object under that key with the same compressed size; if one exists
//! the upload is skipped.
//!
//! The [`Uploader`] runs this protocol for one item or a batch of items and
//! guarantees that the local staging file is removed on every path. Blobs can
//! be restored with [`fetch`].
//!
//! [`Blob`]: blobstage_staging::Blob

mod blocking;
mod dedup;
mod error;
mod fetch;
mod item;
mod reporter;
mod upload;

use blobstage_digest::Sha256Hash;
use blobstage_staging::StagingOptions;

pub use dedup::{check_duplicate, DedupDecision, DedupLookupError};
pub use error::{ItemError, UploadError};
pub use fetch::{fetch, FetchError, FetchSummary};
pub use item::{UploadItem, UploadMode, UploadSource};
pub use reporter::Reporter;
pub use upload::{ItemReport, UploadOutcome, UploadStatus, Uploader};

/// The namespace under which blobs are stored unless configured otherwise.
pub const DEFAULT_KEY_PREFIX: &str = "blob";

/// Settings shared by every upload. Built once and passed by reference.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// The namespace prefix of every key.
    pub key_prefix: String,

    /// Where and how blobs are staged locally.
    pub staging: StagingOptions,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            staging: StagingOptions::default(),
        }
    }
}

impl UploadConfig {
    /// Returns the key under which the blob with the given hash is stored.
    pub fn key_for(&self, hash: &Sha256Hash) -> String {
        key_for_hash(&self.key_prefix, hash)
    }
}

/// Returns `<prefix>/<lowercase hex hash>.gz`.
pub fn key_for_hash(prefix: &str, hash: &Sha256Hash) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        format!("{hash:x}.gz")
    } else {
        format!("{prefix}/{hash:x}.gz")
    }
}
