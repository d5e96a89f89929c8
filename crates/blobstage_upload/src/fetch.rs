use std::{
    io::Read,
    path::{Path, PathBuf},
};

use blobstage_archive::{unpack, ArchiveError, UnpackSummary};
use blobstage_digest::{HashingReader, Sha256, Sha256Hash};
use blobstage_store::{ObjectStore, StoreError};
use flate2::read::GzDecoder;

use crate::{
    blocking::{run_blocking_task, Cancelled},
    UploadConfig,
};

/// Offset and value of the magic field in a ustar or GNU tar header.
const TAR_MAGIC_OFFSET: usize = 257;
const TAR_MAGIC: &[u8] = b"ustar";

/// An error that can occur while fetching a blob.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// There is no object for the hash.
    #[error("no blob is stored under '{0}'")]
    NotFound(String),

    /// The object could not be downloaded.
    #[error("failed to download '{key}'")]
    Download {
        /// The key of the object.
        key: String,
        /// The error returned by the store.
        #[source]
        source: StoreError,
    },

    /// A local file could not be created, read or written.
    #[error("failed to access {}", .path.display())]
    Io {
        /// The local path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The downloaded archive could not be extracted.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// The content does not match the requested hash.
    #[error("the downloaded content has hash {actual:x} instead of {expected:x}")]
    HashMismatch {
        /// The requested hash.
        expected: Sha256Hash,
        /// The hash of the downloaded content.
        actual: Sha256Hash,
    },

    /// The extraction task was cancelled.
    #[error("the operation was cancelled")]
    Cancelled,
}

impl From<Cancelled> for FetchError {
    fn from(_: Cancelled) -> Self {
        FetchError::Cancelled
    }
}

/// Describes a fetched blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSummary {
    /// The key of the object.
    pub key: String,
    /// Whether the blob was extracted as a directory tree.
    pub is_directory: bool,
    /// The number of bytes downloaded.
    pub compressed_size: u64,
    /// The number of bytes after decompression.
    pub uncompressed_size: u64,
    /// What was extracted, for directory blobs.
    pub unpacked: Option<UnpackSummary>,
}

/// Downloads the blob with the given hash and restores it at `destination`.
///
/// A directory blob is extracted into the directory `destination`; a file
/// blob is written to the file `destination`. Whether the blob is a directory
/// is taken from the object metadata. Stores that do not keep metadata fall
/// back to checking whether the content is a tar archive.
///
/// The decompressed content is hashed while it is restored and compared with
/// `hash`. On a mismatch a restored file is removed again, files extracted
/// from an archive are left in place. The downloaded object is staged in the
/// configured temporary directory and always removed.
pub async fn fetch<S: ObjectStore + ?Sized>(
    store: &S,
    config: &UploadConfig,
    hash: &Sha256Hash,
    destination: &Path,
) -> Result<FetchSummary, FetchError> {
    let key = config.key_for(hash);
    let download_error = |source| FetchError::Download {
        key: key.clone(),
        source,
    };

    let stat = store
        .exists_and_stat(&key)
        .await
        .map_err(download_error)?
        .ok_or_else(|| FetchError::NotFound(key.clone()))?;

    let temp_dir = config
        .staging
        .temp_dir
        .clone()
        .unwrap_or_else(std::env::temp_dir);
    fs_err::create_dir_all(&temp_dir).map_err(|source| FetchError::Io {
        path: temp_dir.clone(),
        source,
    })?;
    let download = tempfile::Builder::new()
        .prefix("fetch")
        .tempfile_in(&temp_dir)
        .map_err(|source| FetchError::Io {
            path: temp_dir.clone(),
            source,
        })?
        .into_temp_path();

    let compressed_size = match store.read(&key, &download).await {
        Ok(size) => size,
        Err(StoreError::NotFound(_)) => return Err(FetchError::NotFound(key)),
        Err(err) => return Err(download_error(err)),
    };
    tracing::debug!("downloaded {key} ({compressed_size} bytes)");

    let known_directory = stat.metadata.map(|metadata| metadata.is_directory);
    let expected = *hash;
    let destination = destination.to_path_buf();
    let (is_directory, uncompressed_size, unpacked) = run_blocking_task(move || {
        let is_directory = match known_directory {
            Some(is_directory) => is_directory,
            None => looks_like_tar(&download)?,
        };
        let restored = restore(&download, &destination, is_directory, &expected)?;
        drop(download);
        Ok::<_, FetchError>((is_directory, restored.0, restored.1))
    })
    .await?;

    Ok(FetchSummary {
        key,
        is_directory,
        compressed_size,
        uncompressed_size,
        unpacked,
    })
}

fn open_decoded(path: &Path) -> Result<GzDecoder<fs_err::File>, FetchError> {
    let file = fs_err::File::open(path).map_err(|source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(GzDecoder::new(file))
}

/// Checks whether the decompressed content starts with a tar header.
fn looks_like_tar(download: &Path) -> Result<bool, FetchError> {
    let mut header = Vec::with_capacity(512);
    open_decoded(download)?
        .take(512)
        .read_to_end(&mut header)
        .map_err(|source| FetchError::Io {
            path: download.to_path_buf(),
            source,
        })?;
    let is_tar = header.len() == 512
        && header[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len()] == *TAR_MAGIC;
    tracing::debug!("blob metadata is unavailable, content is a tar archive: {is_tar}");
    Ok(is_tar)
}

fn restore(
    download: &Path,
    destination: &Path,
    is_directory: bool,
    expected: &Sha256Hash,
) -> Result<(u64, Option<UnpackSummary>), FetchError> {
    let mut reader = HashingReader::<_, Sha256>::new(CountingReader::new(open_decoded(download)?));
    let io_error = |source| FetchError::Io {
        path: destination.to_path_buf(),
        source,
    };

    let unpacked = if is_directory {
        let summary = unpack(&mut reader, destination)?;
        // The archive may be followed by padding the extractor never reads.
        std::io::copy(&mut reader, &mut std::io::sink()).map_err(io_error)?;
        Some(summary)
    } else {
        if let Some(parent) = destination.parent() {
            fs_err::create_dir_all(parent).map_err(io_error)?;
        }
        let mut file = fs_err::File::create(destination).map_err(io_error)?;
        std::io::copy(&mut reader, &mut file).map_err(io_error)?;
        None
    };

    let (counter, actual) = reader.finalize();
    if actual != *expected {
        if !is_directory {
            if let Err(err) = fs_err::remove_file(destination) {
                tracing::warn!("failed to remove corrupt download: {err}");
            }
        }
        return Err(FetchError::HashMismatch {
            expected: *expected,
            actual,
        });
    }

    Ok((counter.count, unpacked))
}

/// Counts the bytes read through it.
struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R> CountingReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.count += read as u64;
        Ok(read)
    }
}
