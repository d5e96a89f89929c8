#![deny(missing_docs)]

//! Local staging of blobs.
//!
//! A [`BlobWriter`] accepts the uncompressed bytes of one blob and, in a
//! single pass over every chunk,
//!
//! 1. gzip-compresses the chunk into a temporary staging file,
//! 2. feeds the chunk to a SHA-256 hasher,
//! 3. counts the uncompressed bytes, and
//! 4. reports progress to an optional [`ProgressObserver`].
//!
//! The number of compressed bytes that reach the staging file is counted
//! below the compressor. [`BlobWriter::finish`] flushes the compressor's
//! trailing bytes and produces a [`Blob`] whose hash and sizes are frozen.
//!
//! The staging file is owned by the writer and then by the [`Blob`]; it is
//! deleted when either is dropped, so it never outlives the processing of the
//! item it belongs to.
//!
//! ```no_run
//! use std::io::Write;
//! use blobstage_staging::{BlobWriter, StagingOptions};
//!
//! let mut writer = BlobWriter::create(&StagingOptions::default()).unwrap();
//! writer.write_all(b"hello").unwrap();
//! let blob = writer.finish().unwrap();
//! println!("{:x} ({} bytes)", blob.hash(), blob.uncompressed_size());
//! ```

mod sink;

use std::{
    fmt,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use blobstage_digest::{digest::Digest, Sha256, Sha256Hash};
use flate2::write::GzEncoder;
use tempfile::TempPath;

use sink::{fan_out, ByteCounter, CountingWriter, ObserverSink};

/// An error that occurs while staging a blob locally.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    /// The staging file could not be created.
    #[error("could not create a staging file in {}", .path.display())]
    Create {
        /// The directory the staging file was created in.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The input could not be read.
    #[error("failed to read the blob contents")]
    Read(#[source] std::io::Error),

    /// Compressing into or writing the staging file failed.
    #[error("failed to write the staging file")]
    Write(#[source] std::io::Error),

    /// Flushing the compressor or closing the staging file failed.
    #[error("failed to finalize the staging file")]
    Finalize(#[source] std::io::Error),

    /// A previous write failed; the writer cannot produce a blob anymore.
    #[error("the staging writer failed earlier and cannot be finalized")]
    Poisoned,

    /// The requested compression level is out of range.
    #[error("gzip compression level must be between 1 and 9, got {0}")]
    InvalidCompressionLevel(u32),
}

/// Select the gzip compression level for staged blobs.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    /// Use the lowest compression level (1).
    Lowest,
    /// Use the highest compression level (9).
    Highest,
    /// Use the default compression level (9).
    #[default]
    Default,
    /// Use a numeric compression level (1-9).
    Numeric(u32),
}

impl CompressionLevel {
    fn to_gzip_level(self) -> Result<flate2::Compression, StagingError> {
        match self {
            CompressionLevel::Lowest => Ok(flate2::Compression::fast()),
            CompressionLevel::Highest | CompressionLevel::Default => {
                Ok(flate2::Compression::best())
            }
            CompressionLevel::Numeric(n) => {
                if (1..=9).contains(&n) {
                    Ok(flate2::Compression::new(n))
                } else {
                    Err(StagingError::InvalidCompressionLevel(n))
                }
            }
        }
    }
}

/// Options that control where and how blobs are staged.
#[derive(Debug, Clone, Default)]
pub struct StagingOptions {
    /// Directory for staging files. Defaults to the system temporary
    /// directory.
    pub temp_dir: Option<PathBuf>,

    /// The gzip compression level.
    pub compression: CompressionLevel,
}

impl StagingOptions {
    fn staging_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Receives the number of uncompressed bytes accepted by a [`BlobWriter`].
///
/// The observer has no influence on the produced blob.
pub trait ProgressObserver: Send {
    /// Called after every chunk with the number of bytes in that chunk.
    fn on_progress(&mut self, bytes: u64);

    /// Called once the blob has been finalized.
    fn on_finish(&mut self) {}
}

/// The destination of the compressed bytes, normally the staging file.
type StagingSink = Box<dyn Write + Send>;

/// A writer that stages one blob. See the [crate documentation](crate).
pub struct BlobWriter {
    is_directory: bool,
    reference: String,
    staging: TempPath,
    encoder: GzEncoder<CountingWriter<StagingSink>>,
    hasher: Sha256,
    uncompressed: ByteCounter,
    observer: Option<Box<dyn ProgressObserver>>,
    poisoned: bool,
}

impl BlobWriter {
    /// Creates a new staging file and returns a writer for it.
    ///
    /// Call [`BlobWriter::finish`] to obtain the [`Blob`]. If the writer is
    /// dropped instead, the staging file is deleted.
    pub fn create(options: &StagingOptions) -> Result<Self, StagingError> {
        let level = options.compression.to_gzip_level()?;
        let dir = options.staging_dir();
        let create_error = |source| StagingError::Create {
            path: dir.clone(),
            source,
        };

        fs_err::create_dir_all(&dir).map_err(create_error)?;
        let (file, staging) = tempfile::Builder::new()
            .prefix("blob")
            .tempfile_in(&dir)
            .map_err(create_error)?
            .into_parts();

        tracing::trace!("staging blob in {}", staging.display());

        Ok(Self::from_parts(staging, Box::new(file), level))
    }

    fn from_parts(staging: TempPath, sink: StagingSink, level: flate2::Compression) -> Self {
        Self {
            is_directory: false,
            reference: String::new(),
            staging,
            encoder: GzEncoder::new(CountingWriter::new(sink), level),
            hasher: Sha256::default(),
            uncompressed: ByteCounter::default(),
            observer: None,
            poisoned: false,
        }
    }

    /// Sets the human-readable label of the blob.
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    /// Marks the blob as an archive of a directory tree.
    pub fn with_directory(mut self, is_directory: bool) -> Self {
        self.is_directory = is_directory;
        self
    }

    /// Attaches an observer that is told about every accepted chunk.
    pub fn with_observer(mut self, observer: Box<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The location of the staging file.
    pub fn path(&self) -> &Path {
        &self.staging
    }

    /// Returns true if a previous write failed.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Flushes the compressor, closes the staging file and returns the blob.
    pub fn finish(self) -> Result<Blob, StagingError> {
        if self.poisoned {
            return Err(StagingError::Poisoned);
        }

        let counting = self.encoder.finish().map_err(StagingError::Finalize)?;
        let compressed_size = counting.count();
        let mut file = counting.into_inner();
        file.flush().map_err(StagingError::Finalize)?;
        drop(file);

        if let Some(mut observer) = self.observer {
            observer.on_finish();
        }

        Ok(Blob {
            is_directory: self.is_directory,
            reference: self.reference,
            hash: self.hasher.finalize(),
            compressed_size,
            uncompressed_size: self.uncompressed.count(),
            staging: self.staging,
        })
    }
}

impl Write for BlobWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.poisoned {
            return Err(std::io::Error::other("the staging writer failed earlier"));
        }

        // Only the encoder can fail. It comes first so that the hash and the
        // counters never observe a chunk that did not reach the staging file.
        let mut observer = ObserverSink(self.observer.as_deref_mut());
        let result = fan_out(
            &mut [
                &mut self.encoder,
                &mut self.hasher,
                &mut self.uncompressed,
                &mut observer,
            ],
            buf,
        );

        match result {
            Ok(()) => Ok(buf.len()),
            Err(err) => {
                self.poisoned = true;
                Err(err)
            }
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.encoder.flush()
    }
}

/// Copies everything from `reader` into a new staging file and returns the
/// finalized blob.
pub fn write_blob(
    options: &StagingOptions,
    reference: impl Into<String>,
    reader: &mut impl Read,
    observer: Option<Box<dyn ProgressObserver>>,
) -> Result<Blob, StagingError> {
    let mut writer = BlobWriter::create(options)?.with_reference(reference);
    if let Some(observer) = observer {
        writer = writer.with_observer(observer);
    }

    match std::io::copy(reader, &mut writer) {
        Ok(_) => writer.finish(),
        Err(err) if writer.is_poisoned() => Err(StagingError::Write(err)),
        Err(err) => Err(StagingError::Read(err)),
    }
}

/// A finalized blob whose compressed bytes live in a local staging file.
///
/// Two blobs are equal if their content hashes are equal; the reference
/// label does not take part in the comparison.
pub struct Blob {
    is_directory: bool,
    reference: String,
    hash: Sha256Hash,
    compressed_size: u64,
    uncompressed_size: u64,
    staging: TempPath,
}

impl Blob {
    /// True if the blob is an archive of a directory tree.
    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    /// The human-readable label of the blob. Display only.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// The SHA-256 hash of the uncompressed contents.
    pub fn hash(&self) -> &Sha256Hash {
        &self.hash
    }

    /// The number of bytes in the staging file.
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    /// The number of bytes that were written to the blob.
    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    /// The location of the staging file.
    pub fn path(&self) -> &Path {
        &self.staging
    }

    /// Deletes the staging file, reporting failures that dropping the blob
    /// would silently ignore.
    pub fn discard(self) -> std::io::Result<()> {
        self.staging.close()
    }
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Blob {}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("hash", &format_args!("{:x}", self.hash))
            .field("reference", &self.reference)
            .field("is_directory", &self.is_directory)
            .field("compressed_size", &self.compressed_size)
            .field("uncompressed_size", &self.uncompressed_size)
            .field("staging", &self.staging.display())
            .finish()
    }
}
