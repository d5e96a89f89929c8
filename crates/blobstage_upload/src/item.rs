use std::path::{Path, PathBuf};

use blobstage_archive::{
    write::{write_directory, write_payloads, write_zip},
    ArchiveError, NamedPayload,
};
use blobstage_staging::{Blob, BlobWriter, ProgressObserver, StagingError, StagingOptions};

use crate::ItemError;

/// Where the bytes of an [`UploadItem`] come from.
#[derive(Debug)]
pub enum UploadSource {
    /// A single file, stored as is.
    File(PathBuf),
    /// A directory tree, stored as one archive.
    Directory(PathBuf),
    /// A zip archive, converted to the same archive format as a directory.
    Zip(PathBuf),
    /// Named payloads, stored together as one archive.
    Payloads(Vec<NamedPayload>),
    /// A single named payload, stored as is.
    Payload(NamedPayload),
}

/// How a set of payloads that arrive together is turned into items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadMode {
    /// Every payload becomes its own blob.
    #[default]
    Files,
    /// All payloads are archived into a single blob.
    Directory,
}

/// One unit of work for the [`crate::Uploader`]. Produces exactly one blob.
#[derive(Debug)]
pub struct UploadItem {
    /// The display label of the blob.
    pub reference: String,
    /// The bytes to upload.
    pub source: UploadSource,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl UploadItem {
    /// Creates an item with an explicit reference.
    pub fn new(reference: impl Into<String>, source: UploadSource) -> Self {
        Self {
            reference: reference.into(),
            source,
        }
    }

    /// A single file, labelled with its file name.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::new(file_name(&path), UploadSource::File(path))
    }

    /// A directory tree, labelled with the name of the directory.
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::new(file_name(&path), UploadSource::Directory(path))
    }

    /// A zip archive, labelled with its file name.
    pub fn zip(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::new(file_name(&path), UploadSource::Zip(path))
    }

    /// Turns payloads received together into items.
    ///
    /// With [`UploadMode::Files`] every payload becomes an item labelled with
    /// its name. With [`UploadMode::Directory`] all payloads form a single
    /// item labelled `reference`.
    pub fn from_payloads(
        mode: UploadMode,
        reference: impl Into<String>,
        payloads: Vec<NamedPayload>,
    ) -> Vec<Self> {
        match mode {
            UploadMode::Files => payloads
                .into_iter()
                .map(|payload| {
                    let reference = payload.name().to_string();
                    Self::new(reference, UploadSource::Payload(payload))
                })
                .collect(),
            UploadMode::Directory => vec![Self::new(reference, UploadSource::Payloads(payloads))],
        }
    }

    /// True if the item is stored as an archive.
    pub fn is_directory(&self) -> bool {
        matches!(
            self.source,
            UploadSource::Directory(_) | UploadSource::Zip(_) | UploadSource::Payloads(_)
        )
    }

    /// Streams the item into a new blob. Blocks.
    pub(crate) fn stage(
        self,
        options: &StagingOptions,
        observer: Option<Box<dyn ProgressObserver>>,
    ) -> Result<Blob, ItemError> {
        let is_directory = self.is_directory();
        let mut writer = BlobWriter::create(options)?
            .with_reference(self.reference)
            .with_directory(is_directory);
        if let Some(observer) = observer {
            writer = writer.with_observer(observer);
        }
        tracing::debug!("staging {} in {}", writer_label(&self.source), writer.path().display());

        match self.source {
            UploadSource::File(path) => {
                let mut file = fs_err::File::open(&path).map_err(StagingError::Read)?;
                copy_into(&mut file, &mut writer)?;
            }
            UploadSource::Payload(payload) => {
                copy_into(&mut payload.into_reader(), &mut writer)?;
            }
            UploadSource::Directory(path) => {
                let result = write_directory(&mut writer, &path).map(|_| ());
                check_archive(&writer, result)?;
            }
            UploadSource::Zip(path) => {
                let file = fs_err::File::open(&path).map_err(StagingError::Read)?;
                let result = write_zip(std::io::BufReader::new(file), &mut writer).map(|_| ());
                check_archive(&writer, result)?;
            }
            UploadSource::Payloads(payloads) => {
                let result = write_payloads(&mut writer, payloads).map(|_| ());
                check_archive(&writer, result)?;
            }
        }

        Ok(writer.finish()?)
    }
}

fn writer_label(source: &UploadSource) -> String {
    match source {
        UploadSource::File(path) => format!("file {}", path.display()),
        UploadSource::Directory(path) => format!("directory {}", path.display()),
        UploadSource::Zip(path) => format!("zip archive {}", path.display()),
        UploadSource::Payloads(payloads) => format!("{} payloads", payloads.len()),
        UploadSource::Payload(payload) => format!("payload {}", payload.name()),
    }
}

fn copy_into(reader: &mut impl std::io::Read, writer: &mut BlobWriter) -> Result<(), StagingError> {
    match std::io::copy(reader, writer) {
        Ok(_) => Ok(()),
        Err(err) if writer.is_poisoned() => Err(StagingError::Write(err)),
        Err(err) => Err(StagingError::Read(err)),
    }
}

/// An archive producer that failed because the blob writer failed reports a
/// staging error, anything else is an archive error.
fn check_archive(writer: &BlobWriter, result: Result<(), ArchiveError>) -> Result<(), ItemError> {
    match result {
        Ok(()) => Ok(()),
        Err(ArchiveError::IoError(err)) if writer.is_poisoned() => {
            Err(StagingError::Write(err).into())
        }
        Err(err) => Err(err.into()),
    }
}
