#![deny(missing_docs)]

//! Deterministic tar archives for directory blobs.
//!
//! A directory blob is a tar stream whose bytes depend only on the relative
//! paths, permission bits and contents of the archived entries. Modification
//! times are replaced by [`SENTINEL_MTIME`], ownership is erased, and entries
//! are visited in lexical order. Archiving the same tree twice therefore
//! yields byte-identical streams, which in turn yields the same content hash.
//!
//! Three producers share these rules:
//!
//! - [`write::write_directory`] archives a filesystem subtree.
//! - [`write::write_payloads`] archives a set of [`NamedPayload`]s that have no
//!   backing path, e.g. files received as part of a request.
//! - [`write::write_zip`] converts a zip archive into the same format.
//!
//! [`extract::unpack`] is the inverse and reconstructs a tree from a stream.

use std::path::{Component, Path, PathBuf};

pub mod extract;
mod payload;
pub mod write;

pub use extract::{unpack, UnpackSummary};
pub use payload::NamedPayload;

/// The modification time written into every archive header.
pub const SENTINEL_MTIME: u64 = 0;

/// Permission bits for entries that have no filesystem metadata.
pub const PAYLOAD_MODE: u32 = 0o640;

/// Size of the buffer used to copy entry contents.
pub const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// An error that can occur while building or extracting an archive.
#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    /// An I/O error occurred.
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Walking the source tree failed.
    #[error("failed to walk the source tree")]
    WalkError(#[from] walkdir::Error),

    /// The zip archive could not be read.
    #[error("invalid zip archive")]
    ZipError(#[from] zip::result::ZipError),

    /// A path in the archive tries to escape the destination.
    #[error("path traversal attempt in archive: {0}")]
    PathTraversal(PathBuf),

    /// An entry name cannot be represented in the archive.
    #[error("invalid entry name '{0}'")]
    InvalidEntryName(String),
}

/// Normalizes an entry path by dropping root, prefix and `.` components.
///
/// Returns `Ok(None)` if nothing remains (e.g. `.` or `/`) and
/// [`ArchiveError::PathTraversal`] if the path contains `..`.
pub(crate) fn normalize_entry_path(path: &Path) -> Result<Option<PathBuf>, ArchiveError> {
    let mut result = PathBuf::with_capacity(path.as_os_str().len());
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => return Err(ArchiveError::PathTraversal(path.to_path_buf())),
            Component::Normal(part) => result.push(part),
        }
    }

    if result.as_os_str().is_empty() {
        return Ok(None);
    }

    Ok(Some(result))
}
