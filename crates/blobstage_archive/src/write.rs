//! Functionality for writing deterministic tar archives.
use std::collections::BTreeSet;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use fs_err as fs;
use walkdir::WalkDir;

use crate::{normalize_entry_path, ArchiveError, NamedPayload, PAYLOAD_MODE, SENTINEL_MTIME};

/// Writes the subtree rooted at `root` as a tar stream to `writer` and returns
/// the writer once the archive has been terminated.
///
/// Entries are visited depth-first in lexical order of their file names. The
/// root itself is not part of the archive; every entry is named relative to
/// it. Directories are written as headers only, regular files are copied in
/// full and symbolic links store their target. Other entry kinds (sockets,
/// fifos, devices) are skipped.
///
/// # Errors
///
/// Fails if `root` does not exist, if the tree cannot be walked or read, or if
/// `writer` returns an error.
pub fn write_directory<W: Write>(writer: W, root: &Path) -> Result<W, ArchiveError> {
    // Make sure the root exists before producing any output.
    fs::symlink_metadata(root)?;

    let mut archive = tar::Builder::new(writer);
    archive.follow_symlinks(false);

    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| ArchiveError::InvalidEntryName(entry.path().display().to_string()))?
            .to_path_buf();
        append_path_to_archive(&mut archive, entry.path(), &relative)?;
    }

    Ok(archive.into_inner()?)
}

/// Writes a set of named payloads as a tar stream to `writer`.
///
/// Payloads are ordered the way [`write_directory`] walks a tree, so the order
/// in which they were supplied does not influence the archive. Every payload
/// becomes a regular file with mode [`PAYLOAD_MODE`]. Names may contain `/`;
/// the parent directories are emitted as header-only entries before the first
/// file inside them.
pub fn write_payloads<W: Write>(
    writer: W,
    payloads: Vec<NamedPayload>,
) -> Result<W, ArchiveError> {
    let mut payloads = payloads
        .into_iter()
        .map(|payload| Ok((entry_name(payload.name())?, payload)))
        .collect::<Result<Vec<_>, ArchiveError>>()?;
    // `Path` compares component by component, like the sorted walk does.
    payloads.sort_by(|(a, _), (b, _)| a.cmp(b));

    let mut archive = tar::Builder::new(writer);
    let mut directories = BTreeSet::new();
    for (path, payload) in payloads {
        append_parent_directories(&mut archive, &mut directories, &path)?;
        let mut header = empty_header(tar::EntryType::Regular, PAYLOAD_MODE);
        header.set_size(payload.size());
        archive.append_data(&mut header, &path, payload.into_reader())?;
    }

    Ok(archive.into_inner()?)
}

/// Converts a zip archive into a tar stream written to `writer`.
///
/// Zip entries are visited in the same order as [`write_directory`] visits a
/// tree. Directories become header-only entries, everything else is copied as
/// a regular file. The permission bits stored in the zip are kept if present.
/// Parent directories the zip does not list are emitted with mode `0o755`.
pub fn write_zip<R: Read + Seek, W: Write>(reader: R, writer: W) -> Result<W, ArchiveError> {
    let mut zip = zip::ZipArchive::new(reader)?;

    let mut entries = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let file = zip.by_index(index)?;
        let Some(enclosed) = file.enclosed_name().map(|path| path.to_path_buf()) else {
            return Err(ArchiveError::PathTraversal(PathBuf::from(file.name())));
        };
        if let Some(path) = normalize_entry_path(&enclosed)? {
            entries.push((path, index));
        }
    }
    entries.sort();

    let mut archive = tar::Builder::new(writer);
    let mut directories = BTreeSet::new();
    for (path, index) in entries {
        append_parent_directories(&mut archive, &mut directories, &path)?;

        let file = zip.by_index(index)?;
        let mode = file.unix_mode().map(|mode| mode & 0o7777);
        if file.is_dir() {
            if directories.insert(path.clone()) {
                let mut header = empty_header(tar::EntryType::Directory, mode.unwrap_or(0o755));
                archive.append_data(&mut header, &path, std::io::empty())?;
            }
        } else {
            let mut header = empty_header(tar::EntryType::Regular, mode.unwrap_or(0o644));
            header.set_size(file.size());
            archive.append_data(&mut header, &path, file)?;
        }
    }

    Ok(archive.into_inner()?)
}

/// Emits a directory entry for every ancestor of `path` that has not been
/// written yet.
fn append_parent_directories<W: Write>(
    archive: &mut tar::Builder<W>,
    written: &mut BTreeSet<PathBuf>,
    path: &Path,
) -> Result<(), ArchiveError> {
    let mut ancestors: Vec<&Path> = path
        .ancestors()
        .skip(1)
        .filter(|ancestor| !ancestor.as_os_str().is_empty())
        .collect();
    ancestors.reverse();

    for ancestor in ancestors {
        if written.insert(ancestor.to_path_buf()) {
            let mut header = empty_header(tar::EntryType::Directory, 0o755);
            archive.append_data(&mut header, ancestor, std::io::empty())?;
        }
    }
    Ok(())
}

/// Validates a payload name and turns it into a relative entry path.
fn entry_name(name: &str) -> Result<PathBuf, ArchiveError> {
    normalize_entry_path(Path::new(name))?
        .ok_or_else(|| ArchiveError::InvalidEntryName(name.to_string()))
}

/// Returns a header without ownership and with the sentinel modification time.
fn empty_header(entry_type: tar::EntryType, mode: u32) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mode(mode);
    header.set_size(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(SENTINEL_MTIME);
    header
}

fn prepare_header(path: &Path) -> Result<tar::Header, std::io::Error> {
    let mut header = tar::Header::new_gnu();
    let stat = fs::symlink_metadata(path)?;
    header.set_metadata(&stat);

    // erase everything that depends on the host rather than the content
    header.set_uid(0);
    header.set_gid(0);
    header.set_device_minor(0)?;
    header.set_device_major(0)?;
    header.set_mtime(SENTINEL_MTIME);

    Ok(header)
}

fn append_path_to_archive(
    archive: &mut tar::Builder<impl Write>,
    full_path: &Path,
    relative: &Path,
) -> Result<(), ArchiveError> {
    let mut header = prepare_header(full_path)?;
    let entry_type = header.entry_type();

    if entry_type.is_file() {
        let mut file = fs::File::open(full_path)?;
        archive.append_data(&mut header, relative, &mut file)?;
    } else if entry_type.is_symlink() {
        let target = fs::read_link(full_path)?;
        archive.append_link(&mut header, relative, target)?;
    } else if entry_type.is_dir() {
        archive.append_data(&mut header, relative, std::io::empty())?;
    } else {
        tracing::debug!(
            "skipping unsupported file type {:?} at {}",
            entry_type,
            full_path.display()
        );
    }

    Ok(())
}
