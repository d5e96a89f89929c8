//! Extraction of archives produced by [`crate::write`].

use std::io::{Read, Write};
use std::path::{Component, Path};

use fs_err as fs;

use crate::{normalize_entry_path, ArchiveError, COPY_BUFFER_SIZE};

/// Counts of what [`unpack`] did with the entries of an archive.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UnpackSummary {
    /// Directories created (or already present).
    pub directories: usize,
    /// Regular files written.
    pub files: usize,
    /// Symbolic links created.
    pub symlinks: usize,
    /// Entries of an unsupported kind that were ignored.
    pub skipped: usize,
}

/// Extracts a tar stream into `destination`, one entry at a time.
///
/// - directories are created if absent,
/// - regular files are created or truncated and receive exactly the entry's
///   bytes (and its permission bits on unix),
/// - symbolic links are recreated with the stored target, replacing whatever
///   was at the path before,
/// - any other entry kind is logged and skipped.
///
/// Any read or filesystem error aborts the extraction. Entries that were
/// extracted before the failure are left on disk.
///
/// # Security
///
/// Entry paths containing `..` are rejected with
/// [`ArchiveError::PathTraversal`]. Leading `/` and `.` components are
/// dropped. Symlink targets that are absolute or resolve to a location
/// outside of `destination` are rejected as well, so later entries can never
/// be written through a link that leaves the destination.
pub fn unpack<R: Read>(reader: R, destination: &Path) -> Result<UnpackSummary, ArchiveError> {
    fs::create_dir_all(destination)?;

    let mut archive = tar::Archive::new(reader);
    let mut summary = UnpackSummary::default();
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_type = entry.header().entry_type();

        let raw_path = entry.path()?.into_owned();
        let Some(relative) = normalize_entry_path(&raw_path)? else {
            continue;
        };
        let dest_path = destination.join(&relative);

        match entry_type {
            tar::EntryType::Directory => {
                fs::create_dir_all(&dest_path)?;
                summary.directories += 1;
            }
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                create_parent(&dest_path)?;
                remove_symlink(&dest_path)?;

                let mode = entry.header().mode()?;
                let mut file = fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&dest_path)?;
                copy_buffered(&mut entry, &mut file, &mut buffer)?;
                set_permissions(&dest_path, mode)?;
                summary.files += 1;
            }
            tar::EntryType::Symlink => {
                let Some(target) = entry.link_name()?.map(|target| target.into_owned()) else {
                    tracing::warn!("ignoring symlink without target: {}", raw_path.display());
                    summary.skipped += 1;
                    continue;
                };
                validate_symlink_target(&relative, &target)?;
                create_parent(&dest_path)?;
                create_symlink(&target, &dest_path)?;
                summary.symlinks += 1;
            }
            other => {
                tracing::warn!(
                    "ignoring unsupported tar entry {} of type {:?}",
                    raw_path.display(),
                    other
                );
                summary.skipped += 1;
            }
        }
    }

    Ok(summary)
}

/// Makes sure that `target`, resolved relative to the directory of the link
/// at `link` (relative to the destination), stays inside the destination.
fn validate_symlink_target(link: &Path, target: &Path) -> Result<(), ArchiveError> {
    let mut resolved = link.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
    for component in target.components() {
        match component {
            Component::Prefix(..) | Component::RootDir => {
                return Err(ArchiveError::PathTraversal(target.to_path_buf()));
            }
            Component::Normal(part) => resolved.push(part),
            Component::ParentDir => match resolved.parent() {
                Some(parent) => resolved = parent.to_path_buf(),
                None => return Err(ArchiveError::PathTraversal(target.to_path_buf())),
            },
            Component::CurDir => {}
        }
    }
    Ok(())
}

/// Copies everything from `reader` to `writer` through a caller-owned buffer.
fn copy_buffered(
    reader: &mut impl Read,
    writer: &mut impl Write,
    buffer: &mut [u8],
) -> std::io::Result<u64> {
    let mut copied = 0u64;
    loop {
        let read = match reader.read(buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buffer[..read])?;
        copied += read as u64;
    }
    writer.flush()?;
    Ok(copied)
}

fn create_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent),
        None => Ok(()),
    }
}

/// Writing through an existing symlink would modify its target instead.
fn remove_symlink(path: &Path) -> std::io::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_symlink() => fs::remove_file(path),
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    match std::os::unix::fs::symlink(target, link) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            if std::fs::symlink_metadata(link)?.is_dir() {
                fs::remove_dir_all(link)?;
            } else {
                fs::remove_file(link)?;
            }
            std::os::unix::fs::symlink(target, link)
        }
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    tracing::warn!(
        "skipping symlink {} -> {}, symlinks are only restored on unix",
        link.display(),
        target.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_validate_symlink_target() {
        assert!(validate_symlink_target(Path::new("link"), Path::new("docs/readme.md")).is_ok());
        assert!(validate_symlink_target(Path::new("a/b/link"), Path::new("../c")).is_ok());
        assert!(validate_symlink_target(Path::new("a/link"), Path::new("./x/../y")).is_ok());
        assert!(validate_symlink_target(Path::new("link"), Path::new("../outside")).is_err());
        assert!(validate_symlink_target(Path::new("a/link"), Path::new("x/../../../y")).is_err());
        assert!(validate_symlink_target(Path::new("link"), Path::new("/etc/passwd")).is_err());
    }

    #[test]
    fn test_copy_buffered_copies_everything() {
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let mut output = Vec::new();
        let mut buffer = [0u8; 1024];
        let copied = copy_buffered(&mut Cursor::new(&data), &mut output, &mut buffer).unwrap();
        assert_eq!(copied, data.len() as u64);
        assert_eq!(output, data);
    }

    #[test]
    fn test_existing_file_is_truncated() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join("file.txt"), "much longer original").unwrap();

        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_path("file.txt").unwrap();
        header.set_size(3);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, b"new" as &[u8]).unwrap();
        let archive = builder.into_inner().unwrap();

        unpack(Cursor::new(archive), temp_dir.path()).unwrap();
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("file.txt")).unwrap(),
            "new"
        );
    }

    #[test]
    fn test_existing_directory_is_not_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(temp_dir.path().join("dir")).unwrap();

        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_path("dir").unwrap();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append(&header, std::io::empty()).unwrap();
        let archive = builder.into_inner().unwrap();

        let summary = unpack(Cursor::new(archive), temp_dir.path()).unwrap();
        assert_eq!(summary.directories, 1);
        assert!(temp_dir.path().join("dir").is_dir());
    }
}
