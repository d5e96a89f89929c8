use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use assert_matches::assert_matches;
use blobstage_archive::{
    unpack,
    write::{write_directory, write_payloads, write_zip},
    ArchiveError, NamedPayload,
};
use walkdir::WalkDir;

/// Returns every path below `root` with its contents (or link target).
fn snapshot_tree(root: &Path) -> Vec<(PathBuf, String)> {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(Result::unwrap)
        .map(|entry| {
            let relative = entry.path().strip_prefix(root).unwrap().to_path_buf();
            let description = if entry.path_is_symlink() {
                format!(
                    "link -> {}",
                    std::fs::read_link(entry.path()).unwrap().display()
                )
            } else if entry.file_type().is_dir() {
                "dir".to_string()
            } else {
                std::fs::read_to_string(entry.path()).unwrap()
            };
            (relative, description)
        })
        .collect()
}

fn create_sample_tree(root: &Path) {
    std::fs::create_dir_all(root.join("docs/nested")).unwrap();
    std::fs::write(root.join("x"), "1").unwrap();
    std::fs::write(root.join("y"), "22").unwrap();
    std::fs::write(root.join("docs/readme.md"), "# readme").unwrap();
    std::fs::write(root.join("docs/nested/data.bin"), [0u8, 1, 2, 3]).unwrap();
    #[cfg(unix)]
    std::os::unix::fs::symlink("docs/readme.md", root.join("link")).unwrap();
}

fn set_mtime(path: &Path, time: SystemTime) {
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

#[test]
fn test_archiving_is_independent_of_timestamps() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    create_sample_tree(first.path());
    create_sample_tree(second.path());

    set_mtime(&first.path().join("x"), SystemTime::UNIX_EPOCH);
    set_mtime(
        &second.path().join("x"),
        SystemTime::now() - Duration::from_secs(86_400),
    );

    let first_archive = write_directory(Vec::new(), first.path()).unwrap();
    let second_archive = write_directory(Vec::new(), second.path()).unwrap();
    assert_eq!(first_archive, second_archive);
}

#[test]
fn test_archiving_detects_content_changes() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    create_sample_tree(first.path());
    create_sample_tree(second.path());
    std::fs::write(second.path().join("y"), "23").unwrap();

    let first_archive = write_directory(Vec::new(), first.path()).unwrap();
    let second_archive = write_directory(Vec::new(), second.path()).unwrap();
    assert_ne!(first_archive, second_archive);
}

#[test]
fn test_directory_round_trip() {
    let source = tempfile::tempdir().unwrap();
    let destination = tempfile::tempdir().unwrap();
    create_sample_tree(source.path());

    let archive = write_directory(Vec::new(), source.path()).unwrap();
    let summary = unpack(Cursor::new(archive), destination.path()).unwrap();

    assert_eq!(summary.files, 4);
    assert_eq!(summary.directories, 2);
    assert_eq!(summary.skipped, 0);
    assert_eq!(
        snapshot_tree(source.path()),
        snapshot_tree(destination.path())
    );
}

#[cfg(unix)]
#[test]
fn test_round_trip_keeps_permissions_and_symlinks() {
    use std::os::unix::fs::PermissionsExt;

    let source = tempfile::tempdir().unwrap();
    let destination = tempfile::tempdir().unwrap();
    create_sample_tree(source.path());
    let script = source.path().join("run.sh");
    std::fs::write(&script, "#!/bin/sh\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let archive = write_directory(Vec::new(), source.path()).unwrap();
    let summary = unpack(Cursor::new(archive), destination.path()).unwrap();
    assert_eq!(summary.symlinks, 1);

    let mode = std::fs::metadata(destination.path().join("run.sh"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o755);
    assert_eq!(
        std::fs::read_link(destination.path().join("link")).unwrap(),
        Path::new("docs/readme.md")
    );
}

#[test]
fn test_payload_round_trip() {
    let destination = tempfile::tempdir().unwrap();
    let payloads = vec![
        NamedPayload::from_bytes("y", "22"),
        NamedPayload::from_bytes("x", "1"),
    ];

    let archive = write_payloads(Vec::new(), payloads).unwrap();
    let summary = unpack(Cursor::new(archive), destination.path()).unwrap();

    assert_eq!(summary.files, 2);
    assert_eq!(
        std::fs::read_to_string(destination.path().join("x")).unwrap(),
        "1"
    );
    assert_eq!(
        std::fs::read_to_string(destination.path().join("y")).unwrap(),
        "22"
    );
}

#[test]
fn test_unsupported_entries_are_skipped() {
    let destination = tempfile::tempdir().unwrap();

    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_path("pipe").unwrap();
    header.set_entry_type(tar::EntryType::Fifo);
    header.set_size(0);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, std::io::empty()).unwrap();

    let mut header = tar::Header::new_gnu();
    header.set_path("after.txt").unwrap();
    header.set_size(5);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, b"after" as &[u8]).unwrap();
    let archive = builder.into_inner().unwrap();

    let summary = unpack(Cursor::new(archive), destination.path()).unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.files, 1);
    assert!(!destination.path().join("pipe").exists());
    assert_eq!(
        std::fs::read_to_string(destination.path().join("after.txt")).unwrap(),
        "after"
    );
}

#[test]
fn test_truncated_archive_keeps_extracted_entries() {
    let destination = tempfile::tempdir().unwrap();
    let payloads = vec![
        NamedPayload::from_bytes("a.txt", "first"),
        NamedPayload::from_bytes("b.txt", vec![7u8; 4096]),
    ];
    let mut archive = write_payloads(Vec::new(), payloads).unwrap();

    // Cut the archive in the middle of the second entry's contents.
    archive.truncate(512 + 512 + 512 + 1000);

    let result = unpack(Cursor::new(archive), destination.path());
    assert_matches!(result, Err(ArchiveError::IoError(_)));
    assert_eq!(
        std::fs::read_to_string(destination.path().join("a.txt")).unwrap(),
        "first"
    );
}

#[test]
fn test_path_traversal_is_rejected() {
    let destination = tempfile::tempdir().unwrap();

    // Build the header by hand, `tar::Header::set_path` refuses `..`.
    let mut header = [0u8; 512];
    let name = b"../escape.txt";
    header[..name.len()].copy_from_slice(name);
    header[100..107].copy_from_slice(b"0000644");
    header[108..115].copy_from_slice(b"0000000");
    header[116..123].copy_from_slice(b"0000000");
    header[124..135].copy_from_slice(b"00000000003");
    header[136..147].copy_from_slice(b"00000000000");
    header[156] = b'0';
    header[257..262].copy_from_slice(b"ustar");
    header[263..265].copy_from_slice(b"00");
    header[148..156].copy_from_slice(b"        ");
    let checksum: u32 = header.iter().map(|&b| u32::from(b)).sum();
    header[148..156].copy_from_slice(format!("{checksum:06o}\0 ").as_bytes());

    let mut archive = header.to_vec();
    archive.extend_from_slice(b"bad");
    archive.extend(std::iter::repeat_n(0u8, 512 - 3));
    archive.extend_from_slice(&[0u8; 1024]);

    let result = unpack(Cursor::new(archive), destination.path());
    assert_matches!(result, Err(ArchiveError::PathTraversal(_)));
}

/// Builds an archive with a symlink `d -> target` followed by the file
/// `d/inner.txt`.
fn symlink_then_file_archive(target: &Path) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());

    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Symlink);
    header.set_size(0);
    header.set_mode(0o777);
    builder.append_link(&mut header, "d", target).unwrap();

    let mut header = tar::Header::new_gnu();
    header.set_path("d/inner.txt").unwrap();
    header.set_size(5);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, b"inner" as &[u8]).unwrap();

    builder.into_inner().unwrap()
}

#[cfg(unix)]
#[test]
fn test_absolute_symlink_target_is_rejected() {
    let temp_dir = tempfile::tempdir().unwrap();
    let outside = temp_dir.path().join("outside");
    let destination = temp_dir.path().join("dest");
    std::fs::create_dir_all(&outside).unwrap();

    let archive = symlink_then_file_archive(&outside);
    let result = unpack(Cursor::new(archive), &destination);

    assert_matches!(result, Err(ArchiveError::PathTraversal(_)));
    assert!(!outside.join("inner.txt").exists());
    assert!(std::fs::symlink_metadata(destination.join("d")).is_err());
}

#[cfg(unix)]
#[test]
fn test_relative_symlink_escaping_destination_is_rejected() {
    let temp_dir = tempfile::tempdir().unwrap();
    let outside = temp_dir.path().join("outside");
    let destination = temp_dir.path().join("dest");
    std::fs::create_dir_all(&outside).unwrap();

    let archive = symlink_then_file_archive(Path::new("../outside"));
    let result = unpack(Cursor::new(archive), &destination);

    assert_matches!(result, Err(ArchiveError::PathTraversal(_)));
    assert!(!outside.join("inner.txt").exists());
}

#[cfg(unix)]
#[test]
fn test_symlink_inside_destination_is_followed() {
    let destination = tempfile::tempdir().unwrap();
    std::fs::create_dir(destination.path().join("real")).unwrap();

    let archive = symlink_then_file_archive(Path::new("real"));
    let summary = unpack(Cursor::new(archive), destination.path()).unwrap();

    assert_eq!(summary.symlinks, 1);
    assert_eq!(
        std::fs::read_to_string(destination.path().join("real/inner.txt")).unwrap(),
        "inner"
    );
}

#[test]
fn test_zip_conversion_matches_payload_layout() {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o640);
    zip.start_file("y", options).unwrap();
    zip.write_all(b"22").unwrap();
    zip.add_directory("sub/", options).unwrap();
    zip.start_file("sub/z", options).unwrap();
    zip.write_all(b"333").unwrap();
    zip.start_file("x", options).unwrap();
    zip.write_all(b"1").unwrap();
    let zip_bytes = zip.finish().unwrap().into_inner();

    let archive = write_zip(Cursor::new(zip_bytes.clone()), Vec::new()).unwrap();
    let again = write_zip(Cursor::new(zip_bytes), Vec::new()).unwrap();
    assert_eq!(archive, again);

    let destination = tempfile::tempdir().unwrap();
    let summary = unpack(Cursor::new(archive), destination.path()).unwrap();
    assert_eq!(summary.files, 3);
    assert_eq!(summary.directories, 1);
    assert_eq!(
        std::fs::read_to_string(destination.path().join("sub/z")).unwrap(),
        "333"
    );
    assert_eq!(
        std::fs::read_to_string(destination.path().join("x")).unwrap(),
        "1"
    );
}
