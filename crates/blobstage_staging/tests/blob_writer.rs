use std::io::{Read, Write};
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use blobstage_digest::{compute_bytes_digest, Sha256};
use blobstage_staging::{
    write_blob, BlobWriter, CompressionLevel, ProgressObserver, StagingOptions,
};
use flate2::read::GzDecoder;
use rstest::rstest;

fn options(dir: &std::path::Path, compression: CompressionLevel) -> StagingOptions {
    StagingOptions {
        temp_dir: Some(dir.to_path_buf()),
        compression,
    }
}

/// Deterministic pseudo random data that does not compress too well.
fn noise(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491_u32;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}

fn gunzip(path: &std::path::Path) -> Vec<u8> {
    let mut decoded = Vec::new();
    GzDecoder::new(std::fs::File::open(path).unwrap())
        .read_to_end(&mut decoded)
        .unwrap();
    decoded
}

#[rstest]
#[case::empty(Vec::new())]
#[case::hello(b"hello".to_vec())]
#[case::repetitive(vec![b'a'; 100_000])]
#[case::noise(noise(300_000))]
fn test_blob_matches_input(#[case] input: Vec<u8>) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut writer = BlobWriter::create(&options(temp_dir.path(), CompressionLevel::Default))
        .unwrap()
        .with_reference("input.bin");

    // Feed the data in uneven chunks.
    for chunk in input.chunks(7919) {
        writer.write_all(chunk).unwrap();
    }
    let blob = writer.finish().unwrap();

    assert_eq!(*blob.hash(), compute_bytes_digest::<Sha256>(&input));
    assert_eq!(blob.uncompressed_size(), input.len() as u64);
    assert_eq!(
        blob.compressed_size(),
        std::fs::metadata(blob.path()).unwrap().len()
    );
    assert_eq!(gunzip(blob.path()), input);
}

#[test]
fn test_hello_hash() {
    let temp_dir = tempfile::tempdir().unwrap();
    let blob = write_blob(
        &options(temp_dir.path(), CompressionLevel::Default),
        "a.txt",
        &mut "hello".as_bytes(),
        None,
    )
    .unwrap();

    assert_eq!(
        format!("{:x}", blob.hash()),
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
    assert_eq!(blob.reference(), "a.txt");
    assert!(!blob.is_directory());
}

#[rstest]
#[case(CompressionLevel::Lowest)]
#[case(CompressionLevel::Highest)]
#[case(CompressionLevel::Numeric(5))]
fn test_compression_level_does_not_change_identity(#[case] level: CompressionLevel) {
    let temp_dir = tempfile::tempdir().unwrap();
    let input = noise(50_000);

    let reference = write_blob(
        &options(temp_dir.path(), CompressionLevel::Default),
        "reference",
        &mut input.as_slice(),
        None,
    )
    .unwrap();
    let blob = write_blob(
        &options(temp_dir.path(), level),
        "other",
        &mut input.as_slice(),
        None,
    )
    .unwrap();

    assert_eq!(blob, reference);
    assert_eq!(gunzip(blob.path()), input);
}

#[derive(Clone, Default)]
struct Totals {
    bytes: Arc<AtomicU64>,
    calls: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
}

impl ProgressObserver for Totals {
    fn on_progress(&mut self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    fn on_finish(&mut self) {
        self.finished.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn test_observer_sees_every_chunk() {
    let temp_dir = tempfile::tempdir().unwrap();
    let totals = Totals::default();
    let mut writer = BlobWriter::create(&options(temp_dir.path(), CompressionLevel::Lowest))
        .unwrap()
        .with_observer(Box::new(totals.clone()));

    writer.write_all(b"first").unwrap();
    writer.write_all(b"second chunk").unwrap();
    let blob = writer.finish().unwrap();

    assert_eq!(totals.bytes.load(Ordering::Relaxed), 17);
    assert_eq!(totals.calls.load(Ordering::Relaxed), 2);
    assert_eq!(totals.finished.load(Ordering::Relaxed), 1);
    assert_eq!(blob.uncompressed_size(), 17);
}

#[test]
fn test_staging_files_do_not_accumulate() {
    let temp_dir = tempfile::tempdir().unwrap();
    for i in 0..5 {
        let blob = write_blob(
            &options(temp_dir.path(), CompressionLevel::Default),
            format!("item-{i}"),
            &mut noise(1000 * i).as_slice(),
            None,
        )
        .unwrap();
        blob.discard().unwrap();
    }
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}
