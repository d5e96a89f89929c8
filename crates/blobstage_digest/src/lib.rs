#![deny(missing_docs)]

//! Hashing helpers shared by the blobstage crates.
//!
//! Every blob is addressed by the SHA-256 digest of its *uncompressed* bytes.
//! This crate wraps the [RustCrypto/hashes](https://github.com/RustCrypto/hashes)
//! implementation of SHA-256 with a couple of small utilities:
//!
//! - [`compute_bytes_digest`]: hashes an in-memory buffer.
//! - [`parse_digest_from_hex`]: parses a hex string back into a digest.
//! - [`HashingReader`]: wraps an [`std::io::Read`] and hashes the bytes that
//!   flow through it.
//!
//! ```no_run
//! use blobstage_digest::{compute_bytes_digest, Sha256};
//!
//! let hash = compute_bytes_digest::<Sha256>("hello");
//! println!("{hash:x}");
//! ```

pub use digest;

use digest::{Digest, Output};
use std::io::{Read, Write};

pub use sha2::Sha256;

/// A type alias for the output of a SHA256 hash.
pub type Sha256Hash = sha2::digest::Output<Sha256>;

/// Compute a hash of the specified bytes.
pub fn compute_bytes_digest<D: Digest + Default + Write>(bytes: impl AsRef<[u8]>) -> Output<D> {
    let mut hasher = D::default();
    hasher.update(bytes);
    hasher.finalize()
}

/// Parses a hash hex string to a digest.
pub fn parse_digest_from_hex<D: Digest>(str: &str) -> Option<Output<D>> {
    let mut hash = <Output<D>>::default();
    match hex::decode_to_slice(str, &mut hash) {
        Ok(_) => Some(hash),
        Err(_) => None,
    }
}

/// A [`Read`] implementation that hashes every byte read from the inner
/// reader. Call [`HashingReader::finalize`] to get both the inner reader and
/// the hash back.
pub struct HashingReader<R, D: Digest> {
    reader: R,
    hasher: D,
}

impl<R, D: Digest + Default> HashingReader<R, D> {
    /// Constructs a new instance from a reader and a new (empty) hasher.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            hasher: Default::default(),
        }
    }
}

impl<R, D: Digest> HashingReader<R, D> {
    /// Consumes this instance and returns the original reader and the hash of all bytes read from
    /// this instance.
    pub fn finalize(self) -> (R, Output<D>) {
        (self.reader, self.hasher.finalize())
    }
}

impl<R: Read, D: Digest> Read for HashingReader<R, D> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let bytes_read = self.reader.read(buf)?;
        self.hasher.update(&buf[..bytes_read]);
        Ok(bytes_read)
    }
}
