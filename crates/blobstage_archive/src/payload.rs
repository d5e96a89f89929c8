use std::{
    fmt,
    io::{Cursor, Read},
    path::Path,
};

/// A named stream of bytes with a known length that has no filesystem
/// metadata of its own, for instance a file received as part of a request.
pub struct NamedPayload {
    name: String,
    size: u64,
    reader: Box<dyn Read + Send>,
}

impl NamedPayload {
    /// Constructs a payload from a reader that yields exactly `size` bytes.
    pub fn new(name: impl Into<String>, size: u64, reader: impl Read + Send + 'static) -> Self {
        Self {
            name: name.into(),
            size,
            reader: Box::new(reader),
        }
    }

    /// Constructs a payload from an in-memory buffer.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        Self::new(name, bytes.len() as u64, Cursor::new(bytes))
    }

    /// Opens the file at `path` as a payload named after the file.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let file = fs_err::File::open(path)?;
        let size = file.metadata()?.len();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, size, file))
    }

    /// The name of the payload.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of bytes the payload yields.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns a reader that yields exactly [`Self::size`] bytes, or fails
    /// with [`std::io::ErrorKind::UnexpectedEof`] if the source is shorter.
    pub fn into_reader(self) -> impl Read + Send {
        ExactReader {
            name: self.name,
            remaining: self.size,
            inner: self.reader,
        }
    }
}

impl fmt::Debug for NamedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedPayload")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

struct ExactReader {
    name: String,
    remaining: u64,
    inner: Box<dyn Read + Send>,
}

impl Read for ExactReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let read = self.inner.read(&mut buf[..max])?;
        if read == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "payload '{}' ended {} bytes before its declared size",
                    self.name, self.remaining
                ),
            ));
        }
        self.remaining -= read as u64;
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_stops_at_declared_size() {
        let payload = NamedPayload::new("a", 3, Cursor::new(b"abcdef".to_vec()));
        let mut contents = Vec::new();
        payload.into_reader().read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"abc");
    }

    #[test]
    fn test_short_reader_is_an_error() {
        let payload = NamedPayload::new("short", 10, Cursor::new(b"abc".to_vec()));
        let err = payload
            .into_reader()
            .read_to_end(&mut Vec::new())
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_from_path_uses_file_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();

        let payload = NamedPayload::from_path(&path).unwrap();
        assert_eq!(payload.name(), "notes.txt");
        assert_eq!(payload.size(), 5);
    }
}
