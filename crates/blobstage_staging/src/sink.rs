//! Byte sinks that make up the blob writer.

use std::io::Write;

use crate::ProgressObserver;

/// Writes `buf` to every sink in order. The first sink that fails aborts the
/// call, later sinks do not see the chunk.
pub(crate) fn fan_out(sinks: &mut [&mut dyn Write], buf: &[u8]) -> std::io::Result<()> {
    for sink in sinks.iter_mut() {
        sink.write_all(buf)?;
    }
    Ok(())
}

/// Forwards to an inner writer and counts the bytes it accepted.
pub(crate) struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.count += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// A sink that only counts.
#[derive(Default)]
pub(crate) struct ByteCounter(u64);

impl ByteCounter {
    pub fn count(&self) -> u64 {
        self.0
    }
}

impl Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0 += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Adapts an optional [`ProgressObserver`] to a sink.
pub(crate) struct ObserverSink<'a>(pub Option<&'a mut (dyn ProgressObserver + 'static)>);

impl Write for ObserverSink<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Some(observer) = self.0.as_deref_mut() {
            observer.on_progress(buf.len() as u64);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("sink failed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_fan_out_writes_to_every_sink() {
        let mut first = ByteCounter::default();
        let mut second = Vec::new();
        fan_out(&mut [&mut first, &mut second], b"hello").unwrap();
        fan_out(&mut [&mut first, &mut second], b" world").unwrap();
        assert_eq!(first.count(), 11);
        assert_eq!(second, b"hello world");
    }

    #[test]
    fn test_fan_out_stops_at_first_failure() {
        let mut before = ByteCounter::default();
        let mut failing = FailingSink;
        let mut after = ByteCounter::default();

        let result = fan_out(&mut [&mut before, &mut failing, &mut after], b"chunk");

        assert!(result.is_err());
        assert_eq!(before.count(), 5);
        assert_eq!(after.count(), 0);
    }

    #[test]
    fn test_counting_writer_counts_accepted_bytes() {
        let mut writer = CountingWriter::new(Vec::new());
        writer.write_all(b"abc").unwrap();
        writer.write_all(b"defg").unwrap();
        assert_eq!(writer.count(), 7);
        assert_eq!(writer.into_inner(), b"abcdefg");
    }
}
