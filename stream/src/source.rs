//! Byte source contract and adapters.

use std::io::{self, Read};
use std::sync::Mutex;

/// A byte source feeding a buffered stream.
///
/// The refill thread and foreground callers share one source, so every
/// method takes `&self`; implementations bring their own interior
/// mutability. `read` returning `Ok(0)` means the source is exhausted or
/// has nothing available right now — which of the two it is belongs to the
/// source's own contract (see
/// [`StreamOptions::with_end_with_source`](crate::StreamOptions::with_end_with_source)).
pub trait ByteSource: Send + Sync {
    /// Reads up to `dst.len()` bytes into `dst`, returning the count read.
    fn read(&self, dst: &mut [u8]) -> io::Result<usize>;

    /// Skips up to `len` bytes, returning the count actually skipped.
    fn skip(&self, len: usize) -> io::Result<usize> {
        let mut scratch = [0u8; 4096];
        let mut skipped = 0;
        while skipped < len {
            let want = (len - skipped).min(scratch.len());
            let n = self.read(&mut scratch[..want])?;
            if n == 0 {
                break;
            }
            skipped += n;
        }
        Ok(skipped)
    }

    /// Current offset from the start of the source, in bytes.
    fn position(&self) -> usize;

    /// Total size of the source, if known.
    fn size(&self) -> Option<usize>;
}

/// Adapts any [`io::Read`] into a [`ByteSource`].
///
/// Tracks the read position and optionally carries a declared total size
/// (e.g. a file length) for `size()`.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use bytepump_stream::{ByteSource, ReaderSource};
///
/// let source = ReaderSource::with_size(Cursor::new(vec![1u8, 2, 3, 4]), 4);
/// let mut buf = [0u8; 2];
/// assert_eq!(source.read(&mut buf).unwrap(), 2);
/// assert_eq!(source.position(), 2);
/// assert_eq!(source.size(), Some(4));
/// ```
pub struct ReaderSource<R> {
    state: Mutex<ReaderState<R>>,
    size: Option<usize>,
}

struct ReaderState<R> {
    reader: R,
    position: usize,
}

impl<R: Read> ReaderSource<R> {
    /// Wraps a reader whose total size is unknown.
    pub fn new(reader: R) -> Self {
        ReaderSource {
            state: Mutex::new(ReaderState {
                reader,
                position: 0,
            }),
            size: None,
        }
    }

    /// Wraps a reader with a declared total size in bytes.
    pub fn with_size(reader: R, size: usize) -> Self {
        ReaderSource {
            state: Mutex::new(ReaderState {
                reader,
                position: 0,
            }),
            size: Some(size),
        }
    }
}

impl<R: Read + Send> ByteSource for ReaderSource<R> {
    fn read(&self, dst: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        let n = state.reader.read(dst)?;
        state.position += n;
        Ok(n)
    }

    fn position(&self) -> usize {
        self.state.lock().unwrap().position
    }

    fn size(&self) -> Option<usize> {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_reader_source_read_and_position() {
        let source = ReaderSource::new(Cursor::new(vec![1u8, 2, 3, 4, 5]));
        assert_eq!(source.position(), 0);
        assert_eq!(source.size(), None);

        let mut buf = [0u8; 3];
        assert_eq!(source.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(source.position(), 3);

        assert_eq!(source.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(source.read(&mut buf).unwrap(), 0);
        assert_eq!(source.position(), 5);
    }

    #[test]
    fn test_reader_source_skip() {
        let data: Vec<u8> = (0..100).collect();
        let source = ReaderSource::with_size(Cursor::new(data), 100);

        assert_eq!(source.skip(10).unwrap(), 10);
        assert_eq!(source.position(), 10);

        let mut buf = [0u8; 1];
        source.read(&mut buf).unwrap();
        assert_eq!(buf[0], 10);

        // Skipping past the end stops at the end.
        assert_eq!(source.skip(1000).unwrap(), 89);
        assert_eq!(source.position(), 100);
    }

    #[test]
    fn test_reader_source_declared_size() {
        let source = ReaderSource::with_size(Cursor::new(vec![0u8; 16]), 16);
        assert_eq!(source.size(), Some(16));
    }
}
