//! Random-access byte sources.
//!
//! The engine never touches files directly. Every stream reads its
//! container through a [`ByteSource`], a two-operation capability: a
//! bounded positional read and a total length. Out-of-range reads are
//! clamped rather than rejected, so a read at the end returns 0 bytes.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// A byte-addressable input backing one stream.
pub trait ByteSource {
    /// Reads up to `buf.len()` bytes starting at `offset`.
    ///
    /// Offsets past the end clamp to the end and the read length is
    /// clamped so it never crosses the end of the source.
    ///
    /// # Returns
    ///
    /// The number of bytes actually read (0 when `offset >= size()`).
    ///
    /// # Errors
    ///
    /// Only on a failure of the underlying device.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Total length of the source in bytes.
    fn size(&self) -> u64;

    /// Fills `buf` completely from `offset`, looping over short reads.
    ///
    /// # Returns
    ///
    /// The number of bytes read, which is less than `buf.len()` only when
    /// the source ends first.
    fn read_fully_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_at(offset + filled as u64, &mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}

/// Returns how many bytes a read of `requested` at `offset` may cover
/// inside a source of `length` bytes.
fn clamp_read(offset: u64, requested: usize, length: u64) -> (u64, usize) {
    let offset = offset.min(length);
    let available = length - offset;
    (offset, (requested as u64).min(available) as usize)
}

/// A window over a file: `length` bytes starting at `base`.
#[derive(Debug)]
pub struct FileSource {
    file: File,
    base: u64,
    length: u64,
}

impl FileSource {
    /// Opens a whole file as a source.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or its length queried.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        let length = file.metadata()?.len();
        Ok(Self {
            file,
            base: 0,
            length,
        })
    }

    /// Wraps an open file, exposing `length` bytes starting at `base`.
    ///
    /// The window is shrunk to fit if it extends past the end of the file.
    pub fn with_window(file: File, base: u64, length: u64) -> io::Result<Self> {
        let file_len = file.metadata()?.len();
        let base = base.min(file_len);
        let length = length.min(file_len - base);
        Ok(Self { file, base, length })
    }
}

impl ByteSource for FileSource {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let (offset, len) = clamp_read(offset, buf.len(), self.length);
        if len == 0 {
            return Ok(0);
        }
        self.file.seek(SeekFrom::Start(self.base + offset))?;
        self.file.read(&mut buf[..len])
    }

    fn size(&self) -> u64 {
        self.length
    }
}

/// An in-memory source, optionally restricted to a window of its bytes.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Vec<u8>,
    base: u64,
    length: u64,
}

impl MemorySource {
    /// Exposes all of `data`.
    pub fn new(data: Vec<u8>) -> Self {
        let length = data.len() as u64;
        Self {
            data,
            base: 0,
            length,
        }
    }

    /// Exposes `length` bytes of `data` starting at `base`, shrunk to fit.
    pub fn with_window(data: Vec<u8>, base: u64, length: u64) -> Self {
        let total = data.len() as u64;
        let base = base.min(total);
        let length = length.min(total - base);
        Self { data, base, length }
    }
}

impl From<Vec<u8>> for MemorySource {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl ByteSource for MemorySource {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let (offset, len) = clamp_read(offset, buf.len(), self.length);
        let start = (self.base + offset) as usize;
        buf[..len].copy_from_slice(&self.data[start..start + len]);
        Ok(len)
    }

    fn size(&self) -> u64 {
        self.length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_clamp_read() {
        assert_eq!(clamp_read(0, 4, 10), (0, 4));
        assert_eq!(clamp_read(8, 4, 10), (8, 2));
        assert_eq!(clamp_read(10, 4, 10), (10, 0));
        assert_eq!(clamp_read(50, 4, 10), (10, 0));
    }

    #[test]
    fn test_memory_source_clamps() {
        let mut source = MemorySource::new(vec![1, 2, 3, 4, 5]);
        assert_eq!(source.size(), 5);

        let mut buf = [0u8; 4];
        assert_eq!(source.read_at(3, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);

        // Reading exactly at the end is not an error
        assert_eq!(source.read_at(5, &mut buf).unwrap(), 0);
        // Nor is reading past it
        assert_eq!(source.read_at(99, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_memory_source_window() {
        let mut source = MemorySource::with_window(vec![0, 1, 2, 3, 4, 5, 6], 2, 3);
        assert_eq!(source.size(), 3);

        let mut buf = [0u8; 8];
        assert_eq!(source.read_at(0, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[2, 3, 4]);

        // Window past the end of the data shrinks
        let source = MemorySource::with_window(vec![0, 1, 2], 2, 10);
        assert_eq!(source.size(), 1);
    }

    #[test]
    fn test_file_source_window() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"junkMThd-payload").unwrap();

        let mut source = FileSource::with_window(file, 4, 4).unwrap();
        assert_eq!(source.size(), 4);

        let mut buf = [0u8; 16];
        let n = source.read_fully_at(0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"MThd");
        assert_eq!(source.read_at(4, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_file_source_open() {
        let mut named = tempfile::NamedTempFile::new().unwrap();
        named.write_all(&[9u8; 300]).unwrap();

        let mut source = FileSource::open(named.path()).unwrap();
        assert_eq!(source.size(), 300);

        let mut buf = vec![0u8; 512];
        assert_eq!(source.read_fully_at(100, &mut buf).unwrap(), 200);
    }
}
