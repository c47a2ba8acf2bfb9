//! Local file and `Read + Seek` sources.

use super::{ByteSource, SourceLength};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Byte source over any seekable reader.
///
/// The reader's length is measured once at construction, so the source reports itself
/// as complete. Reads seek to the requested offset under a lock.
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: Mutex<R>,
    len: u64,
}

impl<R: Read + Seek> ReaderSource<R> {
    /// Wrap a reader, measuring its length.
    pub fn new(mut reader: R) -> Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        reader.rewind()?;
        Ok(Self {
            reader: Mutex::new(reader),
            len,
        })
    }

    /// Unwrap the inner reader.
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }
}

impl<R: Read + Seek> ByteSource for ReaderSource<R> {
    fn read(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let len = buf.len() as u64;
        if !self.length()?.contains(pos, len) {
            return Err(Error::ShortRead { pos, len });
        }

        let mut reader = self.reader.lock();
        reader.seek(SeekFrom::Start(pos))?;
        reader.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::ShortRead { pos, len },
            _ => Error::Io(e),
        })
    }

    fn length(&self) -> Result<SourceLength> {
        Ok(SourceLength::complete(self.len))
    }
}

/// Byte source backed by a local file.
#[derive(Debug)]
pub struct FileSource {
    inner: ReaderSource<File>,
    path: PathBuf,
}

impl FileSource {
    /// Open a file for random-access reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let inner = ReaderSource::new(File::open(path)?)?;
        tracing::debug!(path = %path.display(), len = inner.len, "opened file source");
        Ok(Self {
            inner,
            path: path.to_path_buf(),
        })
    }

    /// Path this source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the file handle.
    pub fn close(self) {
        drop(self.inner.into_inner());
    }
}

impl ByteSource for FileSource {
    fn read(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
        self.inner.read(pos, buf)
    }

    fn length(&self) -> Result<SourceLength> {
        self.inner.length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::{Cursor, Write};

    #[test]
    fn test_reader_source_cursor() {
        let source = ReaderSource::new(Cursor::new(vec![10u8, 11, 12, 13])).unwrap();
        let mut buf = [0u8; 2];
        source.read(1, &mut buf).unwrap();
        assert_eq!(buf, [11, 12]);
        assert_matches!(
            source.read(3, &mut buf),
            Err(Error::ShortRead { pos: 3, len: 2 })
        );
        assert_eq!(source.length().unwrap(), SourceLength::complete(4));
    }

    #[test]
    fn test_file_source_open_and_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"matroska bytes").unwrap();
        file.flush().unwrap();

        let source = FileSource::open(file.path()).unwrap();
        assert_eq!(source.path(), file.path());
        assert_eq!(source.length().unwrap().total, Some(14));

        let mut buf = [0u8; 5];
        source.read(9, &mut buf).unwrap();
        assert_eq!(&buf, b"bytes");
        source.close();
    }

    #[test]
    fn test_file_source_missing_file() {
        let result = FileSource::open("/nonexistent/stream.webm");
        assert_matches!(result, Err(Error::Io(_)));
    }
}
