//! Byte sources.
//!
//! Every parser in this crate reads through a [`ByteSource`], never through a file
//! handle or socket directly. A source answers two questions: "give me exactly these
//! bytes" and "how much is there". When the bytes are not there yet it answers
//! [`Error::ShortRead`](crate::Error::ShortRead) instead of blocking, which is what lets
//! a [`Segment`](crate::Segment) be driven incrementally over a growing stream.
//!
//! Shipped implementations:
//!
//! - [`FileSource`] / [`ReaderSource`] - local random-access files and `Read + Seek` values
//! - [`CallbackSource`] - caller-supplied `read` / `length` / `destroy` callbacks
//! - [`MemorySource`] - an immutable in-memory buffer
//! - [`StreamBuffer`] - an appendable buffer for streaming ingestion

mod callback;
mod file;
mod memory;

pub use callback::CallbackSource;
pub use file::{FileSource, ReaderSource};
pub use memory::{MemorySource, StreamBuffer};

use crate::{Error, Result};
use std::sync::Arc;

/// Size information reported by a byte source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLength {
    /// Total stream length, `None` while unknown (open-ended streams).
    pub total: Option<u64>,
    /// Contiguous bytes currently retrievable from offset 0.
    pub available: u64,
}

impl SourceLength {
    /// Length of a fully available source.
    pub fn complete(len: u64) -> Self {
        Self {
            total: Some(len),
            available: len,
        }
    }

    /// Whether every byte of the stream is available.
    pub fn is_complete(&self) -> bool {
        self.total == Some(self.available)
    }

    /// Whether `len` bytes at `pos` can be read right now.
    pub fn contains(&self, pos: u64, len: u64) -> bool {
        pos.checked_add(len).is_some_and(|end| end <= self.available)
    }
}

/// A readable, seekable byte range.
///
/// Implementations must be side-effect free with respect to the data: reading the
/// same range twice yields the same bytes.
pub trait ByteSource {
    /// Fill `buf` with exactly `buf.len()` bytes starting at absolute offset `pos`.
    ///
    /// Returns [`Error::ShortRead`] when the range is not (yet) available and
    /// [`Error::Io`] for device-level failures.
    fn read(&self, pos: u64, buf: &mut [u8]) -> Result<()>;

    /// Report total and currently available length.
    fn length(&self) -> Result<SourceLength>;
}

impl<T: ByteSource + ?Sized> ByteSource for &T {
    fn read(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read(pos, buf)
    }

    fn length(&self) -> Result<SourceLength> {
        (**self).length()
    }
}

impl<T: ByteSource + ?Sized> ByteSource for Box<T> {
    fn read(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read(pos, buf)
    }

    fn length(&self) -> Result<SourceLength> {
        (**self).length()
    }
}

impl<T: ByteSource + ?Sized> ByteSource for Arc<T> {
    fn read(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read(pos, buf)
    }

    fn length(&self) -> Result<SourceLength> {
        (**self).length()
    }
}

/// Read through `source`, telling "not yet" apart from "never".
///
/// A short read that ends beyond a known total length can never succeed, so it is
/// reported as a truncated stream instead of a retryable short read.
pub(crate) fn read_exact_at<S: ByteSource + ?Sized>(
    source: &S,
    pos: u64,
    buf: &mut [u8],
) -> Result<()> {
    match source.read(pos, buf) {
        Err(Error::ShortRead { pos, len }) => {
            let length = source.length()?;
            match length.total {
                Some(total) if pos.saturating_add(len) > total => Err(Error::malformed(
                    pos,
                    format!("stream truncated: need {len} bytes, total length is {total}"),
                )),
                _ => Err(Error::ShortRead { pos, len }),
            }
        }
        other => other,
    }
}

/// Check that `len` bytes at `pos` can be read, without reading them.
///
/// Same "not yet" versus "never" split as [`read_exact_at`].
pub(crate) fn ensure_available<S: ByteSource + ?Sized>(source: &S, pos: u64, len: u64) -> Result<()> {
    let length = source.length()?;
    if length.contains(pos, len) {
        return Ok(());
    }
    match length.total {
        Some(total) if pos.saturating_add(len) > total => Err(Error::malformed(
            pos,
            format!("stream truncated: need {len} bytes, total length is {total}"),
        )),
        _ => Err(Error::ShortRead { pos, len }),
    }
}
