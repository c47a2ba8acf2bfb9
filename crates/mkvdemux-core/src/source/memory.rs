//! In-memory byte sources.

use super::{ByteSource, SourceLength};
use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;

/// Immutable, fully available in-memory source.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    /// Wrap a complete buffer.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// The underlying bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }
}

impl ByteSource for MemorySource {
    fn read(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
        copy_range(&self.data, pos, buf)
    }

    fn length(&self) -> Result<SourceLength> {
        Ok(SourceLength::complete(self.data.len() as u64))
    }
}

#[derive(Debug, Default)]
struct StreamState {
    data: BytesMut,
    total: Option<u64>,
}

/// Appendable source for streaming ingestion.
///
/// Bytes arrive through [`push`](Self::push) while parsers hold a shared reference;
/// reads past the appended prefix fail with [`Error::ShortRead`]. The total length is
/// either declared up front ([`with_total`](Self::with_total)) or fixed once the
/// producer calls [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct StreamBuffer {
    state: RwLock<StreamState>,
}

impl StreamBuffer {
    /// Create an open-ended stream with unknown total length.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stream whose final length is already known.
    pub fn with_total(total: u64) -> Self {
        Self {
            state: RwLock::new(StreamState {
                data: BytesMut::with_capacity(total.min(1 << 20) as usize),
                total: Some(total),
            }),
        }
    }

    /// Append bytes to the end of the stream.
    pub fn push(&self, chunk: &[u8]) {
        let mut state = self.state.write();
        state.data.extend_from_slice(chunk);
        tracing::trace!(appended = chunk.len(), available = state.data.len(), "stream buffer grew");
    }

    /// Mark the stream complete at its current length.
    pub fn finish(&self) {
        let mut state = self.state.write();
        let len = state.data.len() as u64;
        state.total = Some(len);
    }

    /// Number of bytes appended so far.
    pub fn available(&self) -> u64 {
        self.state.read().data.len() as u64
    }
}

impl ByteSource for StreamBuffer {
    fn read(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let state = self.state.read();
        copy_range(&state.data, pos, buf)
    }

    fn length(&self) -> Result<SourceLength> {
        let state = self.state.read();
        Ok(SourceLength {
            total: state.total,
            available: state.data.len() as u64,
        })
    }
}

fn copy_range(data: &[u8], pos: u64, buf: &mut [u8]) -> Result<()> {
    let len = buf.len() as u64;
    let end = pos
        .checked_add(len)
        .filter(|end| *end <= data.len() as u64)
        .ok_or(Error::ShortRead { pos, len })?;
    buf.copy_from_slice(&data[pos as usize..end as usize]);
    Ok(())
}
