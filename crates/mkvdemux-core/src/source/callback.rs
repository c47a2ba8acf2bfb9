//! Callback-driven byte source for arbitrary transports.

use super::{ByteSource, SourceLength};
use crate::Result;
use parking_lot::Mutex;

type ReadFn = dyn FnMut(u64, &mut [u8]) -> Result<()> + Send;
type LengthFn = dyn FnMut() -> Result<SourceLength> + Send;
type DestroyFn = dyn FnOnce() + Send;

/// Byte source driven by three caller-supplied callbacks.
///
/// `read` must translate "not downloaded yet" into
/// [`Error::ShortRead`](crate::Error::ShortRead) rather than block. `destroy` runs exactly
/// once, when the source is dropped or [`close`](Self::close)d.
pub struct CallbackSource {
    read: Mutex<Box<ReadFn>>,
    length: Mutex<Box<LengthFn>>,
    destroy: Option<Box<DestroyFn>>,
}

impl CallbackSource {
    /// Create a source from `read` and `length` callbacks.
    pub fn new<R, L>(read: R, length: L) -> Self
    where
        R: FnMut(u64, &mut [u8]) -> Result<()> + Send + 'static,
        L: FnMut() -> Result<SourceLength> + Send + 'static,
    {
        Self {
            read: Mutex::new(Box::new(read)),
            length: Mutex::new(Box::new(length)),
            destroy: None,
        }
    }

    /// Attach a `destroy` callback run when the source is released.
    pub fn with_destroy<D>(mut self, destroy: D) -> Self
    where
        D: FnOnce() + Send + 'static,
    {
        self.destroy = Some(Box::new(destroy));
        self
    }

    /// Release the source, running the `destroy` callback.
    pub fn close(self) {
        drop(self);
    }
}

impl ByteSource for CallbackSource {
    fn read(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let mut read = self.read.lock();
        (*read)(pos, buf)
    }

    fn length(&self) -> Result<SourceLength> {
        let mut length = self.length.lock();
        (*length)()
    }
}

impl Drop for CallbackSource {
    fn drop(&mut self) {
        if let Some(destroy) = self.destroy.take() {
            destroy();
        }
    }
}

impl std::fmt::Debug for CallbackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSource")
            .field("has_destroy", &self.destroy.is_some())
            .finish()
    }
}
