//! Error types for mkvdemux-core.

use std::io;
use thiserror::Error;

/// Result type for mkvdemux-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Status code reported for a successful call.
pub const STATUS_OK: i32 = 0;

/// Error type for mkvdemux-core operations.
///
/// `ShortRead` is the only recoverable variant: it means the byte source cannot
/// supply the requested range yet, and the same call should be retried once more
/// bytes are available.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error reported by the byte source.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The requested byte range is not available yet.
    #[error("Short read: {len} bytes at offset {pos} not yet available")]
    ShortRead { pos: u64, len: u64 },

    /// The leading EBML header does not identify a supported stream.
    #[error("Malformed EBML header: {0}")]
    MalformedHeader(String),

    /// Element bytes do not match the expected grammar.
    #[error("Malformed structure at offset {offset}: {reason}")]
    MalformedStructure { offset: u64, reason: String },

    /// A required element is missing from an otherwise well-formed stream.
    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    /// Lookup miss, e.g. an unknown track number.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller buffer too small for the requested read.
    #[error("Buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },

    /// Unsupported feature.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    /// Create a malformed structure error.
    pub fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        Self::MalformedStructure {
            offset,
            reason: reason.into(),
        }
    }

    /// Create a malformed header error.
    pub fn malformed_header(msg: impl Into<String>) -> Self {
        Self::MalformedHeader(msg.into())
    }

    /// Create an invalid structure error.
    pub fn invalid_structure(msg: impl Into<String>) -> Self {
        Self::InvalidStructure(msg.into())
    }

    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Whether the call can be retried once the source has more bytes.
    pub fn is_short_read(&self) -> bool {
        matches!(self, Self::ShortRead { .. })
    }

    /// Small integer status code for embedders that speak in codes.
    pub fn code(&self) -> i32 {
        match self {
            Self::Io(_) => -1,
            Self::MalformedHeader(_)
            | Self::MalformedStructure { .. }
            | Self::InvalidStructure(_) => -2,
            Self::ShortRead { .. } => -3,
            Self::NotFound(_) => -4,
            Self::BufferTooSmall { .. } => -5,
            Self::Unsupported(_) => -6,
        }
    }
}

/// Status code of a result: [`STATUS_OK`] on success, [`Error::code`] otherwise.
pub fn status_code<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => STATUS_OK,
        Err(e) => e.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ShortRead { pos: 10, len: 4 };
        assert_eq!(
            err.to_string(),
            "Short read: 4 bytes at offset 10 not yet available"
        );

        let err = Error::malformed(42, "bad vint");
        assert_eq!(err.to_string(), "Malformed structure at offset 42: bad vint");

        let err = Error::not_found("track 7");
        assert_eq!(err.to_string(), "Not found: track 7");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(status_code::<()>(&Ok(())), STATUS_OK);
        assert_eq!(Error::ShortRead { pos: 0, len: 1 }.code(), -3);
        assert_eq!(Error::malformed_header("x").code(), -2);
        assert_eq!(Error::invalid_structure("x").code(), -2);
        assert_eq!(Error::not_found("x").code(), -4);
        assert_eq!(Error::from(io::Error::other("disk")).code(), -1);
    }

    #[test]
    fn test_is_short_read() {
        assert!(Error::ShortRead { pos: 0, len: 1 }.is_short_read());
        assert!(!Error::malformed(0, "x").is_short_read());
    }
}
