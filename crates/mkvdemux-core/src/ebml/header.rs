//! EBML header parsing.

use super::{read_element_header, read_payload, Children, ElementId, MAX_ID_LENGTH, MAX_SIZE_LENGTH};
use crate::source::{read_exact_at, ByteSource};
use crate::{Error, Result};

/// Highest EBML read version this parser understands.
pub const SUPPORTED_EBML_READ_VERSION: u64 = 1;

/// Doc types accepted in the EBML header.
pub const SUPPORTED_DOC_TYPES: &[&str] = &["matroska", "webm"];

/// Upper bound on the header payload; real headers are a few dozen bytes.
const MAX_HEADER_SIZE: u64 = 4096;

/// The stream's leading EBML identification block.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EbmlHeader {
    pub version: u64,
    pub read_version: u64,
    pub max_id_length: u64,
    pub max_size_length: u64,
    pub doc_type: String,
    pub doc_type_version: u64,
    pub doc_type_read_version: u64,
    position: u64,
    end: u64,
}

impl Default for EbmlHeader {
    fn default() -> Self {
        Self {
            version: 1,
            read_version: 1,
            max_id_length: MAX_ID_LENGTH as u64,
            max_size_length: MAX_SIZE_LENGTH as u64,
            doc_type: "matroska".to_string(),
            doc_type_version: 1,
            doc_type_read_version: 1,
            position: 0,
            end: 0,
        }
    }
}

impl EbmlHeader {
    /// Parse and validate the EBML header at `pos`.
    ///
    /// On success [`segment_offset`](Self::segment_offset) is where Segment content
    /// begins. Fails with [`Error::MalformedHeader`] when the bytes at `pos` are not a
    /// supported Matroska/WebM header, and with [`Error::ShortRead`] when the header is
    /// not fully available yet.
    pub fn parse<S: ByteSource + ?Sized>(source: &S, pos: u64) -> Result<Self> {
        let mut magic = [0u8; 4];
        read_exact_at(source, pos, &mut magic).map_err(into_header_error)?;
        if ElementId(u32::from_be_bytes(magic)) != ElementId::EBML {
            return Err(Error::malformed_header(format!(
                "expected EBML magic 1A45DFA3 at offset {pos}, found {:02X}{:02X}{:02X}{:02X}",
                magic[0], magic[1], magic[2], magic[3]
            )));
        }

        let element = read_element_header(source, pos).map_err(into_header_error)?;
        let size = element
            .size
            .ok_or_else(|| Error::malformed_header("EBML header has unknown size"))?;
        if size > MAX_HEADER_SIZE {
            return Err(Error::malformed_header(format!(
                "EBML header of {size} bytes is implausibly large"
            )));
        }
        let payload = read_payload(source, &element, MAX_HEADER_SIZE).map_err(into_header_error)?;

        let mut header = Self {
            position: pos,
            end: element.payload_start() + size,
            ..Self::default()
        };
        for child in Children::new(&payload, element.payload_start()) {
            let child = child.map_err(into_header_error)?;
            match child.id {
                ElementId::EBML_VERSION => header.version = child.uint()?,
                ElementId::EBML_READ_VERSION => header.read_version = child.uint()?,
                ElementId::EBML_MAX_ID_LENGTH => header.max_id_length = child.uint()?,
                ElementId::EBML_MAX_SIZE_LENGTH => header.max_size_length = child.uint()?,
                ElementId::DOC_TYPE => header.doc_type = child.string(),
                ElementId::DOC_TYPE_VERSION => header.doc_type_version = child.uint()?,
                ElementId::DOC_TYPE_READ_VERSION => header.doc_type_read_version = child.uint()?,
                _ => {}
            }
        }

        header.validate()?;
        tracing::debug!(
            doc_type = %header.doc_type,
            doc_type_version = header.doc_type_version,
            segment_offset = header.end,
            "parsed EBML header"
        );
        Ok(header)
    }

    fn validate(&self) -> Result<()> {
        if self.read_version == 0 || self.read_version > SUPPORTED_EBML_READ_VERSION {
            return Err(Error::malformed_header(format!(
                "unsupported EBML read version {}",
                self.read_version
            )));
        }
        if self.max_id_length == 0 || self.max_id_length > MAX_ID_LENGTH as u64 {
            return Err(Error::malformed_header(format!(
                "unsupported EBML max ID length {}",
                self.max_id_length
            )));
        }
        if self.max_size_length == 0 || self.max_size_length > MAX_SIZE_LENGTH as u64 {
            return Err(Error::malformed_header(format!(
                "unsupported EBML max size length {}",
                self.max_size_length
            )));
        }
        if !SUPPORTED_DOC_TYPES.contains(&self.doc_type.as_str()) {
            return Err(Error::malformed_header(format!(
                "unsupported doc type {:?}",
                self.doc_type
            )));
        }
        if self.doc_type_read_version == 0 || self.doc_type_read_version > self.doc_type_version {
            return Err(Error::malformed_header(format!(
                "doc type read version {} inconsistent with doc type version {}",
                self.doc_type_read_version, self.doc_type_version
            )));
        }
        Ok(())
    }

    /// Offset the header was parsed from.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Offset immediately after the header, where Segment content begins.
    pub fn segment_offset(&self) -> u64 {
        self.end
    }

    pub fn is_webm(&self) -> bool {
        self.doc_type == "webm"
    }
}

/// Structural errors inside the header are reported as header errors; short reads and
/// I/O failures pass through unchanged.
fn into_header_error(err: Error) -> Error {
    match err {
        Error::MalformedStructure { offset, reason } => {
            Error::malformed_header(format!("{reason} (offset {offset})"))
        }
        other => other,
    }
}
