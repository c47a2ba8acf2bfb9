//! EBML primitives.
//!
//! EBML encodes every element as `ID | size | payload`, where both ID and size are
//! variable-length integers ("vints") whose width is given by the position of the first
//! set bit in the leading byte. This module provides:
//!
//! - vint decoding from slices ([`decode_vint`]) and from byte sources
//! - element header reads ([`read_element_header`])
//! - typed payload decoding (unsigned/signed integers, floats, strings)
//! - an in-memory child iterator for small master elements (Info, Tracks)

pub mod header;
mod ids;

pub use header::EbmlHeader;
pub use ids::ElementId;

use crate::source::{read_exact_at, ByteSource};
use crate::{Error, Result};

/// Widest element ID this parser accepts.
pub const MAX_ID_LENGTH: usize = 4;

/// Widest element size this parser accepts.
pub const MAX_SIZE_LENGTH: usize = 8;

/// A decoded variable-length integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vint {
    /// Value with the length marker removed.
    pub value: u64,
    /// Encoded width in bytes.
    pub width: usize,
}

impl Vint {
    /// Whether every value bit is set, the EBML encoding of "unknown size".
    pub fn is_unknown(&self) -> bool {
        self.value == max_value(self.width)
    }

    /// Value as an element size, `None` when unknown.
    pub fn as_size(&self) -> Option<u64> {
        (!self.is_unknown()).then_some(self.value)
    }

    /// Value interpreted as a signed vint (used by EBML lacing deltas).
    pub fn as_signed(&self) -> i64 {
        let bias = (1i64 << (7 * self.width - 1)) - 1;
        self.value as i64 - bias
    }
}

/// Result of decoding from a buffer that may end early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Partial<T> {
    Done(T),
    Incomplete,
}

fn max_value(width: usize) -> u64 {
    (1u64 << (7 * width)) - 1
}

/// Width of a vint from its leading byte; `None` for a zero byte.
pub fn vint_width(first: u8) -> Option<usize> {
    (first != 0).then(|| first.leading_zeros() as usize + 1)
}

/// Decode a vint from the start of `buf`.
///
/// `offset` is the absolute position of `buf[0]`, used for error reporting.
pub(crate) fn decode_vint(buf: &[u8], offset: u64) -> Result<Partial<Vint>> {
    let Some(&first) = buf.first() else {
        return Ok(Partial::Incomplete);
    };
    let width =
        vint_width(first).ok_or_else(|| Error::malformed(offset, "invalid vint leading byte"))?;
    if buf.len() < width {
        return Ok(Partial::Incomplete);
    }

    let mut value = u64::from(first) & (0xFF >> width);
    for &b in &buf[1..width] {
        value = (value << 8) | u64::from(b);
    }
    Ok(Partial::Done(Vint { value, width }))
}

/// Read a vint from `source` at `pos`, rejecting widths above `max_width`.
pub(crate) fn read_vint<S: ByteSource + ?Sized>(
    source: &S,
    pos: u64,
    max_width: usize,
) -> Result<Vint> {
    let mut buf = [0u8; MAX_SIZE_LENGTH];
    read_exact_at(source, pos, &mut buf[..1])?;
    let width =
        vint_width(buf[0]).ok_or_else(|| Error::malformed(pos, "invalid vint leading byte"))?;
    if width > max_width {
        return Err(Error::malformed(
            pos,
            format!("vint width {width} exceeds maximum {max_width}"),
        ));
    }
    if width > 1 {
        read_exact_at(source, pos + 1, &mut buf[1..width])?;
    }
    match decode_vint(&buf[..width], pos)? {
        Partial::Done(vint) => Ok(vint),
        Partial::Incomplete => Err(Error::malformed(pos, "truncated vint")),
    }
}

/// Header of one EBML element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHeader {
    pub id: ElementId,
    /// Absolute offset of the first ID byte.
    pub start: u64,
    /// Combined width of the ID and size fields.
    pub header_len: u64,
    /// Payload size, `None` when the element declares an unknown size.
    pub size: Option<u64>,
}

impl ElementHeader {
    /// Absolute offset of the first payload byte.
    pub fn payload_start(&self) -> u64 {
        self.start + self.header_len
    }

    /// Absolute offset one past the payload, `None` for unknown sizes.
    pub fn end(&self) -> Option<u64> {
        self.size.map(|size| self.payload_start() + size)
    }
}

/// Read the element header at `pos`.
pub fn read_element_header<S: ByteSource + ?Sized>(source: &S, pos: u64) -> Result<ElementHeader> {
    let id = read_vint(source, pos, MAX_ID_LENGTH)?;
    let raw_id = (id.value | (1 << (7 * id.width))) as u32;
    let size_pos = pos + id.width as u64;
    let size = read_vint(source, size_pos, MAX_SIZE_LENGTH)?;

    Ok(ElementHeader {
        id: ElementId(raw_id),
        start: pos,
        header_len: (id.width + size.width) as u64,
        size: size.as_size(),
    })
}

/// Read a whole element payload into memory, bounded by `limit`.
pub(crate) fn read_payload<S: ByteSource + ?Sized>(
    source: &S,
    header: &ElementHeader,
    limit: u64,
) -> Result<Vec<u8>> {
    let size = header.size.ok_or_else(|| {
        Error::malformed(header.start, format!("{} has unknown size", header.id))
    })?;
    if size > limit {
        return Err(Error::malformed(
            header.start,
            format!("{} payload of {size} bytes exceeds limit of {limit}", header.id),
        ));
    }
    let mut data = vec![0u8; size as usize];
    read_exact_at(source, header.payload_start(), &mut data)?;
    Ok(data)
}

/// Decode an unsigned integer payload (0 to 8 bytes, big-endian).
pub(crate) fn decode_uint(data: &[u8], offset: u64) -> Result<u64> {
    if data.len() > 8 {
        return Err(Error::malformed(
            offset,
            format!("unsigned integer of {} bytes", data.len()),
        ));
    }
    Ok(data.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

/// Decode a signed integer payload (0 to 8 bytes, big-endian two's complement).
pub(crate) fn decode_int(data: &[u8], offset: u64) -> Result<i64> {
    if data.is_empty() {
        return Ok(0);
    }
    let raw = decode_uint(data, offset)?;
    let shift = 64 - 8 * data.len() as u32;
    Ok(((raw << shift) as i64) >> shift)
}

/// Decode a float payload (0, 4 or 8 bytes).
pub(crate) fn decode_float(data: &[u8], offset: u64) -> Result<f64> {
    match data.len() {
        0 => Ok(0.0),
        4 => Ok(f64::from(f32::from_be_bytes([
            data[0], data[1], data[2], data[3],
        ]))),
        8 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(data);
            Ok(f64::from_be_bytes(buf))
        }
        n => Err(Error::malformed(offset, format!("float of {n} bytes"))),
    }
}

/// Decode a string payload, dropping trailing NUL padding.
pub(crate) fn decode_string(data: &[u8]) -> String {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// One child element inside an in-memory master payload.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Child<'a> {
    pub id: ElementId,
    /// Absolute offset of the child's header.
    pub offset: u64,
    pub data: &'a [u8],
    data_offset: u64,
}

impl<'a> Child<'a> {
    pub fn uint(&self) -> Result<u64> {
        decode_uint(self.data, self.offset)
    }

    pub fn int(&self) -> Result<i64> {
        decode_int(self.data, self.offset)
    }

    pub fn float(&self) -> Result<f64> {
        decode_float(self.data, self.offset)
    }

    pub fn string(&self) -> String {
        decode_string(self.data)
    }

    /// Iterate the children of this element.
    pub fn children(&self) -> Children<'a> {
        Children::new(self.data, self.data_offset)
    }
}

/// Iterator over the children of a master element held in memory.
///
/// Yields an error and stops when a child is malformed or overruns the payload.
#[derive(Debug, Clone)]
pub(crate) struct Children<'a> {
    data: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> Children<'a> {
    /// Iterate `data`, whose first byte sits at absolute offset `base`.
    pub fn new(data: &'a [u8], base: u64) -> Self {
        Self { data, pos: 0, base }
    }

    fn parse_child(&mut self) -> Result<Child<'a>> {
        let offset = self.base + self.pos as u64;
        let rest = &self.data[self.pos..];

        let id = match decode_vint(rest, offset)? {
            Partial::Done(id) if id.width <= MAX_ID_LENGTH => id,
            Partial::Done(_) => return Err(Error::malformed(offset, "element ID too wide")),
            Partial::Incomplete => return Err(Error::malformed(offset, "truncated element ID")),
        };
        let size = match decode_vint(&rest[id.width..], offset + id.width as u64)? {
            Partial::Done(size) => size,
            Partial::Incomplete => return Err(Error::malformed(offset, "truncated element size")),
        };

        let header_len = id.width + size.width;
        let size = size
            .as_size()
            .ok_or_else(|| Error::malformed(offset, "unknown-size child element"))?;
        let available = (rest.len() - header_len) as u64;
        if size > available {
            return Err(Error::malformed(
                offset,
                format!("child of {size} bytes overruns parent ({available} bytes left)"),
            ));
        }

        let start = self.pos + header_len;
        let end = start + size as usize;
        self.pos = end;
        Ok(Child {
            id: ElementId((id.value | (1 << (7 * id.width))) as u32),
            offset,
            data: &self.data[start..end],
            data_offset: self.base + start as u64,
        })
    }
}

impl<'a> Iterator for Children<'a> {
    type Item = Result<Child<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        let child = self.parse_child();
        if child.is_err() {
            self.pos = self.data.len();
        }
        Some(child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemorySource, StreamBuffer};
    use assert_matches::assert_matches;

    #[test]
    fn test_vint_width() {
        assert_eq!(vint_width(0x80), Some(1));
        assert_eq!(vint_width(0x40), Some(2));
        assert_eq!(vint_width(0x1A), Some(4));
        assert_eq!(vint_width(0x01), Some(8));
        assert_eq!(vint_width(0x00), None);
    }

    #[test]
    fn test_decode_vint() {
        assert_eq!(
            decode_vint(&[0x81], 0).unwrap(),
            Partial::Done(Vint { value: 1, width: 1 })
        );
        assert_eq!(
            decode_vint(&[0x40, 0x02], 0).unwrap(),
            Partial::Done(Vint { value: 2, width: 2 })
        );
        assert_eq!(decode_vint(&[0x40], 0).unwrap(), Partial::Incomplete);
        assert_eq!(decode_vint(&[], 0).unwrap(), Partial::Incomplete);
        assert_matches!(
            decode_vint(&[0x00, 0x01], 7),
            Err(Error::MalformedStructure { offset: 7, .. })
        );
    }

    #[test]
    fn test_unknown_size() {
        let vint = Vint {
            value: 0x7F,
            width: 1,
        };
        assert!(vint.is_unknown());
        assert_eq!(vint.as_size(), None);

        let vint = Vint {
            value: (1 << 56) - 1,
            width: 8,
        };
        assert!(vint.is_unknown());
    }

    #[test]
    fn test_signed_vint() {
        // 0xBF is the one-byte encoding of 0.
        assert_eq!(Vint { value: 63, width: 1 }.as_signed(), 0);
        assert_eq!(Vint { value: 0, width: 1 }.as_signed(), -63);
        assert_eq!(Vint { value: 64, width: 1 }.as_signed(), 1);
        assert_eq!(Vint { value: 8191, width: 2 }.as_signed(), 0);
    }

    #[test]
    fn test_read_element_header() {
        // Segment ID, 8-byte size of 0x10.
        let source = MemorySource::new(vec![
            0x18, 0x53, 0x80, 0x67, 0x01, 0, 0, 0, 0, 0, 0, 0x10,
        ]);
        let header = read_element_header(&source, 0).unwrap();
        assert_eq!(header.id, ElementId::SEGMENT);
        assert_eq!(header.header_len, 12);
        assert_eq!(header.size, Some(0x10));
        assert_eq!(header.payload_start(), 12);
        assert_eq!(header.end(), Some(28));
    }

    #[test]
    fn test_read_element_header_unknown_size() {
        let source = MemorySource::new(vec![0x1F, 0x43, 0xB6, 0x75, 0xFF]);
        let header = read_element_header(&source, 0).unwrap();
        assert_eq!(header.id, ElementId::CLUSTER);
        assert_eq!(header.size, None);
        assert_eq!(header.end(), None);
    }

    #[test]
    fn test_read_element_header_short() {
        let stream = StreamBuffer::new();
        stream.push(&[0x1F, 0x43]);
        assert_matches!(
            read_element_header(&stream, 0),
            Err(Error::ShortRead { pos: 1, len: 3 })
        );
    }

    #[test]
    fn test_read_element_header_wide_id() {
        let source = MemorySource::new(vec![0x08, 0, 0, 0, 0, 0x80]);
        assert_matches!(
            read_element_header(&source, 0),
            Err(Error::MalformedStructure { offset: 0, .. })
        );
    }

    #[test]
    fn test_read_payload_limit() {
        let source = MemorySource::new(vec![0xEC, 0x84, 1, 2, 3, 4]);
        let header = read_element_header(&source, 0).unwrap();
        assert_eq!(read_payload(&source, &header, 16).unwrap(), vec![1, 2, 3, 4]);
        assert_matches!(
            read_payload(&source, &header, 2),
            Err(Error::MalformedStructure { .. })
        );
    }

    #[test]
    fn test_decode_values() {
        assert_eq!(decode_uint(&[], 0).unwrap(), 0);
        assert_eq!(decode_uint(&[0x0F, 0x42, 0x40], 0).unwrap(), 1_000_000);
        assert_eq!(decode_int(&[0xFF], 0).unwrap(), -1);
        assert_eq!(decode_int(&[0xFF, 0x38], 0).unwrap(), -200);
        assert_eq!(decode_int(&[0x00, 0xC8], 0).unwrap(), 200);
        assert_eq!(decode_float(&44100.0f32.to_be_bytes(), 0).unwrap(), 44100.0);
        assert_eq!(decode_float(&48000.0f64.to_be_bytes(), 0).unwrap(), 48000.0);
        assert!(decode_float(&[0, 0], 0).is_err());
        assert_eq!(decode_string(b"webm\0\0"), "webm");
    }

    #[test]
    fn test_children() {
        // DocType "webm", then Void of 1 byte.
        let data = [0x42, 0x82, 0x84, b'w', b'e', b'b', b'm', 0xEC, 0x81, 0x00];
        let children: Vec<_> = Children::new(&data, 100)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].id, ElementId::DOC_TYPE);
        assert_eq!(children[0].offset, 100);
        assert_eq!(children[0].string(), "webm");
        assert_eq!(children[1].id, ElementId::VOID);
        assert_eq!(children[1].offset, 107);
    }

    #[test]
    fn test_children_overrun() {
        let data = [0xEC, 0x85, 0x00];
        let mut iter = Children::new(&data, 0);
        assert_matches!(iter.next(), Some(Err(Error::MalformedStructure { .. })));
        assert!(iter.next().is_none());
    }
}
