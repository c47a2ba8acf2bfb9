//! Blocks, block entries and frames.
//!
//! A block's header and lace table are decoded from a small prefix of the element; frame
//! payloads are never copied; a [`Frame`] is only a byte range into the source.

use super::Cluster;
use crate::ebml::{decode_vint, Partial};
use crate::segment::SegmentInfo;
use crate::source::{read_exact_at, ByteSource};
use crate::{Error, Result};
use bytes::Bytes;

/// SimpleBlock flag: the block is a sync point.
pub const FLAG_KEYFRAME: u8 = 0x80;
/// Block flag: the frames must be decoded but not shown.
pub const FLAG_INVISIBLE: u8 = 0x08;
/// Bits 1-2 of the flags byte select the lacing mode.
pub const LACING_MASK: u8 = 0x06;
/// SimpleBlock flag: frames may be dropped without affecting decoding.
pub const FLAG_DISCARDABLE: u8 = 0x01;

/// Initial prefix read when decoding a block header.
const HEADER_PROBE: u64 = 64;

/// How a block packs multiple frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Lacing {
    None,
    Xiph,
    Fixed,
    Ebml,
}

impl Lacing {
    /// Lacing mode encoded in a block flags byte.
    pub fn from_flags(flags: u8) -> Self {
        match (flags & LACING_MASK) >> 1 {
            0 => Self::None,
            1 => Self::Xiph,
            2 => Self::Fixed,
            _ => Self::Ebml,
        }
    }

    /// Flag bits selecting this lacing mode.
    pub fn flag_bits(self) -> u8 {
        let mode = match self {
            Self::None => 0,
            Self::Xiph => 1,
            Self::Fixed => 2,
            Self::Ebml => 3,
        };
        mode << 1
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Xiph => "xiph",
            Self::Fixed => "fixed",
            Self::Ebml => "ebml",
        }
    }
}

/// Byte range of one coded frame in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Frame {
    /// Absolute offset of the first byte.
    pub pos: u64,
    /// Length in bytes.
    pub len: u64,
}

impl Frame {
    /// Read the frame into the front of `buf`, returning the number of bytes written.
    ///
    /// Issues exactly one source read. Fails with [`Error::BufferTooSmall`] when `buf`
    /// cannot hold the frame; otherwise errors are exactly what the source reports.
    pub fn read<S: ByteSource + ?Sized>(&self, source: &S, buf: &mut [u8]) -> Result<usize> {
        let len = self.len_usize()?;
        if buf.len() < len {
            return Err(Error::BufferTooSmall {
                need: len,
                have: buf.len(),
            });
        }
        source.read(self.pos, &mut buf[..len])?;
        Ok(len)
    }

    /// Read the frame into a freshly allocated buffer.
    pub fn read_bytes<S: ByteSource + ?Sized>(&self, source: &S) -> Result<Bytes> {
        let mut buf = vec![0u8; self.len_usize()?];
        source.read(self.pos, &mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Offset one past the last byte.
    pub fn end(&self) -> u64 {
        self.pos + self.len
    }

    fn len_usize(&self) -> Result<usize> {
        usize::try_from(self.len)
            .map_err(|_| Error::unsupported(format!("frame of {} bytes", self.len)))
    }
}

/// One entry of a cluster.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockEntry {
    /// A `SimpleBlock` element.
    Simple(Block),
    /// A `BlockGroup` element and its `Block`.
    Group(Block),
    /// End-of-stream sentinel; carries no block.
    EndOfStream,
}

impl BlockEntry {
    pub fn eos(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }

    /// The wrapped block, `None` for the sentinel.
    pub fn block(&self) -> Option<&Block> {
        match self {
            Self::Simple(block) | Self::Group(block) => Some(block),
            Self::EndOfStream => None,
        }
    }

    pub fn is_simple(&self) -> bool {
        matches!(self, Self::Simple(_))
    }
}

/// Extra fields a `BlockGroup` carries around its `Block`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct GroupFields {
    pub duration: Option<u64>,
    pub reference: Option<i64>,
    pub discard_padding: i64,
}

/// One or more coded frames sharing a track and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    track_number: u64,
    timecode: i16,
    flags: u8,
    key: bool,
    lacing: Lacing,
    frames: Vec<Frame>,
    position: u64,
    size: u64,
    duration: Option<u64>,
    reference: Option<i64>,
    discard_padding: i64,
}

impl Block {
    /// Parse a `SimpleBlock` whose payload occupies `size` bytes at `pos`.
    pub(crate) fn parse_simple<S: ByteSource + ?Sized>(
        source: &S,
        pos: u64,
        size: u64,
        max_lace_frames: usize,
    ) -> Result<Self> {
        let mut block = Self::parse(source, pos, size, max_lace_frames)?;
        block.key = block.flags & FLAG_KEYFRAME != 0 && block.frames.len() == 1;
        Ok(block)
    }

    /// Parse the `Block` inside a `BlockGroup`.
    ///
    /// The block flags byte has no keyframe bit; a group is a sync point when it
    /// references no other block.
    pub(crate) fn parse_grouped<S: ByteSource + ?Sized>(
        source: &S,
        pos: u64,
        size: u64,
        max_lace_frames: usize,
        group: GroupFields,
    ) -> Result<Self> {
        let mut block = Self::parse(source, pos, size, max_lace_frames)?;
        block.key = group.reference.is_none() && block.frames.len() == 1;
        block.duration = group.duration;
        block.reference = group.reference;
        block.discard_padding = group.discard_padding;
        Ok(block)
    }

    fn parse<S: ByteSource + ?Sized>(
        source: &S,
        pos: u64,
        size: u64,
        max_lace_frames: usize,
    ) -> Result<Self> {
        if size < 4 {
            return Err(Error::malformed(pos, format!("block of {size} bytes")));
        }

        // Grow the prefix until the whole lace table fits; frames are never read.
        let mut probe = size.min(HEADER_PROBE);
        let layout = loop {
            let mut prefix = vec![0u8; probe as usize];
            read_exact_at(source, pos, &mut prefix)?;
            match decode_layout(&prefix, pos, size, max_lace_frames)? {
                Partial::Done(layout) => break layout,
                Partial::Incomplete if probe == size => {
                    return Err(Error::malformed(pos, "lace table overruns block"));
                }
                Partial::Incomplete => probe = size.min(probe * 2),
            }
        };

        let mut frames = Vec::with_capacity(layout.sizes.len());
        let mut frame_pos = pos + layout.header_len;
        for len in layout.sizes {
            frames.push(Frame {
                pos: frame_pos,
                len,
            });
            frame_pos = frame_pos
                .checked_add(len)
                .ok_or_else(|| Error::malformed(pos, "laced frame sizes overflow"))?;
        }

        tracing::trace!(
            track = layout.track_number,
            timecode = layout.timecode,
            frames = frames.len(),
            lacing = layout.lacing.as_str(),
            "parsed block"
        );

        Ok(Self {
            track_number: layout.track_number,
            timecode: layout.timecode,
            flags: layout.flags,
            key: false,
            lacing: layout.lacing,
            frames,
            position: pos,
            size,
            duration: None,
            reference: None,
            discard_padding: 0,
        })
    }

    /// Track this block belongs to; resolve it through
    /// [`Tracks::get_by_number`](crate::Tracks::get_by_number).
    pub fn track_number(&self) -> u64 {
        self.track_number
    }

    /// Timecode relative to the enclosing cluster, in ticks.
    pub fn time_code(&self) -> i16 {
        self.timecode
    }

    /// Absolute timecode in ticks: cluster base plus the relative timecode.
    pub fn time(&self, cluster: &Cluster) -> i64 {
        cluster.time().saturating_add(i64::from(self.timecode))
    }

    /// Absolute presentation time in nanoseconds.
    pub fn time_ns(&self, cluster: &Cluster, info: &SegmentInfo) -> i64 {
        info.ticks_to_nanos(self.time(cluster))
    }

    /// Whether this block is a sync point.
    ///
    /// Laced blocks are never keys, whatever their flags say.
    pub fn is_key(&self) -> bool {
        self.key
    }

    pub fn is_invisible(&self) -> bool {
        self.flags & FLAG_INVISIBLE != 0
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn lacing(&self) -> Lacing {
        self.lacing
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Nanoseconds of decoded audio to drop from the end, 0 if none.
    pub fn discard_padding(&self) -> i64 {
        self.discard_padding
    }

    /// `BlockDuration` in ticks, only present for grouped blocks that declare one.
    pub fn duration(&self) -> Option<u64> {
        self.duration
    }

    /// Relative timecode of the first `ReferenceBlock`, if the group had one.
    pub fn reference(&self) -> Option<i64> {
        self.reference
    }

    /// Absolute offset of the block payload.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Size of the block payload in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }
}

#[derive(Debug)]
struct Layout {
    track_number: u64,
    timecode: i16,
    flags: u8,
    lacing: Lacing,
    header_len: u64,
    sizes: Vec<u64>,
}

/// Decode block header and lace table from `prefix`, the first bytes of a block payload
/// of `size` bytes at `pos`.
fn decode_layout(
    prefix: &[u8],
    pos: u64,
    size: u64,
    max_lace_frames: usize,
) -> Result<Partial<Layout>> {
    let track = match decode_vint(prefix, pos)? {
        Partial::Done(track) => track,
        Partial::Incomplete => return Ok(Partial::Incomplete),
    };
    if track.value == 0 {
        return Err(Error::malformed(pos, "block track number 0"));
    }

    let mut at = track.width;
    let Some(fixed) = prefix.get(at..at + 3) else {
        return Ok(Partial::Incomplete);
    };
    let timecode = i16::from_be_bytes([fixed[0], fixed[1]]);
    let flags = fixed[2];
    at += 3;

    let lacing = Lacing::from_flags(flags);
    let sizes = match lacing {
        Lacing::None => {
            let len = size.saturating_sub(at as u64);
            if len == 0 {
                return Err(Error::malformed(pos, "block has no frame data"));
            }
            return Ok(Partial::Done(Layout {
                track_number: track.value,
                timecode,
                flags,
                lacing,
                header_len: at as u64,
                sizes: vec![len],
            }));
        }
        _ => {
            let Some(&count) = prefix.get(at) else {
                return Ok(Partial::Incomplete);
            };
            at += 1;
            let count = usize::from(count) + 1;
            if count > max_lace_frames {
                return Err(Error::malformed(
                    pos,
                    format!("{count} laced frames exceeds limit of {max_lace_frames}"),
                ));
            }
            let table_pos = pos + at as u64;
            let sizes = match lacing {
                Lacing::Xiph => xiph_sizes(&prefix[at..], table_pos, size, count)?,
                Lacing::Ebml => ebml_sizes(&prefix[at..], table_pos, size, count)?,
                _ => Some((Vec::new(), 0)),
            };
            let Some((mut sizes, table_len)) = sizes else {
                return Ok(Partial::Incomplete);
            };
            at += table_len;

            let remaining = size.checked_sub(at as u64).ok_or_else(|| {
                Error::malformed(pos, "lace table overruns block")
            })?;
            if lacing == Lacing::Fixed {
                if remaining == 0 || remaining % count as u64 != 0 {
                    return Err(Error::malformed(
                        pos,
                        format!("{remaining} bytes do not split into {count} equal frames"),
                    ));
                }
                sizes = vec![remaining / count as u64; count];
            } else {
                // Each table keeps its running total within `size`, so this cannot wrap.
                let used: u64 = sizes.iter().sum();
                let last = remaining.checked_sub(used).filter(|last| *last > 0).ok_or_else(|| {
                    Error::malformed(pos, format!("laced frame sizes ({used} bytes) overrun block"))
                })?;
                sizes.push(last);
            }
            sizes
        }
    };

    Ok(Partial::Done(Layout {
        track_number: track.value,
        timecode,
        flags,
        lacing,
        header_len: at as u64,
        sizes,
    }))
}

/// Xiph lace table: every size but the last as a run of 255s plus a final byte.
///
/// Returns `None` when `table` ends early.
fn xiph_sizes(
    table: &[u8],
    offset: u64,
    limit: u64,
    count: usize,
) -> Result<Option<(Vec<u64>, usize)>> {
    let mut sizes = Vec::with_capacity(count);
    let mut at = 0;
    let mut total = 0u64;
    for _ in 0..count - 1 {
        let mut size = 0u64;
        loop {
            let Some(&byte) = table.get(at) else {
                return Ok(None);
            };
            at += 1;
            size += u64::from(byte);
            if byte != 255 {
                break;
            }
        }
        total = push_lace_size(&mut sizes, size, total, offset, limit)?;
    }
    Ok(Some((sizes, at)))
}

/// EBML lace table: first size as a vint, the rest as signed vint deltas.
fn ebml_sizes(
    table: &[u8],
    offset: u64,
    limit: u64,
    count: usize,
) -> Result<Option<(Vec<u64>, usize)>> {
    let mut sizes = Vec::with_capacity(count);
    let first = match decode_vint(table, offset)? {
        Partial::Done(first) => first,
        Partial::Incomplete => return Ok(None),
    };
    let mut at = first.width;
    let mut total = push_lace_size(&mut sizes, first.value, 0, offset, limit)?;
    let mut prev = first.value;

    for _ in 1..count - 1 {
        let delta = match decode_vint(&table[at..], offset + at as u64)? {
            Partial::Done(delta) => delta,
            Partial::Incomplete => return Ok(None),
        };
        at += delta.width;
        let size = prev
            .checked_add_signed(delta.as_signed())
            .ok_or_else(|| Error::malformed(offset, "EBML lacing yields negative frame size"))?;
        total = push_lace_size(&mut sizes, size, total, offset, limit)?;
        prev = size;
    }
    Ok(Some((sizes, at)))
}

/// Record one lace entry, rejecting empty frames and tables whose running total
/// exceeds the block. Returns the new total.
fn push_lace_size(
    sizes: &mut Vec<u64>,
    size: u64,
    total: u64,
    offset: u64,
    limit: u64,
) -> Result<u64> {
    if size == 0 {
        return Err(Error::malformed(offset, "zero-length laced frame"));
    }
    let total = total
        .checked_add(size)
        .filter(|total| *total <= limit)
        .ok_or_else(|| Error::malformed(offset, "laced frame sizes overflow"))?;
    sizes.push(size);
    Ok(total)
}
