//! EBML fixture builder for tests and benchmarks.
//!
//! Every function returns the complete serialized element, so fixtures compose by
//! nesting calls: `stream("webm", &[info(..), tracks(..), cluster(..)])` yields a full
//! EBML header plus Segment.

use crate::cluster::{Lacing, FLAG_KEYFRAME};
use crate::ebml::ElementId;
use bytes::{BufMut, BytesMut};

/// 8-byte encoding of "unknown size".
pub const UNKNOWN_SIZE: [u8; 8] = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

/// Append an element ID.
pub fn put_id(buf: &mut BytesMut, id: ElementId) {
    buf.put_uint(u64::from(id.0), id.len());
}

/// Append `value` as the shortest vint that can hold it.
pub fn put_vint(buf: &mut BytesMut, value: u64) {
    let width = (1..=8usize)
        .find(|w| value < (1u64 << (7 * w)) - 1)
        .unwrap_or(8);
    buf.put_uint(value | (1u64 << (7 * width)), width);
}

/// Append `value` as an EBML-lacing signed vint.
fn put_signed_vint(buf: &mut BytesMut, value: i64) {
    let width = (1..=8usize)
        .find(|w| value.unsigned_abs() < (1u64 << (7 * w - 1)))
        .unwrap_or(8);
    let bias = (1i64 << (7 * width - 1)) - 1;
    buf.put_uint((value + bias) as u64 | (1u64 << (7 * width)), width);
}

/// Element with a raw payload.
pub fn element(id: ElementId, payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(payload.len() + 12);
    put_id(&mut buf, id);
    put_vint(&mut buf, payload.len() as u64);
    buf.put_slice(payload);
    buf.to_vec()
}

/// Master element wrapping already-serialized children.
pub fn master(id: ElementId, children: &[Vec<u8>]) -> Vec<u8> {
    element(id, &children.concat())
}

/// Master element declaring an unknown size.
pub fn unknown_size_master(id: ElementId, children: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    put_id(&mut buf, id);
    buf.put_slice(&UNKNOWN_SIZE);
    for child in children {
        buf.put_slice(child);
    }
    buf.to_vec()
}

pub fn uint(id: ElementId, value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(7);
    element(id, &bytes[skip..])
}

pub fn int(id: ElementId, value: i64) -> Vec<u8> {
    element(id, &value.to_be_bytes())
}

pub fn float(id: ElementId, value: f64) -> Vec<u8> {
    element(id, &value.to_be_bytes())
}

pub fn string(id: ElementId, value: &str) -> Vec<u8> {
    element(id, value.as_bytes())
}

/// EBML header for `doc_type`.
pub fn ebml_header(doc_type: &str) -> Vec<u8> {
    master(
        ElementId::EBML,
        &[
            uint(ElementId::EBML_VERSION, 1),
            uint(ElementId::EBML_READ_VERSION, 1),
            uint(ElementId::EBML_MAX_ID_LENGTH, 4),
            uint(ElementId::EBML_MAX_SIZE_LENGTH, 8),
            string(ElementId::DOC_TYPE, doc_type),
            uint(ElementId::DOC_TYPE_VERSION, 4),
            uint(ElementId::DOC_TYPE_READ_VERSION, 2),
        ],
    )
}

/// Segment Info with the given timecode scale.
pub fn info(timecode_scale: u64) -> Vec<u8> {
    master(
        ElementId::INFO,
        &[
            uint(ElementId::TIMECODE_SCALE, timecode_scale),
            string(ElementId::MUXING_APP, "mkvdemux-testing"),
            string(ElementId::WRITING_APP, "mkvdemux-testing"),
        ],
    )
}

/// Builder for one `TrackEntry`.
#[derive(Debug, Clone)]
pub struct TrackBuilder {
    number: u64,
    track_type: u64,
    codec_id: String,
    codec_private: Option<Vec<u8>>,
    settings: Option<Vec<u8>>,
    extra: Vec<Vec<u8>>,
}

impl TrackBuilder {
    pub fn audio(number: u64, codec_id: &str, sampling_rate: f64, channels: u64, bit_depth: u64) -> Self {
        let mut children = vec![
            float(ElementId::SAMPLING_FREQUENCY, sampling_rate),
            uint(ElementId::CHANNELS, channels),
        ];
        if bit_depth > 0 {
            children.push(uint(ElementId::BIT_DEPTH, bit_depth));
        }
        Self::new(number, 2, codec_id, Some(master(ElementId::AUDIO, &children)))
    }

    pub fn video(number: u64, codec_id: &str, width: u64, height: u64) -> Self {
        let children = [
            uint(ElementId::PIXEL_WIDTH, width),
            uint(ElementId::PIXEL_HEIGHT, height),
        ];
        Self::new(number, 1, codec_id, Some(master(ElementId::VIDEO, &children)))
    }

    pub fn other(number: u64, track_type: u64, codec_id: &str) -> Self {
        Self::new(number, track_type, codec_id, None)
    }

    fn new(number: u64, track_type: u64, codec_id: &str, settings: Option<Vec<u8>>) -> Self {
        Self {
            number,
            track_type,
            codec_id: codec_id.to_string(),
            codec_private: None,
            settings,
            extra: Vec::new(),
        }
    }

    pub fn codec_private(mut self, data: &[u8]) -> Self {
        self.codec_private = Some(data.to_vec());
        self
    }

    /// Replace the Video/Audio settings element wholesale.
    pub fn settings(mut self, element: Vec<u8>) -> Self {
        self.settings = Some(element);
        self
    }

    /// Append an arbitrary child element to the entry.
    pub fn child(mut self, element: Vec<u8>) -> Self {
        self.extra.push(element);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut children = vec![
            uint(ElementId::TRACK_NUMBER, self.number),
            uint(ElementId::TRACK_UID, self.number * 1000 + 7),
            uint(ElementId::TRACK_TYPE, self.track_type),
            string(ElementId::CODEC_ID, &self.codec_id),
        ];
        if let Some(private) = &self.codec_private {
            children.push(element(ElementId::CODEC_PRIVATE, private));
        }
        if let Some(settings) = &self.settings {
            children.push(settings.clone());
        }
        children.extend(self.extra.iter().cloned());
        master(ElementId::TRACK_ENTRY, &children)
    }
}

/// Tracks element holding `entries`.
pub fn tracks(entries: &[TrackBuilder]) -> Vec<u8> {
    let children: Vec<Vec<u8>> = entries.iter().map(TrackBuilder::build).collect();
    master(ElementId::TRACKS, &children)
}

/// Block payload (header, lace table, frames) shared by SimpleBlock and Block.
pub fn block_payload(track: u64, timecode: i16, flags: u8, lacing: Lacing, frames: &[&[u8]]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    put_vint(&mut buf, track);
    buf.put_i16(timecode);
    buf.put_u8((flags & !crate::cluster::LACING_MASK) | lacing.flag_bits());

    if lacing != Lacing::None {
        buf.put_u8((frames.len() - 1) as u8);
        let head = &frames[..frames.len() - 1];
        match lacing {
            Lacing::Xiph => {
                for frame in head {
                    let mut len = frame.len();
                    while len >= 255 {
                        buf.put_u8(255);
                        len -= 255;
                    }
                    buf.put_u8(len as u8);
                }
            }
            Lacing::Ebml => {
                if let Some(first) = head.first() {
                    put_vint(&mut buf, first.len() as u64);
                }
                for pair in head.windows(2) {
                    put_signed_vint(&mut buf, pair[1].len() as i64 - pair[0].len() as i64);
                }
            }
            _ => {}
        }
    }

    for frame in frames {
        buf.put_slice(frame);
    }
    buf.to_vec()
}

/// Unlaced SimpleBlock holding one frame.
pub fn simple_block(track: u64, timecode: i16, keyframe: bool, frame: &[u8]) -> Vec<u8> {
    let flags = if keyframe { FLAG_KEYFRAME } else { 0 };
    element(
        ElementId::SIMPLE_BLOCK,
        &block_payload(track, timecode, flags, Lacing::None, &[frame]),
    )
}

/// Laced SimpleBlock.
pub fn laced_block(track: u64, timecode: i16, flags: u8, lacing: Lacing, frames: &[&[u8]]) -> Vec<u8> {
    element(
        ElementId::SIMPLE_BLOCK,
        &block_payload(track, timecode, flags, lacing, frames),
    )
}

/// Builder for a `BlockGroup` entry.
#[derive(Debug, Clone)]
pub struct BlockGroupBuilder {
    track: u64,
    timecode: i16,
    frame: Vec<u8>,
    duration: Option<u64>,
    reference: Option<i64>,
    discard_padding: Option<i64>,
}

impl BlockGroupBuilder {
    pub fn new(track: u64, timecode: i16, frame: &[u8]) -> Self {
        Self {
            track,
            timecode,
            frame: frame.to_vec(),
            duration: None,
            reference: None,
            discard_padding: None,
        }
    }

    pub fn duration(mut self, ticks: u64) -> Self {
        self.duration = Some(ticks);
        self
    }

    pub fn reference(mut self, relative: i64) -> Self {
        self.reference = Some(relative);
        self
    }

    pub fn discard_padding(mut self, nanos: i64) -> Self {
        self.discard_padding = Some(nanos);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let payload = block_payload(self.track, self.timecode, 0, Lacing::None, &[self.frame.as_slice()]);
        let mut children = vec![element(ElementId::BLOCK, &payload)];
        if let Some(duration) = self.duration {
            children.push(uint(ElementId::BLOCK_DURATION, duration));
        }
        if let Some(reference) = self.reference {
            children.push(int(ElementId::REFERENCE_BLOCK, reference));
        }
        if let Some(padding) = self.discard_padding {
            children.push(int(ElementId::DISCARD_PADDING, padding));
        }
        master(ElementId::BLOCK_GROUP, &children)
    }
}

/// Cluster with a base timecode followed by `entries`.
pub fn cluster(timecode: u64, entries: &[Vec<u8>]) -> Vec<u8> {
    let mut children = vec![uint(ElementId::TIMECODE, timecode)];
    children.extend_from_slice(entries);
    master(ElementId::CLUSTER, &children)
}

/// Cluster of unknown size, as written by live muxers.
pub fn unknown_size_cluster(timecode: u64, entries: &[Vec<u8>]) -> Vec<u8> {
    let mut children = vec![uint(ElementId::TIMECODE, timecode)];
    children.extend_from_slice(entries);
    unknown_size_master(ElementId::CLUSTER, &children)
}

pub fn segment(children: &[Vec<u8>]) -> Vec<u8> {
    master(ElementId::SEGMENT, children)
}

/// EBML header followed by a Segment holding `children`.
pub fn stream(doc_type: &str, children: &[Vec<u8>]) -> Vec<u8> {
    let mut data = ebml_header(doc_type);
    data.extend(segment(children));
    data
}

/// Offset of the first occurrence of `needle` in `haystack`.
pub fn position_of(haystack: &[u8], needle: &[u8]) -> Option<u64> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos as u64)
}
