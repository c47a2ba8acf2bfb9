//! Minimal Matroska writer for integration tests.
//!
//! Kept independent of the crate's own fixture builder so the parser is checked
//! against a second encoder.

#![allow(dead_code)]

pub const EBML: u32 = 0x1A45_DFA3;
pub const SEGMENT: u32 = 0x1853_8067;
pub const INFO: u32 = 0x1549_A966;
pub const TIMECODE_SCALE: u32 = 0x2A_D7B1;
pub const TRACKS: u32 = 0x1654_AE6B;
pub const TRACK_ENTRY: u32 = 0xAE;
pub const TRACK_NUMBER: u32 = 0xD7;
pub const TRACK_TYPE: u32 = 0x83;
pub const CODEC_ID: u32 = 0x86;
pub const AUDIO: u32 = 0xE1;
pub const SAMPLING_FREQUENCY: u32 = 0xB5;
pub const CHANNELS: u32 = 0x9F;
pub const BIT_DEPTH: u32 = 0x6264;
pub const VIDEO: u32 = 0xE0;
pub const PIXEL_WIDTH: u32 = 0xB0;
pub const PIXEL_HEIGHT: u32 = 0xBA;
pub const CLUSTER: u32 = 0x1F43_B675;
pub const TIMECODE: u32 = 0xE7;
pub const SIMPLE_BLOCK: u32 = 0xA3;
pub const CUES: u32 = 0x1C53_BB6B;
pub const VOID: u32 = 0xEC;

fn id_bytes(id: u32) -> Vec<u8> {
    let bytes = id.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    bytes[skip..].to_vec()
}

/// Fixed 8-byte size vint; wasteful but valid.
fn size_bytes(size: u64) -> Vec<u8> {
    let mut bytes = size.to_be_bytes();
    bytes[0] = 0x01;
    bytes.to_vec()
}

pub fn element(id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = id_bytes(id);
    out.extend(size_bytes(payload.len() as u64));
    out.extend_from_slice(payload);
    out
}

pub fn master(id: u32, children: &[Vec<u8>]) -> Vec<u8> {
    element(id, &children.concat())
}

pub fn unknown_size(id: u32, children: &[Vec<u8>]) -> Vec<u8> {
    let mut out = id_bytes(id);
    out.extend([0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
    out.extend(children.concat());
    out
}

pub fn uint(id: u32, value: u64) -> Vec<u8> {
    element(id, &value.to_be_bytes())
}

pub fn float(id: u32, value: f64) -> Vec<u8> {
    element(id, &value.to_be_bytes())
}

pub fn string(id: u32, value: &str) -> Vec<u8> {
    element(id, value.as_bytes())
}

pub fn ebml_header(doc_type: &str) -> Vec<u8> {
    master(
        EBML,
        &[
            uint(0x4286, 1),
            uint(0x42F7, 1),
            uint(0x42F2, 4),
            uint(0x42F3, 8),
            string(0x4282, doc_type),
            uint(0x4287, 4),
            uint(0x4285, 2),
        ],
    )
}

pub fn info(scale: u64) -> Vec<u8> {
    master(INFO, &[uint(TIMECODE_SCALE, scale)])
}

pub fn audio_track(number: u64, codec: &str, rate: f64, channels: u64, bit_depth: u64) -> Vec<u8> {
    master(
        TRACK_ENTRY,
        &[
            uint(TRACK_NUMBER, number),
            uint(TRACK_TYPE, 2),
            string(CODEC_ID, codec),
            master(
                AUDIO,
                &[
                    float(SAMPLING_FREQUENCY, rate),
                    uint(CHANNELS, channels),
                    uint(BIT_DEPTH, bit_depth),
                ],
            ),
        ],
    )
}

pub fn video_track(number: u64, codec: &str, width: u64, height: u64) -> Vec<u8> {
    master(
        TRACK_ENTRY,
        &[
            uint(TRACK_NUMBER, number),
            uint(TRACK_TYPE, 1),
            string(CODEC_ID, codec),
            master(VIDEO, &[uint(PIXEL_WIDTH, width), uint(PIXEL_HEIGHT, height)]),
        ],
    )
}

pub fn tracks(entries: &[Vec<u8>]) -> Vec<u8> {
    master(TRACKS, entries)
}

/// Unlaced SimpleBlock; the track number must fit a 1-byte vint.
pub fn simple_block(track: u8, timecode: i16, key: bool, frame: &[u8]) -> Vec<u8> {
    let mut payload = vec![0x80 | track];
    payload.extend(timecode.to_be_bytes());
    payload.push(if key { 0x80 } else { 0x00 });
    payload.extend_from_slice(frame);
    element(SIMPLE_BLOCK, &payload)
}

/// SimpleBlock with Xiph lacing.
pub fn xiph_laced_block(track: u8, timecode: i16, frames: &[&[u8]]) -> Vec<u8> {
    let mut payload = vec![0x80 | track];
    payload.extend(timecode.to_be_bytes());
    payload.push(0x80 | 0x02);
    payload.push((frames.len() - 1) as u8);
    for frame in &frames[..frames.len() - 1] {
        let mut len = frame.len();
        while len >= 255 {
            payload.push(255);
            len -= 255;
        }
        payload.push(len as u8);
    }
    for frame in frames {
        payload.extend_from_slice(frame);
    }
    element(SIMPLE_BLOCK, &payload)
}

pub fn cluster(timecode: u64, blocks: &[Vec<u8>]) -> Vec<u8> {
    let mut children = vec![uint(TIMECODE, timecode)];
    children.extend_from_slice(blocks);
    master(CLUSTER, &children)
}

pub fn unknown_size_cluster(timecode: u64, blocks: &[Vec<u8>]) -> Vec<u8> {
    let mut children = vec![uint(TIMECODE, timecode)];
    children.extend_from_slice(blocks);
    unknown_size(CLUSTER, &children)
}

/// EBML header plus a sized Segment holding `children`.
pub fn stream(doc_type: &str, children: &[Vec<u8>]) -> Vec<u8> {
    let mut out = ebml_header(doc_type);
    out.extend(master(SEGMENT, children));
    out
}

pub fn find(haystack: &[u8], needle: &[u8]) -> Option<u64> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos as u64)
}
