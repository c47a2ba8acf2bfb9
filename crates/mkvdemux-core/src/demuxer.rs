//! Stream detection and packet-level demuxing.

use std::path::Path;

use crate::cluster::{Block, ClusterId, Frame};
use crate::ebml::EbmlHeader;
use crate::options::DemuxOptions;
use crate::segment::{Segment, SegmentInfo, Tracks};
use crate::source::{read_exact_at, ByteSource};
use crate::time::Timestamp;
use crate::{Error, Result};

/// EBML magic at the start of every Matroska and WebM stream.
pub const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// MIME types of the streams this crate reads.
pub const MIME_TYPES: &[&str] = &["video/x-matroska", "audio/x-matroska", "video/webm", "audio/webm"];

/// File extensions of the streams this crate reads.
pub const EXTENSIONS: &[&str] = &["mkv", "webm", "mka", "mk3d"];

/// Check whether the source starts with the EBML magic.
///
/// Only the first four bytes are read; doc type validation is left to
/// [`EbmlHeader::parse`].
pub fn detect<S: ByteSource + ?Sized>(source: &S) -> Result<bool> {
    let mut magic = [0u8; 4];
    read_exact_at(source, 0, &mut magic)?;
    Ok(magic == EBML_MAGIC)
}

/// Check the file extension (fallback when the bytes are not at hand).
pub fn is_matroska_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// One frame in decode order with its presentation metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Packet {
    pub track_number: u64,
    pub timestamp: Timestamp,
    /// Keyframe flag of the enclosing block; laced blocks are never keys.
    pub is_key: bool,
    pub is_invisible: bool,
    /// BlockDuration in segment ticks, for grouped blocks that carry one.
    pub duration: Option<u64>,
    /// Discard padding in nanoseconds, 0 when absent.
    pub discard_padding: i64,
    pub cluster: ClusterId,
    /// Index of the block entry within its cluster.
    pub entry: usize,
    /// Index of the frame within its block.
    pub frame_index: usize,
    pub frame: Frame,
}

impl Packet {
    /// Copy the frame payload into `buf`.
    pub fn read<S: ByteSource + ?Sized>(&self, source: &S, buf: &mut [u8]) -> Result<usize> {
        self.frame.read(source, buf)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    cluster: Option<ClusterId>,
    entry: usize,
    frame: usize,
    done: bool,
}

/// Reads a whole stream: EBML header, segment headers and then packets in
/// decode order.
///
/// Every operation that runs out of bytes fails with [`Error::ShortRead`] and leaves
/// the demuxer where it was, so streaming callers retry after feeding the source.
pub struct Demuxer<'a, S: ByteSource + ?Sized> {
    header: EbmlHeader,
    tracks: Tracks,
    segment: Segment<'a, S>,
    cursor: Cursor,
}

impl<'a, S: ByteSource + ?Sized> Demuxer<'a, S> {
    pub fn open(source: &'a S) -> Result<Self> {
        Self::with_options(source, DemuxOptions::default())
    }

    /// Parse the EBML header and the segment headers up to the first cluster.
    pub fn with_options(source: &'a S, options: DemuxOptions) -> Result<Self> {
        let header = EbmlHeader::parse(source, 0)?;

        let mut segment = Segment::with_options(source, header.segment_offset(), options)?;
        segment.load_headers()?;
        let tracks = segment
            .tracks()
            .cloned()
            .ok_or_else(|| Error::invalid_structure("segment has no Tracks element"))?;

        Ok(Self {
            header,
            tracks,
            segment,
            cursor: Cursor::default(),
        })
    }

    pub fn header(&self) -> &EbmlHeader {
        &self.header
    }

    pub fn tracks(&self) -> &Tracks {
        &self.tracks
    }

    pub fn info(&self) -> &SegmentInfo {
        self.segment.info()
    }

    pub fn segment(&self) -> &Segment<'a, S> {
        &self.segment
    }

    pub fn segment_mut(&mut self) -> &mut Segment<'a, S> {
        &mut self.segment
    }

    pub fn source(&self) -> &'a S {
        self.segment.source()
    }

    /// Discover every cluster up to the segment end.
    ///
    /// Fails with [`Error::ShortRead`] while the source is still short; call again after
    /// feeding it.
    pub fn resume(&mut self) -> Result<()> {
        self.segment.load()
    }

    /// Next packet in decode order, or `None` at the end of the segment.
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        let result = advance(&mut self.segment, &mut self.cursor);
        if let Err(e) = &result {
            if !e.is_short_read() {
                self.cursor.done = true;
            }
        }
        result
    }

    /// Iterate over the remaining packets.
    ///
    /// A short read is yielded as an error without ending the iteration; calling
    /// `next` again retries the same packet.
    pub fn packets(&mut self) -> Packets<'_, 'a, S> {
        Packets { demuxer: self }
    }

    /// Restart packet iteration at the first cluster.
    pub fn rewind(&mut self) {
        self.cursor = Cursor::default();
    }

    /// The `index`-th frame of `track_number`, counting from the start of the segment.
    ///
    /// Does not move the packet iteration cursor.
    pub fn find_frame(&mut self, track_number: u64, index: usize) -> Result<Option<Packet>> {
        self.tracks.get_by_number(track_number)?;

        let mut cursor = Cursor::default();
        let mut seen = 0;
        while let Some(packet) = advance(&mut self.segment, &mut cursor)? {
            if packet.track_number != track_number {
                continue;
            }
            if seen == index {
                return Ok(Some(packet));
            }
            seen += 1;
        }
        Ok(None)
    }

    /// The `index`-th frame of `track_number` inside one cluster.
    pub fn frames_for_track(
        &mut self,
        cluster: ClusterId,
        track_number: u64,
        index: usize,
    ) -> Result<Option<Packet>> {
        self.tracks.get_by_number(track_number)?;

        let source = self.segment.source();
        let scale = self.segment.info().timecode_scale;
        let target = self
            .segment
            .cluster_mut(cluster)
            .ok_or_else(|| Error::not_found(format!("cluster {}", cluster.index())))?;
        let cluster_time = target.time();

        let mut seen = 0;
        for entry_index in 0.. {
            let entry = target.get_entry(source, entry_index)?;
            let Some(block) = entry.block() else {
                break;
            };
            if block.track_number() != track_number {
                continue;
            }
            if index < seen + block.frame_count() {
                return Ok(make_packet(block, cluster, cluster_time, scale, entry_index, index - seen));
            }
            seen += block.frame_count();
        }
        Ok(None)
    }

    /// Copy the payload of `packet` into `buf`.
    pub fn read_frame(&self, packet: &Packet, buf: &mut [u8]) -> Result<usize> {
        packet.read(self.segment.source(), buf)
    }
}

impl<S: ByteSource + ?Sized> std::fmt::Debug for Demuxer<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Demuxer")
            .field("header", &self.header)
            .field("segment", &self.segment)
            .finish()
    }
}

fn advance<S: ByteSource + ?Sized>(segment: &mut Segment<'_, S>, cursor: &mut Cursor) -> Result<Option<Packet>> {
    let source = segment.source();
    let scale = segment.info().timecode_scale;

    loop {
        if cursor.done {
            return Ok(None);
        }
        let id = match cursor.cluster {
            Some(id) => id,
            None => match segment.cluster_at(0)? {
                Some(id) => {
                    cursor.cluster = Some(id);
                    id
                }
                None => {
                    cursor.done = true;
                    return Ok(None);
                }
            },
        };

        let cluster = segment
            .cluster_mut(id)
            .ok_or_else(|| Error::not_found(format!("cluster {}", id.index())))?;
        let cluster_time = cluster.time();
        let entry = cluster.get_entry(source, cursor.entry)?;

        let Some(block) = entry.block() else {
            match segment.cluster_at(id.index() + 1)? {
                Some(next) => {
                    *cursor = Cursor {
                        cluster: Some(next),
                        ..Cursor::default()
                    };
                    continue;
                }
                None => {
                    cursor.done = true;
                    return Ok(None);
                }
            }
        };

        let Some(packet) = make_packet(block, id, cluster_time, scale, cursor.entry, cursor.frame) else {
            cursor.entry += 1;
            cursor.frame = 0;
            continue;
        };
        cursor.frame += 1;
        return Ok(Some(packet));
    }
}

fn make_packet(
    block: &Block,
    cluster: ClusterId,
    cluster_time: i64,
    timecode_scale: u64,
    entry: usize,
    frame_index: usize,
) -> Option<Packet> {
    let frame = *block.frame(frame_index)?;
    let ticks = cluster_time.saturating_add(i64::from(block.time_code()));
    Some(Packet {
        track_number: block.track_number(),
        timestamp: Timestamp::new(ticks, timecode_scale),
        is_key: block.is_key(),
        is_invisible: block.is_invisible(),
        duration: block.duration(),
        discard_padding: block.discard_padding(),
        cluster,
        entry,
        frame_index,
        frame,
    })
}

/// Iterator returned by [`Demuxer::packets`].
pub struct Packets<'d, 'a, S: ByteSource + ?Sized> {
    demuxer: &'d mut Demuxer<'a, S>,
}

impl<S: ByteSource + ?Sized> Iterator for Packets<'_, '_, S> {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        self.demuxer.next_packet().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Lacing;
    use crate::source::{MemorySource, StreamBuffer};
    use crate::testing::{self, BlockGroupBuilder, TrackBuilder};
    use assert_matches::assert_matches;

    fn two_track_stream() -> Vec<u8> {
        let frame: &[u8] = &[7; 5];
        testing::stream(
            "webm",
            &[
                testing::info(1_000_000),
                testing::tracks(&[
                    TrackBuilder::video(1, "V_VP9", 640, 360),
                    TrackBuilder::audio(2, "A_OPUS", 48000.0, 2, 0),
                ]),
                testing::cluster(
                    0,
                    &[
                        testing::simple_block(1, 0, true, &[1; 10]),
                        testing::laced_block(2, 0, 0x80, Lacing::Fixed, &[frame; 3]),
                        testing::simple_block(1, 33, false, &[2; 10]),
                    ],
                ),
                testing::cluster(
                    1000,
                    &[
                        BlockGroupBuilder::new(1, 0, &[3; 10]).duration(33).build(),
                        testing::simple_block(2, 20, true, &[4; 6]),
                    ],
                ),
            ],
        )
    }

    #[test]
    fn test_detect() {
        let source = MemorySource::new(testing::ebml_header("matroska"));
        assert!(detect(&source).unwrap());
        let source = MemorySource::new(vec![0u8, 0, 0, 0x20, b'f', b't', b'y', b'p']);
        assert!(!detect(&source).unwrap());
        let source = MemorySource::new(vec![0x1A]);
        assert_matches!(detect(&source), Err(Error::MalformedStructure { .. }));
    }

    #[test]
    fn test_is_matroska_extension() {
        assert!(is_matroska_extension(Path::new("movie.mkv")));
        assert!(is_matroska_extension(Path::new("clip.WEBM")));
        assert!(is_matroska_extension(Path::new("audio.mka")));
        assert!(!is_matroska_extension(Path::new("movie.mp4")));
        assert!(!is_matroska_extension(Path::new("noext")));
    }

    #[test]
    fn test_open() {
        let data = two_track_stream();
        let source = MemorySource::new(data);
        let demuxer = Demuxer::open(&source).unwrap();
        assert!(demuxer.header().is_webm());
        assert_eq!(demuxer.tracks().len(), 2);
        assert_eq!(demuxer.info().timecode_scale, 1_000_000);
    }

    #[test]
    fn test_packets_in_decode_order() {
        let source = MemorySource::new(two_track_stream());
        let mut demuxer = Demuxer::open(&source).unwrap();

        let packets: Vec<Packet> = demuxer.packets().collect::<Result<_>>().unwrap();
        let summary: Vec<(u64, i64, bool)> = packets
            .iter()
            .map(|p| (p.track_number, p.timestamp.ticks, p.is_key))
            .collect();
        assert_eq!(
            summary,
            vec![
                (1, 0, true),
                (2, 0, false),
                (2, 0, false),
                (2, 0, false),
                (1, 33, false),
                (1, 1000, true),
                (2, 1020, true),
            ]
        );
        assert_eq!(packets[5].duration, Some(33));
        assert_eq!(packets[3].frame_index, 2);
        assert_eq!(packets[6].cluster.index(), 1);

        let mut buf = [0u8; 16];
        let n = demuxer.read_frame(&packets[6], &mut buf).unwrap();
        assert_eq!(&buf[..n], &[4; 6]);

        assert!(demuxer.next_packet().unwrap().is_none());
        demuxer.rewind();
        assert_eq!(demuxer.next_packet().unwrap().unwrap().frame, packets[0].frame);
    }

    #[test]
    fn test_find_frame() {
        let source = MemorySource::new(two_track_stream());
        let mut demuxer = Demuxer::open(&source).unwrap();

        let packet = demuxer.find_frame(2, 3).unwrap().unwrap();
        assert_eq!(packet.timestamp.ticks, 1020);
        assert!(demuxer.find_frame(2, 4).unwrap().is_none());
        assert_matches!(demuxer.find_frame(9, 0), Err(Error::NotFound(_)));

        let second = ClusterId(1);
        demuxer.resume().unwrap();
        let packet = demuxer.frames_for_track(second, 1, 0).unwrap().unwrap();
        assert_eq!(packet.timestamp.ticks, 1000);
        assert!(demuxer.frames_for_track(second, 1, 1).unwrap().is_none());
        assert!(demuxer.frames_for_track(ClusterId(0), 2, 2).unwrap().is_some());

        // The iteration cursor is untouched.
        let first = demuxer.next_packet().unwrap().unwrap();
        assert_eq!(first.track_number, 1);
        assert_eq!(first.timestamp.ticks, 0);
    }

    #[test]
    fn test_streaming_packets() {
        let data = two_track_stream();
        let stream = StreamBuffer::with_total(data.len() as u64);
        let cut = testing::position_of(&data, &[4; 6]).unwrap() as usize;
        stream.push(&data[..cut]);

        let mut demuxer = Demuxer::open(&stream).unwrap();
        let mut seen = 0;
        loop {
            match demuxer.next_packet() {
                Ok(Some(_)) => seen += 1,
                Err(e) if e.is_short_read() => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(seen, 6);

        stream.push(&data[cut..]);
        let last = demuxer.next_packet().unwrap().unwrap();
        assert_eq!(last.timestamp.ticks, 1020);
        assert!(demuxer.next_packet().unwrap().is_none());
    }

    #[test]
    fn test_out_of_range_cluster_timecode_ends_iteration() {
        let data = testing::stream(
            "webm",
            &[
                testing::tracks(&[TrackBuilder::audio(1, "A_OPUS", 48000.0, 2, 0)]),
                testing::cluster(1 << 63, &[testing::simple_block(1, -1, true, &[1; 8])]),
            ],
        );
        let source = MemorySource::new(data);
        let mut demuxer = Demuxer::open(&source).unwrap();
        assert_matches!(demuxer.next_packet(), Err(Error::MalformedStructure { .. }));
        assert!(demuxer.next_packet().unwrap().is_none());
    }

    #[test]
    fn test_open_rejects_bad_doc_type() {
        let data = testing::stream("avi", &[testing::tracks(&[])]);
        let source = MemorySource::new(data);
        assert_matches!(Demuxer::open(&source), Err(Error::MalformedHeader(_)));
    }
}
