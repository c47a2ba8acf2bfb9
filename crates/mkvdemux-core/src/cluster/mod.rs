//! Clusters.
//!
//! A cluster is parsed one child element at a time. Each successful step advances a
//! cursor; a [`ShortRead`](crate::Error::ShortRead) leaves the cursor where it was, so the
//! same call can be repeated once the source has grown and nothing already parsed is
//! parsed again.

mod block;

pub use block::{
    Block, BlockEntry, Frame, Lacing, FLAG_DISCARDABLE, FLAG_INVISIBLE, FLAG_KEYFRAME,
    LACING_MASK,
};

use crate::ebml::{read_element_header, read_payload, ElementHeader, ElementId};
use crate::options::DemuxOptions;
use crate::segment::SegmentInfo;
use crate::source::{ensure_available, ByteSource};
use crate::{Error, Result};
use block::GroupFields;

/// Integer elements inside a cluster are at most this wide.
const MAX_INT_SIZE: u64 = 8;

static END_OF_STREAM: BlockEntry = BlockEntry::EndOfStream;

/// Stable handle for a cluster within its segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterId(pub(crate) usize);

impl ClusterId {
    /// Position of the cluster in discovery order.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Outcome of one [`Cluster::parse_next`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseProgress {
    /// A block entry was appended at this index.
    Entry(usize),
    /// A non-block child (timecode, void, position...) was consumed.
    Skipped,
    /// The cluster is fully parsed.
    Complete,
}

/// A time-grouped run of block entries.
#[derive(Debug, Clone)]
pub struct Cluster {
    index: usize,
    element_start: u64,
    payload_start: u64,
    size: Option<u64>,
    /// Hard bound for unknown-size clusters: the enclosing segment's end.
    limit: Option<u64>,
    timecode: Option<i64>,
    entries: Vec<BlockEntry>,
    cursor: u64,
    complete: bool,
    eos: bool,
    options: DemuxOptions,
}

impl Cluster {
    pub(crate) fn new(
        index: usize,
        header: &ElementHeader,
        limit: Option<u64>,
        options: DemuxOptions,
    ) -> Self {
        Self {
            index,
            element_start: header.start,
            payload_start: header.payload_start(),
            size: header.size,
            limit,
            timecode: None,
            entries: Vec::new(),
            cursor: header.payload_start(),
            complete: false,
            eos: false,
            options,
        }
    }

    /// The end-of-stream sentinel cluster.
    pub fn end_of_stream() -> Self {
        Self {
            index: usize::MAX,
            element_start: 0,
            payload_start: 0,
            size: Some(0),
            limit: None,
            timecode: None,
            entries: Vec::new(),
            cursor: 0,
            complete: true,
            eos: true,
            options: DemuxOptions::default(),
        }
    }

    /// True only for the sentinel returned past the last cluster.
    pub fn eos(&self) -> bool {
        self.eos
    }

    pub fn id(&self) -> ClusterId {
        ClusterId(self.index)
    }

    /// Offset of the cluster element header.
    pub fn position(&self) -> u64 {
        self.element_start
    }

    /// Payload size; `None` while an unknown-size cluster's end is still unresolved.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Offset one past the payload, once known.
    pub fn end(&self) -> Option<u64> {
        self.size.map(|size| self.payload_start + size)
    }

    /// Base timestamp in segment ticks.
    ///
    /// Clusters handed out by a segment always have their timecode loaded; the
    /// sentinel reports 0.
    pub fn time(&self) -> i64 {
        self.timecode.unwrap_or(0)
    }

    pub fn time_ns(&self, info: &SegmentInfo) -> i64 {
        info.ticks_to_nanos(self.time())
    }

    pub fn is_loaded(&self) -> bool {
        self.timecode.is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Entries parsed so far.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Already parsed entry at `index`, without touching the source.
    pub fn entry(&self, index: usize) -> Option<&BlockEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[BlockEntry] {
        &self.entries
    }

    /// Parse until the cluster timecode is known.
    pub fn load<S: ByteSource + ?Sized>(&mut self, source: &S) -> Result<()> {
        while self.timecode.is_none() {
            if self.parse_next(source)? == ParseProgress::Complete {
                return Err(Error::malformed(self.element_start, "cluster has no Timecode"));
            }
        }
        Ok(())
    }

    /// Parse every remaining child.
    pub fn parse<S: ByteSource + ?Sized>(&mut self, source: &S) -> Result<()> {
        while self.parse_next(source)? != ParseProgress::Complete {}
        Ok(())
    }

    /// First entry, parsing as needed; the EOS sentinel for an empty cluster.
    pub fn first<S: ByteSource + ?Sized>(&mut self, source: &S) -> Result<&BlockEntry> {
        self.get_entry(source, 0)
    }

    /// Entry following `index`, parsing as needed; the EOS sentinel past the end.
    pub fn next<S: ByteSource + ?Sized>(&mut self, source: &S, index: usize) -> Result<&BlockEntry> {
        self.get_entry(source, index + 1)
    }

    /// Entry at `index`, parsing as needed.
    ///
    /// Returns the EOS sentinel once the cluster is complete and has fewer entries.
    pub fn get_entry<S: ByteSource + ?Sized>(&mut self, source: &S, index: usize) -> Result<&BlockEntry> {
        while self.entries.len() <= index && !self.complete {
            self.parse_next(source)?;
        }
        Ok(self.entries.get(index).unwrap_or(&END_OF_STREAM))
    }

    /// Parse a single child element.
    pub fn parse_next<S: ByteSource + ?Sized>(&mut self, source: &S) -> Result<ParseProgress> {
        if self.complete {
            return Ok(ParseProgress::Complete);
        }

        let pos = self.cursor;
        if self.reached_end(source, pos)? {
            self.finish(pos);
            return Ok(ParseProgress::Complete);
        }

        let header = read_element_header(source, pos)?;
        if self.size.is_none() && header.id.is_top_level() {
            self.finish(pos);
            return Ok(ParseProgress::Complete);
        }

        let end = header.end().ok_or_else(|| {
            Error::malformed(pos, format!("unknown-size {} inside cluster", header.id))
        })?;
        if let Some(bound) = self.end().or(self.limit) {
            if end > bound {
                return Err(Error::malformed(
                    pos,
                    format!("{} ends at {end}, past cluster end {bound}", header.id),
                ));
            }
        }

        let progress = match header.id {
            ElementId::TIMECODE => {
                let value = read_uint(source, &header)?;
                let value = i64::try_from(value).map_err(|_| {
                    Error::malformed(pos, format!("cluster Timecode {value} out of range"))
                })?;
                if self.timecode.is_some() {
                    tracing::warn!(cluster = self.index, offset = pos, "duplicate cluster Timecode ignored");
                } else {
                    tracing::debug!(cluster = self.index, timecode = value, "cluster timecode");
                    self.timecode = Some(value);
                }
                ParseProgress::Skipped
            }
            ElementId::SIMPLE_BLOCK | ElementId::BLOCK_GROUP => {
                if self.timecode.is_none() {
                    return Err(Error::malformed(pos, format!("{} before cluster Timecode", header.id)));
                }
                ensure_available(source, pos, end - pos)?;
                let entry = if header.id == ElementId::SIMPLE_BLOCK {
                    let size = end - header.payload_start();
                    BlockEntry::Simple(Block::parse_simple(
                        source,
                        header.payload_start(),
                        size,
                        self.options.max_lace_frames,
                    )?)
                } else {
                    BlockEntry::Group(self.parse_group(source, &header)?)
                };
                self.entries.push(entry);
                ParseProgress::Entry(self.entries.len() - 1)
            }
            _ => ParseProgress::Skipped,
        };

        self.cursor = end;
        Ok(progress)
    }

    fn parse_group<S: ByteSource + ?Sized>(&self, source: &S, group: &ElementHeader) -> Result<Block> {
        let group_end = group.payload_start() + group.size.unwrap_or(0);
        let mut fields = GroupFields::default();
        let mut block = None;

        let mut pos = group.payload_start();
        while pos < group_end {
            let child = read_element_header(source, pos)?;
            let child_end = child
                .end()
                .filter(|end| *end <= group_end)
                .ok_or_else(|| Error::malformed(pos, format!("{} overruns BlockGroup", child.id)))?;
            match child.id {
                ElementId::BLOCK => block = Some(child),
                ElementId::BLOCK_DURATION => fields.duration = Some(read_uint(source, &child)?),
                ElementId::REFERENCE_BLOCK => {
                    let reference = read_int(source, &child)?;
                    fields.reference.get_or_insert(reference);
                }
                ElementId::DISCARD_PADDING => fields.discard_padding = read_int(source, &child)?,
                _ => {}
            }
            pos = child_end;
        }

        let block = block.ok_or_else(|| Error::malformed(group.start, "BlockGroup without Block"))?;
        Block::parse_grouped(
            source,
            block.payload_start(),
            block.size.unwrap_or(0),
            self.options.max_lace_frames,
            fields,
        )
    }

    /// Whether `pos` is at or past the cluster's end, resolving unknown sizes against the
    /// segment bound or the source's total length.
    fn reached_end<S: ByteSource + ?Sized>(&self, source: &S, pos: u64) -> Result<bool> {
        if let Some(end) = self.end() {
            return Ok(pos >= end);
        }
        if let Some(limit) = self.limit {
            return Ok(pos >= limit);
        }
        Ok(source.length()?.total.is_some_and(|total| pos >= total))
    }

    fn finish(&mut self, pos: u64) {
        let size = pos - self.payload_start;
        if self.size.is_none() {
            tracing::debug!(cluster = self.index, size, "resolved unknown-size cluster");
            self.size = Some(size);
        }
        self.complete = true;
    }
}

fn read_uint<S: ByteSource + ?Sized>(source: &S, header: &ElementHeader) -> Result<u64> {
    let data = read_payload(source, header, MAX_INT_SIZE)?;
    crate::ebml::decode_uint(&data, header.start)
}

fn read_int<S: ByteSource + ?Sized>(source: &S, header: &ElementHeader) -> Result<i64> {
    let data = read_payload(source, header, MAX_INT_SIZE)?;
    crate::ebml::decode_int(&data, header.start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebml::read_element_header;
    use crate::source::{MemorySource, StreamBuffer};
    use crate::testing::{self, BlockGroupBuilder};
    use assert_matches::assert_matches;

    fn cluster_at(source: &dyn ByteSource, limit: Option<u64>) -> Cluster {
        let header = read_element_header(source, 0).unwrap();
        Cluster::new(0, &header, limit, DemuxOptions::default())
    }

    #[test]
    fn test_parse_simple_blocks() {
        let data = testing::cluster(
            1000,
            &[
                testing::simple_block(1, 0, true, &[0xAA; 16]),
                testing::simple_block(1, 33, false, &[0xBB; 8]),
            ],
        );
        let source = MemorySource::new(data.clone());
        let mut cluster = cluster_at(&source, None);
        cluster.parse(&source).unwrap();

        assert!(cluster.is_complete());
        assert_eq!(cluster.time(), 1000);
        assert_eq!(cluster.entry_count(), 2);
        assert_eq!(cluster.end(), Some(data.len() as u64));

        let second = cluster.entry(1).unwrap().block().unwrap();
        assert_eq!(second.time(&cluster), 1033);
        assert!(!second.is_key());
        let frame = second.frame(0).unwrap();
        assert_eq!(frame.read_bytes(&source).unwrap(), &[0xBB; 8][..]);
    }

    #[test]
    fn test_first_next_and_sentinel() {
        let data = testing::cluster(0, &[testing::simple_block(2, 0, true, &[1; 4])]);
        let source = MemorySource::new(data);
        let mut cluster = cluster_at(&source, None);

        let first = cluster.first(&source).unwrap();
        assert_eq!(first.block().unwrap().track_number(), 2);
        assert!(cluster.next(&source, 0).unwrap().eos());
        assert!(cluster.get_entry(&source, 5).unwrap().eos());
    }

    #[test]
    fn test_block_group_fields() {
        let data = testing::cluster(
            50,
            &[
                BlockGroupBuilder::new(1, 0, &[1; 10])
                    .duration(20)
                    .discard_padding(2_500_000)
                    .build(),
                BlockGroupBuilder::new(1, 20, &[2; 10]).reference(-20).build(),
            ],
        );
        let source = MemorySource::new(data);
        let mut cluster = cluster_at(&source, None);
        cluster.parse(&source).unwrap();

        let first = cluster.entry(0).unwrap();
        assert!(!first.is_simple());
        let first = first.block().unwrap();
        assert!(first.is_key());
        assert_eq!(first.duration(), Some(20));
        assert_eq!(first.discard_padding(), 2_500_000);

        let second = cluster.entry(1).unwrap().block().unwrap();
        assert!(!second.is_key());
        assert_eq!(second.reference(), Some(-20));
        assert_eq!(second.discard_padding(), 0);
    }

    #[test]
    fn test_block_before_timecode() {
        let block = testing::simple_block(1, 0, true, &[0; 4]);
        let data = testing::master(ElementId::CLUSTER, &[block]);
        let source = MemorySource::new(data);
        let mut cluster = cluster_at(&source, None);
        assert_matches!(cluster.load(&source), Err(Error::MalformedStructure { .. }));
    }

    #[test]
    fn test_timecode_out_of_range() {
        let data = testing::cluster(1 << 63, &[testing::simple_block(1, -1, true, &[0; 4])]);
        let source = MemorySource::new(data);
        let mut cluster = cluster_at(&source, None);
        assert_matches!(cluster.load(&source), Err(Error::MalformedStructure { .. }));
        assert_eq!(cluster.time(), 0);
    }

    #[test]
    fn test_missing_timecode() {
        let data = testing::master(ElementId::CLUSTER, &[testing::element(ElementId::VOID, &[0; 3])]);
        let source = MemorySource::new(data);
        let mut cluster = cluster_at(&source, None);
        assert_matches!(cluster.load(&source), Err(Error::MalformedStructure { .. }));
    }

    #[test]
    fn test_child_crossing_cluster_end() {
        let mut data = testing::cluster(0, &[testing::simple_block(1, 0, true, &[0; 8])]);
        // Shrink the declared cluster size by 2 so the block overruns it.
        data[4] -= 2;
        let source = MemorySource::new(data);
        let mut cluster = cluster_at(&source, None);
        assert_matches!(cluster.parse(&source), Err(Error::MalformedStructure { .. }));
    }

    #[test]
    fn test_unknown_size_ends_at_top_level() {
        let mut data = testing::unknown_size_cluster(0, &[testing::simple_block(1, 0, true, &[3; 5])]);
        let first_len = data.len() as u64;
        data.extend(testing::cluster(40, &[]));
        let source = MemorySource::new(data);

        let mut cluster = cluster_at(&source, None);
        assert_eq!(cluster.size(), None);
        cluster.parse(&source).unwrap();
        assert_eq!(cluster.entry_count(), 1);
        assert_eq!(cluster.end(), Some(first_len));
    }

    #[test]
    fn test_unknown_size_ends_at_limit() {
        let data = testing::unknown_size_cluster(0, &[testing::simple_block(1, 0, true, &[3; 5])]);
        let len = data.len() as u64;
        let stream = StreamBuffer::new();
        stream.push(&data);

        let mut cluster = cluster_at(&stream, Some(len));
        cluster.parse(&stream).unwrap();
        assert_eq!(cluster.end(), Some(len));
    }

    #[test]
    fn test_resumes_after_short_read() {
        let data = testing::cluster(
            0,
            &[
                testing::simple_block(1, 0, true, &[1; 40]),
                testing::simple_block(1, 10, false, &[2; 40]),
            ],
        );
        let stream = StreamBuffer::with_total(data.len() as u64);
        stream.push(&data[..60]);

        let mut cluster = cluster_at(&stream, None);
        assert_matches!(cluster.parse(&stream), Err(Error::ShortRead { .. }));
        assert_eq!(cluster.entry_count(), 1);
        let first = cluster.entry(0).unwrap().clone();

        assert_matches!(cluster.parse(&stream), Err(Error::ShortRead { .. }));
        assert_eq!(cluster.entry_count(), 1);

        stream.push(&data[60..]);
        cluster.parse(&stream).unwrap();
        assert_eq!(cluster.entry_count(), 2);
        assert_eq!(cluster.entry(0).unwrap(), &first);
    }

    #[test]
    fn test_truncated_complete_source() {
        let data = testing::cluster(0, &[testing::simple_block(1, 0, true, &[1; 40])]);
        let source = MemorySource::new(data[..30].to_vec());
        let mut cluster = cluster_at(&source, None);
        assert_matches!(cluster.parse(&source), Err(Error::MalformedStructure { .. }));
    }

    #[test]
    fn test_sentinel() {
        let eos = Cluster::end_of_stream();
        assert!(eos.eos());
        assert_eq!(eos.entry_count(), 0);
        assert_eq!(eos.time(), 0);
    }
}
