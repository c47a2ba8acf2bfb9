//! Segment: the root container.
//!
//! A [`Segment`] is anchored at an offset and reads nothing until asked. Loading walks
//! the top-level children in order: Info and Tracks are parsed into memory, every other
//! header-level element is skipped by size, and Clusters are discovered one at a time.
//! All progress is recorded in cursors, so a call that fails with
//! [`Error::ShortRead`] can simply be repeated once the source has more bytes.

mod info;
mod tracks;

pub use info::{SegmentInfo, DEFAULT_TIMECODE_SCALE};
pub use tracks::{AudioSettings, Track, TrackKind, TrackType, Tracks, VideoSettings};

use crate::cluster::{Cluster, ClusterId};
use crate::ebml::{read_element_header, read_payload, ElementHeader, ElementId};
use crate::options::DemuxOptions;
use crate::source::ByteSource;
use crate::{Error, Result};

/// Outcome of a cluster traversal step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterStep {
    /// The next cluster, loaded up to its timecode.
    Cluster(ClusterId),
    /// No next cluster yet; the source needs more bytes.
    Pending,
    /// The segment end has been reached; there are no more clusters.
    EndOfStream,
}

impl ClusterStep {
    pub fn cluster(self) -> Option<ClusterId> {
        match self {
            Self::Cluster(id) => Some(id),
            _ => None,
        }
    }
}

/// The root container of a Matroska stream.
pub struct Segment<'a, S: ByteSource + ?Sized> {
    source: &'a S,
    options: DemuxOptions,
    start: u64,
    payload_start: u64,
    size: Option<u64>,
    info: SegmentInfo,
    tracks: Option<Tracks>,
    header_cursor: u64,
    headers_done: bool,
    clusters: Vec<Cluster>,
    pending: Option<Cluster>,
    cluster_tail: u64,
    exhausted: bool,
    sentinel: Cluster,
}

impl<'a, S: ByteSource + ?Sized> Segment<'a, S> {
    /// Locate the Segment element at or after `pos` and read its header.
    ///
    /// Void and unrecognised elements before the Segment are skipped. No track or
    /// cluster content is read.
    pub fn new(source: &'a S, pos: u64) -> Result<Self> {
        Self::with_options(source, pos, DemuxOptions::default())
    }

    pub fn with_options(source: &'a S, pos: u64, options: DemuxOptions) -> Result<Self> {
        let header = find_segment(source, pos)?;
        tracing::debug!(
            offset = header.start,
            size = ?header.size,
            "found segment"
        );
        Ok(Self {
            source,
            options,
            start: header.start,
            payload_start: header.payload_start(),
            size: header.size,
            info: SegmentInfo::default(),
            tracks: None,
            header_cursor: header.payload_start(),
            headers_done: false,
            clusters: Vec::new(),
            pending: None,
            cluster_tail: header.payload_start(),
            exhausted: false,
            sentinel: Cluster::end_of_stream(),
        })
    }

    /// Parse headers and discover every cluster up to the segment end.
    ///
    /// Fails with [`Error::InvalidStructure`] when the segment has no Tracks element,
    /// and with [`Error::ShortRead`] while the source is still short of the segment end;
    /// repeat the call once more bytes are available.
    pub fn load(&mut self) -> Result<()> {
        self.load_headers()?;
        while !self.exhausted {
            self.discover_next()?;
        }
        tracing::debug!(clusters = self.clusters.len(), "segment loaded");
        Ok(())
    }

    /// Parse the header-level elements up to the first cluster.
    ///
    /// After this succeeds [`tracks`](Self::tracks) is populated and immutable, while
    /// clusters can be pulled incrementally with [`first`](Self::first) and
    /// [`next`](Self::next).
    pub fn load_headers(&mut self) -> Result<()> {
        let source = self.source;
        while !self.headers_done {
            let pos = self.header_cursor;
            if self.at_end(pos)? {
                self.finish_headers(pos)?;
                break;
            }

            let header = read_element_header(source, pos)?;
            if header.id == ElementId::CLUSTER {
                self.finish_headers(pos)?;
                break;
            }
            let end = self.child_end(&header)?;

            match header.id {
                ElementId::INFO => {
                    let payload = read_payload(source, &header, self.options.max_element_size)?;
                    self.info = SegmentInfo::parse(&payload, header.payload_start())?;
                    tracing::debug!(
                        timecode_scale = self.info.timecode_scale,
                        duration = ?self.info.duration,
                        "parsed segment info"
                    );
                }
                ElementId::TRACKS if self.tracks.is_some() => {
                    tracing::warn!(offset = pos, "ignoring second Tracks element");
                }
                ElementId::TRACKS => {
                    let payload = read_payload(source, &header, self.options.max_element_size)?;
                    let tracks = Tracks::parse(&payload, header.payload_start())?;
                    tracing::debug!(tracks = tracks.len(), "parsed tracks");
                    self.tracks = Some(tracks);
                }
                id => tracing::trace!(offset = pos, element = %id, "skipping top-level element"),
            }
            self.header_cursor = end;
        }
        Ok(())
    }

    fn finish_headers(&mut self, pos: u64) -> Result<()> {
        if self.tracks.is_none() {
            return Err(Error::invalid_structure(format!(
                "no Tracks element before offset {pos}"
            )));
        }
        self.headers_done = true;
        self.cluster_tail = pos;
        Ok(())
    }

    /// First cluster, discovering it if needed.
    pub fn first(&mut self) -> Result<ClusterStep> {
        self.step(0)
    }

    /// Cluster following `id`, discovering it if needed.
    pub fn next(&mut self, id: ClusterId) -> Result<ClusterStep> {
        self.step(id.index() + 1)
    }

    fn step(&mut self, index: usize) -> Result<ClusterStep> {
        match self.cluster_at(index) {
            Ok(Some(id)) => Ok(ClusterStep::Cluster(id)),
            Ok(None) => Ok(ClusterStep::EndOfStream),
            Err(e) if e.is_short_read() => Ok(ClusterStep::Pending),
            Err(e) => Err(e),
        }
    }

    /// Cluster number `index`, discovering clusters as needed.
    ///
    /// Like [`first`](Self::first) but a missing range surfaces as
    /// [`Error::ShortRead`] rather than [`ClusterStep::Pending`].
    pub(crate) fn cluster_at(&mut self, index: usize) -> Result<Option<ClusterId>> {
        self.load_headers()?;
        while self.clusters.len() <= index {
            if self.exhausted || self.discover_next()?.is_none() {
                return Ok(None);
            }
        }
        Ok(Some(ClusterId(index)))
    }

    /// Discover one more cluster; `None` once the segment end is reached.
    fn discover_next(&mut self) -> Result<Option<ClusterId>> {
        let source = self.source;

        // An unknown-size cluster must be parsed to its end before anything after it
        // can be found.
        if self.pending.is_none() {
            if let Some(last) = self.clusters.last_mut() {
                if last.end().is_none() {
                    last.parse(source)?;
                }
                if let Some(end) = last.end() {
                    self.cluster_tail = self.cluster_tail.max(end);
                }
            }
        }

        while self.pending.is_none() {
            let pos = self.cluster_tail;
            if self.at_end(pos)? {
                self.exhausted = true;
                return Ok(None);
            }

            let header = read_element_header(source, pos)?;
            if header.id == ElementId::CLUSTER {
                if let (Some(end), Some(seg_end)) = (header.end(), self.end()) {
                    if end > seg_end {
                        return Err(Error::malformed(
                            pos,
                            format!("cluster ends at {end}, past segment end {seg_end}"),
                        ));
                    }
                }
                self.pending = Some(Cluster::new(
                    self.clusters.len(),
                    &header,
                    self.end(),
                    self.options,
                ));
                break;
            }

            let end = self.child_end(&header)?;
            tracing::trace!(offset = pos, element = %header.id, "skipping element between clusters");
            self.cluster_tail = end;
        }

        let Some(pending) = self.pending.as_mut() else {
            return Ok(None);
        };
        pending.load(source)?;
        let Some(cluster) = self.pending.take() else {
            return Ok(None);
        };

        if let Some(prev) = self.clusters.last() {
            if cluster.time() < prev.time() {
                tracing::warn!(
                    cluster = self.clusters.len(),
                    time = cluster.time(),
                    previous = prev.time(),
                    "cluster timecode goes backwards"
                );
            }
        }
        tracing::debug!(
            index = self.clusters.len(),
            offset = cluster.position(),
            time = cluster.time(),
            "discovered cluster"
        );

        self.cluster_tail = cluster.end().unwrap_or(cluster.position());
        let id = cluster.id();
        self.clusters.push(cluster);
        Ok(Some(id))
    }

    /// End offset of a non-cluster top-level child, checked against the segment end.
    fn child_end(&self, header: &ElementHeader) -> Result<u64> {
        let end = header.end().ok_or_else(|| {
            Error::malformed(header.start, format!("unknown-size {} in segment", header.id))
        })?;
        if let Some(seg_end) = self.end() {
            if end > seg_end {
                return Err(Error::malformed(
                    header.start,
                    format!("{} ends at {end}, past segment end {seg_end}", header.id),
                ));
            }
        }
        Ok(end)
    }

    /// Whether `pos` is at the segment end: the declared end, or the source's total
    /// length for unknown-size segments.
    fn at_end(&self, pos: u64) -> Result<bool> {
        if let Some(end) = self.end() {
            return Ok(pos >= end);
        }
        Ok(self.source.length()?.total.is_some_and(|total| pos >= total))
    }

    /// Clusters discovered so far.
    pub fn count(&self) -> usize {
        self.clusters.len()
    }

    pub fn cluster(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(id.index())
    }

    pub fn cluster_mut(&mut self, id: ClusterId) -> Option<&mut Cluster> {
        self.clusters.get_mut(id.index())
    }

    /// Fully parse the cluster `id`.
    pub fn parse_cluster(&mut self, id: ClusterId) -> Result<&Cluster> {
        let source = self.source;
        let cluster = self
            .clusters
            .get_mut(id.index())
            .ok_or_else(|| Error::not_found(format!("cluster {}", id.index())))?;
        cluster.parse(source)?;
        Ok(cluster)
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// The end-of-stream sentinel cluster.
    pub fn end_of_stream(&self) -> &Cluster {
        &self.sentinel
    }

    /// Track table; `None` until the headers are loaded.
    pub fn tracks(&self) -> Option<&Tracks> {
        self.tracks.as_ref()
    }

    /// Segment Info; defaults apply when the segment has none.
    pub fn info(&self) -> &SegmentInfo {
        &self.info
    }

    /// Whether the headers (and so the track table) are loaded.
    pub fn is_loaded(&self) -> bool {
        self.headers_done
    }

    /// Whether every cluster up to the segment end has been discovered.
    pub fn is_complete(&self) -> bool {
        self.exhausted
    }

    pub fn source(&self) -> &'a S {
        self.source
    }

    pub fn options(&self) -> &DemuxOptions {
        &self.options
    }

    /// Offset of the Segment element header.
    pub fn position(&self) -> u64 {
        self.start
    }

    pub fn payload_start(&self) -> u64 {
        self.payload_start
    }

    /// Payload size, `None` for live streams of unknown size.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn end(&self) -> Option<u64> {
        self.size.map(|size| self.payload_start + size)
    }
}

impl<S: ByteSource + ?Sized> std::fmt::Debug for Segment<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("position", &self.start)
            .field("size", &self.size)
            .field("info", &self.info)
            .field("tracks", &self.tracks.as_ref().map(Tracks::len))
            .field("clusters", &self.clusters.len())
            .field("headers_done", &self.headers_done)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

fn find_segment<S: ByteSource + ?Sized>(source: &S, mut pos: u64) -> Result<ElementHeader> {
    loop {
        if source.length()?.total.is_some_and(|total| pos >= total) {
            return Err(Error::invalid_structure(format!(
                "no Segment element after offset {pos}"
            )));
        }
        let header = read_element_header(source, pos)?;
        if header.id == ElementId::SEGMENT {
            return Ok(header);
        }
        pos = header.end().ok_or_else(|| {
            Error::malformed(pos, format!("unknown-size {} before Segment", header.id))
        })?;
        tracing::trace!(element = %header.id, "skipping element before segment");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemorySource, StreamBuffer};
    use crate::testing::{self, TrackBuilder};
    use assert_matches::assert_matches;

    fn audio_tracks() -> Vec<u8> {
        testing::tracks(&[TrackBuilder::audio(1, "A_VORBIS", 44100.0, 2, 16)])
    }

    fn segment_bytes(children: &[Vec<u8>]) -> Vec<u8> {
        testing::segment(children)
    }

    #[test]
    fn test_new_skips_leading_void() {
        let mut data = testing::element(ElementId::VOID, &[0; 5]);
        let offset = data.len() as u64;
        data.extend(segment_bytes(&[testing::info(1_000_000), audio_tracks()]));

        let source = MemorySource::new(data);
        let segment = Segment::new(&source, 0).unwrap();
        assert_eq!(segment.position(), offset);
        assert!(!segment.is_loaded());
        assert!(segment.tracks().is_none());
    }

    #[test]
    fn test_new_without_segment() {
        let source = MemorySource::new(testing::element(ElementId::VOID, &[0; 3]));
        assert_matches!(Segment::new(&source, 0), Err(Error::InvalidStructure(_)));
    }

    #[test]
    fn test_load_headers_and_clusters() {
        let data = segment_bytes(&[
            testing::element(ElementId::SEEK_HEAD, &[0; 12]),
            testing::info(500_000),
            audio_tracks(),
            testing::cluster(0, &[testing::simple_block(1, 0, true, &[1; 8])]),
            testing::element(ElementId::CUES, &[0; 6]),
            testing::cluster(100, &[testing::simple_block(1, 0, true, &[2; 8])]),
        ]);
        let source = MemorySource::new(data);
        let mut segment = Segment::new(&source, 0).unwrap();
        segment.load().unwrap();

        assert!(segment.is_loaded());
        assert!(segment.is_complete());
        assert_eq!(segment.info().timecode_scale, 500_000);
        assert_eq!(segment.tracks().unwrap().len(), 1);
        assert_eq!(segment.count(), 2);
        assert_eq!(segment.cluster(ClusterId(1)).unwrap().time(), 100);

        // load is idempotent once complete.
        segment.load().unwrap();
        assert_eq!(segment.count(), 2);
    }

    #[test]
    fn test_missing_tracks() {
        let data = segment_bytes(&[testing::info(1_000_000)]);
        let source = MemorySource::new(data);
        let mut segment = Segment::new(&source, 0).unwrap();
        assert_matches!(segment.load(), Err(Error::InvalidStructure(_)));
    }

    #[test]
    fn test_cluster_before_tracks() {
        let data = segment_bytes(&[
            testing::cluster(0, &[testing::simple_block(1, 0, true, &[1; 8])]),
            audio_tracks(),
        ]);
        let source = MemorySource::new(data);
        let mut segment = Segment::new(&source, 0).unwrap();
        assert_matches!(segment.load(), Err(Error::InvalidStructure(_)));
    }

    #[test]
    fn test_missing_info_uses_default_scale() {
        let data = segment_bytes(&[audio_tracks()]);
        let source = MemorySource::new(data);
        let mut segment = Segment::new(&source, 0).unwrap();
        segment.load().unwrap();
        assert_eq!(segment.info().timecode_scale, DEFAULT_TIMECODE_SCALE);
        assert_eq!(segment.count(), 0);
        assert_eq!(segment.first().unwrap(), ClusterStep::EndOfStream);
    }

    #[test]
    fn test_first_next_traversal() {
        let data = segment_bytes(&[
            audio_tracks(),
            testing::cluster(0, &[]),
            testing::cluster(10, &[]),
            testing::cluster(20, &[]),
        ]);
        let source = MemorySource::new(data);
        let mut segment = Segment::new(&source, 0).unwrap();

        let mut times = Vec::new();
        let mut step = segment.first().unwrap();
        while let ClusterStep::Cluster(id) = step {
            times.push(segment.cluster(id).unwrap().time());
            step = segment.next(id).unwrap();
        }
        assert_eq!(step, ClusterStep::EndOfStream);
        assert_eq!(times, vec![0, 10, 20]);
        assert!(segment.end_of_stream().eos());
    }

    #[test]
    fn test_pending_on_growing_stream() {
        let data = segment_bytes(&[
            testing::info(1_000_000),
            audio_tracks(),
            testing::cluster(0, &[testing::simple_block(1, 0, true, &[1; 30])]),
            testing::cluster(33, &[testing::simple_block(1, 0, true, &[2; 30])]),
        ]);
        let stream = StreamBuffer::with_total(data.len() as u64);
        // Cut inside the second cluster's element header.
        let split = data.len() - 40;
        stream.push(&data[..split]);

        let mut segment = Segment::new(&stream, 0).unwrap();
        assert_matches!(segment.load(), Err(Error::ShortRead { .. }));
        assert!(segment.is_loaded());

        let first = segment.first().unwrap().cluster().unwrap();
        assert_eq!(segment.next(first).unwrap(), ClusterStep::Pending);
        assert_eq!(segment.count(), 1);

        stream.push(&data[split..]);
        segment.load().unwrap();
        assert_eq!(segment.count(), 2);
        assert_matches!(segment.next(first).unwrap(), ClusterStep::Cluster(_));
    }

    #[test]
    fn test_headers_resume_without_reparsing() {
        let data = segment_bytes(&[
            testing::info(250_000),
            testing::tracks(&[
                TrackBuilder::audio(1, "A_OPUS", 48000.0, 2, 0).codec_private(&[0; 64]),
            ]),
        ]);
        let stream = StreamBuffer::new();
        let split = data.len() - 10;
        stream.push(&data[..split]);

        let mut segment = Segment::new(&stream, 0).unwrap();
        assert_matches!(segment.load_headers(), Err(Error::ShortRead { .. }));
        // Info preceded the cut and is kept.
        assert_eq!(segment.info().timecode_scale, 250_000);
        assert!(segment.tracks().is_none());

        stream.push(&data[split..]);
        stream.finish();
        segment.load().unwrap();
        assert_eq!(segment.tracks().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_size_segment_and_clusters() {
        let mut data = testing::unknown_size_master(
            ElementId::SEGMENT,
            &[
                audio_tracks(),
                testing::unknown_size_cluster(0, &[testing::simple_block(1, 0, true, &[1; 4])]),
            ],
        );
        data.extend(testing::unknown_size_cluster(
            40,
            &[testing::simple_block(1, 0, true, &[2; 4])],
        ));
        let source = MemorySource::new(data);

        let mut segment = Segment::new(&source, 0).unwrap();
        assert_eq!(segment.size(), None);
        segment.load().unwrap();
        assert_eq!(segment.count(), 2);
        let second = segment.parse_cluster(ClusterId(1)).unwrap();
        assert_eq!(second.time(), 40);
        assert_eq!(second.entry_count(), 1);
    }

    #[test]
    fn test_duplicate_track_numbers_fail_load() {
        let data = segment_bytes(&[testing::tracks(&[
            TrackBuilder::audio(1, "A_OPUS", 48000.0, 2, 0),
            TrackBuilder::audio(1, "A_OPUS", 48000.0, 2, 0),
        ])]);
        let source = MemorySource::new(data);
        let mut segment = Segment::new(&source, 0).unwrap();
        assert_matches!(segment.load(), Err(Error::MalformedStructure { .. }));
    }

    #[test]
    fn test_oversized_tracks_rejected() {
        let data = segment_bytes(&[testing::tracks(&[
            TrackBuilder::audio(1, "A_OPUS", 48000.0, 2, 0).codec_private(&[0; 512]),
        ])]);
        let source = MemorySource::new(data);
        let options = DemuxOptions::default().with_max_element_size(128);
        let mut segment = Segment::with_options(&source, 0, options).unwrap();
        assert_matches!(segment.load(), Err(Error::MalformedStructure { .. }));
    }
}
