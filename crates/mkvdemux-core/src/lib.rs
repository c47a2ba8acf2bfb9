//! # mkvdemux-core
//!
//! Incremental Matroska/WebM demuxer over pluggable byte sources.
//!
//! The parser never owns the input. Every read goes through a [`ByteSource`], which
//! may be an in-memory buffer, a file, a growing network buffer or a set of caller
//! callbacks. When a source cannot supply a range yet, the call fails with
//! [`Error::ShortRead`] and all parse state stays where it was; the caller feeds more
//! bytes and repeats the call.
//!
//! ## Layers
//!
//! - [`EbmlHeader`]: validates the leading EBML header and doc type.
//! - [`Segment`]: Info, Tracks and cluster discovery.
//! - [`Cluster`]: block entries, parsed on demand.
//! - [`Block`] and [`Frame`]: lacing, keyframe flags and frame byte ranges.
//! - [`Demuxer`]: packets in decode order across the whole segment.
//!
//! ## Example
//!
//! ```no_run
//! use mkvdemux_core::{Demuxer, FileSource};
//!
//! let source = FileSource::open("clip.webm")?;
//! let mut demuxer = Demuxer::open(&source)?;
//!
//! for track in demuxer.tracks() {
//!     println!("track {}: {} {}", track.number, track.track_type.as_str(), track.codec_id);
//! }
//!
//! let mut buf = vec![0u8; 1 << 20];
//! while let Some(packet) = demuxer.next_packet()? {
//!     let len = demuxer.read_frame(&packet, &mut buf)?;
//!     println!("{} @ {}: {len} bytes", packet.track_number, packet.timestamp);
//! }
//! # Ok::<(), mkvdemux_core::Error>(())
//! ```

pub mod cluster;
pub mod codec;
pub mod demuxer;
pub mod ebml;
pub mod error;
pub mod options;
pub mod segment;
pub mod source;
pub mod time;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use cluster::{Block, BlockEntry, Cluster, ClusterId, Frame, Lacing, ParseProgress};
pub use demuxer::{detect, is_matroska_extension, Demuxer, Packet, Packets, MIME_TYPES};
pub use ebml::{EbmlHeader, ElementId};
pub use error::{status_code, Error, Result, STATUS_OK};
pub use options::DemuxOptions;
pub use segment::{
    AudioSettings, ClusterStep, Segment, SegmentInfo, Track, TrackKind, TrackType, Tracks,
    VideoSettings,
};
pub use source::{ByteSource, CallbackSource, FileSource, MemorySource, ReaderSource, SourceLength, StreamBuffer};
pub use time::Timestamp;
