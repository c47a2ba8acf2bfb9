//! Serializable summaries printed by the CLI.

use mkvdemux_core::codec;
use mkvdemux_core::{
    AudioSettings, ByteSource, Cluster, Demuxer, EbmlHeader, Packet, SegmentInfo, Track,
    TrackKind, VideoSettings,
};
use serde::Serialize;

use crate::config::TimeUnit;

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub header: EbmlHeader,
    pub info: SegmentInfo,
    pub duration_secs: Option<f64>,
    pub tracks: Vec<TrackReport>,
    /// Clusters discovered; `None` when the segment could not be walked to its end.
    pub clusters: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackReport {
    pub number: u64,
    pub uid: u64,
    #[serde(rename = "type")]
    pub track_type: String,
    pub codec_id: String,
    pub codec: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fourcc: Option<String>,
    pub codec_private_len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub language: String,
    pub default: bool,
    pub forced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioSettings>,
}

impl From<&Track> for TrackReport {
    fn from(track: &Track) -> Self {
        let (video, audio) = match track.kind {
            TrackKind::Video(v) => (Some(v), None),
            TrackKind::Audio(a) => (None, Some(a)),
            TrackKind::Other => (None, None),
        };
        Self {
            number: track.number,
            uid: track.uid,
            track_type: track.track_type.as_str().to_string(),
            codec_id: track.codec_id.clone(),
            codec: codec::codec_name(&track.codec_id),
            fourcc: track
                .fourcc()
                .map(|code| String::from_utf8_lossy(&code).into_owned()),
            codec_private_len: track.codec_private_bytes().len(),
            name: track.name.clone(),
            language: track.language.clone(),
            default: track.default,
            forced: track.forced,
            video,
            audio,
        }
    }
}

impl ProbeReport {
    pub fn new<S: ByteSource + ?Sized>(demuxer: &Demuxer<'_, S>, clusters: Option<usize>) -> Self {
        let info = demuxer.info().clone();
        Self {
            header: demuxer.header().clone(),
            duration_secs: info.duration_ns().map(|ns| ns as f64 / 1e9),
            info,
            tracks: demuxer.tracks().iter().map(TrackReport::from).collect(),
            clusters,
        }
    }

    pub fn print_text(&self) {
        println!("Doc type: {} v{}", self.header.doc_type, self.header.doc_type_version);
        println!("Timecode scale: {} ns/tick", self.info.timecode_scale);
        if let Some(secs) = self.duration_secs {
            let total = secs as u64;
            println!(
                "Duration: {:02}:{:02}:{:02}.{:03}",
                total / 3600,
                (total / 60) % 60,
                total % 60,
                ((secs - total as f64) * 1000.0) as u64
            );
        }
        if let Some(ref title) = self.info.title {
            println!("Title: {}", title);
        }
        if let Some(ref app) = self.info.muxing_app {
            println!("Muxing app: {}", app);
        }
        if let Some(ref app) = self.info.writing_app {
            println!("Writing app: {}", app);
        }
        if let Some(count) = self.clusters {
            println!("Clusters: {}", count);
        }

        println!("\nTracks: {}", self.tracks.len());
        for track in &self.tracks {
            print!("  #{} {} {} ({})", track.number, track.track_type, track.codec, track.codec_id);
            if let Some(ref v) = track.video {
                print!(" {}x{}", v.pixel_width, v.pixel_height);
                if v.frame_rate > 0.0 {
                    print!(" {:.3} fps", v.frame_rate);
                }
            }
            if let Some(ref a) = track.audio {
                print!(" {}Hz {}ch", a.sampling_rate, a.channels);
                if a.bit_depth > 0 {
                    print!(" {} bit", a.bit_depth);
                }
            }
            print!(" [{}]", track.language);
            if track.default {
                print!(" [default]");
            }
            if track.forced {
                print!(" [forced]");
            }
            println!();
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterReport {
    pub index: usize,
    pub position: u64,
    pub size: Option<u64>,
    pub time: i64,
    pub time_ns: i64,
    pub entries: usize,
    pub keyframes: usize,
}

impl ClusterReport {
    pub fn new(cluster: &Cluster, info: &SegmentInfo) -> Self {
        Self {
            index: cluster.id().index(),
            position: cluster.position(),
            size: cluster.size(),
            time: cluster.time(),
            time_ns: cluster.time_ns(info),
            entries: cluster.entry_count(),
            keyframes: cluster
                .entries()
                .iter()
                .filter_map(|entry| entry.block())
                .filter(|block| block.is_key())
                .count(),
        }
    }

    pub fn print_text(&self, unit: TimeUnit, timecode_scale: u64) {
        let time = mkvdemux_core::Timestamp::new(self.time, timecode_scale);
        let size = self
            .size
            .map_or_else(|| "unknown".to_string(), |size| size.to_string());
        println!(
            "  [{}] @{} size {} time {} entries {} keys {}",
            self.index,
            self.position,
            size,
            unit.format(&time),
            self.entries,
            self.keyframes
        );
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameReport {
    pub track: u64,
    pub cluster: usize,
    pub entry: usize,
    pub frame: usize,
    pub ticks: i64,
    pub time_ns: i64,
    pub key: bool,
    pub invisible: bool,
    pub position: u64,
    pub length: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "is_zero")]
    pub discard_padding: i64,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl From<&Packet> for FrameReport {
    fn from(packet: &Packet) -> Self {
        Self {
            track: packet.track_number,
            cluster: packet.cluster.index(),
            entry: packet.entry,
            frame: packet.frame_index,
            ticks: packet.timestamp.ticks,
            time_ns: packet.timestamp.as_nanos(),
            key: packet.is_key,
            invisible: packet.is_invisible,
            position: packet.frame.pos,
            length: packet.frame.len,
            duration: packet.duration,
            discard_padding: packet.discard_padding,
        }
    }
}

impl FrameReport {
    pub fn print_text(&self, unit: TimeUnit, timecode_scale: u64) {
        let time = mkvdemux_core::Timestamp::new(self.ticks, timecode_scale);
        print!(
            "  track {} time {} @{} len {}",
            self.track,
            unit.format(&time),
            self.position,
            self.length
        );
        if self.key {
            print!(" [key]");
        }
        if self.invisible {
            print!(" [invisible]");
        }
        println!();
    }
}
