//! Track table.

use crate::codec::{self, XiphHeaders};
use crate::ebml::{Child, Children, ElementId};
use crate::{Error, Result};
use bytes::Bytes;
use std::collections::HashMap;

/// Matroska `TrackType` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackType {
    Video,
    Audio,
    Complex,
    Logo,
    Subtitle,
    Buttons,
    Control,
    Metadata,
    Unknown(u64),
}

impl TrackType {
    pub fn from_u64(value: u64) -> Self {
        match value {
            1 => Self::Video,
            2 => Self::Audio,
            3 => Self::Complex,
            0x10 => Self::Logo,
            0x11 => Self::Subtitle,
            0x12 => Self::Buttons,
            0x20 => Self::Control,
            0x21 => Self::Metadata,
            other => Self::Unknown(other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Complex => "complex",
            Self::Logo => "logo",
            Self::Subtitle => "subtitle",
            Self::Buttons => "buttons",
            Self::Control => "control",
            Self::Metadata => "metadata",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Video track parameters; absent values are 0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct VideoSettings {
    pub pixel_width: u64,
    pub pixel_height: u64,
    pub display_width: u64,
    pub display_height: u64,
    /// Declared frames per second, 0.0 when the stream omits it.
    pub frame_rate: f64,
}

/// Audio track parameters; absent values are 0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct AudioSettings {
    pub sampling_rate: f64,
    pub output_sampling_rate: f64,
    pub channels: u64,
    pub bit_depth: u64,
}

/// Type-specific part of a [`Track`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackKind {
    Video(VideoSettings),
    Audio(AudioSettings),
    Other,
}

/// One parsed `TrackEntry`.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Stable identifier blocks refer to; not the enumeration index.
    pub number: u64,
    pub uid: u64,
    pub track_type: TrackType,
    pub kind: TrackKind,
    pub codec_id: String,
    pub codec_name: Option<String>,
    pub codec_private: Option<Bytes>,
    pub name: Option<String>,
    pub language: String,
    /// Nanoseconds per frame, when declared.
    pub default_duration: Option<u64>,
    /// Nanoseconds of decoder delay.
    pub codec_delay: u64,
    /// Nanoseconds of pre-roll needed after a seek.
    pub seek_preroll: u64,
    pub enabled: bool,
    pub default: bool,
    pub forced: bool,
    pub lacing: bool,
}

impl Track {
    fn parse(entry: &Child<'_>) -> Result<Self> {
        let mut number = None;
        let mut track = Self {
            number: 0,
            uid: 0,
            track_type: TrackType::Unknown(0),
            kind: TrackKind::Other,
            codec_id: String::new(),
            codec_name: None,
            codec_private: None,
            name: None,
            language: "eng".to_string(),
            default_duration: None,
            codec_delay: 0,
            seek_preroll: 0,
            enabled: true,
            default: true,
            forced: false,
            lacing: true,
        };
        let mut video = None;
        let mut audio = None;

        for child in entry.children() {
            let child = child?;
            match child.id {
                ElementId::TRACK_NUMBER => number = Some(child.uint()?),
                ElementId::TRACK_UID => track.uid = child.uint()?,
                ElementId::TRACK_TYPE => track.track_type = TrackType::from_u64(child.uint()?),
                ElementId::CODEC_ID => track.codec_id = child.string(),
                ElementId::CODEC_NAME => track.codec_name = Some(child.string()),
                ElementId::CODEC_PRIVATE => {
                    track.codec_private = Some(Bytes::copy_from_slice(child.data))
                }
                ElementId::NAME => track.name = Some(child.string()),
                ElementId::LANGUAGE => track.language = child.string(),
                ElementId::DEFAULT_DURATION => track.default_duration = Some(child.uint()?),
                ElementId::CODEC_DELAY => track.codec_delay = child.uint()?,
                ElementId::SEEK_PRE_ROLL => track.seek_preroll = child.uint()?,
                ElementId::FLAG_ENABLED => track.enabled = child.uint()? != 0,
                ElementId::FLAG_DEFAULT => track.default = child.uint()? != 0,
                ElementId::FLAG_FORCED => track.forced = child.uint()? != 0,
                ElementId::FLAG_LACING => track.lacing = child.uint()? != 0,
                ElementId::VIDEO => video = Some(parse_video(&child)?),
                ElementId::AUDIO => audio = Some(parse_audio(&child)?),
                _ => {}
            }
        }

        track.number = match number {
            Some(0) => return Err(Error::malformed(entry.offset, "track number 0")),
            Some(n) => n,
            None => return Err(Error::malformed(entry.offset, "TrackEntry without TrackNumber")),
        };
        track.kind = match track.track_type {
            TrackType::Video => TrackKind::Video(video.unwrap_or_default()),
            TrackType::Audio => TrackKind::Audio(audio.unwrap_or_default()),
            _ => TrackKind::Other,
        };
        Ok(track)
    }

    pub fn video(&self) -> Option<&VideoSettings> {
        match &self.kind {
            TrackKind::Video(settings) => Some(settings),
            _ => None,
        }
    }

    pub fn audio(&self) -> Option<&AudioSettings> {
        match &self.kind {
            TrackKind::Audio(settings) => Some(settings),
            _ => None,
        }
    }

    pub fn is_video(&self) -> bool {
        self.video().is_some()
    }

    pub fn is_audio(&self) -> bool {
        self.audio().is_some()
    }

    /// CodecPrivate bytes, empty when absent.
    pub fn codec_private_bytes(&self) -> &[u8] {
        self.codec_private.as_deref().unwrap_or_default()
    }

    pub fn fourcc(&self) -> Option<[u8; 4]> {
        codec::fourcc(&self.codec_id)
    }

    /// Split Vorbis/Theora CodecPrivate into its identification, comment and setup
    /// packets.
    pub fn xiph_headers(&self) -> Result<XiphHeaders> {
        if !codec::uses_xiph_headers(&self.codec_id) {
            return Err(Error::unsupported(format!(
                "codec {} has no Xiph-laced headers",
                self.codec_id
            )));
        }
        let private = self
            .codec_private
            .as_ref()
            .ok_or_else(|| Error::not_found(format!("codec private for track {}", self.number)))?;
        codec::split_xiph_headers(private)
    }
}

fn parse_video(element: &Child<'_>) -> Result<VideoSettings> {
    let mut video = VideoSettings::default();
    for child in element.children() {
        let child = child?;
        match child.id {
            ElementId::PIXEL_WIDTH => video.pixel_width = child.uint()?,
            ElementId::PIXEL_HEIGHT => video.pixel_height = child.uint()?,
            ElementId::DISPLAY_WIDTH => video.display_width = child.uint()?,
            ElementId::DISPLAY_HEIGHT => video.display_height = child.uint()?,
            ElementId::FRAME_RATE => {
                let rate = child.float()?;
                video.frame_rate = if rate.is_finite() && rate > 0.0 { rate } else { 0.0 };
            }
            _ => {}
        }
    }
    if video.display_width == 0 {
        video.display_width = video.pixel_width;
    }
    if video.display_height == 0 {
        video.display_height = video.pixel_height;
    }
    Ok(video)
}

fn parse_audio(element: &Child<'_>) -> Result<AudioSettings> {
    let mut audio = AudioSettings::default();
    for child in element.children() {
        let child = child?;
        match child.id {
            ElementId::SAMPLING_FREQUENCY => audio.sampling_rate = child.float()?,
            ElementId::OUTPUT_SAMPLING_FREQUENCY => audio.output_sampling_rate = child.float()?,
            ElementId::CHANNELS => audio.channels = child.uint()?,
            ElementId::BIT_DEPTH => audio.bit_depth = child.uint()?,
            _ => {}
        }
    }
    if audio.output_sampling_rate == 0.0 {
        audio.output_sampling_rate = audio.sampling_rate;
    }
    Ok(audio)
}

/// Every track declared by a segment, indexed by track number.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tracks {
    tracks: Vec<Track>,
    by_number: HashMap<u64, usize>,
}

impl Tracks {
    /// Parse a Tracks payload whose first byte sits at `base`.
    pub(crate) fn parse(payload: &[u8], base: u64) -> Result<Self> {
        let mut tracks = Self::default();
        for child in Children::new(payload, base) {
            let child = child?;
            if child.id != ElementId::TRACK_ENTRY {
                continue;
            }
            let track = Track::parse(&child)?;
            if tracks.by_number.contains_key(&track.number) {
                return Err(Error::malformed(
                    child.offset,
                    format!("duplicate track number {}", track.number),
                ));
            }
            tracing::debug!(
                number = track.number,
                kind = track.track_type.as_str(),
                codec = %track.codec_id,
                "parsed track"
            );
            tracks.by_number.insert(track.number, tracks.tracks.len());
            tracks.tracks.push(track);
        }
        Ok(tracks)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Track at enumeration position `index`.
    pub fn get_by_index(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Track whose number is `number`; [`Error::NotFound`] if none.
    pub fn get_by_number(&self, number: u64) -> Result<&Track> {
        self.by_number
            .get(&number)
            .map(|&index| &self.tracks[index])
            .ok_or_else(|| Error::not_found(format!("track number {number}")))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Track> {
        self.tracks.iter()
    }
}

impl<'a> IntoIterator for &'a Tracks {
    type Item = &'a Track;
    type IntoIter = std::slice::Iter<'a, Track>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
