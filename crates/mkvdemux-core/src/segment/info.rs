//! Segment Info.

use crate::ebml::{Children, ElementId};
use crate::time::Timestamp;
use crate::{Error, Result};
use std::time::Duration;

/// Nanoseconds per tick when a segment does not say otherwise.
pub const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

/// Segment-wide metadata needed to interpret timestamps.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentInfo {
    /// Nanoseconds per tick.
    pub timecode_scale: u64,
    /// Declared duration in ticks.
    pub duration: Option<f64>,
    pub title: Option<String>,
    pub muxing_app: Option<String>,
    pub writing_app: Option<String>,
    /// Nanoseconds since 2001-01-01T00:00:00 UTC.
    pub date_utc: Option<i64>,
}

impl Default for SegmentInfo {
    fn default() -> Self {
        Self {
            timecode_scale: DEFAULT_TIMECODE_SCALE,
            duration: None,
            title: None,
            muxing_app: None,
            writing_app: None,
            date_utc: None,
        }
    }
}

impl SegmentInfo {
    /// Parse an Info payload whose first byte sits at `base`.
    pub(crate) fn parse(payload: &[u8], base: u64) -> Result<Self> {
        let mut info = Self::default();
        for child in Children::new(payload, base) {
            let child = child?;
            match child.id {
                ElementId::TIMECODE_SCALE => {
                    info.timecode_scale = child.uint()?;
                    if info.timecode_scale == 0 {
                        return Err(Error::malformed(child.offset, "timecode scale of 0"));
                    }
                }
                ElementId::DURATION => {
                    let duration = child.float()?;
                    if !duration.is_finite() || duration < 0.0 {
                        return Err(Error::malformed(
                            child.offset,
                            format!("invalid segment duration {duration}"),
                        ));
                    }
                    info.duration = Some(duration);
                }
                ElementId::TITLE => info.title = Some(child.string()),
                ElementId::MUXING_APP => info.muxing_app = Some(child.string()),
                ElementId::WRITING_APP => info.writing_app = Some(child.string()),
                ElementId::DATE_UTC => info.date_utc = Some(child.int()?),
                _ => {}
            }
        }
        Ok(info)
    }

    /// Convert a tick count to nanoseconds.
    pub fn ticks_to_nanos(&self, ticks: i64) -> i64 {
        self.timestamp(ticks).as_nanos()
    }

    pub fn timestamp(&self, ticks: i64) -> Timestamp {
        Timestamp::new(ticks, self.timecode_scale)
    }

    /// Declared duration in nanoseconds.
    pub fn duration_ns(&self) -> Option<i64> {
        self.duration
            .map(|ticks| (ticks * self.timecode_scale as f64) as i64)
    }

    /// Declared duration as a [`Duration`].
    pub fn duration(&self) -> Option<Duration> {
        self.duration_ns()
            .map(|ns| Duration::from_nanos(ns.max(0) as u64))
    }
}
