//! Presentation timestamps.

use std::fmt;
use std::time::Duration;

/// A raw tick count together with the scale that gives it meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Timestamp {
    /// Absolute time in segment ticks; may be negative for blocks that start before
    /// their cluster.
    pub ticks: i64,
    /// Nanoseconds per tick.
    pub timecode_scale: u64,
}

impl Timestamp {
    pub fn new(ticks: i64, timecode_scale: u64) -> Self {
        Self {
            ticks,
            timecode_scale,
        }
    }

    /// Time in nanoseconds, saturating on overflow.
    pub fn as_nanos(&self) -> i64 {
        let scale = i64::try_from(self.timecode_scale).unwrap_or(i64::MAX);
        self.ticks.saturating_mul(scale)
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.as_nanos() as f64 / 1e9
    }

    /// Time as a [`Duration`]; negative times clamp to zero.
    pub fn duration(&self) -> Duration {
        Duration::from_nanos(self.as_nanos().max(0) as u64)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.as_secs_f64())
    }
}
