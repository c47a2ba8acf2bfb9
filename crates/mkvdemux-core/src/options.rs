//! Parser limits.

/// Default cap on elements read into memory (Info, Tracks, CodecPrivate).
pub const DEFAULT_MAX_ELEMENT_SIZE: u64 = 64 * 1024 * 1024;

/// A lace count byte can describe at most 256 frames.
pub const DEFAULT_MAX_LACE_FRAMES: usize = 256;

/// Limits applied while demuxing.
///
/// Protects callers from allocations driven by hostile size fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialize",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct DemuxOptions {
    /// Largest element payload buffered in memory.
    pub max_element_size: u64,
    /// Largest number of frames accepted in one laced block.
    pub max_lace_frames: usize,
}

impl Default for DemuxOptions {
    fn default() -> Self {
        Self {
            max_element_size: DEFAULT_MAX_ELEMENT_SIZE,
            max_lace_frames: DEFAULT_MAX_LACE_FRAMES,
        }
    }
}

impl DemuxOptions {
    pub fn with_max_element_size(mut self, size: u64) -> Self {
        self.max_element_size = size;
        self
    }

    pub fn with_max_lace_frames(mut self, frames: usize) -> Self {
        self.max_lace_frames = frames;
        self
    }
}
