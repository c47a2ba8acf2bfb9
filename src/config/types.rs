use mkvdemux_core::{DemuxOptions, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub demux: DemuxOptions,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub stream: StreamConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Print JSON instead of text even without `--json`
    #[serde(default)]
    pub json: bool,

    /// Unit used for timestamps in text output
    #[serde(default)]
    pub time_unit: TimeUnit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    #[default]
    Seconds,
    Ticks,
    Nanos,
}

impl TimeUnit {
    /// Render a timestamp in this unit.
    pub fn format(&self, timestamp: &Timestamp) -> String {
        match self {
            TimeUnit::Seconds => timestamp.to_string(),
            TimeUnit::Ticks => timestamp.ticks.to_string(),
            TimeUnit::Nanos => format!("{}ns", timestamp.as_nanos()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// Bytes appended to the stream buffer per step (default: 4096)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

fn default_chunk_size() -> usize {
    4096
}
