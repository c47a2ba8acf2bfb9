use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mkvdemux")]
#[command(author, version, about = "Matroska/WebM demuxer")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the EBML header, segment info and track table of a file
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the clusters of a file
    Clusters {
        /// File to read
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List frames in decode order
    Frames {
        /// File to read
        #[arg(required = true)]
        file: PathBuf,

        /// Only show frames of this track number
        #[arg(short, long)]
        track: Option<u64>,

        /// Stop after this many frames
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Feed a file through the streaming buffer in chunks and demux it as it arrives
    Stream {
        /// File to feed
        #[arg(required = true)]
        file: PathBuf,

        /// Bytes appended per step (overrides the config file)
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
