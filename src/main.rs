mod cli;

use mkvdemux::config::{self, Config};
use mkvdemux::report::{ClusterReport, FrameReport, ProbeReport};
use mkvdemux_core::{Demuxer, FileSource, StreamBuffer};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mkvdemux=trace,mkvdemux_core=trace".to_string()
        } else {
            "mkvdemux=info,mkvdemux_core=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Probe { file, json } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            probe_file(&file, &config, json)
        }
        Commands::Clusters { file, json } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            list_clusters(&file, &config, json)
        }
        Commands::Frames {
            file,
            track,
            limit,
            json,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            list_frames(&file, &config, track, limit, json)
        }
        Commands::Stream { file, chunk_size } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let chunk_size = chunk_size.unwrap_or(config.stream.chunk_size);
            if chunk_size == 0 {
                anyhow::bail!("Chunk size cannot be 0");
            }
            stream_file(&file, &config, chunk_size)
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("mkvdemux {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn open_source(file: &Path) -> Result<FileSource> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }
    let source =
        FileSource::open(file).with_context(|| format!("Failed to open {:?}", file))?;
    if !mkvdemux_core::detect(&source)? {
        anyhow::bail!("Not a Matroska/WebM file: {:?}", file);
    }
    Ok(source)
}

fn probe_file(file: &Path, config: &Config, json: bool) -> Result<()> {
    let source = open_source(file)?;
    let mut demuxer = Demuxer::with_options(&source, config.demux)
        .with_context(|| format!("Failed to read headers of {:?}", file))?;

    let clusters = match demuxer.resume() {
        Ok(()) => Some(demuxer.segment().count()),
        Err(e) => {
            tracing::warn!("Could not walk all clusters: {}", e);
            None
        }
    };
    let report = ProbeReport::new(&demuxer, clusters);

    if json || config.output.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("File: {}", file.display());
        report.print_text();
    }

    Ok(())
}

fn list_clusters(file: &Path, config: &Config, json: bool) -> Result<()> {
    let source = open_source(file)?;
    let mut demuxer = Demuxer::with_options(&source, config.demux)
        .with_context(|| format!("Failed to read headers of {:?}", file))?;
    demuxer
        .resume()
        .with_context(|| format!("Failed to walk clusters of {:?}", file))?;

    let info = demuxer.info().clone();
    let segment = demuxer.segment_mut();
    let mut reports = Vec::with_capacity(segment.count());
    for index in 0..segment.count() {
        let id = segment.clusters()[index].id();
        let cluster = segment
            .parse_cluster(id)
            .with_context(|| format!("Failed to parse cluster {}", index))?;
        reports.push(ClusterReport::new(cluster, &info));
    }

    if json || config.output.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        println!("Clusters: {}", reports.len());
        for report in &reports {
            report.print_text(config.output.time_unit, info.timecode_scale);
        }
    }

    Ok(())
}

fn list_frames(
    file: &Path,
    config: &Config,
    track: Option<u64>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let source = open_source(file)?;
    let mut demuxer = Demuxer::with_options(&source, config.demux)
        .with_context(|| format!("Failed to read headers of {:?}", file))?;

    if let Some(number) = track {
        demuxer
            .tracks()
            .get_by_number(number)
            .with_context(|| format!("Track {} not found", number))?;
    }

    let timecode_scale = demuxer.info().timecode_scale;
    let mut frames = Vec::new();
    for packet in demuxer.packets() {
        let packet = packet.context("Failed to read frame")?;
        if track.is_some_and(|number| number != packet.track_number) {
            continue;
        }
        frames.push(FrameReport::from(&packet));
        if limit.is_some_and(|limit| frames.len() >= limit) {
            break;
        }
    }

    if json || config.output.json {
        println!("{}", serde_json::to_string_pretty(&frames)?);
    } else {
        println!("Frames: {}", frames.len());
        for frame in &frames {
            frame.print_text(config.output.time_unit, timecode_scale);
        }
    }

    Ok(())
}

fn stream_file(file: &Path, config: &Config, chunk_size: usize) -> Result<()> {
    let data = std::fs::read(file).with_context(|| format!("Failed to read {:?}", file))?;
    let stream = StreamBuffer::new();
    let mut fed = 0usize;
    let mut short_reads = 0usize;

    // Append the next chunk; false once the whole file has been fed.
    let feed = |fed: &mut usize| -> bool {
        if *fed >= data.len() {
            return false;
        }
        let end = (*fed + chunk_size).min(data.len());
        stream.push(&data[*fed..end]);
        *fed = end;
        if end == data.len() {
            stream.finish();
        }
        true
    };

    let mut demuxer = loop {
        match Demuxer::with_options(&stream, config.demux) {
            Ok(demuxer) => break demuxer,
            Err(e) if e.is_short_read() => {
                short_reads += 1;
                if !feed(&mut fed) {
                    anyhow::bail!("Stream ended before the segment headers: {}", e);
                }
            }
            Err(e) => return Err(e).context("Failed to read headers"),
        }
    };
    tracing::info!("Headers ready after {} of {} bytes", fed, data.len());

    let mut packets = 0usize;
    let mut bytes = 0u64;
    loop {
        match demuxer.next_packet() {
            Ok(Some(packet)) => {
                packets += 1;
                bytes += packet.frame.len;
            }
            Ok(None) => break,
            Err(e) if e.is_short_read() => {
                short_reads += 1;
                if !feed(&mut fed) {
                    anyhow::bail!("Stream ended mid-cluster: {}", e);
                }
            }
            Err(e) => return Err(e).context("Failed to demux stream"),
        }
    }

    println!("Fed: {} bytes in chunks of {}", fed, chunk_size);
    println!("Short reads retried: {}", short_reads);
    println!("Tracks: {}", demuxer.tracks().len());
    println!("Clusters: {}", demuxer.segment().count());
    println!("Frames: {} ({} bytes)", packets, bytes);

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Max element size: {}", config.demux.max_element_size);
            println!("  Max lace frames: {}", config.demux.max_lace_frames);
            println!("  JSON output: {}", config.output.json);
            println!("  Time unit: {:?}", config.output.time_unit);
            println!("  Stream chunk size: {}", config.stream.chunk_size);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = Config::default();
            println!("Default config:");
            println!("  Max element size: {}", config.demux.max_element_size);
            println!("  Max lace frames: {}", config.demux.max_lace_frames);
            println!("  Stream chunk size: {}", config.stream.chunk_size);
        }
    }

    Ok(())
}
