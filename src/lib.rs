//! mkvdemux - Matroska/WebM demuxer command-line tool
//!
//! This library crate exposes configuration and report rendering for integration testing.

pub mod config;
pub mod report;
