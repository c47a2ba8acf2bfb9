mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./mkvdemux.toml",
        "~/.config/mkvdemux/config.toml",
        "/etc/mkvdemux/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.demux.max_element_size == 0 {
        anyhow::bail!("demux.max_element_size cannot be 0");
    }

    if config.demux.max_lace_frames == 0 || config.demux.max_lace_frames > 256 {
        anyhow::bail!(
            "demux.max_lace_frames must be between 1 and 256, got {}",
            config.demux.max_lace_frames
        );
    }

    if config.stream.chunk_size == 0 {
        anyhow::bail!("stream.chunk_size cannot be 0");
    }

    if config.demux.max_element_size > 1 << 30 {
        tracing::warn!(
            "demux.max_element_size of {} bytes allows very large allocations",
            config.demux.max_element_size
        );
    }

    Ok(())
}
