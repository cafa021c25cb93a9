//! Common utility functions shared across CLI commands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rekognition_core::{PlatformConfig, ScanMode};
use tracing::debug;

/// Resolve and load the platform configuration.
pub fn load_config(path: Option<PathBuf>) -> Result<PlatformConfig> {
    let config = match path {
        Some(path) => PlatformConfig::load(&path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PlatformConfig::load_from_env().context("No configuration given (use --config)")?,
    };
    debug!(sources = config.sources.len(), mode = ?config.mode, "Loaded configuration");
    Ok(config)
}

/// Short label for the scan mode.
pub fn mode_label(mode: ScanMode) -> &'static str {
    match mode {
        ScanMode::Face => "face search",
        ScanMode::Object => "object detection",
    }
}

/// Display form of an optional path.
pub fn display_path(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string())
}
