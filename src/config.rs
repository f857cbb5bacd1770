//! Loader configuration.
//!
//! Every component is constructed from one [`LoaderConfig`], loaded once at
//! startup and passed down explicitly. Nothing reads paths from global state.
//!
//! ## Config File
//!
//! The binary reads a TOML file (default `imageloader.toml` in the working
//! directory, or `--config <file>`). A missing file means stock defaults.
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! root_dir = "input"                      # Directory the node browses
//! cache_dir = ".cache/thumbnails"         # Flat directory of <hash>.jpg previews
//! metadata_file = "metadata.json"         # Rating/tag store
//!
//! [thumbnails]
//! max_size = 400            # Longest side of a preview, in pixels
//! quality = 85              # JPEG quality (1-100)
//!
//! [scan]
//! extensions = ["jpg", "jpeg", "png", "bmp", "gif", "webp", "tiff", "tif"]
//!
//! [server]
//! bind = "127.0.0.1:8189"
//!
//! [processing]
//! max_processes = 4         # Max parallel workers for `warm` (omit for auto)
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse: user values are merged over the stock defaults
//! with [`merge_toml`]. Unknown keys are rejected to catch typos early.
//!
//! Relative paths resolve against the directory containing the config file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Name of the config file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "imageloader.toml";

/// Loader configuration.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    /// Directory browsed by the node; relative paths of images are computed
    /// against it and `/files` defaults to it.
    pub root_dir: PathBuf,
    /// Directory holding generated thumbnails.
    pub cache_dir: PathBuf,
    /// JSON file holding per-image rating and tags.
    pub metadata_file: PathBuf,
    pub thumbnails: ThumbnailsConfig,
    pub scan: ScanConfig,
    pub server: ServerConfig,
    pub processing: ProcessingConfig,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("input"),
            cache_dir: PathBuf::from(".cache/thumbnails"),
            metadata_file: PathBuf::from("metadata.json"),
            thumbnails: ThumbnailsConfig::default(),
            scan: ScanConfig::default(),
            server: ServerConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl LoaderConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thumbnails.max_size == 0 {
            return Err(ConfigError::Validation(
                "thumbnails.max_size must be non-zero".into(),
            ));
        }
        if !(1..=100).contains(&self.thumbnails.quality) {
            return Err(ConfigError::Validation(
                "thumbnails.quality must be 1-100".into(),
            ));
        }
        if self.scan.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "scan.extensions must not be empty".into(),
            ));
        }
        if let Some(ext) = self
            .scan
            .extensions
            .iter()
            .find(|e| e.is_empty() || e.starts_with('.'))
        {
            return Err(ConfigError::Validation(format!(
                "scan.extensions entries are bare extensions without a dot, got {ext:?}"
            )));
        }
        if self.server.bind.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "server.bind is not a socket address: {}",
                self.server.bind
            )));
        }
        Ok(())
    }

    /// Resolve relative paths against `base` (the config file's directory).
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        for path in [
            &mut self.root_dir,
            &mut self.cache_dir,
            &mut self.metadata_file,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }

    /// Lowercased extension set used by the indexer and the thumbnail route.
    pub fn image_extensions(&self) -> Vec<String> {
        self.scan
            .extensions
            .iter()
            .map(|e| e.to_ascii_lowercase())
            .collect()
    }
}

/// Thumbnail generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailsConfig {
    /// Bounding box for the longer side of a preview.
    pub max_size: u32,
    /// JPEG encoding quality.
    pub quality: u32,
}

impl Default for ThumbnailsConfig {
    fn default() -> Self {
        Self {
            max_size: 400,
            quality: 85,
        }
    }
}

/// Directory scanning settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// File extensions (without the dot, any case) treated as images.
    pub extensions: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: ["jpg", "jpeg", "png", "bmp", "gif", "webp", "tiff", "tif"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8189".to_string(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel thumbnail workers for `warm`.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)`, at least 1
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(LoaderConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Parse a config from TOML text, merged over stock defaults and validated.
pub fn parse_config(content: &str) -> Result<LoaderConfig, ConfigError> {
    let overlay: toml::Value = toml::from_str(content)?;
    let merged = merge_toml(stock_defaults_value()?, overlay);
    let config: LoaderConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the config file at `path`.
///
/// A missing file yields the stock defaults. Relative paths in the result are
/// resolved against the file's parent directory.
pub fn load_config(path: &Path) -> Result<LoaderConfig, ConfigError> {
    let base = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let config = if path.exists() {
        parse_config(&fs::read_to_string(path)?)?
    } else {
        let config = LoaderConfig::default();
        config.validate()?;
        config
    };
    Ok(config.resolve_paths(base))
}

/// Returns a fully-commented stock config file with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Image Loader Configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.
#
# Relative paths are resolved against the directory holding this file.

# Directory browsed by the loader node. Image relative paths are computed
# against it, and the file listing starts here.
root_dir = "input"

# Flat directory of generated previews (<hash>.jpg).
cache_dir = ".cache/thumbnails"

# JSON store of per-image rating and tags, keyed by absolute path.
metadata_file = "metadata.json"

# ---------------------------------------------------------------------------
# Thumbnails
# ---------------------------------------------------------------------------
[thumbnails]
# Longest side of a preview in pixels. Smaller images are never upscaled.
max_size = 400

# JPEG encoding quality (1 = worst, 100 = best).
quality = 85

# ---------------------------------------------------------------------------
# Scanning
# ---------------------------------------------------------------------------
[scan]
# Extensions listed as images (matched case-insensitively, no leading dot).
extensions = ["jpg", "jpeg", "png", "bmp", "gif", "webp", "tiff", "tif"]

# ---------------------------------------------------------------------------
# HTTP server
# ---------------------------------------------------------------------------
[server]
bind = "127.0.0.1:8189"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers used by `imageloader warm`.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
