//! Catalog configuration, loaded from TOML.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::cache::MAX_REQUEST;
use crate::error::ConfigError;
use crate::extract::hash::{HashAlgorithm, DEFAULT_HASH_BUFFER};
use crate::extract::thumbnail::THUMBNAIL_SIZE;

/// Extensions cataloged when the config does not list any
pub const DEFAULT_EXTENSIONS: [&str; 9] =
    ["fits", "fit", "fts", "xisf", "tif", "tiff", "png", "jpg", "jpeg"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Directories to crawl
    pub roots: Vec<PathBuf>,
    /// Allowed file extensions (case-insensitive, leading dot optional)
    pub extensions: Vec<String>,
    pub thumbnail_max_dim: u32,
    pub thumbnail_cache_capacity: usize,
    pub hash_algorithm: HashAlgorithm,
    pub hash_buffer_bytes: usize,
    /// Catalog database location; the user data directory when unset
    pub database_path: Option<PathBuf>,
    /// Parallel extraction workers
    pub extract_workers: usize,
    /// Capacity of the bounded channels between pipeline stages
    pub channel_capacity: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            thumbnail_max_dim: THUMBNAIL_SIZE,
            thumbnail_cache_capacity: MAX_REQUEST,
            hash_algorithm: HashAlgorithm::Sha1,
            hash_buffer_bytes: DEFAULT_HASH_BUFFER,
            database_path: None,
            extract_workers: default_workers(),
            channel_capacity: 256,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, 4)
}

impl CatalogConfig {
    /// Parse and validate a TOML document
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: CatalogConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config from {}", path.display());
        Self::from_toml(&text)
    }

    /// Load the user's config file if there is one, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// ~/.config/astro-catalog/config.toml on Linux
    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("astro-catalog");
        path.push("config.toml");
        Some(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.thumbnail_max_dim == 0 {
            return invalid("thumbnail_max_dim must be positive");
        }
        if self.thumbnail_cache_capacity == 0 {
            return invalid("thumbnail_cache_capacity must be positive");
        }
        if self.hash_buffer_bytes == 0 {
            return invalid("hash_buffer_bytes must be positive");
        }
        if self.extract_workers == 0 {
            return invalid("extract_workers must be positive");
        }
        if self.channel_capacity == 0 {
            return invalid("channel_capacity must be positive");
        }
        if self.extensions.iter().all(|e| e.trim().trim_start_matches('.').is_empty()) {
            return invalid("extensions must list at least one extension");
        }
        Ok(())
    }
}
