//! Configuration for catalog loading, basemap tile sources and the
//! active-zone engine.
//!
//! Everything deserialises from JSON; omitted fields take the defaults below.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::rtree::DEFAULT_MAX_ENTRIES;
use crate::tile_cache::CACHE_SIZE_LIMIT;

/// Base name of the source file whose features are split by name pattern.
pub const DEFAULT_MULTI_CATEGORY_SOURCE: &str = "airspace";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub data_dir: PathBuf,
    #[serde(default = "default_multi_category_source")]
    pub multi_category_source: String,
    #[serde(default)]
    pub tile_sources: Vec<TileStoreConfig>,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileStoreConfig {
    pub path: PathBuf,
    /// Category given to decoded features; defaults to the file stem.
    #[serde(default)]
    pub name: Option<String>,
    /// Zoom used for viewport lookups; defaults to the `maxzoom` metadata.
    #[serde(default)]
    pub zoom: Option<u8>,
    #[serde(default = "default_cache_limit")]
    pub cache_limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub min_distance_m: f64,
    pub min_altitude_delta_m: f64,
    pub max_interval_s: f64,
    pub hud_limit: usize,
    pub tap_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            min_distance_m: 500.0,
            min_altitude_delta_m: 100.0,
            max_interval_s: 60.0,
            hud_limit: 3,
            tap_limit: 4,
        }
    }
}

fn default_multi_category_source() -> String {
    DEFAULT_MULTI_CATEGORY_SOURCE.to_string()
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

fn default_cache_limit() -> usize {
    CACHE_SIZE_LIMIT
}

impl CatalogConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            multi_category_source: default_multi_category_source(),
            tile_sources: Vec::new(),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }
}

impl TileStoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            name: None,
            zoom: None,
            cache_limit: CACHE_SIZE_LIMIT,
        }
    }

    pub fn category(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "basemap".to_string())
        })
    }
}
