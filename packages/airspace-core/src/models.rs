// This is the models module containing shared reporting structures
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: usize,
    pub misses: usize,
    pub evictions: usize,
    pub total_requests: usize,
    pub hit_rate: f64,
}

/// Summary of one catalog load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub generation: u64,
    pub files_loaded: usize,
    pub files_skipped: usize,
    pub features_loaded: usize,
    pub features_skipped: usize,
    pub slim_records: usize,
    pub tile_sources_opened: usize,
    pub tile_sources_unavailable: usize,
}
