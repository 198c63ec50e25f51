//! Airspace catalog: every loaded feature, its slim record, a spatial index
//! over the slim records and the open basemap tile stores.
//!
//! A `Catalog` is immutable once built. Reloading builds a new one and
//! publishes it through `CatalogHandle`, so readers hold either the previous
//! complete catalog or the next one.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::RwLock;
use rayon::prelude::*;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::altitude::format_limit;
use crate::classify::{
    classify_sub_category, group_for_category, group_for_sub_category, icon_for_group,
};
use crate::config::CatalogConfig;
use crate::error::CatalogError;
use crate::geojson::{parse_feature_collection, ParsedCollection};
use crate::geometry::{AirspaceSlim, BoundingBox, GeometryFeature};
use crate::models::LoadReport;
use crate::query::EnabledCategories;
use crate::rtree::RTree;
use crate::tile_store::TileStore;

#[derive(Debug)]
pub struct Catalog {
    generation: u64,
    features: Vec<GeometryFeature>,
    slims: Vec<AirspaceSlim>,
    // slims[i] was derived from features[slim_features[i]]
    slim_features: Vec<usize>,
    index: RTree<usize>,
    groups: BTreeMap<String, String>,
    tile_stores: Vec<TileStore>,
    report: LoadReport,
}

// One data file after parsing, before it is merged into the catalog
struct SourceFile {
    source: String,
    parsed: ParsedCollection,
}

impl Catalog {
    /// Catalog with nothing loaded (generation 0).
    pub fn empty() -> Self {
        Self {
            generation: 0,
            features: Vec::new(),
            slims: Vec::new(),
            slim_features: Vec::new(),
            index: RTree::new(),
            groups: BTreeMap::new(),
            tile_stores: Vec::new(),
            report: LoadReport::default(),
        }
    }

    /// Build a catalog from the configured data directory and tile sources.
    ///
    /// Never fails: unreadable files and unusable tile sources are logged and
    /// left out.
    pub fn load(config: &CatalogConfig, generation: u64) -> Self {
        let mut report = LoadReport {
            generation,
            ..LoadReport::default()
        };

        let files = match source_files(&config.data_dir) {
            Ok(files) => files,
            Err(e) => {
                warn!("{}", e);
                Vec::new()
            }
        };
        debug!("Found {} data files in {}", files.len(), config.data_dir.display());

        let results: Vec<Result<SourceFile, CatalogError>> =
            files.par_iter().map(|path| read_source(path)).collect();

        let mut catalog = Catalog {
            generation,
            index: RTree::with_max_entries(config.max_entries),
            ..Catalog::empty()
        };

        for result in results {
            let file = match result {
                Ok(file) => file,
                Err(e) => {
                    warn!("Skipping data file: {}", e);
                    report.files_skipped += 1;
                    continue;
                }
            };
            report.files_loaded += 1;
            report.features_loaded += file.parsed.features.len();
            report.features_skipped += file.parsed.skipped;

            let multi_category = file.source.eq_ignore_ascii_case(&config.multi_category_source);
            for feature in file.parsed.features {
                catalog.add_feature(&file.source, multi_category, feature);
            }
        }

        for source in &config.tile_sources {
            match TileStore::open(source) {
                Some(store) => catalog.tile_stores.push(store),
                None => report.tile_sources_unavailable += 1,
            }
        }
        report.tile_sources_opened = catalog.tile_stores.len();
        report.slim_records = catalog.slims.len();

        info!(
            "Catalog generation {}: {} features in {} categories, {} slim records, \
             {} files skipped",
            generation,
            report.features_loaded,
            catalog.groups.len(),
            report.slim_records,
            report.files_skipped
        );

        catalog.report = report;
        catalog
    }

    fn add_feature(&mut self, source: &str, multi_category: bool, mut feature: GeometryFeature) {
        let group = if multi_category {
            let type_code = feature.properties.get("type").and_then(Value::as_i64);
            let name = feature.name().unwrap_or_default();
            let sub_category = classify_sub_category(name, type_code);
            feature.category = sub_category.to_string();
            group_for_sub_category(sub_category).to_string()
        } else {
            group_for_category(&feature.category)
        };
        self.groups.entry(feature.category.clone()).or_insert_with(|| group.clone());

        if let Some(slim) = slim_record(&feature, source, &group) {
            let slim_index = self.slims.len();
            self.index.insert(slim.bbox, slim_index);
            self.slims.push(slim);
            self.slim_features.push(self.features.len());
        }
        self.features.push(feature);
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn features(&self) -> &[GeometryFeature] {
        &self.features
    }

    pub fn slims(&self) -> &[AirspaceSlim] {
        &self.slims
    }

    pub fn tile_stores(&self) -> &[TileStore] {
        &self.tile_stores
    }

    /// Loaded categories in sorted order.
    pub fn categories(&self) -> Vec<&str> {
        self.groups.keys().map(String::as_str).collect()
    }

    pub fn group_of(&self, category: &str) -> Option<&str> {
        self.groups.get(category).map(String::as_str)
    }

    /// Categories keyed by their group.
    pub fn groups(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (category, group) in &self.groups {
            groups.entry(group.as_str()).or_default().push(category.as_str());
        }
        groups
    }

    /// Slim records whose bbox intersects `bbox`, via the spatial index.
    pub fn slims_in(&self, bbox: &BoundingBox) -> Vec<&AirspaceSlim> {
        let mut hits: Vec<usize> = self.index.search(bbox).into_iter().copied().collect();
        hits.sort_unstable();
        hits.into_iter().map(|i| &self.slims[i]).collect()
    }

    pub fn slims_at(&self, lon: f64, lat: f64) -> Vec<&AirspaceSlim> {
        self.slims_in(&BoundingBox::from_point(lon, lat))
    }

    /// Geometry to draw for a viewport: catalog features of enabled
    /// categories intersecting it, followed by basemap overlays of enabled
    /// tile sources.
    pub fn features_in_viewport(
        &self,
        viewport: &BoundingBox,
        enabled: &EnabledCategories,
    ) -> Vec<GeometryFeature> {
        let mut hits: Vec<usize> = self
            .index
            .search(viewport)
            .into_iter()
            .map(|&slim| self.slim_features[slim])
            .collect();
        hits.sort_unstable();

        let mut out: Vec<GeometryFeature> = hits
            .into_iter()
            .map(|i| &self.features[i])
            .filter(|feature| enabled.allows(&feature.category))
            .cloned()
            .collect();

        for store in self.tile_stores.iter().filter(|store| enabled.allows(store.category())) {
            out.extend(store.overlays_in_viewport(viewport));
        }
        out
    }

    #[cfg(test)]
    pub(crate) fn from_slims(generation: u64, slims: Vec<AirspaceSlim>) -> Self {
        let mut catalog = Catalog {
            generation,
            ..Catalog::empty()
        };
        for slim in slims {
            catalog.index.insert(slim.bbox, catalog.slims.len());
            catalog.slims.push(slim);
        }
        catalog
    }
}

/// Slim record for a feature, `None` when the feature has no vertices.
pub fn slim_record(feature: &GeometryFeature, source: &str, group: &str) -> Option<AirspaceSlim> {
    let bbox = feature.bbox()?;
    let key = format!("{}/{}", source, feature.feature_id);
    let active = feature.properties.get("active").and_then(Value::as_bool);

    Some(AirspaceSlim {
        id: Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string(),
        name: feature.name().unwrap_or(&feature.feature_id).to_string(),
        sub_category: feature.category.clone(),
        icon: icon_for_group(group).to_string(),
        upper_limit: limit(&feature.properties, "upperLimit"),
        lower_limit: limit(&feature.properties, "lowerLimit"),
        bbox,
        active,
    })
}

// {"value": 100, "unit": 6} -> "FL100"; absent limits stay empty
fn limit(properties: &Map<String, Value>, key: &str) -> String {
    let Some(limit) = properties.get(key).and_then(Value::as_object) else {
        return String::new();
    };
    let value = limit
        .get("value")
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64)));
    match value {
        Some(value) => format_limit(value, limit.get("unit").and_then(Value::as_i64).unwrap_or(0)),
        None => String::new(),
    }
}

fn source_files(dir: &Path) -> Result<Vec<PathBuf>, CatalogError> {
    let entries = fs::read_dir(dir).map_err(|source| CatalogError::DataDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("geojson") || ext.eq_ignore_ascii_case("json"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

fn read_source(path: &Path) -> Result<SourceFile, CatalogError> {
    let bytes = fs::read(path).map_err(|source| CatalogError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let source = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parsed = parse_feature_collection(&bytes, &source).map_err(|source| {
        CatalogError::InvalidGeoJson {
            path: path.to_path_buf(),
            source,
        }
    })?;
    debug!("Parsed {} features from {}", parsed.features.len(), path.display());
    Ok(SourceFile { source, parsed })
}

/// Shared, swappable reference to the current catalog.
#[derive(Debug)]
pub struct CatalogHandle {
    current: RwLock<Arc<Catalog>>,
    generations: AtomicU64,
}

impl Default for CatalogHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogHandle {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Catalog::empty())),
            generations: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> Arc<Catalog> {
        self.current.read().clone()
    }

    /// Load on the calling thread and publish the result.
    pub fn load_blocking(&self, config: &CatalogConfig) -> LoadReport {
        let generation = self.next_generation();
        let catalog = Catalog::load(config, generation);
        let report = catalog.report().clone();
        self.publish(catalog);
        report
    }

    /// Load on a background thread. The handle publishes the catalog itself;
    /// joining only yields the load report.
    pub fn spawn_load(
        self: &Arc<Self>,
        config: CatalogConfig,
    ) -> std::io::Result<JoinHandle<LoadReport>> {
        let handle = Arc::clone(self);
        thread::Builder::new()
            .name("catalog-load".to_string())
            .spawn(move || handle.load_blocking(&config))
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::SeqCst) + 1
    }

    // Older loads that finish late never replace a newer catalog
    fn publish(&self, catalog: Catalog) -> bool {
        let mut current = self.current.write();
        if catalog.generation <= current.generation {
            debug!(
                "Discarding catalog generation {} (current is {})",
                catalog.generation, current.generation
            );
            return false;
        }
        *current = Arc::new(catalog);
        true
    }
}
