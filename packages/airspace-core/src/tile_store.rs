//! Read-only MBTiles basemap with a bounded cache of decoded tiles.
//!
//! Tiles are addressed by slippy-map `(x, y, z)`; the database stores rows
//! in TMS order, so `y` is flipped on lookup. A tile blob is either a GeoJSON
//! FeatureCollection or a (gzipped) vector tile.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info, warn};

use crate::config::TileStoreConfig;
use crate::error::TileStoreError;
use crate::geojson::parse_feature_collection;
use crate::geometry::{BoundingBox, GeometryFeature};
use crate::models::CacheStats;
use crate::mvt_decoder::decode_tile;
use crate::tile_cache::LruCache;
use crate::tile_math::{TileKey, TileRange};

const FALLBACK_ZOOM: u8 = 10;

pub type TileFeatures = Arc<Vec<GeometryFeature>>;

pub struct TileStore {
    category: String,
    path: PathBuf,
    zoom: u8,
    // rusqlite connections are Send but not Sync
    conn: Mutex<Connection>,
    cache: Mutex<LruCache<TileKey, TileFeatures>>,
}

impl std::fmt::Debug for TileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileStore")
            .field("category", &self.category)
            .field("path", &self.path)
            .field("zoom", &self.zoom)
            .finish()
    }
}

impl TileStore {
    /// Open a tile source, or `None` if it is unusable.
    ///
    /// An unusable source is not an error for the caller: the basemap is
    /// simply absent.
    pub fn open(config: &TileStoreConfig) -> Option<TileStore> {
        match Self::try_open(config) {
            Ok(store) => {
                info!(
                    "Opened tile source '{}' at zoom {} ({})",
                    store.category,
                    store.zoom,
                    store.path.display()
                );
                Some(store)
            }
            Err(e) => {
                warn!("Tile source unavailable: {}", e);
                None
            }
        }
    }

    pub fn try_open(config: &TileStoreConfig) -> Result<TileStore, TileStoreError> {
        let open_err = |source| TileStoreError::Open {
            path: config.path.clone(),
            source,
        };
        let conn = Connection::open_with_flags(
            &config.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(open_err)?;

        // Fails on a missing table or a file that is not a database
        conn.prepare("SELECT zoom_level, tile_column, tile_row, tile_data FROM tiles LIMIT 1")
            .map_err(open_err)?;

        let zoom = config
            .zoom
            .or_else(|| metadata_max_zoom(&conn))
            .unwrap_or(FALLBACK_ZOOM);

        Ok(TileStore {
            category: config.category(),
            path: config.path.clone(),
            zoom,
            conn: Mutex::new(conn),
            cache: Mutex::new(LruCache::new(config.cache_limit)),
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Decoded geometry of every tile touching the viewport.
    pub fn overlays_in_viewport(&self, viewport: &BoundingBox) -> Vec<GeometryFeature> {
        let range = TileRange::covering(viewport, self.zoom);
        debug!(
            "Viewport covers {} tiles of '{}' at zoom {}",
            range.count(),
            self.category,
            self.zoom
        );

        let mut overlays = Vec::new();
        for key in range.tiles() {
            overlays.extend(self.tile(key).iter().cloned());
        }
        overlays
    }

    /// Decoded geometry for one tile; empty when the tile has no data.
    pub fn tile(&self, key: TileKey) -> TileFeatures {
        // Held across fetch and decode so a cold tile is read and counted once
        let mut cache = self.cache.lock();
        if let Some(hit) = cache.get(&key) {
            return Arc::clone(hit);
        }

        let blob = match self.fetch_blob(key) {
            Ok(Some(blob)) => blob,
            Ok(None) => return TileFeatures::default(),
            Err(e) => {
                debug!("Failed to read tile {}/{}/{}: {}", key.z, key.x, key.y, e);
                return TileFeatures::default();
            }
        };

        let Some(features) = decode_blob(&blob, key, &self.category) else {
            debug!("Tile {}/{}/{} has no decodable data", key.z, key.x, key.y);
            return TileFeatures::default();
        };

        let features = Arc::new(features);
        cache.insert(key, Arc::clone(&features));
        features
    }

    fn fetch_blob(&self, key: TileKey) -> Result<Option<Vec<u8>>, TileStoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT tile_data FROM tiles \
             WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
        )?;
        let blob = stmt
            .query_row(
                (i64::from(key.z), i64::from(key.x), i64::from(key.flipped_row())),
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(blob)
    }

    pub fn set_cache_limit(&self, limit: usize) {
        self.cache.lock().set_capacity(limit);
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }
}

fn metadata_max_zoom(conn: &Connection) -> Option<u8> {
    conn.query_row("SELECT value FROM metadata WHERE name = 'maxzoom'", [], |row| {
        row.get::<_, String>(0)
    })
    .ok()
    .and_then(|value| value.trim().parse().ok())
}

// JSON is tried first since it is cheap to reject; vector tiles are the fallback
fn decode_blob(blob: &[u8], key: TileKey, category: &str) -> Option<Vec<GeometryFeature>> {
    if let Ok(parsed) = parse_feature_collection(blob, category) {
        return Some(parsed.features);
    }
    decode_tile(blob, key).map(|tile| tile.into_features())
}
