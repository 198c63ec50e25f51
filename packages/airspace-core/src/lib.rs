//! Geospatial airspace core: loads airspace data and basemap tiles, indexes
//! them, and answers which airspaces apply at a position.
//!
//! The crate does no drawing and no I/O beyond reading its data sources;
//! callers receive plain geometry values and slim records.

// Create a console module for logging
pub mod console;
// Import our error types
pub mod error;
// Import our models
pub mod models;
// Import our configuration module
pub mod config;
// Import our geometry module
pub mod geometry;
// Import our tile math functions
pub mod tile_math;
// Import our vector tile decoding module
pub mod mvt_decoder;
// Import our tile cache
pub mod tile_cache;
// Import our MBTiles basemap module
pub mod tile_store;
// Import our spatial index module
pub mod rtree;
// Import our altitude parsing module
pub mod altitude;
// Import our classification module
pub mod classify;
// Import our geojson parsing module
pub mod geojson;
// Import our catalog module
pub mod catalog;
// Import our active zone query module
pub mod query;

pub use catalog::{Catalog, CatalogHandle};
pub use config::{CatalogConfig, QueryConfig, TileStoreConfig};
pub use error::{CatalogError, ConfigError, TileStoreError};
pub use geometry::{AirspaceSlim, BoundingBox, GeometryFeature, GeometryKind};
pub use models::{CacheStats, LoadReport};
pub use query::{filter_enabled, ActiveZoneEngine, EnabledCategories, Telemetry};
pub use rtree::RTree;
pub use tile_math::TileKey;
pub use tile_store::TileStore;
