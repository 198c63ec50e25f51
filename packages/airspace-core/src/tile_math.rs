// Slippy-map tile conversions (spherical Web Mercator).
use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;

/// Latitude limit of the square Web Mercator world.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

// Key for one tile in the power-of-two grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileKey {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileKey {
    pub const fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// MBTiles row for this tile (TMS numbering counts rows from the south).
    pub fn flipped_row(&self) -> u32 {
        (tile_count(self.z) - 1).saturating_sub(self.y)
    }
}

fn tile_count(z: u8) -> u32 {
    1u32 << u32::from(z.min(31))
}

// Convert longitude to tile X coordinate
pub fn lng_to_tile_x(lng: f64, zoom: u8) -> u32 {
    let n = f64::from(tile_count(zoom));
    let x = ((lng + 180.0) / 360.0 * n).floor();
    clamp_index(x, zoom)
}

// Convert latitude to tile Y coordinate
pub fn lat_to_tile_y(lat: f64, zoom: u8) -> u32 {
    let lat_rad = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let n = f64::from(tile_count(zoom));
    let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n).floor();
    clamp_index(y, zoom)
}

fn clamp_index(value: f64, zoom: u8) -> u32 {
    let max = f64::from(tile_count(zoom) - 1);
    value.clamp(0.0, max) as u32
}

/// Project a tile-local point to `(lon, lat)`.
///
/// `px`/`py` are in the layer's local space of `extent` units per tile side;
/// they may fall outside `[0, extent]` for geometry in the tile buffer.
pub fn tile_to_lng_lat(px: f64, py: f64, extent: u32, tile: TileKey) -> (f64, f64) {
    let n = f64::from(tile_count(tile.z));
    let extent = f64::from(extent.max(1));

    let normalized_x = (f64::from(tile.x) + px / extent) / n;
    let normalized_y = (f64::from(tile.y) + py / extent) / n;

    let lng = normalized_x * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * normalized_y)).sinh().atan() * 180.0 / PI;
    (lng, lat)
}

/// Inclusive x/y range of tiles covering a bounding box at one zoom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub zoom: u8,
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
}

impl TileRange {
    pub fn covering(bbox: &BoundingBox, zoom: u8) -> Self {
        // y grows southwards, so the north edge gives the smallest row
        Self {
            zoom,
            min_x: lng_to_tile_x(bbox.min_lon, zoom),
            max_x: lng_to_tile_x(bbox.max_lon, zoom),
            min_y: lat_to_tile_y(bbox.max_lat, zoom),
            max_y: lat_to_tile_y(bbox.min_lat, zoom),
        }
    }

    pub fn count(&self) -> usize {
        let columns = (self.max_x + 1).saturating_sub(self.min_x) as usize;
        let rows = (self.max_y + 1).saturating_sub(self.min_y) as usize;
        columns * rows
    }

    /// Tiles in x-major order (every row of one column before the next column).
    pub fn tiles(&self) -> impl Iterator<Item = TileKey> + '_ {
        (self.min_x..=self.max_x)
            .flat_map(move |x| {
                (self.min_y..=self.max_y).map(move |y| TileKey::new(x, y, self.zoom))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_origin_projects_to_world_corner() {
        let (lng, lat) = tile_to_lng_lat(0.0, 0.0, 4096, TileKey::new(0, 0, 0));
        assert!((lng + 180.0).abs() < 1e-9);
        assert!((lat - MAX_LATITUDE).abs() < 1e-9);
    }

    #[test]
    fn projected_point_maps_back_to_its_tile() {
        for &(x, y, z) in &[(0, 0, 0), (3, 5, 4), (14552, 6451, 14), (907, 403, 10)] {
            let tile = TileKey::new(x, y, z);
            for &(px, py) in &[(1.0, 1.0), (2048.0, 2048.0), (4095.0, 4095.0), (100.0, 3900.0)] {
                let (lng, lat) = tile_to_lng_lat(px, py, 4096, tile);
                assert_eq!(lng_to_tile_x(lng, z), x, "x for {tile:?} at ({px}, {py})");
                assert_eq!(lat_to_tile_y(lat, z), y, "y for {tile:?} at ({px}, {py})");
            }
        }
    }

    #[test]
    fn flipped_row_counts_from_south() {
        assert_eq!(TileKey::new(0, 0, 0).flipped_row(), 0);
        assert_eq!(TileKey::new(1, 0, 2).flipped_row(), 3);
        assert_eq!(TileKey::new(1, 3, 2).flipped_row(), 0);
    }

    #[test]
    fn range_is_clamped_and_ordered() {
        let world = BoundingBox::new(-180.0, -90.0, 180.0, 90.0);
        let range = TileRange::covering(&world, 2);
        assert_eq!((range.min_x, range.max_x, range.min_y, range.max_y), (0, 3, 0, 3));
        assert_eq!(range.count(), 16);

        let tiles: Vec<_> = TileRange::covering(&BoundingBox::new(-179.0, 1.0, 1.0, 80.0), 1)
            .tiles()
            .collect();
        assert_eq!(tiles, vec![TileKey::new(0, 0, 1), TileKey::new(1, 0, 1)]);
    }
}
