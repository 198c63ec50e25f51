use geo::BoundingRect;
use geo_types::{Coord, LineString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Geographic bounding box in degrees, serialised as
/// `[minLon, minLat, maxLon, maxLat]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub const fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Degenerate zero-area box used for point queries.
    pub const fn from_point(lon: f64, lat: f64) -> Self {
        Self::new(lon, lat, lon, lat)
    }

    // Closed-interval overlap: boxes sharing an edge intersect
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(self.min_lon > other.max_lon
            || self.max_lon < other.min_lon
            || self.min_lat > other.max_lat
            || self.max_lat < other.min_lat)
    }

    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        self.min_lon <= lon && lon <= self.max_lon && self.min_lat <= lat && lat <= self.max_lat
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.min_lon.min(other.min_lon),
            self.min_lat.min(other.min_lat),
            self.max_lon.max(other.max_lon),
            self.max_lat.max(other.max_lat),
        )
    }

    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(b: [f64; 4]) -> Self {
        BoundingBox::new(b[0], b[1], b[2], b[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.min_lon, b.min_lat, b.max_lon, b.max_lat]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
}

/// A parsed feature ready for drawing.
///
/// Vertices are `(lon, lat)` coordinates (`x` = longitude). Polygons carry
/// only their outer ring. The renderer converts this value into its own
/// shape type; nothing here knows about drawing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryFeature {
    pub kind: GeometryKind,
    pub vertices: LineString<f64>,
    pub category: String,
    pub feature_id: String,
    pub properties: Map<String, Value>,
}

impl GeometryFeature {
    pub fn new(
        kind: GeometryKind,
        vertices: Vec<Coord<f64>>,
        category: impl Into<String>,
        feature_id: impl Into<String>,
        properties: Map<String, Value>,
    ) -> Self {
        Self {
            kind,
            vertices: LineString::new(vertices),
            category: category.into(),
            feature_id: feature_id.into(),
            properties,
        }
    }

    /// Extent of the vertices, `None` for an empty feature.
    ///
    /// Slim records take their bbox from here so both representations agree.
    pub fn bbox(&self) -> Option<BoundingBox> {
        self.vertices.bounding_rect().map(|rect| {
            BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.properties.get("name").and_then(Value::as_str)
    }
}

/// Reduced per-feature record used for active-zone queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirspaceSlim {
    pub id: String,
    pub name: String,
    pub sub_category: String,
    /// `"M"` for military, `"C"` for civil.
    pub icon: String,
    pub upper_limit: String,
    pub lower_limit: String,
    pub bbox: BoundingBox,
    /// `None` means no temporal restriction (always active).
    pub active: Option<bool>,
}

impl AirspaceSlim {
    pub fn is_military(&self) -> bool {
        self.icon.starts_with('M')
    }

    pub fn is_active(&self) -> bool {
        self.active.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touching_boxes_intersect() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(10.0, 0.0, 20.0, 10.0);
        let c = BoundingBox::new(10.5, 0.0, 20.0, 10.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.intersects(&BoundingBox::from_point(5.0, 10.0)));
    }

    #[test]
    fn feature_bbox_matches_vertices() {
        let feature = GeometryFeature::new(
            GeometryKind::Polygon,
            vec![
                Coord { x: 139.0, y: 35.0 },
                Coord { x: 140.5, y: 35.2 },
                Coord { x: 139.7, y: 36.1 },
            ],
            "ctr",
            "0",
            Map::new(),
        );
        assert_eq!(feature.bbox(), Some(BoundingBox::new(139.0, 35.0, 140.5, 36.1)));

        let empty = GeometryFeature::new(GeometryKind::Line, vec![], "ctr", "1", Map::new());
        assert_eq!(empty.bbox(), None);
    }

    #[test]
    fn bbox_serialises_as_array() {
        let json = serde_json::to_string(&BoundingBox::new(1.0, 2.0, 3.0, 4.0)).unwrap();
        assert_eq!(json, "[1.0,2.0,3.0,4.0]");
        let back: BoundingBox = serde_json::from_str(&json).unwrap();
        assert_eq!(back, BoundingBox::new(1.0, 2.0, 3.0, 4.0));
    }
}
