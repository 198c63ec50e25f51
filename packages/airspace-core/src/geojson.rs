use geo_types::Coord;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::geometry::{GeometryFeature, GeometryKind};

// GeoJSON-like feature collection; only `features` is required
#[derive(Deserialize)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

#[derive(Deserialize)]
pub struct Feature {
    pub id: Option<Value>,
    pub geometry: Option<FeatureGeometry>,
    pub properties: Option<Map<String, Value>>,
}

// Geometry part of a feature
#[derive(Deserialize)]
pub struct FeatureGeometry {
    pub r#type: String,
    #[serde(default)]
    pub coordinates: Value,
}

/// Features parsed from one collection plus the number that had to be dropped.
#[derive(Debug, Default)]
pub struct ParsedCollection {
    pub features: Vec<GeometryFeature>,
    pub skipped: usize,
}

/// Parse a FeatureCollection into geometry features of one category.
///
/// Fails only when the document is not a FeatureCollection. Features with
/// unsupported or unreadable geometry are counted in `skipped`.
pub fn parse_feature_collection(
    bytes: &[u8],
    category: &str,
) -> Result<ParsedCollection, serde_json::Error> {
    let collection: FeatureCollection = serde_json::from_slice(bytes)?;
    let mut parsed = ParsedCollection::default();

    for (index, feature) in collection.features.into_iter().enumerate() {
        let feature_id = match &feature.id {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => index.to_string(),
        };
        match convert_feature(feature, category, &feature_id) {
            Some(geometry) => parsed.features.push(geometry),
            None => parsed.skipped += 1,
        }
    }

    Ok(parsed)
}

fn convert_feature(feature: Feature, category: &str, feature_id: &str) -> Option<GeometryFeature> {
    let Some(geometry) = feature.geometry else {
        debug!("Feature {} in '{}' has no geometry", feature_id, category);
        return None;
    };

    let (kind, vertices) = match geometry.r#type.as_str() {
        "LineString" => (GeometryKind::Line, positions(geometry.coordinates)?),
        // Only the outer ring is kept; holes are ignored
        "Polygon" => {
            let rings: Vec<Value> = serde_json::from_value(geometry.coordinates).ok()?;
            let outer = rings.into_iter().next()?;
            (GeometryKind::Polygon, positions(outer)?)
        }
        "Point" => {
            let position: Vec<f64> = serde_json::from_value(geometry.coordinates).ok()?;
            (GeometryKind::Point, vec![to_coord(&position)?])
        }
        other => {
            debug!(
                "Unhandled geometry type {} for feature {} in '{}'",
                other, feature_id, category
            );
            return None;
        }
    };

    Some(GeometryFeature::new(
        kind,
        vertices,
        category,
        feature_id,
        feature.properties.unwrap_or_default(),
    ))
}

fn positions(coordinates: Value) -> Option<Vec<Coord<f64>>> {
    let raw: Vec<Vec<f64>> = serde_json::from_value(coordinates).ok()?;
    raw.iter().map(|p| to_coord(p)).collect()
}

// Extra ordinates (altitude) are dropped
fn to_coord(position: &[f64]) -> Option<Coord<f64>> {
    match position {
        [x, y, ..] => Some(Coord { x: *x, y: *y }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "id": "ctr-1",
             "geometry": {"type": "Polygon", "coordinates": [
                 [[139.0, 35.0], [140.0, 35.0], [140.0, 36.0], [139.0, 35.0]],
                 [[139.2, 35.2], [139.3, 35.2], [139.3, 35.3]]
             ]},
             "properties": {"name": "TOKYO CTR", "type": 0}},
            {"type": "Feature",
             "geometry": {"type": "LineString",
                          "coordinates": [[139.0, 35.0, 120.0], [139.5, 35.5, 130.0]]},
             "properties": null},
            {"type": "Feature", "id": 7,
             "geometry": {"type": "Point", "coordinates": [139.7, 35.6]},
             "properties": {}},
            {"type": "Feature",
             "geometry": {"type": "MultiPolygon", "coordinates": []},
             "properties": {}}
        ]
    }"#;

    #[test]
    fn parses_supported_geometry_and_skips_the_rest() {
        let parsed = parse_feature_collection(SAMPLE.as_bytes(), "ctr").unwrap();
        assert_eq!(parsed.features.len(), 3);
        assert_eq!(parsed.skipped, 1);

        let polygon = &parsed.features[0];
        assert_eq!(polygon.kind, GeometryKind::Polygon);
        assert_eq!(polygon.feature_id, "ctr-1");
        assert_eq!(polygon.vertices.0.len(), 4, "holes are dropped");
        assert_eq!(polygon.name(), Some("TOKYO CTR"));

        let line = &parsed.features[1];
        assert_eq!(line.kind, GeometryKind::Line);
        assert_eq!(line.feature_id, "1");
        assert_eq!(line.vertices.0[1], Coord { x: 139.5, y: 35.5 });

        let point = &parsed.features[2];
        assert_eq!(point.kind, GeometryKind::Point);
        assert_eq!(point.feature_id, "7");
        assert_eq!(point.category, "ctr");
    }

    #[test]
    fn rejects_documents_without_features() {
        assert!(parse_feature_collection(br#"{"type": "Feature"}"#, "x").is_err());
        assert!(parse_feature_collection(b"\x1f\x8b\x08", "x").is_err());
    }
}
