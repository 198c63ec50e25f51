//! Minimal Mapbox Vector Tile decoder.
//!
//! Handles the gzip wrapper, the layer/feature/value messages and the
//! point/line/polygon command stream. Decoding is fail-soft: a malformed
//! feature or layer is dropped and the rest of the tile is kept.

use std::borrow::Cow;
use std::io::Read;

use flate2::read::GzDecoder;
use geo_types::Coord;
use geozero::mvt::{tile, Message};
use prost::encoding::{decode_key, decode_varint, skip_field, DecodeContext, WireType};
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::geometry::{GeometryFeature, GeometryKind};
use crate::tile_math::{tile_to_lng_lat, TileKey};

/// Hard ceiling for an inflated tile.
pub const GZIP_CEILING: usize = 20 * 1024 * 1024;

pub const DEFAULT_EXTENT: u32 = 4096;

const CMD_MOVE_TO: u32 = 1;
const CMD_LINE_TO: u32 = 2;
const CMD_CLOSE_PATH: u32 = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLayer {
    pub name: String,
    pub extent: u32,
    pub features: Vec<GeometryFeature>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTile {
    pub tile: TileKey,
    pub layers: Vec<DecodedLayer>,
}

impl DecodedTile {
    pub fn into_features(self) -> Vec<GeometryFeature> {
        self.layers.into_iter().flat_map(|layer| layer.features).collect()
    }
}

// Function to detect if data is gzipped (checking for gzip magic number)
pub fn is_gzipped(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1F && data[1] == 0x8B
}

/// Inflate gzip data, or pass plain data through untouched.
///
/// Returns `None` when the stream is corrupt or inflates past
/// [`GZIP_CEILING`].
pub fn decompress(data: &[u8]) -> Option<Cow<'_, [u8]>> {
    if !is_gzipped(data) {
        return Some(Cow::Borrowed(data));
    }
    inflate_bounded(data, GZIP_CEILING).map(Cow::Owned)
}

// Grows the output guess by doubling until the stream ends or the ceiling is hit
pub(crate) fn inflate_bounded(data: &[u8], ceiling: usize) -> Option<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut guess = data.len().saturating_mul(4).clamp(1024.min(ceiling), ceiling);
    let mut out = Vec::with_capacity(guess);

    loop {
        let remaining = (guess - out.len()) as u64;
        if let Err(e) = (&mut decoder).take(remaining).read_to_end(&mut out) {
            debug!("Failed to decompress gzipped tile: {}", e);
            return None;
        }
        if out.len() < guess {
            return Some(out);
        }
        if guess >= ceiling {
            let mut probe = [0u8; 1];
            return match decoder.read(&mut probe) {
                Ok(0) => Some(out),
                Ok(_) => {
                    debug!("Gzipped tile exceeds {} byte ceiling", ceiling);
                    None
                }
                Err(e) => {
                    debug!("Failed to decompress gzipped tile: {}", e);
                    None
                }
            };
        }
        guess = guess.saturating_mul(2).min(ceiling);
        out.reserve(guess - out.len());
    }
}

// Tile and Layer are walked field by field so one bad feature or layer
// does not take its siblings down; Feature and Value are decoded whole.

// Next field key, or None at the end of the message or on a bad key
fn next_field(buf: &mut &[u8]) -> Option<(u32, WireType)> {
    if buf.is_empty() {
        return None;
    }
    decode_key(buf).ok()
}

fn length_delimited<'a>(buf: &mut &'a [u8]) -> Option<&'a [u8]> {
    let len = usize::try_from(decode_varint(buf).ok()?).ok()?;
    if len > buf.len() {
        return None;
    }
    let whole: &'a [u8] = *buf;
    let (field, rest) = whole.split_at(len);
    *buf = rest;
    Some(field)
}

fn skip(buf: &mut &[u8], field: u32, wire: WireType) -> Option<()> {
    skip_field(wire, field, buf, DecodeContext::default()).ok()
}

fn zigzag(n: u32) -> i64 {
    i64::from(n >> 1) ^ -i64::from(n & 1)
}

/// Decode one tile payload (gzipped or plain protobuf).
///
/// `None` only when the payload cannot be inflated; a damaged message
/// stream yields whatever layers were readable.
pub fn decode_tile(data: &[u8], key: TileKey) -> Option<DecodedTile> {
    let payload = decompress(data)?;
    let mut buf: &[u8] = &payload;
    let mut layers = Vec::new();

    while !buf.is_empty() {
        let Some((field, wire)) = next_field(&mut buf) else {
            debug!("Truncated tag in tile {}/{}/{}", key.z, key.x, key.y);
            break;
        };
        if field == 3 && wire == WireType::LengthDelimited {
            let Some(bytes) = length_delimited(&mut buf) else {
                debug!("Truncated layer in tile {}/{}/{}", key.z, key.x, key.y);
                break;
            };
            match decode_layer(bytes, key) {
                Some(layer) => layers.push(layer),
                None => debug!("Skipping malformed layer in tile {}/{}/{}", key.z, key.x, key.y),
            }
        } else if skip(&mut buf, field, wire).is_none() {
            break;
        }
    }

    Some(DecodedTile { tile: key, layers })
}

fn decode_layer(bytes: &[u8], key: TileKey) -> Option<DecodedLayer> {
    let mut buf = bytes;
    let mut name = String::new();
    let mut extent = DEFAULT_EXTENT;
    let mut raw_features = Vec::new();
    let mut keys = Vec::new();
    let mut values = Vec::new();

    // Keys, values and extent may follow the features, so collect first
    while !buf.is_empty() {
        let (field, wire) = next_field(&mut buf)?;
        match (field, wire) {
            (1, WireType::LengthDelimited) => {
                name = String::from_utf8_lossy(length_delimited(&mut buf)?).into_owned()
            }
            (2, WireType::LengthDelimited) => raw_features.push(length_delimited(&mut buf)?),
            (3, WireType::LengthDelimited) => {
                keys.push(String::from_utf8_lossy(length_delimited(&mut buf)?).into_owned())
            }
            (4, WireType::LengthDelimited) => {
                values.push(property_value(length_delimited(&mut buf)?))
            }
            (5, WireType::Varint) => extent = decode_varint(&mut buf).ok()? as u32,
            _ => skip(&mut buf, field, wire)?,
        }
    }

    let mut features = Vec::new();
    for (index, raw) in raw_features.into_iter().enumerate() {
        let feature = match tile::Feature::decode(raw) {
            Ok(feature) => feature,
            Err(e) => {
                debug!("Skipping malformed feature {} in layer '{}': {}", index, name, e);
                continue;
            }
        };
        let feature_id = feature
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| format!("{}:{}", name, index));
        let properties = resolve_tags(&feature.tags, &keys, &values);
        features.extend(build_features(&feature, &name, &feature_id, &properties, extent, key));
    }

    Some(DecodedLayer {
        name,
        extent,
        features,
    })
}

// An undecodable value still occupies its index in the value table
fn property_value(bytes: &[u8]) -> Value {
    match tile::Value::decode(bytes) {
        Ok(tile::Value { string_value: Some(s), .. }) => Value::String(s),
        Ok(tile::Value { float_value: Some(f), .. }) => float_value(f64::from(f)),
        Ok(tile::Value { double_value: Some(d), .. }) => float_value(d),
        Ok(tile::Value { int_value: Some(i), .. }) => Value::Number(Number::from(i)),
        Ok(tile::Value { uint_value: Some(u), .. }) => Value::Number(Number::from(u)),
        Ok(tile::Value { sint_value: Some(i), .. }) => Value::Number(Number::from(i)),
        Ok(tile::Value { bool_value: Some(b), .. }) => Value::Bool(b),
        _ => Value::Null,
    }
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn resolve_tags(tags: &[u32], keys: &[String], values: &[Value]) -> Map<String, Value> {
    let mut properties = Map::new();
    for pair in tags.chunks_exact(2) {
        let (key, value) = (keys.get(pair[0] as usize), values.get(pair[1] as usize));
        if let (Some(key), Some(value)) = (key, value) {
            properties.insert(key.clone(), value.clone());
        }
    }
    properties
}

/// Run the command stream and return rings in tile-local integer space.
///
/// MoveTo starts a new ring, LineTo extends it, ClosePath ends it without
/// repeating the first vertex.
pub fn decode_commands(commands: &[u32]) -> Vec<Vec<(i64, i64)>> {
    let mut rings = Vec::new();
    let mut current: Vec<(i64, i64)> = Vec::new();
    let mut cursor = (0i64, 0i64);
    let mut i = 0;

    while i < commands.len() {
        let cmd_id = commands[i] & 0x7;
        let cmd_count = (commands[i] >> 3) as usize;
        i += 1;

        match cmd_id {
            CMD_MOVE_TO | CMD_LINE_TO => {
                for _ in 0..cmd_count {
                    if i + 1 >= commands.len() {
                        i = commands.len();
                        break;
                    }
                    cursor.0 += zigzag(commands[i]);
                    cursor.1 += zigzag(commands[i + 1]);
                    i += 2;

                    if cmd_id == CMD_MOVE_TO && !current.is_empty() {
                        rings.push(std::mem::take(&mut current));
                    }
                    current.push(cursor);
                }
            }
            CMD_CLOSE_PATH => {
                if !current.is_empty() {
                    rings.push(std::mem::take(&mut current));
                }
            }
            _ => {
                // Unknown command, skip its parameters
                i += 2 * cmd_count;
            }
        }
    }

    if !current.is_empty() {
        rings.push(current);
    }
    rings
}

fn build_features(
    feature: &tile::Feature,
    layer: &str,
    feature_id: &str,
    properties: &Map<String, Value>,
    extent: u32,
    key: TileKey,
) -> Vec<GeometryFeature> {
    let kind = match feature.r#type() {
        tile::GeomType::Point => GeometryKind::Point,
        tile::GeomType::Linestring => GeometryKind::Line,
        tile::GeomType::Polygon => GeometryKind::Polygon,
        tile::GeomType::Unknown => {
            debug!("Skipping feature {} with unknown geometry type", feature_id);
            return Vec::new();
        }
    };

    let project = |&(px, py): &(i64, i64)| {
        let (x, y) = tile_to_lng_lat(px as f64, py as f64, extent, key);
        Coord { x, y }
    };

    let rings = decode_commands(&feature.geometry);
    match kind {
        GeometryKind::Point => rings
            .iter()
            .flatten()
            .map(|p| {
                GeometryFeature::new(kind, vec![project(p)], layer, feature_id, properties.clone())
            })
            .collect(),
        _ => rings
            .iter()
            .map(|ring| {
                let vertices = ring.iter().map(project).collect();
                GeometryFeature::new(kind, vertices, layer, feature_id, properties.clone())
            })
            .collect(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use geozero::mvt::tile::GeomType;
    use std::io::Write;

    pub(crate) fn put_varint(mut value: u64, out: &mut Vec<u8>) {
        while value >= 0x80 {
            out.push((value as u8 & 0x7F) | 0x80);
            value >>= 7;
        }
        out.push(value as u8);
    }

    pub(crate) fn put_len(field: u32, bytes: &[u8], out: &mut Vec<u8>) {
        put_varint(u64::from(field << 3 | WireType::LengthDelimited as u32), out);
        put_varint(bytes.len() as u64, out);
        out.extend_from_slice(bytes);
    }

    pub(crate) fn put_uint(field: u32, value: u64, out: &mut Vec<u8>) {
        put_varint(u64::from(field << 3), out);
        put_varint(value, out);
    }

    fn zz(n: i64) -> u32 {
        ((n << 1) ^ (n >> 63)) as u32
    }

    pub(crate) fn feature(geom_type: GeomType, commands: &[u32], tags: &[u32]) -> Vec<u8> {
        tile::Feature {
            id: None,
            tags: tags.to_vec(),
            r#type: Some(geom_type as i32),
            geometry: commands.to_vec(),
        }
        .encode_to_vec()
    }

    pub(crate) fn layer(name: &str, features: &[Vec<u8>], extra: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        put_len(1, name.as_bytes(), &mut out);
        for f in features {
            put_len(2, f, &mut out);
        }
        out.extend_from_slice(extra);
        put_uint(5, 4096, &mut out);
        out
    }

    pub(crate) fn encode_tile(layers: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        for l in layers {
            put_len(3, l, &mut out);
        }
        out
    }

    pub(crate) fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    pub(crate) fn line_commands() -> Vec<u32> {
        // MoveTo(0,0) LineTo(+10,+10)
        vec![(1 << 3) | CMD_MOVE_TO, zz(0), zz(0), (1 << 3) | CMD_LINE_TO, zz(10), zz(10)]
    }

    #[test]
    fn decodes_single_line_feature() {
        let key = TileKey::new(1, 2, 3);
        let line = feature(GeomType::Linestring, &line_commands(), &[]);
        let data = encode_tile(&[layer("airspace", &[line], &[])]);

        let decoded = decode_tile(&data, key).expect("tile decodes");
        assert_eq!(decoded.layers.len(), 1);
        assert_eq!(decoded.layers[0].name, "airspace");
        assert_eq!(decoded.layers[0].extent, 4096);

        let features = decoded.into_features();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].kind, GeometryKind::Line);
        assert_eq!(features[0].category, "airspace");

        let coords: Vec<_> = features[0].vertices.coords().copied().collect();
        assert_eq!(coords.len(), 2);
        let (x0, y0) = tile_to_lng_lat(0.0, 0.0, 4096, key);
        let (x1, y1) = tile_to_lng_lat(10.0, 10.0, 4096, key);
        assert!((coords[0].x - x0).abs() < 1e-12 && (coords[0].y - y0).abs() < 1e-12);
        assert!((coords[1].x - x1).abs() < 1e-12 && (coords[1].y - y1).abs() < 1e-12);
        assert!((x0 - (-135.0)).abs() < 1e-12);
    }

    #[test]
    fn gzipped_tile_matches_plain_tile() {
        let key = TileKey::new(0, 0, 0);
        let line = feature(GeomType::Linestring, &line_commands(), &[]);
        let plain = encode_tile(&[layer("airspace", &[line], &[])]);
        assert_eq!(decode_tile(&gzip(&plain), key), decode_tile(&plain, key));
    }

    #[test]
    fn inflate_fails_past_ceiling() {
        let zeros = vec![0u8; 64 * 1024];
        let compressed = gzip(&zeros);
        assert_eq!(inflate_bounded(&compressed, 64 * 1024).map(|v| v.len()), Some(64 * 1024));
        assert!(inflate_bounded(&compressed, 16 * 1024).is_none());
    }

    #[test]
    fn truncated_feature_keeps_siblings() {
        let mut broken = Vec::new();
        put_uint(3, 2, &mut broken);
        // packed geometry whose last varint never terminates
        put_len(4, &[0x09, 0x80], &mut broken);

        let good = feature(GeomType::Linestring, &line_commands(), &[]);
        let data = encode_tile(&[layer("airspace", &[broken, good], &[])]);
        let features = decode_tile(&data, TileKey::new(0, 0, 0)).unwrap().into_features();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].feature_id, "airspace:1");
    }

    #[test]
    fn unknown_fields_are_skipped_and_tags_resolved() {
        let mut extra = Vec::new();
        put_len(3, b"name", &mut extra);
        let mut value = Vec::new();
        put_len(1, b"TOKYO TCA", &mut value);
        put_len(4, &value, &mut extra);
        put_uint(15, 2, &mut extra);
        // fixed32 field nobody knows about
        put_varint(u64::from(99u32 << 3 | WireType::ThirtyTwoBit as u32), &mut extra);
        extra.extend_from_slice(&[1, 2, 3, 4]);

        let polygon = feature(GeomType::Polygon, &line_commands(), &[0, 0]);
        let data = encode_tile(&[layer("airspace", &[polygon], &extra)]);
        let features = decode_tile(&data, TileKey::new(0, 0, 0)).unwrap().into_features();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].kind, GeometryKind::Polygon);
        assert_eq!(features[0].name(), Some("TOKYO TCA"));
    }

    #[test]
    fn close_path_and_move_to_split_rings() {
        let commands = vec![
            (1 << 3) | CMD_MOVE_TO, zz(0), zz(0),
            (2 << 3) | CMD_LINE_TO, zz(5), zz(0), zz(0), zz(5),
            CMD_CLOSE_PATH | (1 << 3),
            (1 << 3) | CMD_MOVE_TO, zz(10), zz(10),
            (1 << 3) | CMD_LINE_TO, zz(1), zz(1),
        ];
        let rings = decode_commands(&commands);
        assert_eq!(rings, vec![vec![(0, 0), (5, 0), (5, 5)], vec![(15, 15), (16, 16)]]);
    }

    #[test]
    fn layer_without_features_is_empty_not_error() {
        let data = encode_tile(&[layer("empty", &[], &[])]);
        let decoded = decode_tile(&data, TileKey::new(0, 0, 0)).unwrap();
        assert_eq!(decoded.layers.len(), 1);
        assert!(decoded.layers[0].features.is_empty());
    }

    #[test]
    fn multipoint_yields_one_point_per_vertex() {
        let commands = vec![(2 << 3) | CMD_MOVE_TO, zz(1), zz(1), zz(2), zz(2)];
        let data = encode_tile(&[layer("pts", &[feature(GeomType::Point, &commands, &[])], &[])]);
        let features = decode_tile(&data, TileKey::new(0, 0, 0)).unwrap().into_features();
        assert_eq!(features.len(), 2);
        assert!(features.iter().all(|f| f.kind == GeometryKind::Point && f.vertices.0.len() == 1));
    }
}
