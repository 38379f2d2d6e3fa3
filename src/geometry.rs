use geo::{BooleanOps, Coord, LineString, MultiPolygon, Polygon};
use geojson::{Geometry as GeoJsonGeometry, PolygonType, Position, Value as GeoJsonValue};

use crate::error::GeometryError;

// Converts a member geometry into a geo multipolygon, validating positions
pub fn to_multi_polygon(
    geometry: Option<&GeoJsonGeometry>,
) -> Result<MultiPolygon<f64>, GeometryError> {
    let geometry = geometry.ok_or(GeometryError::MissingGeometry)?;

    match &geometry.value {
        GeoJsonValue::Polygon(rings) => Ok(MultiPolygon::new(vec![to_polygon(rings)?])),
        GeoJsonValue::MultiPolygon(polygons) => polygons
            .iter()
            .map(to_polygon)
            .collect::<Result<Vec<_>, _>>()
            .map(MultiPolygon::new),
        other => Err(GeometryError::UnsupportedType(type_name(other).to_string())),
    }
}

fn to_polygon(rings: &PolygonType) -> Result<Polygon<f64>, GeometryError> {
    let (exterior, holes) = rings.split_first().ok_or(GeometryError::EmptyPolygon)?;

    let exterior = to_ring(exterior)?;
    let holes = holes
        .iter()
        .map(|ring| to_ring(ring))
        .collect::<Result<Vec<_>, _>>()?;

    // Polygon::new closes open rings
    Ok(Polygon::new(exterior, holes))
}

fn to_ring(positions: &[Position]) -> Result<LineString<f64>, GeometryError> {
    if positions.len() < 3 {
        return Err(GeometryError::RingTooShort(positions.len()));
    }

    positions
        .iter()
        .map(|position| match position.as_slice() {
            [x, y, ..] if x.is_finite() && y.is_finite() => Ok(Coord { x: *x, y: *y }),
            [_, _, ..] => Err(GeometryError::NonFiniteOrdinate),
            short => Err(GeometryError::PositionTooShort(short.len())),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::new)
}

fn type_name(value: &GeoJsonValue) -> &'static str {
    match value {
        GeoJsonValue::Point(_) => "Point",
        GeoJsonValue::MultiPoint(_) => "MultiPoint",
        GeoJsonValue::LineString(_) => "LineString",
        GeoJsonValue::MultiLineString(_) => "MultiLineString",
        GeoJsonValue::Polygon(_) => "Polygon",
        GeoJsonValue::MultiPolygon(_) => "MultiPolygon",
        GeoJsonValue::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Unions all parts into one multipolygon.
///
/// Parts are merged pairwise in rounds. A single part is returned as-is and
/// no parts yield an empty multipolygon.
pub fn union_all(parts: Vec<MultiPolygon<f64>>) -> MultiPolygon<f64> {
    let mut round = parts;

    while round.len() > 1 {
        let mut next = Vec::with_capacity(round.len().div_ceil(2));
        let mut iter = round.into_iter();
        while let Some(left) = iter.next() {
            match iter.next() {
                Some(right) => next.push(left.union(&right)),
                None => next.push(left),
            }
        }
        round = next;
    }

    round.pop().unwrap_or_else(|| MultiPolygon::new(Vec::new()))
}

// Converts a merged shape back to GeoJSON; a single polygon stays a Polygon
pub fn to_geojson(merged: &MultiPolygon<f64>) -> GeoJsonGeometry {
    let value = match merged.0.as_slice() {
        [single] => GeoJsonValue::Polygon(polygon_rings(single)),
        polygons => GeoJsonValue::MultiPolygon(polygons.iter().map(polygon_rings).collect()),
    };
    GeoJsonGeometry::new(value)
}

fn polygon_rings(polygon: &Polygon<f64>) -> PolygonType {
    let mut rings = vec![ring_positions(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(ring_positions));
    rings
}

fn ring_positions(ring: &LineString<f64>) -> Vec<Position> {
    ring.coords().map(|c| vec![c.x, c.y]).collect()
}
