//! Planar AOI geometry used by the partitioner.
//!
//! Coordinates are lon/lat degrees and all computations are planar: areas in
//! square degrees are only ever compared against per-partition budgets in the
//! same unit, so spherical correction buys nothing here. Holes in polygon
//! rings are ignored; partitioning over-covers, it never under-covers.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ValidationError;

/// A lon/lat coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Result<Self, ValidationError> {
        if !x.is_finite() || !y.is_finite() {
            return Err(ValidationError::InvalidCoordinate { x, y });
        }
        Ok(Self { x, y })
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn expanded(&self, margin: f64) -> Self {
        Self {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }

    pub fn contains(&self, point: Coord) -> bool {
        point.x >= self.min_x && point.x <= self.max_x && point.y >= self.min_y && point.y <= self.max_y
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn corners(&self) -> [Coord; 4] {
        [
            Coord { x: self.min_x, y: self.min_y },
            Coord { x: self.min_x, y: self.max_y },
            Coord { x: self.max_x, y: self.max_y },
            Coord { x: self.max_x, y: self.min_y },
        ]
    }

    fn extend(&mut self, point: Coord) {
        self.min_x = self.min_x.min(point.x);
        self.min_y = self.min_y.min(point.y);
        self.max_x = self.max_x.max(point.x);
        self.max_y = self.max_y.max(point.y);
    }
}

/// Single polygon, exterior ring only, stored open (no repeated closing
/// vertex).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonGeom {
    exterior: Vec<Coord>,
}

impl PolygonGeom {
    pub fn new(mut exterior: Vec<Coord>) -> Result<Self, ValidationError> {
        if exterior.len() > 1 && exterior.first() == exterior.last() {
            exterior.pop();
        }
        if exterior.len() < 3 {
            return Err(ValidationError::RingTooShort { len: exterior.len() });
        }
        Ok(Self { exterior })
    }

    pub fn exterior(&self) -> &[Coord] {
        &self.exterior
    }

    /// Planar shoelace area in square degrees, orientation-independent.
    pub fn area(&self) -> f64 {
        let mut twice_area = 0.0;
        for (a, b) in self.edges() {
            twice_area += a.x * b.y - b.x * a.y;
        }
        twice_area.abs() / 2.0
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let first = self.exterior[0];
        let mut bbox = BoundingBox {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for point in &self.exterior[1..] {
            bbox.extend(*point);
        }
        bbox
    }

    /// Even-odd ray cast against the exterior ring.
    pub fn contains(&self, point: Coord) -> bool {
        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.y > point.y) != (b.y > point.y) {
                let x_at_y = a.x + (point.y - a.y) / (b.y - a.y) * (b.x - a.x);
                if point.x < x_at_y {
                    inside = !inside;
                }
            }
        }
        inside
    }

    pub fn intersects_rect(&self, rect: &BoundingBox) -> bool {
        if !self.bounding_box().intersects(rect) {
            return false;
        }
        if self.exterior.iter().any(|point| rect.contains(*point)) {
            return true;
        }
        if rect.corners().iter().any(|corner| self.contains(*corner)) {
            return true;
        }

        let corners = rect.corners();
        for i in 0..4 {
            let r1 = corners[i];
            let r2 = corners[(i + 1) % 4];
            for (a, b) in self.edges() {
                if segments_intersect(a, b, r1, r2) {
                    return true;
                }
            }
        }
        false
    }

    fn edges(&self) -> impl Iterator<Item = (Coord, Coord)> + '_ {
        let n = self.exterior.len();
        (0..n).map(move |i| (self.exterior[i], self.exterior[(i + 1) % n]))
    }
}

/// Area of interest: one or more polygons with a computed area. Read-only
/// input to partitioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AoiGeometry {
    polygons: Vec<PolygonGeom>,
}

impl AoiGeometry {
    pub fn new(polygons: Vec<PolygonGeom>) -> Result<Self, ValidationError> {
        if polygons.is_empty() {
            return Err(ValidationError::EmptyGeometry);
        }
        Ok(Self { polygons })
    }

    /// Axis-aligned rectangle as a one-polygon AOI. Used for grid cells.
    pub fn rect(bbox: BoundingBox) -> Self {
        let corners = bbox.corners().to_vec();
        Self {
            polygons: vec![PolygonGeom { exterior: corners }],
        }
    }

    pub fn polygons(&self) -> &[PolygonGeom] {
        &self.polygons
    }

    pub fn area(&self) -> f64 {
        self.polygons.iter().map(PolygonGeom::area).sum()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = self.polygons[0].bounding_box();
        for polygon in &self.polygons[1..] {
            let other = polygon.bounding_box();
            bbox.extend(Coord { x: other.min_x, y: other.min_y });
            bbox.extend(Coord { x: other.max_x, y: other.max_y });
        }
        bbox
    }

    pub fn contains(&self, point: Coord) -> bool {
        self.polygons.iter().any(|polygon| polygon.contains(point))
    }

    pub fn intersects_rect(&self, rect: &BoundingBox) -> bool {
        self.polygons.iter().any(|polygon| polygon.intersects_rect(rect))
    }

    /// Accepts Polygon, MultiPolygon, GeometryCollection, Feature and
    /// FeatureCollection GeoJSON. Only exterior rings are kept.
    pub fn from_geojson(value: &Value) -> Result<Self, ValidationError> {
        let mut polygons = Vec::new();
        collect_polygons(value, &mut polygons)?;
        Self::new(polygons)
    }

    /// GeoJSON geometry for upstream partition registration. Rings are
    /// emitted closed as the wire format requires.
    pub fn to_geojson(&self) -> Value {
        let rings: Vec<Value> = self
            .polygons
            .iter()
            .map(|polygon| {
                let mut ring: Vec<Value> = polygon
                    .exterior
                    .iter()
                    .map(|point| json!([point.x, point.y]))
                    .collect();
                ring.push(json!([polygon.exterior[0].x, polygon.exterior[0].y]));
                Value::Array(ring)
            })
            .collect();

        if rings.len() == 1 {
            json!({ "type": "Polygon", "coordinates": [rings[0]] })
        } else {
            let coordinates: Vec<Value> = rings.into_iter().map(|ring| json!([ring])).collect();
            json!({ "type": "MultiPolygon", "coordinates": coordinates })
        }
    }
}

fn collect_polygons(value: &Value, out: &mut Vec<PolygonGeom>) -> Result<(), ValidationError> {
    let geojson_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_geojson("missing 'type'"))?;

    match geojson_type {
        "Polygon" => {
            let rings = value
                .get("coordinates")
                .ok_or_else(|| invalid_geojson("Polygon without coordinates"))?;
            out.push(ring_to_polygon(rings)?);
            Ok(())
        }
        "MultiPolygon" => {
            let coordinates = value
                .get("coordinates")
                .and_then(Value::as_array)
                .ok_or_else(|| invalid_geojson("MultiPolygon without coordinates"))?;
            for rings in coordinates {
                out.push(ring_to_polygon(rings)?);
            }
            Ok(())
        }
        "GeometryCollection" => {
            let geometries = value
                .get("geometries")
                .and_then(Value::as_array)
                .ok_or_else(|| invalid_geojson("GeometryCollection without geometries"))?;
            for geometry in geometries {
                collect_polygons(geometry, out)?;
            }
            Ok(())
        }
        "Feature" => {
            let geometry = value
                .get("geometry")
                .ok_or_else(|| invalid_geojson("Feature without geometry"))?;
            collect_polygons(geometry, out)
        }
        "FeatureCollection" => {
            let features = value
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| invalid_geojson("FeatureCollection without features"))?;
            for feature in features {
                collect_polygons(feature, out)?;
            }
            Ok(())
        }
        other => Err(invalid_geojson(format!("unsupported geometry type '{other}'"))),
    }
}

/// First ring is the exterior; holes are dropped.
fn ring_to_polygon(rings: &Value) -> Result<PolygonGeom, ValidationError> {
    let exterior = rings
        .as_array()
        .and_then(|rings| rings.first())
        .and_then(Value::as_array)
        .ok_or_else(|| invalid_geojson("polygon without exterior ring"))?;

    let mut coords = Vec::with_capacity(exterior.len());
    for position in exterior {
        let pair = position
            .as_array()
            .filter(|pair| pair.len() >= 2)
            .ok_or_else(|| invalid_geojson("position is not a coordinate pair"))?;
        let x = pair[0]
            .as_f64()
            .ok_or_else(|| invalid_geojson("non-numeric longitude"))?;
        let y = pair[1]
            .as_f64()
            .ok_or_else(|| invalid_geojson("non-numeric latitude"))?;
        coords.push(Coord::new(x, y)?);
    }
    PolygonGeom::new(coords)
}

fn invalid_geojson(reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidGeoJson {
        reason: reason.into(),
    }
}

fn orientation(a: Coord, b: Coord, c: Coord) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn on_segment(a: Coord, b: Coord, p: Coord) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

fn segments_intersect(a1: Coord, a2: Coord, b1: Coord, b2: Coord) -> bool {
    let d1 = orientation(b1, b2, a1);
    let d2 = orientation(b1, b2, a2);
    let d3 = orientation(a1, a2, b1);
    let d4 = orientation(a1, a2, b2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(b1, b2, a1))
        || (d2 == 0.0 && on_segment(b1, b2, a2))
        || (d3 == 0.0 && on_segment(a1, a2, b1))
        || (d4 == 0.0 && on_segment(a1, a2, b2))
}
