//! Geofence shapes and containment tests.

use serde::{Deserialize, Serialize};

use crate::distance::distance_meters;
use crate::error::GeometryError;
use crate::point::GeoPoint;

/// A geofence boundary.
///
/// This tagged union is the single canonical shape representation;
/// containment always dispatches over it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    /// Circle of `radius_m` meters around a center point.
    Circle {
        /// Center of the circle
        center: GeoPoint,
        /// Radius in meters
        radius_m: f64,
    },

    /// Closed polygon; vertices in order, at least three.
    Polygon {
        /// Boundary vertices, in order
        vertices: Vec<GeoPoint>,
    },
}

impl Shape {
    /// Validate the shape's geometry.
    pub fn validate(&self) -> Result<(), GeometryError> {
        match self {
            Self::Circle { radius_m, .. } => {
                if !radius_m.is_finite() || *radius_m <= 0.0 {
                    return Err(GeometryError::InvalidGeometry(format!(
                        "circle radius must be positive, got {radius_m}"
                    )));
                }
                Ok(())
            }
            Self::Polygon { vertices } => {
                if vertices.len() < 3 {
                    return Err(GeometryError::InvalidGeometry(format!(
                        "polygon needs at least 3 vertices, got {}",
                        vertices.len()
                    )));
                }
                Ok(())
            }
        }
    }

    /// Whether the shape contains the point.
    pub fn contains(&self, p: GeoPoint) -> Result<bool, GeometryError> {
        match self {
            Self::Circle { center, radius_m } => Ok(point_in_circle(p, *center, *radius_m)),
            Self::Polygon { vertices } => point_in_polygon(p, vertices),
        }
    }
}

/// Whether `p` lies within `radius_m` meters of `center`.
pub fn point_in_circle(p: GeoPoint, center: GeoPoint, radius_m: f64) -> bool {
    distance_meters(p, center) <= radius_m
}

/// Ray-casting parity test.
///
/// Casts a ray east from `p` and counts edge crossings; odd means inside.
/// Self-intersecting polygons give a deterministic but unspecified answer.
pub fn point_in_polygon(p: GeoPoint, vertices: &[GeoPoint]) -> Result<bool, GeometryError> {
    if vertices.len() < 3 {
        return Err(GeometryError::InvalidGeometry(format!(
            "polygon needs at least 3 vertices, got {}",
            vertices.len()
        )));
    }

    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (vi, vj) = (vertices[i], vertices[j]);
        let crosses = (vi.lat > p.lat) != (vj.lat > p.lat)
            && p.lng < (vj.lng - vi.lng) * (p.lat - vi.lat) / (vj.lat - vi.lat) + vi.lng;
        if crosses {
            inside = !inside;
        }
        j = i;
    }
    Ok(inside)
}
