//! Geographic coordinates.

use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// A point on the Earth's surface, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees, -90..=90
    pub lat: f64,
    /// Longitude in degrees, -180..=180
    pub lng: f64,
}

impl GeoPoint {
    /// Create a point, validating coordinate ranges.
    pub fn new(lat: f64, lng: f64) -> Result<Self, GeometryError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(GeometryError::InvalidCoordinate { lat, lng });
        }
        Ok(Self { lat, lng })
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}
