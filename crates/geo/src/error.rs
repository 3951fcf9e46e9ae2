//! Geometry errors.

/// Errors from coordinate validation and containment tests.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    /// Latitude or longitude outside the valid range.
    #[error("invalid coordinate: lat={lat}, lng={lng}")]
    InvalidCoordinate {
        /// Latitude that was submitted
        lat: f64,
        /// Longitude that was submitted
        lng: f64,
    },

    /// Malformed shape (degenerate polygon, non-positive radius).
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
}
