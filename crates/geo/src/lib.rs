//! fieldops geometry kernel.
//!
//! Pure distance and containment math over geographic coordinates. No side
//! effects, no I/O; everything else in the workspace builds on these
//! primitives. Great-circle approximation only, which is adequate for
//! working areas under ~10 km.

#![warn(missing_docs)]

mod distance;
mod error;
mod point;
mod shape;

pub use distance::{distance_meters, EARTH_RADIUS_M};
pub use error::GeometryError;
pub use point::GeoPoint;
pub use shape::{point_in_circle, point_in_polygon, Shape};
