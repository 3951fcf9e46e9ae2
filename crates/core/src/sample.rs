//! Location samples reported by worker devices.

use fieldops_geo::GeoPoint;
use serde::{Deserialize, Serialize};

use crate::id::UserId;
use crate::Time;

/// One GPS fix from a worker's device.
///
/// Samples for a user must be processed in non-decreasing `captured_at`
/// order; the membership tracker rejects anything older than its last
/// committed sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSample {
    /// Reporting worker
    pub user_id: UserId,

    /// Reported position
    pub point: GeoPoint,

    /// Reported horizontal accuracy in meters
    pub accuracy_m: f64,

    /// Battery charge in 0..=1, when the device reports it
    pub battery_level: Option<f32>,

    /// Device-side capture timestamp
    pub captured_at: Time,
}

impl LocationSample {
    /// Sample captured now with no battery reading.
    pub fn new(user_id: UserId, point: GeoPoint, accuracy_m: f64) -> Self {
        Self {
            user_id,
            point,
            accuracy_m,
            battery_level: None,
            captured_at: chrono::Utc::now(),
        }
    }
}
