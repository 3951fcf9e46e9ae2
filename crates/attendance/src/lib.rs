//! Daily attendance: geofence-driven and manual check-in/check-out with
//! worked-hour accounting.

#![warn(missing_docs)]

pub mod compute;
pub mod engine;

pub use compute::{compute_totals, DayTotals};
pub use engine::{AttendanceConfig, AttendanceEngine, AttendanceError};
