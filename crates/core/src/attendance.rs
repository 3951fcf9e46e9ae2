//! Attendance model - one auditable record per worker per day.

use chrono::NaiveDate;
use fieldops_geo::GeoPoint;
use serde::{Deserialize, Serialize};

use crate::id::{AttendanceId, GeofenceId, UserId};
use crate::Time;

/// One worker-day attendance record.
///
/// The store enforces uniqueness on `(user_id, date)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    /// Unique identifier
    pub id: AttendanceId,

    /// Worker the record belongs to
    pub user_id: UserId,

    /// Local calendar day (midnight-normalized)
    pub date: NaiveDate,

    /// Check-in, set when the record is created
    pub check_in: Option<CheckEvent>,

    /// Check-out, set at most once
    pub check_out: Option<CheckEvent>,

    /// Unpaid break time subtracted from the total, in milliseconds
    pub break_ms: i64,

    /// Worked hours, clamped to 0..=24
    pub total_hours: f64,

    /// Hours beyond the configured workday
    pub overtime_hours: f64,

    /// Day classification
    pub status: AttendanceStatus,

    /// False when no attendance region contained the check location
    pub is_valid_location: bool,
}

impl AttendanceRecord {
    /// Daily state machine position for an optional record.
    pub fn phase(record: Option<&AttendanceRecord>) -> AttendancePhase {
        match record {
            None => AttendancePhase::NoRecordToday,
            Some(r) if r.check_out.is_some() => AttendancePhase::CheckedOut,
            Some(_) => AttendancePhase::CheckedIn,
        }
    }
}

/// Position of a worker's day in the attendance state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendancePhase {
    /// No record exists for the day
    NoRecordToday,
    /// Checked in, not yet out
    CheckedIn,
    /// Checked in and out
    CheckedOut,
}

impl std::fmt::Display for AttendancePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AttendancePhase::NoRecordToday => "no_record_today",
            AttendancePhase::CheckedIn => "checked_in",
            AttendancePhase::CheckedOut => "checked_out",
        };
        f.write_str(s)
    }
}

/// One check-in or check-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckEvent {
    /// When it happened
    pub time: Time,

    /// Where the worker was
    pub location: GeoPoint,

    /// Region that triggered it, for geofence-derived events
    pub geofence_id: Option<GeofenceId>,

    /// How the event was produced
    pub method: CheckMethod,
}

/// How a check event was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckMethod {
    /// Derived from a region enter/exit
    Geofence,
    /// Explicit request from the worker
    Manual,
}

/// Day classification for an attendance record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    /// Checked in on time
    Present,
    /// Checked in after the configured threshold
    Late,
    /// No record for the day (derived by reporting, never auto-created)
    Absent,
    /// Worked less than the configured half-day bound
    HalfDay,
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::HalfDay => "half_day",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_follows_record_shape() {
        assert_eq!(
            AttendanceRecord::phase(None),
            AttendancePhase::NoRecordToday
        );

        let mut record = AttendanceRecord {
            id: AttendanceId::new(),
            user_id: UserId::new(),
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            check_in: Some(CheckEvent {
                time: chrono::Utc::now(),
                location: GeoPoint { lat: 40.0, lng: -74.0 },
                geofence_id: None,
                method: CheckMethod::Manual,
            }),
            check_out: None,
            break_ms: 0,
            total_hours: 0.0,
            overtime_hours: 0.0,
            status: AttendanceStatus::Present,
            is_valid_location: true,
        };
        assert_eq!(
            AttendanceRecord::phase(Some(&record)),
            AttendancePhase::CheckedIn
        );

        record.check_out = record.check_in.clone();
        assert_eq!(
            AttendanceRecord::phase(Some(&record)),
            AttendancePhase::CheckedOut
        );
    }
}
