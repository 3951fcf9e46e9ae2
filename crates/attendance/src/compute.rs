//! Worked-hour accounting.
//!
//! Pure functions so the day math is testable without storage or clocks.

use chrono::Timelike;
use fieldops_core::{AttendanceStatus, Time};

use crate::engine::AttendanceConfig;

/// Outcome of closing a day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayTotals {
    /// Worked hours, breaks subtracted, clamped to 0..=24
    pub total_hours: f64,
    /// Hours beyond the configured workday
    pub overtime_hours: f64,
    /// Day classification
    pub status: AttendanceStatus,
}

/// Derive the totals and classification for a closed day.
///
/// Negative spans clamp to zero rather than failing; the caller is
/// expected to have rejected a check-out that precedes its check-in.
pub fn compute_totals(
    check_in_at: Time,
    check_out_at: Time,
    break_ms: i64,
    config: &AttendanceConfig,
) -> DayTotals {
    let worked_ms = (check_out_at - check_in_at).num_milliseconds() - break_ms;
    let total_hours = (worked_ms as f64 / 3_600_000.0).clamp(0.0, 24.0);

    let mut status = if minute_of_local_day(check_in_at, config.utc_offset_minutes)
        > config.late_after_minute
    {
        AttendanceStatus::Late
    } else {
        AttendanceStatus::Present
    };
    if total_hours < config.half_day_below_hours {
        status = AttendanceStatus::HalfDay;
    }

    let overtime_hours = (total_hours - config.workday_hours).max(0.0);

    DayTotals {
        total_hours,
        overtime_hours,
        status,
    }
}

/// Whether a check-in at `at` counts as late. Minute granularity.
pub fn is_late(at: Time, config: &AttendanceConfig) -> bool {
    minute_of_local_day(at, config.utc_offset_minutes) > config.late_after_minute
}

fn minute_of_local_day(at: Time, utc_offset_minutes: i32) -> u16 {
    let local = at + chrono::Duration::minutes(utc_offset_minutes as i64);
    (local.hour() * 60 + local.minute()) as u16
}
