//! Geofence model - a named geographic region gating attendance and tasks.

use chrono::{DateTime, Datelike, Timelike, Utc};
use fieldops_geo::Shape;
use serde::{Deserialize, Serialize};

use crate::id::{GeofenceId, UserId};

/// A named geographic region.
///
/// Regions are mutated only through the external admin interface and are
/// effectively immutable between registry refreshes; the engines read them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geofence {
    /// Unique identifier
    pub id: GeofenceId,

    /// Human-readable name
    pub name: String,

    /// Boundary geometry
    pub shape: Shape,

    /// Inactive regions are ignored by every engine
    pub is_active: bool,

    /// Entering this region may auto-assign nearby tasks
    pub auto_assign_tasks: bool,

    /// Entering/leaving this region drives attendance check-in/out
    pub allow_attendance: bool,

    /// Users the region applies to; `None` means all users
    pub allowed_users: Option<Vec<UserId>>,

    /// Optional day/time window evaluated in the region's local time
    pub working_hours: Option<WorkingHours>,
}

impl Geofence {
    /// Create an active region with no user restriction and no flags set.
    pub fn new(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            id: GeofenceId::new(),
            name: name.into(),
            shape,
            is_active: true,
            auto_assign_tasks: false,
            allow_attendance: false,
            allowed_users: None,
            working_hours: None,
        }
    }

    /// Whether the region applies to this user.
    pub fn applies_to(&self, user_id: UserId) -> bool {
        match &self.allowed_users {
            None => true,
            Some(users) => users.contains(&user_id),
        }
    }

    /// Whether `instant` falls inside the region's working hours.
    ///
    /// Regions without a window are open around the clock.
    pub fn within_working_hours(&self, instant: DateTime<Utc>) -> bool {
        match &self.working_hours {
            None => true,
            Some(window) => window.contains(instant),
        }
    }
}

/// A recurring day/time window in a fixed UTC offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingHours {
    /// Window start, minutes after local midnight
    pub start_minute: u16,

    /// Window end, minutes after local midnight (exclusive)
    pub end_minute: u16,

    /// Working days, 0 = Monday .. 6 = Sunday
    pub days_of_week: Vec<u8>,

    /// Local-time offset from UTC, in minutes
    pub utc_offset_minutes: i32,
}

impl WorkingHours {
    /// Whether `instant` falls inside the window, evaluated in local time.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        let local = instant + chrono::Duration::minutes(self.utc_offset_minutes as i64);
        let weekday = local.weekday().num_days_from_monday() as u8;
        if !self.days_of_week.contains(&weekday) {
            return false;
        }
        let minute = (local.hour() * 60 + local.minute()) as u16;
        minute >= self.start_minute && minute < self.end_minute
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fieldops_geo::GeoPoint;

    fn nine_to_five_weekdays(utc_offset_minutes: i32) -> WorkingHours {
        WorkingHours {
            start_minute: 9 * 60,
            end_minute: 17 * 60,
            days_of_week: vec![0, 1, 2, 3, 4],
            utc_offset_minutes,
        }
    }

    #[test]
    fn working_hours_respect_offset() {
        let hours = nine_to_five_weekdays(-5 * 60);
        // 2026-03-02 is a Monday. 14:00 UTC == 09:00 local at UTC-5.
        let inside = Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2026, 3, 2, 13, 59, 0).unwrap();
        assert!(hours.contains(inside));
        assert!(!hours.contains(before));
    }

    #[test]
    fn working_hours_skip_weekend() {
        let hours = nine_to_five_weekdays(0);
        // 2026-03-07 is a Saturday.
        let saturday_noon = Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap();
        assert!(!hours.contains(saturday_noon));
    }

    #[test]
    fn allow_list_restricts_users() {
        let worker = UserId::new();
        let other = UserId::new();
        let mut fence = Geofence::new(
            "site-a",
            Shape::Circle {
                center: GeoPoint { lat: 40.0, lng: -74.0 },
                radius_m: 100.0,
            },
        );
        assert!(fence.applies_to(worker));

        fence.allowed_users = Some(vec![worker]);
        assert!(fence.applies_to(worker));
        assert!(!fence.applies_to(other));
    }
}
