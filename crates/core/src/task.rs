//! Task model - the unit of field work.

use chrono::NaiveDate;
use fieldops_geo::GeoPoint;
use serde::{Deserialize, Serialize};

use crate::id::{GeofenceId, TaskId, UserId};
use crate::Time;

/// A task a field worker executes at (or near) a physical location.
///
/// Tasks are mutated only through lifecycle transitions under
/// single-writer-per-task discipline; the `version` field backs the
/// store's optimistic compare-and-set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Task title
    pub title: String,

    /// Detailed description
    pub description: String,

    /// Assigned worker, if any
    pub assigned_to: Option<UserId>,

    /// Where the task must be performed, if location-gated
    pub required_location: Option<RequiredLocation>,

    /// Current lifecycle status
    pub status: TaskStatus,

    /// Execution time accounting
    pub time_tracking: TimeTracking,

    /// Minutes across closed sessions; recomputed on close, never decreases
    pub actual_minutes: u64,

    /// Due date (local calendar day)
    pub due_date: Option<NaiveDate>,

    /// Free-form tags ("overdue" is appended by the carryover scheduler)
    pub tags: Vec<String>,

    /// Local dates the task was rolled forward; enforces carryover idempotency
    pub carryover_marks: Vec<NaiveDate>,

    /// Completion needs an admin approval step
    pub approval_required: bool,

    /// Approval state; automatically true when no approval is required
    pub is_approved: bool,

    /// When the task reached Completed
    pub completed_at: Option<Time>,

    /// Optimistic-concurrency version, bumped by the store on every write
    pub version: u64,

    /// Creation timestamp
    pub created_at: Time,

    /// Last update timestamp
    pub updated_at: Time,
}

impl Task {
    /// Create an unassigned, not-started task.
    pub fn new(title: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: TaskId::new(),
            title: title.into(),
            description: String::new(),
            assigned_to: None,
            required_location: None,
            status: TaskStatus::NotStarted,
            time_tracking: TimeTracking::default(),
            actual_minutes: 0,
            due_date: None,
            tags: Vec::new(),
            carryover_marks: Vec::new(),
            approval_required: false,
            is_approved: false,
            completed_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the task was rolled forward on `date` already.
    pub fn has_carryover_mark(&self, date: NaiveDate) -> bool {
        self.carryover_marks.contains(&date)
    }
}

/// Where a task must be performed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredLocation {
    /// Target point
    pub point: GeoPoint,

    /// Permitted distance from the point, in meters
    pub radius_m: f64,

    /// Hard gate: out-of-range transitions fail instead of being recorded
    pub strict: bool,

    /// Region auto-assignment uses to match tasks to entries
    pub geofence_id: Option<GeofenceId>,
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, no work recorded yet
    NotStarted,
    /// A session is currently open
    InProgress,
    /// Started but currently paused
    Paused,
    /// Finished (terminal)
    Completed,
}

impl TaskStatus {
    /// Whether the machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (NotStarted, InProgress)
                | (InProgress, Paused)
                | (InProgress, Completed)
                | (Paused, InProgress)
                | (Paused, Completed)
        )
    }

    /// Completed is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::NotStarted => "not_started",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Execution time accounting for a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeTracking {
    /// First ever start
    pub started_at: Option<Time>,

    /// When the current pause began, if paused
    pub paused_at: Option<Time>,

    /// Accumulated paused time in milliseconds
    pub total_paused_ms: i64,

    /// Contiguous InProgress intervals, append-only
    pub sessions: Vec<Session>,
}

impl TimeTracking {
    /// The session without an end, if one is open.
    pub fn open_session(&self) -> Option<&Session> {
        self.sessions.iter().find(|s| s.end.is_none())
    }
}

/// One contiguous InProgress interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// When the interval opened
    pub start: Time,

    /// When the interval closed; `None` while running
    pub end: Option<Time>,

    /// Closed duration in milliseconds
    pub duration_ms: Option<i64>,

    /// Whether the opener was inside the required radius
    pub location_valid: bool,
}

/// Filter for querying tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    /// Restrict to these statuses
    pub status: Option<Vec<TaskStatus>>,

    /// Restrict to one assignee
    pub assigned_to: Option<UserId>,

    /// Only tasks with no assignee
    pub unassigned_only: bool,

    /// Only tasks whose required location references this region
    pub geofence_id: Option<GeofenceId>,

    /// Only tasks due strictly before this date
    pub due_before: Option<NaiveDate>,
}

impl TaskFilter {
    /// Whether `task` passes every set criterion.
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(statuses) = &self.status {
            if !statuses.contains(&task.status) {
                return false;
            }
        }
        if let Some(user) = self.assigned_to {
            if task.assigned_to != Some(user) {
                return false;
            }
        }
        if self.unassigned_only && task.assigned_to.is_some() {
            return false;
        }
        if let Some(fence) = self.geofence_id {
            let references = task
                .required_location
                .as_ref()
                .and_then(|loc| loc.geofence_id)
                == Some(fence);
            if !references {
                return false;
            }
        }
        if let Some(cutoff) = self.due_before {
            match task.due_date {
                Some(due) if due < cutoff => {}
                _ => return false,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table() {
        use TaskStatus::*;
        let legal = [
            (NotStarted, InProgress),
            (InProgress, Paused),
            (InProgress, Completed),
            (Paused, InProgress),
            (Paused, Completed),
        ];
        for (from, to) in legal {
            assert!(from.can_transition_to(to), "{from} -> {to} should be legal");
        }

        let illegal = [
            (NotStarted, Paused),
            (NotStarted, Completed),
            (Paused, Paused),
            (InProgress, InProgress),
            (Completed, InProgress),
            (Completed, Paused),
            (Completed, Completed),
        ];
        for (from, to) in illegal {
            assert!(!from.can_transition_to(to), "{from} -> {to} should be illegal");
        }

        assert!(Completed.is_terminal());
        assert!(!Paused.is_terminal());
    }

    #[test]
    fn filter_by_status_and_assignee() {
        let user = UserId::new();
        let mut task = Task::new("inspect pump");
        task.assigned_to = Some(user);
        task.status = TaskStatus::InProgress;

        let filter = TaskFilter {
            status: Some(vec![TaskStatus::InProgress]),
            assigned_to: Some(user),
            ..Default::default()
        };
        assert!(filter.matches(&task));

        let other = TaskFilter {
            assigned_to: Some(UserId::new()),
            ..Default::default()
        };
        assert!(!other.matches(&task));
    }

    #[test]
    fn filter_due_before() {
        let mut task = Task::new("overdue");
        task.due_date = NaiveDate::from_ymd_opt(2026, 3, 1);

        let filter = TaskFilter {
            due_before: NaiveDate::from_ymd_opt(2026, 3, 2),
            ..Default::default()
        };
        assert!(filter.matches(&task));

        let same_day = TaskFilter {
            due_before: NaiveDate::from_ymd_opt(2026, 3, 1),
            ..Default::default()
        };
        assert!(!same_day.matches(&task), "due today is not overdue");
    }

    #[test]
    fn filter_unassigned_for_geofence() {
        let fence = GeofenceId::new();
        let mut task = Task::new("fence task");
        task.required_location = Some(RequiredLocation {
            point: GeoPoint { lat: 40.0, lng: -74.0 },
            radius_m: 50.0,
            strict: false,
            geofence_id: Some(fence),
        });

        let filter = TaskFilter {
            unassigned_only: true,
            geofence_id: Some(fence),
            ..Default::default()
        };
        assert!(filter.matches(&task));

        task.assigned_to = Some(UserId::new());
        assert!(!filter.matches(&task));
    }
}
