//! Domain events - atoms of the notification timeline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::id::{GeofenceId, TaskId, UserId};
use crate::Time;

/// Who a notification should reach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Audience {
    /// A single worker
    User {
        /// Target worker
        user_id: UserId,
    },
    /// Every administrator
    Admins,
}

/// An event is an atomic unit that happened at a specific time.
///
/// Events are emitted after the state change that produced them has been
/// persisted, so a consumer never observes an event for state that was
/// rolled back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldEvent {
    /// A worker's location moved inside an active region.
    RegionEntered {
        /// Worker who moved
        user_id: UserId,
        /// Region entered
        geofence_id: GeofenceId,
        /// When it happened
        at: Time,
    },
    /// A worker's location left a region they were inside.
    RegionExited {
        /// Worker who moved
        user_id: UserId,
        /// Region exited
        geofence_id: GeofenceId,
        /// When it happened
        at: Time,
    },
    /// A daily attendance record was opened.
    CheckedIn {
        /// Worker checking in
        user_id: UserId,
        /// Region that witnessed the check, if any
        geofence_id: Option<GeofenceId>,
        /// Whether the check-in was past the lateness threshold
        late: bool,
        /// When it happened
        at: Time,
    },
    /// A daily attendance record was closed.
    CheckedOut {
        /// Worker checking out
        user_id: UserId,
        /// Region that witnessed the check, if any
        geofence_id: Option<GeofenceId>,
        /// Hours worked for the day
        total_hours: f64,
        /// When it happened
        at: Time,
    },
    /// A task gained an assignee.
    TaskAssigned {
        /// Task in question
        task_id: TaskId,
        /// New assignee
        user_id: UserId,
        /// When it happened
        at: Time,
    },
    /// Work on a task began.
    TaskStarted {
        /// Task in question
        task_id: TaskId,
        /// Worker who started it
        user_id: UserId,
        /// When it happened
        at: Time,
    },
    /// Work on a task was suspended.
    TaskPaused {
        /// Task in question
        task_id: TaskId,
        /// Worker who paused it
        user_id: UserId,
        /// When it happened
        at: Time,
    },
    /// Work on a paused task resumed.
    TaskResumed {
        /// Task in question
        task_id: TaskId,
        /// Worker who resumed it
        user_id: UserId,
        /// When it happened
        at: Time,
    },
    /// A task reached its terminal state.
    TaskCompleted {
        /// Task in question
        task_id: TaskId,
        /// Worker who completed it
        user_id: UserId,
        /// Accumulated working minutes
        actual_minutes: u64,
        /// When it happened
        at: Time,
    },
    /// The carryover run rolled unfinished overdue tasks forward.
    TasksCarriedOver {
        /// Day the run was for
        date: NaiveDate,
        /// How many tasks were marked
        count: usize,
        /// When it happened
        at: Time,
    },
}

impl FieldEvent {
    /// Who the event should be delivered to.
    pub fn audience(&self) -> Audience {
        match self {
            FieldEvent::RegionEntered { user_id, .. }
            | FieldEvent::RegionExited { user_id, .. }
            | FieldEvent::CheckedIn { user_id, .. }
            | FieldEvent::CheckedOut { user_id, .. }
            | FieldEvent::TaskAssigned { user_id, .. }
            | FieldEvent::TaskStarted { user_id, .. }
            | FieldEvent::TaskPaused { user_id, .. }
            | FieldEvent::TaskResumed { user_id, .. }
            | FieldEvent::TaskCompleted { user_id, .. } => Audience::User {
                user_id: *user_id,
            },
            FieldEvent::TasksCarriedOver { .. } => Audience::Admins,
        }
    }

    /// When the event happened.
    pub fn at(&self) -> Time {
        match self {
            FieldEvent::RegionEntered { at, .. }
            | FieldEvent::RegionExited { at, .. }
            | FieldEvent::CheckedIn { at, .. }
            | FieldEvent::CheckedOut { at, .. }
            | FieldEvent::TaskAssigned { at, .. }
            | FieldEvent::TaskStarted { at, .. }
            | FieldEvent::TaskPaused { at, .. }
            | FieldEvent::TaskResumed { at, .. }
            | FieldEvent::TaskCompleted { at, .. }
            | FieldEvent::TasksCarriedOver { at, .. } => *at,
        }
    }
}
