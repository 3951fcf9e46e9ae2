//! fieldops core data models.
//!
//! This crate defines the data structures shared by the location,
//! attendance, task, and scheduling engines.

#![warn(missing_docs)]

// Core identities
mod id;

// Regions and location input
mod geofence;
mod sample;

// Attendance and task execution
mod attendance;
mod task;

// Boundary types
mod event;
mod requester;

// Re-exports
pub use id::*;

pub use attendance::{
    AttendancePhase, AttendanceRecord, AttendanceStatus, CheckEvent, CheckMethod,
};
pub use event::{Audience, FieldEvent};
pub use geofence::{Geofence, WorkingHours};
pub use requester::{Requester, Role};
pub use sample::LocationSample;
pub use task::{RequiredLocation, Session, Task, TaskFilter, TaskStatus, TimeTracking};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
