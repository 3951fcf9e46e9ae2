//! Storage trait abstraction.

use async_trait::async_trait;
use chrono::NaiveDate;
use fieldops_core::{
    AttendanceRecord, Geofence, GeofenceId, LocationSample, Task, TaskFilter, TaskId, Time, UserId,
};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A guarded write lost the race against a concurrent writer
    #[error("Version conflict: expected {expected}, found {actual}")]
    VersionConflict {
        /// Version the writer loaded
        expected: u64,
        /// Version currently stored
        actual: u64,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Storage abstraction for fieldops data.
///
/// This trait allows different storage backends to be plugged in. All
/// methods take `&self` so a backend can be shared across engines behind
/// an `Arc`; implementations use interior mutability.
#[async_trait]
pub trait Store: Send + Sync {
    // === Geofence operations ===

    /// Save a geofence (create or update).
    async fn save_geofence(&self, geofence: &Geofence) -> Result<()>;

    /// Load a geofence by ID.
    async fn load_geofence(&self, id: GeofenceId) -> Result<Option<Geofence>>;

    /// List all geofences, active or not.
    async fn list_geofences(&self) -> Result<Vec<Geofence>>;

    /// Delete a geofence.
    async fn delete_geofence(&self, id: GeofenceId) -> Result<()>;

    // === Task operations ===

    /// Save a task (create or update), without a version guard.
    async fn save_task(&self, task: &Task) -> Result<()>;

    /// Load a task by ID.
    async fn load_task(&self, id: TaskId) -> Result<Option<Task>>;

    /// List tasks matching the filter.
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>>;

    /// Write a task only if the stored version still equals `task.version`.
    ///
    /// On success the stored copy carries `task.version + 1` and the
    /// written task is returned. A concurrent writer that got there first
    /// surfaces as [`StoreError::VersionConflict`].
    async fn update_task_versioned(&self, task: &Task) -> Result<Task>;

    /// Assign a task to `user_id` only if it has no assignee yet.
    ///
    /// Returns the updated task, or `None` when someone else already
    /// holds the assignment. The check and the write are atomic with
    /// respect to other callers of this store instance.
    async fn assign_task_if_unassigned(
        &self,
        id: TaskId,
        user_id: UserId,
        now: Time,
    ) -> Result<Option<Task>>;

    // === Attendance operations ===

    /// Save an attendance record (create or update).
    async fn save_attendance(&self, record: &AttendanceRecord) -> Result<()>;

    /// Find the record for one worker-day. At most one exists.
    async fn find_attendance(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>>;

    /// List a worker's records, oldest first.
    async fn list_attendance(&self, user_id: UserId) -> Result<Vec<AttendanceRecord>>;

    // === Location samples ===

    /// Remember the most recent location sample for a worker.
    async fn save_sample(&self, sample: &LocationSample) -> Result<()>;

    /// Load the most recent location sample for a worker.
    async fn latest_sample(&self, user_id: UserId) -> Result<Option<LocationSample>>;
}
