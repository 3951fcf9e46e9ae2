//! Boundary service over the engines.
//!
//! One `FieldService` owns the registry, tracker, and the three engines,
//! all sharing one store and one outbox. Transport layers (CLI, HTTP)
//! call the operations here and map `ServiceError` to status codes via
//! [`ServiceError::status_code`]. Client-asserted validity flags are
//! never trusted; membership and distance are recomputed from the raw
//! coordinates on every call.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use fieldops_attendance::{AttendanceConfig, AttendanceEngine, AttendanceError};
use fieldops_core::{
    AttendancePhase, AttendanceRecord, Geofence, GeofenceId, LocationSample, Requester, Task,
    TaskFilter, TaskId, Time, UserId,
};
use fieldops_geo::{GeoPoint, GeometryError};
use fieldops_jobs::{AssignConfig, AutoAssignEngine};
use fieldops_location::{
    GeofenceRegistry, MembershipTracker, RegistryConfig, SampleOutcome, TrackerConfig,
};
use fieldops_outbox::Outbox;
use fieldops_store::{Store, StoreError};
use fieldops_tasks::{TaskEngine, TaskError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Boundary error, aggregated from every engine.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed coordinates or geometry in the request
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Attendance rules rejected the request
    #[error(transparent)]
    Attendance(#[from] AttendanceError),

    /// Task lifecycle rules rejected the request
    #[error(transparent)]
    Task(#[from] TaskError),

    /// Storage failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// HTTP-style status code for transport layers.
    ///
    /// Client mistakes are 400, authorization failures 403, missing
    /// entities 404, retryable write races 409, storage trouble 503.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Geometry(_) => 400,
            Self::Attendance(e) => match e {
                AttendanceError::InvalidOrder { .. }
                | AttendanceError::NotCheckedIn
                | AttendanceError::OutsideGeofence => 400,
                AttendanceError::Store(e) => store_status(e),
            },
            Self::Task(e) => match e {
                TaskError::NotFound(_) => 404,
                TaskError::InvalidTransition { .. }
                | TaskError::LocationOutOfRange { .. }
                | TaskError::LocationRequired => 400,
                TaskError::NotAssigned => 403,
                TaskError::Concurrency => 409,
                TaskError::Store(e) => store_status(e),
            },
            Self::Store(e) => store_status(e),
        }
    }
}

fn store_status(e: &StoreError) -> u16 {
    match e {
        StoreError::NotFound(_) => 404,
        StoreError::VersionConflict { .. } => 409,
        _ => 503,
    }
}

/// Boundary result alias.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// A server-side policy breach detected while applying a sample.
///
/// Violations are advisory. The sample is still applied; clients and
/// operators decide what to do with them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// Reported horizontal accuracy is worse than the threshold.
    PoorAccuracy {
        /// Accuracy the device reported, meters
        accuracy_m: f64,
        /// Configured ceiling, meters
        threshold_m: f64,
    },

    /// Entered an attendance region outside its working hours.
    OutsideWorkingHours {
        /// The region whose window was missed
        geofence_id: GeofenceId,
    },
}

/// Outcome of one location update at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationUpdate {
    /// Regions the user is inside after this sample, ordered by ID
    pub current_geofences: Vec<GeofenceId>,

    /// Regions this sample moved the user into
    pub entered: Vec<GeofenceId>,

    /// Regions this sample moved the user out of
    pub exited: Vec<GeofenceId>,

    /// Policy breaches detected while applying the sample
    pub violations: Vec<Violation>,
}

/// Outcome of a manual check-in or check-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// The day's record after the operation
    pub attendance: AttendanceRecord,

    /// Whether the record's location was witnessed by an attendance region
    pub location_valid: bool,
}

/// One worker's situation at a glance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatus {
    /// Regions the worker is currently inside
    pub current_geofences: Vec<GeofenceId>,

    /// Where the worker's day stands
    pub phase: AttendancePhase,

    /// Today's attendance record, when one exists
    pub attendance: Option<AttendanceRecord>,

    /// Tasks assigned to the worker
    pub tasks: Vec<Task>,

    /// Most recently reported location, when one exists
    pub last_sample: Option<LocationSample>,
}

/// Configuration for the service façade and its engines.
#[derive(Debug, Clone)]
pub struct FieldServiceConfig {
    /// Samples reporting accuracy above this radius are flagged
    pub accuracy_threshold_m: f64,

    /// Geofence cache settings
    pub registry: RegistryConfig,

    /// Sample ordering settings
    pub tracker: TrackerConfig,

    /// Attendance rules
    pub attendance: AttendanceConfig,

    /// Auto-assignment limits
    pub assign: AssignConfig,
}

impl Default for FieldServiceConfig {
    fn default() -> Self {
        Self {
            accuracy_threshold_m: 50.0,
            registry: RegistryConfig::default(),
            tracker: TrackerConfig::default(),
            attendance: AttendanceConfig::default(),
            assign: AssignConfig::default(),
        }
    }
}

impl FieldServiceConfig {
    /// Set the accuracy ceiling above which samples are flagged.
    pub fn with_accuracy_threshold_m(mut self, meters: f64) -> Self {
        self.accuracy_threshold_m = meters;
        self
    }

    /// Replace the registry settings.
    pub fn with_registry(mut self, config: RegistryConfig) -> Self {
        self.registry = config;
        self
    }

    /// Replace the tracker settings.
    pub fn with_tracker(mut self, config: TrackerConfig) -> Self {
        self.tracker = config;
        self
    }

    /// Replace the attendance rules.
    pub fn with_attendance(mut self, config: AttendanceConfig) -> Self {
        self.attendance = config;
        self
    }

    /// Replace the auto-assignment limits.
    pub fn with_assign(mut self, config: AssignConfig) -> Self {
        self.assign = config;
        self
    }
}

/// Service layer wiring the registry, tracker, and engines together.
pub struct FieldService {
    store: Arc<dyn Store>,
    registry: Arc<GeofenceRegistry>,
    tracker: MembershipTracker,
    attendance: AttendanceEngine,
    tasks: TaskEngine,
    auto_assign: AutoAssignEngine,
    config: FieldServiceConfig,
}

impl FieldService {
    /// Create a service with default configuration.
    pub fn new(store: Arc<dyn Store>, outbox: Outbox) -> Self {
        Self::with_config(store, outbox, FieldServiceConfig::default())
    }

    /// Create a service with explicit configuration.
    pub fn with_config(store: Arc<dyn Store>, outbox: Outbox, config: FieldServiceConfig) -> Self {
        let registry = Arc::new(GeofenceRegistry::with_config(
            store.clone(),
            config.registry.clone(),
        ));
        let tracker = MembershipTracker::with_config(
            store.clone(),
            registry.clone(),
            outbox.clone(),
            config.tracker.clone(),
        );
        let attendance = AttendanceEngine::with_config(
            store.clone(),
            registry.clone(),
            outbox.clone(),
            config.attendance.clone(),
        );
        let tasks = TaskEngine::new(store.clone(), outbox.clone());
        let auto_assign =
            AutoAssignEngine::with_config(store.clone(), outbox, config.assign.clone());
        Self {
            store,
            registry,
            tracker,
            attendance,
            tasks,
            auto_assign,
            config,
        }
    }

    /// Apply one location sample and fan the transitions out.
    ///
    /// Membership is committed first; attendance and auto-assignment
    /// react to the resulting Enter/Exit transitions. A failure in a
    /// downstream reaction is logged and does not fail the update,
    /// since the membership change is already applied.
    pub async fn location_update(
        &self,
        user_id: UserId,
        lat: f64,
        lng: f64,
        accuracy_m: f64,
        battery_level: Option<f32>,
        captured_at: Time,
    ) -> Result<LocationUpdate> {
        let point = GeoPoint::new(lat, lng)?;
        let sample = LocationSample {
            user_id,
            point,
            accuracy_m,
            battery_level,
            captured_at,
        };

        let mut violations = Vec::new();
        if accuracy_m > self.config.accuracy_threshold_m {
            violations.push(Violation::PoorAccuracy {
                accuracy_m,
                threshold_m: self.config.accuracy_threshold_m,
            });
        }

        let (entered, exited, current) = match self.tracker.process_sample(&sample).await? {
            SampleOutcome::Applied {
                entered,
                exited,
                current,
            } => (entered, exited, current),
            SampleOutcome::Stale => {
                debug!(%user_id, %captured_at, "stale sample, membership unchanged");
                return Ok(LocationUpdate {
                    current_geofences: self.tracker.current_regions(user_id).await,
                    entered: Vec::new(),
                    exited: Vec::new(),
                    violations,
                });
            }
        };

        for fence in &entered {
            if fence.allow_attendance && !fence.within_working_hours(captured_at) {
                violations.push(Violation::OutsideWorkingHours {
                    geofence_id: fence.id,
                });
            }
            if let Err(e) = self
                .attendance
                .on_region_enter(user_id, fence, point, captured_at)
                .await
            {
                warn!(%user_id, geofence_id = %fence.id, error = %e, "attendance enter reaction failed");
            }
            if let Err(e) = self
                .auto_assign
                .on_region_enter(user_id, fence, point, captured_at)
                .await
            {
                warn!(%user_id, geofence_id = %fence.id, error = %e, "auto-assignment reaction failed");
            }
        }
        for &geofence_id in &exited {
            if let Err(e) = self
                .attendance
                .on_region_exit(user_id, geofence_id, point, captured_at)
                .await
            {
                warn!(%user_id, %geofence_id, error = %e, "attendance exit reaction failed");
            }
        }

        Ok(LocationUpdate {
            current_geofences: current,
            entered: entered.iter().map(|g| g.id).collect(),
            exited,
            violations,
        })
    }

    /// Manual check-in at the given coordinates.
    pub async fn check_in(
        &self,
        user_id: UserId,
        lat: f64,
        lng: f64,
        accuracy_m: f64,
    ) -> Result<CheckResult> {
        let point = GeoPoint::new(lat, lng)?;
        if accuracy_m > self.config.accuracy_threshold_m {
            warn!(%user_id, accuracy_m, "manual check-in with poor accuracy");
        }
        let record = self.attendance.check_in(user_id, point, Utc::now()).await?;
        Ok(CheckResult {
            location_valid: record.is_valid_location,
            attendance: record,
        })
    }

    /// Manual check-out at the given coordinates.
    pub async fn check_out(
        &self,
        user_id: UserId,
        lat: f64,
        lng: f64,
        accuracy_m: f64,
    ) -> Result<CheckResult> {
        let point = GeoPoint::new(lat, lng)?;
        if accuracy_m > self.config.accuracy_threshold_m {
            warn!(%user_id, accuracy_m, "manual check-out with poor accuracy");
        }
        let record = self.attendance.check_out(user_id, point, Utc::now()).await?;
        Ok(CheckResult {
            location_valid: record.is_valid_location,
            attendance: record,
        })
    }

    /// Begin work on a task.
    pub async fn start_task(
        &self,
        task_id: TaskId,
        requester: &Requester,
        lat: Option<f64>,
        lng: Option<f64>,
    ) -> Result<Task> {
        let point = optional_point(lat, lng)?;
        let task = self.tasks.start(task_id, requester, point, Utc::now()).await?;
        Ok(task)
    }

    /// Pause work on a task.
    pub async fn pause_task(
        &self,
        task_id: TaskId,
        requester: &Requester,
        lat: Option<f64>,
        lng: Option<f64>,
    ) -> Result<Task> {
        let point = optional_point(lat, lng)?;
        let task = self.tasks.pause(task_id, requester, point, Utc::now()).await?;
        Ok(task)
    }

    /// Resume a paused task.
    pub async fn resume_task(
        &self,
        task_id: TaskId,
        requester: &Requester,
        lat: Option<f64>,
        lng: Option<f64>,
    ) -> Result<Task> {
        let point = optional_point(lat, lng)?;
        let task = self
            .tasks
            .resume(task_id, requester, point, Utc::now())
            .await?;
        Ok(task)
    }

    /// Complete a task.
    pub async fn complete_task(
        &self,
        task_id: TaskId,
        requester: &Requester,
        lat: Option<f64>,
        lng: Option<f64>,
    ) -> Result<Task> {
        let point = optional_point(lat, lng)?;
        let task = self
            .tasks
            .complete(task_id, requester, point, Utc::now())
            .await?;
        Ok(task)
    }

    /// Hand a task to a worker. Administrators only.
    pub async fn assign_task(
        &self,
        task_id: TaskId,
        user_id: UserId,
        requester: &Requester,
    ) -> Result<Task> {
        let task = self
            .tasks
            .assign(task_id, user_id, requester, Utc::now())
            .await?;
        Ok(task)
    }

    /// Persist a new task.
    pub async fn create_task(&self, task: Task) -> Result<Task> {
        self.store.save_task(&task).await?;
        info!(task_id = %task.id, title = %task.title, "task created");
        Ok(task)
    }

    /// Load one task.
    pub async fn get_task(&self, task_id: TaskId) -> Result<Option<Task>> {
        Ok(self.store.load_task(task_id).await?)
    }

    /// List tasks matching `filter`.
    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        Ok(self.store.list_tasks(filter).await?)
    }

    /// Persist a new region and refresh lookups.
    pub async fn add_geofence(&self, fence: Geofence) -> Result<Geofence> {
        fence.shape.validate()?;
        self.store.save_geofence(&fence).await?;
        self.registry.invalidate().await;
        info!(geofence_id = %fence.id, name = %fence.name, "geofence created");
        Ok(fence)
    }

    /// List every region, active or not.
    pub async fn list_geofences(&self) -> Result<Vec<Geofence>> {
        Ok(self.store.list_geofences().await?)
    }

    /// Delete a region and refresh lookups.
    pub async fn remove_geofence(&self, id: GeofenceId) -> Result<()> {
        if self.store.load_geofence(id).await?.is_none() {
            return Err(StoreError::NotFound(format!("geofence {id}")).into());
        }
        self.store.delete_geofence(id).await?;
        self.registry.invalidate().await;
        info!(geofence_id = %id, "geofence removed");
        Ok(())
    }

    /// Every attendance record for one worker, oldest first.
    pub async fn attendance_history(&self, user_id: UserId) -> Result<Vec<AttendanceRecord>> {
        Ok(self.store.list_attendance(user_id).await?)
    }

    /// Current regions, today's attendance, and assigned tasks for one worker.
    pub async fn worker_status(&self, user_id: UserId, at: Time) -> Result<WorkerStatus> {
        let current_geofences = self.tracker.current_regions(user_id).await;
        let attendance = self.store.find_attendance(user_id, self.local_date(at)).await?;
        let filter = TaskFilter {
            assigned_to: Some(user_id),
            ..Default::default()
        };
        let tasks = self.store.list_tasks(&filter).await?;
        let last_sample = self.store.latest_sample(user_id).await?;
        Ok(WorkerStatus {
            current_geofences,
            phase: AttendanceRecord::phase(attendance.as_ref()),
            attendance,
            tasks,
            last_sample,
        })
    }

    fn local_date(&self, at: Time) -> NaiveDate {
        (at + chrono::Duration::minutes(self.config.attendance.utc_offset_minutes as i64))
            .date_naive()
    }
}

fn optional_point(lat: Option<f64>, lng: Option<f64>) -> Result<Option<GeoPoint>> {
    match (lat, lng) {
        (Some(lat), Some(lng)) => Ok(Some(GeoPoint::new(lat, lng)?)),
        _ => Ok(None),
    }
}
