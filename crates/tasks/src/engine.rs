//! Task lifecycle engine.

use std::sync::Arc;

use fieldops_core::{FieldEvent, Requester, Task, TaskId, TaskStatus, Time, UserId};
use fieldops_geo::{distance_meters, GeoPoint};
use fieldops_outbox::Outbox;
use fieldops_store::{Store, StoreError};
use tracing::{debug, info};

use crate::sessions::{accumulated_minutes, begin_session, end_open_session};

/// Error type for task operations.
pub type Result<T> = std::result::Result<T, TaskError>;

/// Errors that can occur during task operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// No such task
    #[error("Task {0} not found")]
    NotFound(TaskId),

    /// The state machine forbids this move
    #[error("Illegal transition from {from} to {to}")]
    InvalidTransition {
        /// Status the task is in
        from: TaskStatus,
        /// Status that was requested
        to: TaskStatus,
    },

    /// The requester is neither the assignee nor an administrator
    #[error("Not the assignee of this task")]
    NotAssigned,

    /// Outside the permitted radius of a strictly gated task
    #[error("Location is {distance_m:.0} m away, allowed {allowed_m:.0} m")]
    LocationOutOfRange {
        /// Distance from the required point
        distance_m: f64,
        /// Permitted radius
        allowed_m: f64,
    },

    /// A location-gated transition came without coordinates
    #[error("This task requires a location")]
    LocationRequired,

    /// A concurrent writer got there first; safe to retry
    #[error("Task was modified concurrently")]
    Concurrency,

    /// Storage failure
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for TaskError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::VersionConflict { .. } => TaskError::Concurrency,
            other => TaskError::Store(other),
        }
    }
}

/// Drives tasks through their lifecycle.
///
/// Every mutation loads the task, applies the transition, and writes it
/// back through the store's version-guarded update. A writer that loses
/// the race observes [`TaskError::Concurrency`] and can safely retry:
/// there is never a duplicate open session or lost pause accounting.
pub struct TaskEngine {
    store: Arc<dyn Store>,
    outbox: Outbox,
}

impl TaskEngine {
    /// Create an engine.
    pub fn new(store: Arc<dyn Store>, outbox: Outbox) -> Self {
        Self { store, outbox }
    }

    /// Begin work on a not-started task. Opens the first session.
    pub async fn start(
        &self,
        task_id: TaskId,
        requester: &Requester,
        location: Option<GeoPoint>,
        at: Time,
    ) -> Result<Task> {
        let mut task = self.load_for(task_id, requester).await?;
        if task.status != TaskStatus::NotStarted {
            return Err(TaskError::InvalidTransition {
                from: task.status,
                to: TaskStatus::InProgress,
            });
        }
        let location_valid = check_location(&task, requester, location)?;

        begin_session(&mut task.time_tracking, at, location_valid);
        task.status = TaskStatus::InProgress;
        task.updated_at = at;
        let task = self.store.update_task_versioned(&task).await?;

        info!(%task_id, user_id = %requester.user_id, location_valid, "task started");
        self.outbox
            .publish(FieldEvent::TaskStarted {
                task_id,
                user_id: requester.user_id,
                at,
            })
            .await;
        Ok(task)
    }

    /// Suspend an in-progress task. Closes the open session.
    pub async fn pause(
        &self,
        task_id: TaskId,
        requester: &Requester,
        location: Option<GeoPoint>,
        at: Time,
    ) -> Result<Task> {
        let mut task = self.load_for(task_id, requester).await?;
        if task.status != TaskStatus::InProgress {
            return Err(TaskError::InvalidTransition {
                from: task.status,
                to: TaskStatus::Paused,
            });
        }
        check_location(&task, requester, location)?;

        end_open_session(&mut task.time_tracking, at);
        task.actual_minutes = task
            .actual_minutes
            .max(accumulated_minutes(&task.time_tracking));
        task.time_tracking.paused_at = Some(at);
        task.status = TaskStatus::Paused;
        task.updated_at = at;
        let task = self.store.update_task_versioned(&task).await?;

        info!(%task_id, minutes = task.actual_minutes, "task paused");
        self.outbox
            .publish(FieldEvent::TaskPaused {
                task_id,
                user_id: requester.user_id,
                at,
            })
            .await;
        Ok(task)
    }

    /// Resume a paused task. Opens a new session.
    pub async fn resume(
        &self,
        task_id: TaskId,
        requester: &Requester,
        location: Option<GeoPoint>,
        at: Time,
    ) -> Result<Task> {
        let mut task = self.load_for(task_id, requester).await?;
        if task.status != TaskStatus::Paused {
            return Err(TaskError::InvalidTransition {
                from: task.status,
                to: TaskStatus::InProgress,
            });
        }
        let location_valid = check_location(&task, requester, location)?;

        settle_pause(&mut task, at);
        begin_session(&mut task.time_tracking, at, location_valid);
        task.status = TaskStatus::InProgress;
        task.updated_at = at;
        let task = self.store.update_task_versioned(&task).await?;

        info!(%task_id, user_id = %requester.user_id, "task resumed");
        self.outbox
            .publish(FieldEvent::TaskResumed {
                task_id,
                user_id: requester.user_id,
                at,
            })
            .await;
        Ok(task)
    }

    /// Finish a task from InProgress or Paused. Terminal.
    pub async fn complete(
        &self,
        task_id: TaskId,
        requester: &Requester,
        location: Option<GeoPoint>,
        at: Time,
    ) -> Result<Task> {
        let mut task = self.load_for(task_id, requester).await?;
        if !task.status.can_transition_to(TaskStatus::Completed) {
            return Err(TaskError::InvalidTransition {
                from: task.status,
                to: TaskStatus::Completed,
            });
        }
        check_location(&task, requester, location)?;

        if task.status == TaskStatus::InProgress {
            end_open_session(&mut task.time_tracking, at);
        } else {
            settle_pause(&mut task, at);
        }
        task.actual_minutes = task
            .actual_minutes
            .max(accumulated_minutes(&task.time_tracking));
        task.status = TaskStatus::Completed;
        task.completed_at = Some(at);
        task.is_approved = !task.approval_required;
        task.updated_at = at;
        let task = self.store.update_task_versioned(&task).await?;

        info!(%task_id, minutes = task.actual_minutes, approved = task.is_approved, "task completed");
        self.outbox
            .publish(FieldEvent::TaskCompleted {
                task_id,
                user_id: requester.user_id,
                actual_minutes: task.actual_minutes,
                at,
            })
            .await;
        Ok(task)
    }

    /// Hand a task to a worker. Administrators only.
    pub async fn assign(
        &self,
        task_id: TaskId,
        user_id: UserId,
        requester: &Requester,
        at: Time,
    ) -> Result<Task> {
        if !requester.is_admin() {
            return Err(TaskError::NotAssigned);
        }
        let mut task = self
            .store
            .load_task(task_id)
            .await?
            .ok_or(TaskError::NotFound(task_id))?;

        task.assigned_to = Some(user_id);
        task.updated_at = at;
        let task = self.store.update_task_versioned(&task).await?;

        info!(%task_id, %user_id, "task assigned");
        self.outbox
            .publish(FieldEvent::TaskAssigned {
                task_id,
                user_id,
                at,
            })
            .await;
        Ok(task)
    }

    async fn load_for(&self, task_id: TaskId, requester: &Requester) -> Result<Task> {
        let task = self
            .store
            .load_task(task_id)
            .await?
            .ok_or(TaskError::NotFound(task_id))?;
        let allowed = match &task.assigned_to {
            Some(assignee) => requester.may_act_for(assignee),
            None => requester.is_admin(),
        };
        if !allowed {
            debug!(%task_id, user_id = %requester.user_id, "transition refused, not the assignee");
            return Err(TaskError::NotAssigned);
        }
        Ok(task)
    }
}

/// Evaluate the location guard for one transition.
///
/// Returns whether the submitted location was inside the permitted
/// radius; advisory tasks record the answer, strict tasks turn a `false`
/// into [`TaskError::LocationOutOfRange`]. Administrators bypass the
/// guard entirely.
fn check_location(
    task: &Task,
    requester: &Requester,
    location: Option<GeoPoint>,
) -> Result<bool> {
    let Some(required) = &task.required_location else {
        return Ok(true);
    };
    if requester.is_admin() {
        return Ok(true);
    }
    let Some(point) = location else {
        return Err(TaskError::LocationRequired);
    };

    let distance_m = distance_meters(point, required.point);
    if distance_m <= required.radius_m {
        Ok(true)
    } else if required.strict {
        Err(TaskError::LocationOutOfRange {
            distance_m,
            allowed_m: required.radius_m,
        })
    } else {
        debug!(task_id = %task.id, distance_m, "out of range, recorded as invalid");
        Ok(false)
    }
}

fn settle_pause(task: &mut Task, at: Time) {
    if let Some(paused_at) = task.time_tracking.paused_at.take() {
        let paused_ms = (at - paused_at).num_milliseconds().max(0);
        task.time_tracking.total_paused_ms += paused_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fieldops_core::RequiredLocation;
    use fieldops_outbox::MemorySink;
    use fieldops_store::MemoryStore;

    fn target() -> GeoPoint {
        GeoPoint { lat: 1.0, lng: 1.0 }
    }

    // One degree of latitude is close to 111.2 km everywhere.
    fn north_of(point: GeoPoint, meters: f64) -> GeoPoint {
        GeoPoint {
            lat: point.lat + meters / 111_194.9,
            lng: point.lng,
        }
    }

    fn at(hour: u32, minute: u32) -> Time {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, 0).unwrap()
    }

    struct Fixture {
        engine: TaskEngine,
        store: Arc<MemoryStore>,
        sink: Arc<MemorySink>,
        worker: Requester,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let engine = TaskEngine::new(store.clone(), Outbox::new(sink.clone()));
        Fixture {
            engine,
            store,
            sink,
            worker: Requester::worker(UserId::new()),
        }
    }

    async fn gated_task(f: &Fixture, strict: bool) -> Task {
        let mut task = Task::new("Inspect pump");
        task.assigned_to = Some(f.worker.user_id);
        task.required_location = Some(RequiredLocation {
            point: target(),
            radius_m: 50.0,
            strict,
            geofence_id: None,
        });
        f.store.save_task(&task).await.unwrap();
        task
    }

    #[tokio::test]
    async fn strict_start_from_80m_is_rejected() {
        let f = fixture().await;
        let task = gated_task(&f, true).await;

        let err = f
            .engine
            .start(task.id, &f.worker, Some(north_of(target(), 80.0)), at(9, 0))
            .await
            .unwrap_err();
        match err {
            TaskError::LocationOutOfRange {
                distance_m,
                allowed_m,
            } => {
                assert!((75.0..85.0).contains(&distance_m));
                assert_eq!(allowed_m, 50.0);
            }
            other => panic!("expected LocationOutOfRange, got {:?}", other),
        }

        // No state change took place.
        let stored = f.store.load_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::NotStarted);
        assert!(stored.time_tracking.sessions.is_empty());
        assert!(f.sink.events().await.is_empty());
    }

    #[tokio::test]
    async fn strict_start_from_30m_opens_a_session() {
        let f = fixture().await;
        let task = gated_task(&f, true).await;

        let started = f
            .engine
            .start(task.id, &f.worker, Some(north_of(target(), 30.0)), at(9, 0))
            .await
            .unwrap();
        assert_eq!(started.status, TaskStatus::InProgress);
        assert_eq!(started.time_tracking.sessions.len(), 1);
        assert!(started.time_tracking.sessions[0].location_valid);
        assert_eq!(started.version, task.version + 1);
    }

    #[tokio::test]
    async fn advisory_start_from_outside_records_invalid() {
        let f = fixture().await;
        let task = gated_task(&f, false).await;

        let started = f
            .engine
            .start(
                task.id,
                &f.worker,
                Some(north_of(target(), 500.0)),
                at(9, 0),
            )
            .await
            .unwrap();
        assert_eq!(started.status, TaskStatus::InProgress);
        assert!(!started.time_tracking.sessions[0].location_valid);
    }

    #[tokio::test]
    async fn gated_start_without_coordinates_is_rejected() {
        let f = fixture().await;
        let task = gated_task(&f, false).await;

        let err = f
            .engine
            .start(task.id, &f.worker, None, at(9, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::LocationRequired));
    }

    #[tokio::test]
    async fn administrators_bypass_the_guard() {
        let f = fixture().await;
        let task = gated_task(&f, true).await;
        let admin = Requester::admin(UserId::new());

        let started = f.engine.start(task.id, &admin, None, at(9, 0)).await.unwrap();
        assert_eq!(started.status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn only_the_assignee_may_transition() {
        let f = fixture().await;
        let task = gated_task(&f, false).await;
        let stranger = Requester::worker(UserId::new());

        let err = f
            .engine
            .start(task.id, &stranger, Some(target()), at(9, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::NotAssigned));
    }

    #[tokio::test]
    async fn minutes_accumulate_and_never_decrease() {
        let f = fixture().await;
        let mut task = Task::new("Calibrate sensor");
        task.assigned_to = Some(f.worker.user_id);
        f.store.save_task(&task).await.unwrap();

        let started = f
            .engine
            .start(task.id, &f.worker, None, at(9, 0))
            .await
            .unwrap();
        assert_eq!(started.actual_minutes, 0);

        let paused = f
            .engine
            .pause(task.id, &f.worker, None, at(9, 30))
            .await
            .unwrap();
        assert_eq!(paused.actual_minutes, 30);
        assert_eq!(paused.time_tracking.paused_at, Some(at(9, 30)));

        let resumed = f
            .engine
            .resume(task.id, &f.worker, None, at(10, 0))
            .await
            .unwrap();
        assert_eq!(resumed.actual_minutes, 30);
        assert_eq!(resumed.time_tracking.total_paused_ms, 30 * 60_000);
        assert!(resumed.time_tracking.paused_at.is_none());

        let completed = f
            .engine
            .complete(task.id, &f.worker, None, at(10, 45))
            .await
            .unwrap();
        assert_eq!(completed.actual_minutes, 75);
        assert_eq!(completed.status, TaskStatus::Completed);
        assert_eq!(completed.completed_at, Some(at(10, 45)));
        assert!(completed.is_approved);
        assert_eq!(completed.time_tracking.sessions.len(), 2);

        let events = f.sink.events().await;
        assert_eq!(events.len(), 4);
        assert!(matches!(
            events[3],
            FieldEvent::TaskCompleted {
                actual_minutes: 75,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn completing_from_paused_settles_the_pause() {
        let f = fixture().await;
        let mut task = Task::new("Swap battery");
        task.assigned_to = Some(f.worker.user_id);
        task.approval_required = true;
        f.store.save_task(&task).await.unwrap();

        f.engine
            .start(task.id, &f.worker, None, at(9, 0))
            .await
            .unwrap();
        f.engine
            .pause(task.id, &f.worker, None, at(9, 10))
            .await
            .unwrap();
        let completed = f
            .engine
            .complete(task.id, &f.worker, None, at(9, 40))
            .await
            .unwrap();

        assert_eq!(completed.actual_minutes, 10);
        assert_eq!(completed.time_tracking.total_paused_ms, 30 * 60_000);
        assert!(!completed.is_approved);
    }

    #[tokio::test]
    async fn completed_is_terminal() {
        let f = fixture().await;
        let mut task = Task::new("Close ticket");
        task.assigned_to = Some(f.worker.user_id);
        f.store.save_task(&task).await.unwrap();

        f.engine
            .start(task.id, &f.worker, None, at(9, 0))
            .await
            .unwrap();
        f.engine
            .complete(task.id, &f.worker, None, at(9, 5))
            .await
            .unwrap();

        let err = f
            .engine
            .resume(task.id, &f.worker, None, at(9, 10))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TaskError::InvalidTransition {
                from: TaskStatus::Completed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn pausing_a_not_started_task_is_illegal() {
        let f = fixture().await;
        let mut task = Task::new("Never started");
        task.assigned_to = Some(f.worker.user_id);
        f.store.save_task(&task).await.unwrap();

        let err = f
            .engine
            .pause(task.id, &f.worker, None, at(9, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn concurrent_starts_produce_exactly_one_session() {
        let f = fixture().await;
        let mut task = Task::new("Contested start");
        task.assigned_to = Some(f.worker.user_id);
        f.store.save_task(&task).await.unwrap();

        let (a, b) = tokio::join!(
            f.engine.start(task.id, &f.worker, None, at(9, 0)),
            f.engine.start(task.id, &f.worker, None, at(9, 0)),
        );

        let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1);

        // The loser saw either the version race or the applied state.
        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(
            loser.unwrap_err(),
            TaskError::Concurrency | TaskError::InvalidTransition { .. }
        ));

        let stored = f.store.load_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.time_tracking.sessions.len(), 1);
        assert!(stored.time_tracking.open_session().is_some());
    }

    #[tokio::test]
    async fn assignment_is_admin_only() {
        let f = fixture().await;
        let task = Task::new("Unowned");
        f.store.save_task(&task).await.unwrap();

        let err = f
            .engine
            .assign(task.id, UserId::new(), &f.worker, at(8, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::NotAssigned));

        let admin = Requester::admin(UserId::new());
        let worker_id = UserId::new();
        let assigned = f
            .engine
            .assign(task.id, worker_id, &admin, at(8, 0))
            .await
            .unwrap();
        assert_eq!(assigned.assigned_to, Some(worker_id));
    }
}
