//! In-memory storage backend.
//!
//! Backs tests and ephemeral deployments. Entry-level locking in the
//! underlying maps makes the guarded task writes atomic without a
//! store-wide lock.

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use fieldops_core::{
    AttendanceRecord, Geofence, GeofenceId, LocationSample, Task, TaskFilter, TaskId, Time, UserId,
};

use crate::trait_::{Result, Store, StoreError};

/// Non-persistent [`Store`] backed by concurrent maps.
#[derive(Default)]
pub struct MemoryStore {
    geofences: DashMap<GeofenceId, Geofence>,
    tasks: DashMap<TaskId, Task>,
    attendance: DashMap<(UserId, NaiveDate), AttendanceRecord>,
    samples: DashMap<UserId, LocationSample>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_geofence(&self, geofence: &Geofence) -> Result<()> {
        self.geofences.insert(geofence.id, geofence.clone());
        Ok(())
    }

    async fn load_geofence(&self, id: GeofenceId) -> Result<Option<Geofence>> {
        Ok(self.geofences.get(&id).map(|g| g.clone()))
    }

    async fn list_geofences(&self) -> Result<Vec<Geofence>> {
        Ok(self.geofences.iter().map(|g| g.clone()).collect())
    }

    async fn delete_geofence(&self, id: GeofenceId) -> Result<()> {
        self.geofences.remove(&id);
        Ok(())
    }

    async fn save_task(&self, task: &Task) -> Result<()> {
        self.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn load_task(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.tasks.get(&id).map(|t| t.clone()))
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        Ok(self
            .tasks
            .iter()
            .filter(|t| filter.matches(t))
            .map(|t| t.clone())
            .collect())
    }

    async fn update_task_versioned(&self, task: &Task) -> Result<Task> {
        let mut entry = self
            .tasks
            .get_mut(&task.id)
            .ok_or_else(|| StoreError::NotFound(format!("task {}", task.id)))?;
        if entry.version != task.version {
            return Err(StoreError::VersionConflict {
                expected: task.version,
                actual: entry.version,
            });
        }
        let mut updated = task.clone();
        updated.version = task.version + 1;
        *entry = updated.clone();
        Ok(updated)
    }

    async fn assign_task_if_unassigned(
        &self,
        id: TaskId,
        user_id: UserId,
        now: Time,
    ) -> Result<Option<Task>> {
        let mut entry = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("task {}", id)))?;
        if entry.assigned_to.is_some() {
            return Ok(None);
        }
        entry.assigned_to = Some(user_id);
        entry.updated_at = now;
        entry.version += 1;
        Ok(Some(entry.clone()))
    }

    async fn save_attendance(&self, record: &AttendanceRecord) -> Result<()> {
        self.attendance
            .insert((record.user_id, record.date), record.clone());
        Ok(())
    }

    async fn find_attendance(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>> {
        Ok(self.attendance.get(&(user_id, date)).map(|r| r.clone()))
    }

    async fn list_attendance(&self, user_id: UserId) -> Result<Vec<AttendanceRecord>> {
        let mut records: Vec<AttendanceRecord> = self
            .attendance
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.clone())
            .collect();
        records.sort_by_key(|r| r.date);
        Ok(records)
    }

    async fn save_sample(&self, sample: &LocationSample) -> Result<()> {
        self.samples.insert(sample.user_id, sample.clone());
        Ok(())
    }

    async fn latest_sample(&self, user_id: UserId) -> Result<Option<LocationSample>> {
        Ok(self.samples.get(&user_id).map(|s| s.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldops_geo::{GeoPoint, Shape};

    fn create_test_task() -> Task {
        Task::new("Inspect pump station")
    }

    fn create_test_geofence() -> Geofence {
        Geofence::new(
            "Depot",
            Shape::Circle {
                center: GeoPoint {
                    lat: 40.0,
                    lng: -74.0,
                },
                radius_m: 100.0,
            },
        )
    }

    #[tokio::test]
    async fn task_roundtrip() {
        let store = MemoryStore::new();
        let task = create_test_task();

        store.save_task(&task).await.unwrap();
        let loaded = store.load_task(task.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, task.title);
        assert_eq!(loaded.version, 0);
    }

    #[tokio::test]
    async fn versioned_update_rejects_stale_writer() {
        let store = MemoryStore::new();
        let task = create_test_task();
        store.save_task(&task).await.unwrap();

        // First writer wins and bumps the version.
        let winner = store.update_task_versioned(&task).await.unwrap();
        assert_eq!(winner.version, 1);

        // Second writer still holds version 0.
        let err = store.update_task_versioned(&task).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict {
                expected: 0,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn conditional_assign_is_first_come_first_served() {
        let store = MemoryStore::new();
        let task = create_test_task();
        store.save_task(&task).await.unwrap();

        let first = UserId::new();
        let second = UserId::new();
        let now = chrono::Utc::now();

        let assigned = store
            .assign_task_if_unassigned(task.id, first, now)
            .await
            .unwrap();
        assert_eq!(assigned.unwrap().assigned_to, Some(first));

        let refused = store
            .assign_task_if_unassigned(task.id, second, now)
            .await
            .unwrap();
        assert!(refused.is_none());

        let stored = store.load_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.assigned_to, Some(first));
    }

    #[tokio::test]
    async fn geofence_roundtrip_and_delete() {
        let store = MemoryStore::new();
        let geofence = create_test_geofence();

        store.save_geofence(&geofence).await.unwrap();
        assert!(store.load_geofence(geofence.id).await.unwrap().is_some());

        store.delete_geofence(geofence.id).await.unwrap();
        assert!(store.load_geofence(geofence.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn attendance_is_unique_per_worker_day() {
        let store = MemoryStore::new();
        let user_id = UserId::new();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let mut record = AttendanceRecord {
            id: fieldops_core::AttendanceId::new(),
            user_id,
            date,
            check_in: None,
            check_out: None,
            break_ms: 0,
            total_hours: 0.0,
            overtime_hours: 0.0,
            status: fieldops_core::AttendanceStatus::Present,
            is_valid_location: true,
        };
        store.save_attendance(&record).await.unwrap();

        record.total_hours = 8.0;
        store.save_attendance(&record).await.unwrap();

        let records = store.list_attendance(user_id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].total_hours, 8.0);
    }
}
