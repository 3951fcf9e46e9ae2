//! JSON file storage implementation.
//!
//! Stores data as JSON files under a `.fieldops` directory, one file per
//! object. Tasks carry their version counter inside the document, and a
//! store-level lock serializes the guarded task writes, so the
//! compare-and-set guarantees hold within a single process.

use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use fieldops_core::{
    AttendanceRecord, Geofence, GeofenceId, LocationSample, Task, TaskFilter, TaskId, Time, UserId,
};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::trait_::{Result, Store, StoreError};

/// File-based JSON storage backend.
pub struct JsonStore {
    root: std::path::PathBuf,
    task_lock: Mutex<()>,
}

impl JsonStore {
    /// Create storage. This will create the subdirectories needed under
    /// `root` if they do not exist yet.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("geofences")).await?;
        fs::create_dir_all(root.join("tasks")).await?;
        fs::create_dir_all(root.join("attendance")).await?;
        fs::create_dir_all(root.join("samples")).await?;

        debug!(root = %root.display(), "opened JSON store");

        Ok(Self {
            root,
            task_lock: Mutex::new(()),
        })
    }

    fn geofence_path(&self, id: GeofenceId) -> std::path::PathBuf {
        self.root.join("geofences").join(format!("{}.json", id))
    }
    fn task_path(&self, id: TaskId) -> std::path::PathBuf {
        self.root.join("tasks").join(format!("{}.json", id))
    }
    fn attendance_path(&self, user_id: UserId, date: NaiveDate) -> std::path::PathBuf {
        self.root
            .join("attendance")
            .join(format!("{}-{}.json", user_id, date))
    }
    fn sample_path(&self, user_id: UserId) -> std::path::PathBuf {
        self.root.join("samples").join(format!("{}.json", user_id))
    }
}

#[async_trait]
impl Store for JsonStore {
    async fn save_geofence(&self, geofence: &Geofence) -> Result<()> {
        write_json(&self.geofence_path(geofence.id), geofence).await
    }

    async fn load_geofence(&self, id: GeofenceId) -> Result<Option<Geofence>> {
        read_json(&self.geofence_path(id)).await
    }

    async fn list_geofences(&self) -> Result<Vec<Geofence>> {
        list_dir(&self.root.join("geofences")).await
    }

    async fn delete_geofence(&self, id: GeofenceId) -> Result<()> {
        fs::remove_file(self.geofence_path(id)).await.or_else(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Ok(())
            } else {
                Err(e)
            }
        })?;
        Ok(())
    }

    async fn save_task(&self, task: &Task) -> Result<()> {
        let _guard = self.task_lock.lock().await;
        write_json(&self.task_path(task.id), task).await
    }

    async fn load_task(&self, id: TaskId) -> Result<Option<Task>> {
        read_json(&self.task_path(id)).await
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let all: Vec<Task> = list_dir(&self.root.join("tasks")).await?;
        Ok(all.into_iter().filter(|t| filter.matches(t)).collect())
    }

    async fn update_task_versioned(&self, task: &Task) -> Result<Task> {
        let _guard = self.task_lock.lock().await;

        let current: Task = read_json(&self.task_path(task.id))
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("task {}", task.id)))?;
        if current.version != task.version {
            return Err(StoreError::VersionConflict {
                expected: task.version,
                actual: current.version,
            });
        }

        let mut updated = task.clone();
        updated.version = task.version + 1;
        write_json(&self.task_path(task.id), &updated).await?;
        Ok(updated)
    }

    async fn assign_task_if_unassigned(
        &self,
        id: TaskId,
        user_id: UserId,
        now: Time,
    ) -> Result<Option<Task>> {
        let _guard = self.task_lock.lock().await;

        let mut task: Task = read_json(&self.task_path(id))
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("task {}", id)))?;
        if task.assigned_to.is_some() {
            return Ok(None);
        }

        task.assigned_to = Some(user_id);
        task.updated_at = now;
        task.version += 1;
        write_json(&self.task_path(id), &task).await?;
        Ok(Some(task))
    }

    async fn save_attendance(&self, record: &AttendanceRecord) -> Result<()> {
        write_json(&self.attendance_path(record.user_id, record.date), record).await
    }

    async fn find_attendance(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>> {
        read_json(&self.attendance_path(user_id, date)).await
    }

    async fn list_attendance(&self, user_id: UserId) -> Result<Vec<AttendanceRecord>> {
        let all: Vec<AttendanceRecord> = list_dir(&self.root.join("attendance")).await?;
        let mut records: Vec<AttendanceRecord> = all
            .into_iter()
            .filter(|r| r.user_id == user_id)
            .collect();
        records.sort_by_key(|r| r.date);
        Ok(records)
    }

    async fn save_sample(&self, sample: &LocationSample) -> Result<()> {
        write_json(&self.sample_path(sample.user_id), sample).await
    }

    async fn latest_sample(&self, user_id: UserId) -> Result<Option<LocationSample>> {
        read_json(&self.sample_path(user_id)).await
    }
}

async fn write_json<T: serde::Serialize>(path: &std::path::Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json.as_bytes()).await?;
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &std::path::Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        if let Ok(Some(item)) = read_json(&entry.path()).await {
            items.push(item);
        }
    }
    Ok(items)
}
