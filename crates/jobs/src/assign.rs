//! Entry-triggered task assignment.

use std::sync::Arc;

use fieldops_core::{
    FieldEvent, Geofence, Task, TaskFilter, TaskStatus, Time, UserId,
};
use fieldops_geo::{distance_meters, GeoPoint};
use fieldops_outbox::Outbox;
use fieldops_store::{Result, Store};
use tracing::{debug, info, warn};

/// Configuration for auto-assignment.
#[derive(Debug, Clone)]
pub struct AssignConfig {
    /// Most tasks handed out per region entry
    pub max_per_entry: usize,

    /// Extra slack around a task's required radius, in meters
    pub buffer_m: f64,
}

impl Default for AssignConfig {
    fn default() -> Self {
        Self {
            max_per_entry: 5,
            buffer_m: 100.0,
        }
    }
}

impl AssignConfig {
    /// Set the per-entry cap.
    pub fn with_max_per_entry(mut self, max: usize) -> Self {
        self.max_per_entry = max;
        self
    }

    /// Set the buffer radius.
    pub fn with_buffer_m(mut self, buffer_m: f64) -> Self {
        self.buffer_m = buffer_m;
        self
    }
}

/// Hands nearby unassigned tasks to workers entering a region.
///
/// Each assignment is a single atomic "only if still unassigned" write,
/// so two workers entering at once never end up on the same task.
pub struct AutoAssignEngine {
    store: Arc<dyn Store>,
    outbox: Outbox,
    config: AssignConfig,
}

impl AutoAssignEngine {
    /// Create an engine with default configuration.
    pub fn new(store: Arc<dyn Store>, outbox: Outbox) -> Self {
        Self::with_config(store, outbox, AssignConfig::default())
    }

    /// Create an engine with explicit configuration.
    pub fn with_config(store: Arc<dyn Store>, outbox: Outbox, config: AssignConfig) -> Self {
        Self {
            store,
            outbox,
            config,
        }
    }

    /// React to the user entering a region.
    ///
    /// Returns the tasks that ended up assigned to the user. Losing a
    /// per-task race to another worker is not an error, the task simply
    /// is not in the returned batch.
    pub async fn on_region_enter(
        &self,
        user_id: UserId,
        fence: &Geofence,
        point: GeoPoint,
        at: Time,
    ) -> Result<Vec<Task>> {
        if !fence.auto_assign_tasks {
            return Ok(Vec::new());
        }

        let filter = TaskFilter {
            status: Some(vec![TaskStatus::NotStarted]),
            unassigned_only: true,
            geofence_id: Some(fence.id),
            ..Default::default()
        };
        let mut candidates = self.store.list_tasks(&filter).await?;
        candidates.sort_by_key(|t| (t.created_at, t.id));

        let mut assigned = Vec::new();
        for task in candidates {
            if assigned.len() >= self.config.max_per_entry {
                break;
            }
            let Some(required) = &task.required_location else {
                continue;
            };
            let distance = distance_meters(point, required.point);
            if distance > required.radius_m + self.config.buffer_m {
                debug!(task_id = %task.id, distance, "candidate too far, skipped");
                continue;
            }

            match self.store.assign_task_if_unassigned(task.id, user_id, at).await {
                Ok(Some(updated)) => {
                    self.outbox
                        .publish(FieldEvent::TaskAssigned {
                            task_id: updated.id,
                            user_id,
                            at,
                        })
                        .await;
                    assigned.push(updated);
                }
                Ok(None) => {
                    debug!(task_id = %task.id, "lost the assignment race, skipped");
                }
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "assignment failed, skipped");
                }
            }
        }

        if !assigned.is_empty() {
            info!(
                %user_id,
                geofence_id = %fence.id,
                count = assigned.len(),
                "auto-assigned tasks on entry"
            );
        }
        Ok(assigned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldops_core::{GeofenceId, RequiredLocation};
    use fieldops_geo::Shape;
    use fieldops_outbox::MemorySink;
    use fieldops_store::MemoryStore;

    fn depot_center() -> GeoPoint {
        GeoPoint {
            lat: 40.0,
            lng: -74.0,
        }
    }

    // One degree of latitude is close to 111.2 km everywhere.
    fn north_of(point: GeoPoint, meters: f64) -> GeoPoint {
        GeoPoint {
            lat: point.lat + meters / 111_194.9,
            lng: point.lng,
        }
    }

    fn assigning_fence() -> Geofence {
        let mut fence = Geofence::new(
            "Depot",
            Shape::Circle {
                center: depot_center(),
                radius_m: 200.0,
            },
        );
        fence.auto_assign_tasks = true;
        fence
    }

    fn task_at(fence_id: GeofenceId, point: GeoPoint, radius_m: f64) -> Task {
        let mut task = Task::new("Field job");
        task.required_location = Some(RequiredLocation {
            point,
            radius_m,
            strict: false,
            geofence_id: Some(fence_id),
        });
        task
    }

    async fn engine_with_sink(store: Arc<MemoryStore>) -> (AutoAssignEngine, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let engine = AutoAssignEngine::new(store, Outbox::new(sink.clone()));
        (engine, sink)
    }

    #[tokio::test]
    async fn assigns_nearby_tasks_up_to_the_cap() {
        let store = Arc::new(MemoryStore::new());
        let fence = assigning_fence();

        for _ in 0..7 {
            store
                .save_task(&task_at(fence.id, depot_center(), 50.0))
                .await
                .unwrap();
        }

        let (engine, sink) = engine_with_sink(store.clone()).await;
        let user_id = UserId::new();
        let assigned = engine
            .on_region_enter(user_id, &fence, depot_center(), chrono::Utc::now())
            .await
            .unwrap();

        assert_eq!(assigned.len(), 5);
        assert!(assigned.iter().all(|t| t.assigned_to == Some(user_id)));
        assert_eq!(sink.events().await.len(), 5);

        let still_open = store
            .list_tasks(&TaskFilter {
                unassigned_only: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(still_open.len(), 2);
    }

    #[tokio::test]
    async fn plain_regions_assign_nothing() {
        let store = Arc::new(MemoryStore::new());
        let mut fence = assigning_fence();
        fence.auto_assign_tasks = false;

        store
            .save_task(&task_at(fence.id, depot_center(), 50.0))
            .await
            .unwrap();

        let (engine, _sink) = engine_with_sink(store).await;
        let assigned = engine
            .on_region_enter(UserId::new(), &fence, depot_center(), chrono::Utc::now())
            .await
            .unwrap();
        assert!(assigned.is_empty());
    }

    #[tokio::test]
    async fn the_buffer_stretches_the_radius() {
        let store = Arc::new(MemoryStore::new());
        let fence = assigning_fence();

        // Radius 50 plus the default 100 m buffer reaches 150 m.
        let reachable = task_at(fence.id, depot_center(), 50.0);
        let too_far = task_at(fence.id, north_of(depot_center(), 400.0), 50.0);
        store.save_task(&reachable).await.unwrap();
        store.save_task(&too_far).await.unwrap();

        let (engine, _sink) = engine_with_sink(store).await;
        let assigned = engine
            .on_region_enter(
                UserId::new(),
                &fence,
                north_of(depot_center(), 120.0),
                chrono::Utc::now(),
            )
            .await
            .unwrap();

        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].id, reachable.id);
    }

    #[tokio::test]
    async fn tasks_of_other_regions_are_ignored() {
        let store = Arc::new(MemoryStore::new());
        let fence = assigning_fence();

        store
            .save_task(&task_at(GeofenceId::new(), depot_center(), 50.0))
            .await
            .unwrap();

        let (engine, _sink) = engine_with_sink(store).await;
        let assigned = engine
            .on_region_enter(UserId::new(), &fence, depot_center(), chrono::Utc::now())
            .await
            .unwrap();
        assert!(assigned.is_empty());
    }

    #[tokio::test]
    async fn simultaneous_entries_never_share_a_task() {
        let store = Arc::new(MemoryStore::new());
        let fence = assigning_fence();
        let task = task_at(fence.id, depot_center(), 50.0);
        store.save_task(&task).await.unwrap();

        let (engine, _sink) = engine_with_sink(store.clone()).await;
        let alice = UserId::new();
        let bob = UserId::new();
        let now = chrono::Utc::now();

        let (a, b) = tokio::join!(
            engine.on_region_enter(alice, &fence, depot_center(), now),
            engine.on_region_enter(bob, &fence, depot_center(), now),
        );

        let total = a.unwrap().len() + b.unwrap().len();
        assert_eq!(total, 1);

        let stored = store.load_task(task.id).await.unwrap().unwrap();
        assert!(matches!(stored.assigned_to, Some(u) if u == alice || u == bob));
    }
}
