//! Per-user region membership.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Duration;
use dashmap::DashMap;
use fieldops_core::{FieldEvent, Geofence, GeofenceId, LocationSample, Time, UserId};
use fieldops_outbox::Outbox;
use fieldops_store::{Result, Store};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::registry::GeofenceRegistry;

/// Configuration for the tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// How far behind the newest applied sample a late arrival may be
    /// and still be applied
    pub out_of_order_tolerance: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            out_of_order_tolerance: Duration::zero(),
        }
    }
}

impl TrackerConfig {
    /// Set the out-of-order tolerance.
    pub fn with_out_of_order_tolerance(mut self, tolerance: Duration) -> Self {
        self.out_of_order_tolerance = tolerance;
        self
    }
}

#[derive(Default)]
struct MembershipState {
    regions: BTreeSet<GeofenceId>,
    last_sample_at: Option<Time>,
}

/// What happened to one sample.
#[derive(Debug)]
pub enum SampleOutcome {
    /// The sample advanced the user's membership.
    Applied {
        /// Regions the user was not inside before this sample
        entered: Vec<Geofence>,
        /// Regions the user was inside before and no longer is
        exited: Vec<GeofenceId>,
        /// Membership after the sample, ordered by ID
        current: Vec<GeofenceId>,
    },
    /// The sample was older than the last applied one and was dropped.
    Stale,
}

/// Turns a stream of location samples into enter/exit transitions.
///
/// State is kept per user behind a per-user lock: samples for one user
/// apply strictly one at a time while different users proceed in
/// parallel. A region can never appear as both entered and exited for
/// the same sample.
pub struct MembershipTracker {
    store: Arc<dyn Store>,
    registry: Arc<GeofenceRegistry>,
    outbox: Outbox,
    config: TrackerConfig,
    states: DashMap<UserId, Arc<Mutex<MembershipState>>>,
}

impl MembershipTracker {
    /// Create a tracker with default configuration.
    pub fn new(store: Arc<dyn Store>, registry: Arc<GeofenceRegistry>, outbox: Outbox) -> Self {
        Self::with_config(store, registry, outbox, TrackerConfig::default())
    }

    /// Create a tracker with explicit configuration.
    pub fn with_config(
        store: Arc<dyn Store>,
        registry: Arc<GeofenceRegistry>,
        outbox: Outbox,
        config: TrackerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            outbox,
            config,
            states: DashMap::new(),
        }
    }

    /// Regions the user is currently known to be inside, ordered by ID.
    pub async fn current_regions(&self, user_id: UserId) -> Vec<GeofenceId> {
        let state = match self.states.get(&user_id) {
            None => return Vec::new(),
            Some(entry) => entry.value().clone(),
        };
        let guard = state.lock().await;
        guard.regions.iter().copied().collect()
    }

    /// Apply one sample to the user's membership.
    ///
    /// Nothing is committed unless the sample itself persists: a store or
    /// registry failure leaves the previous membership in place and the
    /// error goes back to the caller.
    pub async fn process_sample(&self, sample: &LocationSample) -> Result<SampleOutcome> {
        let state = self.state_for(sample.user_id);
        let mut state = state.lock().await;

        if let Some(last) = state.last_sample_at {
            if sample.captured_at < last - self.config.out_of_order_tolerance {
                debug!(
                    user_id = %sample.user_id,
                    captured_at = %sample.captured_at,
                    "dropping out-of-order sample"
                );
                return Ok(SampleOutcome::Stale);
            }
        }

        let containing = self
            .registry
            .regions_containing(sample.user_id, sample.point)
            .await?;
        let new_set: BTreeSet<GeofenceId> = containing.iter().map(|g| g.id).collect();

        let entered: Vec<Geofence> = containing
            .iter()
            .filter(|g| !state.regions.contains(&g.id))
            .cloned()
            .collect();
        let exited: Vec<GeofenceId> = state.regions.difference(&new_set).copied().collect();

        self.store.save_sample(sample).await?;

        for fence in &entered {
            self.outbox
                .publish(FieldEvent::RegionEntered {
                    user_id: sample.user_id,
                    geofence_id: fence.id,
                    at: sample.captured_at,
                })
                .await;
        }
        for id in &exited {
            self.outbox
                .publish(FieldEvent::RegionExited {
                    user_id: sample.user_id,
                    geofence_id: *id,
                    at: sample.captured_at,
                })
                .await;
        }

        if !entered.is_empty() || !exited.is_empty() {
            info!(
                user_id = %sample.user_id,
                entered = entered.len(),
                exited = exited.len(),
                "region membership changed"
            );
        }

        state.regions = new_set;
        state.last_sample_at = Some(match state.last_sample_at {
            Some(last) => last.max(sample.captured_at),
            None => sample.captured_at,
        });

        Ok(SampleOutcome::Applied {
            entered,
            exited,
            current: state.regions.iter().copied().collect(),
        })
    }

    fn state_for(&self, user_id: UserId) -> Arc<Mutex<MembershipState>> {
        self.states.entry(user_id).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldops_geo::{GeoPoint, Shape};
    use fieldops_outbox::MemorySink;
    use fieldops_store::MemoryStore;

    // One degree of latitude is close to 111.2 km everywhere.
    fn north_of(point: GeoPoint, meters: f64) -> GeoPoint {
        GeoPoint {
            lat: point.lat + meters / 111_194.9,
            lng: point.lng,
        }
    }

    fn depot_center() -> GeoPoint {
        GeoPoint {
            lat: 40.0,
            lng: -74.0,
        }
    }

    async fn tracker_with_depot() -> (MembershipTracker, Arc<MemorySink>, Geofence) {
        let store = Arc::new(MemoryStore::new());
        let fence = Geofence::new(
            "Depot",
            Shape::Circle {
                center: depot_center(),
                radius_m: 100.0,
            },
        );
        store.save_geofence(&fence).await.unwrap();

        let registry = Arc::new(GeofenceRegistry::new(store.clone()));
        let sink = Arc::new(MemorySink::new());
        let tracker =
            MembershipTracker::new(store, registry, Outbox::new(sink.clone()));
        (tracker, sink, fence)
    }

    #[tokio::test]
    async fn enter_then_exit_across_the_boundary() {
        let (tracker, sink, fence) = tracker_with_depot().await;
        let user_id = UserId::new();

        // 50 m from the center of a 100 m circle: inside.
        let inside = LocationSample::new(user_id, north_of(depot_center(), 50.0), 10.0);
        match tracker.process_sample(&inside).await.unwrap() {
            SampleOutcome::Applied {
                entered,
                exited,
                current,
            } => {
                assert_eq!(entered.len(), 1);
                assert_eq!(entered[0].id, fence.id);
                assert!(exited.is_empty());
                assert_eq!(current, vec![fence.id]);
            }
            other => panic!("expected Applied, got {:?}", other),
        }

        // 150 m out: exited.
        let mut outside = LocationSample::new(user_id, north_of(depot_center(), 150.0), 10.0);
        outside.captured_at = inside.captured_at + Duration::seconds(30);
        match tracker.process_sample(&outside).await.unwrap() {
            SampleOutcome::Applied {
                entered,
                exited,
                current,
            } => {
                assert!(entered.is_empty());
                assert_eq!(exited, vec![fence.id]);
                assert!(current.is_empty());
            }
            other => panic!("expected Applied, got {:?}", other),
        }

        let events = sink.events().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], FieldEvent::RegionEntered { .. }));
        assert!(matches!(events[1], FieldEvent::RegionExited { .. }));
    }

    #[tokio::test]
    async fn repeated_sample_inside_is_not_a_second_enter() {
        let (tracker, sink, _fence) = tracker_with_depot().await;
        let user_id = UserId::new();

        let first = LocationSample::new(user_id, north_of(depot_center(), 20.0), 10.0);
        tracker.process_sample(&first).await.unwrap();

        let mut second = LocationSample::new(user_id, north_of(depot_center(), 30.0), 10.0);
        second.captured_at = first.captured_at + Duration::seconds(30);
        match tracker.process_sample(&second).await.unwrap() {
            SampleOutcome::Applied { entered, exited, .. } => {
                assert!(entered.is_empty());
                assert!(exited.is_empty());
            }
            other => panic!("expected Applied, got {:?}", other),
        }

        assert_eq!(sink.events().await.len(), 1);
    }

    #[tokio::test]
    async fn out_of_order_sample_is_dropped() {
        let (tracker, sink, _fence) = tracker_with_depot().await;
        let user_id = UserId::new();

        let current = LocationSample::new(user_id, north_of(depot_center(), 20.0), 10.0);
        tracker.process_sample(&current).await.unwrap();

        // Arrives later but was captured a minute earlier, outside the fence.
        let mut late = LocationSample::new(user_id, north_of(depot_center(), 500.0), 10.0);
        late.captured_at = current.captured_at - Duration::seconds(60);
        assert!(matches!(
            tracker.process_sample(&late).await.unwrap(),
            SampleOutcome::Stale
        ));

        // Membership unchanged, no exit event.
        assert_eq!(tracker.current_regions(user_id).await.len(), 1);
        assert_eq!(sink.events().await.len(), 1);
    }

    #[tokio::test]
    async fn tolerance_admits_slightly_late_samples() {
        let store = Arc::new(MemoryStore::new());
        let fence = Geofence::new(
            "Depot",
            Shape::Circle {
                center: depot_center(),
                radius_m: 100.0,
            },
        );
        store.save_geofence(&fence).await.unwrap();
        let registry = Arc::new(GeofenceRegistry::new(store.clone()));
        let tracker = MembershipTracker::with_config(
            store,
            registry,
            Outbox::disabled(),
            TrackerConfig::default().with_out_of_order_tolerance(Duration::seconds(120)),
        );

        let user_id = UserId::new();
        let current = LocationSample::new(user_id, north_of(depot_center(), 20.0), 10.0);
        tracker.process_sample(&current).await.unwrap();

        let mut late = LocationSample::new(user_id, north_of(depot_center(), 25.0), 10.0);
        late.captured_at = current.captured_at - Duration::seconds(60);
        assert!(matches!(
            tracker.process_sample(&late).await.unwrap(),
            SampleOutcome::Applied { .. }
        ));
    }

    #[tokio::test]
    async fn users_are_tracked_independently() {
        let (tracker, _sink, fence) = tracker_with_depot().await;
        let alice = UserId::new();
        let bob = UserId::new();

        let inside = LocationSample::new(alice, north_of(depot_center(), 10.0), 10.0);
        tracker.process_sample(&inside).await.unwrap();

        assert_eq!(tracker.current_regions(alice).await, vec![fence.id]);
        assert!(tracker.current_regions(bob).await.is_empty());
    }
}
