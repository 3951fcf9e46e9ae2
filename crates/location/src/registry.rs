//! Cached view of the active regions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use fieldops_core::{Geofence, UserId};
use fieldops_geo::GeoPoint;
use fieldops_store::{Result, Store};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Configuration for the registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How long a cached snapshot stays fresh
    pub refresh_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30),
        }
    }
}

impl RegistryConfig {
    /// Set the refresh interval.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }
}

struct Snapshot {
    fences: Vec<Geofence>,
    fetched_at: Instant,
}

/// Read-mostly cache of the active geofences.
///
/// Lookups serve from the snapshot while it is fresh and go back to the
/// store once it ages past the refresh interval. A failed refresh
/// surfaces to the caller rather than silently serving stale data.
pub struct GeofenceRegistry {
    store: Arc<dyn Store>,
    config: RegistryConfig,
    snapshot: RwLock<Option<Snapshot>>,
}

impl GeofenceRegistry {
    /// Create a registry with default configuration.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_config(store, RegistryConfig::default())
    }

    /// Create a registry with explicit configuration.
    pub fn with_config(store: Arc<dyn Store>, config: RegistryConfig) -> Self {
        Self {
            store,
            config,
            snapshot: RwLock::new(None),
        }
    }

    /// All active regions, from cache when fresh.
    pub async fn active(&self) -> Result<Vec<Geofence>> {
        {
            let guard = self.snapshot.read().await;
            if let Some(snap) = guard.as_ref() {
                if snap.fetched_at.elapsed() < self.config.refresh_interval {
                    return Ok(snap.fences.clone());
                }
            }
        }
        self.refresh().await
    }

    /// Active regions containing `point` that admit `user_id`, ordered by ID.
    pub async fn regions_containing(
        &self,
        user_id: UserId,
        point: GeoPoint,
    ) -> Result<Vec<Geofence>> {
        let mut hits: Vec<Geofence> = Vec::new();
        for fence in self.active().await? {
            if !fence.applies_to(user_id) {
                continue;
            }
            match fence.shape.contains(point) {
                Ok(true) => hits.push(fence),
                Ok(false) => {}
                Err(e) => {
                    warn!(geofence_id = %fence.id, error = %e, "skipping region with invalid shape")
                }
            }
        }
        hits.sort_by_key(|g| g.id);
        Ok(hits)
    }

    /// Drop the cached snapshot so the next lookup hits the store.
    pub async fn invalidate(&self) {
        *self.snapshot.write().await = None;
    }

    async fn refresh(&self) -> Result<Vec<Geofence>> {
        let mut guard = self.snapshot.write().await;

        // Another task may have refreshed while we waited for the lock.
        if let Some(snap) = guard.as_ref() {
            if snap.fetched_at.elapsed() < self.config.refresh_interval {
                return Ok(snap.fences.clone());
            }
        }

        let fences: Vec<Geofence> = self
            .store
            .list_geofences()
            .await?
            .into_iter()
            .filter(|g| g.is_active)
            .collect();
        debug!(count = fences.len(), "refreshed region snapshot");

        let out = fences.clone();
        *guard = Some(Snapshot {
            fences,
            fetched_at: Instant::now(),
        });
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldops_geo::Shape;
    use fieldops_store::MemoryStore;

    fn circle_at(lat: f64, lng: f64, radius_m: f64) -> Shape {
        Shape::Circle {
            center: GeoPoint { lat, lng },
            radius_m,
        }
    }

    async fn seeded_store() -> (Arc<MemoryStore>, Geofence, Geofence) {
        let store = Arc::new(MemoryStore::new());

        let active = Geofence::new("Depot", circle_at(40.0, -74.0, 100.0));
        let mut inactive = Geofence::new("Old depot", circle_at(40.0, -74.0, 100.0));
        inactive.is_active = false;

        store.save_geofence(&active).await.unwrap();
        store.save_geofence(&inactive).await.unwrap();
        (store, active, inactive)
    }

    #[tokio::test]
    async fn only_active_regions_are_served() {
        let (store, active, _inactive) = seeded_store().await;
        let registry = GeofenceRegistry::new(store);

        let fences = registry.active().await.unwrap();
        assert_eq!(fences.len(), 1);
        assert_eq!(fences[0].id, active.id);
    }

    #[tokio::test]
    async fn containment_respects_allow_list() {
        let store = Arc::new(MemoryStore::new());
        let insider = UserId::new();
        let outsider = UserId::new();

        let mut fence = Geofence::new("Restricted", circle_at(40.0, -74.0, 100.0));
        fence.allowed_users = Some(vec![insider]);
        store.save_geofence(&fence).await.unwrap();

        let registry = GeofenceRegistry::new(store);
        let point = GeoPoint {
            lat: 40.0,
            lng: -74.0,
        };

        let hits = registry.regions_containing(insider, point).await.unwrap();
        assert_eq!(hits.len(), 1);

        let hits = registry.regions_containing(outsider, point).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn snapshot_serves_until_invalidated() {
        let (store, _active, _inactive) = seeded_store().await;
        let registry = GeofenceRegistry::with_config(
            store.clone(),
            RegistryConfig::default().with_refresh_interval(Duration::from_secs(3600)),
        );

        assert_eq!(registry.active().await.unwrap().len(), 1);

        let late_arrival = Geofence::new("Annex", circle_at(41.0, -74.0, 50.0));
        store.save_geofence(&late_arrival).await.unwrap();

        // Cached snapshot still in effect.
        assert_eq!(registry.active().await.unwrap().len(), 1);

        registry.invalidate().await;
        assert_eq!(registry.active().await.unwrap().len(), 2);
    }
}
