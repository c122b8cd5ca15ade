//! Location → administrative region resolver.
//!
//! The join key between a subscriber's saved location and the hazard feed's
//! per-region alert entries. Backed by a persistent mapping table mirrored
//! in memory: the mirror is hydrated once at startup and updated on every
//! write, so steady-state resolves never touch the database or the network.
//! A mapping, once written, is authoritative — the external geocoder is
//! consulted at most once per distinct (normalized) location name.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::repository::Repository;
use crate::services::geocoding::GeocodingProvider;

/// Normalization applied to every mapping key before lookup or persistence.
/// Display strings keep the user's spelling; only the key is folded.
pub fn normalize_location(location: &str) -> String {
    location.trim().to_lowercase()
}

pub struct RegionResolver {
    repository: Arc<Repository>,
    geocoder: Arc<dyn GeocodingProvider>,
    mirror: RwLock<HashMap<String, String>>,
}

impl RegionResolver {
    /// Build the resolver, hydrating the mirror from the persisted table.
    pub async fn load(
        repository: Arc<Repository>,
        geocoder: Arc<dyn GeocodingProvider>,
    ) -> Result<Self, sqlx::Error> {
        let mappings = repository.all_region_mappings().await?;
        tracing::info!("Region resolver loaded {} persisted mappings", mappings.len());

        Ok(Self {
            repository,
            geocoder,
            mirror: RwLock::new(mappings.into_iter().collect()),
        })
    }

    /// Resolve a location name to its region, or `None` if neither the
    /// persisted mapping nor the geocoder can place it.
    pub async fn resolve(&self, location: &str) -> Option<String> {
        let key = normalize_location(location);
        if key.is_empty() {
            return None;
        }

        if let Some(region) = self.mirror.read().await.get(&key) {
            return Some(region.clone());
        }

        let place = match self.geocoder.lookup(location.trim()).await {
            Ok(Some(place)) => place,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(location, "Geocoding lookup failed: {}", err);
                return None;
            }
        };

        let region = place.region?;

        // Persist ahead of returning success. A write failure is logged and
        // the mirror still takes the mapping; the next successful resolve of
        // a new location will find the table writable again or not.
        if let Err(err) = self.repository.insert_region_mapping(&key, &region).await {
            tracing::error!(location = %key, "Failed to persist region mapping: {}", err);
        }
        self.mirror.write().await.insert(key, region.clone());

        Some(region)
    }

    /// Number of mappings currently mirrored.
    pub async fn mapping_count(&self) -> usize {
        self.mirror.read().await.len()
    }
}
