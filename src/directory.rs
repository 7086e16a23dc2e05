//! # Station Directory Service
//!
//! Owns the in-memory station catalog and answers the two directory queries:
//! free-text [`StationDirectory::search`] and coordinate-based
//! [`StationDirectory::nearest`]. Composes three collaborators:
//!
//! - a [`CatalogFetcher`] for the network refresh,
//! - a [`CacheStore`] for the disk-backed catalog and the active selection,
//! - a [`FetchCoordinator`] so concurrent cold-cache queries share one fetch.
//!
//! ## Freshness Policy
//!
//! The catalog is fresh while `last_refreshed` is within the TTL (default
//! 7 days). On construction the disk cache is consulted once: a fresh copy
//! populates the catalog with no network call; a stale copy is *not* used,
//! because serving week-old station data past its TTL silently is worse than an
//! empty catalog that the first query refreshes. A corrupt or absent cache
//! likewise starts empty.
//!
//! Every query checks freshness first. A stale or empty catalog routes the
//! caller through the coordinator before filtering; whatever catalog exists
//! after that attempt is filtered; a failed refresh degrades to stale (or
//! empty) results, never to an error.
//!
//! ## Refresh
//!
//! On success the catalog is replaced wholesale, `last_refreshed` is set,
//! and both are persisted. On failure nothing changes: stale data is
//! preferred over no data, and the unchanged `last_refreshed` ensures the
//! next query tries again.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::cache::{self, CacheStore, Selection};
use crate::noaa::CatalogFetcher;
use crate::singleflight::FetchCoordinator;
use crate::{Catalog, Station, TideError};

/// Maximum results returned by [`StationDirectory::search`].
pub const SEARCH_LIMIT: usize = 20;

/// Maximum results returned by [`StationDirectory::nearest`].
pub const NEAREST_LIMIT: usize = 10;

/// Default catalog staleness TTL: 7 days.
pub const STALENESS_TTL_DAYS: i64 = 7;

/// Directory of tide stations with a disk cache and coalesced refresh.
pub struct StationDirectory<F: CatalogFetcher, S: CacheStore> {
    fetcher: F,
    store: S,
    catalog: Mutex<Catalog>,
    coordinator: FetchCoordinator,
    ttl: Duration,
}

impl<F: CatalogFetcher, S: CacheStore> StationDirectory<F, S> {
    /// Build a directory with the default 7-day TTL, seeding the catalog
    /// from the disk cache when the cached copy is still fresh.
    pub fn new(fetcher: F, store: S) -> Self {
        Self::with_ttl(fetcher, store, Duration::days(STALENESS_TTL_DAYS))
    }

    /// [`StationDirectory::new`] with an explicit staleness TTL.
    pub fn with_ttl(fetcher: F, store: S, ttl: Duration) -> Self {
        let catalog = match cache::load_catalog(&store) {
            Some(cached) if is_fresh(cached.last_refreshed, ttl, Utc::now()) => {
                tracing::info!(
                    stations = cached.stations.len(),
                    "seeded catalog from fresh disk cache"
                );
                cached
            }
            Some(_) => {
                // Past its TTL: keep it on disk but start empty so the
                // first query forces a refresh.
                tracing::info!("disk catalog is stale; deferring to network refresh");
                Catalog::default()
            }
            None => Catalog::default(),
        };

        StationDirectory {
            fetcher,
            store,
            catalog: Mutex::new(catalog),
            coordinator: FetchCoordinator::new(),
            ttl,
        }
    }

    /// Free-text station search: case-insensitive substring match against
    /// name or region, in stable catalog order, capped at [`SEARCH_LIMIT`].
    /// An empty query matches everything.
    ///
    /// Never fails: if the catalog needed a refresh and the refresh failed,
    /// the filter runs over whatever catalog remains (possibly empty).
    pub async fn search(&self, query: &str) -> Vec<Station> {
        self.ensure_ready().await;

        let needle = query.trim().to_lowercase();
        let catalog = self.catalog.lock().await;
        catalog
            .stations
            .iter()
            .filter(|station| {
                needle.is_empty()
                    || station.name.to_lowercase().contains(&needle)
                    || station
                        .region
                        .as_deref()
                        .is_some_and(|region| region.to_lowercase().contains(&needle))
            })
            .take(SEARCH_LIMIT)
            .cloned()
            .collect()
    }

    /// Stations nearest to a coordinate, ascending by great-circle
    /// distance, capped at [`NEAREST_LIMIT`]. Same freshness gating and
    /// degradation as [`StationDirectory::search`].
    pub async fn nearest(&self, latitude: f64, longitude: f64) -> Vec<Station> {
        self.ensure_ready().await;

        let catalog = self.catalog.lock().await;
        let mut ranked: Vec<(f64, &Station)> = catalog
            .stations
            .iter()
            .map(|station| {
                (
                    haversine_miles(latitude, longitude, station.latitude, station.longitude),
                    station,
                )
            })
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
        ranked
            .into_iter()
            .take(NEAREST_LIMIT)
            .map(|(_, station)| station.clone())
            .collect()
    }

    /// Look up a single station by its source-assigned id. Same freshness
    /// gating as the other queries.
    pub async fn station_by_id(&self, id: &str) -> Option<Station> {
        self.ensure_ready().await;
        let catalog = self.catalog.lock().await;
        catalog.stations.iter().find(|s| s.id == id).cloned()
    }

    /// Persist `station` as the active selection after validating it.
    ///
    /// A missing id or non-finite/out-of-range coordinates are rejected
    /// with [`TideError::InvalidSelection`] before anything is written. A
    /// failed cache write is logged but not surfaced; the selection still
    /// holds for this process, and the next write will retry.
    pub fn select_station(&self, station: &Station) -> Result<(), TideError> {
        if station.id.trim().is_empty() {
            return Err(TideError::InvalidSelection(
                "station has no id".to_string(),
            ));
        }
        let lat_ok = station.latitude.is_finite() && (-90.0..=90.0).contains(&station.latitude);
        let lng_ok = station.longitude.is_finite() && (-180.0..=180.0).contains(&station.longitude);
        if !lat_ok || !lng_ok {
            return Err(TideError::InvalidSelection(format!(
                "station {} has invalid coordinates ({}, {})",
                station.id, station.latitude, station.longitude
            )));
        }

        let selection = Selection {
            name: station.name.clone(),
            lat: station.latitude,
            lng: station.longitude,
            station_id: station.id.clone(),
        };
        if let Err(e) = cache::save_json(&self.store, cache::SELECTION_KEY, &selection) {
            tracing::warn!(error = %e, "failed to persist station selection");
        }
        Ok(())
    }

    /// The persisted active selection, if one exists and decodes.
    pub fn active_selection(&self) -> Option<Selection> {
        cache::load_json(&self.store, cache::SELECTION_KEY)
    }

    /// Route through the coordinator when the catalog is not fresh. Refresh
    /// failures are logged here and swallowed: queries degrade, they do not
    /// error.
    async fn ensure_ready(&self) {
        {
            let catalog = self.catalog.lock().await;
            if is_fresh(catalog.last_refreshed, self.ttl, Utc::now()) {
                return;
            }
        }

        if let Err(err) = self.coordinator.ensure_fresh(|| self.refresh()).await {
            tracing::warn!(%err, "catalog refresh failed; serving existing catalog");
        }
    }

    /// The single-flight trigger: fetch the full catalog, replace the
    /// in-memory copy wholesale, persist. On failure the existing catalog
    /// and `last_refreshed` are left untouched.
    async fn refresh(&self) -> Result<(), TideError> {
        let stations = self.fetcher.fetch_station_catalog().await?;
        let fresh = Catalog {
            stations,
            last_refreshed: Some(Utc::now()),
        };

        if let Err(e) = cache::save_json(&self.store, cache::CATALOG_KEY, &fresh) {
            tracing::warn!(error = %e, "failed to persist catalog; keeping in-memory copy");
        }

        *self.catalog.lock().await = fresh;
        Ok(())
    }
}

/// Fresh iff the catalog has ever been refreshed and that refresh is within
/// the TTL. `None` (never refreshed, or stale disk copy discarded) is stale.
fn is_fresh(last_refreshed: Option<DateTime<Utc>>, ttl: Duration, now: DateTime<Utc>) -> bool {
    match last_refreshed {
        Some(at) => now - at < ttl,
        None => false,
    }
}

/// Great-circle distance between two WGS84 coordinates, in miles.
fn haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_MILES: f64 = 3958.8;
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_MILES * c
}
