//! # Cache Store Boundary
//!
//! Persistence for the station catalog and the active station selection.
//! The store itself is an opaque get/set of bytes keyed by name: callers
//! decide the encoding (JSON here, via serde). Keeping the trait byte-level
//! means the directory service never depends on where or how the bytes live.
//!
//! ## Failure Posture
//!
//! - **Reads**: anything that prevents returning valid bytes (missing file,
//!   permissions, truncation) is a miss, not an error. A decode failure on
//!   loaded bytes is corruption; [`load_json`] logs it and reports a miss so
//!   corruption never propagates to a query caller.
//! - **Writes**: failures are surfaced to the caller, but the directory
//!   treats a failed cache write as non-fatal; fresh in-memory data beats
//!   no data, and the next successful refresh will try the write again.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{Catalog, TideError};

/// Store key for the persisted station catalog.
pub const CATALOG_KEY: &str = "station_catalog";

/// Store key for the persisted active station selection.
pub const SELECTION_KEY: &str = "active_selection";

/// The user's chosen station, persisted separately from the catalog so a
/// selection survives catalog refreshes.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Selection {
    /// Display name of the chosen station.
    pub name: String,
    /// WGS84 latitude in degrees.
    pub lat: f64,
    /// WGS84 longitude in degrees.
    pub lng: f64,
    /// NOAA station id of the selection.
    pub station_id: String,
}

/// Opaque byte-level persistence used by the directory service.
pub trait CacheStore: Send + Sync {
    /// Return the stored bytes for `key`, or `None` on any miss.
    fn load(&self, key: &str) -> Option<Vec<u8>>;

    /// Persist `bytes` under `key`, replacing any previous value.
    fn save(&self, key: &str, bytes: &[u8]) -> io::Result<()>;
}

/// Decode a stored JSON record, treating corruption as a miss.
///
/// Returns `None` both for an absent key and for bytes that fail to decode;
/// the corrupt case is logged with the would-be [`TideError::CacheCorrupt`]
/// so it is visible without ever reaching a caller.
pub fn load_json<T: DeserializeOwned>(store: &dyn CacheStore, key: &str) -> Option<T> {
    let bytes = store.load(key)?;
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            let err = TideError::CacheCorrupt(format!("{key}: {e}"));
            tracing::warn!(%err, "discarding corrupt cache entry");
            None
        }
    }
}

/// Encode a record as JSON and persist it.
pub fn save_json<T: Serialize>(store: &dyn CacheStore, key: &str, value: &T) -> io::Result<()> {
    let bytes = serde_json::to_vec(value).map_err(io::Error::other)?;
    store.save(key, &bytes)
}

/// Load the persisted catalog, if present and decodable.
pub fn load_catalog(store: &dyn CacheStore) -> Option<Catalog> {
    load_json(store, CATALOG_KEY)
}

/// File-per-key store rooted at a cache directory.
///
/// Each key becomes `<dir>/<key>.json`. The directory is created lazily on
/// the first write so constructing the store never touches the filesystem.
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    /// Create a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileCacheStore { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are internal constants, but keep path traversal impossible
        // anyway by flattening separators.
        let safe: String = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl CacheStore for FileCacheStore {
    fn load(&self, key: &str) -> Option<Vec<u8>> {
        std::fs::read(self.path_for(key)).ok()
    }

    fn save(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path_for(key), bytes)
    }
}

/// In-memory store for tests and ephemeral runs.
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        MemoryCacheStore {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore for MemoryCacheStore {
    fn load(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn save(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        self.entries
            .lock()
            .map_err(|_| io::Error::other("store poisoned"))?
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}
