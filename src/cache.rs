//! Route Cache
//!
//! Persisted mapping from tag identifier to a cached walking route. The
//! whole [`CacheSnapshot`] is written as one blob under a single key; there
//! is no partial update. Every setup cycle replaces the snapshot wholesale.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::geo::{self, GeoPoint};

/// Storage key the snapshot is kept under
pub const DEFAULT_STORAGE_KEY: &str = "offlineData";

/// A cached route from a point to its exit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRecord {
    pub tag_id: String,
    pub coordinates: Vec<GeoPoint>,
    pub exit_name: String,
    pub exit_location: GeoPoint,
}

impl RouteRecord {
    /// First coordinate of the route, where navigation starts
    pub fn start(&self) -> Option<GeoPoint> {
        self.coordinates.first().copied()
    }
}

/// The persisted unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    pub center: GeoPoint,
    pub stored_routes: BTreeMap<String, RouteRecord>,
    pub is_setup_complete: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage backends
// ─────────────────────────────────────────────────────────────────────────────

/// Key/value persistence for whole snapshot blobs
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the value under `key`. Readers see either the old or the new
    /// value, never a mix.
    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// One JSON file per key under a directory
pub struct FileSnapshotStore {
    base_path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn path_for_key(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", key))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        match tokio::fs::read_to_string(self.path_for_key(key)).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.base_path).await?;

        // Write beside the target and rename over it so a crash mid-write
        // leaves the previous snapshot intact.
        let path = self.path_for_key(key);
        let tmp = self.base_path.join(format!(".{}.json.tmp", key));
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

/// In-memory store
#[derive(Default, Clone)]
pub struct MemorySnapshotStore {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RouteCache
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory view of the current snapshot, backed by a [`SnapshotStore`]
pub struct RouteCache {
    store: Arc<dyn SnapshotStore>,
    key: String,
    snapshot: Option<CacheSnapshot>,
}

impl RouteCache {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self::with_key(store, DEFAULT_STORAGE_KEY)
    }

    pub fn with_key(store: Arc<dyn SnapshotStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            snapshot: None,
        }
    }

    /// Read the persisted snapshot, if any.
    ///
    /// Read and parse failures are treated as a cold start.
    pub async fn load_on_startup(&mut self) -> Option<CacheSnapshot> {
        let raw = match self.store.read(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::info!(key = %self.key, "no persisted route cache, cold start");
                return None;
            }
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "failed to read route cache, cold start");
                return None;
            }
        };

        match serde_json::from_str::<CacheSnapshot>(&raw) {
            Ok(snapshot) => {
                tracing::info!(
                    routes = snapshot.stored_routes.len(),
                    setup_complete = snapshot.is_setup_complete,
                    "restored route cache"
                );
                self.snapshot = Some(snapshot.clone());
                Some(snapshot)
            }
            Err(e) => {
                let err = StorageError::Corrupt {
                    key: self.key.clone(),
                    reason: e.to_string(),
                };
                tracing::warn!(error = %err, "discarding unreadable route cache, cold start");
                None
            }
        }
    }

    pub fn get(&self, tag_id: &str) -> Option<&RouteRecord> {
        self.snapshot.as_ref()?.stored_routes.get(tag_id)
    }

    /// Persist a new snapshot, superseding the previous one entirely.
    ///
    /// The in-memory view only changes once the write has succeeded.
    pub async fn replace_all(
        &mut self,
        records: BTreeMap<String, RouteRecord>,
        center: GeoPoint,
        setup_complete: bool,
    ) -> Result<CacheSnapshot, StorageError> {
        let snapshot = CacheSnapshot {
            center,
            stored_routes: records,
            is_setup_complete: setup_complete,
        };
        let blob = serde_json::to_string(&snapshot)?;
        self.store.write(&self.key, &blob).await?;

        tracing::info!(
            key = %self.key,
            routes = snapshot.stored_routes.len(),
            "route cache replaced"
        );
        self.snapshot = Some(snapshot.clone());
        Ok(snapshot)
    }

    pub fn snapshot(&self) -> Option<&CacheSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn is_setup_complete(&self) -> bool {
        self.snapshot.as_ref().is_some_and(|s| s.is_setup_complete)
    }

    pub fn len(&self) -> usize {
        self.snapshot.as_ref().map_or(0, |s| s.stored_routes.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached route whose exit is closest to `from`
    pub fn nearest_exit(&self, from: GeoPoint) -> Option<&RouteRecord> {
        let routes = self.snapshot.as_ref()?.stored_routes.values();
        geo::nearest(from, routes, |r| r.exit_location).map(|(_, r)| r)
    }
}
