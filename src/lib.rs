//! tagnav - Offline-first NFC-triggered walking navigation
//!
//! Two kinds of NFC tag drive the engine. A *setup tag* names a region and a
//! batch of points; scanning it downloads the region for offline use and
//! caches a walking route from each point to its exit. A *route tag* names a
//! single point; scanning it later, with or without connectivity, starts
//! navigation along the cached route.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  Host UI: map surface, permissions, camera                    │
//! └───────────────────────────────────────────────────────────────┘
//!            │ scan / dispatch / observe
//!            ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │                NavigationStateMachine (state)                 │
//! └───────────────────────────────────────────────────────────────┘
//!      │ TagReader     │ decode            │ setup         │ lookup
//!      ▼               ▼                   ▼               ▼
//!   nfc           payload          SetupCoordinator ──▶ RouteCache
//!                                   │           │          │
//!                          RegionDownloader  RouteProvider  SnapshotStore
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let config = NavConfig::from_env()?;
//! let store = Arc::new(FileSnapshotStore::new(&config.storage.path));
//! let cache = RouteCache::with_key(store, config.storage.key.clone());
//! let coordinator = SetupCoordinator::new(Arc::new(MapboxDirections::new(config.directions.clone())?), regions)
//!     .with_pack_config(config.offline_pack.clone())
//!     .with_policy(config.setup.fetch_policy);
//!
//! let machine = NavigationStateMachine::new(cache, coordinator);
//! machine.restore().await?;
//! let mut updates = machine.observe();
//! machine.scan(&reader).await?;
//! ```

pub mod cache;
pub mod config;
pub mod directions;
pub mod error;
pub mod geo;
pub mod nfc;
pub mod payload;
pub mod providers;
pub mod setup;
pub mod state;
pub mod telemetry;

pub use cache::{
    CacheSnapshot, FileSnapshotStore, MemorySnapshotStore, RouteCache, RouteRecord, SnapshotStore,
};
pub use config::NavConfig;
pub use directions::MapboxDirections;
pub use error::{
    ConfigError, DecodeError, DispatchError, NfcError, RegionError, RouteFetchError, SetupError,
    SetupPhase, StorageError,
};
pub use geo::{bounding_box, distance, BoundingBox, GeoPoint};
pub use nfc::{TagReader, TagSession};
pub use payload::{decode, encode, ExitSpec, PointSpec, RouteRequest, SetupCommand, TagCommand};
pub use providers::{
    DownloadEvent, DownloadStream, OfflinePack, RegionDownloader, RegionRequest, RouteProvider,
    ZoomRange,
};
pub use setup::{FetchPolicy, PointFailure, SetupCoordinator, SetupReport};
pub use state::{DispatchOutcome, NavEvent, NavMode, NavigationState, NavigationStateMachine};
