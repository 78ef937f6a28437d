//! Setup Coordinator
//!
//! Runs one setup cycle for a setup tag: download the offline region around
//! the tag's centre, fetch a walking route for every point, then replace the
//! route cache with whatever was fetched.
//!
//! Point fetches run one at a time in input order. The coordinator takes the
//! cache by `&mut`, so two cycles cannot share a cache.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheSnapshot, RouteCache, RouteRecord};
use crate::config::OfflinePackConfig;
use crate::error::{RegionError, RouteFetchError, SetupError, SetupPhase};
use crate::geo;
use crate::payload::SetupCommand;
use crate::providers::{DownloadEvent, OfflinePack, RegionDownloader, RegionRequest, RouteProvider};

/// What a failed point fetch does to the batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchPolicy {
    /// Skip the point and cache the rest
    #[default]
    TolerateFailures,
    /// Abort the setup without touching the cache
    AllOrNothing,
}

/// A point whose route could not be fetched
#[derive(Debug, Clone, PartialEq)]
pub struct PointFailure {
    pub tag_id: String,
    pub reason: String,
}

/// Outcome of a successful setup cycle
#[derive(Debug, Clone, PartialEq)]
pub struct SetupReport {
    pub snapshot: CacheSnapshot,
    pub pack: OfflinePack,
    pub failures: Vec<PointFailure>,
}

pub struct SetupCoordinator {
    routes: Arc<dyn RouteProvider>,
    regions: Arc<dyn RegionDownloader>,
    pack_config: OfflinePackConfig,
    policy: FetchPolicy,
}

impl SetupCoordinator {
    pub fn new(routes: Arc<dyn RouteProvider>, regions: Arc<dyn RegionDownloader>) -> Self {
        Self {
            routes,
            regions,
            pack_config: OfflinePackConfig::default(),
            policy: FetchPolicy::default(),
        }
    }

    pub fn with_pack_config(mut self, pack_config: OfflinePackConfig) -> Self {
        self.pack_config = pack_config;
        self
    }

    pub fn with_policy(mut self, policy: FetchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> FetchPolicy {
        self.policy
    }

    /// Run a full setup cycle.
    ///
    /// `on_progress` receives every download progress update, clamped to
    /// 0..=100. On error the cache is left exactly as it was.
    pub async fn run_setup(
        &self,
        cmd: &SetupCommand,
        cache: &mut RouteCache,
        on_progress: &mut (dyn FnMut(u8) + Send),
    ) -> Result<SetupReport, SetupError> {
        tracing::info!(
            center = ?cmd.center,
            radius_km = cmd.radius_km,
            points = cmd.points.len(),
            "starting setup"
        );

        let pack = self
            .download_region(cmd, on_progress)
            .await
            .map_err(|e| SetupError::new(SetupPhase::Download, e.to_string()))?;

        let (records, failures) = self.fetch_routes(cmd).await?;

        let snapshot = cache
            .replace_all(records, cmd.center, true)
            .await
            .map_err(|e| SetupError::new(SetupPhase::Persist, e.to_string()))?;

        tracing::info!(
            cached = snapshot.stored_routes.len(),
            failed = failures.len(),
            pack = %pack.name,
            "setup complete"
        );

        Ok(SetupReport {
            snapshot,
            pack,
            failures,
        })
    }

    fn region_request(&self, cmd: &SetupCommand) -> RegionRequest {
        RegionRequest {
            name: format!(
                "{}-{:.4}-{:.4}",
                self.pack_config.name_prefix, cmd.center.lon, cmd.center.lat
            ),
            bounds: geo::bounding_box(cmd.center, cmd.radius_km),
            style_url: self.pack_config.style_url.clone(),
            zoom: self.pack_config.zoom(),
        }
    }

    async fn download_region(
        &self,
        cmd: &SetupCommand,
        on_progress: &mut (dyn FnMut(u8) + Send),
    ) -> Result<OfflinePack, RegionError> {
        let request = self.region_request(cmd);
        tracing::debug!(name = %request.name, bounds = ?request.bounds, "requesting offline region");

        let mut events = self.regions.create_region(request).await?;
        while let Some(event) = events.next().await {
            match event? {
                DownloadEvent::Progress(pct) => on_progress(pct.min(100)),
                DownloadEvent::Complete(pack) => {
                    on_progress(100);
                    return Ok(pack);
                }
            }
        }
        Err(RegionError::StreamEnded)
    }

    async fn fetch_routes(
        &self,
        cmd: &SetupCommand,
    ) -> Result<(BTreeMap<String, RouteRecord>, Vec<PointFailure>), SetupError> {
        let mut records = BTreeMap::new();
        let mut failures = Vec::new();

        for point in &cmd.points {
            let fetched = match self
                .routes
                .fetch_walking_route(point.location, point.exit.location)
                .await
            {
                Ok(coords) if coords.is_empty() => Err(RouteFetchError::NoRoute),
                other => other,
            };

            match fetched {
                Ok(coordinates) => {
                    tracing::debug!(tag_id = %point.id, len = coordinates.len(), "route fetched");
                    records.insert(
                        point.id.clone(),
                        RouteRecord {
                            tag_id: point.id.clone(),
                            coordinates,
                            exit_name: point.exit.name.clone(),
                            exit_location: point.exit.location,
                        },
                    );
                }
                Err(e) => {
                    if self.policy == FetchPolicy::AllOrNothing {
                        return Err(SetupError::new(
                            SetupPhase::Fetch,
                            format!("route for {} failed: {}", point.id, e),
                        ));
                    }
                    tracing::warn!(tag_id = %point.id, error = %e, "route fetch failed, skipping point");
                    failures.push(PointFailure {
                        tag_id: point.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok((records, failures))
    }
}
