//! External collaborators
//!
//! The engine never talks to a map SDK or HTTP service directly. Hosts plug
//! in implementations of these traits; tests plug in scripted doubles.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{RegionError, RouteFetchError};
use crate::geo::{BoundingBox, GeoPoint};

/// Walking-directions service
#[async_trait]
pub trait RouteProvider: Send + Sync {
    /// Ordered coordinates of a walking route from `from` to `to`.
    async fn fetch_walking_route(
        &self,
        from: GeoPoint,
        to: GeoPoint,
    ) -> Result<Vec<GeoPoint>, RouteFetchError>;
}

/// Zoom levels to download tiles for, inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomRange {
    pub min: u8,
    pub max: u8,
}

/// Everything the tile subsystem needs to create an offline region
#[derive(Debug, Clone, PartialEq)]
pub struct RegionRequest {
    pub name: String,
    pub bounds: BoundingBox,
    pub style_url: String,
    pub zoom: ZoomRange,
}

/// Handle to a completed offline region
#[derive(Debug, Clone, PartialEq)]
pub struct OfflinePack {
    pub name: String,
    pub bounds: BoundingBox,
}

/// One item of a region download stream
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    /// Percentage complete, 0..=100
    Progress(u8),
    Complete(OfflinePack),
}

/// Stream of progress updates ending in `Complete` or an error
pub type DownloadStream = BoxStream<'static, Result<DownloadEvent, RegionError>>;

/// Offline tile-region subsystem
#[async_trait]
pub trait RegionDownloader: Send + Sync {
    async fn create_region(&self, request: RegionRequest) -> Result<DownloadStream, RegionError>;
}
