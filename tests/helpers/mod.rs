//! Test doubles for the external collaborators

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Notify;

use tagnav::{
    bounding_box, DownloadEvent, DownloadStream, ExitSpec, GeoPoint, MemorySnapshotStore,
    NfcError, OfflinePack, PointSpec, RegionDownloader, RegionError, RegionRequest,
    RouteFetchError, RouteProvider, SetupCommand, SnapshotStore, StorageError, TagReader,
};

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Straight three-point walk from `from` to `to`, failing for chosen start points
pub struct ScriptedRoutes {
    failing_from: HashSet<(u64, u64)>,
    pub calls: AtomicUsize,
}

impl ScriptedRoutes {
    pub fn ok() -> Self {
        Self::failing(&[])
    }

    pub fn failing(starts: &[GeoPoint]) -> Self {
        Self {
            failing_from: starts.iter().map(|p| key(*p)).collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

fn key(p: GeoPoint) -> (u64, u64) {
    (p.lon.to_bits(), p.lat.to_bits())
}

#[async_trait]
impl RouteProvider for ScriptedRoutes {
    async fn fetch_walking_route(
        &self,
        from: GeoPoint,
        to: GeoPoint,
    ) -> Result<Vec<GeoPoint>, RouteFetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_from.contains(&key(from)) {
            return Err(RouteFetchError::Http {
                status: 422,
                body: "InvalidInput".into(),
            });
        }
        let mid = GeoPoint::new((from.lon + to.lon) / 2.0, (from.lat + to.lat) / 2.0);
        Ok(vec![from, mid, to])
    }
}

// ---------------------------------------------------------------------------
// Offline regions
// ---------------------------------------------------------------------------

pub struct ScriptedRegions {
    fail_at: Option<u8>,
    pub requests: Mutex<Vec<RegionRequest>>,
}

impl ScriptedRegions {
    pub fn ok() -> Self {
        Self {
            fail_at: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Report progress up to `pct`, then fail
    pub fn failing_at(pct: u8) -> Self {
        Self {
            fail_at: Some(pct),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RegionDownloader for ScriptedRegions {
    async fn create_region(&self, request: RegionRequest) -> Result<DownloadStream, RegionError> {
        self.requests.lock().unwrap().push(request.clone());

        let mut events: Vec<Result<DownloadEvent, RegionError>> = [25u8, 50, 75]
            .into_iter()
            .take_while(|p| self.fail_at.map_or(true, |f| *p <= f))
            .map(|p| Ok(DownloadEvent::Progress(p)))
            .collect();
        match self.fail_at {
            Some(_) => events.push(Err(RegionError::Failed("tile count limit".into()))),
            None => events.push(Ok(DownloadEvent::Complete(OfflinePack {
                name: request.name,
                bounds: request.bounds,
            }))),
        }
        Ok(futures::stream::iter(events).boxed())
    }
}

// ---------------------------------------------------------------------------
// NFC
// ---------------------------------------------------------------------------

/// Hands out queued payloads, counting sessions
#[derive(Default)]
pub struct QueuedReader {
    payloads: Mutex<VecDeque<Result<Vec<u8>, NfcError>>>,
    pub begun: AtomicUsize,
    pub ended: AtomicUsize,
}

impl QueuedReader {
    pub fn with(payloads: Vec<Result<Vec<u8>, NfcError>>) -> Self {
        Self {
            payloads: Mutex::new(payloads.into()),
            ..Default::default()
        }
    }

    pub fn push(&self, payload: Vec<u8>) {
        self.payloads.lock().unwrap().push_back(Ok(payload));
    }

    pub fn open_sessions(&self) -> usize {
        self.begun.load(Ordering::SeqCst) - self.ended.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TagReader for QueuedReader {
    async fn begin_session(&self) -> Result<(), NfcError> {
        self.begun.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read_tag(&self) -> Result<Vec<u8>, NfcError> {
        self.payloads
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(NfcError::Cancelled))
    }

    fn end_session(&self) {
        self.ended.fetch_add(1, Ordering::SeqCst);
    }
}

/// Blocks in `read_tag` until released
#[derive(Default)]
pub struct GatedReader {
    gate: Notify,
    pub payload: Vec<u8>,
    pub ended: AtomicUsize,
}

impl GatedReader {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            ..Default::default()
        }
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl TagReader for GatedReader {
    async fn begin_session(&self) -> Result<(), NfcError> {
        Ok(())
    }

    async fn read_tag(&self) -> Result<Vec<u8>, NfcError> {
        self.gate.notified().await;
        Ok(self.payload.clone())
    }

    fn end_session(&self) {
        self.ended.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// In-memory store whose writes can be switched to fail
#[derive(Default)]
pub struct FlakyStore {
    inner: MemorySnapshotStore,
    pub fail_writes: AtomicBool,
}

#[async_trait]
impl SnapshotStore for FlakyStore {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.read(key).await
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("no space left on device")));
        }
        self.inner.write(key, value).await
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

pub const LONDON: GeoPoint = GeoPoint::new(-0.1276, 51.5074);

/// Tag bytes: NDEF text header followed by `json`
pub fn tag_bytes(json: &str) -> Vec<u8> {
    let mut bytes = vec![0x02, b'e', b'n'];
    bytes.extend_from_slice(json.as_bytes());
    bytes
}

pub fn point(id: &str, offset: f64) -> PointSpec {
    PointSpec {
        id: id.to_string(),
        location: GeoPoint::new(LONDON.lon + offset, LONDON.lat),
        exit: ExitSpec {
            name: format!("{} exit", id),
            location: GeoPoint::new(LONDON.lon + offset, LONDON.lat + 0.002),
        },
    }
}

pub fn london_setup(ids: &[&str]) -> SetupCommand {
    SetupCommand {
        center: LONDON,
        radius_km: 1.0,
        points: ids
            .iter()
            .enumerate()
            .map(|(i, id)| point(id, i as f64 * 0.001))
            .collect(),
    }
}

pub fn london_bounds() -> tagnav::BoundingBox {
    bounding_box(LONDON, 1.0)
}
