//! Navigation State Machine
//!
//! Owns the observable [`NavigationState`] and is the single entry point for
//! decoded tag commands.
//!
//! ```text
//!            scan                 setup tag
//!   Idle ───────────▶ Scanning ──────────────▶ Downloading
//!    ▲ ▲                │  │                    │      │
//!    │ │   lookup miss  │  │ route tag (hit)    │ ok   │ failed
//!    │ └────────────────┘  ▼                    ▼      ▼
//!    │               Navigating ◀──────── SetupComplete  Idle
//!    └──── stop ─────────┘        start
//! ```
//!
//! A finished scan that resolves nothing returns to the mode the scan was
//! started from, so a miss is never a state change. Every change goes
//! through [`NavigationState::apply`].

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::cache::{CacheSnapshot, RouteCache, RouteRecord};
use crate::error::{DispatchError, NfcError};
use crate::geo::GeoPoint;
use crate::nfc::{TagReader, TagSession};
use crate::payload::{self, SetupCommand, TagCommand};
use crate::setup::{SetupCoordinator, SetupReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavMode {
    Idle,
    Scanning,
    Downloading,
    SetupComplete,
    Navigating,
}

impl NavMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Downloading => "downloading",
            Self::SetupComplete => "setup_complete",
            Self::Navigating => "navigating",
        }
    }

    /// Modes with a background effect running
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Downloading | Self::Navigating)
    }
}

impl std::fmt::Display for NavMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inputs to the transition function
#[derive(Debug, Clone, PartialEq)]
pub enum NavEvent {
    /// Persisted snapshot loaded at startup
    Restored { setup_complete: bool },
    ScanRequested,
    /// Scan finished without a command to act on (NFC or decode failure, cancel)
    ScanEnded,
    SetupStarted,
    DownloadProgress(u8),
    SetupSucceeded,
    SetupFailed,
    RouteResolved(RouteRecord),
    LookupMissed,
    /// Manual start on the last resolved route
    NavigationStarted,
    Stopped,
}

impl NavEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Restored { .. } => "restore",
            Self::ScanRequested => "begin scan",
            Self::ScanEnded => "end scan",
            Self::SetupStarted => "start setup",
            Self::DownloadProgress(_) => "report download progress",
            Self::SetupSucceeded => "complete setup",
            Self::SetupFailed => "fail setup",
            Self::RouteResolved(_) => "resolve route",
            Self::LookupMissed => "miss lookup",
            Self::NavigationStarted => "start navigation",
            Self::Stopped => "stop navigation",
        }
    }
}

/// Observable navigation state
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationState {
    pub mode: NavMode,
    pub current_location: Option<GeoPoint>,
    pub active_route: Option<RouteRecord>,
    /// 0..=100
    pub download_progress: u8,
    /// A region download and cache rebuild have completed
    pub setup_complete: bool,
    /// Mode a scan in progress was started from
    pub scan_origin: Option<NavMode>,
}

impl Default for NavigationState {
    fn default() -> Self {
        Self {
            mode: NavMode::Idle,
            current_location: None,
            active_route: None,
            download_progress: 0,
            setup_complete: false,
            scan_origin: None,
        }
    }
}

impl NavigationState {
    /// Mode to settle in when nothing else is in progress
    pub fn rest_mode(&self) -> NavMode {
        if self.setup_complete {
            NavMode::SetupComplete
        } else {
            NavMode::Idle
        }
    }

    pub fn can_scan(&self) -> bool {
        matches!(self.mode, NavMode::Idle | NavMode::SetupComplete)
    }

    /// Manual start needs a completed setup and a previously resolved route
    pub fn can_start_navigation(&self) -> bool {
        self.can_scan() && self.setup_complete && self.active_route.is_some()
    }

    /// The transition function. Returns the next state, or why the event is
    /// not allowed in the current one.
    pub fn apply(&self, event: NavEvent) -> Result<NavigationState, DispatchError> {
        use NavMode::*;

        let mut next = self.clone();
        match (self.mode, event) {
            (Idle, NavEvent::Restored { setup_complete }) => {
                next.setup_complete = setup_complete;
                next.mode = next.rest_mode();
            }
            (Idle | SetupComplete, NavEvent::ScanRequested) => {
                next.mode = Scanning;
                next.scan_origin = Some(self.mode);
            }
            (Scanning, NavEvent::ScanEnded | NavEvent::LookupMissed) => {
                next.mode = self.scan_origin.unwrap_or_else(|| self.rest_mode());
                next.scan_origin = None;
            }
            (Scanning, NavEvent::SetupStarted) => {
                next.mode = Downloading;
                next.scan_origin = None;
                next.download_progress = 0;
            }
            (Downloading, NavEvent::DownloadProgress(pct)) => {
                next.download_progress = pct.min(100);
            }
            (Downloading, NavEvent::SetupSucceeded) => {
                // routes resolved against the old cache are gone
                next.mode = SetupComplete;
                next.setup_complete = true;
                next.download_progress = 100;
                next.active_route = None;
                next.current_location = None;
            }
            (Downloading, NavEvent::SetupFailed) => {
                next.mode = Idle;
                next.download_progress = 0;
            }
            (Scanning, NavEvent::RouteResolved(route)) => {
                next.current_location = route.start();
                next.active_route = Some(route);
                next.mode = Navigating;
                next.scan_origin = None;
            }
            (Idle | SetupComplete, NavEvent::NavigationStarted) => {
                if !self.setup_complete {
                    return Err(DispatchError::Precondition(
                        "no completed region download".into(),
                    ));
                }
                let Some(route) = &self.active_route else {
                    return Err(DispatchError::Precondition(
                        "no previously resolved route".into(),
                    ));
                };
                next.current_location = route.start();
                next.mode = Navigating;
            }
            (Navigating, NavEvent::Stopped) => next.mode = Idle,
            (from, event) => {
                return Err(DispatchError::InvalidTransition {
                    from,
                    event: event.name(),
                })
            }
        }
        Ok(next)
    }
}

/// What a successfully dispatched command did
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    SetupComplete(SetupReport),
    Navigating(RouteRecord),
}

/// Holds the re-entrancy flag for the duration of one scan.
///
/// A scan abandoned mid-read (its future dropped) leaves `Scanning` on drop.
struct ScanGuard<'a> {
    flag: &'a AtomicBool,
    state: &'a watch::Sender<NavigationState>,
}

impl<'a> ScanGuard<'a> {
    fn acquire(
        flag: &'a AtomicBool,
        state: &'a watch::Sender<NavigationState>,
    ) -> Result<Self, NfcError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| NfcError::Busy)?;
        Ok(Self { flag, state })
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.state.send_if_modified(|state| {
            if state.mode != NavMode::Scanning {
                return false;
            }
            match state.apply(NavEvent::ScanEnded) {
                Ok(next) => {
                    tracing::debug!(to = %next.mode, "abandoned scan released");
                    *state = next;
                    true
                }
                Err(_) => false,
            }
        });
        self.flag.store(false, Ordering::Release);
    }
}

pub struct NavigationStateMachine {
    state: watch::Sender<NavigationState>,
    cache: Mutex<RouteCache>,
    coordinator: SetupCoordinator,
    scanning: AtomicBool,
}

impl NavigationStateMachine {
    pub fn new(cache: RouteCache, coordinator: SetupCoordinator) -> Self {
        let (state, _) = watch::channel(NavigationState::default());
        Self {
            state,
            cache: Mutex::new(cache),
            coordinator,
            scanning: AtomicBool::new(false),
        }
    }

    /// Seed state from the persisted snapshot. Call once at startup.
    pub async fn restore(&self) -> Result<Option<CacheSnapshot>, DispatchError> {
        let snapshot = self.cache.lock().await.load_on_startup().await;
        let setup_complete = snapshot.as_ref().is_some_and(|s| s.is_setup_complete);
        self.transition(NavEvent::Restored { setup_complete })?;
        Ok(snapshot)
    }

    /// Subscribe to state changes
    pub fn observe(&self) -> watch::Receiver<NavigationState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> NavigationState {
        self.state.borrow().clone()
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    pub async fn cached_route(&self, tag_id: &str) -> Option<RouteRecord> {
        self.cache.lock().await.get(tag_id).cloned()
    }

    pub async fn nearest_exit(&self, from: GeoPoint) -> Option<RouteRecord> {
        self.cache.lock().await.nearest_exit(from).cloned()
    }

    /// Enter `Scanning` ahead of reading a tag
    pub fn begin_scan(&self) -> Result<NavigationState, DispatchError> {
        self.transition(NavEvent::ScanRequested)
    }

    /// Leave `Scanning` without a command
    pub fn cancel_scan(&self) -> Result<NavigationState, DispatchError> {
        self.transition(NavEvent::ScanEnded)
    }

    /// Run one complete NFC read attempt and act on the tag.
    ///
    /// The reader session is released before the command is dispatched, and
    /// on every failure path. Dropping the returned future mid-read cancels
    /// the scan.
    pub async fn scan(&self, reader: &dyn TagReader) -> Result<DispatchOutcome, DispatchError> {
        let _guard = ScanGuard::acquire(&self.scanning, &self.state)?;
        if self.state.borrow().mode != NavMode::Scanning {
            self.begin_scan()?;
        }

        let raw = match self.read_one(reader).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "NFC read failed");
                self.transition(NavEvent::ScanEnded)?;
                return Err(e.into());
            }
        };

        let cmd = match payload::decode(&raw) {
            Ok(cmd) => cmd,
            Err(e) => {
                tracing::warn!(error = %e, len = raw.len(), "undecodable tag payload");
                self.transition(NavEvent::ScanEnded)?;
                return Err(e.into());
            }
        };

        self.dispatch(cmd).await
    }

    async fn read_one(&self, reader: &dyn TagReader) -> Result<Vec<u8>, NfcError> {
        let session = TagSession::begin(reader).await?;
        session.read().await
    }

    /// Act on a decoded command.
    ///
    /// Accepted from `Idle`, `SetupComplete` or `Scanning`; rejected with
    /// [`DispatchError::Busy`] while downloading or navigating.
    pub async fn dispatch(&self, cmd: TagCommand) -> Result<DispatchOutcome, DispatchError> {
        let mode = self.state.borrow().mode;
        if mode.is_busy() {
            tracing::warn!(%mode, kind = cmd.kind(), "command rejected");
            return Err(DispatchError::Busy { mode });
        }
        if mode != NavMode::Scanning {
            self.begin_scan()?;
        }

        tracing::info!(kind = cmd.kind(), "dispatching tag command");
        match cmd {
            TagCommand::Setup(setup) => self.run_setup(&setup).await,
            TagCommand::Route(req) => self.resolve_route(&req.tag_id).await,
        }
    }

    async fn run_setup(&self, cmd: &SetupCommand) -> Result<DispatchOutcome, DispatchError> {
        self.transition(NavEvent::SetupStarted)?;

        let mut cache = self.cache.lock().await;
        let mut on_progress = |pct: u8| {
            if let Err(e) = self.transition(NavEvent::DownloadProgress(pct)) {
                tracing::warn!(error = %e, "dropped progress update");
            }
        };
        let result = self
            .coordinator
            .run_setup(cmd, &mut cache, &mut on_progress)
            .await;
        drop(cache);

        match result {
            Ok(report) => {
                self.transition(NavEvent::SetupSucceeded)?;
                Ok(DispatchOutcome::SetupComplete(report))
            }
            Err(e) => {
                tracing::warn!(phase = %e.phase, reason = %e.reason, "setup aborted");
                self.transition(NavEvent::SetupFailed)?;
                Err(e.into())
            }
        }
    }

    async fn resolve_route(&self, tag_id: &str) -> Result<DispatchOutcome, DispatchError> {
        let route = self.cache.lock().await.get(tag_id).cloned();
        match route {
            Some(route) => {
                tracing::info!(tag_id = %tag_id, exit = %route.exit_name, "route resolved");
                self.transition(NavEvent::RouteResolved(route.clone()))?;
                Ok(DispatchOutcome::Navigating(route))
            }
            None => {
                tracing::warn!(tag_id = %tag_id, "no cached route for tag");
                self.transition(NavEvent::LookupMissed)?;
                Err(DispatchError::LookupMiss {
                    tag_id: tag_id.to_string(),
                })
            }
        }
    }

    /// Start navigating the last resolved route without a fresh scan
    pub fn start_navigation(&self) -> Result<RouteRecord, DispatchError> {
        let next = self.transition(NavEvent::NavigationStarted)?;
        next.active_route.ok_or_else(|| {
            DispatchError::Precondition("no previously resolved route".into())
        })
    }

    pub fn stop_navigation(&self) -> Result<NavigationState, DispatchError> {
        self.transition(NavEvent::Stopped)
    }

    fn transition(&self, event: NavEvent) -> Result<NavigationState, DispatchError> {
        let from = self.state.borrow().mode;
        let mut outcome = Err(DispatchError::InvalidTransition {
            from,
            event: event.name(),
        });
        self.state.send_if_modified(|state| match state.apply(event) {
            Ok(next) => {
                if next.mode != state.mode {
                    tracing::debug!(from = %state.mode, to = %next.mode, "navigation state transition");
                }
                let changed = *state != next;
                *state = next.clone();
                outcome = Ok(next);
                changed
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        outcome
    }
}
