//! Server-availability monitor.
//!
//! One long-lived session polls the configured endpoint, classifies each
//! probe as up or down, and announces every up/down transition exactly
//! once. The first classification after a (re)start is never announced:
//! the process has no memory of the server's state before it started, so
//! announcing would report a "transition" for what may be a long-standing
//! state.
//!
//! The transition rules live in [`SessionState`], separate from the loop,
//! so they can be tested without scheduling anything.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SharedConfigStore;
use crate::notify::SharedSink;
use crate::probe::{Endpoint, ProbeError, SharedProbe};

/// Classified availability of the monitored server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// No probe has completed yet. Never re-entered.
    Unknown,
    Up,
    Down,
}

/// An up/down flip worth announcing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    CameUp,
    WentDown,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::CameUp => write!(f, "came online"),
            Transition::WentDown => write!(f, "went offline"),
        }
    }
}

/// Per-session transition state.
///
/// Valid availability transitions are Unknown->Up, Unknown->Down,
/// Up->Down and Down->Up. The suppression flag covers exactly the first
/// observation of a session and is cleared no matter what that
/// observation was.
#[derive(Debug)]
pub struct SessionState {
    availability: Availability,
    suppress_first: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            availability: Availability::Unknown,
            suppress_first: true,
        }
    }

    pub fn availability(&self) -> Availability {
        self.availability
    }

    /// Feeds one probe classification into the state machine and returns
    /// the transition to announce, if any.
    pub fn observe(&mut self, up: bool) -> Option<Transition> {
        let next = if up { Availability::Up } else { Availability::Down };
        let previous = self.availability;
        self.availability = next;
        let suppressed = std::mem::replace(&mut self.suppress_first, false);

        if previous == next || previous == Availability::Unknown || suppressed {
            return None;
        }
        Some(match next {
            Availability::Up => Transition::CameUp,
            Availability::Down => Transition::WentDown,
            Availability::Unknown => unreachable!("Unknown is never re-entered"),
        })
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MonitorError {
    #[error("monitor session is already running")]
    AlreadyRunning,
}

struct ActiveSession {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Start/stop control over the single monitor session.
///
/// At most one live session exists per handle, so two loops can never
/// double-announce into the same sink.
pub struct MonitorHandle {
    active: Mutex<Option<ActiveSession>>,
}

impl MonitorHandle {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
        }
    }

    /// Spawns a new session. Rejected while a previous one is still live.
    pub fn start(
        &self,
        config: SharedConfigStore,
        probe: SharedProbe,
        sink: SharedSink,
    ) -> Result<(), MonitorError> {
        let mut slot = self.active.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(session) = slot.as_ref() {
            if !session.task.is_finished() {
                return Err(MonitorError::AlreadyRunning);
            }
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_session(config, probe, sink, cancel.clone()));
        *slot = Some(ActiveSession { cancel, task });
        Ok(())
    }

    /// Cancels the live session, if any. Returns whether one was running.
    ///
    /// The task is also aborted so a probe already in flight cannot
    /// announce after the stop, or overlap a session started right after.
    pub fn stop(&self) -> bool {
        let mut slot = self.active.lock().unwrap_or_else(|p| p.into_inner());
        match slot.take() {
            Some(session) if !session.task.is_finished() => {
                session.cancel.cancel();
                session.task.abort();
                true
            }
            _ => false,
        }
    }

    pub fn is_running(&self) -> bool {
        let slot = self.active.lock().unwrap_or_else(|p| p.into_inner());
        slot.as_ref().is_some_and(|s| !s.task.is_finished())
    }
}

impl Default for MonitorHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// The poll loop. Runs until cancelled or fatally terminated.
///
/// The endpoint is captured once at session start; changing it in the
/// config requires a monitor restart. The polling interval is re-read
/// every tick. An unresolvable target ends the session permanently: that
/// is a configuration error, not an outage.
pub async fn run_session(
    config: SharedConfigStore,
    probe: SharedProbe,
    sink: SharedSink,
    cancel: CancellationToken,
) {
    let (raw_endpoint, interval) = {
        let store = config.lock().unwrap_or_else(|p| p.into_inner());
        let snapshot = store.snapshot();
        (snapshot.monitored_endpoint, snapshot.polling_interval_seconds)
    };
    let Some(raw_endpoint) = raw_endpoint else {
        warn!("Monitor: no server configured to monitor, stopping session");
        return;
    };
    let endpoint: Endpoint = match raw_endpoint.parse() {
        Ok(endpoint) => endpoint,
        Err(e) => {
            warn!("Monitor: bad monitoring target '{}' ({}), stopping session", raw_endpoint, e);
            return;
        }
    };

    info!("Monitor: watching {}, probing every {}s", endpoint, interval);
    let mut state = SessionState::new();

    loop {
        match probe.status(&endpoint).await {
            Ok(status) => {
                debug!(
                    "Monitor: {} is up ({}ms, {}/{} players)",
                    endpoint, status.latency_ms, status.players_online, status.players_max
                );
                if let Some(transition) = state.observe(true) {
                    deliver(&sink, transition, &endpoint).await;
                }
            }
            Err(ProbeError::Unreachable(reason)) => {
                debug!("Monitor: {} is down ({})", endpoint, reason);
                if let Some(transition) = state.observe(false) {
                    deliver(&sink, transition, &endpoint).await;
                }
            }
            Err(ProbeError::InvalidEndpoint(reason)) => {
                warn!(
                    "Monitor: cannot resolve {} ({}), stopping session permanently",
                    endpoint, reason
                );
                return;
            }
        }

        // Interval changes apply on the next tick without a restart.
        let sleep_secs = {
            let store = config.lock().unwrap_or_else(|p| p.into_inner());
            store.snapshot().polling_interval_seconds
        };
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Monitor: session cancelled");
                return;
            }
            _ = tokio::time::sleep(Duration::from_secs(sleep_secs)) => {}
        }
    }
}

async fn deliver(sink: &SharedSink, transition: Transition, endpoint: &Endpoint) {
    info!("Monitor: {} {}", endpoint, transition);
    if let Err(e) = sink.announce(transition, endpoint, Utc::now()).await {
        // Best effort only: log and keep polling.
        error!("Monitor: failed to announce that {} {}: {}", endpoint, transition, e);
    }
}
