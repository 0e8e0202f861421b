//! Notification hooks from the master to the host application.
//!
//! The host owns the scene, UI and shared time control. The master only
//! tells it what happened; every call is one-way and must not call back
//! into the master.

use simcluster_env::PeerHandle;
use std::sync::Mutex;

/// Why a session was torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownReason {
    /// Operator requested stop
    Stopped,
    /// A peer disconnected while the session was active
    PeerLost(PeerHandle),
    /// A peer reported a failed load
    LoadFailed(PeerHandle),
    /// A connection attempt could not be started
    ConnectFailed,
}

impl std::fmt::Display for TeardownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeardownReason::Stopped => write!(f, "stopped"),
            TeardownReason::PeerLost(peer) => write!(f, "peer {} lost", peer),
            TeardownReason::LoadFailed(peer) => write!(f, "peer {} failed to load", peer),
            TeardownReason::ConnectFailed => write!(f, "connect failed"),
        }
    }
}

/// Host-side effects triggered by the master.
///
/// All methods default to no-ops.
pub trait SessionHooks: Send + Sync {
    /// The running session was aborted (scene/session teardown).
    fn on_session_abort(&self, _reason: &TeardownReason) {}

    /// A client failed to load; surface to the operator.
    fn on_load_error(&self, _peer: PeerHandle, _message: &str) {}

    /// Every client is running: unlock time control, mark the UI ready,
    /// flash the operator window and leave the loading scene.
    fn on_all_ready(&self) {}

    /// `Stop` went out to the cluster.
    fn on_stop_broadcast(&self) {}

    /// Scene and UI should be reset. Called exactly once per teardown.
    fn on_teardown(&self, _reason: &TeardownReason) {}
}

/// Hooks that ignore every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl SessionHooks for NoopHooks {}

/// One notification received by `RecordingHooks`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    SessionAbort(TeardownReason),
    LoadError { peer: PeerHandle, message: String },
    AllReady,
    StopBroadcast,
    Teardown(TeardownReason),
}

/// Hooks that record every notification, in order.
///
/// Used by the simulation harness and tests to assert on host effects.
#[derive(Debug, Default)]
pub struct RecordingHooks {
    events: Mutex<Vec<HookEvent>>,
}

impl RecordingHooks {
    fn push(&self, event: HookEvent) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event);
    }

    /// Snapshot of every notification so far.
    pub fn events(&self) -> Vec<HookEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Teardown reasons, in order.
    pub fn teardowns(&self) -> Vec<TeardownReason> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HookEvent::Teardown(reason) => Some(reason),
                _ => None,
            })
            .collect()
    }

    /// Load errors reported to the operator, in order.
    pub fn load_errors(&self) -> Vec<(PeerHandle, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HookEvent::LoadError { peer, message } => Some((peer, message)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&HookEvent) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl SessionHooks for RecordingHooks {
    fn on_session_abort(&self, reason: &TeardownReason) {
        self.push(HookEvent::SessionAbort(reason.clone()));
    }

    fn on_load_error(&self, peer: PeerHandle, message: &str) {
        self.push(HookEvent::LoadError {
            peer,
            message: message.to_string(),
        });
    }

    fn on_all_ready(&self) {
        self.push(HookEvent::AllReady);
    }

    fn on_stop_broadcast(&self) {
        self.push(HookEvent::StopBroadcast);
    }

    fn on_teardown(&self, reason: &TeardownReason) {
        self.push(HookEvent::Teardown(reason.clone()));
    }
}
