//! Lifecycle states for individual peers and for the master aggregate.

/// Lifecycle of a single client, as seen by the master.
///
/// Strictly linear. The only other edge is the reset to `Initial`, which
/// happens by dropping the record during teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PeerState {
    /// Connection attempt issued, transport not up yet
    Initial,
    /// Transport up, waiting for the client's `Info`
    Connecting,
    /// Handshake done, waiting for the `Load` barrier
    Connected,
    /// `Load` sent, waiting for `LoadResult`
    Loading,
    /// Loaded successfully, waiting for the `Run` barrier
    Ready,
    /// `Run` sent
    Running,
}

impl PeerState {
    /// Returns the single state that may follow this one.
    pub fn next(self) -> Option<PeerState> {
        match self {
            PeerState::Initial => Some(PeerState::Connecting),
            PeerState::Connecting => Some(PeerState::Connected),
            PeerState::Connected => Some(PeerState::Loading),
            PeerState::Loading => Some(PeerState::Ready),
            PeerState::Ready => Some(PeerState::Running),
            PeerState::Running => None,
        }
    }
}

impl std::fmt::Display for PeerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Aggregate state of the whole cluster.
///
/// Never ahead of the slowest peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum MasterState {
    #[default]
    Initial,
    Connecting,
    Loading,
    Running,
}

impl std::fmt::Display for MasterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
