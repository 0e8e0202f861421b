//! Common types for the simcluster environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identity of a remote peer.
///
/// Stable for the life of one connection attempt; a reconnect gets a new handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerHandle(pub Uuid);

impl PeerHandle {
    /// Creates a new random handle.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a handle from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Creates a deterministic handle from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PeerHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Delivery guarantee requested for an outgoing payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryClass {
    /// At most once, any order
    Unreliable,

    /// Exactly once, in send order per peer
    ReliableOrdered,
}

/// Transport-level connection event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Handshake with the peer completed (outbound attempt or accepted inbound)
    PeerConnected(PeerHandle),

    /// Peer went away, or a pending attempt failed
    PeerDisconnected(PeerHandle),
}

impl ConnectionEvent {
    /// Returns the peer the event refers to.
    pub fn peer(&self) -> PeerHandle {
        match self {
            ConnectionEvent::PeerConnected(peer) | ConnectionEvent::PeerDisconnected(peer) => *peer,
        }
    }
}

/// A payload received from a peer, not yet decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sending peer
    pub sender: PeerHandle,

    /// Raw command bytes
    pub payload: Vec<u8>,
}

impl InboundMessage {
    /// Creates a new inbound message.
    pub fn new(sender: PeerHandle, payload: Vec<u8>) -> Self {
        Self { sender, payload }
    }

    /// Returns the payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_from_seed_is_deterministic() {
        assert_eq!(PeerHandle::from_seed(7), PeerHandle::from_seed(7));
        assert_ne!(PeerHandle::from_seed(7), PeerHandle::from_seed(8));
    }

    #[test]
    fn test_handle_display_is_short() {
        let handle = PeerHandle::from_seed(1);
        assert_eq!(handle.to_string().len(), 8);
    }

    #[test]
    fn test_event_peer() {
        let handle = PeerHandle::from_seed(3);
        assert_eq!(ConnectionEvent::PeerConnected(handle).peer(), handle);
        assert_eq!(ConnectionEvent::PeerDisconnected(handle).peer(), handle);
    }
}
