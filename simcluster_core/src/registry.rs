//! Client Registry - the expected peers and their lifecycle state.
//!
//! Pure bookkeeping. Interpreting transitions is the master's job.

use crate::protocol::ClientInfo;
use crate::state::PeerState;
use simcluster_env::PeerHandle;
use thiserror::Error;

/// Registry errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown peer: {0}")]
    UnknownPeer(PeerHandle),

    #[error("Peer already registered: {0}")]
    DuplicatePeer(PeerHandle),
}

/// One expected peer.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientRecord {
    /// Transport identity
    pub peer: PeerHandle,

    /// Address the connection attempt was made to (None for inbound peers)
    pub address: Option<String>,

    /// Current lifecycle state
    pub state: PeerState,

    /// Metadata from the client's `Info`, kept for diagnostics
    pub info: Option<ClientInfo>,
}

impl ClientRecord {
    pub fn new(peer: PeerHandle, address: Option<String>) -> Self {
        Self {
            peer,
            address,
            state: PeerState::Initial,
            info: None,
        }
    }
}

/// Ordered collection of client records, at most one per peer handle.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    records: Vec<ClientRecord>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new peer in `Initial` state.
    pub fn add(&mut self, peer: PeerHandle, address: Option<String>) -> Result<(), RegistryError> {
        if self.find(peer).is_some() {
            return Err(RegistryError::DuplicatePeer(peer));
        }
        self.records.push(ClientRecord::new(peer, address));
        Ok(())
    }

    /// Removes a peer, returning its record if it was registered.
    pub fn remove(&mut self, peer: PeerHandle) -> Option<ClientRecord> {
        let index = self.records.iter().position(|r| r.peer == peer)?;
        Some(self.records.remove(index))
    }

    pub fn find(&self, peer: PeerHandle) -> Option<&ClientRecord> {
        self.records.iter().find(|r| r.peer == peer)
    }

    pub fn find_mut(&mut self, peer: PeerHandle) -> Option<&mut ClientRecord> {
        self.records.iter_mut().find(|r| r.peer == peer)
    }

    /// Returns true if the registry is non-empty and every record matches.
    ///
    /// An empty registry never satisfies a barrier.
    pub fn all_satisfy(&self, predicate: impl Fn(&ClientRecord) -> bool) -> bool {
        !self.records.is_empty() && self.records.iter().all(predicate)
    }

    /// Overwrites the state of one peer.
    pub fn set_state(&mut self, peer: PeerHandle, state: PeerState) -> Result<(), RegistryError> {
        let record = self.find_mut(peer).ok_or(RegistryError::UnknownPeer(peer))?;
        record.state = state;
        Ok(())
    }

    /// Overwrites the state of every peer.
    pub fn set_all(&mut self, state: PeerState) {
        for record in &mut self.records {
            record.state = state;
        }
    }

    /// Snapshot of every registered handle, safe to iterate while mutating.
    pub fn handles(&self) -> Vec<PeerHandle> {
        self.records.iter().map(|r| r.peer).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientRecord> {
        self.records.iter()
    }

    /// Number of peers currently in `state`.
    pub fn count_in(&self, state: PeerState) -> usize {
        self.records.iter().filter(|r| r.state == state).count()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(n: u64) -> PeerHandle {
        PeerHandle::from_seed(n)
    }

    #[test]
    fn test_add_and_find() {
        let mut registry = ClientRegistry::new();
        registry.add(peer(1), Some("10.0.0.1:9999".into())).unwrap();

        let record = registry.find(peer(1)).unwrap();
        assert_eq!(record.state, PeerState::Initial);
        assert_eq!(record.address.as_deref(), Some("10.0.0.1:9999"));
        assert!(registry.find(peer(2)).is_none());
    }

    #[test]
    fn test_duplicate_handle_rejected() {
        let mut registry = ClientRegistry::new();
        registry.add(peer(1), None).unwrap();

        assert_eq!(registry.add(peer(1), None), Err(RegistryError::DuplicatePeer(peer(1))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_set_state_unknown_peer() {
        let mut registry = ClientRegistry::new();
        assert_eq!(
            registry.set_state(peer(9), PeerState::Connecting),
            Err(RegistryError::UnknownPeer(peer(9)))
        );
    }

    #[test]
    fn test_all_satisfy_requires_records() {
        let mut registry = ClientRegistry::new();
        assert!(!registry.all_satisfy(|_| true));

        registry.add(peer(1), None).unwrap();
        registry.add(peer(2), None).unwrap();
        registry.set_state(peer(1), PeerState::Connecting).unwrap();

        assert!(!registry.all_satisfy(|r| r.state == PeerState::Connecting));
        registry.set_state(peer(2), PeerState::Connecting).unwrap();
        assert!(registry.all_satisfy(|r| r.state == PeerState::Connecting));
        assert_eq!(registry.count_in(PeerState::Connecting), 2);
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut registry = ClientRegistry::new();
        for n in 1..=3 {
            registry.add(peer(n), None).unwrap();
        }

        assert!(registry.remove(peer(2)).is_some());
        assert!(registry.remove(peer(2)).is_none());
        assert_eq!(registry.handles(), vec![peer(1), peer(3)]);
    }
}
