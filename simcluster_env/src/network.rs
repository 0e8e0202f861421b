//! Transport collaborator traits used by the master.

use crate::error::EnvError;
use crate::types::{ConnectionEvent, DeliveryClass, InboundMessage, PeerHandle};

/// Peer connection layer: owns transport-level connections.
///
/// # Implementations
///
/// - **Production**: wraps an unreliable-datagram transport with its own I/O threads
/// - **Simulation**: `SimNetwork` over the seeded in-memory fabric
///
/// # Event Flow
///
/// ```text
/// Master                     Transport                    Client
///   |-- connect(addr) -------->|                            |
///   |<-- PeerHandle -----------|-- [handshake] ------------>|
///   |                          |<---------------------------|
///   |-- pump_events() -------->|                            |
///   |<-- [PeerConnected(h)] ---|                            |
/// ```
///
/// All methods return immediately. Results of `connect` and `disconnect`
/// arrive later as events from `pump_events()`.
pub trait PeerConnection: Send + Sync {
    /// Starts accepting inbound connections on `port`.
    fn listen(&self, port: u16) -> Result<(), EnvError>;

    /// Begins a connection attempt and returns the handle that identifies
    /// the peer for the life of the attempt.
    fn connect(&self, address: &str) -> Result<PeerHandle, EnvError>;

    /// Requests disconnection of a peer (or cancels a pending attempt).
    fn disconnect(&self, peer: PeerHandle);

    /// Stops the transport; all peers are dropped.
    fn stop(&self);

    /// Drains connection events queued since the last pump.
    ///
    /// Must be called once per scheduling tick.
    fn pump_events(&self) -> Vec<ConnectionEvent>;
}

/// Message delivery layer for opaque command payloads.
pub trait CommandChannel: Send + Sync {
    /// Sends a payload to a single peer.
    fn unicast(&self, peer: PeerHandle, payload: Vec<u8>, class: DeliveryClass) -> Result<(), EnvError>;

    /// Sends a payload to every connected peer.
    ///
    /// # Returns
    /// Number of peers the payload was addressed to.
    fn broadcast(&self, payload: Vec<u8>, class: DeliveryClass) -> usize;

    /// Drains payloads received since the last call, in arrival order.
    fn drain_inbound(&self) -> Vec<InboundMessage>;
}
