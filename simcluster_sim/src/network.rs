//! Simulated cluster network with fault injection.
//!
//! One `SimNetwork` stands in for both transport collaborators of the master
//! and also hosts the simulated clients. Each call to `pump_events()` is one
//! fabric step:
//!
//! ```text
//! pump_events()
//!   1. complete pending connection attempts   -> PeerConnected / PeerDisconnected
//!   2. deliver master -> client payloads       (per-peer FIFO)
//!   3. step client timers
//!   4. collect client -> master payloads       (seeded interleaving across peers)
//!   5. apply client disconnect requests        -> PeerDisconnected
//! ```

use crate::client::{ClientStatus, SimulatedClient};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use simcluster_core::{CommandCodec, LoadCommand};
use simcluster_env::{
    CommandChannel, ConnectionEvent, DeliveryClass, EnvError, InboundMessage, PeerConnection, PeerHandle,
};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Traffic counters for the fabric.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FabricStats {
    pub connect_attempts: u64,
    pub connections: u64,
    pub disconnects: u64,
    pub messages_to_clients: u64,
    pub messages_to_master: u64,
    pub packets_dropped: u64,
}

/// A transport link between the master and one client.
struct Link {
    peer: PeerHandle,
    /// Index into `clients`; None if nobody lives at the address
    client: Option<usize>,
    /// Ticks until the attempt completes; None once connected
    connect_in: Option<u32>,
    to_client: VecDeque<Vec<u8>>,
}

impl Link {
    fn is_connected(&self) -> bool {
        self.connect_in.is_none()
    }
}

struct FabricState {
    seed: u64,
    rng: ChaCha8Rng,
    next_handle: u64,
    connect_delay_ticks: u32,
    unreliable_loss: f64,
    listening: Option<u16>,
    stopped: bool,
    clients: Vec<SimulatedClient>,
    links: Vec<Link>,
    refused: HashSet<String>,
    events: VecDeque<ConnectionEvent>,
    inbound: VecDeque<InboundMessage>,
    stats: FabricStats,
}

impl FabricState {
    fn new_handle(&mut self) -> PeerHandle {
        self.next_handle += 1;
        PeerHandle::from_seed(self.seed.rotate_left(17) ^ self.next_handle)
    }

    fn client_index(&self, address: &str) -> Option<usize> {
        self.clients.iter().position(|c| c.address() == address)
    }

    /// Drops a link and tells both ends.
    fn drop_link(&mut self, index: usize) {
        let link = self.links.remove(index);
        if let Some(client) = link.client {
            self.clients[client].on_disconnected();
        }
        self.stats.disconnects += 1;
        self.events.push_back(ConnectionEvent::PeerDisconnected(link.peer));
    }

    /// Hands whatever is still queued on a link to its client.
    fn flush_link(&mut self, index: usize) {
        let link = &mut self.links[index];
        let Some(client) = link.client else { return };
        if !link.is_connected() {
            return;
        }
        while let Some(payload) = link.to_client.pop_front() {
            if let Ok(command) = CommandCodec::decode(&payload) {
                self.clients[client].on_command(command);
            }
        }
    }

    fn complete_connections(&mut self) {
        let mut failed = Vec::new();

        for (index, link) in self.links.iter_mut().enumerate() {
            let Some(remaining) = link.connect_in else { continue };
            if remaining > 1 {
                link.connect_in = Some(remaining - 1);
                continue;
            }

            let reachable = link
                .client
                .map(|c| !self.clients[c].behavior().unreachable)
                .unwrap_or(false);

            if reachable {
                link.connect_in = None;
                if let Some(client) = link.client {
                    self.clients[client].on_connected();
                }
                self.stats.connections += 1;
                self.events.push_back(ConnectionEvent::PeerConnected(link.peer));
            } else {
                failed.push(index);
            }
        }

        for index in failed.into_iter().rev() {
            debug!(peer = %self.links[index].peer, "Connection attempt failed");
            self.drop_link(index);
        }
    }

    fn deliver_to_clients(&mut self) {
        for link in self.links.iter_mut().filter(|l| l.is_connected()) {
            let Some(client) = link.client else {
                link.to_client.clear();
                continue;
            };
            while let Some(payload) = link.to_client.pop_front() {
                match CommandCodec::decode(&payload) {
                    Ok(command) => self.clients[client].on_command(command),
                    Err(e) => warn!(peer = %link.peer, error = %e, "Client dropped undecodable payload"),
                }
            }
        }
    }

    fn step_clients(&mut self) {
        for link in self.links.iter().filter(|l| l.is_connected()) {
            if let Some(client) = link.client {
                self.clients[client].step();
            }
        }
    }

    /// Moves client outboxes to the master, preserving per-peer order while
    /// interleaving peers in seeded random order.
    fn collect_from_clients(&mut self) {
        let mut queues: Vec<(PeerHandle, VecDeque<Vec<u8>>)> = Vec::new();

        for link in self.links.iter().filter(|l| l.is_connected()) {
            let Some(client) = link.client else { continue };
            let mut queue = VecDeque::new();
            for command in self.clients[client].take_outbox() {
                match CommandCodec::encode(&command) {
                    Ok(payload) => queue.push_back(payload),
                    Err(e) => warn!(peer = %link.peer, error = %e, "Client failed to encode command"),
                }
            }
            if !queue.is_empty() {
                queues.push((link.peer, queue));
            }
        }

        while !queues.is_empty() {
            let pick = self.rng.gen_range(0..queues.len());
            let (peer, queue) = &mut queues[pick];
            if let Some(payload) = queue.pop_front() {
                self.inbound.push_back(InboundMessage::new(*peer, payload));
                self.stats.messages_to_master += 1;
            }
            if queue.is_empty() {
                queues.swap_remove(pick);
            }
        }
    }

    fn apply_disconnect_requests(&mut self) {
        let mut leaving = Vec::new();
        for (index, link) in self.links.iter().enumerate() {
            if let Some(client) = link.client {
                if self.clients[client].take_disconnect_request() {
                    leaving.push(index);
                }
            }
        }

        for index in leaving.into_iter().rev() {
            debug!(peer = %self.links[index].peer, "Client closed its connection");
            self.drop_link(index);
        }
    }

    fn should_drop(&mut self, class: DeliveryClass) -> bool {
        class == DeliveryClass::Unreliable
            && self.unreliable_loss > 0.0
            && self.rng.gen_bool(self.unreliable_loss)
    }
}

/// Simulated transport shared by the master and the simulated clients.
pub struct SimNetwork {
    state: Arc<Mutex<FabricState>>,
}

impl SimNetwork {
    /// Creates an empty fabric.
    ///
    /// # Arguments
    /// * `seed` - Seed for handle generation and message interleaving
    /// * `connect_delay_ticks` - Fabric steps a connection attempt takes
    pub fn new(seed: u64, connect_delay_ticks: u32) -> Self {
        let state = FabricState {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_handle: 0,
            connect_delay_ticks: connect_delay_ticks.max(1),
            unreliable_loss: 0.0,
            listening: None,
            stopped: false,
            clients: Vec::new(),
            links: Vec::new(),
            refused: HashSet::new(),
            events: VecDeque::new(),
            inbound: VecDeque::new(),
            stats: FabricStats::default(),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Places a client at its address.
    pub fn add_client(&self, client: SimulatedClient) {
        self.state.lock().unwrap().clients.push(client);
    }

    /// Returns a fault-injection handle onto this fabric.
    pub fn controller(&self) -> SimNetworkController {
        SimNetworkController {
            state: Arc::clone(&self.state),
        }
    }

    pub fn stats(&self) -> FabricStats {
        self.state.lock().unwrap().stats.clone()
    }

    pub fn client_status(&self, address: &str) -> Option<ClientStatus> {
        let state = self.state.lock().unwrap();
        state.client_index(address).map(|i| state.clients[i].status().clone())
    }

    pub fn client_last_load(&self, address: &str) -> Option<LoadCommand> {
        let state = self.state.lock().unwrap();
        state
            .client_index(address)
            .and_then(|i| state.clients[i].last_load().cloned())
    }

    /// Number of links whose handshake has completed.
    pub fn connected_count(&self) -> usize {
        self.state.lock().unwrap().links.iter().filter(|l| l.is_connected()).count()
    }

    pub fn is_listening(&self) -> bool {
        self.state.lock().unwrap().listening.is_some()
    }
}

impl PeerConnection for SimNetwork {
    fn listen(&self, port: u16) -> Result<(), EnvError> {
        let mut state = self.state.lock().unwrap();
        if state.stopped {
            return Err(EnvError::ListenFailed {
                port,
                reason: "transport stopped".to_string(),
            });
        }
        state.listening = Some(port);
        Ok(())
    }

    fn connect(&self, address: &str) -> Result<PeerHandle, EnvError> {
        let mut state = self.state.lock().unwrap();
        if state.stopped {
            return Err(EnvError::network("transport stopped"));
        }
        state.stats.connect_attempts += 1;
        if state.refused.contains(address) {
            return Err(EnvError::unreachable(address));
        }

        let peer = state.new_handle();
        let client = state.client_index(address);
        let delay = state.connect_delay_ticks;
        state.links.push(Link {
            peer,
            client,
            connect_in: Some(delay),
            to_client: VecDeque::new(),
        });
        Ok(peer)
    }

    fn disconnect(&self, peer: PeerHandle) {
        let mut state = self.state.lock().unwrap();
        if let Some(index) = state.links.iter().position(|l| l.peer == peer) {
            // Graceful close: reliable traffic already queued still arrives
            state.flush_link(index);
            state.drop_link(index);
        }
    }

    fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        while !state.links.is_empty() {
            state.drop_link(0);
        }
        state.events.clear();
        state.inbound.clear();
        state.listening = None;
        state.stopped = true;
    }

    fn pump_events(&self) -> Vec<ConnectionEvent> {
        let mut state = self.state.lock().unwrap();
        if state.stopped {
            return Vec::new();
        }

        state.complete_connections();
        state.deliver_to_clients();
        state.step_clients();
        state.collect_from_clients();
        state.apply_disconnect_requests();

        state.events.drain(..).collect()
    }
}

impl CommandChannel for SimNetwork {
    fn unicast(&self, peer: PeerHandle, payload: Vec<u8>, class: DeliveryClass) -> Result<(), EnvError> {
        let mut state = self.state.lock().unwrap();
        if state.stopped {
            return Err(EnvError::network("transport stopped"));
        }
        if state.should_drop(class) {
            state.stats.packets_dropped += 1;
            return Ok(());
        }

        let link = state
            .links
            .iter_mut()
            .find(|l| l.peer == peer && l.is_connected())
            .ok_or_else(|| EnvError::unreachable(peer))?;
        link.to_client.push_back(payload);
        state.stats.messages_to_clients += 1;
        Ok(())
    }

    fn broadcast(&self, payload: Vec<u8>, class: DeliveryClass) -> usize {
        let mut state = self.state.lock().unwrap();
        if state.stopped {
            return 0;
        }

        let mut sent = 0;
        for index in 0..state.links.len() {
            if !state.links[index].is_connected() {
                continue;
            }
            if state.should_drop(class) {
                state.stats.packets_dropped += 1;
                continue;
            }
            state.links[index].to_client.push_back(payload.clone());
            sent += 1;
        }
        state.stats.messages_to_clients += sent as u64;
        sent
    }

    fn drain_inbound(&self) -> Vec<InboundMessage> {
        self.state.lock().unwrap().inbound.drain(..).collect()
    }
}

/// Fault injection for the simulated fabric.
pub struct SimNetworkController {
    state: Arc<Mutex<FabricState>>,
}

impl SimNetworkController {
    /// Makes `connect(address)` fail immediately.
    pub fn refuse(&self, address: &str) {
        self.state.lock().unwrap().refused.insert(address.to_string());
    }

    /// Clears every refusal.
    pub fn heal_all(&self) {
        self.state.lock().unwrap().refused.clear();
    }

    /// Severs the link to the client at `address`.
    ///
    /// Returns false if the client has no link.
    pub fn kill(&self, address: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(client) = state.client_index(address) else {
            return false;
        };
        match state.links.iter().position(|l| l.client == Some(client)) {
            Some(index) => {
                state.drop_link(index);
                true
            }
            None => false,
        }
    }

    /// Has the client at `address` dial in to the listening master.
    ///
    /// Returns the handle of the new inbound peer, or None if the master
    /// is not listening.
    pub fn dial_in(&self, address: &str) -> Option<PeerHandle> {
        let mut state = self.state.lock().unwrap();
        state.listening?;

        let peer = state.new_handle();
        let client = state.client_index(address);
        if let Some(index) = client {
            state.clients[index].on_connected();
        }
        state.links.push(Link {
            peer,
            client,
            connect_in: None,
            to_client: VecDeque::new(),
        });
        state.stats.connections += 1;
        state.events.push_back(ConnectionEvent::PeerConnected(peer));
        Some(peer)
    }

    /// Sets how many fabric steps new connection attempts take.
    pub fn set_connect_delay(&self, ticks: u32) {
        self.state.lock().unwrap().connect_delay_ticks = ticks.max(1);
    }

    /// Sets the loss rate for `Unreliable` traffic (0.0 - 1.0).
    pub fn set_unreliable_loss(&self, loss_rate: f64) {
        self.state.lock().unwrap().unreliable_loss = loss_rate.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientBehavior;
    use simcluster_core::{Command, CommandKind};

    fn fabric(addresses: &[&str]) -> SimNetwork {
        let network = SimNetwork::new(42, 1);
        for address in addresses {
            network.add_client(SimulatedClient::new(*address, ClientBehavior::default()));
        }
        network
    }

    fn kinds(messages: &[InboundMessage]) -> Vec<CommandKind> {
        messages
            .iter()
            .map(|m| CommandCodec::decode(&m.payload).unwrap().kind())
            .collect()
    }

    #[test]
    fn test_connect_completes_after_delay() {
        let network = SimNetwork::new(1, 2);
        network.add_client(SimulatedClient::new("a", ClientBehavior::default()));
        let peer = network.connect("a").unwrap();

        assert!(network.pump_events().is_empty());
        assert_eq!(network.pump_events(), vec![ConnectionEvent::PeerConnected(peer)]);
        assert_eq!(kinds(&network.drain_inbound()), vec![CommandKind::Info]);
        assert_eq!(network.connected_count(), 1);
    }

    #[test]
    fn test_connect_delay_applies_to_new_attempts() {
        let network = fabric(&["a"]);
        network.controller().set_connect_delay(3);
        network.connect("a").unwrap();

        assert!(network.pump_events().is_empty());
        assert!(network.pump_events().is_empty());
        assert_eq!(network.pump_events().len(), 1);
        assert_eq!(network.stats().connections, 1);
    }

    #[test]
    fn test_connect_to_empty_address_fails_later() {
        let network = fabric(&[]);
        let peer = network.connect("nobody").unwrap();

        assert_eq!(network.pump_events(), vec![ConnectionEvent::PeerDisconnected(peer)]);
    }

    #[test]
    fn test_unreachable_client_times_out() {
        let network = SimNetwork::new(3, 1);
        let behavior = ClientBehavior {
            unreachable: true,
            ..ClientBehavior::default()
        };
        network.add_client(SimulatedClient::new("dark", behavior));
        let peer = network.connect("dark").unwrap();

        assert_eq!(network.pump_events(), vec![ConnectionEvent::PeerDisconnected(peer)]);
        assert_eq!(network.client_status("dark"), Some(ClientStatus::Idle));
        assert!(network.drain_inbound().is_empty());
    }

    #[test]
    fn test_refused_connect_fails_immediately() {
        let network = fabric(&["a"]);
        network.controller().refuse("a");

        assert!(matches!(network.connect("a"), Err(EnvError::PeerUnreachable(_))));

        network.controller().heal_all();
        assert!(network.connect("a").is_ok());
    }

    #[test]
    fn test_unicast_requires_connected_link() {
        let network = fabric(&["a"]);
        let peer = network.connect("a").unwrap();
        let payload = CommandCodec::encode(&Command::Run).unwrap();

        assert!(network.unicast(peer, payload.clone(), DeliveryClass::ReliableOrdered).is_err());

        network.pump_events();
        assert!(network.unicast(peer, payload, DeliveryClass::ReliableOrdered).is_ok());
        network.pump_events();
        assert_eq!(network.client_status("a"), Some(ClientStatus::Running));
    }

    #[test]
    fn test_kill_reports_disconnect() {
        let network = fabric(&["a", "b"]);
        let a = network.connect("a").unwrap();
        network.connect("b").unwrap();
        network.pump_events();

        assert!(network.controller().kill("a"));
        assert_eq!(network.pump_events(), vec![ConnectionEvent::PeerDisconnected(a)]);
        assert!(!network.controller().kill("a"));
        assert_eq!(network.connected_count(), 1);
    }

    #[test]
    fn test_disconnect_flushes_queued_commands() {
        let network = fabric(&["a"]);
        let peer = network.connect("a").unwrap();
        network.pump_events();

        let payload = CommandCodec::encode(&Command::Stop).unwrap();
        network.unicast(peer, payload, DeliveryClass::ReliableOrdered).unwrap();
        network.disconnect(peer);

        assert_eq!(network.client_status("a"), Some(ClientStatus::Stopped));
        assert_eq!(network.pump_events(), vec![ConnectionEvent::PeerDisconnected(peer)]);
    }

    #[test]
    fn test_dial_in_requires_listen() {
        let network = fabric(&["a"]);
        assert!(network.controller().dial_in("a").is_none());

        network.listen(9999).unwrap();
        let peer = network.controller().dial_in("a").unwrap();
        assert_eq!(network.pump_events(), vec![ConnectionEvent::PeerConnected(peer)]);
    }

    #[test]
    fn test_broadcast_reaches_connected_only() {
        let network = fabric(&["a", "b"]);
        network.connect("a").unwrap();
        network.pump_events();
        network.connect("b").unwrap();

        let payload = CommandCodec::encode(&Command::Stop).unwrap();
        assert_eq!(network.broadcast(payload, DeliveryClass::ReliableOrdered), 1);
    }

    #[test]
    fn test_unreliable_loss() {
        let network = fabric(&["a"]);
        network.connect("a").unwrap();
        network.pump_events();
        network.controller().set_unreliable_loss(1.0);

        let payload = CommandCodec::encode(&Command::Run).unwrap();
        assert_eq!(network.broadcast(payload.clone(), DeliveryClass::Unreliable), 0);
        assert_eq!(network.broadcast(payload, DeliveryClass::ReliableOrdered), 1);
        assert_eq!(network.stats().packets_dropped, 1);
    }

    #[test]
    fn test_stop_drops_everything() {
        let network = fabric(&["a"]);
        network.connect("a").unwrap();
        network.pump_events();

        network.stop();

        assert!(network.pump_events().is_empty());
        assert!(network.connect("a").is_err());
        assert_eq!(network.connected_count(), 0);
    }
}
