//! Master State Machine - drives the whole cluster through connect, load and run.
//!
//! # Lifecycle
//!
//! ```text
//!            begin_connecting          all Connected            all Ready
//! Initial ───────────────────► Connecting ──────────► Loading ──────────► Running
//!    ▲                              │      (Load sent)    │    (Run sent)      │
//!    └──────────────────────────────┴─────────────────────┴────────────────────┘
//!               teardown: peer lost / load failed / stop
//! ```
//!
//! The master owns the registry and the aggregate state exclusively. Every
//! mutation happens on the thread that calls `tick()` and the handlers, so
//! nothing here locks.

use crate::config::ClusterConfig;
use crate::hooks::{SessionHooks, TeardownReason};
use crate::protocol::{ClientInfo, Command, CommandCodec, CommandKind, LoadCommand, LoadResult, ProtocolError};
use crate::registry::{ClientRecord, ClientRegistry, RegistryError};
use crate::state::{MasterState, PeerState};

use simcluster_env::{CommandChannel, ConnectionEvent, DeliveryClass, EnvError, PeerConnection, PeerHandle};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors raised by master operations and command handlers.
#[derive(Debug, Error)]
pub enum MasterError {
    /// Caller invoked an operation in the wrong state (programming error)
    #[error("Cannot {operation} while master is {state}")]
    InvalidStateTransition {
        operation: &'static str,
        state: MasterState,
    },

    /// An event or command arrived for a phase the master is not in
    #[error("Unexpected {event} while master is {state}")]
    OutOfPhase { event: &'static str, state: MasterState },

    #[error("Unknown peer: {0}")]
    UnknownPeer(PeerHandle),

    #[error("Peer {peer} is {actual}, expected {expected}")]
    PeerStateMismatch {
        peer: PeerHandle,
        expected: PeerState,
        actual: PeerState,
    },

    #[error("Unexpected {kind} command from client {peer}")]
    UnexpectedCommand { kind: CommandKind, peer: PeerHandle },

    #[error("No cluster addresses to connect to")]
    NoPeers,

    /// A barrier command could not reach a peer; the session is already torn down
    #[error("Session aborted: {kind} could not be sent to client {peer}: {source}")]
    SessionAborted {
        kind: CommandKind,
        peer: PeerHandle,
        source: EnvError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Env(#[from] EnvError),
}

/// Counters kept over the life of the master.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MasterStats {
    pub load_broadcasts: u64,
    pub run_broadcasts: u64,
    pub stop_broadcasts: u64,
    pub teardowns: u64,
    pub dropped_messages: u64,
}

/// The coordinating node's control plane.
///
/// Generic over the transport collaborators and the host hooks, so the
/// same logic runs against a real transport or the simulation fabric.
pub struct MasterStateMachine<Conn, Chan, H>
where
    Conn: PeerConnection,
    Chan: CommandChannel,
    H: SessionHooks,
{
    connection: Arc<Conn>,
    channel: Arc<Chan>,
    hooks: Arc<H>,
    config: ClusterConfig,
    registry: ClientRegistry,
    state: MasterState,
    /// Teardown requested by `broadcast_stop`, run at the start of the next tick
    pending_teardown: Option<TeardownReason>,
    tearing_down: bool,
    stats: MasterStats,
}

impl<Conn, Chan, H> MasterStateMachine<Conn, Chan, H>
where
    Conn: PeerConnection,
    Chan: CommandChannel,
    H: SessionHooks,
{
    pub fn new(connection: Arc<Conn>, channel: Arc<Chan>, hooks: Arc<H>, config: ClusterConfig) -> Self {
        Self {
            connection,
            channel,
            hooks,
            config,
            registry: ClientRegistry::new(),
            state: MasterState::Initial,
            pending_teardown: None,
            tearing_down: false,
            stats: MasterStats::default(),
        }
    }

    pub fn state(&self) -> MasterState {
        self.state
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn stats(&self) -> &MasterStats {
        &self.stats
    }

    pub fn hooks(&self) -> &Arc<H> {
        &self.hooks
    }

    /// Returns true if a stop is waiting for the next tick to tear down.
    pub fn teardown_pending(&self) -> bool {
        self.pending_teardown.is_some()
    }

    // ------------------------------------------------------------------
    // Operator operations
    // ------------------------------------------------------------------

    /// Opens the configured port for inbound client connections.
    pub fn start_listening(&self) -> Result<(), MasterError> {
        let port = self.config.network.port;
        self.connection.listen(port)?;
        info!(port, "Master listening for clients");
        Ok(())
    }

    /// Connects to every address in the configured cluster.
    pub fn connect_to_clients(&mut self) -> Result<(), MasterError> {
        let addresses = self.config.network.cluster_addresses.clone();
        self.begin_connecting(&addresses)
    }

    /// Issues one connection attempt per address and enters `Connecting`.
    ///
    /// If any attempt cannot be started, everything issued so far is torn
    /// down and the error is returned. A stop still waiting for its tick is
    /// carried out first, so it only ever ends the session it was sent to.
    pub fn begin_connecting(&mut self, addresses: &[String]) -> Result<(), MasterError> {
        if let Some(reason) = self.pending_teardown.take() {
            self.teardown(reason);
        }
        if self.state != MasterState::Initial {
            error!(state = %self.state, "begin_connecting called outside Initial");
            return Err(MasterError::InvalidStateTransition {
                operation: "begin connecting",
                state: self.state,
            });
        }
        if addresses.is_empty() {
            error!("begin_connecting called with an empty cluster");
            return Err(MasterError::NoPeers);
        }

        for address in addresses {
            let result = self
                .connection
                .connect(address)
                .map_err(MasterError::from)
                .and_then(|peer| {
                    self.registry.add(peer, Some(address.clone()))?;
                    debug!(peer = %peer, address = %address, "Connection attempt issued");
                    Ok(())
                });

            if let Err(e) = result {
                error!(address = %address, error = %e, "Failed to start connection attempt");
                self.teardown(TeardownReason::ConnectFailed);
                return Err(e);
            }
        }

        self.state = MasterState::Connecting;
        info!(clients = addresses.len(), "Connecting to clients");
        Ok(())
    }

    /// Requests disconnection of every registered peer and returns to `Initial`.
    ///
    /// No-op on an empty registry.
    pub fn disconnect_all(&mut self) {
        for peer in self.registry.handles() {
            self.connection.disconnect(peer);
        }
        self.registry.clear();
        self.state = MasterState::Initial;
    }

    /// Sends `Stop` to every peer and schedules the teardown for the next
    /// tick, or for the next `begin_connecting` if that comes first.
    ///
    /// The disconnect is deferred so it never runs in the middle of a
    /// dispatch pass.
    pub fn broadcast_stop(&mut self) -> Result<(), MasterError> {
        let payload = CommandCodec::encode(&Command::Stop)?;
        let sent = self.channel.broadcast(payload, DeliveryClass::ReliableOrdered);

        self.stats.stop_broadcasts += 1;
        info!(clients = sent, state = %self.state, "Stop broadcast to cluster");
        self.hooks.on_stop_broadcast();

        if self.pending_teardown.is_none() {
            self.pending_teardown = Some(TeardownReason::Stopped);
        }
        Ok(())
    }

    /// Disconnects everything and stops the transport.
    pub fn shutdown(&mut self) {
        self.pending_teardown = None;
        self.disconnect_all();
        self.connection.stop();
        info!("Master shut down");
    }

    // ------------------------------------------------------------------
    // Dispatch pass
    // ------------------------------------------------------------------

    /// One cooperative pass: deferred teardown, connection events, then
    /// inbound commands.
    pub fn tick(&mut self) {
        if let Some(reason) = self.pending_teardown.take() {
            self.teardown(reason);
        }

        for event in self.connection.pump_events() {
            self.apply_connection_event(event);
        }

        for message in self.channel.drain_inbound() {
            self.dispatch(message.sender, &message.payload);
        }
    }

    /// Applies one connection event, logging protocol anomalies.
    pub fn apply_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::PeerConnected(peer) => {
                if let Err(e) = self.on_peer_connected(peer) {
                    warn!(peer = %peer, error = %e, "Ignoring connect event");
                    self.stats.dropped_messages += 1;
                }
            }
            ConnectionEvent::PeerDisconnected(peer) => self.on_peer_disconnected(peer),
        }
    }

    /// Decodes a payload and routes it to the handler for its kind.
    ///
    /// Anything the handler rejects is logged and dropped. An aborted
    /// session was accepted and already handled, so it is not counted.
    pub fn dispatch(&mut self, sender: PeerHandle, payload: &[u8]) {
        let result = CommandCodec::decode(payload)
            .map_err(MasterError::from)
            .and_then(|command| self.handle_command(sender, command));

        match result {
            Ok(()) => {}
            Err(e @ MasterError::SessionAborted { .. }) => {
                debug!(peer = %sender, error = %e, "Message ended the session");
            }
            Err(e) => {
                warn!(peer = %sender, error = %e, "Dropping message");
                self.stats.dropped_messages += 1;
            }
        }
    }

    /// Routes an already decoded command.
    pub fn handle_command(&mut self, sender: PeerHandle, command: Command) -> Result<(), MasterError> {
        match command {
            Command::Info(info) => self.on_info_received(sender, info),
            Command::LoadResult(result) => self.on_load_result_received(sender, result),
            other => Err(MasterError::UnexpectedCommand {
                kind: other.kind(),
                peer: sender,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Event and command handlers
    // ------------------------------------------------------------------

    /// Transport reports a peer is up.
    pub fn on_peer_connected(&mut self, peer: PeerHandle) -> Result<(), MasterError> {
        if self.state != MasterState::Connecting {
            return Err(MasterError::OutOfPhase {
                event: "peer connection",
                state: self.state,
            });
        }

        self.advance_peer(peer, PeerState::Initial)?;
        debug!(peer = %peer, "Client connected, awaiting info");
        Ok(())
    }

    /// Transport reports a peer went away.
    ///
    /// Losing a registered peer in any state but `Initial` aborts the session.
    pub fn on_peer_disconnected(&mut self, peer: PeerHandle) {
        let Some(record) = self.registry.remove(peer) else {
            debug!(peer = %peer, "Disconnect from unregistered peer");
            return;
        };

        if self.state == MasterState::Initial {
            debug!(peer = %peer, "Client disconnected");
            return;
        }

        error!(
            peer = %peer,
            address = record.address.as_deref().unwrap_or("inbound"),
            peer_state = %record.state,
            state = %self.state,
            "Client disconnected during active session, aborting"
        );
        let reason = TeardownReason::PeerLost(peer);
        self.teardown(reason.clone());
        self.hooks.on_session_abort(&reason);
    }

    /// Client handshake. Completing the last one releases the `Load` barrier.
    pub fn on_info_received(&mut self, peer: PeerHandle, info: ClientInfo) -> Result<(), MasterError> {
        if self.state != MasterState::Connecting {
            return Err(MasterError::OutOfPhase {
                event: "Info",
                state: self.state,
            });
        }

        let record = self.find_in(peer, PeerState::Connecting)?;
        if !info.is_compatible() {
            warn!(
                peer = %peer,
                client_version = %info.version,
                master_version = crate::protocol::PROTOCOL_VERSION,
                "Client version differs from master"
            );
        }
        info!(
            peer = %peer,
            version = %info.version,
            platform = %info.platform_version,
            os = %info.operating_system,
            "Client handshake complete"
        );
        record.info = Some(info);
        record.state = PeerState::Connected;

        if self.registry.all_satisfy(|r| r.state == PeerState::Connected) {
            self.start_loading()?;
        }
        Ok(())
    }

    /// Client load outcome. A failure anywhere aborts the whole group;
    /// the last success releases the `Run` barrier.
    pub fn on_load_result_received(&mut self, peer: PeerHandle, result: LoadResult) -> Result<(), MasterError> {
        if self.state != MasterState::Loading {
            return Err(MasterError::OutOfPhase {
                event: "LoadResult",
                state: self.state,
            });
        }

        let record = self.find_in(peer, PeerState::Loading)?;

        if !result.success {
            error!(
                peer = %peer,
                address = record.address.as_deref().unwrap_or("inbound"),
                "Client failed to load simulation: {}",
                result.error_message
            );
            self.hooks.on_load_error(peer, &result.error_message);
            self.teardown(TeardownReason::LoadFailed(peer));
            return Ok(());
        }

        record.state = PeerState::Ready;
        debug!(peer = %peer, "Client ready");

        if self.registry.all_satisfy(|r| r.state == PeerState::Ready) {
            self.start_running()?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Barriers and teardown
    // ------------------------------------------------------------------

    fn start_loading(&mut self) -> Result<(), MasterError> {
        let load = LoadCommand::from_settings(&self.config.simulation);
        info!(
            simulation = %load.name,
            map = %load.map_name,
            agents = load.agents.len(),
            clients = self.registry.len(),
            "All clients connected, sending Load"
        );
        self.send_to_all(&Command::Load(load))?;

        self.registry.set_all(PeerState::Loading);
        self.state = MasterState::Loading;
        self.stats.load_broadcasts += 1;
        Ok(())
    }

    fn start_running(&mut self) -> Result<(), MasterError> {
        info!(clients = self.registry.len(), "All clients ready, sending Run");
        self.send_to_all(&Command::Run)?;

        self.registry.set_all(PeerState::Running);
        self.state = MasterState::Running;
        self.stats.run_broadcasts += 1;
        self.hooks.on_all_ready();
        Ok(())
    }

    /// Sends one command to every registered peer.
    ///
    /// If a send fails the session is torn down, since the barrier can no
    /// longer be honoured for that peer.
    fn send_to_all(&mut self, command: &Command) -> Result<(), MasterError> {
        let payload = CommandCodec::encode(command)?;

        for peer in self.registry.handles() {
            if let Err(e) = self.channel.unicast(peer, payload.clone(), DeliveryClass::ReliableOrdered) {
                error!(peer = %peer, command = %command.kind(), error = %e, "Send failed, aborting");
                let reason = TeardownReason::PeerLost(peer);
                self.teardown(reason.clone());
                self.hooks.on_session_abort(&reason);
                return Err(MasterError::SessionAborted {
                    kind: command.kind(),
                    peer,
                    source: e,
                });
            }
        }
        Ok(())
    }

    /// Returns the session to `Initial`: disconnect, clear, notify once.
    ///
    /// A teardown requested while one is already running is ignored.
    pub fn teardown(&mut self, reason: TeardownReason) {
        if self.tearing_down {
            debug!(reason = %reason, "Teardown already in progress");
            return;
        }
        self.tearing_down = true;

        let clients = self.registry.len();
        let previous = self.state;
        self.disconnect_all();
        self.pending_teardown = None;
        self.stats.teardowns += 1;

        info!(reason = %reason, clients, previous = %previous, "Session torn down");
        self.hooks.on_teardown(&reason);

        self.tearing_down = false;
    }

    /// Moves a peer from `expected` to the next state.
    fn advance_peer(&mut self, peer: PeerHandle, expected: PeerState) -> Result<(), MasterError> {
        let record = self.find_in(peer, expected)?;
        if let Some(next) = expected.next() {
            record.state = next;
        }
        Ok(())
    }

    fn find_in(&mut self, peer: PeerHandle, expected: PeerState) -> Result<&mut ClientRecord, MasterError> {
        let record = self.registry.find_mut(peer).ok_or(MasterError::UnknownPeer(peer))?;
        if record.state != expected {
            return Err(MasterError::PeerStateMismatch {
                peer,
                expected,
                actual: record.state,
            });
        }
        Ok(record)
    }
}
