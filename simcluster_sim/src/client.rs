//! SimulatedClient - the client side of the cluster protocol.
//!
//! Each client lives inside the simulated fabric and reacts to the commands
//! the master sends it:
//! - sends `Info` as soon as its connection is up
//! - answers `Load` with `LoadResult` after a configurable number of ticks
//! - starts running on `Run`, leaves the cluster on `Stop`
//!
//! Scripted misbehaviour (failed loads, dropped connections, duplicate
//! handshakes) is configured through `ClientBehavior`.

use simcluster_core::{ClientInfo, Command, LoadCommand, LoadResult};
use tracing::debug;

/// Phase in which a scripted disconnect fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    Handshake,
    Loading,
    Running,
}

/// Scripted client behaviour.
#[derive(Debug, Clone)]
pub struct ClientBehavior {
    /// Handshake payload
    pub info: ClientInfo,

    /// Ticks spent loading before reporting the result
    pub load_ticks: u32,

    /// Report this error instead of a successful load
    pub load_failure: Option<String>,

    /// Drop the connection when entering this phase
    pub disconnect_in: Option<ClientPhase>,

    /// Send `Info` twice
    pub duplicate_info: bool,

    /// Refuse to answer connection attempts
    pub unreachable: bool,
}

impl Default for ClientBehavior {
    fn default() -> Self {
        Self {
            info: ClientInfo::local(),
            load_ticks: 2,
            load_failure: None,
            disconnect_in: None,
            duplicate_info: false,
            unreachable: false,
        }
    }
}

impl ClientBehavior {
    pub fn failing_load(message: impl Into<String>) -> Self {
        Self {
            load_failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn dropping_in(phase: ClientPhase) -> Self {
        Self {
            disconnect_in: Some(phase),
            ..Self::default()
        }
    }

    pub fn with_load_ticks(mut self, ticks: u32) -> Self {
        self.load_ticks = ticks;
        self
    }
}

/// Where the client is in its own lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientStatus {
    Idle,
    Connected,
    Loading { remaining: u32 },
    Ready,
    Running,
    Stopped,
}

/// A simulated client node.
pub struct SimulatedClient {
    address: String,
    behavior: ClientBehavior,
    status: ClientStatus,
    last_load: Option<LoadCommand>,
    /// Commands waiting to go to the master
    outbox: Vec<Command>,
    wants_disconnect: bool,
    commands_received: u64,
}

impl SimulatedClient {
    pub fn new(address: impl Into<String>, behavior: ClientBehavior) -> Self {
        Self {
            address: address.into(),
            behavior,
            status: ClientStatus::Idle,
            last_load: None,
            outbox: Vec::new(),
            wants_disconnect: false,
            commands_received: 0,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn behavior(&self) -> &ClientBehavior {
        &self.behavior
    }

    pub fn status(&self) -> &ClientStatus {
        &self.status
    }

    /// The last `Load` received, if any.
    pub fn last_load(&self) -> Option<&LoadCommand> {
        self.last_load.as_ref()
    }

    pub fn commands_received(&self) -> u64 {
        self.commands_received
    }

    /// Transport came up.
    pub fn on_connected(&mut self) {
        self.status = ClientStatus::Connected;
        self.outbox.push(Command::Info(self.behavior.info.clone()));
        if self.behavior.duplicate_info {
            self.outbox.push(Command::Info(self.behavior.info.clone()));
        }
        self.check_disconnect(ClientPhase::Handshake);
    }

    /// Transport went away.
    pub fn on_disconnected(&mut self) {
        if self.status != ClientStatus::Stopped {
            self.status = ClientStatus::Idle;
        }
        self.outbox.clear();
        self.wants_disconnect = false;
    }

    /// Command received from the master.
    pub fn on_command(&mut self, command: Command) {
        self.commands_received += 1;
        debug!(client = %self.address, command = %command.kind(), "Client received command");

        match command {
            Command::Load(load) => {
                self.last_load = Some(load);
                self.status = ClientStatus::Loading {
                    remaining: self.behavior.load_ticks,
                };
                self.check_disconnect(ClientPhase::Loading);
            }
            Command::Run => {
                self.status = ClientStatus::Running;
                self.check_disconnect(ClientPhase::Running);
            }
            Command::Stop => {
                self.status = ClientStatus::Stopped;
                self.wants_disconnect = true;
            }
            Command::Info(_) | Command::LoadResult(_) => {
                debug!(client = %self.address, "Client ignoring master-bound command");
            }
        }
    }

    /// Advances timers by one tick.
    pub fn step(&mut self) {
        if let ClientStatus::Loading { remaining } = self.status {
            if remaining > 0 {
                self.status = ClientStatus::Loading { remaining: remaining - 1 };
                return;
            }

            let result = match &self.behavior.load_failure {
                Some(message) => LoadResult::failed(message.clone()),
                None => LoadResult::ok(),
            };
            self.status = ClientStatus::Ready;
            self.outbox.push(Command::LoadResult(result));
        }
    }

    /// Takes everything queued for the master.
    pub fn take_outbox(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.outbox)
    }

    /// Returns true once if the client wants its connection dropped.
    pub fn take_disconnect_request(&mut self) -> bool {
        std::mem::take(&mut self.wants_disconnect)
    }

    fn check_disconnect(&mut self, phase: ClientPhase) {
        if self.behavior.disconnect_in == Some(phase) {
            self.wants_disconnect = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simcluster_core::SimulationSettings;

    #[test]
    fn test_client_sends_info_on_connect() {
        let mut client = SimulatedClient::new("c0", ClientBehavior::default());
        client.on_connected();

        let outbox = client.take_outbox();
        assert_eq!(outbox.len(), 1);
        assert!(matches!(outbox[0], Command::Info(_)));
        assert!(client.take_outbox().is_empty());
    }

    #[test]
    fn test_client_load_takes_configured_ticks() {
        let mut client = SimulatedClient::new("c0", ClientBehavior::default().with_load_ticks(2));
        client.on_connected();
        client.take_outbox();

        client.on_command(Command::Load(LoadCommand::from_settings(&SimulationSettings::default())));
        client.step();
        client.step();
        assert!(client.take_outbox().is_empty());

        client.step();
        assert_eq!(client.take_outbox(), vec![Command::LoadResult(LoadResult::ok())]);
        assert_eq!(client.status(), &ClientStatus::Ready);
    }

    #[test]
    fn test_client_reports_scripted_failure() {
        let mut client = SimulatedClient::new("c0", ClientBehavior::failing_load("asset missing").with_load_ticks(0));
        client.on_command(Command::Load(LoadCommand::from_settings(&SimulationSettings::default())));
        client.step();

        assert_eq!(
            client.take_outbox(),
            vec![Command::LoadResult(LoadResult::failed("asset missing"))]
        );
    }

    #[test]
    fn test_client_scripted_disconnect() {
        let mut client = SimulatedClient::new("c0", ClientBehavior::dropping_in(ClientPhase::Loading));
        client.on_connected();
        assert!(!client.take_disconnect_request());

        client.on_command(Command::Load(LoadCommand::from_settings(&SimulationSettings::default())));
        assert!(client.take_disconnect_request());
        assert!(!client.take_disconnect_request());
    }

    #[test]
    fn test_client_stop_requests_disconnect() {
        let mut client = SimulatedClient::new("c0", ClientBehavior::default());
        client.on_command(Command::Run);
        client.on_command(Command::Stop);

        assert_eq!(client.status(), &ClientStatus::Stopped);
        assert!(client.take_disconnect_request());
        assert_eq!(client.commands_received(), 2);
    }
}
