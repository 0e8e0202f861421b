//! In-memory transport for unit tests: records sends, replays scripted input.

use crate::protocol::{Command, CommandCodec, CommandKind, LoadResult, ClientInfo};
use simcluster_env::{
    CommandChannel, ConnectionEvent, DeliveryClass, EnvError, InboundMessage, PeerConnection, PeerHandle,
};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
struct MockState {
    next_seed: u64,
    attempts: Vec<String>,
    refused: HashSet<String>,
    disconnected: Vec<PeerHandle>,
    stopped: bool,
    listening: Option<u16>,
    events: VecDeque<ConnectionEvent>,
    inbound: VecDeque<InboundMessage>,
    unicasts: Vec<(PeerHandle, Command)>,
    broadcasts: Vec<Command>,
    /// Answer connects and loads the way a healthy client would
    auto_reply: bool,
    fail_sends: bool,
}

/// Scriptable stand-in for both transport collaborators.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport that behaves like a cluster of healthy clients.
    pub fn auto_replying() -> Self {
        let transport = Self::default();
        transport.state.lock().unwrap().auto_reply = true;
        transport
    }

    pub fn refuse(&self, address: &str) {
        self.state.lock().unwrap().refused.insert(address.to_string());
    }

    /// Makes every later unicast fail as if the link were gone.
    pub fn fail_sends(&self) {
        self.state.lock().unwrap().fail_sends = true;
    }

    pub fn push_event(&self, event: ConnectionEvent) {
        self.state.lock().unwrap().events.push_back(event);
    }

    pub fn push_command(&self, sender: PeerHandle, command: &Command) {
        let payload = CommandCodec::encode(command).unwrap();
        self.push_raw(sender, payload);
    }

    pub fn push_raw(&self, sender: PeerHandle, payload: Vec<u8>) {
        self.state.lock().unwrap().inbound.push_back(InboundMessage::new(sender, payload));
    }

    pub fn connect_attempts(&self) -> Vec<String> {
        self.state.lock().unwrap().attempts.clone()
    }

    pub fn disconnected(&self) -> Vec<PeerHandle> {
        self.state.lock().unwrap().disconnected.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().unwrap().stopped
    }

    pub fn listening_port(&self) -> Option<u16> {
        self.state.lock().unwrap().listening
    }

    /// Kinds of every unicast, in send order.
    pub fn sent_kinds(&self) -> Vec<CommandKind> {
        self.state.lock().unwrap().unicasts.iter().map(|(_, c)| c.kind()).collect()
    }

    pub fn broadcast_kinds(&self) -> Vec<CommandKind> {
        self.state.lock().unwrap().broadcasts.iter().map(|c| c.kind()).collect()
    }
}

impl PeerConnection for MockTransport {
    fn listen(&self, port: u16) -> Result<(), EnvError> {
        self.state.lock().unwrap().listening = Some(port);
        Ok(())
    }

    fn connect(&self, address: &str) -> Result<PeerHandle, EnvError> {
        let mut state = self.state.lock().unwrap();
        state.attempts.push(address.to_string());
        if state.refused.contains(address) {
            return Err(EnvError::unreachable(address));
        }

        state.next_seed += 1;
        let peer = PeerHandle::from_seed(state.next_seed);
        if state.auto_reply {
            state.events.push_back(ConnectionEvent::PeerConnected(peer));
            let info = CommandCodec::encode(&Command::Info(ClientInfo::local())).unwrap();
            state.inbound.push_back(InboundMessage::new(peer, info));
        }
        Ok(peer)
    }

    fn disconnect(&self, peer: PeerHandle) {
        self.state.lock().unwrap().disconnected.push(peer);
    }

    fn stop(&self) {
        self.state.lock().unwrap().stopped = true;
    }

    fn pump_events(&self) -> Vec<ConnectionEvent> {
        self.state.lock().unwrap().events.drain(..).collect()
    }
}

impl CommandChannel for MockTransport {
    fn unicast(&self, peer: PeerHandle, payload: Vec<u8>, class: DeliveryClass) -> Result<(), EnvError> {
        assert_eq!(class, DeliveryClass::ReliableOrdered);
        let command = CommandCodec::decode(&payload).unwrap();

        let mut state = self.state.lock().unwrap();
        if state.fail_sends {
            return Err(EnvError::network("link closed"));
        }
        if state.auto_reply && command.kind() == CommandKind::Load {
            let reply = CommandCodec::encode(&Command::LoadResult(LoadResult::ok())).unwrap();
            state.inbound.push_back(InboundMessage::new(peer, reply));
        }
        state.unicasts.push((peer, command));
        Ok(())
    }

    fn broadcast(&self, payload: Vec<u8>, class: DeliveryClass) -> usize {
        assert_eq!(class, DeliveryClass::ReliableOrdered);
        let command = CommandCodec::decode(&payload).unwrap();
        self.state.lock().unwrap().broadcasts.push(command);
        0
    }

    fn drain_inbound(&self) -> Vec<InboundMessage> {
        self.state.lock().unwrap().inbound.drain(..).collect()
    }
}
