//! Cluster command protocol - payloads exchanged between master and clients.
//!
//! One command per message, always sent `ReliableOrdered`. The wire form is
//! bincode, so field order is significant: reordering fields in any of these
//! structs breaks compatibility with deployed clients.

use crate::config::{AgentSettings, SimulationSettings};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version advertised by this build in `ClientInfo`.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol encoding/decoding errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Failed to encode {kind} command: {reason}")]
    Encode { kind: CommandKind, reason: String },

    #[error("Failed to decode command ({len} bytes): {reason}")]
    Decode { len: usize, reason: String },
}

/// Discriminant of a `Command`, used for routing and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Info,
    Load,
    LoadResult,
    Run,
    Stop,
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CommandKind::Info => "Info",
            CommandKind::Load => "Load",
            CommandKind::LoadResult => "LoadResult",
            CommandKind::Run => "Run",
            CommandKind::Stop => "Stop",
        };
        f.write_str(name)
    }
}

/// Handshake payload a client sends once its connection is up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub version: String,
    pub platform_version: String,
    pub operating_system: String,
}

impl ClientInfo {
    /// Describes the running build.
    pub fn local() -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            platform_version: format!("{}-{}", std::env::consts::ARCH, std::env::consts::FAMILY),
            operating_system: std::env::consts::OS.to_string(),
        }
    }

    /// Returns true if the client runs the same protocol version as this build.
    pub fn is_compatible(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}

/// Per-agent load descriptor inside a `Load` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentLoad {
    pub name: String,
    pub asset_url: String,
    pub bridge_name: Option<String>,
    pub connection_string: String,
    pub sensors: String,
}

impl From<&AgentSettings> for AgentLoad {
    fn from(agent: &AgentSettings) -> Self {
        Self {
            name: agent.name.clone(),
            asset_url: agent.asset_url.clone(),
            bridge_name: agent.bridge_name.clone(),
            connection_string: agent.connection_string.clone(),
            sensors: agent.sensors.clone(),
        }
    }
}

/// Tells every client which simulation to load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadCommand {
    pub use_seed: bool,
    pub seed: i64,
    pub name: String,
    pub map_name: String,
    pub map_url: String,
    pub api_only: bool,
    pub headless: bool,
    pub interactive: bool,
    /// ISO 8601 on the wire
    pub time_of_day: DateTime<Utc>,
    pub rain: f32,
    pub fog: f32,
    pub wetness: f32,
    pub cloudiness: f32,
    pub agents: Vec<AgentLoad>,
    pub use_traffic: bool,
    pub use_pedestrians: bool,
}

impl LoadCommand {
    /// Builds the command broadcast at the connect barrier.
    pub fn from_settings(settings: &SimulationSettings) -> Self {
        Self {
            use_seed: settings.seed.is_some(),
            seed: settings.seed.unwrap_or_default(),
            name: settings.name.clone(),
            map_name: settings.map_name.clone(),
            map_url: settings.map_url.clone(),
            api_only: settings.api_only,
            headless: settings.headless,
            interactive: settings.interactive,
            time_of_day: settings.time_of_day,
            rain: settings.rain,
            fog: settings.fog,
            wetness: settings.wetness,
            cloudiness: settings.cloudiness,
            agents: settings.agents.iter().map(AgentLoad::from).collect(),
            use_traffic: settings.use_traffic,
            use_pedestrians: settings.use_pedestrians,
        }
    }
}

/// Outcome of a client's load, reported back to the master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadResult {
    pub success: bool,
    pub error_message: String,
}

impl LoadResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error_message: String::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: message.into(),
        }
    }
}

/// A single protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Info(ClientInfo),
    Load(LoadCommand),
    LoadResult(LoadResult),
    Run,
    Stop,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Info(_) => CommandKind::Info,
            Command::Load(_) => CommandKind::Load,
            Command::LoadResult(_) => CommandKind::LoadResult,
            Command::Run => CommandKind::Run,
            Command::Stop => CommandKind::Stop,
        }
    }
}

/// Binary codec for `Command` payloads.
pub struct CommandCodec;

impl CommandCodec {
    /// Encodes a command into wire bytes.
    pub fn encode(command: &Command) -> Result<Vec<u8>, ProtocolError> {
        bincode::serialize(command).map_err(|e| ProtocolError::Encode {
            kind: command.kind(),
            reason: e.to_string(),
        })
    }

    /// Decodes wire bytes into a command.
    pub fn decode(bytes: &[u8]) -> Result<Command, ProtocolError> {
        bincode::deserialize(bytes).map_err(|e| ProtocolError::Decode {
            len: bytes.len(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_settings_copies_agents() {
        let mut settings = SimulationSettings::default();
        settings.seed = Some(1234);
        settings.agents.push(AgentSettings {
            name: "ego".into(),
            asset_url: "assets/vehicles/sedan".into(),
            bridge_name: Some("ros2".into()),
            connection_string: "localhost:9090".into(),
            sensors: "[]".into(),
        });

        let load = LoadCommand::from_settings(&settings);

        assert!(load.use_seed);
        assert_eq!(load.seed, 1234);
        assert_eq!(load.agents.len(), 1);
        assert_eq!(load.agents[0].bridge_name.as_deref(), Some("ros2"));
    }

    #[test]
    fn test_unseeded_simulation_clears_use_seed() {
        let load = LoadCommand::from_settings(&SimulationSettings::default());
        assert!(!load.use_seed);
        assert_eq!(load.seed, 0);
    }

    #[test]
    fn test_load_result_survives_codec() {
        let command = Command::LoadResult(LoadResult::failed("asset missing"));
        let bytes = CommandCodec::encode(&command).unwrap();

        match CommandCodec::decode(&bytes).unwrap() {
            Command::LoadResult(result) => {
                assert!(!result.success);
                assert_eq!(result.error_message, "asset missing");
            }
            other => panic!("unexpected command {:?}", other.kind()),
        }
    }

    #[test]
    fn test_decode_garbage_is_error() {
        let err = CommandCodec::decode(&[0xff, 0xff, 0xff, 0xff, 0x01]).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode { len: 5, .. }));
    }

    #[test]
    fn test_local_info_is_compatible() {
        assert!(ClientInfo::local().is_compatible());

        let old = ClientInfo {
            version: "0.0.1".into(),
            ..ClientInfo::local()
        };
        assert!(!old.is_compatible());
    }
}
