//! simcluster Core - master control plane for a distributed simulation cluster
//!
//! Brings a fixed set of client nodes from "not connected" to "running the
//! same simulation" in lock-step:
//! 1. **Connect**: one connection attempt per configured address, then an
//!    `Info` handshake from every client
//! 2. **Load**: `Load` goes out only once every client has shaken hands
//! 3. **Run**: `Run` goes out only once every client reported a successful load
//!
//! Any peer loss, load failure or operator stop collapses the whole cluster
//! back to `Initial`.

pub mod config;
pub mod hooks;
pub mod master;
pub mod master_runtime;
pub mod protocol;
pub mod registry;
pub mod state;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use config::{AgentSettings, ClusterConfig, ConfigError, NetworkSettings, SimulationSettings};
pub use hooks::{HookEvent, NoopHooks, RecordingHooks, SessionHooks, TeardownReason};
pub use master::{MasterError, MasterStateMachine, MasterStats};
pub use master_runtime::{DriverOutcome, MasterDriver};
pub use protocol::{ClientInfo, Command, CommandCodec, CommandKind, LoadCommand, LoadResult, ProtocolError};
pub use registry::{ClientRecord, ClientRegistry, RegistryError};
pub use state::{MasterState, PeerState};
