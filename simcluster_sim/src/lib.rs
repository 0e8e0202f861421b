//! simcluster Deterministic Simulation Harness
//!
//! Runs the master control plane against a fully simulated cluster:
//! - **Time**: virtual clock that only moves when the harness ticks
//! - **Network**: in-memory fabric with connect delays, kills and refusals
//! - **Clients**: scripted peers that speak the cluster protocol
//! - **Randomness**: all interleaving derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ MasterStateMachine (SimNetwork, RecordingHooks)      │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                          │ tick()                           │
//! │  ┌───────────────────────▼──────────────────────────────┐   │
//! │  │ SimNetwork ◄── SimNetworkController (fault injection) │   │
//! │  └──────┬──────────────┬──────────────┬─────────────────┘   │
//! │    ┌────▼────┐    ┌────▼────┐    ┌────▼────┐                │
//! │    │ Client  │    │ Client  │    │ Client  │   ...          │
//! │    │   #0    │    │   #1    │    │   #2    │                │
//! │    └─────────┘    └─────────┘    └─────────┘                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use simcluster_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 6).run(ScenarioId::DropDuringLoad);
//! assert!(result.passed);
//! ```

mod client;
mod context;
mod network;
mod runner;
mod world;
pub mod scenarios;

pub use client::{ClientBehavior, ClientPhase, ClientStatus, SimulatedClient};
pub use context::SimContext;
pub use network::{FabricStats, SimNetwork, SimNetworkController};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use world::{SimConfig, SimMaster, SimWorld};
