//! Read-only configuration input for a cluster session.
//!
//! Loaded once (usually from JSON) before `connect_to_clients` is invoked.
//! The master keeps its own copy and never mutates it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Invalid config JSON: {0}")]
    Parse(String),

    #[error("Cluster address list is empty")]
    EmptyCluster,

    #[error("Duplicate cluster address: {0}")]
    DuplicateAddress(String),

    #[error("{field} must be within [0, 1], got {value}")]
    OutOfRange { field: &'static str, value: f32 },
}

/// Network settings for the master node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Port the master listens on
    pub port: u16,

    /// Addresses of every client expected in the cluster
    pub cluster_addresses: Vec<String>,

    /// Interval between dispatch passes of the driver loop
    pub tick_interval_ms: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            port: 9999,
            cluster_addresses: Vec::new(),
            tick_interval_ms: 33,
        }
    }
}

/// Agent to spawn on every client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    pub name: String,
    pub asset_url: String,
    #[serde(default)]
    pub bridge_name: Option<String>,
    #[serde(default)]
    pub connection_string: String,
    /// Sensor configuration (opaque JSON document)
    #[serde(default)]
    pub sensors: String,
}

/// The simulation every client loads for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Fixed seed; `None` lets each client pick its own
    pub seed: Option<i64>,
    pub name: String,
    pub map_name: String,
    pub map_url: String,
    pub api_only: bool,
    pub headless: bool,
    pub interactive: bool,
    pub time_of_day: DateTime<Utc>,
    pub rain: f32,
    pub fog: f32,
    pub wetness: f32,
    pub cloudiness: f32,
    pub agents: Vec<AgentSettings>,
    pub use_traffic: bool,
    pub use_pedestrians: bool,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            seed: None,
            name: "default".to_string(),
            map_name: "BorregasAve".to_string(),
            map_url: String::new(),
            api_only: false,
            headless: false,
            interactive: false,
            // 2024-01-01 12:00:00 UTC
            time_of_day: DateTime::from_timestamp(1_704_110_400, 0).unwrap_or_default(),
            rain: 0.0,
            fog: 0.0,
            wetness: 0.0,
            cloudiness: 0.0,
            agents: Vec::new(),
            use_traffic: false,
            use_pedestrians: false,
        }
    }
}

impl SimulationSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("rain", self.rain),
            ("fog", self.fog),
            ("wetness", self.wetness),
            ("cloudiness", self.cloudiness),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange { field, value });
            }
        }
        Ok(())
    }
}

/// Everything the master needs for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub network: NetworkSettings,
    pub simulation: SimulationSettings,
}

impl ClusterConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: ClusterConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&json)
    }

    /// Checks the invariants the master relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.cluster_addresses.is_empty() {
            return Err(ConfigError::EmptyCluster);
        }

        let mut seen = HashSet::new();
        for address in &self.network.cluster_addresses {
            if !seen.insert(address.as_str()) {
                return Err(ConfigError::DuplicateAddress(address.clone()));
            }
        }

        self.simulation.validate()
    }
}
