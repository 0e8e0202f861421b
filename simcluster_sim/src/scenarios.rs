//! Cluster bring-up scenarios for the simulation harness.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Every client connects, loads and runs
    HappyPath,

    /// One client reports a failed load
    LoadFailure,

    /// One client drops its connection while loading
    DropDuringLoad,

    /// One client is lost after the cluster is running
    DropWhileRunning,

    /// Operator stops a running cluster
    StopWhileRunning,

    /// One client sends its handshake twice
    DuplicateInfo,

    /// One client reports a different protocol version
    VersionMismatch,

    /// One connection attempt cannot be started
    RefusedConnect,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::HappyPath,
            ScenarioId::LoadFailure,
            ScenarioId::DropDuringLoad,
            ScenarioId::DropWhileRunning,
            ScenarioId::StopWhileRunning,
            ScenarioId::DuplicateInfo,
            ScenarioId::VersionMismatch,
            ScenarioId::RefusedConnect,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::HappyPath => "happy_path",
            ScenarioId::LoadFailure => "load_failure",
            ScenarioId::DropDuringLoad => "drop_during_load",
            ScenarioId::DropWhileRunning => "drop_while_running",
            ScenarioId::StopWhileRunning => "stop_while_running",
            ScenarioId::DuplicateInfo => "duplicate_info",
            ScenarioId::VersionMismatch => "version_mismatch",
            ScenarioId::RefusedConnect => "refused_connect",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::HappyPath => "All clients pass both barriers and end up running",
            ScenarioId::LoadFailure => "One failed load tears the whole cluster down before Run",
            ScenarioId::DropDuringLoad => "A client lost mid-load aborts the session",
            ScenarioId::DropWhileRunning => "A client lost while running aborts the session",
            ScenarioId::StopWhileRunning => "Stop reaches every client, teardown runs on the next tick",
            ScenarioId::DuplicateInfo => "A repeated handshake is dropped and the session still runs",
            ScenarioId::VersionMismatch => "A version mismatch is logged but does not block the session",
            ScenarioId::RefusedConnect => "A connection attempt that cannot start cancels the others",
        }
    }

    /// Returns true if the scenario is expected to end in teardown.
    pub fn expects_teardown(&self) -> bool {
        matches!(
            self,
            ScenarioId::LoadFailure
                | ScenarioId::DropDuringLoad
                | ScenarioId::DropWhileRunning
                | ScenarioId::StopWhileRunning
                | ScenarioId::RefusedConnect
        )
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "happy_path" | "happy" => Ok(ScenarioId::HappyPath),
            "load_failure" => Ok(ScenarioId::LoadFailure),
            "drop_during_load" => Ok(ScenarioId::DropDuringLoad),
            "drop_while_running" => Ok(ScenarioId::DropWhileRunning),
            "stop_while_running" | "stop" => Ok(ScenarioId::StopWhileRunning),
            "duplicate_info" => Ok(ScenarioId::DuplicateInfo),
            "version_mismatch" => Ok(ScenarioId::VersionMismatch),
            "refused_connect" => Ok(ScenarioId::RefusedConnect),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
