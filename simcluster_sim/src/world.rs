//! SimWorld - The simulation harness container.

use crate::client::{ClientBehavior, ClientStatus, SimulatedClient};
use crate::context::SimContext;
use crate::network::{SimNetwork, SimNetworkController};

use simcluster_core::{
    ClusterConfig, DriverOutcome, MasterDriver, MasterError, MasterState, MasterStateMachine, RecordingHooks,
};
use simcluster_env::ClusterContext;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Master wired to the simulated fabric.
pub type SimMaster = MasterStateMachine<SimNetwork, SimNetwork, RecordingHooks>;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Number of clients in the cluster
    pub num_clients: usize,

    /// Fabric steps a connection attempt takes
    pub connect_delay_ticks: u32,

    /// Ticks each well-behaved client spends loading
    pub load_ticks: u32,

    /// Virtual time per tick
    pub tick_interval_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_clients: 3,
            connect_delay_ticks: 1,
            load_ticks: 2,
            tick_interval_ms: 33,
        }
    }
}

/// The SimWorld - master, fabric and clients for one session.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    /// Fabric hosting the clients
    pub network: Arc<SimNetwork>,

    /// Network controller for fault injection
    pub network_controller: SimNetworkController,

    /// Host notifications raised by the master
    pub hooks: Arc<RecordingHooks>,

    /// The master under test
    pub master: SimMaster,

    addresses: Vec<String>,

    /// Current tick count
    tick_count: u64,
}

impl SimWorld {
    /// Creates a world of well-behaved clients named `client-N`.
    pub fn new(config: SimConfig) -> Self {
        let mut cluster = ClusterConfig::default();
        cluster.simulation.name = format!("sim-{}", config.seed);
        Self::with_clients(config, cluster, Vec::new())
    }

    /// Creates a world from an explicit cluster config.
    ///
    /// If the config lists no addresses, `config.num_clients` addresses are
    /// generated. `behaviors[i]` scripts the client at address `i`; clients
    /// past the end of `behaviors` behave normally.
    pub fn with_clients(config: SimConfig, mut cluster: ClusterConfig, behaviors: Vec<ClientBehavior>) -> Self {
        if cluster.network.cluster_addresses.is_empty() {
            cluster.network.cluster_addresses = (0..config.num_clients)
                .map(|i| format!("client-{}:{}", i, cluster.network.port))
                .collect();
        }
        cluster.network.tick_interval_ms = config.tick_interval_ms;

        // Derive separate seeds for different subsystems
        let context = SimContext::shared(config.seed);
        let network = Arc::new(SimNetwork::new(
            config.seed.wrapping_mul(0x9e3779b97f4a7c15),
            config.connect_delay_ticks,
        ));

        let addresses = cluster.network.cluster_addresses.clone();
        let mut behaviors = behaviors.into_iter();
        for address in &addresses {
            let behavior = behaviors
                .next()
                .unwrap_or_else(|| ClientBehavior::default().with_load_ticks(config.load_ticks));
            network.add_client(SimulatedClient::new(address.clone(), behavior));
        }

        let network_controller = network.controller();
        let hooks = Arc::new(RecordingHooks::default());
        let master = MasterStateMachine::new(network.clone(), network.clone(), hooks.clone(), cluster);

        Self {
            config,
            context,
            network,
            network_controller,
            hooks,
            master,
            addresses,
            tick_count: 0,
        }
    }

    /// Listens and issues the connection attempts.
    pub fn start(&mut self) -> Result<(), MasterError> {
        self.master.start_listening()?;
        self.master.connect_to_clients()
    }

    /// Advances simulation by one tick.
    pub fn tick(&mut self) {
        self.context
            .advance_time(Duration::from_millis(self.config.tick_interval_ms));
        self.master.tick();
        self.tick_count += 1;
    }

    /// Ticks until `done` holds or `max_ticks` passes have been made.
    ///
    /// Returns true if `done` was reached.
    pub fn run_until(&mut self, max_ticks: u64, done: impl Fn(&SimMaster) -> bool) -> bool {
        for _ in 0..max_ticks {
            self.tick();
            if done(&self.master) {
                debug!(ticks = self.tick_count, state = %self.master.state(), "Condition reached");
                return true;
            }
        }
        false
    }

    /// Ticks until the master reaches `state`.
    pub fn run_until_state(&mut self, state: MasterState, max_ticks: u64) -> bool {
        self.run_until(max_ticks, |m| m.state() == state)
    }

    /// Drives an already started session with the async master driver.
    pub async fn drive(&mut self, max_ticks: u64) -> DriverOutcome {
        let driver = MasterDriver::new(
            self.context.clone(),
            Duration::from_millis(self.config.tick_interval_ms),
        );
        let outcome = driver.run(&mut self.master, max_ticks).await;
        self.tick_count += match outcome {
            DriverOutcome::Running { ticks } | DriverOutcome::Aborted { ticks } => ticks,
            DriverOutcome::TickBudgetExhausted { .. } => max_ticks,
        };
        outcome
    }

    /// Address of the client at `index`.
    pub fn address(&self, index: usize) -> &str {
        &self.addresses[index]
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn client_status(&self, index: usize) -> Option<ClientStatus> {
        self.network.client_status(&self.addresses[index])
    }

    /// Returns true if every client is in `status`.
    pub fn all_clients(&self, status: ClientStatus) -> bool {
        self.addresses
            .iter()
            .all(|a| self.network.client_status(a).as_ref() == Some(&status))
    }

    /// Returns the current simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.context.now().as_secs_f64()
    }

    /// Returns the current tick count.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn client_count(&self) -> usize {
        self.addresses.len()
    }
}
