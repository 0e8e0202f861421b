//! Scenario runner - executes cluster bring-up scenarios.

use crate::client::{ClientBehavior, ClientPhase, ClientStatus};
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld};

use simcluster_core::{ClientInfo, ClusterConfig, HookEvent, MasterError, MasterState, TeardownReason};
use simcluster_env::EnvError;
use tracing::{debug, info};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Master state when the scenario finished
    pub final_state: MasterState,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioMetrics {
    pub load_broadcasts: u64,
    pub run_broadcasts: u64,
    pub stop_broadcasts: u64,
    pub teardowns: u64,

    /// Commands the master logged and dropped
    pub dropped_messages: u64,

    /// Payloads delivered client -> master
    pub messages_to_master: u64,

    /// Payloads queued master -> client
    pub messages_to_clients: u64,
}

/// Collects failed assertions for one run.
#[derive(Default)]
struct Checks {
    failures: Vec<String>,
}

impl Checks {
    fn expect(&mut self, ok: bool, what: &str) {
        if !ok {
            self.failures.push(what.to_string());
        }
    }
}

/// Runs cluster scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Number of clients when the cluster config lists none
    num_clients: usize,

    /// Tick budget per phase
    max_ticks: u64,

    /// Ticks well-behaved clients spend loading
    load_ticks: u32,

    /// Cluster config to run against
    cluster: Option<ClusterConfig>,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, num_clients: usize) -> Self {
        Self {
            seed,
            num_clients: num_clients.max(1),
            max_ticks: 200,
            load_ticks: 2,
            cluster: None,
        }
    }

    /// Sets the tick budget per phase.
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    pub fn with_load_ticks(mut self, ticks: u32) -> Self {
        self.load_ticks = ticks;
        self
    }

    /// Runs against a loaded cluster config instead of generated addresses.
    pub fn with_cluster(mut self, cluster: ClusterConfig) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        match scenario {
            ScenarioId::HappyPath => self.run_happy_path(),
            ScenarioId::LoadFailure => self.run_load_failure(),
            ScenarioId::DropDuringLoad => self.run_drop_during_load(),
            ScenarioId::DropWhileRunning => self.run_drop_while_running(),
            ScenarioId::StopWhileRunning => self.run_stop_while_running(),
            ScenarioId::DuplicateInfo => self.run_duplicate_info(),
            ScenarioId::VersionMismatch => self.run_version_mismatch(),
            ScenarioId::RefusedConnect => self.run_refused_connect(),
        }
    }

    fn client_count(&self) -> usize {
        match &self.cluster {
            Some(c) if !c.network.cluster_addresses.is_empty() => c.network.cluster_addresses.len(),
            _ => self.num_clients,
        }
    }

    /// The client a scenario misbehaves with, picked from the seed.
    fn victim(&self) -> usize {
        (self.seed % self.client_count() as u64) as usize
    }

    fn normal(&self) -> ClientBehavior {
        ClientBehavior::default().with_load_ticks(self.load_ticks)
    }

    /// Builds a world where only the victim uses `victim_behavior`.
    fn world(&self, victim_behavior: Option<ClientBehavior>) -> SimWorld {
        let config = SimConfig {
            seed: self.seed,
            num_clients: self.num_clients,
            load_ticks: self.load_ticks,
            ..Default::default()
        };
        let cluster = self.cluster.clone().unwrap_or_else(|| {
            let mut cluster = ClusterConfig::default();
            cluster.simulation.name = format!("sim-{}", self.seed);
            cluster
        });

        let mut behaviors: Vec<ClientBehavior> = (0..self.client_count()).map(|_| self.normal()).collect();
        if let Some(behavior) = victim_behavior {
            behaviors[self.victim()] = behavior;
        }

        SimWorld::with_clients(config, cluster, behaviors)
    }

    /// Starts the session and ticks until every client is running.
    fn bring_up(&self, world: &mut SimWorld, checks: &mut Checks) -> bool {
        if let Err(e) = world.start() {
            checks.failures.push(format!("connect attempts could not be issued: {}", e));
            return false;
        }
        let reached = world.run_until_state(MasterState::Running, self.max_ticks);
        checks.expect(reached, "cluster never reached Running");
        if reached {
            // Let Run reach the clients
            world.tick();
        }
        reached
    }

    /// Common checks after the session collapsed.
    fn expect_torn_down(&self, world: &SimWorld, checks: &mut Checks) {
        checks.expect(world.master.state() == MasterState::Initial, "master did not return to Initial");
        checks.expect(world.master.registry().is_empty(), "registry not cleared by teardown");
        checks.expect(world.master.stats().teardowns == 1, "expected exactly one teardown");
    }

    /// Checks that a lost peer aborted the session, teardown first.
    fn expect_peer_lost(&self, world: &SimWorld, checks: &mut Checks) {
        let events = world.hooks.events();
        let teardown = events
            .iter()
            .position(|e| matches!(e, HookEvent::Teardown(TeardownReason::PeerLost(_))));
        let abort = events
            .iter()
            .position(|e| matches!(e, HookEvent::SessionAbort(TeardownReason::PeerLost(_))));

        match (teardown, abort) {
            (Some(t), Some(a)) => checks.expect(t < a, "session abort raised before teardown"),
            _ => checks.failures.push("peer loss not reported as teardown + abort".to_string()),
        }
    }

    fn finish(&self, scenario: ScenarioId, world: &SimWorld, checks: Checks) -> ScenarioResult {
        let stats = world.master.stats();
        let fabric = world.network.stats();
        let passed = checks.failures.is_empty();

        debug!(
            scenario = %scenario,
            ticks = world.tick_count(),
            state = %world.master.state(),
            passed,
            "Scenario finished"
        );

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            total_ticks: world.tick_count(),
            final_state: world.master.state(),
            failure_reason: if passed { None } else { Some(checks.failures.join("; ")) },
            metrics: ScenarioMetrics {
                load_broadcasts: stats.load_broadcasts,
                run_broadcasts: stats.run_broadcasts,
                stop_broadcasts: stats.stop_broadcasts,
                teardowns: stats.teardowns,
                dropped_messages: stats.dropped_messages,
                messages_to_master: fabric.messages_to_master,
                messages_to_clients: fabric.messages_to_clients,
            },
        }
    }

    /// Every client passes both barriers.
    ///
    /// **Assertion**: exactly one Load and one Run, every client running the
    /// configured simulation, `on_all_ready` the only notification.
    fn run_happy_path(&self) -> ScenarioResult {
        let mut world = self.world(None);
        let mut checks = Checks::default();

        if self.bring_up(&mut world, &mut checks) {
            let stats = world.master.stats();
            checks.expect(stats.load_broadcasts == 1, "Load sent more than once");
            checks.expect(stats.run_broadcasts == 1, "Run sent more than once");
            checks.expect(world.all_clients(ClientStatus::Running), "not every client received Run");
            checks.expect(world.hooks.events() == vec![HookEvent::AllReady], "unexpected host notifications");

            let expected = world.master.config().simulation.name.clone();
            let loaded = world.addresses().iter().all(|a| {
                world
                    .network
                    .client_last_load(a)
                    .map(|load| load.name == expected)
                    .unwrap_or(false)
            });
            checks.expect(loaded, "a client loaded the wrong simulation");
        }

        self.finish(ScenarioId::HappyPath, &world, checks)
    }

    /// One client reports a failed load.
    ///
    /// **Assertion**: the error reaches the host once, the cluster tears down
    /// and Run is never sent.
    fn run_load_failure(&self) -> ScenarioResult {
        let failing = ClientBehavior::failing_load("map bundle not found").with_load_ticks(0);
        let mut world = self.world(Some(failing));
        let mut checks = Checks::default();

        match world.start() {
            Ok(()) => {
                let torn_down = world.run_until(self.max_ticks, |m| m.stats().teardowns > 0);
                checks.expect(torn_down, "load failure did not tear the session down");
            }
            Err(e) => checks.failures.push(format!("connect attempts could not be issued: {}", e)),
        }

        self.expect_torn_down(&world, &mut checks);
        let errors = world.hooks.load_errors();
        checks.expect(
            errors.len() == 1 && errors[0].1 == "map bundle not found",
            "load error not reported exactly once",
        );
        checks.expect(
            matches!(world.hooks.teardowns().as_slice(), [TeardownReason::LoadFailed(_)]),
            "teardown reason is not the failed load",
        );
        checks.expect(world.master.stats().run_broadcasts == 0, "Run sent despite a failed load");
        checks.expect(
            !world
                .addresses()
                .iter()
                .any(|a| world.network.client_status(a) == Some(ClientStatus::Running)),
            "a client started running",
        );

        self.finish(ScenarioId::LoadFailure, &world, checks)
    }

    /// One client drops its connection on receiving Load.
    fn run_drop_during_load(&self) -> ScenarioResult {
        let mut world = self.world(Some(ClientBehavior::dropping_in(ClientPhase::Loading)));
        let mut checks = Checks::default();

        match world.start() {
            Ok(()) => {
                let torn_down = world.run_until(self.max_ticks, |m| m.stats().teardowns > 0);
                checks.expect(torn_down, "lost client did not tear the session down");
            }
            Err(e) => checks.failures.push(format!("connect attempts could not be issued: {}", e)),
        }

        self.expect_torn_down(&world, &mut checks);
        self.expect_peer_lost(&world, &mut checks);
        checks.expect(world.master.stats().load_broadcasts == 1, "Load not sent exactly once");
        checks.expect(world.master.stats().run_broadcasts == 0, "Run sent after a client was lost");

        self.finish(ScenarioId::DropDuringLoad, &world, checks)
    }

    /// The fabric severs one client after the cluster is running.
    fn run_drop_while_running(&self) -> ScenarioResult {
        let mut world = self.world(None);
        let mut checks = Checks::default();

        if self.bring_up(&mut world, &mut checks) {
            let victim = world.address(self.victim()).to_string();
            checks.expect(world.network_controller.kill(&victim), "victim had no link to kill");

            let torn_down = world.run_until(self.max_ticks, |m| m.stats().teardowns > 0);
            checks.expect(torn_down, "lost client did not tear the session down");

            self.expect_torn_down(&world, &mut checks);
            self.expect_peer_lost(&world, &mut checks);
            checks.expect(world.network.connected_count() == 0, "surviving clients still connected");
        }

        self.finish(ScenarioId::DropWhileRunning, &world, checks)
    }

    /// Operator stops a running cluster.
    ///
    /// **Assertion**: teardown waits for the next tick, every client sees
    /// Stop, and no abort is raised.
    fn run_stop_while_running(&self) -> ScenarioResult {
        let mut world = self.world(None);
        let mut checks = Checks::default();

        if self.bring_up(&mut world, &mut checks) {
            if let Err(e) = world.master.broadcast_stop() {
                checks.failures.push(format!("stop broadcast failed: {}", e));
            }
            checks.expect(world.master.teardown_pending(), "teardown not deferred");
            checks.expect(world.master.state() == MasterState::Running, "stop tore down immediately");

            world.tick();

            self.expect_torn_down(&world, &mut checks);
            checks.expect(world.all_clients(ClientStatus::Stopped), "not every client received Stop");
            checks.expect(
                world.hooks.teardowns() == vec![TeardownReason::Stopped],
                "teardown reason is not Stopped",
            );
            checks.expect(
                world.hooks.count(|e| matches!(e, HookEvent::StopBroadcast)) == 1,
                "stop broadcast not reported",
            );
            checks.expect(
                world.hooks.count(|e| matches!(e, HookEvent::SessionAbort(_))) == 0,
                "operator stop reported as abort",
            );
        }

        self.finish(ScenarioId::StopWhileRunning, &world, checks)
    }

    /// One client sends its handshake twice.
    fn run_duplicate_info(&self) -> ScenarioResult {
        let behavior = ClientBehavior {
            duplicate_info: true,
            ..self.normal()
        };
        let mut world = self.world(Some(behavior));
        let mut checks = Checks::default();

        if self.bring_up(&mut world, &mut checks) {
            let stats = world.master.stats();
            checks.expect(stats.dropped_messages >= 1, "duplicate Info was not dropped");
            checks.expect(stats.load_broadcasts == 1, "duplicate Info released Load twice");
            checks.expect(world.hooks.teardowns().is_empty(), "duplicate Info tore the session down");
        }

        self.finish(ScenarioId::DuplicateInfo, &world, checks)
    }

    /// One client reports a different protocol version.
    fn run_version_mismatch(&self) -> ScenarioResult {
        let behavior = ClientBehavior {
            info: ClientInfo {
                version: "0.0.0-mismatch".to_string(),
                ..ClientInfo::local()
            },
            ..self.normal()
        };
        let mut world = self.world(Some(behavior));
        let mut checks = Checks::default();

        if self.bring_up(&mut world, &mut checks) {
            let victim = world.address(self.victim()).to_string();
            let recorded = world
                .master
                .registry()
                .iter()
                .find(|r| r.address.as_deref() == Some(victim.as_str()))
                .and_then(|r| r.info.as_ref())
                .map(|info| info.version.clone());
            checks.expect(
                recorded.as_deref() == Some("0.0.0-mismatch"),
                "client info not recorded from handshake",
            );
        }

        self.finish(ScenarioId::VersionMismatch, &world, checks)
    }

    /// One connection attempt cannot be started.
    ///
    /// **Assertion**: the error reaches the caller, attempts already issued
    /// are cancelled and the master is back in Initial.
    fn run_refused_connect(&self) -> ScenarioResult {
        let mut world = self.world(None);
        let mut checks = Checks::default();

        let victim = world.address(self.victim()).to_string();
        world.network_controller.refuse(&victim);

        let result = world.start();
        checks.expect(
            matches!(result, Err(MasterError::Env(EnvError::PeerUnreachable(_)))),
            "refused connect not reported to the caller",
        );
        checks.expect(
            world.hooks.teardowns() == vec![TeardownReason::ConnectFailed],
            "teardown reason is not ConnectFailed",
        );

        world.run_until(3, |_| false);

        self.expect_torn_down(&world, &mut checks);
        checks.expect(world.network.connected_count() == 0, "cancelled attempt still connected");
        checks.expect(
            world.all_clients(ClientStatus::Idle),
            "a client saw a connection from a cancelled attempt",
        );

        self.finish(ScenarioId::RefusedConnect, &world, checks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_passes(result: &ScenarioResult) {
        assert!(
            result.passed,
            "{} seed={} failed: {:?}",
            result.scenario, result.seed, result.failure_reason
        );
    }

    #[test]
    fn test_happy_path_scenario() {
        let result = ScenarioRunner::new(42, 3).run(ScenarioId::HappyPath);

        assert_passes(&result);
        assert_eq!(result.final_state, MasterState::Running);
        assert_eq!(result.metrics.load_broadcasts, 1);
        assert_eq!(result.metrics.run_broadcasts, 1);
        assert_eq!(result.metrics.teardowns, 0);
    }

    #[test]
    fn test_load_failure_scenario() {
        let result = ScenarioRunner::new(42, 4).run(ScenarioId::LoadFailure);

        assert_passes(&result);
        assert_eq!(result.final_state, MasterState::Initial);
        assert_eq!(result.metrics.run_broadcasts, 0);
    }

    #[test]
    fn test_drop_scenarios() {
        let runner = ScenarioRunner::new(7, 3);

        assert_passes(&runner.run(ScenarioId::DropDuringLoad));
        assert_passes(&runner.run(ScenarioId::DropWhileRunning));
    }

    #[test]
    fn test_stop_while_running_scenario() {
        let result = ScenarioRunner::new(42, 5).run(ScenarioId::StopWhileRunning);

        assert_passes(&result);
        assert_eq!(result.metrics.stop_broadcasts, 1);
        assert_eq!(result.metrics.teardowns, 1);
    }

    #[test]
    fn test_anomaly_scenarios_keep_running() {
        let runner = ScenarioRunner::new(3, 3);

        let duplicate = runner.run(ScenarioId::DuplicateInfo);
        assert_passes(&duplicate);
        assert!(duplicate.metrics.dropped_messages >= 1);

        let mismatch = runner.run(ScenarioId::VersionMismatch);
        assert_passes(&mismatch);
        assert_eq!(mismatch.final_state, MasterState::Running);
    }

    #[test]
    fn test_refused_connect_scenario() {
        for seed in 0..3 {
            assert_passes(&ScenarioRunner::new(seed, 3).run(ScenarioId::RefusedConnect));
        }
    }

    #[test]
    fn test_single_client_cluster() {
        let runner = ScenarioRunner::new(11, 1);

        for scenario in ScenarioId::all() {
            assert_passes(&runner.run(scenario));
        }
    }

    #[test]
    fn test_all_scenarios_across_seeds() {
        for seed in 0..10 {
            let runner = ScenarioRunner::new(seed, 6).with_load_ticks((seed % 4) as u32);
            for scenario in ScenarioId::all() {
                assert_passes(&runner.run(scenario));
            }
        }
    }

    #[test]
    fn test_scenarios_deterministic() {
        let runner1 = ScenarioRunner::new(42, 6);
        let runner2 = ScenarioRunner::new(42, 6);

        for scenario in ScenarioId::all() {
            let result1 = runner1.run(scenario);
            let result2 = runner2.run(scenario);

            assert_eq!(result1.total_ticks, result2.total_ticks);
            assert_eq!(result1.metrics, result2.metrics);
        }
    }

    #[test]
    fn test_scenario_with_loaded_cluster() {
        let json = r#"{
            "network": { "cluster_addresses": ["10.0.0.2:9999", "10.0.0.3:9999"] },
            "simulation": { "name": "from-file", "seed": 5 }
        }"#;
        let cluster = ClusterConfig::from_json_str(json).unwrap();
        let runner = ScenarioRunner::new(1, 8).with_cluster(cluster);

        let result = runner.run(ScenarioId::HappyPath);

        assert_passes(&result);
        assert_eq!(result.metrics.messages_to_master, 4);
    }

    #[test]
    fn test_tight_budget_fails_cleanly() {
        let result = ScenarioRunner::new(42, 3).with_max_ticks(1).run(ScenarioId::HappyPath);

        assert!(!result.passed);
        assert!(result.failure_reason.unwrap().contains("never reached Running"));
    }
}
