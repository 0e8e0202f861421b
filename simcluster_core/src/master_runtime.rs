//! Master Runtime - runs the dispatch loop on a scheduling context.
//!
//! This is the glue between the engine-agnostic `MasterStateMachine` and the
//! environment abstraction (`ClusterContext`). It owns no session state; it
//! only calls `tick()` at a fixed interval until the session settles.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       MasterDriver                        │
//! │  ┌─────────────────────────────────────────────────────┐  │
//! │  │           Context: ClusterContext                   │  │
//! │  │  • sleep(tick_interval) between passes              │  │
//! │  └─────────────────────────────────────────────────────┘  │
//! │                           │                               │
//! │  ┌─────────────────────────────────────────────────────┐  │
//! │  │  MasterStateMachine::tick()                         │  │
//! │  │   deferred teardown → connection events → commands  │  │
//! │  └─────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use simcluster_core::master_runtime::MasterDriver;
//! use simcluster_env::TokioContext;
//!
//! let driver = MasterDriver::new(TokioContext::shared(), Duration::from_millis(33));
//! let outcome = driver.run_session(&mut master, 10_000).await?;
//! ```

use crate::hooks::SessionHooks;
use crate::master::{MasterError, MasterStateMachine};
use crate::state::MasterState;

use simcluster_env::{ClusterContext, CommandChannel, PeerConnection};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// How a driven session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverOutcome {
    /// Every client is running
    Running { ticks: u64 },
    /// The session collapsed back to `Initial`
    Aborted { ticks: u64 },
    /// Tick budget used up while still in `state`
    TickBudgetExhausted { state: MasterState },
}

/// Drives a master on a fixed tick interval.
pub struct MasterDriver<Ctx: ClusterContext> {
    context: Arc<Ctx>,
    tick_interval: Duration,
}

impl<Ctx: ClusterContext> MasterDriver<Ctx> {
    pub fn new(context: Arc<Ctx>, tick_interval: Duration) -> Self {
        Self { context, tick_interval }
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Listens, connects to the configured cluster, and drives the session.
    pub async fn run_session<Conn, Chan, H>(
        &self,
        master: &mut MasterStateMachine<Conn, Chan, H>,
        max_ticks: u64,
    ) -> Result<DriverOutcome, MasterError>
    where
        Conn: PeerConnection,
        Chan: CommandChannel,
        H: SessionHooks,
    {
        master.start_listening()?;
        master.connect_to_clients()?;
        Ok(self.run(master, max_ticks).await)
    }

    /// Ticks an already started session until it is running, aborts, or
    /// `max_ticks` passes have been made.
    pub async fn run<Conn, Chan, H>(
        &self,
        master: &mut MasterStateMachine<Conn, Chan, H>,
        max_ticks: u64,
    ) -> DriverOutcome
    where
        Conn: PeerConnection,
        Chan: CommandChannel,
        H: SessionHooks,
    {
        for tick in 1..=max_ticks {
            master.tick();

            match master.state() {
                MasterState::Running => {
                    info!(ticks = tick, elapsed_ms = self.context.now().as_millis() as u64, "Cluster running");
                    return DriverOutcome::Running { ticks: tick };
                }
                MasterState::Initial => {
                    warn!(ticks = tick, "Session aborted");
                    return DriverOutcome::Aborted { ticks: tick };
                }
                _ => {}
            }

            self.context.sleep(self.tick_interval).await;
        }

        warn!(state = %master.state(), max_ticks, "Tick budget exhausted");
        DriverOutcome::TickBudgetExhausted { state: master.state() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterConfig;
    use crate::hooks::{HookEvent, RecordingHooks};
    use crate::testing::MockTransport;
    use simcluster_env::TokioContext;

    fn config(n: usize) -> ClusterConfig {
        let mut config = ClusterConfig::default();
        config.network.cluster_addresses = (0..n).map(|i| format!("client-{}:9999", i)).collect();
        config
    }

    #[tokio::test]
    async fn test_driver_reaches_running() {
        let transport = Arc::new(MockTransport::auto_replying());
        let hooks = Arc::new(RecordingHooks::default());
        let mut master = MasterStateMachine::new(transport.clone(), transport.clone(), hooks.clone(), config(3));

        let driver = MasterDriver::new(TokioContext::shared(), Duration::from_millis(1));
        let outcome = driver.run_session(&mut master, 10).await.unwrap();

        // tick 1: connect + info -> Load; tick 2: load results -> Run
        assert_eq!(outcome, DriverOutcome::Running { ticks: 2 });
        assert_eq!(transport.listening_port(), Some(9999));
        assert_eq!(hooks.events(), vec![HookEvent::AllReady]);
    }

    #[tokio::test]
    async fn test_driver_exhausts_budget() {
        let transport = Arc::new(MockTransport::new());
        let hooks = Arc::new(RecordingHooks::default());
        let mut master = MasterStateMachine::new(transport.clone(), transport, hooks, config(2));

        let driver = MasterDriver::new(TokioContext::shared(), Duration::from_millis(1));
        let outcome = driver.run_session(&mut master, 3).await.unwrap();

        assert_eq!(outcome, DriverOutcome::TickBudgetExhausted { state: MasterState::Connecting });
    }

    #[tokio::test]
    async fn test_driver_reports_abort() {
        let transport = Arc::new(MockTransport::new());
        let hooks = Arc::new(RecordingHooks::default());
        let mut master = MasterStateMachine::new(transport.clone(), transport.clone(), hooks, config(2));
        master.connect_to_clients().unwrap();
        let peer = master.registry().handles()[0];
        transport.push_event(simcluster_env::ConnectionEvent::PeerDisconnected(peer));

        let driver = MasterDriver::new(TokioContext::shared(), Duration::from_millis(1));
        let outcome = driver.run(&mut master, 5).await;

        assert_eq!(outcome, DriverOutcome::Aborted { ticks: 1 });
    }
}
