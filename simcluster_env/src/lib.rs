//! simcluster Environment Abstraction Layer
//!
//! This crate provides the narrow interfaces the master control plane uses
//! to talk to the outside world, so the same state machine can run against
//! a real transport or the deterministic in-memory fabric of `simcluster_sim`.
//!
//! # Collaborators
//!
//! - **Connections** (`PeerConnection`): listen / connect / disconnect, plus
//!   connect and disconnect events drained once per tick via `pump_events()`.
//! - **Commands** (`CommandChannel`): unicast / broadcast of opaque payloads
//!   with a delivery class, and inbound payloads drained per tick.
//! - **Scheduling** (`ClusterContext`): clock and sleep for the tick loop.
//!
//! None of these calls block. Events produced by background I/O are queued
//! by the implementation and handed to the single control context on the
//! next pump, so the core never needs locks of its own.
//!
//! # Example
//!
//! ```ignore
//! use simcluster_env::{ClusterContext, PeerConnection};
//!
//! async fn pump_loop<Ctx: ClusterContext, Conn: PeerConnection>(ctx: &Ctx, conn: &Conn) {
//!     loop {
//!         for event in conn.pump_events() {
//!             handle(event);
//!         }
//!         ctx.sleep(Duration::from_millis(33)).await;
//!     }
//! }
//! ```

mod context;
mod network;
mod types;
mod error;
mod tokio_impl;

pub use context::ClusterContext;
pub use network::{PeerConnection, CommandChannel};
pub use types::{PeerHandle, DeliveryClass, ConnectionEvent, InboundMessage};
pub use error::EnvError;
pub use tokio_impl::TokioContext;
