//! Scheduling context trait for the master tick loop.

use async_trait::async_trait;
use std::time::Duration;

/// Clock and scheduling interface for the cooperative tick loop.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`
/// - **Simulation**: `SimContext` - virtual clock advanced by the harness
///
/// # Determinism
///
/// The master never reads the wall clock directly. In simulation the
/// virtual clock only moves when the harness (or `sleep`) advances it.
#[async_trait]
pub trait ClusterContext: Send + Sync + 'static {
    /// Returns the monotonic time since context creation.
    fn now(&self) -> Duration;

    /// Suspends the tick loop for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    fn seed(&self) -> u64;
}
