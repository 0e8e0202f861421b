//! Error types for the simcluster environment abstraction.

use thiserror::Error;

/// Errors reported by transport collaborators.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Send or connect failed (buffer full, transport stopped, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Target address or peer cannot be reached
    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),

    /// Binding the listen port failed
    #[error("Failed to listen on port {port}: {reason}")]
    ListenFailed { port: u16, reason: String },

    /// Payload serialization/deserialization failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkError(msg.into())
    }

    /// Creates an unreachable error.
    pub fn unreachable(target: impl std::fmt::Display) -> Self {
        Self::PeerUnreachable(target.to_string())
    }
}
