//! Error types for DvaraNav

use thiserror::Error;

use crate::types::{ObstacleId, Position};

/// DvaraNav error type.
///
/// Every variant is recoverable at the `ExecutionLoop` boundary; nothing in
/// this crate terminates the process. The caller decides whether a failed
/// request is retried, and with what destination.
#[derive(Error, Debug)]
pub enum DvaraError {
    #[error("no route from {origin} to {destination}: {reason}")]
    Planning {
        origin: Position,
        destination: Position,
        reason: String,
    },

    #[error("movement to {0} timed out")]
    MovementTimeout(Position),

    #[error("movement to {target} failed: {reason}")]
    Movement { target: Position, reason: String },

    #[error("obstacle {0} did not open after {1} attempts")]
    Interaction(ObstacleId, u32),

    #[error("obstacle {0} is no longer describable by the world")]
    RegistryInconsistency(ObstacleId),

    #[error("navigation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for DvaraError {
    fn from(e: toml::de::Error) -> Self {
        DvaraError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DvaraError>;
