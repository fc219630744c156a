//! World collaborator interface.
//!
//! The core never talks to a protocol directly; everything it needs from the
//! world (connectivity, barrier descriptors, movement, toggling) comes
//! through [`WorldApi`]. Implementations live outside this crate.

use std::time::Duration;

use crate::types::{Facing, ObstacleKind, Position};

/// Snapshot of a barrier cell as the world reports it.
///
/// `facing` is optional because worlds occasionally produce partial
/// descriptors; a descriptor without an orientation is skipped at
/// registration rather than guessed at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObstacleDescriptor {
    pub kind: ObstacleKind,
    pub facing: Option<Facing>,
    pub open: bool,
}

/// Outcome of a movement request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Arrived within tolerance.
    Arrived,
    /// The move did not complete within the timeout.
    TimedOut,
    /// The world rejected or aborted the move.
    Failed(String),
}

/// Services the navigation core consumes from the world/agent collaborator.
///
/// `move_to` suspends the calling control flow until arrival or timeout;
/// `toggle` is fire-and-forget, with the result observed via `describe`
/// polling. Push-style observations (other agents moving, barrier state
/// changes) are delivered by the embedding to
/// [`PassiveStateInference`](crate::inference::PassiveStateInference).
pub trait WorldApi: Send + Sync {
    /// Current position of the agent under control.
    fn position(&self) -> Position;

    /// Whether the agent can occupy this cell as plain terrain.
    /// Barrier cells report false here and are described separately.
    fn is_walkable(&self, position: Position) -> bool;

    /// Positions of conditionally-passable barrier cells near `near`,
    /// at most `limit` of them within `max_distance`.
    fn find_obstacles(&self, near: Position, max_distance: i32, limit: usize) -> Vec<Position>;

    /// Describe the barrier at `position`, if one exists there.
    fn describe(&self, position: Position) -> Option<ObstacleDescriptor>;

    /// Move the agent to `target`, suspending until arrival or timeout.
    fn move_to(&self, target: Position, tolerance: f32, timeout: Duration) -> MoveOutcome;

    /// Toggle the barrier at `position`.
    fn toggle(&self, position: Position);
}
