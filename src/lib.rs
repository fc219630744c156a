//! DvaraNav - Door-aware navigation for voxel-world agents
//!
//! A navigation layer for worlds whose traversability changes at runtime
//! and is only partially observable: hinged barriers (doors, gates,
//! trapdoors) must be discovered, toggled open, and verified before their
//! cells become passable. Barrier state is cached, invalidated, and
//! reconciled with in-flight interaction attempts without infinite retry
//! loops or stale-state deadlocks.
//!
//! ## Architecture
//!
//! - [`registry::ObstacleRegistry`]: cache of discovered barrier state,
//!   lazily populated, cleared at episode boundaries
//! - [`inference::PassiveStateInference`]: learns barrier state from the
//!   motion of other agents instead of polling
//! - [`planning::RoutePlanner`]: grid search where barrier cells are
//!   costed and tagged rather than treated as walkable or blocked
//! - [`interaction::InteractionController`]: bounded-retry state machine
//!   that approaches, toggles, and verifies a single barrier
//! - [`executor::ExecutionLoop`]: plan, walk, delegate tagged waypoints,
//!   replan once, report a terminal outcome
//!
//! The world itself is reached only through [`world::WorldApi`]; protocol
//! handling, command parsing, and process lifecycle live outside this
//! crate.

pub mod config;
pub mod error;
pub mod executor;
pub mod inference;
pub mod interaction;
pub mod planning;
pub mod registry;
pub mod shared;
pub mod types;
pub mod world;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::DvaraConfig;
pub use error::{DvaraError, Result};
pub use executor::{ExecutionLoop, NavStatus};
pub use registry::{shared_registry, ObstacleRegistry, SharedRegistry};
pub use types::{Facing, ObstacleId, ObstacleKind, Position, Waypoint};
pub use world::{MoveOutcome, ObstacleDescriptor, WorldApi};
