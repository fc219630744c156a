//! Passive state inference from third-party observations.
//!
//! An agent cannot occupy a barrier's cell unless it is passable, so
//! watching other agents move is a cheap and reliable way to learn that a
//! barrier is effectively open without interacting with it. The inferred
//! state is time-bounded: the barrier may have closed again since.

use std::time::Duration;

use crate::registry::SharedRegistry;
use crate::types::Position;

/// Configuration for passive inference.
#[derive(Clone, Debug)]
pub struct InferenceConfig {
    /// How long an observed pass-through keeps a barrier assumed open.
    pub assumed_open_ttl: Duration,
    /// Bounding volume around an observed agent position, per axis.
    pub volume_x: i32,
    pub volume_y: i32,
    pub volume_z: i32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            assumed_open_ttl: Duration::from_secs(5),
            volume_x: 1,
            volume_y: 2,
            volume_z: 1,
        }
    }
}

/// Watches other agents' motion and opportunistically marks barriers as
/// likely open. The embedding wires these handlers to its event source.
pub struct PassiveStateInference {
    config: InferenceConfig,
    registry: SharedRegistry,
}

impl PassiveStateInference {
    pub fn new(config: InferenceConfig, registry: SharedRegistry) -> Self {
        Self { config, registry }
    }

    /// Another tracked agent moved. Every registered obstacle within the
    /// bounding volume of its position is marked assumed-open for the TTL.
    pub fn on_agent_moved(&self, agent_id: &str, position: Position) {
        let mut registry = self.registry.lock();
        let hits = registry.within_volume(
            position,
            self.config.volume_x,
            self.config.volume_y,
            self.config.volume_z,
        );

        for id in hits {
            tracing::debug!(
                "Agent {} at {} implies {} is passable",
                agent_id,
                position,
                id
            );
            registry.mark_assumed_open(id, self.config.assumed_open_ttl);
        }
    }

    /// A barrier's state was observed to change directly (push-style world
    /// event). Feeds the confirmed state; unknown cells are ignored since
    /// they cannot be registered without kind and orientation.
    pub fn on_obstacle_state_changed(&self, position: Position, open: bool) {
        let mut registry = self.registry.lock();
        if let Some(id) = registry.at(position).map(|o| o.id) {
            registry.update_state(id, open);
        }
    }
}
