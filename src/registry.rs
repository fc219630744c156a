//! Obstacle registry: the authoritative cache of discovered barrier state.
//!
//! The registry is a partial, lazily populated cache keyed by position,
//! not a full world model. Records are created on first discovery, updated
//! by direct observation and passive inference, and dropped wholesale at
//! episode boundaries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::types::{Facing, ObstacleId, ObstacleKind, Position};
use crate::world::ObstacleDescriptor;

/// Configuration for the obstacle registry.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Interaction attempts allowed before an obstacle is blocked for the
    /// rest of the session.
    pub max_attempts: u32,
    /// Idle period after which a stale attempt counter restarts from zero.
    pub idle_attempt_reset: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            idle_attempt_reset: Duration::from_secs(60),
        }
    }
}

/// A discovered barrier entity.
#[derive(Clone, Debug)]
pub struct Obstacle {
    pub id: ObstacleId,
    pub position: Position,
    pub kind: ObstacleKind,
    pub facing: Facing,
    /// Last directly-observed open state.
    pub confirmed_open: bool,
    /// While set and in the future, the barrier is treated as open for
    /// planning without a direct check.
    pub assumed_open_until: Option<Instant>,
    /// Interaction attempts in the current navigation session.
    pub attempts: u32,
    /// Once true, the planner treats this cell as impassable until the
    /// episode is cleared.
    pub blocked_for_session: bool,
    pub last_observed_at: Instant,
    pub last_interaction_at: Option<Instant>,
}

impl Obstacle {
    /// Human-readable description for logs.
    pub fn label(&self) -> String {
        format!("{} ({} facing) at {}", self.kind, self.facing, self.position)
    }
}

/// Notification emitted when an obstacle's confirmed state flips.
/// Consumed by observability, not by control flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateChange {
    pub id: ObstacleId,
    pub open: bool,
}

/// Cache of discovered barrier state, one record per position.
///
/// Side effects are confined to the registry's own state; no I/O happens
/// here. All mutation goes through the contract methods.
#[derive(Debug)]
pub struct ObstacleRegistry {
    config: RegistryConfig,
    records: HashMap<ObstacleId, Obstacle>,
    events: Option<Sender<StateChange>>,
}

impl ObstacleRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            records: HashMap::new(),
            events: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RegistryConfig::default())
    }

    /// Subscribe to confirmed state-change notifications.
    ///
    /// Replaces any previous subscription.
    pub fn subscribe(&mut self) -> Receiver<StateChange> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.events = Some(tx);
        rx
    }

    /// Register a barrier discovered at `position`.
    ///
    /// Idempotent: a second registration for the same position merges by
    /// overwriting only observation-derived fields (state, timestamps),
    /// never identity fields.
    pub fn register(
        &mut self,
        position: Position,
        kind: ObstacleKind,
        facing: Facing,
        open: bool,
    ) -> ObstacleId {
        let id = ObstacleId::from_position(position);
        let now = Instant::now();

        match self.records.get_mut(&id) {
            Some(existing) => {
                existing.confirmed_open = open;
                existing.last_observed_at = now;
            }
            None => {
                let obstacle = Obstacle {
                    id,
                    position,
                    kind,
                    facing,
                    confirmed_open: open,
                    assumed_open_until: None,
                    attempts: 0,
                    blocked_for_session: false,
                    last_observed_at: now,
                    last_interaction_at: None,
                };
                tracing::debug!("Registered {}", obstacle.label());
                self.records.insert(id, obstacle);
            }
        }

        id
    }

    /// Register from a world descriptor, normalizing at the boundary.
    ///
    /// A descriptor without an orientation is malformed: it is logged and
    /// skipped, non-fatal to the rest of the system.
    pub fn register_descriptor(
        &mut self,
        position: Position,
        descriptor: &ObstacleDescriptor,
    ) -> Option<ObstacleId> {
        let Some(facing) = descriptor.facing else {
            tracing::warn!(
                "Skipping {} at {}: descriptor has no orientation",
                descriptor.kind,
                position
            );
            return None;
        };

        Some(self.register(position, descriptor.kind, facing, descriptor.open))
    }

    pub fn get(&self, id: ObstacleId) -> Option<&Obstacle> {
        self.records.get(&id)
    }

    /// Look up the record occupying a cell, if any.
    pub fn at(&self, position: Position) -> Option<&Obstacle> {
        self.records.get(&ObstacleId::from_position(position))
    }

    /// Record a directly-observed open state.
    ///
    /// Emits a state-change notification when the value flips.
    pub fn update_state(&mut self, id: ObstacleId, observed_open: bool) {
        let Some(obstacle) = self.records.get_mut(&id) else {
            return;
        };

        let flipped = obstacle.confirmed_open != observed_open;
        obstacle.confirmed_open = observed_open;
        obstacle.last_observed_at = Instant::now();

        if flipped {
            tracing::debug!(
                "{} now {}",
                obstacle.label(),
                if observed_open { "open" } else { "closed" }
            );
            if let Some(events) = &self.events {
                let _ = events.send(StateChange {
                    id,
                    open: observed_open,
                });
            }
        }
    }

    /// Treat the barrier as open for `ttl` without a direct check.
    /// Does not touch the confirmed state.
    pub fn mark_assumed_open(&mut self, id: ObstacleId, ttl: Duration) {
        if let Some(obstacle) = self.records.get_mut(&id) {
            obstacle.assumed_open_until = Some(Instant::now() + ttl);
        }
    }

    /// Whether the barrier can be planned through without interaction:
    /// an unexpired assumed-open mark, else the last confirmed state.
    pub fn is_likely_open(&self, id: ObstacleId) -> bool {
        let Some(obstacle) = self.records.get(&id) else {
            return false;
        };

        if let Some(until) = obstacle.assumed_open_until {
            if Instant::now() < until {
                return true;
            }
        }
        obstacle.confirmed_open
    }

    /// Obstacles within `max_distance` of `position`, ascending by
    /// distance. Recomputed each call.
    pub fn nearby(&self, position: Position, max_distance: f32) -> Vec<Obstacle> {
        let mut found: Vec<(f32, Obstacle)> = self
            .records
            .values()
            .filter_map(|o| {
                let d = position.distance(&o.position);
                (d <= max_distance).then(|| (d, o.clone()))
            })
            .collect();

        found.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        found.into_iter().map(|(_, o)| o).collect()
    }

    /// Obstacles inside an axis-aligned bounding volume around `center`.
    pub fn within_volume(&self, center: Position, dx: i32, dy: i32, dz: i32) -> Vec<ObstacleId> {
        self.records
            .values()
            .filter(|o| {
                (o.position.x - center.x).abs() <= dx
                    && (o.position.y - center.y).abs() <= dy
                    && (o.position.z - center.z).abs() <= dz
            })
            .map(|o| o.id)
            .collect()
    }

    /// Count one interaction attempt and stamp the interaction time.
    ///
    /// Returns the updated count. When the count reaches the configured
    /// maximum the obstacle is blocked for the session, so the attempt
    /// counter can never exceed the maximum while the cell remains
    /// plannable. A counter idle for longer than `idle_attempt_reset`
    /// restarts from zero first.
    pub fn record_attempt(&mut self, id: ObstacleId) -> u32 {
        let max_attempts = self.config.max_attempts;
        let idle_reset = self.config.idle_attempt_reset;

        let Some(obstacle) = self.records.get_mut(&id) else {
            return 0;
        };

        let now = Instant::now();
        if let Some(last) = obstacle.last_interaction_at {
            if now.duration_since(last) >= idle_reset {
                obstacle.attempts = 0;
            }
        }

        obstacle.attempts += 1;
        obstacle.last_interaction_at = Some(now);

        if obstacle.attempts >= max_attempts && !obstacle.blocked_for_session {
            obstacle.blocked_for_session = true;
            tracing::warn!(
                "{} blocked for session after {} attempts",
                obstacle.label(),
                obstacle.attempts
            );
        }

        obstacle.attempts
    }

    /// Mark the cell impassable for the remainder of the session.
    pub fn mark_blocked(&mut self, id: ObstacleId) {
        if let Some(obstacle) = self.records.get_mut(&id) {
            if !obstacle.blocked_for_session {
                obstacle.blocked_for_session = true;
                tracing::warn!("{} blocked for session", obstacle.label());
            }
        }
    }

    /// Drop a record the world can no longer describe. The cell is treated
    /// as a fresh discovery if seen again.
    pub fn evict(&mut self, id: ObstacleId) {
        if let Some(obstacle) = self.records.remove(&id) {
            tracing::info!("Evicted {}", obstacle.label());
        }
    }

    /// Reset attempt counters for a new navigation session. Blocked marks
    /// are monotonic and survive until [`clear_session`](Self::clear_session).
    pub fn begin_session(&mut self) {
        for obstacle in self.records.values_mut() {
            obstacle.attempts = 0;
        }
    }

    /// Empty all records. Call at episode boundaries (respawn, reconnect).
    pub fn clear_session(&mut self) {
        let count = self.records.len();
        self.records.clear();
        if count > 0 {
            tracing::info!("Registry cleared ({} records) for new episode", count);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Registry shared between the execution loop, the interaction controller,
/// and passive inference. The mutex serializes record updates so no two
/// writers interleave partial writes to the same record.
pub type SharedRegistry = Arc<Mutex<ObstacleRegistry>>;

/// Convenience constructor for the shared form.
pub fn shared_registry(config: RegistryConfig) -> SharedRegistry {
    Arc::new(Mutex::new(ObstacleRegistry::new(config)))
}
