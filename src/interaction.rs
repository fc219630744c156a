//! Per-obstacle interaction state machine.
//!
//! One [`InteractionSession`] owns a single barrier crossing: approach the
//! standoff cell, toggle, verify the flip with a bounded poll loop, retry
//! under a cap, and walk through. Every wait is cancellable and bounded, so
//! a session can be abandoned from any state without leaving a timer
//! behind.

use std::time::Duration;

use crate::error::{DvaraError, Result};
use crate::registry::SharedRegistry;
use crate::shared::{wait_cancellable, CancelToken};
use crate::types::{crossing_geometry, CrossingGeometry, ObstacleId, Position};
use crate::world::{MoveOutcome, WorldApi};

/// Configuration for the interaction controller.
#[derive(Clone, Debug)]
pub struct InteractionConfig {
    /// Timeout for reaching the standoff or pass-through cell
    pub approach_timeout: Duration,
    /// Arrival tolerance for approach moves
    pub approach_tolerance: f32,
    /// Verification polls per interaction attempt
    pub verify_max_polls: u32,
    /// Interval between verification polls
    pub verify_poll_interval: Duration,
    /// Cooldown before re-toggling after a failed verification
    pub retry_cooldown: Duration,
    /// Re-describe the barrier on arrival instead of trusting an unexpired
    /// assumed-open mark
    pub verify_on_arrival: bool,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            approach_timeout: Duration::from_secs(5),
            approach_tolerance: 0.5,
            verify_max_polls: 10,
            verify_poll_interval: Duration::from_millis(100),
            retry_cooldown: Duration::from_millis(250),
            verify_on_arrival: false,
        }
    }
}

/// State of one barrier crossing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InteractionState {
    /// Moving to the standoff cell
    Approaching,
    /// At the standoff cell, deciding whether interaction is needed
    AtObstacle,
    /// Toggling the barrier
    Interacting,
    /// Polling for the observed state to flip
    Verifying,
    /// Cooling down before another toggle
    Retry,
    /// Crossed the barrier
    Passed,
    /// Gave up; the obstacle is blocked for the session
    Failed,
}

/// Transient state owned by the controller for one barrier crossing.
#[derive(Debug)]
pub struct InteractionSession {
    pub obstacle: ObstacleId,
    pub state: InteractionState,
    /// Attempts made within this session.
    pub attempts: u32,
    /// Shared with the owning navigation request; setting it unwinds the
    /// session from any state.
    pub cancel: CancelToken,
}

impl InteractionSession {
    pub fn new(obstacle: ObstacleId, cancel: CancelToken) -> Self {
        Self {
            obstacle,
            state: InteractionState::Approaching,
            attempts: 0,
            cancel,
        }
    }
}

/// Drives one [`InteractionSession`] to a terminal outcome.
pub struct InteractionController<'a> {
    config: InteractionConfig,
    world: &'a dyn WorldApi,
    registry: &'a SharedRegistry,
}

impl<'a> InteractionController<'a> {
    pub fn new(
        config: InteractionConfig,
        world: &'a dyn WorldApi,
        registry: &'a SharedRegistry,
    ) -> Self {
        Self {
            config,
            world,
            registry,
        }
    }

    /// Run the session to a terminal state. `Ok(())` means the barrier was
    /// crossed; any error leaves the session `Failed` and the caller must
    /// replan around the obstacle.
    pub fn run(&self, session: &mut InteractionSession) -> Result<()> {
        let outcome = self.drive(session);
        session.state = match outcome {
            Ok(()) => InteractionState::Passed,
            Err(_) => InteractionState::Failed,
        };
        outcome
    }

    fn drive(&self, session: &mut InteractionSession) -> Result<()> {
        let id = session.obstacle;

        let (position, kind, facing) = {
            let registry = self.registry.lock();
            let record = registry
                .get(id)
                .ok_or(DvaraError::RegistryInconsistency(id))?;
            (record.position, record.kind, record.facing)
        };

        let geometry = crossing_geometry(kind, facing, position, self.world.position());

        loop {
            if session.cancel.is_cancelled() {
                return Err(DvaraError::Cancelled);
            }

            match session.state {
                InteractionState::Approaching => {
                    tracing::debug!("{}: approaching standoff {}", id, geometry.standoff);
                    self.checked_move(geometry.standoff)?;
                    session.state = InteractionState::AtObstacle;
                }

                InteractionState::AtObstacle => {
                    if self.passable_without_interaction(id, position)? {
                        tracing::debug!("{}: already open, walking through", id);
                        return self.pass_through(&geometry);
                    }
                    session.state = InteractionState::Interacting;
                }

                InteractionState::Interacting => {
                    // Exactly one toggle per entry into this state.
                    self.world.toggle(position);
                    session.attempts = self.registry.lock().record_attempt(id);
                    tracing::debug!("{}: toggled (attempt {})", id, session.attempts);
                    session.state = InteractionState::Verifying;
                }

                InteractionState::Verifying => {
                    if self.verify_flip(session, position)? {
                        self.registry.lock().update_state(id, true);
                        tracing::debug!("{}: observed open", id);
                        return self.pass_through(&geometry);
                    }
                    session.state = InteractionState::Retry;
                }

                InteractionState::Retry => {
                    // record_attempt blocks the obstacle once the cap is
                    // reached; the flag is the retry budget.
                    let blocked = self
                        .registry
                        .lock()
                        .get(id)
                        .map(|o| o.blocked_for_session)
                        .unwrap_or(true);
                    if blocked {
                        tracing::warn!(
                            "{}: did not open after {} attempts",
                            id,
                            session.attempts
                        );
                        return Err(DvaraError::Interaction(id, session.attempts));
                    }
                    if !wait_cancellable(&session.cancel, self.config.retry_cooldown) {
                        return Err(DvaraError::Cancelled);
                    }
                    session.state = InteractionState::Interacting;
                }

                // Terminal states are handled by run(); reaching them here
                // means the session was reused.
                InteractionState::Passed | InteractionState::Failed => {
                    return Err(DvaraError::Cancelled);
                }
            }
        }
    }

    /// Decide at the standoff cell whether the barrier can be walked
    /// through without toggling.
    fn passable_without_interaction(
        &self,
        id: ObstacleId,
        position: Position,
    ) -> Result<bool> {
        if self.config.verify_on_arrival {
            // Reconcile the assumption against ground truth before
            // trusting it.
            let Some(descriptor) = self.world.describe(position) else {
                self.registry.lock().evict(id);
                return Err(DvaraError::RegistryInconsistency(id));
            };
            self.registry.lock().update_state(id, descriptor.open);
            return Ok(descriptor.open);
        }

        Ok(self.registry.lock().is_likely_open(id))
    }

    /// Poll the observed state up to the configured number of times.
    /// Returns true when the barrier was seen open.
    fn verify_flip(
        &self,
        session: &mut InteractionSession,
        position: Position,
    ) -> Result<bool> {
        for _ in 0..self.config.verify_max_polls {
            if !wait_cancellable(&session.cancel, self.config.verify_poll_interval) {
                return Err(DvaraError::Cancelled);
            }

            let Some(descriptor) = self.world.describe(position) else {
                self.registry.lock().evict(session.obstacle);
                return Err(DvaraError::RegistryInconsistency(session.obstacle));
            };

            if descriptor.open {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Move to the pass-through cell beyond the barrier.
    fn pass_through(&self, geometry: &CrossingGeometry) -> Result<()> {
        self.checked_move(geometry.beyond)
    }

    fn checked_move(&self, target: Position) -> Result<()> {
        match self.world.move_to(
            target,
            self.config.approach_tolerance,
            self.config.approach_timeout,
        ) {
            MoveOutcome::Arrived => Ok(()),
            MoveOutcome::TimedOut => Err(DvaraError::MovementTimeout(target)),
            MoveOutcome::Failed(reason) => Err(DvaraError::Movement { target, reason }),
        }
    }
}
