//! Navigation request execution.
//!
//! Orchestrates one request end to end: plan, walk the waypoints, hand
//! tagged waypoints to the interaction controller, replan once on failure,
//! and report a terminal outcome. A new request supersedes any in-flight
//! one by cancelling its token and waiting for its control flow to unwind.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::DvaraConfig;
use crate::error::{DvaraError, Result};
use crate::interaction::{InteractionConfig, InteractionController, InteractionSession};
use crate::planning::{PlannedRoute, PlannerConfig, RoutePlanner};
use crate::registry::SharedRegistry;
use crate::shared::{CancelToken, RequestStatus, StatusCell};
use crate::types::{ObstacleId, Position, Waypoint};
use crate::world::{MoveOutcome, WorldApi};

/// Configuration for the execution loop.
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Timeout for a single waypoint move
    pub move_timeout: Duration,
    /// Arrival tolerance for intermediate waypoints
    pub waypoint_tolerance: f32,
    /// Radius of the obstacle discovery sweep at request start
    pub discovery_radius: i32,
    /// Maximum obstacles fetched per discovery sweep
    pub discovery_limit: usize,
    /// Replans allowed per request before giving up
    pub max_replans: u32,
    /// Arrived-but-stationary waypoints tolerated before replanning
    pub stall_limit: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            move_timeout: Duration::from_secs(10),
            waypoint_tolerance: 0.5,
            discovery_radius: 32,
            discovery_limit: 16,
            max_replans: 1,
            stall_limit: 3,
        }
    }
}

/// Bounded history of recently occupied cells, used to notice a walk that
/// reports progress without actually advancing.
#[derive(Debug)]
pub struct PositionTracker {
    positions: VecDeque<Position>,
    max_positions: usize,
    min_spacing: f32,
}

impl PositionTracker {
    pub fn new(max_positions: usize, min_spacing: f32) -> Self {
        Self {
            positions: VecDeque::with_capacity(max_positions),
            max_positions,
            min_spacing,
        }
    }

    /// Record a position. Returns false when the agent has not moved far
    /// enough from the last recorded cell to count as progress.
    pub fn record(&mut self, position: Position) -> bool {
        if let Some(last) = self.positions.back() {
            if last.distance(&position) < self.min_spacing {
                return false;
            }
        }
        if self.positions.len() == self.max_positions {
            self.positions.pop_front();
        }
        self.positions.push_back(position);
        true
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self::new(10, 0.5)
    }
}

/// One navigation goal, owned exclusively by the execution loop.
#[derive(Debug)]
pub struct NavigationRequest {
    pub origin: Position,
    pub destination: Position,
    pub tolerance: f32,
    pub created_at: Instant,
    handle: Arc<SessionHandle>,
}

impl NavigationRequest {
    fn new(origin: Position, destination: Position, tolerance: f32) -> Self {
        Self {
            origin,
            destination,
            tolerance,
            created_at: Instant::now(),
            handle: Arc::new(SessionHandle::new()),
        }
    }

    pub fn status(&self) -> RequestStatus {
        self.handle.status.load()
    }
}

/// State shared between a request's control flow and status/cancel callers.
#[derive(Debug)]
struct SessionHandle {
    cancel: CancelToken,
    status: StatusCell,
    current_obstacle: Mutex<Option<ObstacleId>>,
}

impl SessionHandle {
    fn new() -> Self {
        Self {
            cancel: CancelToken::new(),
            status: StatusCell::new(RequestStatus::Pending),
            current_obstacle: Mutex::new(None),
        }
    }
}

/// Snapshot returned by [`ExecutionLoop::status`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NavStatus {
    pub state: RequestStatus,
    pub current_obstacle: Option<ObstacleId>,
    pub attempts: Option<u32>,
}

/// Drives navigation requests against the world.
pub struct ExecutionLoop {
    config: ExecutorConfig,
    interaction: InteractionConfig,
    planner: RoutePlanner,
    world: Arc<dyn WorldApi>,
    registry: SharedRegistry,
    /// Handle of the most recent request; superseded handles are cancelled.
    active: Mutex<Option<Arc<SessionHandle>>>,
    /// Serializes request control flows so a superseding `go_to` starts
    /// only after the cancelled one has unwound.
    run_lock: Mutex<()>,
}

impl ExecutionLoop {
    pub fn new(
        config: ExecutorConfig,
        interaction: InteractionConfig,
        planner: PlannerConfig,
        world: Arc<dyn WorldApi>,
        registry: SharedRegistry,
    ) -> Self {
        Self {
            config,
            interaction,
            planner: RoutePlanner::new(planner),
            world,
            registry,
            active: Mutex::new(None),
            run_lock: Mutex::new(()),
        }
    }

    /// Build from a loaded configuration file.
    pub fn from_config(
        config: &DvaraConfig,
        world: Arc<dyn WorldApi>,
        registry: SharedRegistry,
    ) -> Self {
        Self::new(
            config.executor_config(),
            config.interaction_config(),
            config.planner_config(),
            world,
            registry,
        )
    }

    /// Navigate to `destination`, blocking the calling control flow until a
    /// terminal outcome. Any in-flight request is cancelled first.
    pub fn go_to(&self, destination: Position, tolerance: f32) -> Result<()> {
        let request = NavigationRequest::new(self.world.position(), destination, tolerance);
        let handle = Arc::clone(&request.handle);

        // Supersede: cancel the in-flight request and publish our handle,
        // then wait for the cancelled control flow to release the run lock.
        {
            let mut active = self.active.lock();
            if let Some(prev) = active.take() {
                prev.cancel.cancel();
            }
            *active = Some(Arc::clone(&handle));
        }
        let _running = self.run_lock.lock();

        tracing::info!(
            "Navigating from {} to {} (tolerance {:.1})",
            request.origin,
            request.destination,
            request.tolerance
        );

        let outcome = self.run_request(&request);

        *handle.current_obstacle.lock() = None;
        match &outcome {
            Ok(()) => {
                handle.status.store(RequestStatus::Succeeded);
                tracing::info!("Reached {} ({:?})", destination, request.created_at.elapsed());
            }
            Err(e) => {
                handle.status.store(RequestStatus::Failed);
                tracing::warn!("Navigation to {} failed: {}", destination, e);
            }
        }
        outcome
    }

    /// Cancel the in-flight request, if any. All of its pending waits and
    /// interaction timers stop; committed registry state is left intact.
    pub fn cancel(&self) {
        if let Some(handle) = self.active.lock().as_ref() {
            handle.cancel.cancel();
        }
    }

    /// Status of the most recent request, or `None` before the first one.
    pub fn status(&self) -> Option<NavStatus> {
        let handle = Arc::clone(self.active.lock().as_ref()?);
        let current_obstacle = *handle.current_obstacle.lock();
        let attempts =
            current_obstacle.and_then(|id| self.registry.lock().get(id).map(|o| o.attempts));
        Some(NavStatus {
            state: handle.status.load(),
            current_obstacle,
            attempts,
        })
    }

    fn run_request(&self, request: &NavigationRequest) -> Result<()> {
        let handle = &request.handle;

        self.registry.lock().begin_session();
        self.discover_near(request.origin);

        handle.status.store(RequestStatus::Planning);
        let mut route = self.plan(request)?;

        let mut replans = 0;
        let mut tracker = PositionTracker::default();
        let mut stalls = 0;

        'walk: loop {
            handle.status.store(RequestStatus::Walking);

            let waypoints: Vec<Waypoint> = route.waypoints.clone();
            for waypoint in waypoints {
                if handle.cancel.is_cancelled() {
                    return Err(DvaraError::Cancelled);
                }

                let step = match waypoint.interaction {
                    None => self.walk_waypoint(waypoint.position, &mut tracker, &mut stalls),
                    Some(id) => self.cross_barrier(request, id),
                };

                if let Err(e) = step {
                    if matches!(e, DvaraError::Cancelled) {
                        return Err(e);
                    }
                    if replans >= self.config.max_replans {
                        return Err(e);
                    }
                    replans += 1;
                    tracing::info!("Replanning ({}/{}): {}", replans, self.config.max_replans, e);

                    handle.status.store(RequestStatus::Planning);
                    tracker.clear();
                    stalls = 0;
                    route = match self.plan(request) {
                        Ok(r) => r,
                        // Surface the root cause, not the planning fallout.
                        Err(_) => return Err(e),
                    };
                    continue 'walk;
                }
            }

            break;
        }

        // Arrival check against the requested tolerance.
        let final_position = self.world.position();
        if final_position.distance(&request.destination) <= request.tolerance.max(0.0) {
            Ok(())
        } else {
            Err(DvaraError::Movement {
                target: request.destination,
                reason: format!("stopped at {} short of destination", final_position),
            })
        }
    }

    /// Sweep for barriers near the request origin and register them.
    fn discover_near(&self, origin: Position) {
        let found = self.world.find_obstacles(
            origin,
            self.config.discovery_radius,
            self.config.discovery_limit,
        );

        if found.is_empty() {
            return;
        }

        let mut registry = self.registry.lock();
        for position in found {
            if let Some(descriptor) = self.world.describe(position) {
                registry.register_descriptor(position, &descriptor);
            }
        }
        tracing::debug!("Discovery sweep: {} obstacles known", registry.len());
    }

    fn plan(&self, request: &NavigationRequest) -> Result<PlannedRoute> {
        let origin = self.world.position();
        let mut registry = self.registry.lock();
        self.planner
            .plan(&*self.world, &mut registry, origin, request.destination)
    }

    fn walk_waypoint(
        &self,
        target: Position,
        tracker: &mut PositionTracker,
        stalls: &mut u32,
    ) -> Result<()> {
        match self
            .world
            .move_to(target, self.config.waypoint_tolerance, self.config.move_timeout)
        {
            MoveOutcome::Arrived => {}
            MoveOutcome::TimedOut => return Err(DvaraError::MovementTimeout(target)),
            MoveOutcome::Failed(reason) => return Err(DvaraError::Movement { target, reason }),
        }

        // An "arrived" move that left the agent where it was counts toward
        // a stall; enough of them and the route is treated as failed.
        if tracker.record(self.world.position()) {
            *stalls = 0;
        } else {
            *stalls += 1;
            if *stalls >= self.config.stall_limit {
                return Err(DvaraError::Movement {
                    target,
                    reason: "no progress over recent waypoints".into(),
                });
            }
        }
        Ok(())
    }

    fn cross_barrier(&self, request: &NavigationRequest, id: ObstacleId) -> Result<()> {
        let handle = &request.handle;
        handle.status.store(RequestStatus::Interacting);
        *handle.current_obstacle.lock() = Some(id);

        let controller =
            InteractionController::new(self.interaction.clone(), &*self.world, &self.registry);
        let mut session = InteractionSession::new(id, handle.cancel.clone());
        let outcome = controller.run(&mut session);

        *handle.current_obstacle.lock() = None;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{shared_registry, RegistryConfig};
    use crate::test_support::MockWorld;
    use crate::types::{Facing, ObstacleKind};

    fn fast_executor(world: Arc<MockWorld>, registry: SharedRegistry) -> ExecutionLoop {
        ExecutionLoop::new(
            ExecutorConfig::default(),
            InteractionConfig {
                verify_poll_interval: Duration::from_millis(5),
                retry_cooldown: Duration::from_millis(10),
                ..Default::default()
            },
            PlannerConfig::default(),
            world,
            registry,
        )
    }

    /// Corridor along z at x=10, y=64, with an optional door at z=20.
    fn corridor_with_door(open: bool) -> (Arc<MockWorld>, Position) {
        let world = Arc::new(MockWorld::new(Position::new(10, 64, 24)));
        for z in 14..=26 {
            world.add_floor(Position::new(10, 64, z));
        }
        let door = Position::new(10, 64, 20);
        world.remove_floor(door);
        world.add_obstacle(door, ObstacleKind::Door, Facing::North, open);
        (world, door)
    }

    #[test]
    fn test_plain_route_succeeds() {
        let world = Arc::new(MockWorld::new(Position::new(0, 64, 0)));
        for z in 0..=5 {
            world.add_floor(Position::new(0, 64, z));
        }
        let registry = shared_registry(RegistryConfig::default());
        let nav = fast_executor(Arc::clone(&world), registry);

        nav.go_to(Position::new(0, 64, 5), 0.5).unwrap();
        assert_eq!(world.agent(), Position::new(0, 64, 5));
        assert_eq!(nav.status().unwrap().state, RequestStatus::Succeeded);
    }

    #[test]
    fn test_door_crossing_end_to_end() {
        // Scenario: closed door between the agent and the destination; the
        // flip is observed on the second verification poll.
        let (world, door) = corridor_with_door(false);
        world.set_flip_after_polls(door, 2);

        let registry = shared_registry(RegistryConfig::default());
        let nav = fast_executor(Arc::clone(&world), Arc::clone(&registry));

        nav.go_to(Position::new(10, 64, 16), 0.5).unwrap();

        assert_eq!(world.agent(), Position::new(10, 64, 16));
        assert_eq!(world.toggle_count(door), 1);
        // The discovery sweep plus the crossing left a confirmed-open record.
        let registry = registry.lock();
        let record = registry.at(door).unwrap();
        assert!(record.confirmed_open);
    }

    #[test]
    fn test_unresponsive_door_fails_and_blocks() {
        let (world, door) = corridor_with_door(false);
        world.set_unresponsive(door);

        let registry = shared_registry(RegistryConfig::default());
        let nav = fast_executor(Arc::clone(&world), Arc::clone(&registry));

        let err = nav.go_to(Position::new(10, 64, 16), 0.5).unwrap_err();

        // The replan found no way around the now-blocked cell, so the root
        // interaction failure is surfaced.
        assert!(matches!(err, DvaraError::Interaction(_, 3)));
        assert_eq!(world.toggle_count(door), 3);
        assert_eq!(nav.status().unwrap().state, RequestStatus::Failed);
        assert!(registry.lock().at(door).unwrap().blocked_for_session);

        // A later plan in the same episode omits the cell entirely.
        let planner = RoutePlanner::with_defaults();
        let err = planner
            .plan(
                &*world,
                &mut registry.lock(),
                world.agent(),
                Position::new(10, 64, 16),
            )
            .unwrap_err();
        assert!(matches!(err, DvaraError::Planning { .. }));
    }

    #[test]
    fn test_open_door_crossed_without_toggle() {
        let (world, door) = corridor_with_door(true);

        let registry = shared_registry(RegistryConfig::default());
        let nav = fast_executor(Arc::clone(&world), Arc::clone(&registry));

        nav.go_to(Position::new(10, 64, 16), 0.5).unwrap();
        assert_eq!(world.toggle_count(door), 0);
    }

    #[test]
    fn test_recent_third_party_pass_skips_interaction() {
        // Another agent was seen in the doorway moments ago; the agent
        // arrives within the TTL and passes without toggling.
        let (world, door) = corridor_with_door(false);

        let registry = shared_registry(RegistryConfig::default());
        let id = registry
            .lock()
            .register(door, ObstacleKind::Door, Facing::North, false);
        registry.lock().mark_assumed_open(id, Duration::from_secs(5));

        let nav = fast_executor(Arc::clone(&world), Arc::clone(&registry));
        nav.go_to(Position::new(10, 64, 16), 0.5).unwrap();
        assert_eq!(world.toggle_count(door), 0);
    }

    #[test]
    fn test_expired_inference_requires_interaction() {
        let (world, door) = corridor_with_door(false);
        world.set_flip_after_polls(door, 1);

        let registry = shared_registry(RegistryConfig::default());
        let id = registry
            .lock()
            .register(door, ObstacleKind::Door, Facing::North, false);
        registry
            .lock()
            .mark_assumed_open(id, Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(40));

        let nav = fast_executor(Arc::clone(&world), Arc::clone(&registry));
        nav.go_to(Position::new(10, 64, 16), 0.5).unwrap();
        assert_eq!(world.toggle_count(door), 1);
    }

    #[test]
    fn test_movement_timeout_replans_once_then_fails() {
        let world = Arc::new(MockWorld::new(Position::new(0, 64, 0)));
        for z in 0..=5 {
            world.add_floor(Position::new(0, 64, z));
        }
        world.fail_move_to(Position::new(0, 64, 3));

        let registry = shared_registry(RegistryConfig::default());
        let nav = fast_executor(Arc::clone(&world), registry);

        let err = nav.go_to(Position::new(0, 64, 5), 0.5).unwrap_err();
        assert!(matches!(err, DvaraError::MovementTimeout(_)));
        // One replan was attempted before giving up on the same stuck cell.
        assert_eq!(world.moves_to(Position::new(0, 64, 3)), 2);
    }

    #[test]
    fn test_supersession_cancels_in_flight_request() {
        let (world, door) = corridor_with_door(false);
        world.set_unresponsive(door);

        let registry = shared_registry(RegistryConfig::default());
        // Slow interaction: long cooldowns keep the first request busy.
        let nav = Arc::new(ExecutionLoop::new(
            ExecutorConfig::default(),
            InteractionConfig {
                verify_poll_interval: Duration::from_millis(50),
                retry_cooldown: Duration::from_secs(30),
                ..Default::default()
            },
            PlannerConfig::default(),
            Arc::clone(&world) as Arc<dyn WorldApi>,
            registry,
        ));

        let first = Arc::clone(&nav);
        let first_handle =
            std::thread::spawn(move || first.go_to(Position::new(10, 64, 16), 0.5));

        // Wait until the first request is interacting with the door.
        let deadline = Instant::now() + Duration::from_secs(5);
        while world.toggle_count(door) == 0 {
            assert!(Instant::now() < deadline, "first request never toggled");
            std::thread::sleep(Duration::from_millis(10));
        }

        // Supersede with a goal on the near side of the door.
        nav.go_to(Position::new(10, 64, 24), 0.5).unwrap();

        let first_outcome = first_handle.join().unwrap();
        assert!(matches!(first_outcome, Err(DvaraError::Cancelled)));

        // No cooldown or poll from the first session fires afterward.
        let toggles = world.toggle_count(door);
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(world.toggle_count(door), toggles);
        assert_eq!(nav.status().unwrap().state, RequestStatus::Succeeded);
    }

    #[test]
    fn test_status_before_any_request() {
        let world = Arc::new(MockWorld::new(Position::new(0, 64, 0)));
        let registry = shared_registry(RegistryConfig::default());
        let nav = fast_executor(world, registry);
        assert!(nav.status().is_none());
    }

    #[test]
    fn test_position_tracker_spacing_and_bound() {
        let mut tracker = PositionTracker::new(3, 0.5);
        assert!(tracker.record(Position::new(0, 0, 0)));
        // Same cell again: below spacing, not progress.
        assert!(!tracker.record(Position::new(0, 0, 0)));
        assert!(tracker.record(Position::new(1, 0, 0)));
        assert!(tracker.record(Position::new(2, 0, 0)));
        assert!(tracker.record(Position::new(3, 0, 0)));
        // Bounded: the oldest entry was dropped.
        assert_eq!(tracker.positions.len(), 3);
    }
}
