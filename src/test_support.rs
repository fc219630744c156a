//! Scripted world fixture for tests.
//!
//! Plays the role the hand-built occupancy grids play in the planner tests
//! of a mapping stack: a small voxel world whose barriers can be made
//! responsive (flip after N observation polls), unresponsive, or absent,
//! with every toggle and move recorded for assertions.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::Mutex;

use crate::types::{Facing, ObstacleKind, Position};
use crate::world::{MoveOutcome, ObstacleDescriptor, WorldApi};

#[derive(Clone, Debug)]
struct ScriptedObstacle {
    kind: ObstacleKind,
    facing: Option<Facing>,
    open: bool,
    /// Whether a toggle has any effect at all.
    responsive: bool,
    /// Observation polls needed after a toggle before the flip shows.
    flip_after_polls: u32,
    /// Remaining polls until the pending flip becomes observable.
    pending: Option<u32>,
}

#[derive(Debug)]
struct Inner {
    agent: Position,
    floor: HashSet<Position>,
    obstacles: HashMap<Position, ScriptedObstacle>,
    toggles: Vec<Position>,
    moves: Vec<Position>,
    failing_moves: HashSet<Position>,
}

/// In-memory world with scripted barrier behavior.
pub struct MockWorld {
    inner: Mutex<Inner>,
}

impl MockWorld {
    pub fn new(agent: Position) -> Self {
        Self {
            inner: Mutex::new(Inner {
                agent,
                floor: HashSet::new(),
                obstacles: HashMap::new(),
                toggles: Vec::new(),
                moves: Vec::new(),
                failing_moves: HashSet::new(),
            }),
        }
    }

    pub fn add_floor(&self, position: Position) {
        self.inner.lock().floor.insert(position);
    }

    pub fn remove_floor(&self, position: Position) {
        self.inner.lock().floor.remove(&position);
    }

    pub fn add_obstacle(&self, position: Position, kind: ObstacleKind, facing: Facing, open: bool) {
        self.inner.lock().obstacles.insert(
            position,
            ScriptedObstacle {
                kind,
                facing: Some(facing),
                open,
                responsive: true,
                flip_after_polls: 1,
                pending: None,
            },
        );
    }

    pub fn remove_obstacle(&self, position: Position) {
        self.inner.lock().obstacles.remove(&position);
    }

    /// Polls needed after a toggle before the flip becomes observable.
    pub fn set_flip_after_polls(&self, position: Position, polls: u32) {
        if let Some(o) = self.inner.lock().obstacles.get_mut(&position) {
            o.responsive = true;
            o.flip_after_polls = polls;
        }
    }

    /// Toggles on this barrier have no effect.
    pub fn set_unresponsive(&self, position: Position) {
        if let Some(o) = self.inner.lock().obstacles.get_mut(&position) {
            o.responsive = false;
        }
    }

    /// Every move_to targeting this cell times out.
    pub fn fail_move_to(&self, position: Position) {
        self.inner.lock().failing_moves.insert(position);
    }

    pub fn agent(&self) -> Position {
        self.inner.lock().agent
    }

    pub fn toggle_count(&self, position: Position) -> usize {
        self.inner
            .lock()
            .toggles
            .iter()
            .filter(|p| **p == position)
            .count()
    }

    pub fn moves_to(&self, position: Position) -> usize {
        self.inner
            .lock()
            .moves
            .iter()
            .filter(|p| **p == position)
            .count()
    }
}

impl WorldApi for MockWorld {
    fn position(&self) -> Position {
        self.inner.lock().agent
    }

    fn is_walkable(&self, position: Position) -> bool {
        self.inner.lock().floor.contains(&position)
    }

    fn find_obstacles(&self, near: Position, max_distance: i32, limit: usize) -> Vec<Position> {
        let inner = self.inner.lock();
        let mut found: Vec<(f32, Position)> = inner
            .obstacles
            .keys()
            .filter_map(|p| {
                let d = near.distance(p);
                (d <= max_distance as f32).then_some((d, *p))
            })
            .collect();
        found.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        found.into_iter().take(limit).map(|(_, p)| p).collect()
    }

    fn describe(&self, position: Position) -> Option<ObstacleDescriptor> {
        let mut inner = self.inner.lock();
        let obstacle = inner.obstacles.get_mut(&position)?;

        // A pending flip becomes observable after the scripted number of
        // polls.
        if let Some(remaining) = obstacle.pending {
            if remaining <= 1 {
                obstacle.open = !obstacle.open;
                obstacle.pending = None;
            } else {
                obstacle.pending = Some(remaining - 1);
            }
        }

        Some(ObstacleDescriptor {
            kind: obstacle.kind,
            facing: obstacle.facing,
            open: obstacle.open,
        })
    }

    fn move_to(&self, target: Position, _tolerance: f32, _timeout: Duration) -> MoveOutcome {
        let mut inner = self.inner.lock();
        inner.moves.push(target);

        if inner.failing_moves.contains(&target) {
            return MoveOutcome::TimedOut;
        }

        let walkable = inner.floor.contains(&target)
            || inner.obstacles.get(&target).map(|o| o.open).unwrap_or(false);
        if walkable {
            inner.agent = target;
            MoveOutcome::Arrived
        } else {
            MoveOutcome::Failed(format!("{} is not walkable", target))
        }
    }

    fn toggle(&self, position: Position) {
        let mut inner = self.inner.lock();
        inner.toggles.push(position);
        if let Some(obstacle) = inner.obstacles.get_mut(&position) {
            if obstacle.responsive && obstacle.pending.is_none() {
                obstacle.pending = Some(obstacle.flip_after_polls);
            }
        }
    }
}
