//! Best-first route planner over voxel cells.
//!
//! Classic A* in the open-set/closed-set form, with one twist: a cell
//! holding a known barrier is neither plain walkable nor plain blocked.
//! Blocked-for-session barriers are omitted from the graph entirely,
//! likely-open ones cost the same as open terrain, and the rest cost a
//! fixed interaction penalty and tag the waypoint for the interaction
//! controller. Barrier traversal is a single logical hop from the approach
//! cell to the far cell, so the executor never occupies the barrier's own
//! cell while it is closed.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::time::Instant;

use crate::error::{DvaraError, Result};
use crate::registry::ObstacleRegistry;
use crate::types::{ObstacleId, Position, Waypoint};
use crate::world::WorldApi;

/// Traversal cost constants.
pub mod costs {
    /// Base cost of a single-cell hop.
    pub const BASE_STEP: f32 = 1.0;
    /// Extra cost of crossing a barrier that must be toggled first. Large
    /// enough to prefer a clearly shorter detour, small enough not to
    /// dominate a multi-hop one.
    pub const DEFAULT_INTERACTION_PENALTY: f32 = 2.0;
}

/// Configuration for the route planner.
#[derive(Clone, Debug)]
pub struct PlannerConfig {
    /// Maximum search iterations before giving up
    pub max_iterations: usize,
    /// Added cost for edges through a barrier that needs interaction
    pub interaction_penalty: f32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            interaction_penalty: costs::DEFAULT_INTERACTION_PENALTY,
        }
    }
}

/// Result of route planning.
#[derive(Clone, Debug)]
pub struct PlannedRoute {
    /// Waypoints from the cell after the origin up to the destination.
    pub waypoints: Vec<Waypoint>,
    /// Total traversal cost.
    pub cost: f32,
}

impl PlannedRoute {
    /// Number of waypoints tagged for interaction.
    pub fn interactions(&self) -> usize {
        self.waypoints
            .iter()
            .filter(|w| w.interaction.is_some())
            .count()
    }
}

/// Node in the search graph.
#[derive(Clone, Copy, Debug)]
struct SearchNode {
    position: Position,
    f_score: f32,
}

impl PartialEq for SearchNode {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position
    }
}

impl Eq for SearchNode {}

impl Ord for SearchNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (lower f_score = higher priority)
        other
            .f_score
            .partial_cmp(&self.f_score)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for SearchNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An expanded edge: target cell, cost, and an interaction tag when the
/// edge crosses a barrier.
struct Edge {
    to: Position,
    cost: f32,
    interaction: Option<ObstacleId>,
}

/// Grid route planner with barrier-aware edge generation.
pub struct RoutePlanner {
    config: PlannerConfig,
}

impl RoutePlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(PlannerConfig::default())
    }

    /// Plan a route from `origin` to `destination`.
    ///
    /// Barriers discovered along the way are registered lazily. Fails with
    /// [`DvaraError::Planning`] when the destination is unreachable or the
    /// search budget is exhausted; never blocks indefinitely.
    pub fn plan(
        &self,
        world: &dyn WorldApi,
        registry: &mut ObstacleRegistry,
        origin: Position,
        destination: Position,
    ) -> Result<PlannedRoute> {
        let started = Instant::now();

        if !world.is_walkable(destination) {
            // An unreachable goal fails explicitly rather than silently
            // redirecting to a different cell; the caller owns goal choice.
            return Err(DvaraError::Planning {
                origin,
                destination,
                reason: "destination cell is not walkable".into(),
            });
        }

        let mut open_set = BinaryHeap::new();
        let mut g_score: HashMap<Position, f32> = HashMap::new();
        let mut parent: HashMap<Position, (Position, Option<ObstacleId>)> = HashMap::new();
        let mut closed_set: HashSet<Position> = HashSet::new();
        // Cells already described this plan, so the world is asked at most
        // once per cell per call.
        let mut described: HashSet<Position> = HashSet::new();

        g_score.insert(origin, 0.0);
        parent.insert(origin, (origin, None));
        open_set.push(SearchNode {
            position: origin,
            f_score: Self::heuristic(origin, destination),
        });

        let mut iterations = 0;

        while let Some(current_node) = open_set.pop() {
            iterations += 1;
            if iterations > self.config.max_iterations {
                tracing::warn!(
                    "Route search exceeded {} iterations",
                    self.config.max_iterations
                );
                return Err(DvaraError::Planning {
                    origin,
                    destination,
                    reason: "search budget exhausted".into(),
                });
            }

            let current = current_node.position;

            if current == destination {
                let waypoints = Self::reconstruct(&parent, origin, destination);
                let cost = *g_score.get(&destination).unwrap_or(&0.0);
                tracing::debug!(
                    "Route planned: {} waypoints, cost {:.1}, {} interactions, {:?}",
                    waypoints.len(),
                    cost,
                    waypoints.iter().filter(|w| w.interaction.is_some()).count(),
                    started.elapsed()
                );
                return Ok(PlannedRoute { waypoints, cost });
            }

            if !closed_set.insert(current) {
                continue;
            }

            let current_g = *g_score.get(&current).unwrap_or(&f32::MAX);

            for edge in self.expand(world, registry, &mut described, current) {
                if closed_set.contains(&edge.to) {
                    continue;
                }

                let tentative_g = current_g + edge.cost;
                let existing_g = *g_score.get(&edge.to).unwrap_or(&f32::MAX);

                if tentative_g < existing_g {
                    g_score.insert(edge.to, tentative_g);
                    parent.insert(edge.to, (current, edge.interaction));
                    open_set.push(SearchNode {
                        position: edge.to,
                        f_score: tentative_g + Self::heuristic(edge.to, destination),
                    });
                }
            }
        }

        Err(DvaraError::Planning {
            origin,
            destination,
            reason: "no route connects origin to destination".into(),
        })
    }

    /// Generate outgoing edges from a cell.
    ///
    /// Four cardinal moves, each allowed to step up or down one cell when
    /// the same-level cell is solid terrain. A same-level cell holding a
    /// barrier becomes a skip-hop edge to the far cell instead.
    fn expand(
        &self,
        world: &dyn WorldApi,
        registry: &mut ObstacleRegistry,
        described: &mut HashSet<Position>,
        from: Position,
    ) -> Vec<Edge> {
        let mut edges = Vec::with_capacity(4);

        let directions = [(1, 0), (-1, 0), (0, 1), (0, -1)];

        for (dx, dz) in directions {
            let step = from.offset(dx, 0, dz);

            if world.is_walkable(step) {
                edges.push(Edge {
                    to: step,
                    cost: costs::BASE_STEP,
                    interaction: None,
                });
                continue;
            }

            if let Some(edge) = self.barrier_edge(world, registry, described, from, step, dx, dz) {
                edges.push(edge);
                continue;
            }

            // Solid terrain: try a single step up or down.
            let up = step.offset(0, 1, 0);
            if world.is_walkable(up) {
                edges.push(Edge {
                    to: up,
                    cost: costs::BASE_STEP,
                    interaction: None,
                });
                continue;
            }
            let down = step.offset(0, -1, 0);
            if world.is_walkable(down) {
                edges.push(Edge {
                    to: down,
                    cost: costs::BASE_STEP,
                    interaction: None,
                });
            }
        }

        edges
    }

    /// Build the skip-hop edge across a barrier cell, if one is there.
    #[allow(clippy::too_many_arguments)]
    fn barrier_edge(
        &self,
        world: &dyn WorldApi,
        registry: &mut ObstacleRegistry,
        described: &mut HashSet<Position>,
        from: Position,
        step: Position,
        dx: i32,
        dz: i32,
    ) -> Option<Edge> {
        let id = match registry.at(step).map(|o| o.id) {
            Some(id) => id,
            None => {
                // Lazy discovery: ask the world once per cell per plan.
                if !described.insert(step) {
                    return None;
                }
                let descriptor = world.describe(step)?;
                registry.register_descriptor(step, &descriptor)?
            }
        };

        let record = registry.get(id)?;
        if record.blocked_for_session {
            // Impassable for the rest of the session: no edge at all.
            return None;
        }

        let far = step.offset(dx, 0, dz);
        if !world.is_walkable(far) {
            return None;
        }

        if registry.is_likely_open(id) {
            // No different from open terrain, and not tagged: the executor
            // walks straight through.
            Some(Edge {
                to: far,
                cost: costs::BASE_STEP,
                interaction: None,
            })
        } else {
            Some(Edge {
                to: far,
                cost: costs::BASE_STEP + self.config.interaction_penalty,
                interaction: Some(id),
            })
        }
    }

    /// Euclidean heuristic.
    #[inline]
    fn heuristic(from: Position, to: Position) -> f32 {
        from.distance(&to)
    }

    /// Reconstruct waypoints from the parent map, dropping the origin cell.
    fn reconstruct(
        parent: &HashMap<Position, (Position, Option<ObstacleId>)>,
        origin: Position,
        destination: Position,
    ) -> Vec<Waypoint> {
        let mut path = Vec::new();
        let mut current = destination;

        while current != origin {
            let Some(&(prev, interaction)) = parent.get(&current) else {
                break;
            };
            path.push(Waypoint {
                position: current,
                interaction,
            });
            current = prev;
        }

        path.reverse();
        path
    }
}
