//! Path planning module.
//!
//! Provides a best-first grid search over voxel cells where barrier cells
//! are costed and tagged specially instead of being treated as plain
//! walkable or blocked terrain.

mod route;

pub use route::{PlannedRoute, PlannerConfig, RoutePlanner};
