//! Core value types: positions, obstacle identity, crossing geometry.
//!
//! All positions entering the crate are converted once to [`Position`] at
//! the boundary; internal code never re-checks representation.

use std::fmt;

/// Quantized grid coordinate in the voxel world. Immutable value type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Offset by a delta in each axis.
    pub const fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Euclidean distance to another position.
    pub fn distance(&self, other: &Position) -> f32 {
        let dx = (other.x - self.x) as f32;
        let dy = (other.y - self.y) as f32;
        let dz = (other.z - self.z) as f32;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Manhattan distance to another position.
    pub fn manhattan_distance(&self, other: &Position) -> i32 {
        (other.x - self.x).abs() + (other.y - self.y).abs() + (other.z - self.z).abs()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Cardinal orientation of a barrier, fixed at discovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Facing {
    North,
    South,
    East,
    West,
}

impl Facing {
    /// Unit step along the axis the barrier blocks.
    ///
    /// North is -z, south +z, east +x, west -x.
    pub const fn axis_step(&self) -> (i32, i32) {
        match self {
            Facing::North => (0, -1),
            Facing::South => (0, 1),
            Facing::East => (1, 0),
            Facing::West => (-1, 0),
        }
    }

    /// Parse the orientation tag a world descriptor carries.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "north" => Some(Facing::North),
            "south" => Some(Facing::South),
            "east" => Some(Facing::East),
            "west" => Some(Facing::West),
            _ => None,
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Facing::North => "North",
            Facing::South => "South",
            Facing::East => "East",
            Facing::West => "West",
        };
        write!(f, "{}", name)
    }
}

/// Barrier variant. Affects approach-offset geometry only; the interaction
/// contract is shared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObstacleKind {
    Door,
    Gate,
    Trapdoor,
}

impl ObstacleKind {
    /// Standoff distance from the barrier cell, in cells.
    pub const fn standoff_distance(&self) -> i32 {
        match self {
            ObstacleKind::Door | ObstacleKind::Gate => 2,
            ObstacleKind::Trapdoor => 1,
        }
    }

    /// Clearance past the barrier cell after crossing, in cells.
    pub const fn clearance_distance(&self) -> i32 {
        2
    }
}

impl fmt::Display for ObstacleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObstacleKind::Door => "door",
            ObstacleKind::Gate => "gate",
            ObstacleKind::Trapdoor => "trapdoor",
        };
        write!(f, "{}", name)
    }
}

/// Unique obstacle key, derived deterministically from position.
/// One obstacle per cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObstacleId(Position);

impl ObstacleId {
    pub const fn from_position(position: Position) -> Self {
        Self(position)
    }

    pub const fn position(&self) -> Position {
        self.0
    }
}

impl fmt::Display for ObstacleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obstacle_{}_{}_{}", self.0.x, self.0.y, self.0.z)
    }
}

/// A single step in a planned route.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Waypoint {
    pub position: Position,
    /// Set when reaching this waypoint requires toggling a barrier first.
    pub interaction: Option<ObstacleId>,
}

impl Waypoint {
    pub const fn plain(position: Position) -> Self {
        Self {
            position,
            interaction: None,
        }
    }

    pub const fn through(position: Position, id: ObstacleId) -> Self {
        Self {
            position,
            interaction: Some(id),
        }
    }
}

/// Standoff and pass-through cells for one barrier crossing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CrossingGeometry {
    /// Cell the agent occupies before toggling the barrier.
    pub standoff: Position,
    /// Cell beyond the barrier along the direction of travel.
    pub beyond: Position,
}

/// Compute standoff and pass-through positions for a barrier.
///
/// The standoff is offset from the barrier along the axis perpendicular to
/// its face, on the side the agent approaches from; the pass-through mirrors
/// it on the far side. `from` is the agent position at hand-off.
pub fn crossing_geometry(
    kind: ObstacleKind,
    facing: Facing,
    obstacle: Position,
    from: Position,
) -> CrossingGeometry {
    let (ax, az) = facing.axis_step();

    // Which side of the blocking axis the agent stands on. Degenerate
    // projections (agent exactly on the barrier plane) default to the
    // positive side.
    let projection = (from.x - obstacle.x) * ax + (from.z - obstacle.z) * az;
    let side = if projection < 0 { -1 } else { 1 };

    let near = kind.standoff_distance() * side;
    let far = kind.clearance_distance() * side;

    CrossingGeometry {
        standoff: obstacle.offset(ax * near, 0, az * near),
        beyond: obstacle.offset(-ax * far, 0, -az * far),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_distance() {
        let a = Position::new(0, 0, 0);
        let b = Position::new(3, 0, 4);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
        assert_eq!(a.manhattan_distance(&b), 7);
    }

    #[test]
    fn test_obstacle_id_is_deterministic() {
        let pos = Position::new(10, 64, 20);
        let a = ObstacleId::from_position(pos);
        let b = ObstacleId::from_position(pos);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "obstacle_10_64_20");
    }

    #[test]
    fn test_facing_parse() {
        assert_eq!(Facing::parse("north"), Some(Facing::North));
        assert_eq!(Facing::parse("sideways"), None);
    }

    #[test]
    fn test_crossing_geometry_north_facing() {
        // North-facing door blocks along z. Agent approaching from the
        // south (z greater than the door) stands off on its own side and
        // passes through to the north side.
        let door = Position::new(10, 64, 20);
        let from = Position::new(10, 64, 22);

        let geom = crossing_geometry(ObstacleKind::Door, Facing::North, door, from);
        assert_eq!(geom.standoff, Position::new(10, 64, 22));
        assert_eq!(geom.beyond, Position::new(10, 64, 18));
    }

    #[test]
    fn test_crossing_geometry_side_follows_agent() {
        let door = Position::new(10, 64, 20);
        let from_north = Position::new(10, 64, 18);

        let geom = crossing_geometry(ObstacleKind::Door, Facing::North, door, from_north);
        assert_eq!(geom.standoff, Position::new(10, 64, 18));
        assert_eq!(geom.beyond, Position::new(10, 64, 22));
    }

    #[test]
    fn test_crossing_geometry_trapdoor_offsets() {
        let hatch = Position::new(0, 10, 0);
        let from = Position::new(2, 10, 0);

        let geom = crossing_geometry(ObstacleKind::Trapdoor, Facing::East, hatch, from);
        assert_eq!(geom.standoff, Position::new(1, 10, 0));
        assert_eq!(geom.beyond, Position::new(-2, 10, 0));
    }
}
