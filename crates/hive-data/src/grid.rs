//! Minimap grid consumed by decision makers.
//!
//! A [`MinimapGrid`] is a graph of nodes on an integer grid. Each node
//! knows whether it is walkable, its traversal weight, and its typed,
//! **directed** connections to other nodes. A connection and its kind
//! travel together in one [`Connection`] record, so the "connections
//! and connection-types stay in lockstep" invariant holds by
//! construction.
//!
//! Pathfinding over the grid belongs to game-specific layers; the
//! kernel only offers the structure plus the neighbor queries decision
//! makers need to sanity-check targets.

use crate::error::DataError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A point on the minimap's integer grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPoint {
    /// Horizontal minimap coordinate.
    pub x: i32,
    /// Vertical minimap coordinate.
    pub y: i32,
}

impl GridPoint {
    /// Creates a point.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance to another point.
    #[must_use]
    pub fn distance(self, other: GridPoint) -> u32 {
        let dx = (self.x - other.x).unsigned_abs();
        let dy = (self.y - other.y).unsigned_abs();
        dx.max(dy)
    }
}

/// How a connection is traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// Jump across or up to the target.
    Jump,
    /// Drop down to the target.
    Fall,
    /// Directional teleport skills.
    TeleportLeft,
    /// See [`TeleportLeft`](Self::TeleportLeft).
    TeleportRight,
    /// See [`TeleportLeft`](Self::TeleportLeft).
    TeleportUp,
    /// See [`TeleportLeft`](Self::TeleportLeft).
    TeleportDown,
    /// Portal that stays within the current map.
    PortalInMap,
    /// Portal that leaves the current map.
    PortalOutMap,
}

/// One directed, typed edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Destination node.
    pub target: GridPoint,
    /// Traversal type.
    pub kind: ConnectionKind,
}

/// One grid node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinimapNode {
    /// Whether the player can stand here.
    pub walkable: bool,
    /// Traversal cost hint for pathfinding layers.
    pub weight: u32,
    /// Directed outgoing connections.
    connections: Vec<Connection>,
}

impl MinimapNode {
    /// Creates a node with no connections.
    #[must_use]
    pub fn new(walkable: bool, weight: u32) -> Self {
        Self {
            walkable,
            weight,
            connections: Vec::new(),
        }
    }

    /// Outgoing connections, in insertion order.
    #[must_use]
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }
}

/// Graph of minimap nodes.
///
/// Serialized as a flat list of node records: grid points make poor
/// map keys in text formats.
///
/// # Example
///
/// ```
/// use hive_data::{ConnectionKind, GridPoint, MinimapGrid, MinimapNode};
///
/// let mut grid = MinimapGrid::new();
/// let ledge = GridPoint::new(10, 4);
/// let floor = GridPoint::new(10, 9);
///
/// grid.insert(ledge, MinimapNode::new(true, 1));
/// grid.insert(floor, MinimapNode::new(true, 1));
/// grid.connect(ledge, floor, ConnectionKind::Fall).unwrap();
///
/// // Directed: the fall edge has no upward counterpart.
/// assert_eq!(grid.connections(ledge).unwrap().len(), 1);
/// assert!(grid.connections(floor).unwrap().is_empty());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "Vec<NodeRecord>", from = "Vec<NodeRecord>")]
pub struct MinimapGrid {
    nodes: HashMap<GridPoint, MinimapNode>,
}

/// Flat serialization record for one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeRecord {
    point: GridPoint,
    walkable: bool,
    weight: u32,
    connections: Vec<Connection>,
}

impl From<MinimapGrid> for Vec<NodeRecord> {
    fn from(grid: MinimapGrid) -> Self {
        grid.nodes
            .into_iter()
            .map(|(point, node)| NodeRecord {
                point,
                walkable: node.walkable,
                weight: node.weight,
                connections: node.connections,
            })
            .collect()
    }
}

impl From<Vec<NodeRecord>> for MinimapGrid {
    fn from(records: Vec<NodeRecord>) -> Self {
        let nodes = records
            .into_iter()
            .map(|record| {
                (
                    record.point,
                    MinimapNode {
                        walkable: record.walkable,
                        weight: record.weight,
                        connections: record.connections,
                    },
                )
            })
            .collect();
        Self { nodes }
    }
}

impl MinimapGrid {
    /// Creates an empty grid.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Inserts or replaces a node. Existing connections from other
    /// nodes to this point are unaffected.
    pub fn insert(&mut self, point: GridPoint, node: MinimapNode) {
        self.nodes.insert(point, node);
    }

    /// Looks up a node.
    #[must_use]
    pub fn node(&self, point: GridPoint) -> Option<&MinimapNode> {
        self.nodes.get(&point)
    }

    /// Adds a directed connection `from → to`.
    ///
    /// # Errors
    ///
    /// [`DataError::UnknownNode`] when either endpoint is missing.
    pub fn connect(
        &mut self,
        from: GridPoint,
        to: GridPoint,
        kind: ConnectionKind,
    ) -> Result<(), DataError> {
        if !self.nodes.contains_key(&to) {
            return Err(DataError::UnknownNode { x: to.x, y: to.y });
        }
        let node = self
            .nodes
            .get_mut(&from)
            .ok_or(DataError::UnknownNode { x: from.x, y: from.y })?;
        node.connections.push(Connection { target: to, kind });
        Ok(())
    }

    /// Outgoing connections of a node.
    ///
    /// # Errors
    ///
    /// [`DataError::UnknownNode`] when the node is missing.
    pub fn connections(&self, point: GridPoint) -> Result<&[Connection], DataError> {
        self.nodes
            .get(&point)
            .map(MinimapNode::connections)
            .ok_or(DataError::UnknownNode {
                x: point.x,
                y: point.y,
            })
    }

    /// The walkable node closest to `point` within `max_radius`
    /// (Chebyshev), the point itself included.
    #[must_use]
    pub fn nearest_walkable(&self, point: GridPoint, max_radius: u32) -> Option<GridPoint> {
        self.nodes
            .iter()
            .filter(|(p, node)| node.walkable && p.distance(point) <= max_radius)
            .min_by_key(|(p, _)| p.distance(point))
            .map(|(p, _)| *p)
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` when the grid has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
