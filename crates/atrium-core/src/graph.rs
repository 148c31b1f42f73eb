//! Routing graph: typed nodes keyed by stable string ids, directed weighted
//! edges in per-node adjacency lists, per-floor partitions and spatial
//! indexes.
//!
//! Nodes reference each other by id only; the graph owns every node. This
//! keeps the cached edge format trivially serializable and avoids
//! back-pointer cycles between nodes and edges.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::geom::{self, Coord};
use crate::spatial_index::{IndexedNode, SpatialIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    Walkable,
    Entrance,
    Door,
    Stairs,
    Elevator,
    Waypoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeType {
    Walkable,
    DoorLink,
    Stairs,
    Elevator,
    Escalator,
}

/// Node attributes consulted by search constraints and room logic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Owning source-geometry ids.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub geometry_ids: BTreeSet<String>,
    /// Rooms containing this node; empty means public walkway.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub room_ids: BTreeSet<String>,
    #[serde(default)]
    pub is_door: bool,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub is_stairs: bool,
    #[serde(default)]
    pub is_elevator: bool,
    #[serde(default = "default_true")]
    pub accessible: bool,
    #[serde(default)]
    pub flags: u64,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub coords: Coord,
    pub floor_id: String,
    pub node_type: NodeType,
    #[serde(default)]
    pub metadata: NodeMetadata,
}

impl Node {
    pub fn walkable(id: impl Into<String>, coords: Coord, floor_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            coords,
            floor_id: floor_id.into(),
            node_type: NodeType::Walkable,
            metadata: NodeMetadata {
                accessible: true,
                ..NodeMetadata::default()
            },
        }
    }

    /// A door node. `is_locked` is the complement of `is_public`.
    pub fn door(
        id: impl Into<String>,
        coords: Coord,
        floor_id: impl Into<String>,
        is_public: bool,
        flags: u64,
    ) -> Self {
        Self {
            id: id.into(),
            coords,
            floor_id: floor_id.into(),
            node_type: NodeType::Door,
            metadata: NodeMetadata {
                is_door: true,
                is_public,
                is_locked: !is_public,
                accessible: true,
                flags,
                ..NodeMetadata::default()
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    /// Meters; finite and non-negative.
    pub weight_m: f64,
    pub edge_type: EdgeType,
    pub accessible: bool,
}

#[derive(Debug, Default)]
pub struct Graph {
    nodes: HashMap<String, Node>,
    edges_out: HashMap<String, Vec<Edge>>,
    per_floor: HashMap<String, BTreeSet<String>>,
    spatial: HashMap<String, SpatialIndex>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a node. Replacing keeps existing edges.
    pub fn insert_node(&mut self, node: Node) {
        self.per_floor
            .entry(node.floor_id.clone())
            .or_default()
            .insert(node.id.clone());
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges_out.values().map(Vec::len).sum()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn floor_ids(&self) -> impl Iterator<Item = &String> {
        self.per_floor.keys()
    }

    /// Node ids on a floor, in id order.
    pub fn nodes_on_floor(&self, floor_id: &str) -> impl Iterator<Item = &String> {
        self.per_floor.get(floor_id).into_iter().flatten()
    }

    pub fn floor_node_count(&self, floor_id: &str) -> usize {
        self.per_floor.get(floor_id).map_or(0, BTreeSet::len)
    }

    /// Add a directed edge. Rejects edges whose endpoints do not resolve or
    /// whose weight is not a finite non-negative number.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        if !edge.weight_m.is_finite() || edge.weight_m < 0.0 {
            return false;
        }
        if !self.nodes.contains_key(&edge.from) || !self.nodes.contains_key(&edge.to) {
            return false;
        }
        self.edges_out.entry(edge.from.clone()).or_default().push(edge);
        true
    }

    /// Add both directions with identical weight.
    pub fn add_bidirectional(
        &mut self,
        from: &str,
        to: &str,
        weight_m: f64,
        edge_type: EdgeType,
        accessible: bool,
    ) -> bool {
        let forward = Edge {
            from: from.to_string(),
            to: to.to_string(),
            weight_m,
            edge_type,
            accessible,
        };
        let backward = Edge {
            from: to.to_string(),
            to: from.to_string(),
            weight_m,
            edge_type,
            accessible,
        };
        self.add_edge(forward) && self.add_edge(backward)
    }

    pub fn edges_from(&self, id: &str) -> &[Edge] {
        self.edges_out.get(id).map_or(&[], Vec::as_slice)
    }

    pub fn degree(&self, id: &str) -> usize {
        self.edges_out.get(id).map_or(0, Vec::len)
    }

    /// Every directed edge in the graph.
    pub fn all_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges_out.values().flatten()
    }

    /// (Re)build per-floor spatial indexes from the current node set.
    pub fn build_spatial_indexes(&mut self) {
        self.spatial.clear();
        for (floor_id, ids) in &self.per_floor {
            let indexed: Vec<IndexedNode> = ids
                .iter()
                .filter_map(|id| self.nodes.get(id))
                .map(|n| IndexedNode {
                    id: n.id.clone(),
                    coords: n.coords,
                })
                .collect();
            self.spatial
                .insert(floor_id.clone(), SpatialIndex::bulk_load(indexed));
        }
    }

    pub fn spatial_index(&self, floor_id: &str) -> Option<&SpatialIndex> {
        self.spatial.get(floor_id)
    }

    /// Nearest node on `floor_id` accepted by `predicate`, searching an
    /// expanding square radius. Returns the node and its geodesic distance.
    ///
    /// Starts at `start_radius_deg` and doubles up to `max_radius_deg`;
    /// falls back to a linear scan of the floor when the index is missing.
    pub fn nearest_node_where(
        &self,
        coords: Coord,
        floor_id: &str,
        start_radius_deg: f64,
        max_radius_deg: f64,
        predicate: impl Fn(&Node) -> bool,
    ) -> Option<(&Node, f64)> {
        if let Some(index) = self.spatial.get(floor_id) {
            let mut radius = start_radius_deg.max(1e-7);
            loop {
                let rect = [
                    coords[0] - radius,
                    coords[1] - radius,
                    coords[0] + radius,
                    coords[1] + radius,
                ];
                let best = index
                    .query_rect(&rect)
                    .into_iter()
                    .filter_map(|hit| self.nodes.get(&hit.id))
                    .filter(|n| predicate(n))
                    .map(|n| (n, geom::distance_m(coords, n.coords)))
                    .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
                if best.is_some() {
                    return best;
                }
                if radius >= max_radius_deg {
                    return None;
                }
                radius = (radius * 2.0).min(max_radius_deg);
            }
        }

        self.per_floor
            .get(floor_id)?
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|n| predicate(n))
            .map(|n| (n, geom::distance_m(coords, n.coords)))
            .filter(|(_, d)| *d <= max_radius_deg * geom::DEG_LAT_M)
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Up to `limit` nodes within `radius_deg` of `coords` on one floor,
    /// ascending by geodesic distance, accepted by `predicate`.
    pub fn nodes_near(
        &self,
        coords: Coord,
        floor_id: &str,
        radius_deg: f64,
        limit: usize,
        predicate: impl Fn(&Node) -> bool,
    ) -> Vec<(&Node, f64)> {
        let rect = [
            coords[0] - radius_deg,
            coords[1] - radius_deg,
            coords[0] + radius_deg,
            coords[1] + radius_deg,
        ];
        let mut hits: Vec<(&Node, f64)> = match self.spatial.get(floor_id) {
            Some(index) => index
                .query_rect(&rect)
                .into_iter()
                .filter_map(|hit| self.nodes.get(&hit.id))
                .filter(|n| predicate(n))
                .map(|n| (n, geom::distance_m(coords, n.coords)))
                .collect(),
            None => self
                .per_floor
                .get(floor_id)
                .into_iter()
                .flatten()
                .filter_map(|id| self.nodes.get(id))
                .filter(|n| {
                    n.coords[0] >= rect[0]
                        && n.coords[0] <= rect[2]
                        && n.coords[1] >= rect[1]
                        && n.coords[1] <= rect[3]
                })
                .filter(|n| predicate(n))
                .map(|n| (n, geom::distance_m(coords, n.coords)))
                .collect(),
        };
        hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_graph() -> Graph {
        let mut g = Graph::new();
        g.insert_node(Node::walkable("a", [0.0, 0.0], "floor0"));
        g.insert_node(Node::walkable("b", [0.0001, 0.0], "floor0"));
        g.insert_node(Node::walkable("c", [0.0, 0.0001], "floor1"));
        g.build_spatial_indexes();
        g
    }

    #[test]
    fn test_per_floor_partition() {
        let g = test_graph();
        assert_eq!(g.floor_node_count("floor0"), 2);
        assert_eq!(g.floor_node_count("floor1"), 1);
        assert_eq!(g.node_count(), 3);
    }

    #[test]
    fn test_edge_requires_resolving_endpoints() {
        let mut g = test_graph();
        assert!(g.add_bidirectional("a", "b", 11.1, EdgeType::Walkable, true));
        assert!(!g.add_edge(Edge {
            from: "a".into(),
            to: "missing".into(),
            weight_m: 1.0,
            edge_type: EdgeType::Walkable,
            accessible: true,
        }));
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.degree("a"), 1);
    }

    #[test]
    fn test_edge_rejects_bad_weight() {
        let mut g = test_graph();
        assert!(!g.add_edge(Edge {
            from: "a".into(),
            to: "b".into(),
            weight_m: f64::NAN,
            edge_type: EdgeType::Walkable,
            accessible: true,
        }));
        assert!(!g.add_edge(Edge {
            from: "a".into(),
            to: "b".into(),
            weight_m: -1.0,
            edge_type: EdgeType::Walkable,
            accessible: true,
        }));
    }

    #[test]
    fn test_nearest_node_respects_floor_and_predicate() {
        let g = test_graph();
        let (node, dist) = g
            .nearest_node_where([0.00004, 0.0], "floor0", 0.0001, 0.01, |_| true)
            .unwrap();
        assert_eq!(node.id, "a");
        assert!(dist < 10.0);

        // Predicate excludes "a"; expanding search finds "b".
        let (node, _) = g
            .nearest_node_where([0.00001, 0.0], "floor0", 0.00001, 0.01, |n| n.id != "a")
            .unwrap();
        assert_eq!(node.id, "b");

        // Nothing on floor1 near the origin but "c".
        let (node, _) = g
            .nearest_node_where([0.0, 0.0], "floor1", 0.0001, 0.01, |_| true)
            .unwrap();
        assert_eq!(node.id, "c");
    }

    #[test]
    fn test_door_invariant() {
        let locked = Node::door("door_x", [0.0, 0.0], "floor0", false, 0);
        assert!(locked.metadata.is_door);
        assert!(locked.metadata.is_locked);
        let public = Node::door("door_y", [0.0, 0.0], "floor0", true, 0);
        assert!(!public.metadata.is_locked);
    }
}
