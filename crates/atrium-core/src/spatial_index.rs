//! Per-floor 2D point index backed by an R-tree.
//!
//! Supports inclusive axis-aligned range queries for neighbor enumeration
//! during the visibility-edge build, and nearest-neighbor iteration for
//! anchoring user endpoints to the graph.

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::geom::Coord;

/// A graph node's id and position, as stored in the index.
#[derive(Debug, Clone)]
pub struct IndexedNode {
    pub id: String,
    pub coords: Coord,
}

impl RTreeObject for IndexedNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.coords)
    }
}

impl PointDistance for IndexedNode {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.coords[0] - point[0];
        let dy = self.coords[1] - point[1];
        dx * dx + dy * dy
    }
}

#[derive(Debug)]
pub struct SpatialIndex {
    tree: RTree<IndexedNode>,
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    /// Bulk-build the index; O(n log n).
    pub fn bulk_load(nodes: Vec<IndexedNode>) -> Self {
        Self {
            tree: RTree::bulk_load(nodes),
        }
    }

    pub fn insert(&mut self, node: IndexedNode) {
        self.tree.insert(node);
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// All indexed nodes whose coordinates fall inside the inclusive
    /// rectangle `[min_lng, min_lat, max_lng, max_lat]`.
    pub fn query_rect(&self, rect: &[f64; 4]) -> Vec<&IndexedNode> {
        let envelope = AABB::from_corners([rect[0], rect[1]], [rect[2], rect[3]]);
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .collect()
    }

    /// Nodes in ascending degree-space distance from `point`.
    pub fn nearest_iter(&self, point: Coord) -> impl Iterator<Item = &IndexedNode> {
        self.tree.nearest_neighbor_iter(&point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_index() -> SpatialIndex {
        let mut nodes = Vec::new();
        for x in 0..5 {
            for y in 0..5 {
                nodes.push(IndexedNode {
                    id: format!("n_{x}_{y}"),
                    coords: [x as f64 * 0.001, y as f64 * 0.001],
                });
            }
        }
        SpatialIndex::bulk_load(nodes)
    }

    #[test]
    fn test_query_rect_inclusive_bounds() {
        let index = grid_index();
        let hits = index.query_rect(&[0.0, 0.0, 0.001, 0.001]);
        // Corners on the boundary are included.
        assert_eq!(hits.len(), 4);
    }

    #[test]
    fn test_query_is_stable_under_repetition() {
        let index = grid_index();
        let mut first: Vec<String> = index
            .query_rect(&[0.0, 0.0, 0.002, 0.002])
            .iter()
            .map(|n| n.id.clone())
            .collect();
        let mut second: Vec<String> = index
            .query_rect(&[0.0, 0.0, 0.002, 0.002])
            .iter()
            .map(|n| n.id.clone())
            .collect();
        first.sort();
        second.sort();
        assert_eq!(first, second);
    }

    #[test]
    fn test_nearest_iter_orders_by_distance() {
        let index = grid_index();
        let nearest: Vec<&IndexedNode> = index.nearest_iter([0.0021, 0.0]).take(2).collect();
        assert_eq!(nearest[0].id, "n_2_0");
    }
}
