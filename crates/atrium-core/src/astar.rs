//! A* shortest-path search over the routing graph.
//!
//! Plain Dijkstra-with-heuristic on a binary heap, with lazy deletion:
//! stale heap entries are skipped when their cost exceeds the best known
//! cost for the node. The heuristic is the geodesic distance to the goal
//! plus a small constant penalty when the node is on a different floor,
//! which nudges ties toward staying on the goal floor without ever
//! overestimating a real cross-floor traversal.
//!
//! The bidirectional variant alternates expansions from both ends and stops
//! when the best meeting distance drops below the sum of the two heap-top
//! priorities. That bound is strictly admissible only for an unweighted
//! heuristic; with `heuristic_weight > 1.0` the result is approximate.

use std::collections::{BinaryHeap, HashMap};

use crate::geom::{self, Coord};
use crate::graph::{Edge, EdgeType, Graph, Node, NodeType};

/// Search constraints and tuning.
pub struct SearchOptions<'a> {
    /// Reject edges not usable by wheelchair users (stairs, escalators).
    pub accessible_only: bool,
    /// Reject stairs edges even when otherwise accessible.
    pub avoid_stairs: bool,
    /// Scalar on the heuristic; above 1.0 trades optimality for speed.
    pub heuristic_weight: f64,
    /// Heuristic addend when a node is not on the goal floor.
    pub floor_change_penalty_m: f64,
    /// With [`Self::disallow_other_rooms`], rooms whose interior nodes may
    /// be traversed. Doors and connectors always pass.
    pub allowed_room_ids: Option<std::collections::BTreeSet<String>>,
    pub disallow_other_rooms: bool,
    /// Arbitrary node predicate, e.g. to reject locked doors.
    pub node_filter: Option<&'a dyn Fn(&Node) -> bool>,
}

impl Default for SearchOptions<'_> {
    fn default() -> Self {
        Self {
            accessible_only: false,
            avoid_stairs: false,
            heuristic_weight: 1.0,
            floor_change_penalty_m: 10.0,
            allowed_room_ids: None,
            disallow_other_rooms: false,
            node_filter: None,
        }
    }
}

impl SearchOptions<'_> {
    fn edge_permitted(&self, edge: &Edge) -> bool {
        if self.accessible_only && !edge.accessible {
            return false;
        }
        if self.avoid_stairs && edge.edge_type == EdgeType::Stairs {
            return false;
        }
        true
    }

    fn node_permitted(&self, node: &Node) -> bool {
        if let Some(filter) = self.node_filter {
            if !filter(node) {
                return false;
            }
        }
        if self.disallow_other_rooms {
            if let Some(allowed) = &self.allowed_room_ids {
                let passes_freely = matches!(
                    node.node_type,
                    NodeType::Door | NodeType::Stairs | NodeType::Elevator
                );
                if !passes_freely
                    && !node.metadata.room_ids.is_empty()
                    && node.metadata.room_ids.is_disjoint(allowed)
                {
                    return false;
                }
            }
        }
        true
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PathSegment {
    pub from: String,
    pub to: String,
    pub from_coords: Coord,
    pub to_coords: Coord,
    pub distance_m: f64,
    pub from_floor: String,
    pub to_floor: String,
    pub floor_change: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub node_ids: Vec<String>,
    pub coords: Vec<Coord>,
    pub floors: Vec<String>,
    pub distance_m: f64,
    pub segments: Vec<PathSegment>,
}

/// Heap entry; the reversed ordering turns Rust's max-heap into a min-heap
/// on `score`. Ties break on id so expansion order is deterministic.
struct QueueItem {
    id: String,
    cost: f64,
    score: f64,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.id == other.id
    }
}
impl Eq for QueueItem {}
impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| other.id.cmp(&self.id))
    }
}

fn heuristic(node: &Node, goal: &Node, options: &SearchOptions) -> f64 {
    let mut h = geom::distance_m(node.coords, goal.coords);
    if node.floor_id != goal.floor_id {
        h += options.floor_change_penalty_m;
    }
    h * options.heuristic_weight
}

/// Weight of the cheapest permitted edge `from -> to`, recomputed from
/// coordinates when the graph somehow lacks one.
fn edge_weight(graph: &Graph, from: &str, to: &str, options: &SearchOptions) -> f64 {
    let best = graph
        .edges_from(from)
        .iter()
        .filter(|e| e.to == to && options.edge_permitted(e))
        .map(|e| e.weight_m)
        .fold(f64::INFINITY, f64::min);
    if best.is_finite() {
        return best;
    }
    let a = graph.node(from).map(|n| n.coords).unwrap_or_default();
    let b = graph.node(to).map(|n| n.coords).unwrap_or_default();
    geom::distance_m(a, b)
}

/// Find the cheapest path between two graph nodes.
///
/// Returns `None` when no route satisfies the constraints. The start and
/// goal nodes themselves bypass the node constraints; callers picked them
/// deliberately.
pub fn find_path(
    graph: &Graph,
    from_id: &str,
    to_id: &str,
    options: &SearchOptions,
) -> Option<SearchResult> {
    let goal = graph.node(to_id)?;
    let start = graph.node(from_id)?;

    if from_id == to_id {
        return Some(build_result(graph, vec![from_id.to_string()], options));
    }

    let mut queue: BinaryHeap<QueueItem> = BinaryHeap::new();
    let mut came_from: HashMap<String, String> = HashMap::new();
    let mut known_costs: HashMap<String, f64> = HashMap::new();

    queue.push(QueueItem {
        id: from_id.to_string(),
        cost: 0.0,
        score: heuristic(start, goal, options),
    });
    known_costs.insert(from_id.to_string(), 0.0);

    while let Some(item) = queue.pop() {
        if item.id == to_id {
            // Goal popped, not merely reached: the path is final.
            let mut path = vec![item.id];
            while let Some(prev) = came_from.get(path.last().unwrap()) {
                path.push(prev.clone());
            }
            path.reverse();
            return Some(build_result(graph, path, options));
        }

        // Stale entry left behind by lazy deletion.
        if item.cost > known_costs.get(&item.id).copied().unwrap_or(f64::INFINITY) {
            continue;
        }

        for edge in graph.edges_from(&item.id) {
            if !options.edge_permitted(edge) {
                continue;
            }
            let Some(neighbor) = graph.node(&edge.to) else {
                continue;
            };
            if edge.to != to_id && edge.to != from_id && !options.node_permitted(neighbor) {
                continue;
            }

            let neighbor_cost = item.cost + edge.weight_m;
            if neighbor_cost
                >= known_costs.get(&edge.to).copied().unwrap_or(f64::INFINITY)
            {
                continue;
            }
            came_from.insert(edge.to.clone(), item.id.clone());
            known_costs.insert(edge.to.clone(), neighbor_cost);
            queue.push(QueueItem {
                id: edge.to.clone(),
                cost: neighbor_cost,
                score: neighbor_cost + heuristic(neighbor, goal, options),
            });
        }
    }

    None
}

/// Bidirectional variant: alternates one expansion per side and stops when
/// the best meeting distance is at most the sum of the heap-top priorities.
/// Optimal for `heuristic_weight == 1.0`; approximate above that.
pub fn find_path_bidirectional(
    graph: &Graph,
    from_id: &str,
    to_id: &str,
    options: &SearchOptions,
) -> Option<SearchResult> {
    let start = graph.node(from_id)?;
    let goal = graph.node(to_id)?;
    if from_id == to_id {
        return Some(build_result(graph, vec![from_id.to_string()], options));
    }

    // Reverse adjacency for the backward frontier.
    let mut edges_in: HashMap<&str, Vec<&Edge>> = HashMap::new();
    for edge in graph.all_edges() {
        edges_in.entry(edge.to.as_str()).or_default().push(edge);
    }

    struct Side {
        queue: BinaryHeap<QueueItem>,
        came_from: HashMap<String, String>,
        known_costs: HashMap<String, f64>,
    }
    let mut forward = Side {
        queue: BinaryHeap::new(),
        came_from: HashMap::new(),
        known_costs: HashMap::new(),
    };
    let mut backward = Side {
        queue: BinaryHeap::new(),
        came_from: HashMap::new(),
        known_costs: HashMap::new(),
    };
    forward.queue.push(QueueItem {
        id: from_id.to_string(),
        cost: 0.0,
        score: heuristic(start, goal, options),
    });
    forward.known_costs.insert(from_id.to_string(), 0.0);
    backward.queue.push(QueueItem {
        id: to_id.to_string(),
        cost: 0.0,
        score: heuristic(goal, start, options),
    });
    backward.known_costs.insert(to_id.to_string(), 0.0);

    let mut best_meeting: Option<(String, f64)> = None;

    loop {
        let (Some(top_f), Some(top_b)) = (forward.queue.peek(), backward.queue.peek()) else {
            break;
        };
        if let Some((_, best)) = &best_meeting {
            if *best <= top_f.score + top_b.score {
                break;
            }
        }

        for direction in 0..2 {
            let (side, other, target, reversed) = if direction == 0 {
                (&mut forward, &mut backward, goal, false)
            } else {
                (&mut backward, &mut forward, start, true)
            };
            let Some(item) = side.queue.pop() else { continue };
            if item.cost > side.known_costs.get(&item.id).copied().unwrap_or(f64::INFINITY) {
                continue;
            }
            if let Some(other_cost) = other.known_costs.get(&item.id) {
                let total = item.cost + other_cost;
                if best_meeting.as_ref().map_or(true, |(_, best)| total < *best) {
                    best_meeting = Some((item.id.clone(), total));
                }
            }

            let neighbors: Vec<(&str, f64)> = if reversed {
                edges_in
                    .get(item.id.as_str())
                    .into_iter()
                    .flatten()
                    .filter(|e| options.edge_permitted(e))
                    .map(|e| (e.from.as_str(), e.weight_m))
                    .collect()
            } else {
                graph
                    .edges_from(&item.id)
                    .iter()
                    .filter(|e| options.edge_permitted(e))
                    .map(|e| (e.to.as_str(), e.weight_m))
                    .collect()
            };

            for (next_id, weight) in neighbors {
                let Some(neighbor) = graph.node(next_id) else { continue };
                if next_id != from_id && next_id != to_id && !options.node_permitted(neighbor) {
                    continue;
                }
                let next_cost = item.cost + weight;
                if next_cost
                    >= side
                        .known_costs
                        .get(next_id)
                        .copied()
                        .unwrap_or(f64::INFINITY)
                {
                    continue;
                }
                side.came_from.insert(next_id.to_string(), item.id.clone());
                side.known_costs.insert(next_id.to_string(), next_cost);
                side.queue.push(QueueItem {
                    id: next_id.to_string(),
                    cost: next_cost,
                    score: next_cost + heuristic(neighbor, target, options),
                });
            }
        }
    }

    let (meeting, _) = best_meeting?;

    // Forward half: start .. meeting.
    let mut path = vec![meeting.clone()];
    while let Some(prev) = forward.came_from.get(path.last().unwrap()) {
        path.push(prev.clone());
    }
    path.reverse();
    // Backward half: the backward tree's parents lead toward the goal.
    let mut cursor = meeting;
    while let Some(next) = backward.came_from.get(&cursor) {
        path.push(next.clone());
        cursor = next.clone();
    }

    Some(build_result(graph, path, options))
}

/// Materialize coordinates, floors, segments, and the total distance for an
/// id path.
fn build_result(graph: &Graph, node_ids: Vec<String>, options: &SearchOptions) -> SearchResult {
    let mut coords = Vec::with_capacity(node_ids.len());
    let mut floors = Vec::with_capacity(node_ids.len());
    for id in &node_ids {
        if let Some(node) = graph.node(id) {
            coords.push(node.coords);
            floors.push(node.floor_id.clone());
        }
    }

    let mut segments = Vec::with_capacity(node_ids.len().saturating_sub(1));
    let mut distance_m = 0.0;
    for w in node_ids.windows(2) {
        let (Some(a), Some(b)) = (graph.node(&w[0]), graph.node(&w[1])) else {
            continue;
        };
        let weight = edge_weight(graph, &w[0], &w[1], options);
        distance_m += weight;
        segments.push(PathSegment {
            from: w[0].clone(),
            to: w[1].clone(),
            from_coords: a.coords,
            to_coords: b.coords,
            distance_m: weight,
            from_floor: a.floor_id.clone(),
            to_floor: b.floor_id.clone(),
            floor_change: a.floor_id != b.floor_id,
        });
    }

    SearchResult {
        node_ids,
        coords,
        floors,
        distance_m,
        segments,
    }
}
