//! Per-floor visibility-edge construction.
//!
//! For every node the builder queries the floor's spatial index for
//! candidates within the distance cap, oversamples well past the neighbor
//! budget, and only then filters by line of sight, accepting survivors in
//! ascending distance order. Pruning to the neighbor budget before the
//! line-of-sight test fragments the graph whenever the nearest candidates
//! sit on the wrong side of a wall.
//!
//! The build yields cooperatively so it can run on a shared executor, and
//! its output is deterministic for identical inputs regardless of where
//! suspensions occur.

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::collision::CollisionDetector;
use crate::config::EdgeBuildConfig;
use crate::error::InitError;
use crate::geom::{self, DEG_LAT_M};
use crate::graph::{Edge, EdgeType, Graph};

/// Progress report emitted after each completed floor.
#[derive(Debug, Clone)]
pub struct EdgeBuildStatus {
    pub floor_index: usize,
    pub floor_id: String,
    pub edge_count: usize,
}

/// Candidate neighbor ordered by squared degree-space distance.
/// The `BinaryHeap` is a max-heap, so `peek`/`pop` expose the farthest
/// retained candidate during bounded selection.
struct Candidate {
    dist2: f64,
    id: String,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.dist2 == other.dist2 && self.id == other.id
    }
}
impl Eq for Candidate {}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.dist2
            .total_cmp(&other.dist2)
            .then_with(|| self.id.cmp(&other.id))
    }
}

struct YieldBudget {
    every: usize,
    after: Duration,
    processed: usize,
    last: Instant,
}

impl YieldBudget {
    fn new(config: &EdgeBuildConfig) -> Self {
        Self {
            every: config.yield_every.max(1),
            after: Duration::from_millis(config.yield_after_ms),
            processed: 0,
            last: Instant::now(),
        }
    }

    async fn tick(&mut self, cancel: &AtomicBool) -> Result<(), InitError> {
        self.processed += 1;
        if self.processed >= self.every || self.last.elapsed() >= self.after {
            if cancel.load(Ordering::Relaxed) {
                return Err(InitError::Cancelled);
            }
            tokio::task::yield_now().await;
            self.processed = 0;
            self.last = Instant::now();
        }
        Ok(())
    }
}

/// Build visibility edges for every floor of the graph.
///
/// Emits each accepted link as a bidirectional pair of `walkable` edges
/// with identical weight. The optional callback fires once per completed
/// floor. Cancellation is checked at every yield point; on cancellation
/// partial output is discarded.
pub async fn build_visibility_edges(
    graph: &Graph,
    collision: &CollisionDetector,
    config: &EdgeBuildConfig,
    cancel: &AtomicBool,
    mut on_floor_done: Option<&mut dyn FnMut(EdgeBuildStatus)>,
) -> Result<Vec<Edge>, InitError> {
    let mut edges: Vec<Edge> = Vec::new();
    let mut budget = YieldBudget::new(config);

    let mut floor_ids: Vec<&String> = graph.floor_ids().collect();
    floor_ids.sort();

    for (floor_index, floor_id) in floor_ids.into_iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            return Err(InitError::Cancelled);
        }
        let floor_start = edges.len();

        for a_id in graph.nodes_on_floor(floor_id) {
            budget.tick(cancel).await?;

            let Some(a) = graph.node(a_id) else { continue };
            let candidates = select_candidates(graph, floor_id, a_id, a.coords, config);

            let mut accepted = 0usize;
            for candidate in candidates {
                if accepted >= config.max_neighbors {
                    break;
                }
                // Each unordered pair is examined once, from its lower id.
                if candidate.id.as_str() <= a_id.as_str() {
                    continue;
                }
                let Some(b) = graph.node(&candidate.id) else {
                    continue;
                };
                let distance = geom::fast_distance_m(a.coords, b.coords);
                if distance > config.max_distance_m {
                    continue;
                }
                if !collision.has_line_of_sight(a.coords, b.coords, floor_id) {
                    continue;
                }

                edges.push(Edge {
                    from: a_id.clone(),
                    to: candidate.id.clone(),
                    weight_m: distance,
                    edge_type: EdgeType::Walkable,
                    accessible: true,
                });
                edges.push(Edge {
                    from: candidate.id.clone(),
                    to: a_id.clone(),
                    weight_m: distance,
                    edge_type: EdgeType::Walkable,
                    accessible: true,
                });
                accepted += 1;
            }
        }

        let floor_edges = edges.len() - floor_start;
        debug!(floor = %floor_id, edges = floor_edges, "visibility edges built");
        if let Some(callback) = on_floor_done.as_mut() {
            callback(EdgeBuildStatus {
                floor_index,
                floor_id: floor_id.clone(),
                edge_count: floor_edges,
            });
        }
    }

    Ok(edges)
}

/// Enumerate neighbor candidates for one node, oversampled and sorted by
/// ascending degree-space distance.
fn select_candidates(
    graph: &Graph,
    floor_id: &str,
    a_id: &str,
    a_coords: [f64; 2],
    config: &EdgeBuildConfig,
) -> Vec<Candidate> {
    // Distance cap as a degree box: 1 degree of latitude is ~111,320m,
    // longitude shrinks with cos(lat).
    let dlat = config.max_distance_m / DEG_LAT_M;
    let dlng = config.max_distance_m / (DEG_LAT_M * a_coords[1].to_radians().cos().max(1e-6));
    let rect = [
        a_coords[0] - dlng,
        a_coords[1] - dlat,
        a_coords[0] + dlng,
        a_coords[1] + dlat,
    ];

    let oversample = config.max_neighbors.max(6 * config.max_neighbors);

    let raw: Vec<Candidate> = match graph.spatial_index(floor_id) {
        Some(index) => index
            .query_rect(&rect)
            .into_iter()
            .filter(|hit| hit.id != a_id)
            .map(|hit| Candidate {
                dist2: sq_deg_dist(a_coords, hit.coords),
                id: hit.id.clone(),
            })
            .collect(),
        // No index built: linear bbox filter over the floor.
        None => graph
            .nodes_on_floor(floor_id)
            .filter(|id| id.as_str() != a_id)
            .filter_map(|id| graph.node(id))
            .filter(|n| {
                n.coords[0] >= rect[0]
                    && n.coords[0] <= rect[2]
                    && n.coords[1] >= rect[1]
                    && n.coords[1] <= rect[3]
            })
            .map(|n| Candidate {
                dist2: sq_deg_dist(a_coords, n.coords),
                id: n.id.clone(),
            })
            .collect(),
    };

    let mut selected: Vec<Candidate> = if raw.len() > oversample {
        // Bounded-heap selection of the `oversample` nearest.
        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(oversample + 1);
        for candidate in raw {
            heap.push(candidate);
            if heap.len() > oversample {
                heap.pop();
            }
        }
        heap.into_vec()
    } else {
        raw
    };

    selected.sort();
    selected
}

fn sq_deg_dist(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}
