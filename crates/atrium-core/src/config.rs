//! Engine configuration with conventional defaults.

use serde::{Deserialize, Serialize};

/// Knobs for the per-floor visibility-edge build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EdgeBuildConfig {
    /// Maximum edge length in meters.
    pub max_distance_m: f64,
    /// Edges accepted per node.
    pub max_neighbors: usize,
    /// Yield to the executor after this many nodes processed.
    pub yield_every: usize,
    /// ... or after this much wall-clock work since the last yield.
    pub yield_after_ms: u64,
}

impl Default for EdgeBuildConfig {
    fn default() -> Self {
        Self {
            max_distance_m: 15.0,
            max_neighbors: 8,
            yield_every: 50,
            yield_after_ms: 16,
        }
    }
}

impl EdgeBuildConfig {
    /// Defaults adjusted for graph size: large graphs get shorter edges,
    /// fewer neighbors, and more frequent yields.
    pub fn for_node_count(node_count: usize) -> Self {
        if node_count > 8000 {
            Self {
                max_distance_m: 8.0,
                max_neighbors: 6,
                yield_every: 10,
                yield_after_ms: 12,
            }
        } else {
            Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub edge_build: EdgeBuildConfig,

    /// Wall linestrings are buffered into obstacles by this much.
    pub wall_buffer_m: f64,
    /// Room polygons are buffered by this much for containment tests.
    pub room_buffer_m: f64,
    /// Wall crossings within this distance of a door segment are forgiven.
    pub door_clearance_m: f64,
    /// Per-type vertical-travel addend on cross-floor connector weights.
    pub vertical_travel_m: f64,
    /// Heuristic penalty for being on a different floor than the goal.
    pub floor_change_penalty_m: f64,
    /// Scalar on the A* heuristic; above 1.0 trades optimality for speed.
    pub heuristic_weight: f64,

    /// A room is public with at least this many public doors.
    pub public_room_door_count: usize,
    /// ... or at least this much floor area.
    pub public_room_area_m2: f64,

    /// Orphan doors link to the nearest node within this distance.
    pub orphan_door_link_m: f64,

    /// Widening-radius search span for off-graph endpoints, in degrees.
    pub nearby_search_radius_deg: f64,
    /// Candidate cap for the widening-radius search.
    pub nearby_node_limit: usize,

    /// Bounded LRU capacity for the query path cache.
    pub path_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            edge_build: EdgeBuildConfig::default(),
            wall_buffer_m: 0.5,
            room_buffer_m: 0.3,
            door_clearance_m: 0.6,
            vertical_travel_m: 5.0,
            floor_change_penalty_m: 10.0,
            heuristic_weight: 1.0,
            public_room_door_count: 2,
            public_room_area_m2: 80.0,
            orphan_door_link_m: 6.0,
            nearby_search_radius_deg: 0.002,
            nearby_node_limit: 10,
            path_cache_capacity: 100,
        }
    }
}

/// Flags recognized by the controller wrapping the engine.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RuntimeFlags {
    /// Skip the visibility-edge cache read and rebuild from scratch.
    pub rebuild_graph: bool,
    /// Skip both the cache read and the write.
    pub no_graph_cache: bool,
}
