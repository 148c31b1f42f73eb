//! Top-level pathfinding engine.
//!
//! Owns the initialization pipeline (obstacles, nodes, spatial indexes,
//! visibility edges or their cached form, cross-floor connectors, room and
//! door tagging) and the route query protocol with its layered endpoint
//! fallbacks. Multiple engines may coexist; there is no global state.
//!
//! After initialization the graph, collision model, and room indexes are
//! immutable, so concurrent queries need no locking. The bounded path cache
//! is the only mutable query-path state.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;
use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::astar::{self, PathSegment, SearchOptions, SearchResult};
use crate::collision::CollisionDetector;
use crate::config::{EdgeBuildConfig, EngineConfig, RuntimeFlags};
use crate::connections::apply_connections;
use crate::edge_builder::{build_visibility_edges, EdgeBuildStatus};
use crate::edge_cache::{edge_cache_key, EdgeRecord, EdgeRecordMeta, EdgeStore};
use crate::error::{Endpoint, InitError, RouteError};
use crate::geom::{self, Coord};
use crate::graph::{Edge, EdgeType, Graph, Node, NodeType};
use crate::mvf::{Feature, MapBundle};
use crate::rooms::RoomDoorModel;

static NEVER_CANCELLED: AtomicBool = AtomicBool::new(false);

/// How freely a route may traverse rooms it does not start or end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoomTraversalMode {
    /// Endpoint rooms plus rooms classified public.
    #[default]
    Public,
    /// Endpoint rooms only.
    Strict,
    /// No room constraints.
    All,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteOptions {
    pub accessible_only: bool,
    pub avoid_stairs: bool,
    pub allow_locked_doors: bool,
    #[serde(default)]
    pub room_traversal: RoomTraversalMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequest {
    pub start: Coord,
    pub end: Coord,
    pub start_floor: String,
    pub end_floor: String,
    #[serde(default)]
    pub options: RouteOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteMeta {
    /// Distance inside the graph, excluding user-endpoint connectors.
    pub indoor_distance_m: f64,
    pub start_connector_m: f64,
    pub end_connector_m: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Display polyline, including the user endpoints when their connectors
    /// are clear.
    pub path: Vec<Coord>,
    pub node_ids: Vec<String>,
    /// One floor id per path coordinate.
    pub floors: Vec<String>,
    pub segments: Vec<PathSegment>,
    /// Geodesic length of `path`.
    pub distance_m: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_node: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub meta: RouteMeta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub room_count: usize,
    pub door_count: usize,
    pub floor_count: usize,
    pub edges_from_cache: bool,
}

/// A graph node anchoring a user endpoint, with its connector distance.
#[derive(Debug, Clone)]
struct Anchor {
    id: String,
    coords: Coord,
    distance_m: f64,
}

struct CachedRoute {
    route: Route,
    last_used: Instant,
}

pub struct PathfindingEngine {
    config: EngineConfig,
    graph: Graph,
    collision: CollisionDetector,
    rooms: RoomDoorModel,
    initialized: bool,
    path_cache: DashMap<String, CachedRoute>,
    last_error: Mutex<Option<RouteError>>,
}

impl PathfindingEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            graph: Graph::new(),
            collision: CollisionDetector::default(),
            rooms: RoomDoorModel::default(),
            initialized: false,
            path_cache: DashMap::new(),
            last_error: Mutex::new(None),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn collision(&self) -> &CollisionDetector {
        &self.collision
    }

    pub fn rooms(&self) -> &RoomDoorModel {
        &self.rooms
    }

    /// The failure reason of the most recent unsuccessful query.
    pub fn get_last_route_error(&self) -> Option<RouteError> {
        self.last_error.lock().ok().and_then(|slot| slot.clone())
    }

    /// Snapshot of the walkable visibility edges as cacheable triples.
    pub fn visibility_edge_triples(&self) -> Vec<(String, String, f64)> {
        let mut triples: Vec<(String, String, f64)> = self
            .graph
            .all_edges()
            .filter(|e| e.edge_type == EdgeType::Walkable)
            .map(|e| (e.from.clone(), e.to.clone(), e.weight_m))
            .collect();
        triples.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        triples
    }

    /// Build the full routing state from the input bundle.
    ///
    /// Stage order: obstacles, nodes, spatial indexes, visibility edges
    /// (from the store when a fresh record exists), cross-floor connectors,
    /// room/door tagging. Cancellation at any yield point discards partial
    /// state and leaves the engine uninitialized. Store failures are logged
    /// and treated as misses; they never abort initialization.
    pub async fn initialize(
        &mut self,
        bundle: &MapBundle,
        store: Option<&dyn EdgeStore>,
        flags: RuntimeFlags,
        cancel: Option<&AtomicBool>,
        mut on_floor_done: Option<&mut dyn FnMut(EdgeBuildStatus)>,
    ) -> Result<InitStats, InitError> {
        let cancel = cancel.unwrap_or(&NEVER_CANCELLED);
        self.initialized = false;
        self.path_cache.clear();

        // Let previously queued work drain before the heavy build starts.
        tokio::task::yield_now().await;
        check_cancel(cancel)?;

        // Obstacles and rooms from the classified source geometry.
        let mut collision =
            CollisionDetector::new(self.config.wall_buffer_m, self.config.door_clearance_m);
        collision.build(&bundle.geometry, &bundle.nonwalkable_set, &bundle.kinds);

        let mut rooms = RoomDoorModel::new(self.config.room_buffer_m);
        rooms.build_rooms(&bundle.geometry.features, &bundle.kinds);

        // Nodes: walkable samples, connectors, entrances, then doors.
        let mut graph = Graph::new();
        insert_sample_nodes(&mut graph, &bundle.walkable_nodes.features, NodeType::Walkable);
        insert_sample_nodes(&mut graph, &bundle.stairs_nodes.features, NodeType::Stairs);
        insert_sample_nodes(&mut graph, &bundle.elevator_nodes.features, NodeType::Elevator);
        if let Some(entrances) = &bundle.entrance_nodes {
            insert_sample_nodes(&mut graph, &entrances.features, NodeType::Entrance);
        }

        let features_by_id: HashMap<String, &Feature> = bundle
            .geometry
            .features
            .iter()
            .filter(|f| !f.properties.id.is_empty())
            .map(|f| (f.properties.id.clone(), f))
            .collect();

        let (door_nodes, door_features) = RoomDoorModel::build_door_nodes(
            &bundle.connections,
            &features_by_id,
            &bundle.navigation_flags,
        );
        let door_count = door_nodes.len();
        for node in door_nodes {
            graph.insert_node(node);
        }
        // Door segments participate in line-of-sight as wall-crossing
        // permissions, so they must be registered before the edge build.
        for (floor_id, geometry) in door_features {
            collision.add_door_feature(floor_id, geometry);
        }

        check_cancel(cancel)?;
        graph.build_spatial_indexes();

        // Visibility edges: cache read, else build and write back.
        let build_config = if graph.node_count() > 8000 {
            EdgeBuildConfig::for_node_count(graph.node_count())
        } else {
            self.config.edge_build
        };
        let cache_key = edge_cache_key(
            &bundle.map_id,
            &bundle.map_time,
            build_config.max_distance_m,
            build_config.max_neighbors,
        );

        let mut edges_from_cache = false;
        let mut cached_edges: Option<Vec<(String, String, f64)>> = None;
        if let Some(store) = store {
            if !flags.rebuild_graph && !flags.no_graph_cache {
                tokio::task::yield_now().await;
                check_cancel(cancel)?;
                match store.get(&cache_key) {
                    Ok(Some(record)) => {
                        info!(key = %cache_key, edges = record.edges.len(), "visibility edges loaded from cache");
                        cached_edges = Some(record.edges);
                    }
                    Ok(None) => {}
                    Err(err) => warn!(error = %err, "edge cache read failed, rebuilding"),
                }
            }
        }

        match cached_edges {
            Some(triples) => {
                edges_from_cache = true;
                for (from, to, weight_m) in triples {
                    let applied = graph.add_edge(Edge {
                        from,
                        to,
                        weight_m,
                        edge_type: EdgeType::Walkable,
                        accessible: true,
                    });
                    if !applied {
                        debug!("skipping cached edge with unresolved endpoint");
                    }
                }
            }
            None => {
                let edges = build_visibility_edges(
                    &graph,
                    &collision,
                    &build_config,
                    cancel,
                    on_floor_done.take(),
                )
                .await?;

                if let Some(store) = store {
                    if !flags.no_graph_cache {
                        let record = EdgeRecord {
                            edges: edges
                                .iter()
                                .map(|e| (e.from.clone(), e.to.clone(), e.weight_m))
                                .collect(),
                            meta: EdgeRecordMeta {
                                node_count: graph.node_count(),
                                floor_count: graph.floor_ids().count(),
                            },
                            created_at: chrono::Utc::now(),
                        };
                        tokio::task::yield_now().await;
                        // Fire-and-forget: a failed write only costs the next
                        // initialization a rebuild.
                        if let Err(err) = store.put(&cache_key, record) {
                            warn!(error = %err, "edge cache write failed");
                        }
                    }
                }

                for edge in edges {
                    graph.add_edge(edge);
                }
            }
        }

        check_cancel(cancel)?;

        // Cross-floor connectors, then the room/door passes.
        apply_connections(
            &mut graph,
            &bundle.connections,
            &features_by_id,
            self.config.vertical_travel_m,
        );

        rooms.index_doors(&mut graph);
        rooms.compute_meta(&graph);
        rooms.tag_nodes_with_rooms(&mut graph);
        rooms.connect_orphan_doors(&mut graph, &collision, self.config.orphan_door_link_m);

        check_cancel(cancel)?;

        let stats = InitStats {
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
            room_count: rooms.room_count(),
            door_count,
            floor_count: graph.floor_ids().count(),
            edges_from_cache,
        };
        info!(
            nodes = stats.node_count,
            edges = stats.edge_count,
            rooms = stats.room_count,
            doors = stats.door_count,
            from_cache = stats.edges_from_cache,
            "engine initialized"
        );

        self.graph = graph;
        self.collision = collision;
        self.rooms = rooms;
        self.initialized = true;
        Ok(stats)
    }

    /// Compute a route between two points, possibly on different floors.
    pub fn find_route(&self, request: &RouteRequest) -> Result<Route, RouteError> {
        if !self.initialized {
            return Err(self.fail(RouteError::NotInitialized));
        }

        let cache_key = self.route_cache_key(request);
        if let Some(mut hit) = self.path_cache.get_mut(&cache_key) {
            hit.last_used = Instant::now();
            let route = hit.route.clone();
            drop(hit);
            if let Ok(mut slot) = self.last_error.lock() {
                *slot = None;
            }
            return Ok(route);
        }

        let route = self.compute_route(request)?;

        self.path_cache.insert(
            cache_key,
            CachedRoute {
                route: route.clone(),
                last_used: Instant::now(),
            },
        );
        self.prune_path_cache();
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = None;
        }
        Ok(route)
    }

    fn compute_route(&self, request: &RouteRequest) -> Result<Route, RouteError> {
        let options = &request.options;
        let start_room = self
            .rooms
            .room_at(request.start, &request.start_floor)
            .map(|room| room.geometry_id.clone());
        let end_room = self
            .rooms
            .room_at(request.end, &request.end_floor)
            .map(|room| room.geometry_id.clone());

        // Same room, clear line: a trivial two-point route.
        if request.start_floor == request.end_floor
            && start_room.is_some()
            && start_room == end_room
            && self
                .collision
                .is_path_clear(request.start, request.end, &request.start_floor)
        {
            return Ok(trivial_route(request));
        }

        let start_private = start_room
            .as_deref()
            .map_or(false, |room| !self.rooms.is_room_public(room, &self.config));
        let end_private = end_room
            .as_deref()
            .map_or(false, |room| !self.rooms.is_room_public(room, &self.config));

        let start_anchors = self.endpoint_anchors(
            request.start,
            &request.start_floor,
            start_room.as_deref(),
            start_private,
            options,
            Endpoint::Start,
        )?;
        let end_anchors = self.endpoint_anchors(
            request.end,
            &request.end_floor,
            end_room.as_deref(),
            end_private,
            options,
            Endpoint::End,
        )?;

        let allow_locked = options.allow_locked_doors;
        let door_filter = move |n: &Node| allow_locked || !(n.metadata.is_door && n.metadata.is_locked);

        let allowed_rooms = self.allowed_rooms(options, &start_room, &end_room);
        let constrained = allowed_rooms.is_some();
        let search_options = SearchOptions {
            accessible_only: options.accessible_only,
            avoid_stairs: options.avoid_stairs,
            heuristic_weight: self.config.heuristic_weight,
            floor_change_penalty_m: self.config.floor_change_penalty_m,
            allowed_room_ids: allowed_rooms,
            disallow_other_rooms: constrained,
            node_filter: Some(&door_filter),
        };

        let mut best = self.best_pair(&start_anchors, &end_anchors, &search_options);
        if best.is_none() && constrained {
            // Constraints made the graph unroutable; retry unconstrained.
            debug!("room constraints removed after exhausted candidate pairs");
            let relaxed = SearchOptions {
                allowed_room_ids: None,
                disallow_other_rooms: false,
                ..search_options
            };
            best = self.best_pair(&start_anchors, &end_anchors, &relaxed);
        }

        let Some((result, start_anchor, end_anchor)) = best else {
            return Err(self.fail(RouteError::NoPath));
        };

        Ok(self.assemble_route(request, result, start_anchor, end_anchor))
    }

    /// Candidate anchor nodes for one endpoint, with the §4.8 fallback
    /// ladder applied to connector clearance.
    fn endpoint_anchors(
        &self,
        point: Coord,
        floor_id: &str,
        room: Option<&str>,
        room_is_private: bool,
        options: &RouteOptions,
        endpoint: Endpoint,
    ) -> Result<Vec<Anchor>, RouteError> {
        let walkable = |n: &Node| {
            matches!(
                n.node_type,
                NodeType::Walkable | NodeType::Entrance | NodeType::Waypoint
            )
        };

        let mut candidates: Vec<Anchor> = self
            .graph
            .nodes_near(point, floor_id, self.config.nearby_search_radius_deg, 3, walkable)
            .into_iter()
            .map(|(n, d)| Anchor {
                id: n.id.clone(),
                coords: n.coords,
                distance_m: d,
            })
            .collect();

        // Private rooms route through their doors.
        if let Some(room_id) = room {
            if room_is_private {
                let doors = self.rooms.doors_of_room(room_id);
                let usable: Vec<Anchor> = doors
                    .iter()
                    .filter_map(|id| self.graph.node(id))
                    .filter(|n| options.allow_locked_doors || !n.metadata.is_locked)
                    .map(|n| Anchor {
                        id: n.id.clone(),
                        coords: n.coords,
                        distance_m: geom::distance_m(point, n.coords),
                    })
                    .collect();
                if !doors.is_empty() && usable.is_empty() {
                    return Err(self.fail(RouteError::NoDoor {
                        room_id: room_id.to_string(),
                    }));
                }
                candidates.extend(usable);
            }
        }

        // Layer 1: strict clearance.
        let strict: Vec<Anchor> = candidates
            .iter()
            .filter(|c| self.collision.is_path_clear(point, c.coords, floor_id))
            .cloned()
            .collect();
        if !strict.is_empty() {
            return Ok(strict);
        }

        // Layer 2: relaxed clearance.
        let relaxed: Vec<Anchor> = candidates
            .iter()
            .filter(|c| self.collision.is_path_clear_relaxed(point, c.coords, floor_id))
            .cloned()
            .collect();
        if !relaxed.is_empty() {
            return Ok(relaxed);
        }

        // Layer 3: inside a room, its doors pass without clearance checks.
        if let Some(room_id) = room {
            let doors: Vec<Anchor> = self
                .rooms
                .doors_of_room(room_id)
                .iter()
                .filter_map(|id| self.graph.node(id))
                .filter(|n| options.allow_locked_doors || !n.metadata.is_locked)
                .map(|n| Anchor {
                    id: n.id.clone(),
                    coords: n.coords,
                    distance_m: geom::distance_m(point, n.coords),
                })
                .collect();
            if !doors.is_empty() {
                return Ok(doors);
            }
        }

        // Layer 4: widening-radius sweep, relaxed clearance.
        let nearby: Vec<Anchor> = self
            .graph
            .nodes_near(
                point,
                floor_id,
                self.config.nearby_search_radius_deg,
                self.config.nearby_node_limit,
                walkable,
            )
            .into_iter()
            .filter(|(n, _)| self.collision.is_path_clear_relaxed(point, n.coords, floor_id))
            .map(|(n, d)| Anchor {
                id: n.id.clone(),
                coords: n.coords,
                distance_m: d,
            })
            .collect();
        if !nearby.is_empty() {
            return Ok(nearby);
        }

        // Layer 5: trust the graph; the single nearest node, no clearance.
        if let Some((node, distance)) = self.graph.nearest_node_where(
            point,
            floor_id,
            self.config.nearby_search_radius_deg / 8.0,
            self.config.nearby_search_radius_deg,
            |_| true,
        ) {
            return Ok(vec![Anchor {
                id: node.id.clone(),
                coords: node.coords,
                distance_m: distance,
            }]);
        }

        Err(self.fail(RouteError::Blocked { endpoint }))
    }

    fn allowed_rooms(
        &self,
        options: &RouteOptions,
        start_room: &Option<String>,
        end_room: &Option<String>,
    ) -> Option<BTreeSet<String>> {
        let endpoint_rooms = start_room.iter().chain(end_room.iter()).cloned();
        match options.room_traversal {
            RoomTraversalMode::All => None,
            RoomTraversalMode::Strict => Some(endpoint_rooms.collect()),
            RoomTraversalMode::Public => {
                let mut allowed: BTreeSet<String> = endpoint_rooms.collect();
                allowed.extend(
                    self.rooms
                        .room_ids()
                        .filter(|id| self.rooms.is_room_public(id, &self.config))
                        .cloned(),
                );
                Some(allowed)
            }
        }
    }

    /// Run A* over every candidate pair, keeping the minimum of
    /// `indoor + start connector + end connector`.
    fn best_pair<'a>(
        &self,
        start_anchors: &'a [Anchor],
        end_anchors: &'a [Anchor],
        options: &SearchOptions,
    ) -> Option<(SearchResult, &'a Anchor, &'a Anchor)> {
        let mut best: Option<(SearchResult, &Anchor, &Anchor, f64)> = None;
        for start in start_anchors {
            for end in end_anchors {
                let Some(result) = astar::find_path(&self.graph, &start.id, &end.id, options)
                else {
                    continue;
                };
                let total = result.distance_m + start.distance_m + end.distance_m;
                if best.as_ref().map_or(true, |(_, _, _, b)| total < *b) {
                    best = Some((result, start, end, total));
                }
            }
        }
        best.map(|(result, s, e, _)| (result, s, e))
    }

    fn assemble_route(
        &self,
        request: &RouteRequest,
        result: SearchResult,
        start_anchor: &Anchor,
        end_anchor: &Anchor,
    ) -> Route {
        let mut path = result.coords.clone();
        let mut floors = result.floors.clone();
        let mut ids: Vec<String> = result.node_ids.clone();
        let mut warnings = Vec::new();

        // Defaulting convention for any gap between the stitched path and
        // the floor sequence: middle entries take the start-side floor.
        while floors.len() < path.len() {
            let insert_at = floors.len().saturating_sub(1).max(1).min(floors.len());
            floors.insert(insert_at, request.start_floor.clone());
        }

        let start_clear =
            self.collision
                .is_path_clear(request.start, start_anchor.coords, &request.start_floor);
        if start_clear {
            path.insert(0, request.start);
            floors.insert(0, request.start_floor.clone());
            ids.insert(0, String::new());
        } else {
            warnings.push(format!(
                "start connector is blocked; route begins at node {}",
                start_anchor.id
            ));
        }

        let end_clear =
            self.collision
                .is_path_clear(request.end, end_anchor.coords, &request.end_floor);
        if end_clear {
            path.push(request.end);
            floors.push(request.end_floor.clone());
            ids.push(String::new());
        } else {
            warnings.push(format!(
                "end connector is blocked; route ends at node {}",
                end_anchor.id
            ));
        }

        // Segments and total distance, recomputed geodesically along the
        // final polyline so the route is self-consistent.
        let mut segments = Vec::with_capacity(path.len().saturating_sub(1));
        let mut distance_m = 0.0;
        for i in 0..path.len().saturating_sub(1) {
            let d = geom::distance_m(path[i], path[i + 1]);
            distance_m += d;
            segments.push(PathSegment {
                from: ids.get(i).cloned().unwrap_or_default(),
                to: ids.get(i + 1).cloned().unwrap_or_default(),
                from_coords: path[i],
                to_coords: path[i + 1],
                distance_m: d,
                from_floor: floors[i].clone(),
                to_floor: floors[i + 1].clone(),
                floor_change: floors[i] != floors[i + 1],
            });
        }

        Route {
            path,
            node_ids: result.node_ids,
            floors,
            segments,
            distance_m,
            start_node: Some(start_anchor.id.clone()),
            end_node: Some(end_anchor.id.clone()),
            warnings,
            meta: RouteMeta {
                indoor_distance_m: result.distance_m,
                start_connector_m: if start_clear { start_anchor.distance_m } else { 0.0 },
                end_connector_m: if end_clear { end_anchor.distance_m } else { 0.0 },
            },
        }
    }

    fn route_cache_key(&self, request: &RouteRequest) -> String {
        // ~1m rounding: 1e-5 degrees of latitude is about 1.1m.
        let q = |v: f64| (v * 1e5).round() as i64;
        format!(
            "{},{}|{},{}|{}|{}|acc={}|mode={:?}|p={}|a={}",
            q(request.start[0]),
            q(request.start[1]),
            q(request.end[0]),
            q(request.end[1]),
            request.start_floor,
            request.end_floor,
            request.options.accessible_only,
            request.options.room_traversal,
            self.config.public_room_door_count,
            self.config.public_room_area_m2,
        )
    }

    /// Evict least-recently-used cache entries above capacity.
    fn prune_path_cache(&self) {
        let capacity = self.config.path_cache_capacity;
        if self.path_cache.len() <= capacity {
            return;
        }
        let mut entries: Vec<(String, Instant)> = self
            .path_cache
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().last_used))
            .collect();
        entries.sort_by_key(|(_, last_used)| *last_used);
        for (key, _) in entries {
            if self.path_cache.len() <= capacity {
                break;
            }
            self.path_cache.remove(&key);
        }
    }

    fn fail(&self, error: RouteError) -> RouteError {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = Some(error.clone());
        }
        error
    }
}

fn check_cancel(cancel: &AtomicBool) -> Result<(), InitError> {
    if cancel.load(std::sync::atomic::Ordering::Relaxed) {
        Err(InitError::Cancelled)
    } else {
        Ok(())
    }
}

/// Two-point route for endpoints in the same room with a clear line.
fn trivial_route(request: &RouteRequest) -> Route {
    let distance_m = geom::distance_m(request.start, request.end);
    Route {
        path: vec![request.start, request.end],
        node_ids: Vec::new(),
        floors: vec![request.start_floor.clone(), request.end_floor.clone()],
        segments: vec![PathSegment {
            from: String::new(),
            to: String::new(),
            from_coords: request.start,
            to_coords: request.end,
            distance_m,
            from_floor: request.start_floor.clone(),
            to_floor: request.end_floor.clone(),
            floor_change: false,
        }],
        distance_m,
        start_node: None,
        end_node: None,
        warnings: Vec::new(),
        meta: RouteMeta {
            indoor_distance_m: 0.0,
            start_connector_m: 0.0,
            end_connector_m: 0.0,
        },
    }
}

/// Insert sample nodes from a normalized feature collection. Malformed
/// features are logged and skipped.
fn insert_sample_nodes(graph: &mut Graph, features: &[Feature], node_type: NodeType) {
    for feature in features {
        if !feature.is_normalized() {
            warn!("skipping sample node without id or floor");
            continue;
        }
        let Some(coords) = feature.geometry.center() else {
            warn!(id = %feature.properties.id, "skipping sample node without position");
            continue;
        };
        let mut node = Node::walkable(
            feature.properties.id.clone(),
            coords,
            feature.properties.floor_id.clone(),
        );
        node.node_type = node_type;
        match node_type {
            NodeType::Stairs => {
                node.metadata.is_stairs = true;
                node.metadata.accessible = false;
            }
            NodeType::Elevator => node.metadata.is_elevator = true,
            _ => {}
        }
        node.metadata.geometry_ids = feature.properties.geometry_ids.iter().cloned().collect();
        graph.insert_node(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::DEG_LAT_M;
    use crate::mvf::{
        Connection, ConnectionEntrance, ConnectionType, FeatureProperties, Geometry,
        NavigationFlags,
    };

    const F0: &str = "floor0";

    fn m(v: f64) -> f64 {
        v / DEG_LAT_M
    }

    fn point_feature(id: &str, floor: &str, x: f64, y: f64) -> Feature {
        Feature {
            properties: FeatureProperties {
                id: id.into(),
                floor_id: floor.into(),
                ..FeatureProperties::default()
            },
            geometry: Geometry::Point {
                coordinates: [m(x), m(y)],
            },
        }
    }

    /// A 10x4m corridor with walkable samples every 2m along y=1.
    fn corridor_bundle() -> MapBundle {
        let mut bundle = MapBundle {
            map_id: "test-map".into(),
            map_time: "t1".into(),
            ..MapBundle::default()
        };
        for i in 0..6 {
            bundle
                .walkable_nodes
                .features
                .push(point_feature(&format!("w{i}"), F0, i as f64 * 2.0, 1.0));
        }
        bundle
    }

    #[tokio::test]
    async fn test_query_before_initialize_fails_fast() {
        let engine = PathfindingEngine::new(EngineConfig::default());
        let request = RouteRequest {
            start: [0.0, 0.0],
            end: [m(10.0), 0.0],
            start_floor: F0.into(),
            end_floor: F0.into(),
            options: RouteOptions::default(),
        };
        let err = engine.find_route(&request).unwrap_err();
        assert_eq!(err.code(), "not-initialized");
        assert_eq!(engine.get_last_route_error(), Some(err));
    }

    #[tokio::test]
    async fn test_initialize_and_route_corridor() {
        let mut engine = PathfindingEngine::new(EngineConfig::default());
        let stats = engine
            .initialize(&corridor_bundle(), None, RuntimeFlags::default(), None, None)
            .await
            .unwrap();
        assert_eq!(stats.node_count, 6);
        assert!(stats.edge_count > 0);
        assert!(!stats.edges_from_cache);

        let request = RouteRequest {
            start: [m(0.5), m(1.0)],
            end: [m(9.5), m(1.0)],
            start_floor: F0.into(),
            end_floor: F0.into(),
            options: RouteOptions::default(),
        };
        let route = engine.find_route(&request).unwrap();
        assert!((route.distance_m - 9.0).abs() < 0.5);
        assert_eq!(route.path.len(), route.floors.len());
        assert!(route.floors.iter().all(|f| f == F0));
        assert!(route.warnings.is_empty());

        // Distance equals the geodesic sum along the polyline.
        let polyline: f64 = route
            .path
            .windows(2)
            .map(|w| geom::distance_m(w[0], w[1]))
            .sum();
        assert!((route.distance_m - polyline).abs() <= 1e-6 * polyline.max(1.0));
        // ... and the segment sum.
        let seg_sum: f64 = route.segments.iter().map(|s| s.distance_m).sum();
        assert!((route.distance_m - seg_sum).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_identical_queries_hit_cache() {
        let mut engine = PathfindingEngine::new(EngineConfig::default());
        engine
            .initialize(&corridor_bundle(), None, RuntimeFlags::default(), None, None)
            .await
            .unwrap();
        let request = RouteRequest {
            start: [m(0.5), m(1.0)],
            end: [m(9.5), m(1.0)],
            start_floor: F0.into(),
            end_floor: F0.into(),
            options: RouteOptions::default(),
        };
        let first = engine.find_route(&request).unwrap();
        let second = engine.find_route(&request).unwrap();
        assert_eq!(first.path, second.path);
        assert_eq!(first.node_ids, second.node_ids);
    }

    #[tokio::test]
    async fn test_cancellation_leaves_engine_uninitialized() {
        let mut engine = PathfindingEngine::new(EngineConfig::default());
        let cancel = AtomicBool::new(true);
        let result = engine
            .initialize(
                &corridor_bundle(),
                None,
                RuntimeFlags::default(),
                Some(&cancel),
                None,
            )
            .await;
        assert_eq!(result.unwrap_err(), InitError::Cancelled);
        assert!(!engine.is_initialized());
    }

    #[tokio::test]
    async fn test_same_room_trivial_route() {
        let mut bundle = corridor_bundle();
        // One big room over the corridor.
        bundle.geometry.features.push(Feature {
            properties: FeatureProperties {
                id: "room1".into(),
                floor_id: F0.into(),
                ..FeatureProperties::default()
            },
            geometry: Geometry::Polygon {
                coordinates: vec![vec![
                    [m(0.0), m(0.0)],
                    [m(10.0), m(0.0)],
                    [m(10.0), m(4.0)],
                    [m(0.0), m(4.0)],
                    [m(0.0), m(0.0)],
                ]],
            },
        });
        bundle.kinds.insert("room1".into(), "room".into());

        let mut engine = PathfindingEngine::new(EngineConfig::default());
        engine
            .initialize(&bundle, None, RuntimeFlags::default(), None, None)
            .await
            .unwrap();

        let request = RouteRequest {
            start: [m(1.0), m(2.0)],
            end: [m(8.0), m(2.0)],
            start_floor: F0.into(),
            end_floor: F0.into(),
            options: RouteOptions::default(),
        };
        let route = engine.find_route(&request).unwrap();
        assert_eq!(route.path.len(), 2);
        assert!(route.node_ids.is_empty());
        assert!((route.distance_m - 7.0).abs() < 0.1);
    }

    #[tokio::test]
    async fn test_connection_door_creates_node_and_is_orphan_linked() {
        let mut bundle = corridor_bundle();
        bundle.geometry.features.push(Feature {
            properties: FeatureProperties {
                id: "d1".into(),
                floor_id: F0.into(),
                ..FeatureProperties::default()
            },
            geometry: Geometry::LineString {
                coordinates: vec![[m(4.0), m(0.8)], [m(4.0), m(1.2)]],
            },
        });
        bundle.connections.push(Connection {
            connection_type: ConnectionType::Door,
            entrances: vec![ConnectionEntrance {
                geometry_id: "d1".into(),
                floor_id: F0.into(),
                flags: 0,
            }],
        });
        bundle.navigation_flags = NavigationFlags::default();

        let mut engine = PathfindingEngine::new(EngineConfig::default());
        let stats = engine
            .initialize(&bundle, None, RuntimeFlags::default(), None, None)
            .await
            .unwrap();
        assert_eq!(stats.door_count, 1);
        let door = engine.graph().node("door_d1").unwrap();
        assert!(door.metadata.is_door);
        // Orphan-door pass guarantees connectivity.
        assert!(engine.graph().degree("door_d1") > 0);
    }

    #[tokio::test]
    async fn test_empty_bundle_initializes_with_nothing() {
        let mut engine = PathfindingEngine::new(EngineConfig::default());
        let stats = engine
            .initialize(
                &MapBundle::default(),
                None,
                RuntimeFlags::default(),
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(stats.node_count, 0);
        assert_eq!(stats.edge_count, 0);
        assert!(engine.is_initialized());
    }
}
