//! Rooms and doors as routing constraints.
//!
//! Rooms are buffered polygons indexed per floor; a point is "in" a room iff
//! it lies in the buffered polygon, which tolerates numeric slop along room
//! boundaries. Doors are synthesized graph nodes derived from the
//! connections table, indexed against the rooms that contain them. Room
//! metadata (area, door counts) drives the public/private classification
//! that decides whether an endpoint must be anchored through a door.

use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::collision::CollisionDetector;
use crate::config::EngineConfig;
use crate::geom::{self, Coord, DEG_LAT_M};
use crate::graph::{EdgeType, Graph, Node, NodeType};
use crate::mvf::{Connection, ConnectionType, Feature, Geometry, NavigationFlags};

#[derive(Debug, Clone)]
pub struct Room {
    pub geometry_id: String,
    pub floor_id: String,
    pub feature: Geometry,
    /// Outward-buffered containment polygon.
    pub buffered: Geometry,
    /// Hull of the buffered polygon.
    pub bbox: [f64; 4],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RoomMeta {
    pub area_m2: f64,
    pub door_count: usize,
    pub public_door_count: usize,
}

#[derive(Debug, Default)]
pub struct RoomDoorModel {
    rooms: HashMap<String, Room>,
    rooms_by_floor: HashMap<String, Vec<String>>,
    doors_by_room: HashMap<String, Vec<String>>,
    meta: HashMap<String, RoomMeta>,
    room_buffer_m: f64,
}

impl RoomDoorModel {
    pub fn new(room_buffer_m: f64) -> Self {
        Self {
            room_buffer_m,
            ..Self::default()
        }
    }

    /// Index every polygonal feature classified as a room.
    pub fn build_rooms(&mut self, features: &[Feature], kinds: &HashMap<String, String>) {
        for feature in features {
            let id = &feature.properties.id;
            if kinds.get(id).map(String::as_str) != Some("room") {
                continue;
            }
            if !feature.geometry.is_polygonal() {
                continue;
            }
            let Some(buffered) = geom::buffer(&feature.geometry, self.room_buffer_m) else {
                debug!(geometry_id = %id, "dropping room with degenerate geometry");
                continue;
            };
            let bbox = geom::bbox(&buffered);
            let room = Room {
                geometry_id: id.clone(),
                floor_id: feature.properties.floor_id.clone(),
                feature: feature.geometry.clone(),
                buffered,
                bbox,
            };
            self.rooms_by_floor
                .entry(room.floor_id.clone())
                .or_default()
                .push(id.clone());
            self.rooms.insert(id.clone(), room);
        }
        for ids in self.rooms_by_floor.values_mut() {
            ids.sort();
        }
    }

    pub fn room(&self, geometry_id: &str) -> Option<&Room> {
        self.rooms.get(geometry_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn room_ids(&self) -> impl Iterator<Item = &String> {
        self.rooms.keys()
    }

    pub fn meta(&self, geometry_id: &str) -> Option<&RoomMeta> {
        self.meta.get(geometry_id)
    }

    pub fn doors_of_room(&self, geometry_id: &str) -> &[String] {
        self.doors_by_room
            .get(geometry_id)
            .map_or(&[], Vec::as_slice)
    }

    /// Rooms on a floor whose buffered polygon contains `p`.
    pub fn rooms_at(&self, p: Coord, floor_id: &str) -> Vec<&Room> {
        self.rooms_by_floor
            .get(floor_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.rooms.get(id))
            .filter(|room| {
                p[0] >= room.bbox[0]
                    && p[0] <= room.bbox[2]
                    && p[1] >= room.bbox[1]
                    && p[1] <= room.bbox[3]
                    && geom::point_in_polygon(p, &room.buffered)
            })
            .collect()
    }

    /// First room containing `p`, if any.
    pub fn room_at(&self, p: Coord, floor_id: &str) -> Option<&Room> {
        self.rooms_at(p, floor_id).into_iter().next()
    }

    /// Public rooms are freely traversable; private rooms require door
    /// anchoring.
    pub fn is_room_public(&self, geometry_id: &str, config: &EngineConfig) -> bool {
        let Some(meta) = self.meta.get(geometry_id) else {
            return false;
        };
        let p = config.public_room_door_count;
        meta.public_door_count >= p
            || meta.door_count >= p.max(2)
            || meta.area_m2 >= config.public_room_area_m2
    }

    /// Synthesize door nodes from door-type connection entries.
    ///
    /// Each distinct entrance geometry id yields one node with OR-merged
    /// flags, positioned at the feature center. Entrances referencing
    /// unknown geometry are skipped. Returns the nodes together with the
    /// linear door features to register with the collision detector.
    pub fn build_door_nodes<'a>(
        connections: &[Connection],
        features_by_id: &HashMap<String, &'a Feature>,
        navigation_flags: &NavigationFlags,
    ) -> (Vec<Node>, Vec<(&'a str, &'a Geometry)>) {
        // Merge flags per geometry id across all door connections.
        let mut merged: HashMap<String, (String, u64)> = HashMap::new();
        for connection in connections {
            if connection.connection_type != ConnectionType::Door {
                continue;
            }
            for entrance in &connection.entrances {
                let entry = merged
                    .entry(entrance.geometry_id.clone())
                    .or_insert_with(|| (entrance.floor_id.clone(), 0));
                entry.1 |= entrance.flags;
            }
        }

        let mut ids: Vec<&String> = merged.keys().collect();
        ids.sort();

        let mut nodes = Vec::with_capacity(ids.len());
        let mut door_features = Vec::new();
        for geometry_id in ids {
            let (floor_id, flags) = &merged[geometry_id];
            let Some(feature) = features_by_id.get(geometry_id) else {
                warn!(geometry_id = %geometry_id, "door references unknown geometry, skipping");
                continue;
            };
            let Some(coords) = feature.geometry.center() else {
                warn!(geometry_id = %geometry_id, "door geometry has no center, skipping");
                continue;
            };
            let is_public = navigation_flags.is_public(*flags);
            let mut node = Node::door(
                format!("door_{geometry_id}"),
                coords,
                floor_id.clone(),
                is_public,
                *flags,
            );
            node.metadata.geometry_ids.insert(geometry_id.clone());
            nodes.push(node);

            if feature.geometry.is_linear() {
                door_features.push((feature.properties.floor_id.as_str(), &feature.geometry));
            }
        }
        (nodes, door_features)
    }

    /// Assign `room_ids` to every door node and index doors under their
    /// rooms. Runs after door nodes are in the graph.
    pub fn index_doors(&mut self, graph: &mut Graph) {
        let door_ids: Vec<String> = graph
            .nodes()
            .filter(|n| n.node_type == NodeType::Door)
            .map(|n| n.id.clone())
            .collect();

        for door_id in door_ids {
            let Some(door) = graph.node(&door_id) else { continue };
            let room_ids: BTreeSet<String> = self
                .rooms_at(door.coords, &door.floor_id)
                .into_iter()
                .map(|room| room.geometry_id.clone())
                .collect();
            for room_id in &room_ids {
                self.doors_by_room
                    .entry(room_id.clone())
                    .or_default()
                    .push(door_id.clone());
            }
            if let Some(node) = graph.node_mut(&door_id) {
                node.metadata.room_ids = room_ids;
            }
        }
        for doors in self.doors_by_room.values_mut() {
            doors.sort();
            doors.dedup();
        }
    }

    /// Compute per-room metadata from room geometry and the door index.
    pub fn compute_meta(&mut self, graph: &Graph) {
        let mut meta = HashMap::with_capacity(self.rooms.len());
        for (id, room) in &self.rooms {
            let area_m2 = geom::area_m2(&room.feature);
            let doors = self.doors_by_room.get(id).map_or(&[][..], Vec::as_slice);
            let public_door_count = doors
                .iter()
                .filter_map(|door_id| graph.node(door_id))
                .filter(|door| door.metadata.is_public)
                .count();
            meta.insert(
                id.clone(),
                RoomMeta {
                    area_m2,
                    door_count: doors.len(),
                    public_door_count,
                },
            );
        }
        self.meta = meta;
    }

    /// Tag non-door nodes with the rooms containing them. Door assignments
    /// from [`Self::index_doors`] are left untouched.
    pub fn tag_nodes_with_rooms(&self, graph: &mut Graph) {
        let untagged: Vec<String> = graph
            .nodes()
            .filter(|n| n.node_type != NodeType::Door && n.metadata.room_ids.is_empty())
            .map(|n| n.id.clone())
            .collect();

        for node_id in untagged {
            let Some(node) = graph.node(&node_id) else { continue };
            let room_ids: BTreeSet<String> = self
                .rooms_at(node.coords, &node.floor_id)
                .into_iter()
                .map(|room| room.geometry_id.clone())
                .collect();
            if room_ids.is_empty() {
                continue; // public corridor
            }
            if let Some(node) = graph.node_mut(&node_id) {
                node.metadata.room_ids = room_ids;
            }
        }
    }

    /// Link any door left without edges after the visibility build to its
    /// nearest node within `max_link_m` on the same floor. Line-of-sight
    /// neighbors win; failing that the unconditional nearest is used, so a
    /// door is never isolated.
    pub fn connect_orphan_doors(
        &self,
        graph: &mut Graph,
        collision: &CollisionDetector,
        max_link_m: f64,
    ) {
        let orphans: Vec<String> = graph
            .nodes()
            .filter(|n| n.node_type == NodeType::Door && graph.degree(&n.id) == 0)
            .map(|n| n.id.clone())
            .collect();

        let radius_deg = max_link_m / DEG_LAT_M;
        for door_id in orphans {
            let Some(door) = graph.node(&door_id) else { continue };
            let (coords, floor_id) = (door.coords, door.floor_id.clone());

            let neighbors = graph.nodes_near(coords, &floor_id, radius_deg, usize::MAX, |n| {
                n.id != door_id
            });
            let within: Vec<(&str, Coord, f64)> = neighbors
                .into_iter()
                .filter(|(_, d)| *d <= max_link_m)
                .map(|(n, d)| (n.id.as_str(), n.coords, d))
                .collect();

            let target = within
                .iter()
                .find(|(_, n_coords, _)| collision.has_line_of_sight(coords, *n_coords, &floor_id))
                .or_else(|| within.first())
                .map(|(id, _, d)| (id.to_string(), *d));

            match target {
                Some((target_id, distance)) => {
                    graph.add_bidirectional(
                        &door_id,
                        &target_id,
                        distance,
                        EdgeType::DoorLink,
                        true,
                    );
                }
                None => debug!(door = %door_id, "no linkable node near orphan door"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvf::{ConnectionEntrance, FeatureProperties, FlagBit};

    const F0: &str = "floor0";

    fn m(v: f64) -> f64 {
        v / DEG_LAT_M
    }

    fn room_feature(id: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> Feature {
        Feature {
            properties: FeatureProperties {
                id: id.into(),
                floor_id: F0.into(),
                ..FeatureProperties::default()
            },
            geometry: Geometry::Polygon {
                coordinates: vec![vec![
                    [m(x0), m(y0)],
                    [m(x1), m(y0)],
                    [m(x1), m(y1)],
                    [m(x0), m(y1)],
                    [m(x0), m(y0)],
                ]],
            },
        }
    }

    fn room_kinds(ids: &[&str]) -> HashMap<String, String> {
        ids.iter()
            .map(|id| (id.to_string(), "room".to_string()))
            .collect()
    }

    #[test]
    fn test_rooms_at_uses_buffered_polygon() {
        let mut model = RoomDoorModel::new(0.3);
        model.build_rooms(&[room_feature("r1", 0.0, 0.0, 5.0, 5.0)], &room_kinds(&["r1"]));
        assert_eq!(model.room_count(), 1);

        assert_eq!(model.rooms_at([m(2.5), m(2.5)], F0).len(), 1);
        // 0.2m outside the boundary: tolerated by the 0.3m buffer.
        assert_eq!(model.rooms_at([m(5.2), m(2.5)], F0).len(), 1);
        // 1m outside: not in the room.
        assert!(model.rooms_at([m(6.0), m(2.5)], F0).is_empty());
        // Wrong floor.
        assert!(model.rooms_at([m(2.5), m(2.5)], "floor9").is_empty());
    }

    #[test]
    fn test_door_nodes_merge_flags_per_geometry() {
        let door_feature = Feature {
            properties: FeatureProperties {
                id: "d1".into(),
                floor_id: F0.into(),
                ..FeatureProperties::default()
            },
            geometry: Geometry::LineString {
                coordinates: vec![[m(5.0), m(2.0)], [m(5.0), m(3.0)]],
            },
        };
        let connections = vec![Connection {
            connection_type: ConnectionType::Door,
            entrances: vec![
                ConnectionEntrance {
                    geometry_id: "d1".into(),
                    floor_id: F0.into(),
                    flags: 0b001,
                },
                ConnectionEntrance {
                    geometry_id: "d1".into(),
                    floor_id: F0.into(),
                    flags: 0b100,
                },
            ],
        }];
        let features_by_id: HashMap<String, &Feature> =
            [("d1".to_string(), &door_feature)].into_iter().collect();
        let flags = NavigationFlags {
            public: Some(FlagBit { bit: 2 }),
        };

        let (nodes, door_features) =
            RoomDoorModel::build_door_nodes(&connections, &features_by_id, &flags);
        assert_eq!(nodes.len(), 1);
        let door = &nodes[0];
        assert_eq!(door.id, "door_d1");
        assert_eq!(door.metadata.flags, 0b101);
        assert!(door.metadata.is_public); // bit 2 set by the second entrance
        assert!(!door.metadata.is_locked);
        // Midpoint of the line.
        assert!((door.coords[1] - m(2.5)).abs() < 1e-12);
        assert_eq!(door_features.len(), 1);
    }

    #[test]
    fn test_door_without_public_bit_is_locked() {
        let door_feature = Feature {
            properties: FeatureProperties {
                id: "d2".into(),
                floor_id: F0.into(),
                ..FeatureProperties::default()
            },
            geometry: Geometry::Point {
                coordinates: [m(1.0), m(1.0)],
            },
        };
        let connections = vec![Connection {
            connection_type: ConnectionType::Door,
            entrances: vec![ConnectionEntrance {
                geometry_id: "d2".into(),
                floor_id: F0.into(),
                flags: 0,
            }],
        }];
        let features_by_id: HashMap<String, &Feature> =
            [("d2".to_string(), &door_feature)].into_iter().collect();
        let flags = NavigationFlags {
            public: Some(FlagBit { bit: 0 }),
        };
        let (nodes, _) = RoomDoorModel::build_door_nodes(&connections, &features_by_id, &flags);
        assert!(nodes[0].metadata.is_locked);
    }

    fn model_with_room_and_doors(door_positions: &[(&str, f64, f64, bool)]) -> (RoomDoorModel, Graph) {
        let mut model = RoomDoorModel::new(0.3);
        model.build_rooms(&[room_feature("r1", 0.0, 0.0, 5.0, 5.0)], &room_kinds(&["r1"]));

        let mut graph = Graph::new();
        for (id, x, y, public) in door_positions {
            graph.insert_node(Node::door(*id, [m(*x), m(*y)], F0, *public, 0));
        }
        graph.build_spatial_indexes();
        model.index_doors(&mut graph);
        model.compute_meta(&graph);
        (model, graph)
    }

    #[test]
    fn test_room_door_index_and_meta() {
        let (model, graph) = model_with_room_and_doors(&[
            ("door_a", 5.0, 2.5, true),
            ("door_b", 2.5, 5.0, false),
            ("door_far", 20.0, 20.0, true),
        ]);
        assert_eq!(model.doors_of_room("r1"), &["door_a", "door_b"]);
        let meta = model.meta("r1").unwrap();
        assert_eq!(meta.door_count, 2);
        assert_eq!(meta.public_door_count, 1);
        assert!((meta.area_m2 - 25.0).abs() < 1.0);

        // Doors got tagged with the room.
        assert!(graph
            .node("door_a")
            .unwrap()
            .metadata
            .room_ids
            .contains("r1"));
        assert!(graph.node("door_far").unwrap().metadata.room_ids.is_empty());
    }

    #[test]
    fn test_public_room_classification() {
        let config = EngineConfig::default();

        // Two doors: public by door count.
        let (model, _) =
            model_with_room_and_doors(&[("door_a", 5.0, 2.5, false), ("door_b", 2.5, 5.0, false)]);
        assert!(model.is_room_public("r1", &config));

        // One locked door, small area: private.
        let (model, _) = model_with_room_and_doors(&[("door_a", 5.0, 2.5, false)]);
        assert!(!model.is_room_public("r1", &config));

        // Large area is public regardless of doors.
        let mut model = RoomDoorModel::new(0.3);
        model.build_rooms(
            &[room_feature("hall", 0.0, 0.0, 10.0, 10.0)],
            &room_kinds(&["hall"]),
        );
        let graph = Graph::new();
        model.compute_meta(&graph);
        assert!(model.is_room_public("hall", &config));
    }

    #[test]
    fn test_tag_nodes_with_rooms_skips_corridor() {
        let (model, mut graph) = model_with_room_and_doors(&[("door_a", 5.0, 2.5, true)]);
        graph.insert_node(Node::walkable("inside", [m(2.0), m(2.0)], F0));
        graph.insert_node(Node::walkable("corridor", [m(8.0), m(8.0)], F0));
        model.tag_nodes_with_rooms(&mut graph);
        assert!(graph.node("inside").unwrap().metadata.room_ids.contains("r1"));
        assert!(graph.node("corridor").unwrap().metadata.room_ids.is_empty());
    }

    #[test]
    fn test_orphan_door_gets_linked() {
        let (model, mut graph) = model_with_room_and_doors(&[("door_a", 5.0, 2.5, true)]);
        graph.insert_node(Node::walkable("w1", [m(6.0), m(2.5)], F0));
        graph.build_spatial_indexes();

        let collision = CollisionDetector::new(0.5, 0.6);
        model.connect_orphan_doors(&mut graph, &collision, 6.0);

        assert_eq!(graph.degree("door_a"), 1);
        let edge = &graph.edges_from("door_a")[0];
        assert_eq!(edge.to, "w1");
        assert_eq!(edge.edge_type, EdgeType::DoorLink);
        assert!(edge.accessible);
    }
}
