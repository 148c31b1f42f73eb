//! Cross-floor stitching from the connections table.
//!
//! Stairs, elevator, and escalator entries join the connector nodes of the
//! floors they reference. Edge weight is the geodesic distance between the
//! endpoints plus a constant vertical-travel addend, which disincentivizes
//! gratuitous floor changes without needing elevation data.

use std::collections::HashMap;
use tracing::warn;

use crate::graph::{EdgeType, Graph, Node, NodeType};
use crate::mvf::{Connection, ConnectionType, Feature};
use crate::geom;

/// Resolve connector entries into bidirectional cross-floor edges.
///
/// Every unordered pair of a connection's entrances on different floors is
/// linked, so a three-floor stair well is fully stitched. Entrances whose
/// node cannot be resolved are skipped (and synthesized from the referenced
/// geometry when possible); a malformed connection never aborts the rest.
///
/// Returns the number of directed edges added.
pub fn apply_connections(
    graph: &mut Graph,
    connections: &[Connection],
    features_by_id: &HashMap<String, &Feature>,
    vertical_travel_m: f64,
) -> usize {
    // (geometry_id, floor_id) -> node_id for every node that carries
    // geometry ownership, smallest node id winning for determinism.
    let mut by_geometry: HashMap<(String, String), String> = HashMap::new();
    for node in graph.nodes() {
        for geometry_id in &node.metadata.geometry_ids {
            let key = (geometry_id.clone(), node.floor_id.clone());
            match by_geometry.get(&key) {
                Some(existing) if existing <= &node.id => {}
                _ => {
                    by_geometry.insert(key, node.id.clone());
                }
            }
        }
    }

    let mut added = 0usize;
    for connection in connections {
        let edge_type = match connection.connection_type {
            ConnectionType::Stairs => EdgeType::Stairs,
            ConnectionType::Elevator => EdgeType::Elevator,
            ConnectionType::Escalator => EdgeType::Escalator,
            ConnectionType::Door => continue, // door nodes are built elsewhere
        };
        let accessible = matches!(connection.connection_type, ConnectionType::Elevator);

        let mut endpoints: Vec<String> = Vec::with_capacity(connection.entrances.len());
        for entrance in &connection.entrances {
            let key = (entrance.geometry_id.clone(), entrance.floor_id.clone());
            let node_id = match by_geometry.get(&key) {
                Some(id) => id.clone(),
                None => {
                    match synthesize_connector(
                        graph,
                        features_by_id,
                        &entrance.geometry_id,
                        &entrance.floor_id,
                        connection.connection_type,
                    ) {
                        Some(id) => {
                            by_geometry.insert(key, id.clone());
                            id
                        }
                        None => {
                            warn!(
                                geometry_id = %entrance.geometry_id,
                                floor_id = %entrance.floor_id,
                                "skipping connector entrance with no node"
                            );
                            continue;
                        }
                    }
                }
            };
            endpoints.push(node_id);
        }

        for i in 0..endpoints.len() {
            for j in (i + 1)..endpoints.len() {
                let (a, b) = (&endpoints[i], &endpoints[j]);
                let (Some(na), Some(nb)) = (graph.node(a), graph.node(b)) else {
                    continue;
                };
                if na.floor_id == nb.floor_id {
                    continue;
                }
                let weight = geom::distance_m(na.coords, nb.coords) + vertical_travel_m;
                if graph.add_bidirectional(a, b, weight, edge_type, accessible) {
                    added += 2;
                }
            }
        }
    }
    added
}

/// Create a connector node at the center of the referenced geometry when the
/// bundle did not sample one.
fn synthesize_connector(
    graph: &mut Graph,
    features_by_id: &HashMap<String, &Feature>,
    geometry_id: &str,
    floor_id: &str,
    connection_type: ConnectionType,
) -> Option<String> {
    let feature = features_by_id.get(geometry_id)?;
    let coords = feature.geometry.center()?;
    let (node_type, is_stairs, is_elevator) = match connection_type {
        ConnectionType::Stairs | ConnectionType::Escalator => (NodeType::Stairs, true, false),
        ConnectionType::Elevator => (NodeType::Elevator, false, true),
        ConnectionType::Door => return None,
    };
    let id = format!("conn_{geometry_id}_{floor_id}");
    let mut node = Node::walkable(id.clone(), coords, floor_id);
    node.node_type = node_type;
    node.metadata.is_stairs = is_stairs;
    node.metadata.is_elevator = is_elevator;
    node.metadata.accessible = !is_stairs;
    node.metadata.geometry_ids.insert(geometry_id.to_string());
    graph.insert_node(node);
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::DEG_LAT_M;
    use crate::mvf::ConnectionEntrance;

    fn m(v: f64) -> f64 {
        v / DEG_LAT_M
    }

    fn connector_node(id: &str, geometry_id: &str, floor: &str, node_type: NodeType) -> Node {
        let mut node = Node::walkable(id, [m(1.0), m(1.0)], floor);
        node.node_type = node_type;
        node.metadata.is_elevator = node_type == NodeType::Elevator;
        node.metadata.is_stairs = node_type == NodeType::Stairs;
        node.metadata.accessible = node_type != NodeType::Stairs;
        node.metadata.geometry_ids.insert(geometry_id.to_string());
        node
    }

    fn connection(kind: ConnectionType, geometry_id: &str, floors: &[&str]) -> Connection {
        Connection {
            connection_type: kind,
            entrances: floors
                .iter()
                .map(|floor| ConnectionEntrance {
                    geometry_id: geometry_id.into(),
                    floor_id: floor.to_string(),
                    flags: 0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_elevator_connection_is_accessible() {
        let mut graph = Graph::new();
        graph.insert_node(connector_node("e0", "elev1", "floor0", NodeType::Elevator));
        graph.insert_node(connector_node("e1", "elev1", "floor1", NodeType::Elevator));

        let added = apply_connections(
            &mut graph,
            &[connection(ConnectionType::Elevator, "elev1", &["floor0", "floor1"])],
            &HashMap::new(),
            5.0,
        );
        assert_eq!(added, 2);
        let edge = &graph.edges_from("e0")[0];
        assert_eq!(edge.edge_type, EdgeType::Elevator);
        assert!(edge.accessible);
        // Same coords on both floors: weight is the vertical constant.
        assert!((edge.weight_m - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_stairs_connection_is_not_accessible() {
        let mut graph = Graph::new();
        graph.insert_node(connector_node("s0", "st1", "floor0", NodeType::Stairs));
        graph.insert_node(connector_node("s1", "st1", "floor1", NodeType::Stairs));

        apply_connections(
            &mut graph,
            &[connection(ConnectionType::Stairs, "st1", &["floor0", "floor1"])],
            &HashMap::new(),
            5.0,
        );
        let edge = &graph.edges_from("s0")[0];
        assert_eq!(edge.edge_type, EdgeType::Stairs);
        assert!(!edge.accessible);
    }

    #[test]
    fn test_three_floor_well_is_fully_stitched() {
        let mut graph = Graph::new();
        for floor in ["floor0", "floor1", "floor2"] {
            graph.insert_node(connector_node(
                &format!("s_{floor}"),
                "st1",
                floor,
                NodeType::Stairs,
            ));
        }
        let added = apply_connections(
            &mut graph,
            &[connection(
                ConnectionType::Stairs,
                "st1",
                &["floor0", "floor1", "floor2"],
            )],
            &HashMap::new(),
            5.0,
        );
        // Three unordered pairs, both directions.
        assert_eq!(added, 6);
    }

    #[test]
    fn test_unresolvable_entrance_is_skipped() {
        let mut graph = Graph::new();
        graph.insert_node(connector_node("e0", "elev1", "floor0", NodeType::Elevator));
        // floor1 entrance has no node and no geometry to synthesize from.
        let added = apply_connections(
            &mut graph,
            &[connection(ConnectionType::Elevator, "elev1", &["floor0", "floor1"])],
            &HashMap::new(),
            5.0,
        );
        assert_eq!(added, 0);
    }
}
