//! Obstacle-aware collision checks per floor.
//!
//! Walls and non-walkable geometry become buffered obstacle polygons. Door
//! line segments are registered separately and act as additive permissions:
//! a wall crossing within the door clearance radius is forgiven, so door
//! state can change without rebuilding obstacle geometry.
//!
//! Broken input geometry never blocks routing: anything that cannot be
//! buffered is logged and dropped, and the affected area simply reports no
//! collision.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::geom::{self, Coord};
use crate::mvf::{Feature, FeatureCollection, Geometry};

/// An obstacle polygon with its precomputed axis-aligned hull.
#[derive(Debug, Clone)]
pub struct Obstacle {
    pub geometry: Geometry,
    pub bbox: [f64; 4],
}

impl Obstacle {
    fn new(geometry: Geometry) -> Self {
        let bbox = geom::bbox(&geometry);
        Self { geometry, bbox }
    }
}

#[derive(Debug, Default)]
pub struct CollisionDetector {
    obstacles: HashMap<String, Vec<Obstacle>>,
    door_segments: HashMap<String, Vec<[Coord; 2]>>,
    wall_buffer_m: f64,
    door_clearance_m: f64,
}

impl CollisionDetector {
    pub fn new(wall_buffer_m: f64, door_clearance_m: f64) -> Self {
        Self {
            obstacles: HashMap::new(),
            door_segments: HashMap::new(),
            wall_buffer_m,
            door_clearance_m,
        }
    }

    /// Ingest source geometry and the classification tables.
    ///
    /// A feature becomes an obstacle when its kind is `wall` or its id is in
    /// the non-walkable set. Linear walls are buffered into polygons; each
    /// sub-line of a MultiLineString becomes its own obstacle so bboxes stay
    /// tight. Features that cannot be buffered are dropped.
    pub fn build(
        &mut self,
        geometry: &FeatureCollection,
        nonwalkable_set: &HashSet<String>,
        kinds: &HashMap<String, String>,
    ) {
        for feature in &geometry.features {
            let id = &feature.properties.id;
            let is_wall = kinds.get(id).map(String::as_str) == Some("wall");
            if !is_wall && !nonwalkable_set.contains(id) {
                continue;
            }
            self.add_obstacle_feature(feature);
        }
    }

    fn add_obstacle_feature(&mut self, feature: &Feature) {
        let floor_id = feature.properties.floor_id.clone();
        let entries = self.obstacles.entry(floor_id).or_default();

        match &feature.geometry {
            Geometry::Polygon { .. } => entries.push(Obstacle::new(feature.geometry.clone())),
            Geometry::MultiPolygon { coordinates } => {
                for rings in coordinates {
                    entries.push(Obstacle::new(Geometry::Polygon {
                        coordinates: rings.clone(),
                    }));
                }
            }
            Geometry::LineString { .. } => {
                match geom::buffer(&feature.geometry, self.wall_buffer_m) {
                    Some(polygon) => entries.push(Obstacle::new(polygon)),
                    None => debug!(
                        geometry_id = %feature.properties.id,
                        "dropping wall with degenerate geometry"
                    ),
                }
            }
            Geometry::MultiLineString { coordinates } => {
                for line in coordinates {
                    let sub = Geometry::LineString {
                        coordinates: line.clone(),
                    };
                    match geom::buffer(&sub, self.wall_buffer_m) {
                        Some(polygon) => entries.push(Obstacle::new(polygon)),
                        None => debug!(
                            geometry_id = %feature.properties.id,
                            "dropping degenerate wall sub-line"
                        ),
                    }
                }
            }
            Geometry::Point { .. } => debug!(
                geometry_id = %feature.properties.id,
                "ignoring point feature marked non-walkable"
            ),
        }
    }

    /// Register door line segments for a floor. Doors do not contribute
    /// obstacles; they allow wall crossings within the clearance radius.
    pub fn set_door_segments(&mut self, floor_id: &str, segments: Vec<[Coord; 2]>) {
        self.door_segments
            .entry(floor_id.to_string())
            .or_default()
            .extend(segments);
    }

    /// Register the segments of a linear door feature.
    pub fn add_door_feature(&mut self, floor_id: &str, geometry: &Geometry) {
        let segments = geometry.segments();
        if !segments.is_empty() {
            self.set_door_segments(floor_id, segments);
        }
    }

    pub fn obstacle_count(&self, floor_id: &str) -> usize {
        self.obstacles.get(floor_id).map_or(0, Vec::len)
    }

    fn near_door(&self, p: Coord, floor_id: &str) -> bool {
        self.door_segments
            .get(floor_id)
            .into_iter()
            .flatten()
            .any(|seg| geom::point_to_segment_m(p, seg[0], seg[1]) <= self.door_clearance_m)
    }

    /// Whether `p` lies inside any obstacle on the floor and is not within
    /// the door clearance radius of a registered door segment.
    pub fn point_in_obstacle(&self, p: Coord, floor_id: &str) -> bool {
        let Some(obstacles) = self.obstacles.get(floor_id) else {
            return false;
        };
        let contained = obstacles.iter().any(|obs| {
            p[0] >= obs.bbox[0]
                && p[0] <= obs.bbox[2]
                && p[1] >= obs.bbox[1]
                && p[1] <= obs.bbox[3]
                && geom::point_in_polygon(p, &obs.geometry)
        });
        contained && !self.near_door(p, floor_id)
    }

    /// Whether the segment `[a, b]` crosses any obstacle with at least one
    /// intersection point farther than the door clearance from every door
    /// segment on the floor. Obstacle bboxes pre-reject before exact
    /// intersection tests.
    pub fn line_intersects_obstacle(&self, a: Coord, b: Coord, floor_id: &str) -> bool {
        let Some(obstacles) = self.obstacles.get(floor_id) else {
            return false;
        };
        let seg_bbox = geom::segment_bbox(a, b, 0.0);
        for obs in obstacles {
            if !geom::bboxes_overlap(&seg_bbox, &obs.bbox) {
                continue;
            }
            for hit in geom::line_intersect(a, b, &obs.geometry) {
                if !self.near_door(hit, floor_id) {
                    return true;
                }
            }
        }
        false
    }

    /// Pure segment clearance: the straight line between two graph nodes
    /// does not cross an obstacle. Endpoint containment is deliberately not
    /// checked; sampled nodes may sit inside a wall's buffer zone and must
    /// still be linkable.
    pub fn has_line_of_sight(&self, a: Coord, b: Coord, floor_id: &str) -> bool {
        !self.line_intersects_obstacle(a, b, floor_id)
    }

    /// Strict clearance for user-to-graph connectors: both endpoints free
    /// and the segment unobstructed.
    pub fn is_path_clear(&self, a: Coord, b: Coord, floor_id: &str) -> bool {
        !self.point_in_obstacle(a, floor_id)
            && !self.point_in_obstacle(b, floor_id)
            && !self.line_intersects_obstacle(a, b, floor_id)
    }

    /// Relaxed clearance for short connectors: segments under 2m pass
    /// unconditionally, 2-10m segments skip endpoint checks, longer
    /// segments are tested strictly.
    pub fn is_path_clear_relaxed(&self, a: Coord, b: Coord, floor_id: &str) -> bool {
        let length = geom::distance_m(a, b);
        if length < 2.0 {
            return true;
        }
        if length < 10.0 {
            return !self.line_intersects_obstacle(a, b, floor_id);
        }
        self.is_path_clear(a, b, floor_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::DEG_LAT_M;
    use crate::mvf::FeatureProperties;

    const F0: &str = "floor0";

    fn m(v: f64) -> f64 {
        v / DEG_LAT_M
    }

    /// A vertical wall from (5,0) to (5,10) in local meters, with the
    /// standard 0.5m buffer.
    fn wall_detector() -> CollisionDetector {
        let mut detector = CollisionDetector::new(0.5, 0.6);
        let wall = Feature {
            properties: FeatureProperties {
                id: "w1".into(),
                floor_id: F0.into(),
                ..FeatureProperties::default()
            },
            geometry: Geometry::LineString {
                coordinates: vec![[m(5.0), m(0.0)], [m(5.0), m(10.0)]],
            },
        };
        let mut kinds = HashMap::new();
        kinds.insert("w1".to_string(), "wall".to_string());
        detector.build(
            &FeatureCollection {
                features: vec![wall],
            },
            &HashSet::new(),
            &kinds,
        );
        detector
    }

    #[test]
    fn test_wall_becomes_buffered_obstacle() {
        let detector = wall_detector();
        assert_eq!(detector.obstacle_count(F0), 1);
        assert!(detector.point_in_obstacle([m(5.0), m(5.0)], F0));
        assert!(detector.point_in_obstacle([m(5.3), m(5.0)], F0));
        assert!(!detector.point_in_obstacle([m(6.5), m(5.0)], F0));
    }

    #[test]
    fn test_line_crossing_wall_detected() {
        let detector = wall_detector();
        assert!(detector.line_intersects_obstacle([m(2.0), m(5.0)], [m(8.0), m(5.0)], F0));
        // Parallel to the wall, one meter away: clear.
        assert!(!detector.line_intersects_obstacle([m(6.5), m(1.0)], [m(6.5), m(9.0)], F0));
        assert!(detector.has_line_of_sight([m(6.5), m(1.0)], [m(6.5), m(9.0)], F0));
    }

    #[test]
    fn test_door_segment_forgives_crossing() {
        let mut detector = wall_detector();
        // Door across the wall at y = 5m.
        detector.set_door_segments(F0, vec![[[m(4.5), m(5.0)], [m(5.5), m(5.0)]]]);
        assert!(!detector.line_intersects_obstacle([m(2.0), m(5.0)], [m(8.0), m(5.0)], F0));
        // Crossing far from the door is still blocked.
        assert!(detector.line_intersects_obstacle([m(2.0), m(9.0)], [m(8.0), m(9.0)], F0));
        // A point inside the wall buffer but at the door is not an obstacle hit.
        assert!(!detector.point_in_obstacle([m(5.0), m(5.0)], F0));
    }

    #[test]
    fn test_is_path_clear_checks_endpoints() {
        let detector = wall_detector();
        // Segment along the wall's east side starting inside the buffer.
        assert!(!detector.is_path_clear([m(5.3), m(5.0)], [m(8.0), m(5.0)], F0));
        assert!(detector.is_path_clear([m(6.5), m(5.0)], [m(8.0), m(5.0)], F0));
    }

    #[test]
    fn test_relaxed_clearance_tiers() {
        let detector = wall_detector();
        // Under 2m: always clear, even crossing the wall.
        assert!(detector.is_path_clear_relaxed([m(4.4), m(5.0)], [m(5.6), m(5.0)], F0));
        // 2-10m: line test only; endpoint in buffer is forgiven.
        assert!(detector.is_path_clear_relaxed([m(5.6), m(5.0)], [m(9.0), m(5.0)], F0));
        assert!(!detector.is_path_clear_relaxed([m(2.0), m(5.0)], [m(9.0), m(5.0)], F0));
        // >=10m behaves strictly.
        assert!(!detector.is_path_clear_relaxed([m(5.3), m(5.0)], [m(17.0), m(5.0)], F0));
    }

    #[test]
    fn test_multiline_wall_splits_per_subline() {
        let mut detector = CollisionDetector::new(0.5, 0.6);
        let wall = Feature {
            properties: FeatureProperties {
                id: "w2".into(),
                floor_id: F0.into(),
                ..FeatureProperties::default()
            },
            geometry: Geometry::MultiLineString {
                coordinates: vec![
                    vec![[m(0.0), m(0.0)], [m(10.0), m(0.0)]],
                    vec![[m(0.0), m(20.0)], [m(10.0), m(20.0)]],
                ],
            },
        };
        let mut kinds = HashMap::new();
        kinds.insert("w2".to_string(), "wall".to_string());
        detector.build(
            &FeatureCollection {
                features: vec![wall],
            },
            &HashSet::new(),
            &kinds,
        );
        assert_eq!(detector.obstacle_count(F0), 2);
    }

    #[test]
    fn test_unknown_floor_reports_no_collision() {
        let detector = wall_detector();
        assert!(!detector.point_in_obstacle([m(5.0), m(5.0)], "floor9"));
        assert!(detector.is_path_clear([m(0.0), m(0.0)], [m(10.0), m(10.0)], "floor9"));
    }
}
