//! Input data model for the map bundle consumed by the engine.
//!
//! Mirrors the on-disk asset format: GeoJSON-shaped vector features per
//! floor, side tables classifying geometry ids, and a connections table
//! enumerating doors, stairs, and elevators. Loading and unpacking of the
//! raw assets happens upstream; this module only defines the shapes and
//! light normalization helpers.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::geom::{self, Coord};

/// GeoJSON geometry, restricted to the variants the engine consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: Coord },
    LineString { coordinates: Vec<Coord> },
    MultiLineString { coordinates: Vec<Vec<Coord>> },
    Polygon { coordinates: Vec<Vec<Coord>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Coord>>> },
}

impl Geometry {
    /// Iterate over every vertex of the geometry.
    pub fn coords(&self) -> Box<dyn Iterator<Item = Coord> + '_> {
        match self {
            Geometry::Point { coordinates } => Box::new(std::iter::once(*coordinates)),
            Geometry::LineString { coordinates } => Box::new(coordinates.iter().copied()),
            Geometry::MultiLineString { coordinates } => {
                Box::new(coordinates.iter().flatten().copied())
            }
            Geometry::Polygon { coordinates } => Box::new(coordinates.iter().flatten().copied()),
            Geometry::MultiPolygon { coordinates } => {
                Box::new(coordinates.iter().flatten().flatten().copied())
            }
        }
    }

    pub fn is_polygonal(&self) -> bool {
        matches!(
            self,
            Geometry::Polygon { .. } | Geometry::MultiPolygon { .. }
        )
    }

    pub fn is_linear(&self) -> bool {
        matches!(
            self,
            Geometry::LineString { .. } | Geometry::MultiLineString { .. }
        )
    }

    /// Representative center of the feature: the point itself, the arc-length
    /// midpoint of the longest sub-line, or the polygon centroid.
    pub fn center(&self) -> Option<Coord> {
        match self {
            Geometry::Point { coordinates } => Some(*coordinates),
            Geometry::LineString { coordinates } => line_midpoint(coordinates),
            Geometry::MultiLineString { coordinates } => coordinates
                .iter()
                .max_by(|a, b| {
                    line_length_m(a)
                        .partial_cmp(&line_length_m(b))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .and_then(|line| line_midpoint(line)),
            Geometry::Polygon { .. } | Geometry::MultiPolygon { .. } => geom::centroid(self),
        }
    }

    /// Line segments of a linear geometry, flattened.
    pub fn segments(&self) -> Vec<[Coord; 2]> {
        let mut out = Vec::new();
        let mut push_line = |line: &[Coord]| {
            for w in line.windows(2) {
                out.push([w[0], w[1]]);
            }
        };
        match self {
            Geometry::LineString { coordinates } => push_line(coordinates),
            Geometry::MultiLineString { coordinates } => {
                for line in coordinates {
                    push_line(line);
                }
            }
            _ => {}
        }
        out
    }
}

fn line_length_m(line: &[Coord]) -> f64 {
    line.windows(2).map(|w| geom::distance_m(w[0], w[1])).sum()
}

/// Arc-length midpoint of a polyline.
fn line_midpoint(line: &[Coord]) -> Option<Coord> {
    if line.is_empty() {
        return None;
    }
    if line.len() == 1 {
        return Some(line[0]);
    }
    let half = line_length_m(line) / 2.0;
    let mut walked = 0.0;
    for w in line.windows(2) {
        let seg = geom::distance_m(w[0], w[1]);
        if walked + seg >= half && seg > 0.0 {
            let t = (half - walked) / seg;
            return Some([
                w[0][0] + t * (w[1][0] - w[0][0]),
                w[0][1] + t * (w[1][1] - w[0][1]),
            ]);
        }
        walked += seg;
    }
    line.last().copied()
}

/// Properties common to all engine-consumed features, after normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureProperties {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub floor_id: String,
    /// Source-geometry ids a sample node belongs to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub geometry_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub properties: FeatureProperties,
    pub geometry: Geometry,
}

impl Feature {
    /// Whether the feature carries the identifiers the engine requires.
    pub fn is_normalized(&self) -> bool {
        !self.properties.id.is_empty() && !self.properties.floor_id.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

/// Kind of connector a connections-table entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Door,
    Stairs,
    Elevator,
    Escalator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEntrance {
    pub geometry_id: String,
    pub floor_id: String,
    /// Bit-packed door properties, decoded through [`NavigationFlags`].
    #[serde(default)]
    pub flags: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    #[serde(rename = "type")]
    pub connection_type: ConnectionType,
    #[serde(default)]
    pub entrances: Vec<ConnectionEntrance>,
}

/// Describes which bit positions of entrance flags encode which door
/// properties.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NavigationFlags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public: Option<FlagBit>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FlagBit {
    pub bit: u32,
}

impl NavigationFlags {
    /// Decode the public bit from entrance flags. When the dataset does not
    /// declare a public bit, every door is treated as public.
    pub fn is_public(&self, flags: u64) -> bool {
        match self.public {
            Some(FlagBit { bit }) => flags & (1u64 << bit) != 0,
            None => true,
        }
    }
}

/// The full read-only input bundle the engine initializes from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapBundle {
    /// Dataset identity, part of the visibility-edge cache key.
    #[serde(default)]
    pub map_id: String,
    /// Dataset revision timestamp, part of the visibility-edge cache key.
    #[serde(default)]
    pub map_time: String,

    /// Source geometry: rooms, walls, objects.
    #[serde(default)]
    pub geometry: FeatureCollection,
    /// `geometry_id -> kind` ("wall", "room", "object", ...).
    #[serde(default)]
    pub kinds: HashMap<String, String>,
    #[serde(default)]
    pub walkable_set: HashSet<String>,
    #[serde(default)]
    pub nonwalkable_set: HashSet<String>,

    /// Walkable sample points.
    #[serde(default)]
    pub walkable_nodes: FeatureCollection,
    #[serde(default)]
    pub stairs_nodes: FeatureCollection,
    #[serde(default)]
    pub elevator_nodes: FeatureCollection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrance_nodes: Option<FeatureCollection>,

    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub navigation_flags: NavigationFlags,
}

impl MapBundle {
    pub fn kind_of(&self, geometry_id: &str) -> Option<&str> {
        self.kinds.get(geometry_id).map(String::as_str)
    }
}
