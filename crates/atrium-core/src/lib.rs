//! Atrium Core - indoor routing over per-floor vector geometry
//!
//! This crate contains the routing engine and its domain models with NO
//! networking or storage dependencies: obstacle-aware visibility graphs,
//! room and door constraints, multi-floor A*, and a content-addressed
//! visibility-edge cache behind a storage-agnostic trait.

pub mod astar;
pub mod collision;
pub mod config;
pub mod connections;
pub mod edge_builder;
pub mod edge_cache;
pub mod engine;
pub mod error;
pub mod geom;
pub mod graph;
pub mod instructions;
pub mod mvf;
pub mod rooms;
pub mod smooth;
pub mod spatial_index;

pub use astar::{PathSegment, SearchOptions, SearchResult};
pub use config::{EdgeBuildConfig, EngineConfig, RuntimeFlags};
pub use edge_cache::{edge_cache_key, EdgeRecord, EdgeStore, MemoryEdgeStore};
pub use engine::{
    InitStats, PathfindingEngine, Route, RouteOptions, RouteRequest, RoomTraversalMode,
};
pub use error::{Endpoint, InitError, RouteError};
pub use graph::{Edge, EdgeType, Graph, Node, NodeType};
pub use instructions::{generate_instructions, Instruction, InstructionType};
pub use mvf::{Connection, ConnectionType, Feature, FeatureCollection, Geometry, MapBundle};
