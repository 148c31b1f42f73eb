//! Content-addressed cache for visibility edges.
//!
//! Building visibility edges is the expensive part of initialization, so the
//! engine persists the resulting `(from, to, weight)` triples keyed by the
//! dataset identity and the edge-build parameters. The storage mechanism is
//! behind a trait; the engine treats every store failure as a miss.
//!
//! The schema version is part of the key and increments whenever edge
//! semantics change, invalidating older records without touching them.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bump when the meaning of cached edges changes.
pub const EDGE_CACHE_SCHEMA: u32 = 3;

/// Cache key for one dataset + parameter combination.
pub fn edge_cache_key(
    map_id: &str,
    map_time: &str,
    max_distance_m: f64,
    max_neighbors: usize,
) -> String {
    format!(
        "visibilityEdges:v{EDGE_CACHE_SCHEMA}:{map_id}:{map_time}:d{max_distance_m}:k{max_neighbors}"
    )
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeRecordMeta {
    pub node_count: usize,
    pub floor_count: usize,
}

/// A persisted set of directed visibility edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// `(from_id, to_id, weight_m)` triples.
    pub edges: Vec<(String, String, f64)>,
    pub meta: EdgeRecordMeta,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("edge store unavailable: {0}")]
    Unavailable(String),
}

/// Storage-agnostic persistence for edge records. Implementations decide
/// the transport (filesystem, IndexedDB-style KV, remote blob store).
pub trait EdgeStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<EdgeRecord>, StoreError>;
    fn put(&self, key: &str, record: EdgeRecord) -> Result<(), StoreError>;
}

/// In-memory store, useful for tests and for sharing edges between engine
/// instances in one process.
#[derive(Debug, Default)]
pub struct MemoryEdgeStore {
    entries: DashMap<String, EdgeRecord>,
}

impl MemoryEdgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl EdgeStore for MemoryEdgeStore {
    fn get(&self, key: &str) -> Result<Option<EdgeRecord>, StoreError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn put(&self, key: &str, record: EdgeRecord) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        let key = edge_cache_key("mall-west", "2026-07-01T00:00:00Z", 15.0, 8);
        assert_eq!(
            key,
            "visibilityEdges:v3:mall-west:2026-07-01T00:00:00Z:d15:k8"
        );
    }

    #[test]
    fn test_key_varies_with_parameters() {
        let a = edge_cache_key("m", "t", 15.0, 8);
        let b = edge_cache_key("m", "t", 8.0, 8);
        let c = edge_cache_key("m", "t", 15.0, 6);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryEdgeStore::new();
        let key = edge_cache_key("m", "t", 15.0, 8);
        assert!(store.get(&key).unwrap().is_none());

        let record = EdgeRecord {
            edges: vec![("a".into(), "b".into(), 3.5)],
            meta: EdgeRecordMeta {
                node_count: 2,
                floor_count: 1,
            },
            created_at: Utc::now(),
        };
        store.put(&key, record).unwrap();

        let loaded = store.get(&key).unwrap().unwrap();
        assert_eq!(loaded.edges.len(), 1);
        assert_eq!(loaded.edges[0].0, "a");
        assert_eq!(loaded.meta.node_count, 2);
    }
}
