//! In-memory implementation of [`GraphStore`].
//!
//! [`InMemoryStore`] keeps encoded payloads in a `HashMap`, so loads go
//! through the same codec a persistent backend would use and every load
//! yields a fresh, independent [`Graph`].

use std::collections::HashMap;

use flowgraph_core::{Graph, GraphUid};

use crate::codec;
use crate::error::StorageError;
use crate::hash::hash_graph;
use crate::traits::GraphStore;
use crate::types::{GraphSummary, SaveOutcome};

#[derive(Debug, Clone)]
struct StoredGraph {
    name: String,
    version: u64,
    elements: usize,
    fingerprint: blake3::Hash,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    graphs: HashMap<GraphUid, StoredGraph>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn stored(&self, uid: GraphUid) -> Result<&StoredGraph, StorageError> {
        self.graphs.get(&uid).ok_or(StorageError::GraphNotFound(uid))
    }
}

impl GraphStore for InMemoryStore {
    fn save(&mut self, graph: &Graph) -> Result<SaveOutcome, StorageError> {
        let fingerprint = hash_graph(graph)?;
        if let Some(existing) = self.graphs.get(&graph.uid()) {
            if existing.version > graph.version() {
                return Err(StorageError::VersionSkew {
                    uid: graph.uid(),
                    stored: existing.version,
                    saving: graph.version(),
                });
            }
            if existing.fingerprint == fingerprint {
                tracing::debug!(uid = %graph.uid(), "save skipped, content unchanged");
                return Ok(SaveOutcome::Unchanged);
            }
        }
        let bytes = codec::encode(graph)?;
        self.graphs.insert(
            graph.uid(),
            StoredGraph {
                name: graph.name.clone(),
                version: graph.version(),
                elements: graph.element_count(),
                fingerprint,
                bytes,
            },
        );
        tracing::debug!(uid = %graph.uid(), version = graph.version(), "stored graph");
        Ok(SaveOutcome::Stored {
            version: graph.version(),
        })
    }

    fn load(&self, uid: GraphUid) -> Result<Graph, StorageError> {
        codec::decode(&self.stored(uid)?.bytes)
    }

    fn load_bytes(&self, uid: GraphUid) -> Result<Vec<u8>, StorageError> {
        Ok(self.stored(uid)?.bytes.clone())
    }

    fn delete(&mut self, uid: GraphUid) -> Result<(), StorageError> {
        self.graphs
            .remove(&uid)
            .map(|_| ())
            .ok_or(StorageError::GraphNotFound(uid))
    }

    fn list(&self) -> Result<Vec<GraphSummary>, StorageError> {
        let mut out: Vec<GraphSummary> = self
            .graphs
            .iter()
            .map(|(uid, stored)| GraphSummary {
                uid: *uid,
                name: stored.name.clone(),
                version: stored.version,
                elements: stored.elements,
                fingerprint: stored.fingerprint.to_hex().to_string(),
            })
            .collect();
        out.sort_by_key(|s| s.uid);
        Ok(out)
    }

    fn contains(&self, uid: GraphUid) -> bool {
        self.graphs.contains_key(&uid)
    }
}
