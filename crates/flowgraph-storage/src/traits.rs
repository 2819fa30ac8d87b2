//! The [`GraphStore`] trait defining the storage contract for graph definitions.
//!
//! A store keeps the latest snapshot of each graph container, keyed by its
//! [`GraphUid`]. Backends are swappable; the trait is synchronous, matching
//! the single-threaded runtime.

use flowgraph_core::{Graph, GraphUid};

use crate::error::StorageError;
use crate::types::{GraphSummary, SaveOutcome};

pub trait GraphStore {
    /// Stores `graph` as the latest snapshot of its container.
    ///
    /// Saving content identical to the stored snapshot is a no-op. Saving a
    /// version older than the stored one fails with
    /// [`StorageError::VersionSkew`].
    fn save(&mut self, graph: &Graph) -> Result<SaveOutcome, StorageError>;

    /// Loads the latest snapshot of a container.
    fn load(&self, uid: GraphUid) -> Result<Graph, StorageError>;

    /// Raw payload of the latest snapshot, as produced by the codec.
    fn load_bytes(&self, uid: GraphUid) -> Result<Vec<u8>, StorageError>;

    fn delete(&mut self, uid: GraphUid) -> Result<(), StorageError>;

    /// Lists all stored graphs, ordered by uid.
    fn list(&self) -> Result<Vec<GraphSummary>, StorageError>;

    fn contains(&self, uid: GraphUid) -> bool {
        self.load_bytes(uid).is_ok()
    }
}
