//! Storage error types for flowgraph-storage.
//!
//! [`StorageError`] covers the failure modes of the codec and the stores:
//! serialization, unknown payload formats, missing graphs and out-of-order
//! saves.

use flowgraph_core::GraphUid;
use thiserror::Error;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The payload was written by an incompatible codec version.
    #[error("unsupported payload format {found} (expected {expected})")]
    UnsupportedFormat { found: u32, expected: u32 },

    /// A graph with the given uid was not found.
    #[error("graph not found: {0}")]
    GraphNotFound(GraphUid),

    /// A save would move a stored graph backwards.
    #[error("graph {uid}: stored version {stored} is newer than {saving}")]
    VersionSkew { uid: GraphUid, stored: u64, saving: u64 },

    /// A superseding payload belongs to a different graph container.
    #[error("payload for graph {found} cannot supersede graph {expected}")]
    ForeignPayload { expected: GraphUid, found: GraphUid },
}
