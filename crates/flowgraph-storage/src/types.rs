//! Storage-layer metadata types.

use serde::{Deserialize, Serialize};

use flowgraph_core::GraphUid;

/// Summary of a stored graph (for listing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub uid: GraphUid,
    pub name: String,
    /// Version of the stored snapshot.
    pub version: u64,
    pub elements: usize,
    /// Hex-encoded content fingerprint.
    pub fingerprint: String,
}

/// Result of a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Content matched the stored snapshot; nothing was written.
    Unchanged,
    /// The payload was written at `version`.
    Stored { version: u64 },
}
