//! Persistence for flowgraph graph definitions.
//!
//! Provides the JSON [`codec`] that turns an element tree into bytes and
//! back, the [`GraphStore`] trait that backends implement, the
//! [`InMemoryStore`] backend, and blake3 content fingerprints used to skip
//! redundant saves and to report which elements changed between snapshots.
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`codec`]: encode / decode / decode_superseding
//! - [`hash`]: graph and element fingerprints, snapshot diffs
//! - [`traits`]: GraphStore trait definition
//! - [`memory`]: InMemoryStore implementation
//! - [`types`]: GraphSummary and SaveOutcome

pub mod codec;
pub mod error;
pub mod hash;
pub mod memory;
pub mod traits;
pub mod types;

// Re-export key types for ergonomic use.
pub use codec::{decode, decode_superseding, encode};
pub use error::StorageError;
pub use hash::{diff_elements, hash_element, hash_graph, ChangeSet};
pub use memory::InMemoryStore;
pub use traits::GraphStore;
pub use types::{GraphSummary, SaveOutcome};
