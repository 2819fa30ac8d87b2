//! Deterministic content fingerprints using blake3.
//!
//! Fingerprints are derived state, never stored inside a payload. They ignore
//! the snapshot version, so republishing an unchanged tree yields the same
//! fingerprint and stores can skip the write.
//!
//! # Determinism
//!
//! Content is serialized through `serde_json::Value`, whose maps are sorted,
//! and element fingerprints are collected into a `BTreeMap` keyed by id.

use std::collections::{BTreeMap, BTreeSet};

use flowgraph_core::{ElementId, Graph, GraphElement};

use crate::error::StorageError;

/// Fingerprint of a whole graph definition, excluding its version.
pub fn hash_graph(graph: &Graph) -> Result<blake3::Hash, StorageError> {
    let mut json = serde_json::to_value(graph)?;
    if let Some(map) = json.as_object_mut() {
        map.remove("version");
    }
    let bytes = serde_json::to_vec(&json)?;
    Ok(blake3::hash(&bytes))
}

/// Fingerprint of one element's own content: name, comment, kind, parent and
/// child order. Connections are hashed by [`hash_graph`] only.
pub fn hash_element(element: &GraphElement) -> Result<blake3::Hash, StorageError> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(element.name.as_bytes());
    hasher.update(&[0]);
    hasher.update(element.comment.as_bytes());
    hasher.update(&[0]);
    hasher.update(&serde_json::to_vec(&element.kind)?);
    hasher.update(&element.parent().map_or(0, |p| p.0).to_le_bytes());
    for child in element.children() {
        hasher.update(&child.0.to_le_bytes());
    }
    Ok(hasher.finalize())
}

/// Per-element fingerprints, keyed by id.
pub fn hash_elements(graph: &Graph) -> Result<BTreeMap<ElementId, blake3::Hash>, StorageError> {
    graph
        .elements()
        .map(|el| Ok((el.id(), hash_element(el)?)))
        .collect()
}

/// Elements that differ between two fingerprint tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: BTreeSet<ElementId>,
    pub modified: BTreeSet<ElementId>,
    pub removed: BTreeSet<ElementId>,
}

impl ChangeSet {
    pub fn is_clean(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}

/// Compares two snapshots element by element.
pub fn diff_elements(previous: &Graph, current: &Graph) -> Result<ChangeSet, StorageError> {
    let before = hash_elements(previous)?;
    let after = hash_elements(current)?;
    let mut changes = ChangeSet::default();
    for (id, hash) in &after {
        match before.get(id) {
            None => {
                changes.added.insert(*id);
            }
            Some(old) if old != hash => {
                changes.modified.insert(*id);
            }
            Some(_) => {}
        }
    }
    for id in before.keys() {
        if !after.contains_key(id) {
            changes.removed.insert(*id);
        }
    }
    Ok(changes)
}
