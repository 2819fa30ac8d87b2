//! Core error types for flowgraph-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! structural faults of the element tree and the port/connection model.
//! Member resolution faults live in [`MemberError`](crate::member::MemberError).

use crate::id::{ElementId, PortRef};
use thiserror::Error;

/// Core errors produced by tree and connection mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// An element id was not found in the graph.
    #[error("element not found: ElementId({id})", id = id.0)]
    ElementNotFound { id: ElementId },

    /// Re-parenting would make an element its own ancestor.
    #[error("cannot move element {element} under {parent}: {parent} is the element itself or one of its descendants")]
    CycleDetected { element: ElementId, parent: ElementId },

    /// The element kind is structurally pinned to its parent.
    #[error("element {element} ('{name}') cannot change parent")]
    PinnedElement { element: ElementId, name: String },

    /// A destroyed element must never re-enter a tree.
    #[error("destroyed element '{name}' cannot be attached")]
    DestroyedElement { name: String },

    /// The element exists but is not a node.
    #[error("element {id} is not a node")]
    NotANode { id: ElementId },

    /// A port key was not found on its node.
    #[error("port not found: {port}")]
    PortNotFound { port: PortRef },

    /// A connection request failed validation.
    #[error("invalid connection {from} -> {to}: {reason}")]
    InvalidConnection {
        from: PortRef,
        to: PortRef,
        reason: String,
    },

    /// Bookkeeping between parents, children and the lookup cache disagrees.
    #[error("graph inconsistency: {reason}")]
    GraphInconsistency { reason: String },
}
