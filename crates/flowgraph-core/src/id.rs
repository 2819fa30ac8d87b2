//! Stable ID newtypes for graph entities.
//!
//! All IDs are distinct newtype wrappers, providing type safety so that an
//! `ElementId` cannot be accidentally used where a `ConnectionId` is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a graph element, unique within its owning [`Graph`](crate::graph::Graph).
///
/// `ElementId(0)` is reserved for detached elements that are not part of any
/// tree yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementId(pub u32);

impl ElementId {
    /// The id carried by an element that is not attached to a graph.
    pub const NONE: ElementId = ElementId(0);

    /// Returns `true` if this id denotes a detached element.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Identity of a connection record, unique within its owning graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub u32);

/// Stable identity of a graph container (the owner of a graph definition).
///
/// Survives snapshot replacement: every version of the same graph shares one
/// `GraphUid`, which is what makes it usable in runtime storage keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GraphUid(pub u64);

/// Composite key for per-instance storage: container identity plus element id.
///
/// Keying by this pair rather than by object identity is what keeps stored
/// state reachable after a live rebind swaps the element object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuntimeId {
    pub container: GraphUid,
    pub element: ElementId,
}

impl RuntimeId {
    pub fn new(container: GraphUid, element: ElementId) -> Self {
        RuntimeId { container, element }
    }
}

/// Node-local port key (e.g. `"exit"`, `"value"`, `"arg0"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortId(pub String);

impl PortId {
    pub fn new(id: impl Into<String>) -> Self {
        PortId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PortId {
    fn from(s: &str) -> Self {
        PortId(s.to_string())
    }
}

/// Address of a port: the owning node plus the node-local port key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub node: ElementId,
    pub port: PortId,
}

impl PortRef {
    pub fn new(node: ElementId, port: impl Into<PortId>) -> Self {
        PortRef {
            node,
            port: port.into(),
        }
    }
}

// Display implementations -- just print the inner value.

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GraphUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.container, self.element)
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.port)
    }
}
