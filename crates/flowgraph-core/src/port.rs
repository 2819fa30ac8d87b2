//! Ports and connection records.
//!
//! Ports are typed attachment points owned by a node. Flow ports carry
//! control, value ports carry a [`PortType`]. Every [`Connection`] is stored
//! once in the graph's connection table and referenced by id from *both* of
//! its endpoint ports, so the two sides can be checked for symmetry.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::id::{ConnectionId, PortId, PortRef};
use crate::types::TypeName;
use crate::value::Value;

/// Direction and payload class of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortKind {
    FlowInput,
    FlowOutput,
    ValueInput,
    ValueOutput,
}

impl PortKind {
    pub fn is_flow(self) -> bool {
        matches!(self, PortKind::FlowInput | PortKind::FlowOutput)
    }

    pub fn is_input(self) -> bool {
        matches!(self, PortKind::FlowInput | PortKind::ValueInput)
    }

    /// Flow outputs and value inputs hold at most one connection; connecting
    /// them again replaces the previous edge.
    pub fn is_single(self) -> bool {
        matches!(self, PortKind::FlowOutput | PortKind::ValueInput)
    }
}

/// Static typing of a value port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PortType {
    /// Flow ports carry no payload.
    Flow,
    Fixed(TypeName),
    /// Computed by the owning node (e.g. a literal's value type).
    Dynamic,
    /// Inferred from the first connected non-auto peer; `declared` is the
    /// fallback when no such peer exists.
    Auto { declared: Option<TypeName> },
}

impl PortType {
    pub fn auto() -> Self {
        PortType::Auto { declared: None }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, PortType::Auto { .. })
    }
}

/// A typed attachment point on a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub id: PortId,
    pub kind: PortKind,
    pub ty: PortType,
    /// Value used by an unconnected value input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Connection ids in attachment order.
    #[serde(default)]
    pub(crate) connections: SmallVec<[ConnectionId; 2]>,
}

impl Port {
    fn with(id: &str, kind: PortKind, ty: PortType) -> Self {
        Port {
            id: PortId::new(id),
            kind,
            ty,
            default: None,
            connections: SmallVec::new(),
        }
    }

    pub fn flow_input(id: &str) -> Self {
        Self::with(id, PortKind::FlowInput, PortType::Flow)
    }

    pub fn flow_output(id: &str) -> Self {
        Self::with(id, PortKind::FlowOutput, PortType::Flow)
    }

    pub fn value_input(id: &str, ty: PortType) -> Self {
        Self::with(id, PortKind::ValueInput, ty)
    }

    pub fn value_output(id: &str, ty: PortType) -> Self {
        Self::with(id, PortKind::ValueOutput, ty)
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Connection ids in attachment order, including dangling ones.
    pub fn connection_ids(&self) -> &[ConnectionId] {
        &self.connections
    }

    pub fn has_connections(&self) -> bool {
        !self.connections.is_empty()
    }
}

/// An edge between an output port and an input port of the same payload class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub output: PortRef,
    pub input: PortRef,
}

impl Connection {
    /// Returns the endpoint opposite to `port`, if `port` is an endpoint.
    pub fn peer_of(&self, port: &PortRef) -> Option<&PortRef> {
        if self.output == *port {
            Some(&self.input)
        } else if self.input == *port {
            Some(&self.output)
        } else {
            None
        }
    }

    pub fn involves(&self, port: &PortRef) -> bool {
        self.output == *port || self.input == *port
    }
}
