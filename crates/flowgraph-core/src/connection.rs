//! Port connections and static port typing.
//!
//! Extends [`Graph`] with the connection API. A connection is stored once in
//! the graph's table and its id is pushed onto both endpoint ports, in
//! attachment order. Flow outputs and value inputs are single-connection
//! ports: connecting them again replaces the previous edge.
//!
//! Connections whose table entry, endpoint node or endpoint port list no
//! longer agree are *dangling*. Read paths skip them; [`Graph::prune_dangling`]
//! and [`Graph::prune_all_dangling`] remove them.

use crate::convert::{compatibility, Compatibility};
use crate::error::CoreError;
use crate::graph::Graph;
use crate::id::{ConnectionId, ElementId, PortRef};
use crate::node::{ports, NodeKind};
use crate::port::{Connection, PortKind, PortType};
use crate::reflect::TypeRegistry;
use crate::types::TypeName;

/// Maximum depth of auto/dynamic type inference through chained ports.
const MAX_TYPE_DEPTH: usize = 64;

/// Result of [`Graph::connect_with_conversion`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The ports were connected directly.
    Direct(ConnectionId),
    /// A `Convert` node was inserted between the ports.
    Converted {
        node: ElementId,
        connections: [ConnectionId; 2],
    },
}

impl Graph {
    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id).filter(|_| !self.is_dangling(id))
    }

    /// All live connections, in creation order.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values().filter(|c| !self.is_dangling(c.id))
    }

    /// Returns `true` if the connection is missing from the table or either
    /// endpoint no longer references it.
    pub fn is_dangling(&self, id: ConnectionId) -> bool {
        let Some(conn) = self.connections.get(&id) else {
            return true;
        };
        let holds = |end: &PortRef| {
            self.port(end)
                .map(|p| p.connections.contains(&id))
                .unwrap_or(false)
        };
        !(holds(&conn.output) && holds(&conn.input))
    }

    /// Live connections attached to `port`, in attachment order.
    pub fn connections_of(&self, port: &PortRef) -> Vec<&Connection> {
        let Ok(p) = self.port(port) else {
            return Vec::new();
        };
        p.connections
            .iter()
            .filter(|id| !self.is_dangling(**id))
            .filter_map(|id| self.connections.get(id))
            .collect()
    }

    /// The ports on the other end of `port`'s live connections.
    pub fn connected_peers(&self, port: &PortRef) -> Vec<PortRef> {
        self.connections_of(port)
            .into_iter()
            .filter_map(|c| c.peer_of(port).cloned())
            .collect()
    }

    /// Returns `true` if `port` has at least one live connection.
    pub fn is_connected(&self, port: &PortRef) -> bool {
        !self.connections_of(port).is_empty()
    }

    // -----------------------------------------------------------------------
    // Connect / disconnect
    // -----------------------------------------------------------------------

    /// Connects an output port to an input port of the same payload class.
    ///
    /// The two ports may be given in either order. Self connections and
    /// connections between ports of the same node are rejected. No type
    /// check is performed; see [`Graph::connect_checked`].
    pub fn connect(&mut self, from: PortRef, to: PortRef) -> Result<ConnectionId, CoreError> {
        let from_kind = self.port(&from)?.kind;
        let to_kind = self.port(&to)?.kind;
        let invalid = |reason: &str| CoreError::InvalidConnection {
            from: from.clone(),
            to: to.clone(),
            reason: reason.to_string(),
        };
        if from.node == to.node {
            return Err(invalid("ports belong to the same node"));
        }
        if from_kind.is_flow() != to_kind.is_flow() {
            return Err(invalid("cannot connect a flow port to a value port"));
        }
        if from_kind.is_input() == to_kind.is_input() {
            return Err(invalid("a connection needs exactly one output and one input"));
        }
        let (output, input) = if from_kind.is_input() { (to, from) } else { (from, to) };

        if let Some(existing) = self.connections_of(&output).iter().find(|c| c.input == input) {
            return Ok(existing.id);
        }
        for end in [&output, &input] {
            if self.port(end)?.kind.is_single() {
                self.clear_connections(end);
            }
        }

        let id = ConnectionId(self.next_connection_id);
        self.next_connection_id += 1;
        self.attach_id(&output, id)?;
        self.attach_id(&input, id)?;
        self.connections.insert(id, Connection { id, output, input });
        Ok(id)
    }

    fn attach_id(&mut self, port: &PortRef, id: ConnectionId) -> Result<(), CoreError> {
        let node = self.node_mut(port.node)?;
        let p = node
            .port_mut(&port.port)
            .ok_or_else(|| CoreError::PortNotFound { port: port.clone() })?;
        p.connections.push(id);
        Ok(())
    }

    fn detach_id(&mut self, port: &PortRef, id: ConnectionId) {
        if let Ok(node) = self.node_mut(port.node) {
            if let Some(p) = node.port_mut(&port.port) {
                p.connections.retain(|c| *c != id);
            }
        }
    }

    /// Connects two value ports after checking their static types.
    ///
    /// Fails unless the output's type is assignable to the input's.
    pub fn connect_checked(
        &mut self,
        from: PortRef,
        to: PortRef,
        registry: &TypeRegistry,
    ) -> Result<ConnectionId, CoreError> {
        match self.check_compatibility(&from, &to, registry)? {
            Compatibility::Assignable => self.connect(from, to),
            Compatibility::Convertible => Err(CoreError::InvalidConnection {
                from,
                to,
                reason: "types need a conversion".into(),
            }),
            Compatibility::Incompatible => Err(CoreError::InvalidConnection {
                from,
                to,
                reason: "incompatible types".into(),
            }),
        }
    }

    /// Connects two value ports, inserting a `Convert` node when the types
    /// are convertible but not assignable. The converter is placed next to
    /// the input's node.
    pub fn connect_with_conversion(
        &mut self,
        from: PortRef,
        to: PortRef,
        registry: &TypeRegistry,
    ) -> Result<ConnectOutcome, CoreError> {
        let (output, input) = if self.port(&from)?.kind.is_input() { (to, from) } else { (from, to) };
        match self.check_compatibility(&output, &input, registry)? {
            Compatibility::Assignable => Ok(ConnectOutcome::Direct(self.connect(output, input)?)),
            Compatibility::Convertible => {
                let target = self.port_type(&input).unwrap_or(TypeName::OBJECT);
                let parent = self
                    .get(input.node)
                    .and_then(|el| el.parent())
                    .unwrap_or_else(|| self.root());
                let node = self.add_node(parent, format!("to {target}"), NodeKind::Convert { to: target })?;
                let first = self.connect(output, PortRef::new(node, ports::VALUE))?;
                let second = self.connect(PortRef::new(node, ports::RESULT), input)?;
                Ok(ConnectOutcome::Converted {
                    node,
                    connections: [first, second],
                })
            }
            Compatibility::Incompatible => Err(CoreError::InvalidConnection {
                from: output,
                to: input,
                reason: "incompatible types".into(),
            }),
        }
    }

    /// Classifies a prospective connection between two value ports.
    ///
    /// Flow ports are always assignable to each other.
    pub fn check_compatibility(
        &self,
        from: &PortRef,
        to: &PortRef,
        registry: &TypeRegistry,
    ) -> Result<Compatibility, CoreError> {
        let from_port = self.port(from)?;
        let to_port = self.port(to)?;
        if from_port.kind.is_flow() && to_port.kind.is_flow() {
            return Ok(Compatibility::Assignable);
        }
        let (output, input) = if from_port.kind.is_input() { (to, from) } else { (from, to) };
        // An unconnected auto port takes the type of whatever it meets first.
        for end in [output, input] {
            if self.port(end)?.ty.is_auto() && !self.is_connected(end) {
                return Ok(Compatibility::Assignable);
            }
        }
        let out_ty = self.port_type(output).unwrap_or(TypeName::OBJECT);
        let in_ty = self.port_type(input).unwrap_or(TypeName::OBJECT);
        Ok(compatibility(&out_ty, &in_ty, registry))
    }

    /// Removes one connection. Returns `false` if it did not exist.
    pub fn disconnect(&mut self, id: ConnectionId) -> bool {
        match self.connections.shift_remove(&id) {
            Some(conn) => {
                self.detach_id(&conn.output, id);
                self.detach_id(&conn.input, id);
                true
            }
            None => false,
        }
    }

    /// Removes every connection attached to `port`, dangling ones included.
    pub fn clear_connections(&mut self, port: &PortRef) {
        let ids: Vec<ConnectionId> = match self.port(port) {
            Ok(p) => p.connections.to_vec(),
            Err(_) => return,
        };
        for id in ids {
            if !self.disconnect(id) {
                self.detach_id(port, id);
            }
        }
    }

    /// Removes the connections of every port on `node`.
    pub(crate) fn clear_element_connections(&mut self, node: ElementId) {
        let port_ids: Vec<_> = match self.get(node).and_then(|el| el.as_node()) {
            Some(data) => data.ports().iter().map(|p| p.id.clone()).collect(),
            None => return,
        };
        for port in port_ids {
            self.clear_connections(&PortRef::new(node, port));
        }
    }

    /// Drops dangling connection ids from `port`. Returns how many were removed.
    pub fn prune_dangling(&mut self, port: &PortRef) -> usize {
        let ids: Vec<ConnectionId> = match self.port(port) {
            Ok(p) => p.connections.to_vec(),
            Err(_) => return 0,
        };
        let mut removed = 0;
        for id in ids {
            if self.is_dangling(id) {
                if let Some(conn) = self.connections.shift_remove(&id) {
                    self.detach_id(&conn.output, id);
                    self.detach_id(&conn.input, id);
                } else {
                    self.detach_id(port, id);
                }
                removed += 1;
            }
        }
        removed
    }

    /// Drops every dangling connection in the graph, from the table and from
    /// port lists. Returns how many were removed.
    pub fn prune_all_dangling(&mut self) -> usize {
        let mut removed = 0;
        let table: Vec<ConnectionId> = self.connections.keys().copied().collect();
        for id in table {
            if self.is_dangling(id) {
                if let Some(conn) = self.connections.shift_remove(&id) {
                    self.detach_id(&conn.output, id);
                    self.detach_id(&conn.input, id);
                }
                removed += 1;
            }
        }
        let mut ports = Vec::new();
        for el in self.elements() {
            if let Some(node) = el.as_node() {
                for p in node.ports() {
                    ports.push(PortRef::new(el.id(), p.id.clone()));
                }
            }
        }
        for port in ports {
            removed += self.prune_dangling(&port);
        }
        removed
    }

    // -----------------------------------------------------------------------
    // Static typing
    // -----------------------------------------------------------------------

    /// Static type of a value port; `None` for flow ports and missing ports.
    ///
    /// Auto ports take the type of the first connected peer whose own port
    /// type is not auto, then fall back to their declared type and finally
    /// to `object`. Dynamic ports ask their node.
    pub fn port_type(&self, port: &PortRef) -> Option<TypeName> {
        self.resolve_port_type(port, 0)
    }

    fn resolve_port_type(&self, port: &PortRef, depth: usize) -> Option<TypeName> {
        let p = self.port(port).ok()?;
        if depth > MAX_TYPE_DEPTH {
            return Some(TypeName::OBJECT);
        }
        match &p.ty {
            PortType::Flow => None,
            PortType::Fixed(ty) => Some(ty.clone()),
            PortType::Dynamic => Some(self.dynamic_port_type(port, depth)),
            PortType::Auto { declared } => {
                for peer in self.connected_peers(port) {
                    let peer_is_auto = self.port(&peer).map(|pp| pp.ty.is_auto()).unwrap_or(true);
                    if peer_is_auto {
                        continue;
                    }
                    if let Some(ty) = self.resolve_port_type(&peer, depth + 1) {
                        return Some(ty);
                    }
                }
                Some(declared.clone().unwrap_or(TypeName::OBJECT))
            }
        }
    }

    fn dynamic_port_type(&self, port: &PortRef, depth: usize) -> TypeName {
        let Ok(node) = self.node(port.node) else {
            return TypeName::OBJECT;
        };
        let name = port.port.as_str();
        match &node.kind {
            NodeKind::Literal { value } => value.declared_type(self).unwrap_or(TypeName::OBJECT),
            NodeKind::Member { target, .. } if name == ports::VALUE => {
                target.declared_type(self).unwrap_or(TypeName::OBJECT)
            }
            NodeKind::Operator { op } if name == ports::RESULT => {
                if op.yields_bool() {
                    TypeName::BOOL
                } else {
                    self.resolve_port_type(&PortRef::new(port.node, ports::A), depth + 1)
                        .unwrap_or(TypeName::OBJECT)
                }
            }
            _ => TypeName::OBJECT,
        }
    }

    /// Kind of the port referenced by `port`, if it exists.
    pub fn port_kind(&self, port: &PortRef) -> Option<PortKind> {
        self.port(port).ok().map(|p| p.kind)
    }
}
