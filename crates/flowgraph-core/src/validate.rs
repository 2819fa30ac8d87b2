//! Whole-graph static validation.
//!
//! [`validate_graph`] walks every node and connection and reports all
//! problems at once instead of stopping at the first one. Errors make the
//! graph unrunnable in places; warnings flag suspicious but executable
//! structure.

use serde::{Deserialize, Serialize};

use crate::convert::{compatibility, Compatibility};
use crate::graph::Graph;
use crate::id::{ConnectionId, ElementId, PortRef};
use crate::node::{ports, NodeKind};
use crate::port::PortKind;
use crate::reflect::TypeRegistry;
use crate::types::TypeName;

/// A problem found by [`validate_graph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum GraphDiagnostic {
    /// A node's member reference is malformed or does not resolve.
    #[error("node {node}: member '{member}' does not resolve: {reason}")]
    UnresolvedMember {
        node: ElementId,
        member: String,
        reason: String,
    },

    /// A set node targets something that cannot be written.
    #[error("node {node}: member '{member}' is not writable")]
    NotWritable { node: ElementId, member: String },

    /// A reflected instance member has nothing connected to its instance port.
    #[error("node {node}: instance port of '{member}' is not connected")]
    MissingInstance { node: ElementId, member: String },

    /// A connected value pair has no assignment or conversion rule.
    #[error("connection {connection} ({from} -> {to}): {actual} is not compatible with {expected}")]
    IncompatibleConnection {
        connection: ConnectionId,
        from: PortRef,
        to: PortRef,
        expected: TypeName,
        actual: TypeName,
    },

    /// A connected value pair relies on runtime conversion.
    #[error("connection {connection} ({from} -> {to}) converts {actual} to {expected} at runtime")]
    ImplicitConversion {
        connection: ConnectionId,
        from: PortRef,
        to: PortRef,
        expected: TypeName,
        actual: TypeName,
    },

    /// A connection table entry that its ports no longer agree with.
    #[error("connection {connection} is dangling")]
    DanglingConnection { connection: ConnectionId },

    /// A function without a `FunctionEntry` node cannot be called.
    #[error("function {function} ('{name}') has no entry node")]
    MissingFunctionEntry { function: ElementId, name: String },

    /// A flow node that no flow output leads to.
    #[error("node {node} ('{name}') is never entered")]
    UnreachableNode { node: ElementId, name: String },
}

impl GraphDiagnostic {
    /// Warnings do not prevent execution.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            GraphDiagnostic::ImplicitConversion { .. }
                | GraphDiagnostic::DanglingConnection { .. }
                | GraphDiagnostic::UnreachableNode { .. }
        )
    }
}

/// Validates the whole graph and reports every diagnostic found.
///
/// Returns an empty `Vec` if the graph is clean.
pub fn validate_graph(graph: &Graph, registry: &TypeRegistry) -> Vec<GraphDiagnostic> {
    let mut out = Vec::new();

    for id in graph.walk() {
        let Some(element) = graph.get(id) else {
            continue;
        };
        if element.as_function().is_some() && graph.function_entry(id).is_none() {
            out.push(GraphDiagnostic::MissingFunctionEntry {
                function: id,
                name: element.name.clone(),
            });
        }
        let Some(node) = element.as_node() else {
            continue;
        };
        if let Some(member) = node.kind.member() {
            check_member(graph, registry, id, &node.kind, member, &mut out);
        }
        if node.kind.is_flow_node() {
            let entered = node
                .ports_of_kind(PortKind::FlowInput)
                .any(|p| graph.is_connected(&PortRef::new(id, p.id.clone())));
            if !entered {
                out.push(GraphDiagnostic::UnreachableNode {
                    node: id,
                    name: element.name.clone(),
                });
            }
        }
    }

    for conn in graph.connections.values() {
        if graph.is_dangling(conn.id) {
            out.push(GraphDiagnostic::DanglingConnection { connection: conn.id });
            continue;
        }
        if graph.port_kind(&conn.output) != Some(PortKind::ValueOutput) {
            continue;
        }
        let (Some(actual), Some(expected)) = (graph.port_type(&conn.output), graph.port_type(&conn.input)) else {
            continue;
        };
        match compatibility(&actual, &expected, registry) {
            Compatibility::Assignable => {}
            Compatibility::Convertible => out.push(GraphDiagnostic::ImplicitConversion {
                connection: conn.id,
                from: conn.output.clone(),
                to: conn.input.clone(),
                expected,
                actual,
            }),
            Compatibility::Incompatible => out.push(GraphDiagnostic::IncompatibleConnection {
                connection: conn.id,
                from: conn.output.clone(),
                to: conn.input.clone(),
                expected,
                actual,
            }),
        }
    }

    out
}

fn check_member(
    graph: &Graph,
    registry: &TypeRegistry,
    node: ElementId,
    kind: &NodeKind,
    member: &crate::member::MemberData,
    out: &mut Vec<GraphDiagnostic>,
) {
    let name = member.display_name(graph).to_string();
    let failure = member
        .validate()
        .and_then(|()| member.get_members(graph, registry, true).map(|_| ()));
    if let Err(err) = failure {
        out.push(GraphDiagnostic::UnresolvedMember {
            node,
            member: name,
            reason: err.to_string(),
        });
        return;
    }
    if matches!(kind, NodeKind::SetValue { .. }) && !member.can_set_value(graph, registry) {
        out.push(GraphDiagnostic::NotWritable {
            node,
            member: name.clone(),
        });
    }
    if member.instance_port_type().is_some() && !graph.is_connected(&PortRef::new(node, ports::INSTANCE)) {
        out.push(GraphDiagnostic::MissingInstance { node, member: name });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ContainerKind, FunctionDecl, GraphElement, ElementKind};
    use crate::member::{MemberData, MemberItem};
    use crate::value::Value;

    #[test]
    fn clean_graph_has_no_diagnostics() {
        let mut graph = Graph::new("g");
        let main = graph.container(ContainerKind::Main);
        let start = graph
            .add_node(main, "start", NodeKind::EventEntry { event: "Start".into() })
            .unwrap();
        let print = graph.add_node(main, "print", NodeKind::Print).unwrap();
        graph
            .connect(PortRef::new(start, ports::EXIT), PortRef::new(print, ports::ENTER))
            .unwrap();
        assert!(validate_graph(&graph, &TypeRegistry::new()).is_empty());
    }

    #[test]
    fn reports_every_problem() {
        let registry = TypeRegistry::new();
        let mut graph = Graph::new("g");
        let main = graph.container(ContainerKind::Main);
        let functions = graph.container(ContainerKind::Functions);
        graph
            .add_element(
                functions,
                GraphElement::new("orphan", ElementKind::Function(FunctionDecl::new(Vec::new(), TypeName::VOID))),
            )
            .unwrap();
        graph
            .add_node(
                main,
                "missing",
                NodeKind::Member {
                    target: MemberData::reflected(vec![MemberItem::field("Nope", "x", TypeName::I32)]),
                    flow: false,
                },
            )
            .unwrap();
        graph
            .add_node(
                main,
                "set literal",
                NodeKind::SetValue {
                    target: MemberData::create_from_value(Value::I32(1)),
                },
            )
            .unwrap();

        let diagnostics = validate_graph(&graph, &registry);
        assert!(diagnostics
            .iter()
            .any(|d| matches!(d, GraphDiagnostic::MissingFunctionEntry { name, .. } if name == "orphan")));
        assert!(diagnostics
            .iter()
            .any(|d| matches!(d, GraphDiagnostic::UnresolvedMember { .. })));
        assert!(diagnostics.iter().any(|d| matches!(d, GraphDiagnostic::NotWritable { .. })));
        assert!(diagnostics
            .iter()
            .any(|d| matches!(d, GraphDiagnostic::UnreachableNode { .. }) && d.is_warning()));
    }

    #[test]
    fn flags_runtime_conversions() {
        let registry = TypeRegistry::new();
        let mut graph = Graph::new("g");
        let main = graph.container(ContainerKind::Main);
        let lit = graph
            .add_node(
                main,
                "lit",
                NodeKind::Literal {
                    value: MemberData::create_from_value(Value::F64(2.5)),
                },
            )
            .unwrap();
        let looped = graph.add_node(main, "loop", NodeKind::ForLoop).unwrap();
        graph
            .connect(PortRef::new(lit, ports::VALUE), PortRef::new(looped, ports::END))
            .unwrap();
        let diagnostics = validate_graph(&graph, &registry);
        assert!(diagnostics.iter().any(|d| matches!(
            d,
            GraphDiagnostic::ImplicitConversion { expected, actual, .. }
                if *expected == TypeName::I32 && *actual == TypeName::F64
        )));
    }
}
