//! Executable node kinds and their port layouts.
//!
//! Every node is a [`GraphElement`](crate::element::GraphElement) whose kind
//! is [`ElementKind::Node`](crate::element::ElementKind::Node) wrapping a
//! [`NodeData`]: the closed [`NodeKind`] plus the ports built for it. Port
//! layouts are derived from the kind once, when the node is created; port ids
//! are the string constants in [`ports`].

use serde::{Deserialize, Serialize};

use crate::graph::Graph;
use crate::id::PortId;
use crate::member::MemberData;
use crate::port::{Port, PortKind, PortType};
use crate::types::{ParamMode, TypeName};
use crate::value::Value;

/// Well-known port ids.
pub mod ports {
    pub const ENTER: &str = "enter";
    pub const EXIT: &str = "exit";
    pub const VALUE: &str = "value";
    pub const INSTANCE: &str = "instance";
    pub const CONDITION: &str = "condition";
    pub const TRUE: &str = "true";
    pub const FALSE: &str = "false";
    pub const BODY: &str = "body";
    pub const INDEX: &str = "index";
    pub const START: &str = "start";
    pub const END: &str = "end";
    pub const STEP: &str = "step";
    pub const A: &str = "a";
    pub const B: &str = "b";
    pub const RESULT: &str = "result";

    /// Input port carrying the `index`-th call argument.
    pub fn arg(index: usize) -> String {
        format!("arg{index}")
    }

    /// Output port exposing the post-call value of a ref/out argument.
    pub fn out(index: usize) -> String {
        format!("out{index}")
    }

    /// The `index`-th output of a sequence node.
    pub fn then(index: usize) -> String {
        format!("then{index}")
    }
}

/// Control-flow instruction carried out of a nested scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JumpKind {
    Break,
    Continue,
    Return,
}

/// How long a `Wait` node suspends its routine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WaitSpec {
    Frames(u32),
    Seconds(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorKind {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
}

impl OperatorKind {
    /// Comparison and logical operators always produce `bool`.
    pub fn yields_bool(self) -> bool {
        !matches!(
            self,
            OperatorKind::Add
                | OperatorKind::Subtract
                | OperatorKind::Multiply
                | OperatorKind::Divide
                | OperatorKind::Modulo
        )
    }
}

/// The closed set of built-in node behaviours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeKind {
    /// Entry point fired by a host event (`"Start"`, `"Update"`, ...).
    EventEntry { event: String },
    /// Entry point of the enclosing function's body.
    FunctionEntry,
    /// Produces the value of a literal-family member.
    Literal { value: MemberData },
    /// Gets a value from, or invokes, any member target. With `flow` the
    /// call happens when the node is entered and the result is cached per
    /// instance; without it the member is evaluated on every read.
    Member { target: MemberData, flow: bool },
    /// Assigns the `value` input to the target.
    SetValue { target: MemberData },
    Branch,
    Sequence { count: u16 },
    /// Counts `index` from `start` while `index < end`, by `step`.
    ForLoop,
    While,
    /// Break or continue the nearest enclosing loop.
    Jump { kind: JumpKind },
    /// Return from the enclosing function, optionally with a value.
    Return { has_value: bool },
    /// Suspends the routine until the scheduler resumes it.
    Wait { wait: WaitSpec },
    Operator { op: OperatorKind },
    /// Adapter inserted between convertible value ports.
    Convert { to: TypeName },
    /// Reroute point for a value wire. Both ports are auto-typed and fall
    /// back to `ty` (or `object`) when no typed peer pins them.
    Relay { ty: Option<TypeName> },
    /// Starts `body` as an independent state routine and continues on
    /// `exit` without waiting for it.
    StateEntry,
    /// Appends the `value` input to the instance output log.
    Print,
}

impl NodeKind {
    /// Builds the port layout for this kind.
    ///
    /// Member-driven kinds consult `graph` for graph-native signatures
    /// (function parameters, variable types).
    pub fn build_ports(&self, graph: &Graph) -> Vec<Port> {
        use ports::*;
        match self {
            NodeKind::EventEntry { .. } | NodeKind::FunctionEntry => vec![Port::flow_output(EXIT)],
            NodeKind::Literal { .. } => vec![Port::value_output(VALUE, PortType::Dynamic)],
            NodeKind::Member { target, flow } => {
                let mut out = Vec::new();
                if *flow {
                    out.push(Port::flow_input(ENTER));
                    out.push(Port::flow_output(EXIT));
                }
                member_ports(target, graph, &mut out);
                let returns = target
                    .declared_type(graph)
                    .is_some_and(|t| t != TypeName::VOID);
                if returns {
                    out.push(Port::value_output(VALUE, PortType::Dynamic));
                }
                out
            }
            NodeKind::SetValue { target } => {
                let mut out = vec![Port::flow_input(ENTER), Port::flow_output(EXIT)];
                member_ports(target, graph, &mut out);
                let ty = target.declared_type(graph).unwrap_or(TypeName::OBJECT);
                out.push(Port::value_input(VALUE, PortType::Fixed(ty)));
                out
            }
            NodeKind::Branch => vec![
                Port::flow_input(ENTER),
                Port::value_input(CONDITION, PortType::Fixed(TypeName::BOOL)).with_default(Value::Bool(false)),
                Port::flow_output(TRUE),
                Port::flow_output(FALSE),
                Port::flow_output(EXIT),
            ],
            NodeKind::Sequence { count } => {
                let mut out = vec![Port::flow_input(ENTER)];
                for i in 0..usize::from(*count) {
                    out.push(Port::flow_output(&then(i)));
                }
                out
            }
            NodeKind::ForLoop => vec![
                Port::flow_input(ENTER),
                Port::value_input(START, PortType::Fixed(TypeName::I32)).with_default(Value::I32(0)),
                Port::value_input(END, PortType::Fixed(TypeName::I32)).with_default(Value::I32(0)),
                Port::value_input(STEP, PortType::Fixed(TypeName::I32)).with_default(Value::I32(1)),
                Port::flow_output(BODY),
                Port::flow_output(EXIT),
                Port::value_output(INDEX, PortType::Fixed(TypeName::I32)),
            ],
            NodeKind::While => vec![
                Port::flow_input(ENTER),
                Port::value_input(CONDITION, PortType::Fixed(TypeName::BOOL)).with_default(Value::Bool(false)),
                Port::flow_output(BODY),
                Port::flow_output(EXIT),
            ],
            NodeKind::Jump { .. } => vec![Port::flow_input(ENTER)],
            NodeKind::Return { has_value } => {
                let mut out = vec![Port::flow_input(ENTER)];
                if *has_value {
                    out.push(Port::value_input(VALUE, PortType::auto()));
                }
                out
            }
            NodeKind::Wait { .. } => vec![Port::flow_input(ENTER), Port::flow_output(EXIT)],
            NodeKind::Operator { .. } => vec![
                Port::value_input(A, PortType::auto()),
                Port::value_input(B, PortType::auto()),
                Port::value_output(RESULT, PortType::Dynamic),
            ],
            NodeKind::Convert { to } => vec![
                Port::value_input(VALUE, PortType::auto()),
                Port::value_output(RESULT, PortType::Fixed(to.clone())),
            ],
            NodeKind::Relay { ty } => vec![
                Port::value_input(VALUE, PortType::Auto { declared: ty.clone() }),
                Port::value_output(RESULT, PortType::Auto { declared: ty.clone() }),
            ],
            NodeKind::StateEntry => vec![
                Port::flow_input(ENTER),
                Port::flow_output(BODY),
                Port::flow_output(EXIT),
            ],
            NodeKind::Print => vec![
                Port::flow_input(ENTER),
                Port::value_input(VALUE, PortType::Fixed(TypeName::OBJECT)),
                Port::flow_output(EXIT),
            ],
        }
    }

    /// Returns `true` for kinds executed by entering a flow input.
    pub fn is_flow_node(&self) -> bool {
        match self {
            NodeKind::EventEntry { .. }
            | NodeKind::FunctionEntry
            | NodeKind::Literal { .. }
            | NodeKind::Operator { .. }
            | NodeKind::Convert { .. }
            | NodeKind::Relay { .. } => false,
            NodeKind::Member { flow, .. } => *flow,
            _ => true,
        }
    }

    /// Returns `true` for kinds that own a nested scope and consume jumps.
    pub fn is_loop(&self) -> bool {
        matches!(self, NodeKind::ForLoop | NodeKind::While)
    }

    /// The member target this node resolves, if any.
    pub fn member(&self) -> Option<&MemberData> {
        match self {
            NodeKind::Literal { value } => Some(value),
            NodeKind::Member { target, .. } | NodeKind::SetValue { target } => Some(target),
            _ => None,
        }
    }
}

fn member_ports(target: &MemberData, graph: &Graph, out: &mut Vec<Port>) {
    if let Some(declaring) = target.instance_port_type() {
        out.push(Port::value_input(ports::INSTANCE, PortType::Fixed(declaring)));
    }
    for (i, param) in target.parameters(graph).into_iter().enumerate() {
        if param.mode != ParamMode::Out {
            out.push(
                Port::value_input(&ports::arg(i), PortType::Fixed(param.ty.clone()))
                    .with_default(Value::default_for(&param.ty)),
            );
        }
        if param.mode.writes_back() {
            out.push(Port::value_output(&ports::out(i), PortType::Fixed(param.ty)));
        }
    }
}

/// Node payload: behaviour plus its ports in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeData {
    pub kind: NodeKind,
    pub(crate) ports: Vec<Port>,
}

impl NodeData {
    pub fn new(kind: NodeKind, ports: Vec<Port>) -> Self {
        NodeData { kind, ports }
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn port(&self, id: &PortId) -> Option<&Port> {
        self.ports.iter().find(|p| p.id == *id)
    }

    pub(crate) fn port_mut(&mut self, id: &PortId) -> Option<&mut Port> {
        self.ports.iter_mut().find(|p| p.id == *id)
    }

    pub fn ports_of_kind(&self, kind: PortKind) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(move |p| p.kind == kind)
    }
}
