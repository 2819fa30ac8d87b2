//! Value-port evaluation.
//!
//! Value outputs are pulled on demand. Literals, operators, conversions, relays
//! and pure member nodes compute their value on every read; outputs of flow nodes
//! (member results, `out` arguments, loop indices) read the value cached when
//! the node last executed, or `null` if it never did.

use flowgraph_core::convert::auto_convert;
use flowgraph_core::node::ports;
use flowgraph_core::{ElementId, Graph, MemberData, NodeKind, ParamMode, PortId, PortKind, PortRef, Value};

use super::GraphInstance;
use crate::error::RuntimeError;
use crate::ops::{eval_operator, OpFault};

impl GraphInstance {
    /// Value arriving at input `port` of `node`: the connected output,
    /// converted to the input's type, or the input's default.
    pub(super) fn input_value(&mut self, graph: &Graph, node: ElementId, port: &str) -> Result<Value, RuntimeError> {
        let input = PortRef::new(node, port);
        let value = match graph.connected_peers(&input).into_iter().next() {
            Some(peer) => {
                let raw = self.output_value(graph, &peer)?;
                match graph.port_type(&input) {
                    Some(ty) => auto_convert(raw, &ty, &self.registry),
                    None => raw,
                }
            }
            None => graph
                .port(&input)?
                .default
                .as_ref()
                .map(Value::duplicate)
                .unwrap_or_default(),
        };
        if self.config.trace_enabled && self.eval_depth == 0 {
            self.traced_inputs.push((input.port, value.clone()));
        }
        Ok(value)
    }

    /// Current value of the value output `port`.
    pub(super) fn output_value(&mut self, graph: &Graph, port: &PortRef) -> Result<Value, RuntimeError> {
        if self.eval_depth >= self.config.max_call_depth {
            return Err(RuntimeError::RecursionLimitExceeded {
                graph: graph.name.clone(),
                node: port.node,
                limit: self.config.max_call_depth,
            });
        }
        self.eval_depth += 1;
        let value = self.evaluate(graph, port);
        self.eval_depth -= 1;
        value
    }

    fn evaluate(&mut self, graph: &Graph, port: &PortRef) -> Result<Value, RuntimeError> {
        let node = port.node;
        match &graph.node(node)?.kind {
            NodeKind::Literal { value } => value.get(self).map_err(|e| RuntimeError::member(&graph.name, node, e)),
            NodeKind::Operator { op } => {
                let a = self.input_value(graph, node, ports::A)?;
                let b = self.input_value(graph, node, ports::B)?;
                eval_operator(*op, &a, &b).map_err(|fault| operator_error(graph, node, fault))
            }
            NodeKind::Convert { to } => {
                let value = self.input_value(graph, node, ports::VALUE)?;
                Ok(auto_convert(value, to, &self.registry))
            }
            NodeKind::Relay { .. } => self.input_value(graph, node, ports::VALUE),
            NodeKind::Member { target, flow: false } => {
                let (result, args) = self.call_member(graph, node, target)?;
                Ok(select_output(&port.port, result, args))
            }
            _ => Ok(self
                .outputs
                .get(&(self.runtime_id(node), port.port.clone()))
                .cloned()
                .unwrap_or_default()),
        }
    }

    /// Reads any port: inputs through [`Self::input_value`], outputs
    /// through [`Self::output_value`].
    pub(super) fn port_in(&mut self, graph: &Graph, port: &PortRef) -> Result<Value, RuntimeError> {
        match graph.port(port)?.kind {
            PortKind::ValueInput => self.input_value(graph, port.node, port.port.as_str()),
            PortKind::ValueOutput => self.output_value(graph, port),
            PortKind::FlowInput | PortKind::FlowOutput => Err(RuntimeError::Internal {
                message: format!("port {}:{} carries no value", port.node, port.port.as_str()),
            }),
        }
    }

    // ---- Member nodes ----

    /// Invokes the member `target` of `node` with its instance and argument
    /// inputs. Returns the result and the post-call arguments.
    pub(super) fn call_member(
        &mut self,
        graph: &Graph,
        node: ElementId,
        target: &MemberData,
    ) -> Result<(Value, Vec<Value>), RuntimeError> {
        let instance = self.instance_input(graph, node, target)?;
        let mut args = self.member_args(graph, node, target)?;
        let result = target
            .invoke(self, instance, &mut args)
            .map_err(|e| RuntimeError::member(&graph.name, node, e))?;
        Ok((result, args))
    }

    /// Receiver override from the `instance` input; `None` when the input is
    /// absent or unconnected, so the member's own receiver applies.
    pub(super) fn instance_input(
        &mut self,
        graph: &Graph,
        node: ElementId,
        target: &MemberData,
    ) -> Result<Option<Value>, RuntimeError> {
        if target.instance_port_type().is_none() || !graph.is_connected(&PortRef::new(node, ports::INSTANCE)) {
            return Ok(None);
        }
        self.input_value(graph, node, ports::INSTANCE).map(Some)
    }

    /// Argument values for `target`: inputs for `in`/`ref` parameters,
    /// type defaults for `out` parameters.
    pub(super) fn member_args(
        &mut self,
        graph: &Graph,
        node: ElementId,
        target: &MemberData,
    ) -> Result<Vec<Value>, RuntimeError> {
        let params = target.parameters(graph);
        let mut args = Vec::with_capacity(params.len());
        for (i, param) in params.iter().enumerate() {
            let value = match param.mode {
                ParamMode::Out => Value::default_for(&param.ty),
                ParamMode::In | ParamMode::Ref => self.input_value(graph, node, &ports::arg(i))?,
            };
            args.push(value);
        }
        Ok(args)
    }

    /// Caches a flow member's result and written-back arguments.
    pub(super) fn store_member_outputs(
        &mut self,
        graph: &Graph,
        node: ElementId,
        target: &MemberData,
        result: &Value,
        args: &[Value],
    ) {
        let owner = self.runtime_id(node);
        self.outputs.insert((owner, PortId::new(ports::VALUE)), result.clone());
        for (i, param) in target.parameters(graph).iter().enumerate() {
            if let (true, Some(value)) = (param.mode.writes_back(), args.get(i)) {
                self.outputs.insert((owner, PortId::new(ports::out(i))), value.clone());
            }
        }
    }
}

/// Picks `value` or `out{i}` from a member call.
fn select_output(port: &PortId, result: Value, args: Vec<Value>) -> Value {
    if port.as_str() == ports::VALUE {
        return result;
    }
    port.as_str()
        .strip_prefix("out")
        .and_then(|i| i.parse::<usize>().ok())
        .and_then(|i| args.into_iter().nth(i))
        .unwrap_or_default()
}

fn operator_error(graph: &Graph, node: ElementId, fault: OpFault) -> RuntimeError {
    let graph = graph.name.clone();
    match fault {
        OpFault::TypeMismatch { expected, got } => RuntimeError::TypeMismatch {
            graph,
            node,
            expected,
            got,
        },
        OpFault::DivideByZero => RuntimeError::DivideByZero { graph, node },
        OpFault::Overflow => RuntimeError::IntegerOverflow { graph, node },
    }
}
