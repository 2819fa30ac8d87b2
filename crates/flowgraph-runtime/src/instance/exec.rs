//! Flow execution.
//!
//! A routine is an explicit frame stack. Entering a flow input pushes an
//! `Enter` frame; scope-owning nodes (loops, sequences) push their own frame
//! and re-schedule themselves after each child scope, and branches push their
//! `exit` continuation below the taken arm. A node either continues, raises a
//! [`JumpSignal`], or suspends. Jumps unwind the stack until a scope owner
//! consumes them: loops take `Break` and `Continue`, the routine base takes
//! `Return`. Suspension parks the whole routine; nothing else is captured.

use std::collections::HashMap;
use std::rc::Rc;

use flowgraph_core::convert::auto_convert;
use flowgraph_core::node::ports;
use flowgraph_core::{
    ElementId, Graph, JumpKind, MemberError, NodeKind, PortKind, PortRef, RuntimeId, TypeName, Value, WaitSpec,
};

use super::{CallFrame, GraphInstance};
use crate::error::RuntimeError;
use crate::jump::JumpSignal;
use crate::scheduler::RoutineId;
use crate::state::{FlowState, StateKey};
use crate::trace::TraceEntry;

#[derive(Debug, Clone)]
pub(super) enum Frame {
    /// Execute the node owning this flow input.
    Enter(PortRef),
    /// Next iteration check of a `ForLoop`.
    Loop {
        node: ElementId,
        index: i64,
        end: i64,
        step: i64,
        iterations: usize,
    },
    /// Next condition check of a `While`.
    While { node: ElementId, iterations: usize },
    /// Next output of a `Sequence`.
    Sequence { node: ElementId, next: usize, count: usize },
}

impl Frame {
    fn is_loop(&self) -> bool {
        matches!(self, Frame::Loop { .. } | Frame::While { .. })
    }
}

/// A flow execution in progress.
#[derive(Debug)]
pub(super) struct Routine {
    pub(super) id: RoutineId,
    pub(super) layer: usize,
    /// Snapshot the frames refer to.
    pub(super) snapshot: Rc<Graph>,
    frames: Vec<Frame>,
    /// State record this routine drives, for state-flow routines.
    state: Option<StateKey>,
}

impl Routine {
    pub(super) fn new(id: RoutineId, layer: usize, snapshot: Rc<Graph>) -> Self {
        Routine {
            id,
            layer,
            snapshot,
            frames: Vec::new(),
            state: None,
        }
    }

    /// Schedules the input connected to `node`'s flow output `port`, if any.
    pub(super) fn follow(&mut self, graph: &Graph, node: ElementId, port: &str) {
        if let Some(target) = graph.connected_peers(&PortRef::new(node, port)).into_iter().next() {
            self.frames.push(Frame::Enter(target));
        }
    }
}

/// How a routine stopped running.
#[derive(Debug)]
pub(super) enum Outcome {
    /// Ran out of frames, or returned with an optional value.
    Completed(Option<Value>),
    /// Reached a `Wait` node.
    Suspended { node: ElementId, wait: WaitSpec },
    /// Its state record was stopped from outside.
    Stopped,
}

enum Step {
    Next,
    Jump(JumpSignal),
    Suspend(ElementId, WaitSpec),
}

impl GraphInstance {
    /// Runs `routine` until it completes, suspends or is stopped.
    pub(super) fn drive(&mut self, routine: &mut Routine) -> Result<Outcome, RuntimeError> {
        let active = std::mem::replace(&mut self.active, routine.layer);
        let inputs = std::mem::take(&mut self.traced_inputs);
        let result = self.drive_frames(routine);
        self.traced_inputs = inputs;
        self.active = active;
        result
    }

    fn drive_frames(&mut self, routine: &mut Routine) -> Result<Outcome, RuntimeError> {
        loop {
            if let Some(key) = &routine.state {
                if !self.runner.is_current(key, routine.id) {
                    tracing::debug!(routine = %routine.id, "state stopped, routine ends");
                    return Ok(Outcome::Stopped);
                }
            }
            let Some(frame) = routine.frames.pop() else {
                return Ok(Outcome::Completed(None));
            };
            match self.step(routine, frame)? {
                Step::Next => {}
                Step::Jump(signal) => {
                    if let Some(outcome) = unwind(routine, signal) {
                        return Ok(outcome);
                    }
                }
                Step::Suspend(node, wait) => return Ok(Outcome::Suspended { node, wait }),
            }
        }
    }

    fn step(&mut self, routine: &mut Routine, frame: Frame) -> Result<Step, RuntimeError> {
        let graph = Rc::clone(&routine.snapshot);
        self.traced_inputs.clear();
        match frame {
            Frame::Enter(port) => self.enter(routine, &graph, port.node),
            Frame::Loop {
                node,
                index,
                end,
                step,
                iterations,
            } => {
                let more = if step < 0 { index > end } else { index < end };
                if !more {
                    routine.follow(&graph, node, ports::EXIT);
                    return Ok(Step::Next);
                }
                self.check_iterations(&graph, node, iterations)?;
                let key = (self.runtime_id(node), ports::INDEX.into());
                self.outputs.insert(key, Value::I32(index as i32));
                routine.frames.push(Frame::Loop {
                    node,
                    index: index + step,
                    end,
                    step,
                    iterations: iterations + 1,
                });
                routine.follow(&graph, node, ports::BODY);
                Ok(Step::Next)
            }
            Frame::While { node, iterations } => {
                if self.input_bool(&graph, node, ports::CONDITION)? {
                    self.check_iterations(&graph, node, iterations)?;
                    routine.frames.push(Frame::While {
                        node,
                        iterations: iterations + 1,
                    });
                    routine.follow(&graph, node, ports::BODY);
                } else {
                    routine.follow(&graph, node, ports::EXIT);
                }
                Ok(Step::Next)
            }
            Frame::Sequence { node, next, count } => {
                if next < count {
                    routine.frames.push(Frame::Sequence {
                        node,
                        next: next + 1,
                        count,
                    });
                    routine.follow(&graph, node, &ports::then(next));
                }
                Ok(Step::Next)
            }
        }
    }

    fn check_iterations(&self, graph: &Graph, node: ElementId, iterations: usize) -> Result<(), RuntimeError> {
        if iterations >= self.config.max_loop_iterations {
            return Err(RuntimeError::LoopLimitExceeded {
                graph: graph.name.clone(),
                node,
                limit: self.config.max_loop_iterations,
            });
        }
        Ok(())
    }

    /// Executes the flow node `node`.
    fn enter(&mut self, routine: &mut Routine, graph: &Graph, node: ElementId) -> Result<Step, RuntimeError> {
        let data = graph.node(node)?;
        let mut output = None;
        let step = match &data.kind {
            NodeKind::EventEntry { .. } | NodeKind::FunctionEntry => {
                routine.follow(graph, node, ports::EXIT);
                Step::Next
            }
            NodeKind::Member { target, .. } => {
                let (result, args) = self.call_member(graph, node, target)?;
                self.store_member_outputs(graph, node, target, &result, &args);
                output = Some(result);
                routine.follow(graph, node, ports::EXIT);
                Step::Next
            }
            NodeKind::SetValue { target } => {
                let value = self.input_value(graph, node, ports::VALUE)?;
                let instance = self.instance_input(graph, node, target)?;
                let mut args = self.member_args(graph, node, target)?;
                target
                    .set_value(self, value.clone(), instance, &mut args)
                    .map_err(|e| RuntimeError::member(&graph.name, node, e))?;
                output = Some(value);
                routine.follow(graph, node, ports::EXIT);
                Step::Next
            }
            NodeKind::Branch => {
                let condition = self.input_bool(graph, node, ports::CONDITION)?;
                routine.follow(graph, node, ports::EXIT);
                routine.follow(graph, node, if condition { ports::TRUE } else { ports::FALSE });
                output = Some(Value::Bool(condition));
                Step::Next
            }
            NodeKind::Sequence { count } => {
                routine.frames.push(Frame::Sequence {
                    node,
                    next: 0,
                    count: usize::from(*count),
                });
                Step::Next
            }
            NodeKind::ForLoop => {
                let index = self.input_int(graph, node, ports::START)?;
                let end = self.input_int(graph, node, ports::END)?;
                let step = self.input_int(graph, node, ports::STEP)?;
                routine.frames.push(Frame::Loop {
                    node,
                    index,
                    end,
                    step,
                    iterations: 0,
                });
                Step::Next
            }
            NodeKind::While => {
                routine.frames.push(Frame::While { node, iterations: 0 });
                Step::Next
            }
            NodeKind::Jump { kind } => Step::Jump(JumpSignal::new(node, *kind)),
            NodeKind::Return { has_value } => {
                let value = if *has_value {
                    Some(self.input_value(graph, node, ports::VALUE)?)
                } else {
                    None
                };
                output = value.clone();
                Step::Jump(JumpSignal::returning(node, value))
            }
            NodeKind::Wait { wait } => {
                routine.follow(graph, node, ports::EXIT);
                Step::Suspend(node, *wait)
            }
            NodeKind::StateEntry => {
                self.start_state(routine.layer, &PortRef::new(node, ports::BODY))?;
                routine.follow(graph, node, ports::EXIT);
                Step::Next
            }
            NodeKind::Print => {
                let value = self.input_value(graph, node, ports::VALUE)?;
                tracing::info!(graph = %graph.name, node = %node, value = %value, "print");
                self.output.push(value.clone());
                output = Some(value);
                routine.follow(graph, node, ports::EXIT);
                Step::Next
            }
            NodeKind::Literal { .. }
            | NodeKind::Operator { .. }
            | NodeKind::Convert { .. }
            | NodeKind::Relay { .. } => {
                return Err(RuntimeError::Internal {
                    message: format!("node {node} in '{}' has no flow input", graph.name),
                });
            }
        };
        if self.config.trace_enabled {
            self.trace.push(TraceEntry {
                routine: routine.id,
                node,
                description: describe(&data.kind),
                inputs: std::mem::take(&mut self.traced_inputs),
                output,
            });
        }
        Ok(step)
    }

    fn input_bool(&mut self, graph: &Graph, node: ElementId, port: &str) -> Result<bool, RuntimeError> {
        let value = self.input_value(graph, node, port)?;
        value.as_bool().ok_or_else(|| RuntimeError::TypeMismatch {
            graph: graph.name.clone(),
            node,
            expected: TypeName::BOOL,
            got: value.type_name(),
        })
    }

    fn input_int(&mut self, graph: &Graph, node: ElementId, port: &str) -> Result<i64, RuntimeError> {
        let value = self.input_value(graph, node, port)?;
        value.as_i64().ok_or_else(|| RuntimeError::TypeMismatch {
            graph: graph.name.clone(),
            node,
            expected: TypeName::I32,
            got: value.type_name(),
        })
    }

    // ---- Routine lifecycle ----

    /// Drives `routine` and parks it if it suspends. Returns the routine id
    /// while parked.
    pub(super) fn continue_routine(&mut self, mut routine: Routine) -> Result<Option<RoutineId>, RuntimeError> {
        match self.drive(&mut routine) {
            Ok(Outcome::Suspended { node, wait }) => {
                let id = routine.id;
                tracing::debug!(routine = %id, node = %node, ?wait, "routine suspended");
                self.scheduler.schedule(id, wait);
                self.routines.insert(id, routine);
                Ok(Some(id))
            }
            Ok(Outcome::Completed(_) | Outcome::Stopped) => {
                self.finish_routine(&routine);
                Ok(None)
            }
            Err(err) => {
                self.finish_routine(&routine);
                Err(err)
            }
        }
    }

    fn finish_routine(&mut self, routine: &Routine) {
        if let Some(key) = &routine.state {
            self.runner.finish(key, routine.id);
        }
    }

    pub(super) fn resume_parked(&mut self, id: RoutineId) -> Result<(), RuntimeError> {
        let mut routine = self.routines.remove(&id).ok_or(RuntimeError::RoutineNotFound { routine: id })?;
        if let Some(key) = &routine.state {
            if !self.runner.is_current(key, id) {
                tracing::debug!(routine = %id, "stopped routine discarded");
                return Ok(());
            }
        }
        self.rebind_routine(&mut routine);
        self.continue_routine(routine).map(|_| ())
    }

    /// Moves a parked routine onto its layer's current snapshot. Frames
    /// whose node or port has no equivalent are dropped.
    fn rebind_routine(&mut self, routine: &mut Routine) {
        let current = Rc::clone(&self.layers[routine.layer].snapshot);
        if current.version() == routine.snapshot.version() {
            return;
        }
        let map = self.rebind_map(&routine.snapshot, &current);
        let before = routine.frames.len();
        routine.frames.retain_mut(|frame| match frame {
            Frame::Enter(port) => match map.port(&current, port, PortKind::FlowInput) {
                Some(rebound) => {
                    *port = rebound;
                    true
                }
                None => false,
            },
            Frame::Loop { node, .. } | Frame::While { node, .. } | Frame::Sequence { node, .. } => {
                match map.get(*node) {
                    Some(rebound) => {
                        *node = rebound;
                        true
                    }
                    None => false,
                }
            }
        });
        let dropped = before - routine.frames.len();
        if dropped > 0 {
            tracing::debug!(routine = %routine.id, dropped, "frames lost in rebind");
        }
        routine.snapshot = current;
    }

    /// Starts the input connected to flow output `output` of layer `layer`
    /// as a state routine, unless that input is already running.
    pub(super) fn start_state(&mut self, layer: usize, output: &PortRef) -> Result<FlowState, RuntimeError> {
        let snapshot = Rc::clone(&self.layers[layer].snapshot);
        let Some(input) = snapshot.connected_peers(output).into_iter().next() else {
            return Ok(FlowState::Idle);
        };
        let key = StateKey::new(RuntimeId::new(snapshot.uid(), input.node), input.port.clone());
        if !self.runner.can_start(&key) {
            tracing::debug!(node = %input.node, "state already running");
            return Ok(FlowState::Running);
        }
        let id = self.next_routine_id();
        self.runner.start(key.clone(), id);
        let mut routine = Routine::new(id, layer, snapshot);
        routine.state = Some(key.clone());
        routine.frames.push(Frame::Enter(input));
        self.continue_routine(routine)?;
        Ok(self.runner.state_of(&key))
    }

    // ---- Function calls ----

    /// Calls `function` of the active layer synchronously.
    pub(super) fn call_graph_function(
        &mut self,
        function: ElementId,
        generic_args: &[TypeName],
        args: &mut [Value],
    ) -> Result<Value, RuntimeError> {
        let layer = self.active;
        let graph = Rc::clone(&self.layers[layer].snapshot);
        let Some(element) = graph.get(function) else {
            return Err(RuntimeError::FunctionNotFound {
                graph: graph.name.clone(),
                name: function.to_string(),
            });
        };
        let Some(decl) = element.as_function() else {
            return Err(RuntimeError::FunctionNotFound {
                graph: graph.name.clone(),
                name: element.name.clone(),
            });
        };
        if self.calls.len() >= self.config.max_call_depth {
            return Err(RuntimeError::RecursionLimitExceeded {
                graph: graph.name.clone(),
                node: function,
                limit: self.config.max_call_depth,
            });
        }
        if args.len() != decl.params.len() {
            return Err(RuntimeError::member(
                &graph.name,
                function,
                MemberError::ArgumentCount {
                    name: element.name.clone(),
                    expected: decl.params.len(),
                    got: args.len(),
                },
            ));
        }
        let entry = graph.function_entry(function).ok_or_else(|| RuntimeError::MissingEntry {
            graph: graph.name.clone(),
            function,
        })?;

        let converted = args
            .iter()
            .zip(&decl.params)
            .map(|(arg, param)| auto_convert(arg.clone(), &param.ty, &self.registry))
            .collect();
        self.calls.push(CallFrame {
            function,
            layer,
            args: converted,
            generic_args: generic_args.to_vec(),
            locals: HashMap::new(),
        });
        let id = self.next_routine_id();
        let mut routine = Routine::new(id, layer, Rc::clone(&graph));
        routine.follow(&graph, entry, ports::EXIT);

        let depth = std::mem::replace(&mut self.eval_depth, 0);
        let outcome = self.drive(&mut routine);
        self.eval_depth = depth;
        let frame = self.calls.pop();
        let outcome = outcome?;

        if let Some(frame) = frame {
            for ((slot, param), value) in args.iter_mut().zip(&decl.params).zip(frame.args) {
                if param.mode.writes_back() {
                    *slot = value;
                }
            }
        }
        match outcome {
            Outcome::Completed(Some(value)) => Ok(auto_convert(value, &decl.return_type, &self.registry)),
            Outcome::Completed(None) | Outcome::Stopped => Ok(Value::default_for(&decl.return_type)),
            Outcome::Suspended { node, .. } => Err(RuntimeError::SuspendInCall {
                graph: graph.name.clone(),
                node,
            }),
        }
    }
}

/// Pops frames until a scope owner consumes `signal`. Returns the routine's
/// outcome if the signal reached the routine base.
fn unwind(routine: &mut Routine, signal: JumpSignal) -> Option<Outcome> {
    let graph = Rc::clone(&routine.snapshot);
    while let Some(frame) = routine.frames.pop() {
        if !(frame.is_loop() && signal.is_loop_control()) {
            continue;
        }
        tracing::debug!(origin = %signal.origin, kind = ?signal.kind, "jump consumed by loop");
        if signal.kind == JumpKind::Continue {
            routine.frames.push(frame);
        } else if let Frame::Loop { node, .. } | Frame::While { node, .. } = frame {
            routine.follow(&graph, node, ports::EXIT);
        }
        return None;
    }
    match signal.kind {
        JumpKind::Return => Some(Outcome::Completed(signal.payload)),
        kind => {
            tracing::warn!(origin = %signal.origin, ?kind, "jump outside any loop, routine ends");
            Some(Outcome::Completed(None))
        }
    }
}

fn describe(kind: &NodeKind) -> String {
    match kind {
        NodeKind::EventEntry { event } => format!("event {event}"),
        NodeKind::FunctionEntry => "function entry".to_string(),
        NodeKind::Literal { value } => format!("literal {value}"),
        NodeKind::Member { target, .. } => format!("member {target}"),
        NodeKind::SetValue { target } => format!("set {target}"),
        NodeKind::Branch => "branch".to_string(),
        NodeKind::Sequence { count } => format!("sequence of {count}"),
        NodeKind::ForLoop => "for".to_string(),
        NodeKind::While => "while".to_string(),
        NodeKind::Jump { kind } => format!("{kind:?}").to_lowercase(),
        NodeKind::Return { .. } => "return".to_string(),
        NodeKind::Wait { wait } => format!("wait {wait:?}"),
        NodeKind::Operator { op } => format!("{op:?}").to_lowercase(),
        NodeKind::Convert { to } => format!("convert to {to}"),
        NodeKind::Relay { .. } => "relay".to_string(),
        NodeKind::StateEntry => "state entry".to_string(),
        NodeKind::Print => "print".to_string(),
    }
}
