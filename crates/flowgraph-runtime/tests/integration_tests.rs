//! End-to-end tests for graph instances.
//!
//! Each test builds a graph with the core editing API, wraps it in a
//! `GraphHandle`, runs it through a `GraphInstance`, and checks the printed
//! output, the returned values, or the fault raised.
//!
//! Tests cover:
//! - Event dispatch and flow order, including base graphs
//! - Auto-typed ports, relays and literal reads
//! - Loops: for, while, break and continue carried out of nested scopes
//! - Function calls: return values, out parameters, locals, recursion limit
//! - Runtime faults naming the failing node (divide by zero, loop limit)
//! - Variables and properties through the instance API and member nodes
//! - Execution traces
//! - Suspension: wait nodes, tick, resume, state flow inputs
//! - Resolution policy for vanished targets
//! - Host events with graph function subscribers

use std::rc::Rc;

use flowgraph_core::node::ports;
use flowgraph_core::{
    ContainerKind, ElementId, FunctionDecl, Graph, JumpKind, MemberData, MemberError, MemberItem, NodeKind, ObjectRef,
    OperatorKind, ParameterDef, PortId, PortRef, PropertyDecl, TypeDescriptor, TypeName, TypeRegistry, Value,
    WaitSpec,
};
use flowgraph_runtime::{FlowState, GraphHandle, GraphInstance, InstanceConfig, ResolutionPolicy, RuntimeError};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn run(graph: Graph) -> GraphInstance {
    run_with(graph, InstanceConfig::default())
}

fn run_with(graph: Graph, config: InstanceConfig) -> GraphInstance {
    GraphInstance::new(GraphHandle::new(graph), Rc::new(TypeRegistry::new()), Value::Null, config)
}

fn main_of(graph: &Graph) -> ElementId {
    graph.container(ContainerKind::Main)
}

fn wire(graph: &mut Graph, from: ElementId, from_port: &str, to: ElementId, to_port: &str) {
    graph
        .connect(PortRef::new(from, from_port), PortRef::new(to, to_port))
        .expect("ports should connect");
}

/// Flow edge from `from`'s `port` output into `to`'s enter input.
fn then(graph: &mut Graph, from: ElementId, port: &str, to: ElementId) {
    wire(graph, from, port, to, ports::ENTER);
}

fn node(graph: &mut Graph, parent: ElementId, name: &str, kind: NodeKind) -> ElementId {
    graph.add_node(parent, name, kind).expect("node should be added")
}

fn literal(graph: &mut Graph, parent: ElementId, value: Value) -> ElementId {
    node(
        graph,
        parent,
        "literal",
        NodeKind::Literal {
            value: MemberData::create_from_value(value),
        },
    )
}

fn start(graph: &mut Graph) -> ElementId {
    event_entry(graph, "Start")
}

fn event_entry(graph: &mut Graph, event: &str) -> ElementId {
    let main = main_of(graph);
    node(graph, main, event, NodeKind::EventEntry { event: event.into() })
}

/// Print node whose value input reads `source`'s `port`.
fn print_from(graph: &mut Graph, parent: ElementId, source: ElementId, port: &str) -> ElementId {
    let print = node(graph, parent, "print", NodeKind::Print);
    wire(graph, source, port, print, ports::VALUE);
    print
}

fn print_value(graph: &mut Graph, parent: ElementId, value: Value) -> ElementId {
    let lit = literal(graph, parent, value);
    print_from(graph, parent, lit, ports::VALUE)
}

fn operator(graph: &mut Graph, parent: ElementId, op: OperatorKind, a: (ElementId, &str), b: (ElementId, &str)) -> ElementId {
    let id = node(graph, parent, "op", NodeKind::Operator { op });
    wire(graph, a.0, a.1, id, ports::A);
    wire(graph, b.0, b.1, id, ports::B);
    id
}

fn getter(graph: &mut Graph, parent: ElementId, target: MemberData) -> ElementId {
    node(graph, parent, "get", NodeKind::Member { target, flow: false })
}

fn text(s: &str) -> Value {
    Value::String(s.to_string())
}

// ---------------------------------------------------------------------------
// Graph builders
// ---------------------------------------------------------------------------

/// Start -> for i in 0..5 { sequence { break; print "unreachable" } } -> print "after"
fn build_break_graph() -> Graph {
    let mut graph = Graph::new("break");
    let main = main_of(&graph);
    let entry = start(&mut graph);
    let for_loop = node(&mut graph, main, "for", NodeKind::ForLoop);
    let end = literal(&mut graph, main, Value::I32(5));
    wire(&mut graph, end, ports::VALUE, for_loop, ports::END);
    then(&mut graph, entry, ports::EXIT, for_loop);

    let seq = node(&mut graph, main, "seq", NodeKind::Sequence { count: 2 });
    then(&mut graph, for_loop, ports::BODY, seq);
    let brk = node(&mut graph, main, "break", NodeKind::Jump { kind: JumpKind::Break });
    then(&mut graph, seq, &ports::then(0), brk);
    let unreachable = print_value(&mut graph, main, text("unreachable"));
    then(&mut graph, seq, &ports::then(1), unreachable);

    let after = print_value(&mut graph, main, text("after"));
    then(&mut graph, for_loop, ports::EXIT, after);
    graph
}

/// Start -> for i in 0..3 { if i == 1 { continue } ; print i }
fn build_continue_graph() -> Graph {
    let mut graph = Graph::new("continue");
    let main = main_of(&graph);
    let entry = start(&mut graph);
    let for_loop = node(&mut graph, main, "for", NodeKind::ForLoop);
    let end = literal(&mut graph, main, Value::I32(3));
    wire(&mut graph, end, ports::VALUE, for_loop, ports::END);
    then(&mut graph, entry, ports::EXIT, for_loop);

    let one = literal(&mut graph, main, Value::I32(1));
    let is_one = operator(
        &mut graph,
        main,
        OperatorKind::Equal,
        (for_loop, ports::INDEX),
        (one, ports::VALUE),
    );
    let branch = node(&mut graph, main, "branch", NodeKind::Branch);
    wire(&mut graph, is_one, ports::RESULT, branch, ports::CONDITION);
    then(&mut graph, for_loop, ports::BODY, branch);

    let cont = node(&mut graph, main, "continue", NodeKind::Jump { kind: JumpKind::Continue });
    then(&mut graph, branch, ports::TRUE, cont);
    let print = print_from(&mut graph, main, for_loop, ports::INDEX);
    then(&mut graph, branch, ports::EXIT, print);
    graph
}

/// Start -> while counter < 3 { counter = counter + 1 } -> print counter
fn build_while_graph() -> Graph {
    let mut graph = Graph::new("while");
    let main = main_of(&graph);
    let counter = graph.add_variable("counter", TypeName::I32, Value::I32(0)).unwrap();
    let entry = start(&mut graph);

    let read = getter(&mut graph, main, MemberData::variable(counter));
    let three = literal(&mut graph, main, Value::I32(3));
    let less = operator(&mut graph, main, OperatorKind::Less, (read, ports::VALUE), (three, ports::VALUE));
    let while_node = node(&mut graph, main, "while", NodeKind::While);
    wire(&mut graph, less, ports::RESULT, while_node, ports::CONDITION);
    then(&mut graph, entry, ports::EXIT, while_node);

    let one = literal(&mut graph, main, Value::I32(1));
    let plus = operator(&mut graph, main, OperatorKind::Add, (read, ports::VALUE), (one, ports::VALUE));
    let set = node(
        &mut graph,
        main,
        "set",
        NodeKind::SetValue {
            target: MemberData::variable(counter),
        },
    );
    wire(&mut graph, plus, ports::RESULT, set, ports::VALUE);
    then(&mut graph, while_node, ports::BODY, set);

    let print = print_from(&mut graph, main, read, ports::VALUE);
    then(&mut graph, while_node, ports::EXIT, print);
    graph
}

/// fn sum(a: i32, b: i32) -> i32 { return a + b }
fn add_sum_function(graph: &mut Graph) -> ElementId {
    let f = graph
        .add_function(
            "sum",
            FunctionDecl::new(
                vec![ParameterDef::new("a", TypeName::I32), ParameterDef::new("b", TypeName::I32)],
                TypeName::I32,
            ),
        )
        .unwrap();
    let entry = graph.function_entry(f).unwrap();
    let a = getter(graph, f, MemberData::parameter(f, 0));
    let b = getter(graph, f, MemberData::parameter(f, 1));
    let plus = operator(graph, f, OperatorKind::Add, (a, ports::VALUE), (b, ports::VALUE));
    let ret = node(graph, f, "return", NodeKind::Return { has_value: true });
    wire(graph, plus, ports::RESULT, ret, ports::VALUE);
    then(graph, entry, ports::EXIT, ret);
    f
}

/// fn answer() -> i32 { return 42 }
fn add_answer_function(graph: &mut Graph) -> ElementId {
    let f = graph
        .add_function("answer", FunctionDecl::new(Vec::new(), TypeName::I32))
        .unwrap();
    let entry = graph.function_entry(f).unwrap();
    let value = literal(graph, f, Value::I32(42));
    let ret = node(graph, f, "return", NodeKind::Return { has_value: true });
    wire(graph, value, ports::VALUE, ret, ports::VALUE);
    then(graph, entry, ports::EXIT, ret);
    f
}

/// Graph whose `Start` prints 1, waits `frames` frames, then prints 2.
fn build_wait_graph(frames: u32) -> Graph {
    let mut graph = Graph::new("wait");
    let main = main_of(&graph);
    let entry = start(&mut graph);
    let first = print_value(&mut graph, main, Value::I32(1));
    let wait = node(
        &mut graph,
        main,
        "wait",
        NodeKind::Wait {
            wait: WaitSpec::Frames(frames),
        },
    );
    let second = print_value(&mut graph, main, Value::I32(2));
    then(&mut graph, entry, ports::EXIT, first);
    then(&mut graph, first, ports::EXIT, wait);
    then(&mut graph, wait, ports::EXIT, second);
    graph
}

// ---------------------------------------------------------------------------
// Event dispatch and values
// ---------------------------------------------------------------------------

#[test]
fn test_event_runs_flow_in_order() {
    let mut graph = Graph::new("order");
    let main = main_of(&graph);
    let entry = start(&mut graph);
    let first = print_value(&mut graph, main, Value::I32(1));
    let second = print_value(&mut graph, main, text("two"));
    then(&mut graph, entry, ports::EXIT, first);
    then(&mut graph, first, ports::EXIT, second);

    let mut inst = run(graph);
    assert_eq!(inst.trigger_event("Start").unwrap(), 1);
    assert_eq!(inst.output(), &[Value::I32(1), text("two")]);
    assert_eq!(inst.trigger_event("Unknown").unwrap(), 0);
}

#[test]
fn test_base_graph_runs_first_and_supplies_functions() {
    let mut base = Graph::new("base");
    let base_main = main_of(&base);
    let base_start = start(&mut base);
    let base_print = print_value(&mut base, base_main, text("base"));
    then(&mut base, base_start, ports::EXIT, base_print);
    add_answer_function(&mut base);

    let mut derived = Graph::new("derived");
    let derived_main = main_of(&derived);
    let derived_start = start(&mut derived);
    let derived_print = print_value(&mut derived, derived_main, text("derived"));
    then(&mut derived, derived_start, ports::EXIT, derived_print);

    let handle = GraphHandle::with_base(derived, GraphHandle::new(base));
    let mut inst = GraphInstance::new(
        handle,
        Rc::new(TypeRegistry::new()),
        Value::Null,
        InstanceConfig::default(),
    );
    assert_eq!(inst.trigger_event("Start").unwrap(), 2);
    assert_eq!(inst.output(), &[text("base"), text("derived")]);
    assert_eq!(inst.call_function("answer", Vec::new()).unwrap(), Value::I32(42));
}

#[test]
fn test_auto_port_takes_connected_type() {
    let mut graph = Graph::new("auto");
    let main = main_of(&graph);
    let ten = literal(&mut graph, main, Value::I32(10));
    let add = node(&mut graph, main, "add", NodeKind::Operator { op: OperatorKind::Add });
    wire(&mut graph, ten, ports::VALUE, add, ports::A);

    assert_eq!(graph.port_type(&PortRef::new(add, ports::A)), Some(TypeName::I32));
    assert_eq!(graph.port_type(&PortRef::new(add, ports::B)), Some(TypeName::OBJECT));

    let mut inst = run(graph);
    assert_eq!(inst.read_port(&PortRef::new(add, ports::A)).unwrap(), Value::I32(10));
    assert_eq!(inst.read_port(&PortRef::new(ten, ports::VALUE)).unwrap(), Value::I32(10));
}

#[test]
fn test_relay_fans_one_value_out_to_several_inputs() {
    let mut graph = Graph::new("relay");
    let main = main_of(&graph);
    let entry = start(&mut graph);
    let ten = literal(&mut graph, main, Value::I32(10));
    let relay = node(&mut graph, main, "relay", NodeKind::Relay { ty: None });
    wire(&mut graph, ten, ports::VALUE, relay, ports::VALUE);

    let first = print_from(&mut graph, main, relay, ports::RESULT);
    let five = literal(&mut graph, main, Value::I32(5));
    let sum = operator(&mut graph, main, OperatorKind::Add, (relay, ports::RESULT), (five, ports::VALUE));
    let second = print_from(&mut graph, main, sum, ports::RESULT);
    then(&mut graph, entry, ports::EXIT, first);
    then(&mut graph, first, ports::EXIT, second);

    assert_eq!(graph.port_type(&PortRef::new(relay, ports::VALUE)), Some(TypeName::I32));
    assert_eq!(graph.connected_peers(&PortRef::new(relay, ports::RESULT)).len(), 2);

    let mut inst = run(graph);
    inst.trigger_event("Start").unwrap();
    assert_eq!(inst.output(), &[Value::I32(10), Value::I32(15)]);
}

#[test]
fn test_literal_objects_are_duplicated_per_read() {
    let obj = ObjectRef::new(TypeName::OBJECT);
    let literal = MemberData::create_from_value(Value::Object(obj.clone()));
    let mut inst = run(Graph::new("literals"));

    let first = literal.get(&mut inst).unwrap();
    let second = literal.get(&mut inst).unwrap();
    assert_ne!(first, Value::Object(obj));
    assert_ne!(first, second);

    let list = MemberData::create_from_value(Value::List(vec![Value::I32(1), text("x")]));
    assert_eq!(list.get(&mut inst).unwrap(), Value::List(vec![Value::I32(1), text("x")]));
}

// ---------------------------------------------------------------------------
// Loops and jumps
// ---------------------------------------------------------------------------

#[test]
fn test_break_leaves_loop_and_skips_rest_of_scope() {
    let config = InstanceConfig {
        trace_enabled: true,
        ..InstanceConfig::default()
    };
    let mut inst = run_with(build_break_graph(), config);
    inst.trigger_event("Start").unwrap();

    assert_eq!(inst.output(), &[text("after")]);
    let breaks = inst.trace().iter().filter(|e| e.description == "break").count();
    assert_eq!(breaks, 1, "the loop body should run exactly once");
}

#[test]
fn test_continue_skips_rest_of_iteration() {
    let mut inst = run(build_continue_graph());
    inst.trigger_event("Start").unwrap();
    assert_eq!(inst.output(), &[Value::I32(0), Value::I32(2)]);
}

#[test]
fn test_while_loop_updates_variable() {
    let mut inst = run(build_while_graph());
    inst.trigger_event("Start").unwrap();
    assert_eq!(inst.output(), &[Value::I32(3)]);
    assert_eq!(inst.get_variable("counter").unwrap(), Value::I32(3));
}

#[test]
fn test_loop_limit_names_the_loop() {
    let mut graph = Graph::new("spin");
    let main = main_of(&graph);
    let entry = start(&mut graph);
    let yes = literal(&mut graph, main, Value::Bool(true));
    let while_node = node(&mut graph, main, "while", NodeKind::While);
    wire(&mut graph, yes, ports::VALUE, while_node, ports::CONDITION);
    then(&mut graph, entry, ports::EXIT, while_node);

    let config = InstanceConfig {
        max_loop_iterations: 10,
        ..InstanceConfig::default()
    };
    let mut inst = run_with(graph, config);
    let err = inst.trigger_event("Start").unwrap_err();
    assert!(matches!(err, RuntimeError::LoopLimitExceeded { limit: 10, .. }));
    assert_eq!(err.element(), Some(while_node));
}

#[test]
fn test_break_outside_loop_ends_routine() {
    let mut graph = Graph::new("stray");
    let main = main_of(&graph);
    let entry = start(&mut graph);
    let brk = node(&mut graph, main, "break", NodeKind::Jump { kind: JumpKind::Break });
    then(&mut graph, entry, ports::EXIT, brk);

    let mut inst = run(graph);
    assert_eq!(inst.trigger_event("Start").unwrap(), 1);
    assert!(inst.output().is_empty());
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

#[test]
fn test_function_returns_converted_result() {
    let mut graph = Graph::new("calls");
    add_sum_function(&mut graph);
    let mut inst = run(graph);

    let result = inst.call_function("sum", vec![Value::I32(2), Value::I64(3)]).unwrap();
    assert_eq!(result, Value::I32(5));

    let err = inst.call_function("sum", vec![Value::I32(2)]).unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Member {
            source: MemberError::ArgumentCount { expected: 2, got: 1, .. },
            ..
        }
    ));
    assert!(matches!(
        inst.call_function("missing", Vec::new()),
        Err(RuntimeError::FunctionNotFound { .. })
    ));
}

#[test]
fn test_out_parameter_is_written_back() {
    let mut graph = Graph::new("out");
    let main = main_of(&graph);
    let f = graph
        .add_function(
            "split",
            FunctionDecl::new(vec![ParameterDef::out("x", TypeName::I32)], TypeName::VOID),
        )
        .unwrap();
    let f_entry = graph.function_entry(f).unwrap();
    let seven = literal(&mut graph, f, Value::I32(7));
    let assign = node(
        &mut graph,
        f,
        "assign",
        NodeKind::SetValue {
            target: MemberData::parameter(f, 0),
        },
    );
    wire(&mut graph, seven, ports::VALUE, assign, ports::VALUE);
    then(&mut graph, f_entry, ports::EXIT, assign);

    let entry = start(&mut graph);
    let call = node(
        &mut graph,
        main,
        "call",
        NodeKind::Member {
            target: MemberData::function(f),
            flow: true,
        },
    );
    then(&mut graph, entry, ports::EXIT, call);
    let print = print_from(&mut graph, main, call, &ports::out(0));
    then(&mut graph, call, ports::EXIT, print);

    let mut inst = run(graph);
    inst.trigger_event("Start").unwrap();
    assert_eq!(inst.output(), &[Value::I32(7)]);
}

#[test]
fn test_locals_are_fresh_per_call() {
    let mut graph = Graph::new("locals");
    let f = graph
        .add_function("bump", FunctionDecl::new(Vec::new(), TypeName::I32))
        .unwrap();
    let n = graph.add_local_variable(f, "n", TypeName::I32, Value::I32(0)).unwrap();
    let entry = graph.function_entry(f).unwrap();
    let read = getter(&mut graph, f, MemberData::local_variable(n));
    let one = literal(&mut graph, f, Value::I32(1));
    let plus = operator(&mut graph, f, OperatorKind::Add, (read, ports::VALUE), (one, ports::VALUE));
    let set = node(
        &mut graph,
        f,
        "set",
        NodeKind::SetValue {
            target: MemberData::local_variable(n),
        },
    );
    wire(&mut graph, plus, ports::RESULT, set, ports::VALUE);
    let ret = node(&mut graph, f, "return", NodeKind::Return { has_value: true });
    wire(&mut graph, read, ports::VALUE, ret, ports::VALUE);
    then(&mut graph, entry, ports::EXIT, set);
    then(&mut graph, set, ports::EXIT, ret);

    let mut inst = run(graph);
    assert_eq!(inst.call_function("bump", Vec::new()).unwrap(), Value::I32(1));
    assert_eq!(inst.call_function("bump", Vec::new()).unwrap(), Value::I32(1));
}

#[test]
fn test_recursion_limit_stops_runaway_calls() {
    let mut graph = Graph::new("recursive");
    let f = graph
        .add_function("forever", FunctionDecl::new(Vec::new(), TypeName::VOID))
        .unwrap();
    let entry = graph.function_entry(f).unwrap();
    let call = node(
        &mut graph,
        f,
        "call",
        NodeKind::Member {
            target: MemberData::function(f),
            flow: true,
        },
    );
    then(&mut graph, entry, ports::EXIT, call);

    let config = InstanceConfig {
        max_call_depth: 8,
        ..InstanceConfig::default()
    };
    let mut inst = run_with(graph, config);
    let err = inst.call_function("forever", Vec::new()).unwrap_err();
    assert!(
        err.to_string().contains("call depth limit (8) exceeded"),
        "unexpected error: {err}"
    );
}

#[test]
fn test_wait_inside_function_is_rejected() {
    let mut graph = Graph::new("slow");
    let f = graph
        .add_function("slow", FunctionDecl::new(Vec::new(), TypeName::VOID))
        .unwrap();
    let entry = graph.function_entry(f).unwrap();
    let wait = node(
        &mut graph,
        f,
        "wait",
        NodeKind::Wait {
            wait: WaitSpec::Frames(1),
        },
    );
    then(&mut graph, entry, ports::EXIT, wait);

    let mut inst = run(graph);
    let err = inst.call_function("slow", Vec::new()).unwrap_err();
    assert!(matches!(err, RuntimeError::SuspendInCall { node, .. } if node == wait));
    assert_eq!(inst.pending_routines(), 0);
}

// ---------------------------------------------------------------------------
// Faults
// ---------------------------------------------------------------------------

#[test]
fn test_divide_by_zero_names_the_operator() {
    let mut graph = Graph::new("div");
    let main = main_of(&graph);
    let entry = start(&mut graph);
    let one = literal(&mut graph, main, Value::I32(1));
    let zero = literal(&mut graph, main, Value::I32(0));
    let div = operator(&mut graph, main, OperatorKind::Divide, (one, ports::VALUE), (zero, ports::VALUE));
    let print = print_from(&mut graph, main, div, ports::RESULT);
    then(&mut graph, entry, ports::EXIT, print);

    let mut inst = run(graph);
    let err = inst.trigger_event("Start").unwrap_err();
    assert!(matches!(err, RuntimeError::DivideByZero { node, .. } if node == div));
    assert_eq!(err.element(), Some(div));
    assert!(inst.output().is_empty());
}

// ---------------------------------------------------------------------------
// Variables and properties
// ---------------------------------------------------------------------------

#[test]
fn test_variable_access_converts_to_declared_type() {
    let mut graph = Graph::new("vars");
    graph.add_variable("hp", TypeName::I32, Value::I32(10)).unwrap();
    let mut inst = run(graph);

    assert_eq!(inst.get_variable("hp").unwrap(), Value::I32(10));
    inst.set_variable("hp", Value::I64(7)).unwrap();
    assert_eq!(inst.get_variable("hp").unwrap(), Value::I32(7));

    let err = inst.set_variable("hp", text("lots")).unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Member {
            source: MemberError::TypeMismatch { .. },
            ..
        }
    ));
    assert_eq!(inst.get_variable("hp").unwrap(), Value::I32(7));

    // Out-of-range values are rejected rather than wrapped.
    let err = inst.set_variable("hp", Value::I64(1 << 40)).unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Member {
            source: MemberError::TypeMismatch { .. },
            ..
        }
    ));
    assert_eq!(inst.get_variable("hp").unwrap(), Value::I32(7));
    assert!(matches!(
        inst.get_variable("mana"),
        Err(RuntimeError::VariableNotFound { .. })
    ));
}

#[test]
fn test_auto_and_getter_properties() {
    let mut graph = Graph::new("props");
    let main = main_of(&graph);
    let speed = graph
        .add_property("speed", PropertyDecl::auto(TypeName::F64, Value::F64(1.5)))
        .unwrap();
    let answer_fn = add_answer_function(&mut graph);
    let answer = graph
        .add_property(
            "answer",
            PropertyDecl {
                ty: TypeName::I32,
                default: Value::Null,
                getter: Some(answer_fn),
                setter: None,
            },
        )
        .unwrap();

    let entry = start(&mut graph);
    let four = literal(&mut graph, main, Value::F64(4.0));
    let set_speed = node(
        &mut graph,
        main,
        "set speed",
        NodeKind::SetValue {
            target: MemberData::property(speed),
        },
    );
    wire(&mut graph, four, ports::VALUE, set_speed, ports::VALUE);
    let read_speed = getter(&mut graph, main, MemberData::property(speed));
    let print_speed = print_from(&mut graph, main, read_speed, ports::VALUE);
    let read_answer = getter(&mut graph, main, MemberData::property(answer));
    let print_answer = print_from(&mut graph, main, read_answer, ports::VALUE);
    then(&mut graph, entry, ports::EXIT, set_speed);
    then(&mut graph, set_speed, ports::EXIT, print_speed);
    then(&mut graph, print_speed, ports::EXIT, print_answer);

    let write = event_entry(&mut graph, "Write");
    let one = literal(&mut graph, main, Value::I32(1));
    let set_answer = node(
        &mut graph,
        main,
        "set answer",
        NodeKind::SetValue {
            target: MemberData::property(answer),
        },
    );
    wire(&mut graph, one, ports::VALUE, set_answer, ports::VALUE);
    then(&mut graph, write, ports::EXIT, set_answer);

    let mut inst = run(graph);
    inst.trigger_event("Start").unwrap();
    assert_eq!(inst.output(), &[Value::F64(4.0), Value::I32(42)]);

    let err = inst.trigger_event("Write").unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Member {
            source: MemberError::NotWritable { .. },
            ..
        }
    ));
    assert_eq!(err.element(), Some(set_answer));
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

#[test]
fn test_trace_records_inputs_and_output() {
    let mut graph = Graph::new("trace");
    let main = main_of(&graph);
    let entry = start(&mut graph);
    let print = print_value(&mut graph, main, Value::I32(5));
    then(&mut graph, entry, ports::EXIT, print);

    let config = InstanceConfig {
        trace_enabled: true,
        ..InstanceConfig::default()
    };
    let mut inst = run_with(graph, config);
    inst.trigger_event("Start").unwrap();

    let trace = inst.trace();
    assert_eq!(trace.len(), 1);
    assert_eq!(trace[0].node, print);
    assert_eq!(trace[0].description, "print");
    assert_eq!(trace[0].inputs, vec![(PortId::new(ports::VALUE), Value::I32(5))]);
    assert_eq!(trace[0].output, Some(Value::I32(5)));
}

#[test]
fn test_trace_is_off_by_default() {
    let mut inst = run(build_continue_graph());
    inst.trigger_event("Start").unwrap();
    assert!(inst.trace().is_empty());
}

// ---------------------------------------------------------------------------
// Suspension and state flow
// ---------------------------------------------------------------------------

#[test]
fn test_wait_resumes_after_frames() {
    let mut inst = run(build_wait_graph(2));
    inst.trigger_event("Start").unwrap();
    assert_eq!(inst.output(), &[Value::I32(1)]);
    assert_eq!(inst.pending_routines(), 1);

    assert_eq!(inst.tick(0.016).unwrap(), 0);
    assert_eq!(inst.tick(0.016).unwrap(), 1);
    assert_eq!(inst.output(), &[Value::I32(1), Value::I32(2)]);
    assert_eq!(inst.pending_routines(), 0);
}

#[test]
fn test_resume_routine_skips_the_wait() {
    let mut inst = run(build_wait_graph(100));
    inst.trigger_event("Start").unwrap();
    let parked = inst.parked_routines();
    assert_eq!(parked.len(), 1);

    inst.resume_routine(parked[0]).unwrap();
    assert_eq!(inst.output(), &[Value::I32(1), Value::I32(2)]);
    assert_eq!(inst.tick(0.016).unwrap(), 0);
    assert!(matches!(
        inst.resume_routine(parked[0]),
        Err(RuntimeError::RoutineNotFound { .. })
    ));
}

#[test]
fn test_state_flow_run_and_stop() {
    let mut graph = Graph::new("state");
    let main = main_of(&graph);
    let manual = event_entry(&mut graph, "Manual");
    let first = print_value(&mut graph, main, text("a"));
    let wait = node(
        &mut graph,
        main,
        "wait",
        NodeKind::Wait {
            wait: WaitSpec::Frames(1),
        },
    );
    let second = print_value(&mut graph, main, text("b"));
    then(&mut graph, manual, ports::EXIT, first);
    then(&mut graph, first, ports::EXIT, wait);
    then(&mut graph, wait, ports::EXIT, second);

    let trigger = PortRef::new(manual, ports::EXIT);
    let input = PortRef::new(first, ports::ENTER);
    let mut inst = run(graph);
    assert_eq!(inst.state_of(&input), FlowState::Idle);

    assert_eq!(inst.run_state(&trigger).unwrap(), FlowState::Running);
    assert_eq!(inst.run_state(&trigger).unwrap(), FlowState::Running);
    assert_eq!(inst.output(), &[text("a")]);

    assert!(inst.stop_state(&input));
    assert_eq!(inst.state_of(&input), FlowState::Finished);
    assert_eq!(inst.tick(0.016).unwrap(), 0);
    assert_eq!(inst.output(), &[text("a")]);
    assert!(!inst.stop_state(&input));

    assert_eq!(inst.run_state(&trigger).unwrap(), FlowState::Running);
    inst.tick(0.016).unwrap();
    assert_eq!(inst.output(), &[text("a"), text("a"), text("b")]);
    assert_eq!(inst.state_of(&input), FlowState::Finished);

    assert!(matches!(inst.run_state(&input), Err(RuntimeError::Internal { .. })));
}

#[test]
fn test_state_entry_continues_without_waiting() {
    let mut graph = Graph::new("state entry");
    let main = main_of(&graph);
    let entry = start(&mut graph);
    let state = node(&mut graph, main, "state", NodeKind::StateEntry);
    then(&mut graph, entry, ports::EXIT, state);

    let a = print_value(&mut graph, main, text("a"));
    let wait = node(
        &mut graph,
        main,
        "wait",
        NodeKind::Wait {
            wait: WaitSpec::Frames(1),
        },
    );
    let b = print_value(&mut graph, main, text("b"));
    then(&mut graph, state, ports::BODY, a);
    then(&mut graph, a, ports::EXIT, wait);
    then(&mut graph, wait, ports::EXIT, b);
    let c = print_value(&mut graph, main, text("c"));
    then(&mut graph, state, ports::EXIT, c);

    let mut inst = run(graph);
    inst.trigger_event("Start").unwrap();
    assert_eq!(inst.output(), &[text("a"), text("c")]);
    assert_eq!(inst.state_of(&PortRef::new(a, ports::ENTER)), FlowState::Running);

    inst.tick(0.016).unwrap();
    assert_eq!(inst.output(), &[text("a"), text("c"), text("b")]);
    assert_eq!(inst.state_of(&PortRef::new(a, ports::ENTER)), FlowState::Finished);
}

// ---------------------------------------------------------------------------
// Resolution policy
// ---------------------------------------------------------------------------

/// Prints variable `hp`, then removes `hp` in a second version.
fn build_vanishing_variable() -> Rc<GraphHandle> {
    let mut graph = Graph::new("vanish");
    let main = main_of(&graph);
    let hp = graph.add_variable("hp", TypeName::I32, Value::I32(3)).unwrap();
    let entry = start(&mut graph);
    let read = getter(&mut graph, main, MemberData::variable(hp));
    let print = print_from(&mut graph, main, read, ports::VALUE);
    then(&mut graph, entry, ports::EXIT, print);

    let handle = GraphHandle::new(graph);
    handle.edit(|g| g.destroy(hp)).unwrap();
    handle
}

#[test]
fn test_strict_policy_faults_on_missing_target() {
    let mut inst = GraphInstance::new(
        build_vanishing_variable(),
        Rc::new(TypeRegistry::new()),
        Value::Null,
        InstanceConfig::default(),
    );
    let err = inst.trigger_event("Start").unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Member {
            source: MemberError::MissingElement { .. },
            ..
        }
    ));
}

#[test]
fn test_best_effort_policy_reads_null() {
    let config = InstanceConfig {
        resolution: ResolutionPolicy::BestEffort,
        ..InstanceConfig::default()
    };
    let mut inst = GraphInstance::new(build_vanishing_variable(), Rc::new(TypeRegistry::new()), Value::Null, config);
    inst.trigger_event("Start").unwrap();
    assert_eq!(inst.output(), &[Value::Null]);
}

// ---------------------------------------------------------------------------
// Host events
// ---------------------------------------------------------------------------

#[test]
fn test_event_subscription_calls_graph_function() {
    let mut registry = TypeRegistry::new();
    registry.register(TypeDescriptor::class("Actor").with_event("Hit"));
    let actor = ObjectRef::new(TypeName::new("Actor"));

    let mut graph = Graph::new("listener");
    let hits = graph.add_variable("hits", TypeName::I32, Value::I32(0)).unwrap();
    let f = graph
        .add_function(
            "on_hit",
            FunctionDecl::new(vec![ParameterDef::new("amount", TypeName::I32)], TypeName::VOID),
        )
        .unwrap();
    let entry = graph.function_entry(f).unwrap();
    let amount = getter(&mut graph, f, MemberData::parameter(f, 0));
    let set = node(
        &mut graph,
        f,
        "set",
        NodeKind::SetValue {
            target: MemberData::variable(hits),
        },
    );
    wire(&mut graph, amount, ports::VALUE, set, ports::VALUE);
    then(&mut graph, entry, ports::EXIT, set);

    let mut inst = GraphInstance::new(
        GraphHandle::new(graph),
        Rc::new(registry),
        Value::Object(actor),
        InstanceConfig::default(),
    );
    let event = MemberData::reflected(vec![MemberItem::event("Actor", "Hit")]).with_instance(MemberData::self_target());

    inst.subscribe(&event, f).unwrap();
    inst.subscribe(&event, f).unwrap();
    inst.raise(&event, vec![Value::I32(3)]).unwrap();
    assert_eq!(inst.get_variable("hits").unwrap(), Value::I32(3));

    assert!(inst.unsubscribe(&event, f).unwrap());
    inst.raise(&event, vec![Value::I32(5)]).unwrap();
    assert_eq!(inst.get_variable("hits").unwrap(), Value::I32(3));
    assert!(!inst.unsubscribe(&event, f).unwrap());
}
